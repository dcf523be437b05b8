use anyhow::Context as _;
use argh::FromArgs;
use ash::{Command, CommandTree, Context, Duplex, Shell, ShellOptions, TreeError};
use env_logger::Env;
use futures_executor::block_on;
use futures_util::FutureExt;
use log::{debug, info, warn};
use std::borrow::Cow;
use std::io;
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::sync::Arc;
use std::thread;

#[derive(FromArgs)]
/// Interactive demo of the ash command shell.
struct Args {
    #[argh(option, default = "String::from(\"ash\")")]
    /// prompt label
    prompt: String,
    #[argh(option)]
    /// serve one shell per TCP connection on this address instead of stdin
    listen: Option<SocketAddr>,
    #[argh(option, default = "ash::io_adapters::DEFAULT_CHUNK_SIZE")]
    /// read buffer size in bytes
    chunk_size: usize,
}

#[derive(FromArgs)]
/// Print the arguments separated by spaces.
struct Echo {
    #[argh(switch, short = 'n')]
    /// do not print the trailing newline
    no_newline: bool,
    #[argh(positional, greedy)]
    /// words to print
    words: Vec<String>,
}

/// `<label> '<body>'` followed by a newline, body bytes untouched.
fn quoted(label: &str, body: &[u8]) -> Vec<u8> {
    let mut msg = format!("{label} '").into_bytes();
    msg.extend_from_slice(body);
    msg.extend_from_slice(b"'\n");
    msg
}

async fn run_demo(mut ctx: Context<'_>) -> anyhow::Result<()> {
    ctx.write("Insert a line of raw text: ").await?;
    let Some(line) = ctx.read_line().await else {
        return Ok(());
    };
    ctx.write(quoted("You typed in", &line)).await?;

    ctx.write("Insert a line of text to be tokenized: ").await?;
    let Some(statement) = ctx.read_tokenized().await else {
        return Ok(());
    };
    let mut msg = quoted("Your raw text", &statement.raw);
    msg.extend_from_slice(b" which gets tokenized to:\n");
    for token in &statement.tokens {
        msg.extend_from_slice(&quoted(" -", token));
    }
    ctx.write(msg).await?;

    ctx.write("Insert a multi-line text with terminator 'EOI':\n").await?;
    let Some(block) = ctx.read_multiline("EOI").await else {
        return Ok(());
    };
    ctx.write(quoted("You wrote", &block)).await?;

    ctx.write("Insert a multi-line text with a predicate (first char == end char):\n")
        .await?;
    let Some(block) = ctx
        .read_multiline_with(|block: &[u8]| block.first().is_some_and(|first| block.last() == Some(first)))
        .await
    else {
        return Ok(());
    };
    ctx.write(quoted("You wrote", &block)).await?;
    Ok(())
}

async fn clear(mut ctx: Context<'_>) -> anyhow::Result<()> {
    ctx.clear_screen().await?;
    Ok(())
}

async fn echo(mut ctx: Context<'_>) -> anyhow::Result<()> {
    let Some(echo) = ctx.parse_args::<Echo>().await? else {
        return Ok(());
    };
    let mut text = echo.words.join(" ");
    if !echo.no_newline {
        text.push('\n');
    }
    ctx.write(text).await?;
    Ok(())
}

async fn prompt(mut ctx: Context<'_>) -> anyhow::Result<()> {
    let args: Vec<String> = ctx.args_lossy().into_iter().map(Cow::into_owned).collect();
    match args.as_slice() {
        [] => {
            let current = format!("{}\n", ctx.prompt());
            ctx.write(current).await?;
        }
        [label] => ctx.set_prompt(label.as_str()),
        _ => anyhow::bail!("expected at most one label"),
    }
    Ok(())
}

fn demo_commands() -> Result<CommandTree, TreeError> {
    CommandTree::new(vec![
        Command::new("demo")
            .help("this is a demo command")
            .description("Some more description")
            .handler(|ctx| run_demo(ctx).boxed())
            .child(
                Command::new("clear")
                    .alias("cls")
                    .help("this is a nested demo command")
                    .description("clear the screen")
                    .handler(|ctx| clear(ctx).boxed()),
            ),
        Command::new("echo")
            .help("print the arguments")
            .description("echo [-n] words...")
            .handler(|ctx| echo(ctx).boxed()),
        Command::new("prompt")
            .help("show or change the prompt")
            .description("prompt [label]")
            .handler(|ctx| prompt(ctx).boxed()),
    ])
}

fn session(stream: TcpStream, commands: Arc<CommandTree>, options: ShellOptions) -> io::Result<()> {
    let peer = stream.peer_addr()?;
    debug!("{peer} connected");
    let transport = Duplex::blocking(stream.try_clone()?, stream);
    let mut shell = Shell::over(transport, commands, options);
    block_on(shell.run());
    debug!("{peer} disconnected");
    Ok(())
}

fn serve(addr: SocketAddr, commands: Arc<CommandTree>, options: ShellOptions) -> anyhow::Result<()> {
    let listener = TcpListener::bind(addr).with_context(|| format!("cannot listen on {addr}"))?;
    info!("listening on {}", listener.local_addr()?);

    for stream in listener.incoming() {
        let stream = match stream {
            Ok(stream) => stream,
            Err(error) => {
                warn!("accept failed: {error}");
                continue;
            }
        };
        let commands = Arc::clone(&commands);
        let options = options.clone();
        thread::spawn(move || {
            if let Err(error) = session(stream, commands, options) {
                warn!("session failed: {error}");
            }
        });
    }
    Ok(())
}

fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(Env::default().default_filter_or("warn")).init();
    let args: Args = argh::from_env();

    let commands = Arc::new(demo_commands()?);
    let options = ShellOptions {
        prompt: args.prompt,
        chunk_size: args.chunk_size,
    };

    match args.listen {
        Some(addr) => serve(addr, commands, options),
        None => {
            let transport = Duplex::blocking(io::stdin(), io::stdout());
            let mut shell = Shell::over(transport, commands, options);
            block_on(shell.run());
            Ok(())
        }
    }
}
