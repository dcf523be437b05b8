use crate::builtin::{Builtin, command_help, render_help};
use crate::command::CommandTree;
use crate::context::{Context, Statement};
use crate::io_adapters::{ChunkSink, ChunkSource, DEFAULT_CHUNK_SIZE, StreamIo, Transport};
use crate::reader::{IncrementalReader, ReadMode};
use log::{debug, trace, warn};
use std::sync::Arc;

/// Reply written when a statement names no command.
pub const COMMAND_NOT_FOUND: &str = "command not found\n";

/// Settings of a [`Shell`].
#[derive(Debug, Clone)]
pub struct ShellOptions {
    /// Prompt label. The shell writes it followed by `"> "`.
    pub prompt: String,
    /// Read buffer size used by [`Shell::over`].
    pub chunk_size: usize,
}

impl Default for ShellOptions {
    fn default() -> Self {
        Self {
            prompt: "ash".to_string(),
            chunk_size: DEFAULT_CHUNK_SIZE,
        }
    }
}

/// Where the prompt loop currently is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    /// Waiting for the next statement.
    AwaitingCommand,
    /// A command handler is running.
    Dispatching,
    /// The session ended, by `exit` or because the input was exhausted.
    Closed,
}

/// Outcome of one [`Shell::step`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Closed,
}

/// An interactive shell session over one byte stream.
///
/// The shell writes a prompt, reads one statement, runs the built-in or the
/// command it names and starts over. Handlers read and write through the
/// same stream while they run; the next prompt only appears once the active
/// handler has finished.
///
/// Example
/// ```
/// use ash::{CommandTree, MemoryIo, Shell};
/// use std::sync::Arc;
///
/// let commands = Arc::new(CommandTree::default());
/// let mut shell = Shell::new(MemoryIo::new(["help;", "exit\n"]), commands);
/// futures_executor::block_on(shell.run());
///
/// let output = String::from_utf8(shell.get_ref().written()).unwrap();
/// assert!(output.starts_with("ash> \nroot commands:"));
/// assert!(output.ends_with("end this program\nash> "));
/// ```
#[derive(Debug)]
pub struct Shell<S> {
    reader: IncrementalReader<S>,
    commands: Arc<CommandTree>,
    prompt: String,
    state: State,
}

impl<S> Shell<S> {
    /// Create a shell reading from and writing to `io`.
    pub fn new(io: S, commands: Arc<CommandTree>) -> Self {
        Self::with_options(io, commands, ShellOptions::default())
    }

    pub fn with_options(io: S, commands: Arc<CommandTree>, options: ShellOptions) -> Self {
        Self {
            reader: IncrementalReader::new(io),
            commands,
            prompt: options.prompt,
            state: State::AwaitingCommand,
        }
    }

    pub fn state(&self) -> State {
        self.state
    }

    /// Current prompt label.
    pub fn prompt(&self) -> &str {
        &self.prompt
    }

    pub fn set_prompt(&mut self, label: impl Into<String>) {
        self.prompt = label.into();
    }

    pub fn commands(&self) -> &Arc<CommandTree> {
        &self.commands
    }

    /// The reader statements are taken from, e.g. to inspect
    /// [`pending`](IncrementalReader::pending) input after the session ended.
    pub fn reader(&self) -> &IncrementalReader<S> {
        &self.reader
    }

    pub fn get_ref(&self) -> &S {
        self.reader.get_ref()
    }

    pub fn get_mut(&mut self) -> &mut S {
        self.reader.get_mut()
    }

    pub fn into_inner(self) -> S {
        self.reader.into_inner()
    }
}

impl<T: Transport + Send> Shell<StreamIo<T>> {
    /// Create a shell over a transport, reading
    /// [`chunk_size`](ShellOptions::chunk_size) bytes at a time.
    pub fn over(transport: T, commands: Arc<CommandTree>, options: ShellOptions) -> Self {
        let io = StreamIo::with_capacity(options.chunk_size, transport);
        Self::with_options(io, commands, options)
    }
}

impl<S: ChunkSource + ChunkSink + Send> Shell<S> {
    /// Runs prompt/read/dispatch cycles until the session is closed.
    pub async fn run(&mut self) {
        while self.step().await == Flow::Continue {}
    }

    /// Runs one prompt/read/dispatch cycle.
    pub async fn step(&mut self) -> Flow {
        if self.state == State::Closed {
            return Flow::Closed;
        }

        let prompt = format!("{}> ", self.prompt);
        self.reply(prompt).await;

        let Some(record) = self.reader.next_record(ReadMode::Tokenize).await else {
            debug!("input exhausted, closing the session");
            self.state = State::Closed;
            return Flow::Closed;
        };
        let statement = Statement::from(&record);
        self.dispatch(statement).await
    }

    async fn dispatch(&mut self, statement: Statement) -> Flow {
        let Some(first) = statement.tokens.first() else {
            return Flow::Continue;
        };

        match Builtin::parse(first) {
            Some(Builtin::Exit) => {
                debug!("exit requested");
                self.state = State::Closed;
                return Flow::Closed;
            }
            Some(Builtin::Help) => {
                let help = render_help(&self.commands, &statement.tokens[1..]);
                self.reply(help).await;
                return Flow::Continue;
            }
            None => {}
        }

        let commands = Arc::clone(&self.commands);
        let (Some(command), depth) = commands.resolve(&statement.tokens) else {
            trace!("no command for {:?}", statement.raw_lossy());
            self.reply(COMMAND_NOT_FOUND).await;
            return Flow::Continue;
        };
        let Some(handler) = &command.handler else {
            self.reply(command_help(command)).await;
            return Flow::Continue;
        };

        debug!("dispatching `{}` with {} args", command.name, statement.tokens.len() - depth);
        self.state = State::Dispatching;
        let context = Context::new(
            &statement,
            depth,
            command,
            &commands,
            &mut self.reader,
            &mut self.prompt,
        );
        let result = handler(context).await;
        self.state = State::AwaitingCommand;

        if let Err(error) = result {
            warn!("`{}` failed: {error:#}", command.name);
            self.reply(format!("{}: {error:#}\n", command.name)).await;
        }
        Flow::Continue
    }

    async fn reply(&mut self, text: impl AsRef<[u8]>) {
        if let Err(error) = self.reader.get_mut().write(text.as_ref()).await {
            debug!("write failed: {error}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::Command;
    use crate::io_adapters::{Duplex, MemoryIo};
    use futures_executor::block_on;
    use futures_util::FutureExt;
    use futures_util::io::Cursor;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::thread;

    async fn echo_args(mut ctx: Context<'_>) -> anyhow::Result<()> {
        let line = ctx.args_lossy().join(",");
        ctx.write(format!("[{line}]\n")).await?;
        Ok(())
    }

    async fn echo_next_line(mut ctx: Context<'_>) -> anyhow::Result<()> {
        let line = ctx.read_line().await.unwrap_or_default();
        ctx.write(format!("got: {}\n", String::from_utf8_lossy(&line))).await?;
        let block = ctx.read_multiline("END").await.unwrap_or_default();
        ctx.write(format!("block: {}\n", String::from_utf8_lossy(&block))).await?;
        Ok(())
    }

    async fn put(mut ctx: Context<'_>) -> anyhow::Result<()> {
        let data = ctx.args().concat();
        ctx.write(data).await?;
        Ok(())
    }

    async fn fail(_ctx: Context<'_>) -> anyhow::Result<()> {
        anyhow::bail!("boom")
    }

    async fn rename(mut ctx: Context<'_>) -> anyhow::Result<()> {
        let label = ctx.args_lossy().first().map(|label| label.to_string()).unwrap_or_default();
        ctx.set_prompt(label);
        Ok(())
    }

    fn tree() -> Arc<CommandTree> {
        let tree = CommandTree::new(vec![
            Command::new("echo").handler(|ctx| echo_args(ctx).boxed()),
            Command::new("demo")
                .help("a demo")
                .description("nothing to see")
                .handler(|ctx| echo_next_line(ctx).boxed())
                .child(Command::new("fail").handler(|ctx| fail(ctx).boxed())),
            Command::new("group")
                .help("only groups")
                .child(Command::new("leaf").help("a leaf").handler(|ctx| echo_args(ctx).boxed())),
            Command::new("prompt").handler(|ctx| rename(ctx).boxed()),
            Command::new("put").handler(|ctx| put(ctx).boxed()),
        ]);
        Arc::new(tree.unwrap())
    }

    fn session<const N: usize>(chunks: [&str; N]) -> (Shell<MemoryIo>, String) {
        let mut shell = Shell::new(MemoryIo::new(chunks), tree());
        block_on(shell.run());
        let output = String::from_utf8(shell.get_ref().written()).unwrap();
        (shell, output)
    }

    #[test]
    fn test_exit_ends_the_session() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let tree = CommandTree::new(vec![Command::new("hello").handler(move |_ctx| {
            counter.fetch_add(1, Ordering::SeqCst);
            async { Ok(()) }.boxed()
        })])
        .unwrap();

        let mut shell = Shell::new(MemoryIo::new(["exit\nhello\n"]), Arc::new(tree));
        assert_eq!(shell.state(), State::AwaitingCommand);
        assert_eq!(block_on(shell.step()), Flow::Closed);
        assert_eq!(shell.state(), State::Closed);
        assert_eq!(block_on(shell.step()), Flow::Closed);

        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert_eq!(shell.get_ref().written(), b"ash> ");
        assert_eq!(shell.reader().pending(), b"hello\n");
    }

    #[test]
    fn test_help_continues() {
        let mut shell = Shell::new(MemoryIo::new(["help\n"]), tree());
        assert_eq!(block_on(shell.step()), Flow::Continue);
        assert_eq!(shell.state(), State::AwaitingCommand);

        let output = String::from_utf8(shell.get_ref().written()).unwrap();
        assert!(output.starts_with("ash> \nroot commands:\n    - help [cmds...]"));
        assert!(output.contains("\n    - demo\n        a demo"));
    }

    #[test]
    fn test_help_for_a_command() {
        let (_, output) = session(["help demo\n"]);
        assert_eq!(
            output,
            "ash> a demo\n   nothing to see\n  subcommands:\n    - fail\n        \nash> "
        );
    }

    #[test]
    fn test_unknown_command() {
        let (shell, output) = session(["bogus 1 2\n"]);
        assert_eq!(output, "ash> command not found\nash> ");
        assert_eq!(shell.state(), State::Closed);
    }

    #[test]
    fn test_args_follow_the_command_path() {
        let (_, output) = session(["echo a 'b c'; group leaf x\n"]);
        assert_eq!(output, "ash> [a,b c]\nash> [x]\nash> ");
    }

    #[test]
    fn test_handler_reads_from_the_same_stream() {
        let (_, output) = session(["demo\nhello world\n", "one\ntwo END\necho done\n"]);
        assert_eq!(
            output,
            "ash> got: hello world\nblock: one\ntwo END\nash> [done]\nash> "
        );
    }

    #[test]
    fn test_handler_error_is_reported() {
        let (_, output) = session(["demo fail\necho still here\n"]);
        assert_eq!(output, "ash> fail: boom\nash> [still,here]\nash> ");
    }

    #[test]
    fn test_grouping_command_prints_its_help() {
        let (_, output) = session(["group\n"]);
        assert_eq!(
            output,
            "ash> only groups\n   \n  subcommands:\n    - leaf\n        a leaf\nash> "
        );
    }

    #[test]
    fn test_comment_only_line_prompts_again() {
        let (_, output) = session(["# note\n", "exit\n"]);
        assert_eq!(output, "ash> ash> ");
    }

    #[test]
    fn test_handler_changes_the_prompt() {
        let (shell, output) = session(["prompt root\n", "exit\n"]);
        assert_eq!(output, "ash> root> ");
        assert_eq!(shell.prompt(), "root");
    }

    #[test]
    fn test_custom_prompt() {
        let options = ShellOptions {
            prompt: "svc".to_string(),
            ..ShellOptions::default()
        };
        let mut shell = Shell::with_options(MemoryIo::new(["exit\n"]), tree(), options);
        block_on(shell.run());
        assert_eq!(shell.get_ref().written(), b"svc> ");
    }

    #[test]
    fn test_shell_over_a_transport() {
        let transport = Duplex::new(Cursor::new(b"echo over tcp\n".to_vec()), Cursor::new(Vec::new()));
        let options = ShellOptions {
            chunk_size: 3,
            ..ShellOptions::default()
        };
        let mut shell = Shell::over(transport, tree(), options);
        block_on(shell.run());

        let (_, writer) = shell.into_inner().into_inner().into_inner();
        assert_eq!(writer.into_inner(), b"ash> [over,tcp]\nash> ");
    }

    #[test]
    fn test_arguments_keep_their_bytes() {
        let mut shell = Shell::new(MemoryIo::new([&b"put \xff\xfe\n"[..]]), tree());
        block_on(shell.run());
        assert_eq!(shell.get_ref().written(), b"ash> \xff\xfeash> ");
    }

    #[test]
    fn test_stray_quote_does_not_swallow_exit() {
        let (shell, output) = session(["echo don't\n", "exit\nhelp\n"]);
        assert_eq!(output, "ash> [don]\nash> ash> ");
        assert_eq!(shell.reader().pending(), b"help\n");
    }

    #[test]
    fn test_shells_share_one_tree_across_threads() {
        let commands = tree();
        let workers: Vec<_> = ["one", "two"]
            .into_iter()
            .map(|word| {
                let commands = Arc::clone(&commands);
                thread::spawn(move || {
                    let input = format!("echo {word}\ndemo\nline\nEND\n");
                    let mut shell = Shell::new(MemoryIo::new([input]), commands);
                    block_on(shell.run());
                    String::from_utf8(shell.get_ref().written()).unwrap()
                })
            })
            .collect();

        let outputs: Vec<String> = workers.into_iter().map(|worker| worker.join().unwrap()).collect();
        assert_eq!(outputs[0], "ash> [one]\nash> got: line\nblock: END\nash> ");
        assert_eq!(outputs[1], "ash> [two]\nash> got: line\nblock: END\nash> ");
        assert_eq!(Arc::strong_count(&commands), 1);
    }
}
