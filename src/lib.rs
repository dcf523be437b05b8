//! An embeddable interactive command shell.
//!
//! The shell runs over any duplex byte stream: a terminal, a socket, a serial
//! line or an in-memory buffer. It writes a prompt, reads one statement,
//! dispatches it to a command from a tree of named commands and starts over.
//! Command handlers are async functions that can keep reading from the same
//! stream while they run, as a raw line, as another tokenized statement or as
//! a multi-line block.
//!
//! The main entry point is [`Shell`]. Commands are described with [`Command`]
//! and collected into a [`CommandTree`], which several shells may share. The
//! [`lexer`] and [`reader`] modules are public for embedders that only need
//! the statement grammar or the incremental record reader.
//!
//! Example
//! ```
//! use ash::{Command, CommandTree, Context, MemoryIo, Shell};
//! use futures_util::FutureExt;
//! use std::sync::Arc;
//!
//! async fn greet(mut ctx: Context<'_>) -> anyhow::Result<()> {
//!     let name = ctx.args_lossy().join(" ");
//!     ctx.write(format!("hello, {name}\n")).await?;
//!     Ok(())
//! }
//!
//! let commands = CommandTree::new(vec![
//!     Command::new("greet").help("say hello").handler(|ctx| greet(ctx).boxed()),
//! ])
//! .unwrap();
//!
//! let mut shell = Shell::new(MemoryIo::new(["greet world\n"]), Arc::new(commands));
//! futures_executor::block_on(shell.run());
//! assert_eq!(shell.get_ref().written(), b"ash> hello, world\nash> ");
//! ```

mod builtin;
pub mod command;
mod context;
mod interpreter;
pub mod io_adapters;
pub mod lexer;
pub mod reader;

pub use builtin::{HELP_NOT_FOUND, command_help, render_help};
pub use command::{Command, CommandTree, Handler, HandlerFuture, TreeError};
pub use context::{CLEAR_SCREEN, Context, Statement};
pub use interpreter::{COMMAND_NOT_FOUND, Flow, Shell, ShellOptions, State};
pub use io_adapters::{ChunkSink, ChunkSource, Duplex, MemoryIo, StreamIo, Transport};
pub use lexer::{TokenKind, TokenizedRecord, Tokens, pick_line, tokenize};
pub use reader::{BlockPredicate, Channel, IncrementalReader, ReadMode};
