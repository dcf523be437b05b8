//! What a command handler gets to work with.

use crate::command::{Command, CommandTree};
use crate::lexer::TokenizedRecord;
use crate::reader::{Channel, ReadMode};
use argh::{EarlyExit, FromArgs};
use std::borrow::Cow;
use std::io;

/// Byte sequence that homes the cursor and clears the terminal.
pub const CLEAR_SCREEN: &[u8] = b"\x1b[1;1H\x1b[2J";

/// Owned copy of a tokenized statement, byte for byte as received.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Statement {
    /// The statement as typed, separators included.
    pub raw: Vec<u8>,
    /// Tokens in order, quotes stripped.
    pub tokens: Vec<Vec<u8>>,
}

impl Statement {
    /// The statement as text, invalid UTF-8 replaced.
    pub fn raw_lossy(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.raw)
    }

    /// Tokens as text, invalid UTF-8 replaced.
    pub fn tokens_lossy(&self) -> Vec<Cow<'_, str>> {
        self.tokens
            .iter()
            .map(|token| String::from_utf8_lossy(token))
            .collect()
    }
}

impl From<&TokenizedRecord<'_>> for Statement {
    fn from(record: &TokenizedRecord<'_>) -> Self {
        Self {
            raw: record.raw_input.to_vec(),
            tokens: record.tokens.iter().map(|token| token.to_vec()).collect(),
        }
    }
}

/// Per-invocation handle passed to a command handler.
///
/// Gives access to the arguments of the invocation and to the stream the
/// shell runs over. Reads go through the same reader the prompt loop uses,
/// so input typed ahead is never lost. A context lives exactly as long as
/// the handler call.
pub struct Context<'a> {
    statement: &'a Statement,
    depth: usize,
    command: &'a Command,
    commands: &'a CommandTree,
    channel: &'a mut dyn Channel,
    prompt: &'a mut String,
}

impl<'a> Context<'a> {
    pub(crate) fn new(
        statement: &'a Statement,
        depth: usize,
        command: &'a Command,
        commands: &'a CommandTree,
        channel: &'a mut dyn Channel,
        prompt: &'a mut String,
    ) -> Self {
        Self {
            statement,
            depth,
            command,
            commands,
            channel,
            prompt,
        }
    }

    /// Tokens following the command path.
    pub fn args(&self) -> &[Vec<u8>] {
        &self.statement.tokens[self.depth..]
    }

    /// [`args`](Self::args) as text, invalid UTF-8 replaced.
    pub fn args_lossy(&self) -> Vec<Cow<'_, str>> {
        self.args()
            .iter()
            .map(|arg| String::from_utf8_lossy(arg))
            .collect()
    }

    /// All tokens of the statement, command path included.
    pub fn full_args(&self) -> &[Vec<u8>] {
        &self.statement.tokens
    }

    /// The statement as typed.
    pub fn raw_line(&self) -> &[u8] {
        &self.statement.raw
    }

    /// The command being run.
    pub fn command(&self) -> &Command {
        self.command
    }

    /// The tree the command was found in.
    pub fn commands(&self) -> &CommandTree {
        self.commands
    }

    /// Current prompt label, without the `"> "` marker.
    pub fn prompt(&self) -> &str {
        self.prompt.as_str()
    }

    /// Changes the prompt label for the rest of the session.
    pub fn set_prompt(&mut self, label: impl Into<String>) {
        *self.prompt = label.into();
    }

    pub async fn write(&mut self, text: impl AsRef<[u8]>) -> io::Result<()> {
        self.channel.write(text.as_ref()).await
    }

    pub async fn clear_screen(&mut self) -> io::Result<()> {
        self.channel.write(CLEAR_SCREEN).await
    }

    /// Reads one record in the given mode, borrowing the reader's buffer.
    ///
    /// Returns `None` once the input is exhausted.
    pub async fn read<'m>(&'m mut self, mode: ReadMode<'m>) -> Option<TokenizedRecord<'m>> {
        self.channel.read(mode).await
    }

    /// Reads everything up to the next newline.
    pub async fn read_line(&mut self) -> Option<Vec<u8>> {
        let record = self.channel.read(ReadMode::RawLine).await?;
        Some(record.raw_input.to_vec())
    }

    /// Reads and tokenizes the next statement.
    pub async fn read_tokenized(&mut self) -> Option<Statement> {
        let record = self.channel.read(ReadMode::Tokenize).await?;
        Some(Statement::from(&record))
    }

    /// Reads lines up to and including the first one ending with
    /// `terminator`.
    pub async fn read_multiline<T>(&mut self, terminator: &T) -> Option<Vec<u8>>
    where
        T: AsRef<[u8]> + Sync + ?Sized,
    {
        let record = self.channel.read(ReadMode::terminator(terminator)).await?;
        Some(record.raw_input.to_vec())
    }

    /// Reads lines until `predicate` accepts everything read so far.
    pub async fn read_multiline_with<F>(&mut self, predicate: F) -> Option<Vec<u8>>
    where
        F: Fn(&[u8]) -> bool + Send + Sync,
    {
        let record = self.channel.read(ReadMode::predicate(&predicate)).await?;
        Some(record.raw_input.to_vec())
    }

    /// Parses [`args`](Self::args) into `T` with argh.
    ///
    /// argh works on text, so invalid UTF-8 in the arguments is replaced
    /// first. When argh exits early (bad arguments or `--help`), its output
    /// is written to the stream and `None` is returned.
    pub async fn parse_args<T: FromArgs>(&mut self) -> io::Result<Option<T>> {
        let output = {
            let text = self.statement.tokens_lossy();
            let words: Vec<&str> = text.iter().map(|word| &**word).collect();
            match T::from_args(&words[..self.depth], &words[self.depth..]) {
                Ok(parsed) => return Ok(Some(parsed)),
                Err(EarlyExit { output, .. }) => output,
            }
        };

        self.write(&output).await?;
        if !output.ends_with('\n') {
            self.write("\n").await?;
        }
        Ok(None)
    }
}
