//! A module implementing the lexical grammar of the shell.
//!
//! Input is handled as raw bytes. Two operations are provided:
//!
//! - [`pick_line`] cuts one logical line off the front of a buffer, honoring
//!   quotes, `#` comments and backslash continuations.
//! - [`tokenize`] splits a logical line into tokens.
//!
//! Both are pure: they never allocate copies of the input and always return
//! views into the buffer they were given.

use regex::bytes::{Captures, Regex};
use std::sync::OnceLock;

/// One logical line: leading whitespace, then any mix of quoted spans,
/// comments, continuations and ordinary bytes, closed by `;` or `\n`.
const LINE_PATTERN: &str = r#"(?s-u)^\s*((?:"(?:[^"\\]|\\.)*"|'(?:[^'\\]|\\.)*'|#[^\n]*\n|\\[^\n]*\n|[^;\n])*)(?:;|\n)"#;

/// One token. The order of the alternatives is significant. A comment may
/// also end the input, since lines handed over by [`pick_line`] lack their
/// terminator.
const TOKEN_PATTERN: &str = r#"(?s-u)^(?:"((?:[^"\\]|\\.)*)"|'((?:[^'\\]|\\.)*)'|#([^\n]*)(?:\n|$)|(\\)|(;)|(\n)|([^\s"']+)|(\s+))"#;

fn line_regex() -> &'static Regex {
    static REGEX: OnceLock<Regex> = OnceLock::new();
    REGEX.get_or_init(|| Regex::new(LINE_PATTERN).expect("line pattern is valid"))
}

fn token_regex() -> &'static Regex {
    static REGEX: OnceLock<Regex> = OnceLock::new();
    REGEX.get_or_init(|| Regex::new(TOKEN_PATTERN).expect("token pattern is valid"))
}

/// Kind of a single match of the token grammar.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    /// Content between double quotes. Escape sequences are kept verbatim.
    DoubleQuoted,
    /// Content between single quotes. Escape sequences are kept verbatim.
    SingleQuoted,
    /// Body of a `#` comment, without the `#` and the closing newline.
    Comment,
    /// A lone backslash, continuing the statement on the next physical line.
    Continuation,
    /// The statement separator `;`.
    Semicolon,
    /// A newline.
    Newline,
    /// A run of bytes that are neither whitespace nor quotes.
    Plain,
    /// A run of whitespace.
    Whitespace,
}

impl TokenKind {
    /// Capture groups of [`TOKEN_PATTERN`], in order.
    const BY_GROUP: [TokenKind; 8] = [
        TokenKind::DoubleQuoted,
        TokenKind::SingleQuoted,
        TokenKind::Comment,
        TokenKind::Continuation,
        TokenKind::Semicolon,
        TokenKind::Newline,
        TokenKind::Plain,
        TokenKind::Whitespace,
    ];

    /// Whether this kind only separates tokens and is dropped when
    /// whitespace skipping is enabled.
    pub fn is_separator(self) -> bool {
        !matches!(
            self,
            TokenKind::DoubleQuoted | TokenKind::SingleQuoted | TokenKind::Plain
        )
    }
}

/// A statement as produced by the tokenizer or the incremental reader.
///
/// `raw_input` holds the exact bytes consumed (separators included) and every
/// entry of `tokens` borrows from the same buffer.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TokenizedRecord<'a> {
    /// Verbatim input the record was built from.
    pub raw_input: &'a [u8],
    /// Tokens in input order. Empty for raw line and multi-line records.
    pub tokens: Vec<&'a [u8]>,
}

impl<'a> TokenizedRecord<'a> {
    /// Creates a record without tokens.
    pub fn raw(raw_input: &'a [u8]) -> Self {
        Self {
            raw_input,
            tokens: Vec::new(),
        }
    }
}

/// Iterator over successive matches of the token grammar.
///
/// Iteration stops at the first position where no alternative matches, e.g.
/// at a quote that is never closed. [`Tokens::remainder`] then returns the
/// unconsumed bytes.
#[derive(Debug, Clone)]
pub struct Tokens<'a> {
    rest: &'a [u8],
}

impl<'a> Tokens<'a> {
    /// Starts scanning `raw` from its first byte.
    pub fn new(raw: &'a [u8]) -> Self {
        Self { rest: raw }
    }

    /// Bytes not consumed by the matches returned so far.
    pub fn remainder(&self) -> &'a [u8] {
        self.rest
    }

    fn classify(captures: &Captures<'a>) -> Option<(TokenKind, &'a [u8])> {
        TokenKind::BY_GROUP
            .iter()
            .enumerate()
            .find_map(|(index, kind)| captures.get(index + 1).map(|m| (*kind, m.as_bytes())))
    }
}

impl<'a> Iterator for Tokens<'a> {
    type Item = (TokenKind, &'a [u8]);

    fn next(&mut self) -> Option<Self::Item> {
        let rest = self.rest;
        let captures = token_regex().captures(rest)?;
        let whole = captures.get(0)?;
        let item = Self::classify(&captures)?;
        self.rest = &rest[whole.end()..];
        Some(item)
    }
}

/// Cuts the first logical line off `raw`.
///
/// Leading whitespace is skipped. The line ends at the first `;` or `\n` that
/// is not inside a quoted span, a comment or a continuation; that terminator
/// belongs to neither returned part.
///
/// If no terminator is found, the line is empty and the rest is the whole
/// unchanged input: more bytes are needed before a line can be cut.
///
/// A `#` comment takes its closing newline with it whenever more input
/// follows in `raw`, so the next physical line joins the same logical line.
/// `b"echo hi # c\nfoo\n"` is one line when it is scanned as a whole, but
/// two lines when the buffer ends right after the comment's newline.
/// Incremental readers therefore split differently depending on how the
/// input was chunked. End comments with `;` or keep them on lines of their
/// own to avoid this.
pub fn pick_line(raw: &[u8]) -> (&[u8], &[u8]) {
    match line_regex().captures(raw) {
        Some(captures) => {
            let end = captures.get(0).map_or(0, |m| m.end());
            let line = captures.get(1).map_or(&b""[..], |m| m.as_bytes());
            (line, &raw[end..])
        }
        None => (&raw[..0], raw),
    }
}

/// Splits `raw` into tokens.
///
/// Quotes are stripped from quoted tokens; their content is returned as is.
/// With `skip_ws` set, comments, continuations, separators and whitespace
/// advance the scan without being added to the token list.
///
/// Returns the record together with the bytes that could not be tokenized.
/// `raw_input` followed by that remainder always equals `raw`.
pub fn tokenize(raw: &[u8], skip_ws: bool) -> (TokenizedRecord<'_>, &[u8]) {
    let mut scanner = Tokens::new(raw);
    let tokens = scanner
        .by_ref()
        .filter(|(kind, _)| !(skip_ws && kind.is_separator()))
        .map(|(_, token)| token)
        .collect();

    let rest = scanner.remainder();
    let record = TokenizedRecord {
        raw_input: &raw[..raw.len() - rest.len()],
        tokens,
    };
    (record, rest)
}
