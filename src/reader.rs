//! Incremental assembly of records from chunked input.
//!
//! An [`IncrementalReader`] pulls chunks from a [`ChunkSource`] and keeps the
//! bytes it could not deliver yet in a carry buffer. Each request names the
//! [`ReadMode`] that decides what a complete record is, so the same stream can
//! be read as a statement, then as a raw line, then as a delimited block.

use crate::io_adapters::{ChunkSink, ChunkSource};
use crate::lexer::{self, TokenizedRecord};
use futures_util::future::BoxFuture;
use log::{debug, trace};
use std::fmt;
use std::io;
use std::ops::Range;

/// Predicate accepting a multi-line block.
pub type BlockPredicate<'a> = dyn Fn(&[u8]) -> bool + Send + Sync + 'a;

/// What the next record looks like.
#[derive(Clone, Copy)]
pub enum ReadMode<'a> {
    /// One logical line, split into tokens.
    Tokenize,
    /// Everything up to the next newline, verbatim.
    RawLine,
    /// Everything up to the first newline that follows `terminator`.
    MultilineTerminator { terminator: &'a [u8] },
    /// Everything up to the first newline at which `predicate` accepts the
    /// bytes read so far.
    MultilinePredicate { predicate: &'a BlockPredicate<'a> },
}

impl<'a> ReadMode<'a> {
    /// Shorthand for [`ReadMode::MultilineTerminator`].
    pub fn terminator<T: AsRef<[u8]> + ?Sized>(terminator: &'a T) -> Self {
        ReadMode::MultilineTerminator {
            terminator: terminator.as_ref(),
        }
    }

    /// Shorthand for [`ReadMode::MultilinePredicate`].
    pub fn predicate(predicate: &'a BlockPredicate<'a>) -> Self {
        ReadMode::MultilinePredicate { predicate }
    }
}

impl fmt::Debug for ReadMode<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReadMode::Tokenize => f.write_str("Tokenize"),
            ReadMode::RawLine => f.write_str("RawLine"),
            ReadMode::MultilineTerminator { terminator } => f
                .debug_struct("MultilineTerminator")
                .field("terminator", &String::from_utf8_lossy(terminator))
                .finish(),
            ReadMode::MultilinePredicate { .. } => f.write_str("MultilinePredicate"),
        }
    }
}

/// Location of a complete record inside the carry buffer.
#[derive(Debug, PartialEq, Eq)]
struct Found {
    raw: Range<usize>,
    tokens: Vec<Range<usize>>,
    /// Length of the carry prefix the record uses up.
    consumed: usize,
}

impl Found {
    fn block(end: usize) -> Self {
        Self {
            raw: 0..end,
            tokens: Vec::new(),
            consumed: end + 1,
        }
    }
}

/// Outcome of examining the carry buffer.
#[derive(Debug, PartialEq, Eq)]
enum Scan {
    Complete(Found),
    /// Empty statements occupy this many leading bytes.
    Skip(usize),
    Incomplete,
}

fn range_in(outer: &[u8], inner: &[u8]) -> Range<usize> {
    let start = inner.as_ptr().addr() - outer.as_ptr().addr();
    start..start + inner.len()
}

fn scan_statement(buffer: &[u8]) -> Scan {
    let (line, rest) = lexer::pick_line(buffer);
    let consumed = buffer.len() - rest.len();
    if line.is_empty() {
        return match consumed {
            0 => Scan::Incomplete,
            skipped => Scan::Skip(skipped),
        };
    }

    let (record, leftover) = lexer::tokenize(line, true);
    if record.raw_input.is_empty() {
        // Nothing in the line matches the token grammar, e.g. it starts with
        // an unmatched quote. It is delivered without tokens.
        return Scan::Complete(Found {
            raw: range_in(buffer, line),
            tokens: Vec::new(),
            consumed,
        });
    }

    // Bytes the tokenizer stopped at stay in the carry, still followed by the
    // line terminator, and make up the next statement.
    let consumed = match leftover {
        [] => consumed,
        _ => range_in(buffer, leftover).start,
    };
    Scan::Complete(Found {
        raw: range_in(buffer, record.raw_input),
        tokens: record
            .tokens
            .iter()
            .map(|token| range_in(buffer, token))
            .collect(),
        consumed,
    })
}

fn scan_block(buffer: &[u8], accept: impl Fn(&[u8]) -> bool) -> Scan {
    buffer
        .iter()
        .enumerate()
        .filter(|(_, byte)| **byte == b'\n')
        .map(|(pos, _)| pos)
        .find(|&pos| accept(&buffer[..pos]))
        .map_or(Scan::Incomplete, |pos| Scan::Complete(Found::block(pos)))
}

fn scan(buffer: &[u8], mode: ReadMode<'_>) -> Scan {
    match mode {
        ReadMode::Tokenize => scan_statement(buffer),
        ReadMode::RawLine => buffer
            .iter()
            .position(|&byte| byte == b'\n')
            .map_or(Scan::Incomplete, |pos| Scan::Complete(Found::block(pos))),
        ReadMode::MultilineTerminator { terminator } => {
            scan_block(buffer, |candidate| candidate.ends_with(terminator))
        }
        ReadMode::MultilinePredicate { predicate } => scan_block(buffer, predicate),
    }
}

/// Assembles records from a [`ChunkSource`].
///
/// Bytes are never delivered twice and never dropped: whatever follows a
/// record stays in the carry buffer for the next request. A record borrows
/// the reader, so it has to be used up before the next request is made.
#[derive(Debug)]
pub struct IncrementalReader<S> {
    source: S,
    carry: Vec<u8>,
    record: Vec<u8>,
}

impl<S> IncrementalReader<S> {
    pub fn new(source: S) -> Self {
        Self {
            source,
            carry: Vec::new(),
            record: Vec::new(),
        }
    }

    /// Bytes received but not delivered as part of a record yet.
    ///
    /// After the source is exhausted this holds the unterminated tail of the
    /// input, if any.
    pub fn pending(&self) -> &[u8] {
        &self.carry
    }

    pub fn get_ref(&self) -> &S {
        &self.source
    }

    pub fn get_mut(&mut self) -> &mut S {
        &mut self.source
    }

    pub fn into_inner(self) -> S {
        self.source
    }

    fn take(&mut self, found: Found) -> TokenizedRecord<'_> {
        self.record.clear();
        self.record.extend(self.carry.drain(..found.consumed));

        let record = &self.record;
        TokenizedRecord {
            raw_input: &record[found.raw],
            tokens: found
                .tokens
                .into_iter()
                .map(|range| &record[range])
                .collect(),
        }
    }
}

impl<S: ChunkSource> IncrementalReader<S> {
    /// Waits until a record of the requested kind is complete and returns it.
    ///
    /// Carried bytes are examined first, so statements that arrived together
    /// are delivered without waiting for more input. Returns `None` once the
    /// source is exhausted.
    pub async fn next_record(&mut self, mode: ReadMode<'_>) -> Option<TokenizedRecord<'_>> {
        loop {
            match scan(&self.carry, mode) {
                Scan::Complete(found) => {
                    trace!("{mode:?} record complete, {} bytes", found.consumed);
                    return Some(self.take(found));
                }
                Scan::Skip(count) => {
                    self.carry.drain(..count);
                    continue;
                }
                Scan::Incomplete => {}
            }

            loop {
                let Some(chunk) = self.source.next_chunk().await else {
                    debug!(
                        "source exhausted with {} bytes pending",
                        self.carry.len()
                    );
                    return None;
                };
                if !chunk.is_empty() {
                    self.carry.extend_from_slice(chunk);
                    break;
                }
            }
        }
    }
}

/// Object-safe view of a reader and the sink next to it.
///
/// This is what command handlers talk to, so the command tree does not depend
/// on the transport type.
pub trait Channel: Send {
    /// Reads one record, see [`IncrementalReader::next_record`].
    fn read<'a>(&'a mut self, mode: ReadMode<'a>) -> BoxFuture<'a, Option<TokenizedRecord<'a>>>;

    /// Writes `data` to the sink.
    fn write<'a>(&'a mut self, data: &'a [u8]) -> BoxFuture<'a, io::Result<()>>;
}

impl<S> Channel for IncrementalReader<S>
where
    S: ChunkSource + ChunkSink + Send,
{
    fn read<'a>(&'a mut self, mode: ReadMode<'a>) -> BoxFuture<'a, Option<TokenizedRecord<'a>>> {
        Box::pin(self.next_record(mode))
    }

    fn write<'a>(&'a mut self, data: &'a [u8]) -> BoxFuture<'a, io::Result<()>> {
        Box::pin(self.source.write(data))
    }
}
