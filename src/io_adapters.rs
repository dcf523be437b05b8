//! Adapters between byte transports and the shell.
//!
//! The shell consumes input as a sequence of chunks ([`ChunkSource`]) and
//! writes output through a [`ChunkSink`]. [`StreamIo`] provides both on top
//! of any [`Transport`], and [`Duplex`] turns a pair of `futures` I/O objects
//! into a transport. [`MemoryIo`] replays scripted chunks and captures output,
//! which is what tests and in-process embedders usually want.

use futures_util::io::{AllowStdIo, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use log::{debug, trace};
use std::collections::VecDeque;
use std::future::Future;
use std::io;
use std::sync::{Arc, Mutex};

/// Default size of the buffer a [`StreamIo`] reads into.
pub const DEFAULT_CHUNK_SIZE: usize = 4096;

/// A duplex byte stream the shell can run over.
///
/// `read_some` may return `Ok(0)` to signal that no data is available yet;
/// the caller polls again as long as [`is_open`](Transport::is_open) holds.
pub trait Transport {
    /// Whether the stream can still deliver or accept bytes.
    fn is_open(&self) -> bool;

    /// Reads whatever is available into `buf` and returns the byte count.
    fn read_some(&mut self, buf: &mut [u8]) -> impl Future<Output = io::Result<usize>> + Send;

    /// Writes every byte of `data`, suspending until the stream accepts it.
    fn write_all(&mut self, data: &[u8]) -> impl Future<Output = io::Result<()>> + Send;
}

/// Producer of input chunks.
///
/// `None` means the source is exhausted; no more chunks will follow. An empty
/// chunk only means that nothing arrived yet.
pub trait ChunkSource {
    /// Waits for the next chunk.
    fn next_chunk(&mut self) -> impl Future<Output = Option<&[u8]>> + Send;
}

/// Consumer of output bytes.
pub trait ChunkSink {
    /// Writes `data`, suspending until it has been accepted downstream.
    fn write(&mut self, data: &[u8]) -> impl Future<Output = io::Result<()>> + Send;
}

/// Chunked reader and writer over a [`Transport`].
#[derive(Debug)]
pub struct StreamIo<T> {
    stream: T,
    buf: Vec<u8>,
}

impl<T: Transport> StreamIo<T> {
    /// Wraps `stream`, reading up to [`DEFAULT_CHUNK_SIZE`] bytes at a time.
    pub fn new(stream: T) -> Self {
        Self::with_capacity(DEFAULT_CHUNK_SIZE, stream)
    }

    /// Wraps `stream`, reading up to `capacity` bytes at a time.
    pub fn with_capacity(capacity: usize, stream: T) -> Self {
        Self {
            stream,
            buf: vec![0; capacity.max(1)],
        }
    }

    pub fn get_ref(&self) -> &T {
        &self.stream
    }

    pub fn get_mut(&mut self) -> &mut T {
        &mut self.stream
    }

    pub fn into_inner(self) -> T {
        self.stream
    }
}

impl<T: Transport + Send> ChunkSource for StreamIo<T> {
    async fn next_chunk(&mut self) -> Option<&[u8]> {
        while self.stream.is_open() {
            match self.stream.read_some(&mut self.buf).await {
                Ok(0) => continue,
                Ok(count) => {
                    trace!("received {count} bytes");
                    return Some(&self.buf[..count]);
                }
                Err(error) => {
                    debug!("read failed, treating the stream as closed: {error}");
                    return None;
                }
            }
        }
        debug!("stream closed");
        None
    }
}

impl<T: Transport + Send> ChunkSink for StreamIo<T> {
    async fn write(&mut self, data: &[u8]) -> io::Result<()> {
        if !self.stream.is_open() {
            return Err(io::ErrorKind::NotConnected.into());
        }
        self.stream.write_all(data).await
    }
}

/// [`Transport`] made of a separate reader and writer.
///
/// The transport closes itself on end of file or on the first I/O error in
/// either direction.
#[derive(Debug)]
pub struct Duplex<R, W> {
    reader: R,
    writer: W,
    open: bool,
}

impl<R, W> Duplex<R, W> {
    pub fn new(reader: R, writer: W) -> Self {
        Self {
            reader,
            writer,
            open: true,
        }
    }

    /// Marks the transport as closed. Pending and later reads report
    /// exhaustion.
    pub fn close(&mut self) {
        self.open = false;
    }

    pub fn into_inner(self) -> (R, W) {
        (self.reader, self.writer)
    }
}

impl<R: io::Read, W: io::Write> Duplex<AllowStdIo<R>, AllowStdIo<W>> {
    /// Wraps blocking `std::io` objects, e.g. stdin/stdout or both halves of
    /// a cloned `TcpStream`.
    pub fn blocking(reader: R, writer: W) -> Self {
        Self::new(AllowStdIo::new(reader), AllowStdIo::new(writer))
    }
}

impl<R, W> Transport for Duplex<R, W>
where
    R: AsyncRead + Unpin + Send,
    W: AsyncWrite + Unpin + Send,
{
    fn is_open(&self) -> bool {
        self.open
    }

    async fn read_some(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let result = self.reader.read(buf).await;
        if !matches!(result, Ok(count) if count > 0) {
            self.open = false;
        }
        result
    }

    async fn write_all(&mut self, data: &[u8]) -> io::Result<()> {
        let writer = &mut self.writer;
        let result = async {
            writer.write_all(data).await?;
            writer.flush().await
        }
        .await;
        if result.is_err() {
            self.open = false;
        }
        result
    }
}

/// Memory-backed chunk source and sink.
///
/// Chunks are delivered exactly as given, so tests can control how input is
/// split. Everything written is appended to a shared buffer.
#[derive(Debug, Default)]
pub struct MemoryIo {
    chunks: VecDeque<Vec<u8>>,
    current: Vec<u8>,
    output: Arc<Mutex<Vec<u8>>>,
}

impl MemoryIo {
    /// Create a MemoryIo that will deliver `chunks` in order, then report
    /// exhaustion.
    pub fn new<I, C>(chunks: I) -> Self
    where
        I: IntoIterator<Item = C>,
        C: Into<Vec<u8>>,
    {
        Self {
            chunks: chunks.into_iter().map(Into::into).collect(),
            current: Vec::new(),
            output: Arc::default(),
        }
    }

    /// Convenience: create the source and return it with a handle to the
    /// output buffer.
    pub fn with_handle<I, C>(chunks: I) -> (Self, Arc<Mutex<Vec<u8>>>)
    where
        I: IntoIterator<Item = C>,
        C: Into<Vec<u8>>,
    {
        let io = Self::new(chunks);
        let output = Arc::clone(&io.output);
        (io, output)
    }

    /// Appends another chunk to deliver.
    pub fn push_chunk(&mut self, chunk: impl Into<Vec<u8>>) {
        self.chunks.push_back(chunk.into());
    }

    /// Copy of everything written so far.
    pub fn written(&self) -> Vec<u8> {
        self.output
            .lock()
            .map(|output| output.clone())
            .unwrap_or_default()
    }
}

impl ChunkSource for MemoryIo {
    async fn next_chunk(&mut self) -> Option<&[u8]> {
        self.current = self.chunks.pop_front()?;
        Some(&self.current)
    }
}

impl ChunkSink for MemoryIo {
    async fn write(&mut self, data: &[u8]) -> io::Result<()> {
        self.output
            .lock()
            .map_err(|_| io::Error::other("output buffer poisoned"))?
            .extend_from_slice(data);
        Ok(())
    }
}
