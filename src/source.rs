use std::io::{self, Read};

const DEFAULT_BUFFER_SIZE: usize = 128 * 1024;

/// A growable window of bytes pulled from an underlying stream.
///
/// Offsets into [`window`](ByteSource::window) stay valid until
/// [`release`](ByteSource::release) discards a prefix, after which every
/// outstanding offset has to be shifted by the released amount.
pub trait ByteSource {
    /// Appends up to `size_hint` more bytes to the window, returning how many
    /// were added. `Ok(0)` means the stream is exhausted.
    fn extend(&mut self, size_hint: usize) -> io::Result<usize>;

    /// Buffered bytes that have not been released, starting at offset 0.
    fn window(&self) -> &[u8];

    /// Discards the first `n` bytes of the window.
    fn release(&mut self, n: usize);

    /// Preferred `size_hint` for [`extend`](ByteSource::extend).
    fn read_size(&self) -> usize {
        DEFAULT_BUFFER_SIZE
    }
}

/// [`ByteSource`] over any reader. Wrap the reader in a decoder
/// (e.g. `flate2::read::GzDecoder`) for compressed input.
pub struct ReaderSource<R> {
    reader: R,
    buf: Vec<u8>,
    read_size: usize,
}

impl<R: Read> ReaderSource<R> {
    /// Creates a source that reads 128 KiB at a time.
    pub fn new(reader: R) -> Self {
        Self::with_capacity(DEFAULT_BUFFER_SIZE, reader)
    }

    /// Creates a source that reads `capacity` bytes at a time.
    pub fn with_capacity(capacity: usize, reader: R) -> Self {
        let read_size = capacity.max(1);
        Self {
            reader,
            buf: Vec::with_capacity(read_size),
            read_size,
        }
    }

    pub fn into_inner(self) -> R {
        self.reader
    }
}

impl<R: Read> ByteSource for ReaderSource<R> {
    fn extend(&mut self, size_hint: usize) -> io::Result<usize> {
        let start = self.buf.len();
        self.buf.resize(start + size_hint.max(1), 0);
        loop {
            match self.reader.read(&mut self.buf[start..]) {
                Ok(n) => {
                    self.buf.truncate(start + n);
                    return Ok(n);
                }
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => {
                    self.buf.truncate(start);
                    return Err(e);
                }
            }
        }
    }

    fn window(&self) -> &[u8] {
        &self.buf
    }

    fn release(&mut self, n: usize) {
        let n = n.min(self.buf.len());
        self.buf.copy_within(n.., 0);
        self.buf.truncate(self.buf.len() - n);
    }

    fn read_size(&self) -> usize {
        self.read_size
    }
}
