use std::borrow::Cow;
use std::io::Read;
use std::str::Utf8Error;

use log::trace;
use memchr::memchr;

use crate::buffer_ref::{BufferRef, Release, Retained};
use crate::error::{Result, TokenError};
use crate::scanner::{self, LineScanner};
use crate::source::{ByteSource, ReaderSource};

const ENTRY_MARKER: u8 = b'>';
const FIELD_SEPARATOR: u8 = b'|';
const ID_SEPARATOR: u8 = b' ';

/// Window offsets of one FASTA record.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FastaRecordRef {
    /// Offset just past the record; releasing this many bytes discards it.
    pub end_pos: usize,
    pub entry_id: BufferRef,
    pub fields: Vec<BufferRef>,
    /// Sequence lines as one span, trimmed at both ends. Interior line
    /// breaks are kept.
    pub sequence: BufferRef,
    end_of_stream: bool,
}

impl FastaRecordRef {
    fn sentinel(cursor: usize) -> Self {
        Self {
            end_pos: cursor,
            entry_id: BufferRef::empty_at(cursor),
            fields: Vec::new(),
            sequence: BufferRef::empty_at(cursor),
            end_of_stream: true,
        }
    }

    /// True for the end-of-stream token only. A record whose header has an
    /// empty id is not a sentinel.
    pub fn is_sentinel(&self) -> bool {
        self.end_of_stream
    }

    /// Resolves every reference against `window`.
    pub fn value<'a>(&self, window: &'a [u8]) -> Result<FastaRecord<'a>> {
        Ok(FastaRecord {
            entry_id: self.entry_id.value(window)?,
            fields: self
                .fields
                .iter()
                .map(|f| f.value(window))
                .collect::<Result<_>>()?,
            sequence: self.sequence.value(window)?,
        })
    }

    fn refs(&self) -> impl Iterator<Item = &BufferRef> {
        std::iter::once(&self.entry_id)
            .chain(&self.fields)
            .chain(std::iter::once(&self.sequence))
    }
}

impl Release for FastaRecordRef {
    fn check_release(&self, n: usize) -> Result<()> {
        if n > self.end_pos {
            return Err(TokenError::ReleaseOutOfRange {
                amount: n,
                pos: self.end_pos,
            });
        }
        self.refs().try_for_each(|r| r.check_release(n))
    }

    fn release(&mut self, n: usize) -> Result<()> {
        self.check_release(n)?;
        self.end_pos -= n;
        self.entry_id.release(n)?;
        for f in &mut self.fields {
            f.release(n)?;
        }
        self.sequence.release(n)
    }
}

/// A FASTA record borrowed from one window snapshot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FastaRecord<'a> {
    pub entry_id: &'a [u8],
    pub fields: Vec<&'a [u8]>,
    pub sequence: &'a [u8],
}

impl<'a> FastaRecord<'a> {
    pub fn entry_id_str(&self) -> std::result::Result<&'a str, Utf8Error> {
        std::str::from_utf8(self.entry_id)
    }

    /// Sequence with line breaks and other whitespace removed.
    pub fn seq_bases(&self) -> Cow<'a, [u8]> {
        if self.sequence.iter().any(u8::is_ascii_whitespace) {
            Cow::Owned(
                self.sequence
                    .iter()
                    .copied()
                    .filter(|b| !b.is_ascii_whitespace())
                    .collect(),
            )
        } else {
            Cow::Borrowed(self.sequence)
        }
    }
}

/// Streaming FASTA tokenizer producing [`FastaRecordRef`]s.
pub struct FastaTokenizer<S> {
    scanner: LineScanner<S>,
    primed: bool,
}

impl<R: Read> FastaTokenizer<ReaderSource<R>> {
    /// Creates a tokenizer reading 128 KiB at a time.
    pub fn from_reader(reader: R) -> Self {
        Self::new(ReaderSource::new(reader))
    }

    /// Creates a tokenizer reading `capacity` bytes at a time.
    pub fn with_capacity(capacity: usize, reader: R) -> Self {
        Self::new(ReaderSource::with_capacity(capacity, reader))
    }
}

impl<S: ByteSource> FastaTokenizer<S> {
    pub fn new(source: S) -> Self {
        Self {
            scanner: LineScanner::new(source),
            primed: false,
        }
    }

    /// Current window of the underlying source.
    pub fn window(&self) -> &[u8] {
        self.scanner.window()
    }

    pub fn cursor(&self) -> usize {
        self.scanner.cursor()
    }

    pub fn into_inner(self) -> S {
        self.scanner.into_inner()
    }

    /// Returns the next record, or a sentinel with an empty `entry_id` once
    /// the stream is exhausted.
    pub fn next_token(&mut self) -> Result<FastaRecordRef> {
        Ok(self
            .next_record()?
            .unwrap_or_else(|| FastaRecordRef::sentinel(self.scanner.cursor())))
    }

    /// Returns the next record, or `None` once the stream is exhausted.
    pub fn next_record(&mut self) -> Result<Option<FastaRecordRef>> {
        if !self.primed {
            self.scanner.skip_blank_lines()?;
            self.primed = true;
        }

        let Some(header) = self.scanner.peek_line()? else {
            return Ok(None);
        };
        let window = self.scanner.window();
        let first = header.first_byte(window);
        if first != ENTRY_MARKER {
            return Err(TokenError::InvalidFormat {
                message: format!(
                    "Expected '>' at start of FASTA record, found '{}'",
                    first as char
                ),
            });
        }

        let (entry_id, fields) = parse_header(window, header.start + 1, header.end);
        self.scanner.consume(&header);

        let sequence = self.scan_sequence()?;
        let end_pos = self.scanner.cursor();
        trace!(
            "FASTA record at {}..{} with {} fields",
            header.start,
            end_pos,
            fields.len()
        );

        Ok(Some(FastaRecordRef {
            end_pos,
            entry_id,
            fields,
            sequence,
            end_of_stream: false,
        }))
    }

    fn scan_sequence(&mut self) -> Result<BufferRef> {
        let mut span: Option<(usize, usize)> = None;
        while let Some(line) = self.scanner.peek_line()? {
            if line.first_byte(self.scanner.window()) == ENTRY_MARKER {
                break;
            }
            span = Some(match span {
                Some((start, _)) => (start, line.end),
                None => (line.start, line.end),
            });
            self.scanner.consume(&line);
        }

        Ok(match span {
            Some((start, end)) => {
                let (start, end) = scanner::trim(self.scanner.window(), start, end);
                BufferRef::from_range(start, end)
            }
            None => BufferRef::empty_at(self.scanner.cursor()),
        })
    }

    /// Discards `n` consumed bytes from the source and shifts the cursor.
    pub fn release(&mut self, n: usize) -> Result<()> {
        self.scanner.release(n)
    }

    /// Releases `n` bytes from the tokenizer and every retained reference,
    /// or from none of them if any would underflow.
    pub fn release_with<T: Release>(
        &mut self,
        n: usize,
        retained: &mut Retained<T>,
    ) -> Result<()> {
        self.scanner.check_release(n)?;
        retained.release(n)?;
        self.scanner.release(n)
    }
}

impl<S: ByteSource> Iterator for FastaTokenizer<S> {
    type Item = Result<FastaRecordRef>;

    fn next(&mut self) -> Option<Self::Item> {
        self.next_record().transpose()
    }
}

/// Splits a header (without the marker) into the entry id and its fields.
fn parse_header(window: &[u8], start: usize, end: usize) -> (BufferRef, Vec<BufferRef>) {
    let end = scanner::trim_end(window, start, end);
    let mut segments = scanner::split(window, start, end, FIELD_SEPARATOR);
    let mut fields = Vec::new();

    // `split` always yields at least one segment.
    let (first_start, first_end) = segments.next().unwrap_or((start, end));
    let entry_id = match memchr(ID_SEPARATOR, &window[first_start..first_end]) {
        Some(i) => {
            let space = first_start + i;
            let desc_start = scanner::trim_start(window, space + 1, first_end);
            if desc_start < first_end {
                fields.push(BufferRef::from_range(desc_start, first_end));
            }
            BufferRef::from_range(first_start, space)
        }
        None => BufferRef::from_range(first_start, first_end),
    };

    fields.extend(
        segments
            .filter(|(s, e)| s < e)
            .map(|(s, e)| BufferRef::from_range(s, e)),
    );
    (entry_id, fields)
}
