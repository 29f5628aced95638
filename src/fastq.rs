use std::io::Read;
use std::str::Utf8Error;

use log::trace;

use crate::buffer_ref::{BufferRef, Release, Retained};
use crate::error::{Result, TokenError};
use crate::scanner::{self, Line, LineScanner};
use crate::source::{ByteSource, ReaderSource};

const ENTRY_MARKER: u8 = b'@';
const PLUS_MARKER: u8 = b'+';
const FIELD_SEPARATOR: u8 = b' ';
const SUBFIELD_SEPARATOR: u8 = b':';

/// Window offsets of one FASTQ record.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FastqRecordRef {
    /// Offset just past the quality line.
    pub end_pos: usize,
    /// First space-delimited header token, unsplit.
    pub entry_id: BufferRef,
    /// `:`-delimited parts of the token following the id.
    pub header_fields: Vec<BufferRef>,
    /// `:`-delimited parts of every token after that.
    pub extras: Vec<BufferRef>,
    pub sequence: BufferRef,
    /// Text after the `+` marker.
    pub optional: BufferRef,
    pub quality: BufferRef,
    end_of_stream: bool,
}

impl FastqRecordRef {
    fn sentinel(cursor: usize) -> Self {
        let empty = BufferRef::empty_at(cursor);
        Self {
            end_pos: cursor,
            entry_id: empty,
            header_fields: Vec::new(),
            extras: Vec::new(),
            sequence: empty,
            optional: empty,
            quality: empty,
            end_of_stream: true,
        }
    }

    /// True for the end-of-stream token only. A record whose header has an
    /// empty id is not a sentinel.
    pub fn is_sentinel(&self) -> bool {
        self.end_of_stream
    }

    /// Resolves every reference against `window`.
    pub fn value<'a>(&self, window: &'a [u8]) -> Result<FastqRecord<'a>> {
        let resolve = |refs: &[BufferRef]| -> Result<Vec<&'a [u8]>> {
            refs.iter().map(|r| r.value(window)).collect()
        };
        Ok(FastqRecord {
            entry_id: self.entry_id.value(window)?,
            header_fields: resolve(&self.header_fields)?,
            extras: resolve(&self.extras)?,
            sequence: self.sequence.value(window)?,
            optional: self.optional.value(window)?,
            quality: self.quality.value(window)?,
        })
    }

    fn refs(&self) -> impl Iterator<Item = &BufferRef> {
        [&self.entry_id, &self.sequence, &self.optional, &self.quality]
            .into_iter()
            .chain(&self.header_fields)
            .chain(&self.extras)
    }

    fn refs_mut(&mut self) -> impl Iterator<Item = &mut BufferRef> {
        [
            &mut self.entry_id,
            &mut self.sequence,
            &mut self.optional,
            &mut self.quality,
        ]
        .into_iter()
        .chain(self.header_fields.iter_mut())
        .chain(self.extras.iter_mut())
    }
}

impl Release for FastqRecordRef {
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
        for r in self.refs_mut() {
            r.release(n)?;
        }
        Ok(())
    }
}

/// A FASTQ record borrowed from one window snapshot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FastqRecord<'a> {
    pub entry_id: &'a [u8],
    pub header_fields: Vec<&'a [u8]>,
    pub extras: Vec<&'a [u8]>,
    pub sequence: &'a [u8],
    pub optional: &'a [u8],
    pub quality: &'a [u8],
}

impl<'a> FastqRecord<'a> {
    pub fn entry_id_str(&self) -> std::result::Result<&'a str, Utf8Error> {
        std::str::from_utf8(self.entry_id)
    }
}

/// Streaming FASTQ tokenizer producing [`FastqRecordRef`]s.
///
/// Records are four physical lines. A stream that ends early leaves the
/// missing fields empty rather than failing.
pub struct FastqTokenizer<S> {
    scanner: LineScanner<S>,
    check_quality: bool,
}

impl<R: Read> FastqTokenizer<ReaderSource<R>> {
    /// Creates a tokenizer reading 128 KiB at a time.
    pub fn from_reader(reader: R) -> Self {
        Self::new(ReaderSource::new(reader))
    }

    /// Creates a tokenizer reading `capacity` bytes at a time.
    pub fn with_capacity(capacity: usize, reader: R) -> Self {
        Self::new(ReaderSource::with_capacity(capacity, reader))
    }
}

impl<S: ByteSource> FastqTokenizer<S> {
    pub fn new(source: S) -> Self {
        Self {
            scanner: LineScanner::new(source),
            check_quality: false,
        }
    }

    /// Reject records whose quality line length differs from the sequence.
    ///
    /// The offending record is still consumed, so tokenizing can continue
    /// after a [`TokenError::QualityLengthMismatch`].
    pub fn with_quality_check(mut self, enabled: bool) -> Self {
        self.check_quality = enabled;
        self
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
    pub fn next_token(&mut self) -> Result<FastqRecordRef> {
        Ok(self
            .next_record()?
            .unwrap_or_else(|| FastqRecordRef::sentinel(self.scanner.cursor())))
    }

    /// Returns the next record, or `None` once the stream is exhausted.
    pub fn next_record(&mut self) -> Result<Option<FastqRecordRef>> {
        self.scanner.skip_blank_lines()?;

        let Some(header) = self.scanner.peek_line()? else {
            return Ok(None);
        };
        let window = self.scanner.window();
        let first = header.first_byte(window);
        if first != ENTRY_MARKER {
            return Err(TokenError::InvalidFormat {
                message: format!(
                    "Expected '@' at start of FASTQ record, found '{}'",
                    first as char
                ),
            });
        }

        let mut record = FastqRecordRef::default();
        parse_header(window, header.start + 1, header.end, &mut record);
        self.scanner.consume(&header);

        let sequence = self.scanner.next_line()?;
        let plus = self.scanner.next_line()?;
        let quality = self.scanner.next_line()?;

        let window = self.scanner.window();
        let cursor = self.scanner.cursor();
        record.sequence = trimmed(window, sequence, cursor);
        record.optional = match plus {
            Some(line) if line.start < line.end && window[line.start] == PLUS_MARKER => {
                trimmed(window, Some(Line { start: line.start + 1, ..line }), cursor)
            }
            other => trimmed(window, other, cursor),
        };
        record.quality = trimmed(window, quality, cursor);
        record.end_pos = cursor;

        trace!(
            "FASTQ record at {}..{} ({} bp)",
            header.start,
            record.end_pos,
            record.sequence.len()
        );

        if self.check_quality
            && quality.is_some()
            && record.quality.len() != record.sequence.len()
        {
            return Err(TokenError::QualityLengthMismatch {
                sequence: record.sequence.len(),
                quality: record.quality.len(),
            });
        }

        Ok(Some(record))
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

impl<S: ByteSource> Iterator for FastqTokenizer<S> {
    type Item = Result<FastqRecordRef>;

    fn next(&mut self) -> Option<Self::Item> {
        self.next_record().transpose()
    }
}

/// Trimmed content of `line`, or an empty reference at `cursor` if the line
/// is missing.
fn trimmed(window: &[u8], line: Option<Line>, cursor: usize) -> BufferRef {
    match line {
        Some(line) => {
            let (start, end) = scanner::trim(window, line.start, line.end);
            BufferRef::from_range(start, end)
        }
        None => BufferRef::empty_at(cursor),
    }
}

/// Fills the id, header fields and extras from a header (without the marker).
///
/// The first space-delimited token is the id. The token after it is split on
/// `:` into the header fields, and every later token into the extras.
/// Whitespace right after the marker is trimmed first, so `@ 1:N` has the id `1:N`.
fn parse_header(window: &[u8], start: usize, end: usize, record: &mut FastqRecordRef) {
    let (start, end) = scanner::trim(window, start, end);
    let mut segments = scanner::split(window, start, end, FIELD_SEPARATOR);

    let (id_start, id_end) = segments.next().unwrap_or((start, end));
    record.entry_id = BufferRef::from_range(id_start, id_end);

    let mut fields = segments.filter(|(s, e)| s < e);
    if let Some((seg_start, seg_end)) = fields.next() {
        record
            .header_fields
            .extend(subfields(window, seg_start, seg_end));
    }
    for (seg_start, seg_end) in fields {
        record.extras.extend(subfields(window, seg_start, seg_end));
    }
}

fn subfields(window: &[u8], start: usize, end: usize) -> impl Iterator<Item = BufferRef> + '_ {
    scanner::split(window, start, end, SUBFIELD_SEPARATOR)
        .filter(|(s, e)| s < e)
        .map(|(s, e)| BufferRef::from_range(s, e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn tokenize(
        data: &'static [u8],
        capacity: usize,
    ) -> FastqTokenizer<ReaderSource<Cursor<&'static [u8]>>> {
        FastqTokenizer::with_capacity(capacity, Cursor::new(data))
    }

    #[test]
    fn test_single_record() {
        let mut tok = tokenize(b"@R1 1:N:0:AA\nACGT\n+\n!!!!\n", 64);
        let r = tok.next_token().unwrap();
        let rec = r.value(tok.window()).unwrap();

        assert_eq!(rec.entry_id, b"R1");
        assert_eq!(
            rec.header_fields,
            vec![&b"1"[..], &b"N"[..], &b"0"[..], &b"AA"[..]]
        );
        assert!(rec.extras.is_empty());
        assert_eq!(rec.sequence, b"ACGT");
        assert_eq!(rec.optional, b"");
        assert_eq!(rec.quality, b"!!!!");
        assert_eq!(r.end_pos, tok.window().len());
    }

    #[test]
    fn test_colon_delimited_id() {
        let mut tok = tokenize(
            b"@M00:12::FC:1  2:N::ACGT+TT BC:Z:AAC kind\nAC\n+M00:12::FC:1\nII\n",
            64,
        );
        let r = tok.next_token().unwrap();
        let rec = r.value(tok.window()).unwrap();

        assert_eq!(rec.entry_id_str().unwrap(), "M00:12::FC:1");
        assert_eq!(
            rec.header_fields,
            vec![&b"2"[..], &b"N"[..], &b"ACGT+TT"[..]]
        );
        assert_eq!(
            rec.extras,
            vec![&b"BC"[..], &b"Z"[..], &b"AAC"[..], &b"kind"[..]]
        );
        assert_eq!(rec.optional, b"M00:12::FC:1");
    }

    #[test]
    fn test_multiple_records_and_sentinel() {
        let mut tok = tokenize(b"@read1\nACGT\n+\nIIII\n\n@read2 x\nTGCA\n+\nHHHH\n", 5);

        let r1 = tok.next_token().unwrap();
        let r2 = tok.next_token().unwrap();
        let end = tok.next_token().unwrap();
        let window = tok.window();

        assert_eq!(r1.value(window).unwrap().entry_id, b"read1");
        assert_eq!(r1.end_pos, 19);
        let rec2 = r2.value(window).unwrap();
        assert_eq!(rec2.entry_id, b"read2");
        assert_eq!(rec2.header_fields, vec![&b"x"[..]]);
        assert!(rec2.extras.is_empty());
        assert_eq!(rec2.quality, b"HHHH");
        assert!(end.is_sentinel());
        assert_eq!(end.end_pos, window.len());
    }

    #[test]
    fn test_empty_id_is_not_end_of_stream() {
        let mut tok = tokenize(b"@\nAC\n+\nII\n@r2\nGG\n+\nJJ\n", 64);

        let r1 = tok.next_token().unwrap();
        assert!(r1.entry_id.is_empty());
        assert!(!r1.is_sentinel());
        assert_eq!(r1.end_pos, 10);

        let r2 = tok.next_token().unwrap();
        assert!(!r2.is_sentinel());
        let window = tok.window();
        assert_eq!(r1.value(window).unwrap().sequence, b"AC");
        assert_eq!(r2.value(window).unwrap().entry_id, b"r2");

        assert!(tok.next_token().unwrap().is_sentinel());
    }

    #[test]
    fn test_space_after_marker_is_trimmed() {
        let mut tok = tokenize(b"@ 1:N\nAC\n+\nII\n", 64);
        let r = tok.next_token().unwrap();
        let rec = r.value(tok.window()).unwrap();
        assert_eq!(rec.entry_id, b"1:N");
        assert!(rec.header_fields.is_empty());
    }

    #[test]
    fn test_crlf_line_endings() {
        let mut tok = tokenize(b"@read1\r\nACGT\r\n+\r\nIIII\r\n", 64);
        let r = tok.next_token().unwrap();
        let rec = r.value(tok.window()).unwrap();
        assert_eq!(rec.entry_id, b"read1");
        assert_eq!(rec.sequence, b"ACGT");
        assert_eq!(rec.quality, b"IIII");
    }

    #[test]
    fn test_truncated_after_sequence() {
        let mut tok = tokenize(b"@R1\nACGT\n", 64);
        let r = tok.next_token().unwrap();
        let rec = r.value(tok.window()).unwrap();
        assert_eq!(rec.sequence, b"ACGT");
        assert!(rec.optional.is_empty());
        assert!(rec.quality.is_empty());
        assert!(tok.next_token().unwrap().is_sentinel());
    }

    #[test]
    fn test_missing_marker_is_error() {
        let mut tok = tokenize(b">R1\nACGT\n", 64);
        assert!(matches!(
            tok.next_token(),
            Err(TokenError::InvalidFormat { .. })
        ));
    }

    #[test]
    fn test_quality_length_permissive_by_default() {
        let mut tok = tokenize(b"@R1\nACGT\n+\nII\n", 64);
        let r = tok.next_token().unwrap();
        assert_eq!(r.quality.len(), 2);
    }

    #[test]
    fn test_quality_check_is_recoverable() {
        let mut tok =
            tokenize(b"@R1\nACGT\n+\nII\n@R2\nAC\n+\nII\n", 64).with_quality_check(true);
        assert!(matches!(
            tok.next_token(),
            Err(TokenError::QualityLengthMismatch { sequence: 4, quality: 2 })
        ));
        let r2 = tok.next_token().unwrap();
        assert_eq!(r2.entry_id.value(tok.window()).unwrap(), b"R2");
    }

    #[test]
    fn test_quality_check_ignores_truncation() {
        let mut tok = tokenize(b"@R1\nACGT\n+\n", 64).with_quality_check(true);
        let r = tok.next_token().unwrap();
        assert!(r.quality.is_empty());
    }

    #[test]
    fn test_release_keeps_retained_record() {
        let data = b"@a\nAC\n+\nII\n@b 1:Y\nGT\n+\nJJ\n@c\nT\n+\nK\n";
        let mut tok = tokenize(data, 4);
        let a = tok.next_token().unwrap();
        let b = tok.next_token().unwrap();
        let before = format!("{:?}", b.value(tok.window()).unwrap());

        let mut retained = Retained::new();
        retained.push(b);
        tok.release_with(a.end_pos, &mut retained).unwrap();

        let after = format!("{:?}", retained.iter().next().unwrap().value(tok.window()).unwrap());
        assert_eq!(before, after);

        let c = tok.next_token().unwrap();
        assert_eq!(c.value(tok.window()).unwrap().quality, b"K");
    }

    #[test]
    fn test_stale_reference_detected() {
        let mut tok = tokenize(b"@a\nAC\n+\nII\n@b\nGT\n+\nJJ\n", 64);
        let a = tok.next_token().unwrap();
        let b = tok.next_token().unwrap();
        tok.release(b.end_pos).unwrap();
        assert!(a.value(tok.window()).is_err());
    }
}
