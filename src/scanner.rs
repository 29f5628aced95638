use log::{debug, trace};
use memchr::{memchr, memchr_iter};

use crate::error::{Result, TokenError};
use crate::source::ByteSource;

/// One complete physical line in the window.
///
/// `start..end` is the content without the line terminator (`\n` or `\r\n`);
/// `next` is the offset just past the terminator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Line {
    pub start: usize,
    pub end: usize,
    pub next: usize,
}

impl Line {
    fn new(window: &[u8], start: usize, newline: usize, next: usize) -> Self {
        let end = if newline > start && window[newline - 1] == b'\r' {
            newline - 1
        } else {
            newline
        };
        Self { start, end, next }
    }

    pub fn first_byte(&self, window: &[u8]) -> u8 {
        window[self.start]
    }

    pub fn is_blank(&self, window: &[u8]) -> bool {
        window[self.start..self.end]
            .iter()
            .all(u8::is_ascii_whitespace)
    }
}

/// Line-oriented cursor over a [`ByteSource`], shared by both tokenizers.
///
/// Only complete lines are handed out: the window is extended until a newline
/// follows the cursor or the source is exhausted.
pub(crate) struct LineScanner<S> {
    source: S,
    cursor: usize,
    exhausted: bool,
}

impl<S: ByteSource> LineScanner<S> {
    pub fn new(source: S) -> Self {
        Self {
            source,
            cursor: 0,
            exhausted: false,
        }
    }

    pub fn cursor(&self) -> usize {
        self.cursor
    }

    pub fn window(&self) -> &[u8] {
        self.source.window()
    }

    pub fn into_inner(self) -> S {
        self.source
    }

    fn fill(&mut self) -> Result<bool> {
        if self.exhausted {
            return Ok(false);
        }
        let n = self.source.extend(self.source.read_size())?;
        if n == 0 {
            debug!(
                "byte source exhausted with {} bytes buffered",
                self.source.window().len()
            );
            self.exhausted = true;
        }
        Ok(n > 0)
    }

    /// Returns the line at the cursor, or `None` at end of stream.
    pub fn peek_line(&mut self) -> Result<Option<Line>> {
        let mut search_from = self.cursor;
        loop {
            let window = self.source.window();
            if let Some(i) = memchr(b'\n', &window[search_from..]) {
                let newline = search_from + i;
                return Ok(Some(Line::new(window, self.cursor, newline, newline + 1)));
            }
            search_from = window.len();

            if !self.fill()? {
                let window = self.source.window();
                if self.cursor >= window.len() {
                    return Ok(None);
                }
                // Final line without a terminator.
                let len = window.len();
                return Ok(Some(Line::new(window, self.cursor, len, len)));
            }
        }
    }

    pub fn consume(&mut self, line: &Line) {
        debug_assert_eq!(line.start, self.cursor);
        self.cursor = line.next;
    }

    /// Returns the line at the cursor and advances past it.
    pub fn next_line(&mut self) -> Result<Option<Line>> {
        let line = self.peek_line()?;
        if let Some(line) = &line {
            self.consume(line);
        }
        Ok(line)
    }

    pub fn skip_blank_lines(&mut self) -> Result<()> {
        while let Some(line) = self.peek_line()? {
            if !line.is_blank(self.source.window()) {
                break;
            }
            self.consume(&line);
        }
        Ok(())
    }

    /// Discards `n` consumed bytes from the source and shifts the cursor.
    pub fn release(&mut self, n: usize) -> Result<()> {
        self.check_release(n)?;
        self.source.release(n);
        self.cursor -= n;
        trace!("released {} bytes, cursor now at {}", n, self.cursor);
        Ok(())
    }

    pub fn check_release(&self, n: usize) -> Result<()> {
        if n > self.cursor {
            return Err(TokenError::ReleaseOutOfRange {
                amount: n,
                pos: self.cursor,
            });
        }
        Ok(())
    }
}

pub(crate) fn trim_start(window: &[u8], mut start: usize, end: usize) -> usize {
    while start < end && window[start].is_ascii_whitespace() {
        start += 1;
    }
    start
}

pub(crate) fn trim_end(window: &[u8], start: usize, mut end: usize) -> usize {
    while end > start && window[end - 1].is_ascii_whitespace() {
        end -= 1;
    }
    end
}

pub(crate) fn trim(window: &[u8], start: usize, end: usize) -> (usize, usize) {
    let start = trim_start(window, start, end);
    (start, trim_end(window, start, end))
}

/// Splits `window[start..end]` on `sep`, yielding absolute `(start, end)` ranges.
/// Empty segments are included.
pub(crate) fn split(
    window: &[u8],
    start: usize,
    end: usize,
    sep: u8,
) -> impl Iterator<Item = (usize, usize)> + '_ {
    let mut seg_start = start;
    memchr_iter(sep, &window[start..end])
        .map(move |i| start + i)
        .chain(std::iter::once(end))
        .map(move |seg_end| {
            let seg = (seg_start, seg_end);
            seg_start = seg_end + 1;
            seg
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::ReaderSource;
    use std::io::Cursor;

    fn scanner(
        data: &'static [u8],
        capacity: usize,
    ) -> LineScanner<ReaderSource<Cursor<&'static [u8]>>> {
        LineScanner::new(ReaderSource::with_capacity(capacity, Cursor::new(data)))
    }

    fn text(scanner: &LineScanner<impl ByteSource>, line: &Line) -> Vec<u8> {
        scanner.window()[line.start..line.end].to_vec()
    }

    #[test]
    fn test_lines_across_small_reads() {
        let mut s = scanner(b"ACGT\nTG\r\nCA", 2);

        let line = s.next_line().unwrap().unwrap();
        assert_eq!(text(&s, &line), b"ACGT");
        let line = s.next_line().unwrap().unwrap();
        assert_eq!(text(&s, &line), b"TG");
        assert_eq!(line.next, 9);
        let line = s.next_line().unwrap().unwrap();
        assert_eq!(text(&s, &line), b"CA");
        assert!(s.next_line().unwrap().is_none());
        assert_eq!(s.cursor(), 11);
    }

    #[test]
    fn test_peek_does_not_advance() {
        let mut s = scanner(b"AC\nGT\n", 64);
        let a = s.peek_line().unwrap().unwrap();
        let b = s.peek_line().unwrap().unwrap();
        assert_eq!(a, b);
        assert_eq!(s.cursor(), 0);
    }

    #[test]
    fn test_skip_blank_lines() {
        let mut s = scanner(b"\n  \r\n\t\n>id\n", 3);
        s.skip_blank_lines().unwrap();
        let line = s.peek_line().unwrap().unwrap();
        assert_eq!(text(&s, &line), b">id");
    }

    #[test]
    fn test_release_moves_cursor() {
        let mut s = scanner(b"AC\nGT\n", 64);
        s.next_line().unwrap();
        assert!(s.release(4).is_err());
        s.release(3).unwrap();
        assert_eq!(s.cursor(), 0);
        let line = s.next_line().unwrap().unwrap();
        assert_eq!(text(&s, &line), b"GT");
    }

    #[test]
    fn test_split_keeps_empty_segments() {
        let data = b"xa||b|";
        let parts: Vec<_> = split(data, 1, data.len(), b'|').collect();
        assert_eq!(parts, vec![(1, 2), (3, 3), (4, 5), (6, 6)]);
    }

    #[test]
    fn test_trim() {
        let data = b"  AC GT \r";
        assert_eq!(trim(data, 0, data.len()), (2, 7));
        assert_eq!(trim(b"   ", 0, 3), (3, 3));
    }
}
