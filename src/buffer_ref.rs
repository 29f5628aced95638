use crate::error::{Result, TokenError};

/// Shifts window-relative offsets after the window's leading bytes are discarded.
///
/// Every reference still held when `n` bytes are released from a byte source
/// must be released by the same `n`, or it will resolve to the wrong bytes.
pub trait Release {
    /// Fails if releasing `n` bytes would move any offset below zero.
    fn check_release(&self, n: usize) -> Result<()>;

    /// Shifts every offset down by `n`. Nothing is shifted on failure.
    fn release(&mut self, n: usize) -> Result<()>;
}

/// Offset and length of a byte range inside an externally owned window.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct BufferRef {
    pos: usize,
    len: usize,
}

impl BufferRef {
    pub const fn new(pos: usize, len: usize) -> Self {
        Self { pos, len }
    }

    /// Zero-length reference anchored at `pos`.
    pub const fn empty_at(pos: usize) -> Self {
        Self { pos, len: 0 }
    }

    pub(crate) fn from_range(start: usize, end: usize) -> Self {
        debug_assert!(start <= end);
        Self {
            pos: start,
            len: end - start,
        }
    }

    pub const fn pos(&self) -> usize {
        self.pos
    }

    pub const fn len(&self) -> usize {
        self.len
    }

    pub const fn end(&self) -> usize {
        self.pos.saturating_add(self.len)
    }

    pub const fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Resolves the reference against `window`.
    pub fn value<'a>(&self, window: &'a [u8]) -> Result<&'a [u8]> {
        self.pos
            .checked_add(self.len)
            .and_then(|end| window.get(self.pos..end))
            .ok_or(TokenError::OutOfBounds {
                pos: self.pos,
                len: self.len,
                window: window.len(),
            })
    }
}

impl Release for BufferRef {
    fn check_release(&self, n: usize) -> Result<()> {
        if n > self.pos {
            return Err(TokenError::ReleaseOutOfRange {
                amount: n,
                pos: self.pos,
            });
        }
        Ok(())
    }

    fn release(&mut self, n: usize) -> Result<()> {
        self.check_release(n)?;
        self.pos -= n;
        Ok(())
    }
}

/// Owner of every reference retained from one window generation.
///
/// Releasing the batch shifts all of its references at once, and shifts none
/// of them if any single one would underflow.
#[derive(Debug, Clone)]
pub struct Retained<T> {
    items: Vec<T>,
}

impl<T> Default for Retained<T> {
    fn default() -> Self {
        Self { items: Vec::new() }
    }
}

impl<T: Release> Retained<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, item: T) {
        self.items.push(item);
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, T> {
        self.items.iter()
    }

    pub fn drain(&mut self) -> std::vec::Drain<'_, T> {
        self.items.drain(..)
    }

    pub fn clear(&mut self) {
        self.items.clear();
    }
}

impl<T: Release> Release for Retained<T> {
    fn check_release(&self, n: usize) -> Result<()> {
        self.items.iter().try_for_each(|item| item.check_release(n))
    }

    fn release(&mut self, n: usize) -> Result<()> {
        self.check_release(n)?;
        self.items.iter_mut().try_for_each(|item| item.release(n))
    }
}

impl<T> Extend<T> for Retained<T> {
    fn extend<I: IntoIterator<Item = T>>(&mut self, iter: I) {
        self.items.extend(iter);
    }
}

impl<T> FromIterator<T> for Retained<T> {
    fn from_iter<I: IntoIterator<Item = T>>(iter: I) -> Self {
        Self {
            items: iter.into_iter().collect(),
        }
    }
}

impl<'a, T> IntoIterator for &'a Retained<T> {
    type Item = &'a T;
    type IntoIter = std::slice::Iter<'a, T>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.iter()
    }
}
