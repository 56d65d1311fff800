//! Dynamic byte string consumed by the raw string encoding and the
//! container facades.
//!
//! The header lives inline in the owner; only the byte buffer is heap
//! allocated, so [`Sds::alloc_size`] reports the heap part alone.

use std::borrow::Borrow;
use std::fmt;

/// Growable, binary-safe byte string.
#[derive(Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Sds {
    buf: Vec<u8>,
}

impl Sds {
    /// New string holding a copy of `bytes`, sized exactly.
    pub fn new(bytes: &[u8]) -> Self {
        Self {
            buf: bytes.to_vec(),
        }
    }

    /// Render `value` in decimal.
    pub fn from_i64(value: i64) -> Self {
        let mut buf = [0u8; 21];
        let len = crate::util::i64_to_bytes(&mut buf, value);
        Self::new(&buf[..len])
    }

    /// Length in bytes.
    pub fn len(&self) -> usize {
        self.buf.len()
    }

    /// `true` when the string holds no bytes.
    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    /// Unused capacity at the end of the buffer.
    pub fn avail(&self) -> usize {
        self.buf.capacity() - self.buf.len()
    }

    /// Heap bytes held by the buffer, used and unused.
    pub fn alloc_size(&self) -> usize {
        self.buf.capacity()
    }

    /// Grow the buffer so at least `additional` further bytes fit without
    /// reallocation.
    pub fn reserve(&mut self, additional: usize) {
        self.buf.reserve(additional);
    }

    /// Append a copy of `bytes`.
    pub fn append(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    /// Reallocate the buffer to exact length, dropping spare capacity.
    pub fn remove_free_space(&mut self) {
        self.buf.shrink_to_fit();
    }

    /// View of the byte contents.
    pub fn as_bytes(&self) -> &[u8] {
        &self.buf
    }
}

impl From<&[u8]> for Sds {
    fn from(bytes: &[u8]) -> Self {
        Self::new(bytes)
    }
}

impl Borrow<[u8]> for Sds {
    fn borrow(&self) -> &[u8] {
        &self.buf
    }
}

impl fmt::Debug for Sds {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Sds({:?})", String::from_utf8_lossy(&self.buf))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_string_has_no_spare_capacity() {
        let s = Sds::new(b"hello");
        assert_eq!(s.len(), 5);
        assert_eq!(s.avail(), 0);
        assert_eq!(s.alloc_size(), 5);
    }

    #[test]
    fn remove_free_space_drops_reserved_bytes() {
        let mut s = Sds::new(b"hello");
        s.reserve(64);
        assert!(s.avail() >= 64);
        s.remove_free_space();
        assert_eq!(s.avail(), 0);
    }

    #[test]
    fn from_i64_renders_decimal() {
        assert_eq!(Sds::from_i64(-42).as_bytes(), b"-42");
        assert_eq!(Sds::from_i64(i64::MIN).as_bytes(), b"-9223372036854775808");
    }
}
