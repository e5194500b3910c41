//! Bounded, offset-addressed access to a guest's linear memory.

use std::fmt;

/// A borrowed view of a guest's linear memory.
///
/// Transfers never fault: they copy as many bytes as fit between the offset
/// and the end of memory and report the count, so callers can tell a short
/// transfer from a complete one.
pub struct GuestMemory<'a> {
    bytes: &'a mut [u8],
}

impl<'a> GuestMemory<'a> {
    pub fn new(bytes: &'a mut [u8]) -> Self {
        Self { bytes }
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Copy bytes starting at `offset` into `buf`.  Returns the number of
    /// bytes copied.
    pub fn read_at(&self, buf: &mut [u8], offset: u32) -> usize {
        let Some(src) = self.window(offset, buf.len()) else {
            return 0;
        };
        let n = src.len();
        buf[..n].copy_from_slice(&self.bytes[src]);
        n
    }

    /// Copy `buf` into memory starting at `offset`.  Returns the number of
    /// bytes written.
    pub fn write_at(&mut self, buf: &[u8], offset: u32) -> usize {
        let Some(dst) = self.window(offset, buf.len()) else {
            return 0;
        };
        let n = dst.len();
        self.bytes[dst].copy_from_slice(&buf[..n]);
        n
    }

    /// Read exactly `len` bytes, or `None` if the range leaves memory.
    /// Nothing is allocated for a range that does not fit.
    pub fn read_exact(&self, offset: u32, len: u32) -> Option<Vec<u8>> {
        let len = usize::try_from(len).ok()?;
        if len == 0 {
            return Some(Vec::new());
        }
        let range = self.window(offset, len)?;
        (range.len() == len).then(|| self.bytes[range].to_vec())
    }

    pub fn read_u64(&self, offset: u32) -> Option<u64> {
        let mut buf = [0u8; 8];
        (self.read_at(&mut buf, offset) == 8).then(|| u64::from_le_bytes(buf))
    }

    /// Store a little-endian `u64`.  Returns `false` if the slot does not fit.
    pub fn write_u64(&mut self, offset: u32, value: u64) -> bool {
        let buf = value.to_le_bytes();
        if self.window(offset, buf.len()).map(|r| r.len()) != Some(buf.len()) {
            return false;
        }
        self.write_at(&buf, offset) == buf.len()
    }

    fn window(&self, offset: u32, len: usize) -> Option<std::ops::Range<usize>> {
        let start = usize::try_from(offset).ok()?;
        if start >= self.bytes.len() {
            return None;
        }
        let end = start.saturating_add(len).min(self.bytes.len());
        Some(start..end)
    }
}

impl fmt::Debug for GuestMemory<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GuestMemory")
            .field("len", &self.bytes.len())
            .finish()
    }
}
