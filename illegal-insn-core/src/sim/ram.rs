use crate::registers::X;
use crate::Alignment;

/// Byte-based little-endian RAM, mapped at a fixed base address.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct Ram {
    base: X,
    data: Vec<u8>,
}

impl Ram {
    /// Create a new zero-initialized RAM resource that holds `size` bytes starting at `base`.
    ///
    /// Returns `None` if `size` is zero or the region would wrap around the address space.
    pub fn new(base: X, size: usize) -> Option<Self> {
        if size == 0 {
            return None;
        }
        let last = X::try_from(size - 1).ok()?;
        base.checked_add(last)?;
        Some(Self {
            base,
            data: vec![0; size],
        })
    }

    pub fn base(&self) -> X {
        self.base
    }

    /// Returns the size expressed in bytes. Guaranteed to be at least one.
    #[allow(clippy::len_without_is_empty)]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Returns `true` if all `size` bytes starting at `address` are backed by this RAM.
    pub fn contains(&self, address: X, size: usize) -> bool {
        self.offset(address, size).is_some()
    }

    /// Reads a little-endian word. Returns `None` if any byte falls outside of the RAM.
    ///
    /// The address need not be aligned; callers that require alignment check it themselves.
    pub fn read_word(&self, address: X) -> Option<u32> {
        let offset = self.offset(address, 4)?;
        let bytes = self.data[offset..offset + 4].try_into().ok()?;
        Some(u32::from_le_bytes(bytes))
    }

    /// Reads a little-endian halfword. Returns `None` if any byte falls outside of the RAM.
    pub fn read_halfword(&self, address: X) -> Option<u16> {
        let offset = self.offset(address, 2)?;
        let bytes = self.data[offset..offset + 2].try_into().ok()?;
        Some(u16::from_le_bytes(bytes))
    }

    /// Writes a little-endian word. Returns `None`, writing nothing, if any byte falls outside of
    /// the RAM.
    pub fn write_word(&mut self, address: X, value: u32) -> Option<()> {
        let offset = self.offset(address, 4)?;
        self.data[offset..offset + 4].copy_from_slice(&value.to_le_bytes());
        Some(())
    }

    /// Copies `buf` into RAM starting at `address`. Returns `None`, writing nothing, if it doesn't
    /// fit.
    pub fn load(&mut self, address: X, buf: &[u8]) -> Option<()> {
        let offset = self.offset(address, buf.len())?;
        self.data[offset..offset + buf.len()].copy_from_slice(buf);
        Some(())
    }

    fn offset(&self, address: X, size: usize) -> Option<usize> {
        let offset = usize::try_from(address.checked_sub(self.base)?).ok()?;
        (offset.checked_add(size)? <= self.data.len()).then_some(offset)
    }
}

/// Returns `true` if `address` is naturally aligned for a word access.
pub fn is_word_aligned(address: X) -> bool {
    Alignment::WORD.is_aligned(address as u32)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new() {
        assert_eq!(None, Ram::new(0x1000, 0));
        assert_eq!(None, Ram::new(X::MAX, 2));
        let ram = Ram::new(X::MAX, 1).unwrap();
        assert_eq!(1, ram.len());
    }

    #[test]
    fn test_bounds() {
        let mut ram = Ram::new(0x1000, 8).unwrap();
        assert!(ram.contains(0x1000, 8));
        assert!(!ram.contains(0x1000, 9));
        assert!(!ram.contains(0x0FFF, 1));
        assert_eq!(Some(()), ram.write_word(0x1004, 0xDEAD_BEEF));
        assert_eq!(None, ram.write_word(0x1005, 0));
        assert_eq!(Some(0xDEAD_BEEF), ram.read_word(0x1004));
        assert_eq!(Some(0xBEEF), ram.read_halfword(0x1004));
        assert_eq!(Some(0xDEAD), ram.read_halfword(0x1006));
        assert_eq!(None, ram.read_halfword(0x1007));
    }

    #[test]
    fn test_load() {
        let mut ram = Ram::new(0, 4).unwrap();
        assert_eq!(Some(()), ram.load(1, &[0xAA, 0xBB]));
        assert_eq!(Some(0x00BB_AA00), ram.read_word(0));
        assert_eq!(None, ram.load(3, &[1, 2]));
    }

    #[test]
    fn test_word_alignment() {
        assert!(is_word_aligned(0x8000_0004));
        assert!(!is_word_aligned(0x8000_0002));
    }
}
