//! Tagged physical memory.
//!
//! Memory is a flat byte array over a `[start, start + size)` physical window
//! plus one tag bit per capability-aligned 8-byte slot. The tag bit of a slot
//! is 1 only if the last write to that slot was a full aligned capability
//! store with a valid source capability; any partial overwrite clears it.
//!
//! All multi-byte values are little-endian:
//!
//! > Instructions are stored in memory as a sequence of 16-bit little-endian
//! > parcels, regardless of memory system endianness.

use crate::capability::CAPABILITY_SIZE_BYTES;
use bitvec::vec::BitVec;
use thiserror::Error;

/// Errors that can occur when accessing tagged memory.
#[derive(Error, Debug, Clone, Copy, Eq, PartialEq)]
pub enum MemoryError {
    /// The access touches bytes outside the physical window.
    #[error("access fault at physical address {address:#010x}")]
    AccessFault { address: u32 },
    /// The access requires natural alignment and does not have it.
    #[error("misaligned access at physical address {address:#010x}")]
    MisalignedAccess { address: u32 },
}

/// Read-modify-write operations supported by the atomic interface.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum AtomicOp {
    Swap,
    Add,
    Xor,
    And,
    Or,
    Min,
    Max,
    Minu,
    Maxu,
}

/// Byte-addressable memory with one tag bit per 8-byte capability slot.
#[derive(Debug, Clone)]
pub struct TaggedMemory {
    start: u32,
    bytes: Vec<u8>,
    tags: BitVec<u64>,
}

impl TaggedMemory {
    /// Create a zeroed memory window of `size` bytes starting at physical
    /// address `start`. Both must be multiples of the capability size so that
    /// tag slots do not straddle the window edges.
    pub fn new(start: u32, size: u32) -> Self {
        assert_eq!(0, start % CAPABILITY_SIZE_BYTES);
        assert_eq!(0, size % CAPABILITY_SIZE_BYTES);
        let mut tags = BitVec::new();
        tags.resize((size / CAPABILITY_SIZE_BYTES) as usize, false);
        Self {
            start,
            bytes: vec![0; size as usize],
            tags,
        }
    }

    /// First physical address of the window.
    pub fn start(&self) -> u32 {
        self.start
    }

    /// Size of the window in bytes.
    pub fn size(&self) -> u32 {
        self.bytes.len() as u32
    }

    /// Exclusive end of the window.
    pub fn end(&self) -> u64 {
        self.start as u64 + self.bytes.len() as u64
    }

    fn range(&self, address: u32, len: usize) -> Result<std::ops::Range<usize>, MemoryError> {
        let offset = (address as u64)
            .checked_sub(self.start as u64)
            .ok_or(MemoryError::AccessFault { address })?;
        let end = offset + len as u64;
        if end > self.bytes.len() as u64 {
            return Err(MemoryError::AccessFault { address });
        }
        Ok(offset as usize..end as usize)
    }

    fn slot(&self, address: u32) -> usize {
        ((address - self.start) / CAPABILITY_SIZE_BYTES) as usize
    }

    /// Read `buf.len()` bytes starting at `address`. Sub-word alignment is
    /// permitted.
    pub fn load(&self, address: u32, buf: &mut [u8]) -> Result<(), MemoryError> {
        let range = self.range(address, buf.len())?;
        buf.copy_from_slice(&self.bytes[range]);
        Ok(())
    }

    /// Write `buf` starting at `address`, clearing the tags of every 8-byte
    /// slot the write overlaps. Sub-word alignment is permitted.
    pub fn store(&mut self, address: u32, buf: &[u8]) -> Result<(), MemoryError> {
        let range = self.range(address, buf.len())?;
        self.bytes[range].copy_from_slice(buf);
        if !buf.is_empty() {
            let first = self.slot(address & !(CAPABILITY_SIZE_BYTES - 1));
            let last = self.slot((address + buf.len() as u32 - 1) & !(CAPABILITY_SIZE_BYTES - 1));
            for slot in first..=last {
                self.tags.set(slot, false);
            }
        }
        Ok(())
    }

    /// Read the tag bits for `tags.len()` consecutive capability slots
    /// starting at the slot containing `address`. The address must be
    /// capability aligned.
    pub fn load_tags(&self, address: u32, tags: &mut [bool]) -> Result<(), MemoryError> {
        if address % CAPABILITY_SIZE_BYTES != 0 {
            return Err(MemoryError::MisalignedAccess { address });
        }
        self.range(address, tags.len() * CAPABILITY_SIZE_BYTES as usize)?;
        let first = self.slot(address);
        for (i, tag) in tags.iter_mut().enumerate() {
            *tag = self.tags[first + i];
        }
        Ok(())
    }

    /// Load one capability slot: the 64-bit memory image and its tag.
    /// The address must be capability aligned.
    pub fn load_capability(&self, address: u32) -> Result<(u64, bool), MemoryError> {
        if address % CAPABILITY_SIZE_BYTES != 0 {
            return Err(MemoryError::MisalignedAccess { address });
        }
        let mut buf = [0u8; CAPABILITY_SIZE_BYTES as usize];
        self.load(address, &mut buf)?;
        Ok((u64::from_le_bytes(buf), self.tags[self.slot(address)]))
    }

    /// Store one capability slot: the 64-bit memory image, with the source
    /// capability's tag. The address must be capability aligned. This is the
    /// only way a slot's tag becomes 1.
    pub fn store_capability(&mut self, address: u32, bits: u64, tag: bool) -> Result<(), MemoryError> {
        if address % CAPABILITY_SIZE_BYTES != 0 {
            return Err(MemoryError::MisalignedAccess { address });
        }
        let range = self.range(address, CAPABILITY_SIZE_BYTES as usize)?;
        self.bytes[range].copy_from_slice(&bits.to_le_bytes());
        let slot = self.slot(address);
        self.tags.set(slot, tag);
        Ok(())
    }

    /// Word-sized read-modify-write. Returns the value read. The address must
    /// be word aligned. The written slot's tag is cleared like any data
    /// store.
    pub fn atomic_rmw(&mut self, address: u32, op: AtomicOp, value: u32) -> Result<u32, MemoryError> {
        if address % 4 != 0 {
            return Err(MemoryError::MisalignedAccess { address });
        }
        let mut buf = [0u8; 4];
        self.load(address, &mut buf)?;
        let old = u32::from_le_bytes(buf);
        let new = match op {
            AtomicOp::Swap => value,
            AtomicOp::Add => old.wrapping_add(value),
            AtomicOp::Xor => old ^ value,
            AtomicOp::And => old & value,
            AtomicOp::Or => old | value,
            AtomicOp::Min => (old as i32).min(value as i32) as u32,
            AtomicOp::Max => (old as i32).max(value as i32) as u32,
            AtomicOp::Minu => old.min(value),
            AtomicOp::Maxu => old.max(value),
        };
        self.store(address, &new.to_le_bytes())?;
        Ok(old)
    }

    /// Zero a byte range and clear its tags. Used at reset.
    pub fn clear(&mut self, address: u32, len: u32) -> Result<(), MemoryError> {
        let range = self.range(address, len as usize)?;
        self.bytes[range].fill(0);
        if len > 0 {
            let first = self.slot(address & !(CAPABILITY_SIZE_BYTES - 1));
            let last = self.slot((address + len - 1) & !(CAPABILITY_SIZE_BYTES - 1));
            for slot in first..=last {
                self.tags.set(slot, false);
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn memory() -> TaggedMemory {
        TaggedMemory::new(0x8000_0000, 0x1_0000)
    }

    #[test]
    fn test_load_store_round_trip() {
        let mut mem = memory();
        mem.store(0x8000_0123, &0xDEAD_BEEFu32.to_le_bytes()).unwrap();
        let mut buf = [0u8; 4];
        mem.load(0x8000_0123, &mut buf).unwrap();
        assert_eq!(0xDEAD_BEEF, u32::from_le_bytes(buf));
    }

    #[test]
    fn test_out_of_window_is_access_fault() {
        let mut mem = memory();
        let mut buf = [0u8; 4];
        assert_eq!(
            Err(MemoryError::AccessFault { address: 0x7FFF_FFFF }),
            mem.load(0x7FFF_FFFF, &mut buf)
        );
        assert_eq!(
            Err(MemoryError::AccessFault { address: 0x8000_FFFE }),
            mem.store(0x8000_FFFE, &[0; 4])
        );
    }

    #[test]
    fn test_capability_store_sets_tag() {
        let mut mem = memory();
        mem.store_capability(0x8000_0100, 0x0123_4567_89AB_CDEF, true)
            .unwrap();
        assert_eq!(
            (0x0123_4567_89AB_CDEF, true),
            mem.load_capability(0x8000_0100).unwrap()
        );
        let mut tags = [false];
        mem.load_tags(0x8000_0100, &mut tags).unwrap();
        assert!(tags[0]);
    }

    #[test]
    fn test_byte_store_clears_tag() {
        let mut mem = memory();
        mem.store_capability(0x8000_0100, 1, true).unwrap();
        mem.store(0x8000_0103, &[0xFF]).unwrap();
        let (_, tag) = mem.load_capability(0x8000_0100).unwrap();
        assert!(!tag);
    }

    #[test]
    fn test_straddling_store_clears_both_tags() {
        let mut mem = memory();
        mem.store_capability(0x8000_0100, 1, true).unwrap();
        mem.store_capability(0x8000_0108, 2, true).unwrap();
        mem.store(0x8000_0106, &[0u8; 4]).unwrap();
        let mut tags = [true; 2];
        mem.load_tags(0x8000_0100, &mut tags).unwrap();
        assert_eq!([false, false], tags);
    }

    #[test]
    fn test_untagged_capability_store_clears_tag() {
        let mut mem = memory();
        mem.store_capability(0x8000_0100, 1, true).unwrap();
        mem.store_capability(0x8000_0100, 2, false).unwrap();
        assert_eq!((2, false), mem.load_capability(0x8000_0100).unwrap());
    }

    #[test]
    fn test_misaligned_capability_access() {
        let mut mem = memory();
        assert_eq!(
            Err(MemoryError::MisalignedAccess { address: 0x8000_0104 }),
            mem.load_capability(0x8000_0104).map(|_| ())
        );
        assert_eq!(
            Err(MemoryError::MisalignedAccess { address: 0x8000_0101 }),
            mem.store_capability(0x8000_0101, 0, false)
        );
    }

    #[test]
    fn test_atomic_rmw() {
        let mut mem = memory();
        mem.store(0x8000_0200, &10u32.to_le_bytes()).unwrap();
        assert_eq!(10, mem.atomic_rmw(0x8000_0200, AtomicOp::Add, 5).unwrap());
        let mut buf = [0u8; 4];
        mem.load(0x8000_0200, &mut buf).unwrap();
        assert_eq!(15, u32::from_le_bytes(buf));
        assert_eq!(15, mem.atomic_rmw(0x8000_0200, AtomicOp::Min, -1i32 as u32).unwrap());
        mem.load(0x8000_0200, &mut buf).unwrap();
        assert_eq!(-1i32 as u32, u32::from_le_bytes(buf));
    }

    #[test]
    fn test_clear_resets_tags() {
        let mut mem = memory();
        mem.store_capability(0x8000_0100, 1, true).unwrap();
        mem.clear(0x8000_0100, 8).unwrap();
        assert_eq!((0, false), mem.load_capability(0x8000_0100).unwrap());
    }
}
