#![forbid(unsafe_code)]
//! On-disk metadata for FlatFS.
//!
//! The metadata block (block 0) is 1024 bytes: a 16-byte free-space bitmap
//! followed by 126 packed 8-byte records. [`Record`] is the codec for one
//! slot, [`Superblock`] the codec for the whole block, and
//! [`check_consistency`] the six-rule validator that gates mounting.

mod check;
mod record;

pub use check::{check_consistency, ConsistencyError};
pub use record::Record;

use flatfs_types::{Block, BlockIndex, BITMAP_LEN, BLOCK_SIZE, RECORD_COUNT, RECORD_SIZE};

/// Decoded metadata block: free-space bitmap plus the record table.
///
/// The encoding is byte-exact and position-stable; `parse` and `to_bytes`
/// round-trip every image, consistent or not.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Superblock {
    /// Free-space bitmap, bit `i` = block `i`, 1 = used, MSB-first within
    /// each byte.
    pub free_block_list: [u8; BITMAP_LEN],
    /// Record table, one slot per position 0–125.
    pub records: [Record; RECORD_COUNT],
}

impl Superblock {
    /// Decode a raw metadata block.
    #[must_use]
    pub fn parse(bytes: &Block) -> Self {
        let mut free_block_list = [0u8; BITMAP_LEN];
        free_block_list.copy_from_slice(&bytes[..BITMAP_LEN]);

        let mut records = [Record::zeroed(); RECORD_COUNT];
        for (i, record) in records.iter_mut().enumerate() {
            let offset = BITMAP_LEN + i * RECORD_SIZE;
            let mut raw = [0u8; RECORD_SIZE];
            raw.copy_from_slice(&bytes[offset..offset + RECORD_SIZE]);
            *record = Record::from_bytes(raw);
        }

        Self {
            free_block_list,
            records,
        }
    }

    /// Encode back to the on-disk representation.
    #[must_use]
    pub fn to_bytes(&self) -> Block {
        let mut bytes = [0u8; BLOCK_SIZE];
        bytes[..BITMAP_LEN].copy_from_slice(&self.free_block_list);
        for (i, record) in self.records.iter().enumerate() {
            let offset = BITMAP_LEN + i * RECORD_SIZE;
            bytes[offset..offset + RECORD_SIZE].copy_from_slice(record.as_bytes());
        }
        bytes
    }

    /// A freshly formatted metadata block: every record free, every data
    /// block free, only the metadata block itself marked used.
    #[must_use]
    pub fn new_empty() -> Self {
        let mut sb = Self {
            free_block_list: [0u8; BITMAP_LEN],
            records: [Record::zeroed(); RECORD_COUNT],
        };
        flatfs_alloc::set_used(&mut sb.free_block_list, BlockIndex::METADATA, true);
        sb
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_empty_is_consistent_and_minimal() {
        let sb = Superblock::new_empty();
        assert!(check_consistency(&sb).is_ok());
        assert_eq!(sb.free_block_list[0], 0x80);
        assert!(sb.records.iter().all(Record::is_zeroed));
    }

    #[test]
    fn parse_round_trips_a_crafted_image() {
        let mut sb = Superblock::new_empty();
        let rec = &mut sb.records[4];
        rec.set_used(true);
        rec.set_name("notes");
        rec.set_size_blocks(2);
        rec.set_start_block(BlockIndex(10));
        rec.set_parent(flatfs_types::DirRef::Root);
        flatfs_alloc::mark_range(&mut sb.free_block_list, BlockIndex(10), 2, true);

        let bytes = sb.to_bytes();
        // Slot 4 lands at byte 16 + 4*8 = 48.
        assert_eq!(&bytes[48..53], b"notes");
        assert_eq!(bytes[53], 0x82);
        assert_eq!(bytes[54], 10);
        assert_eq!(bytes[55], 0x7F);

        assert_eq!(Superblock::parse(&bytes), sb);
    }
}
