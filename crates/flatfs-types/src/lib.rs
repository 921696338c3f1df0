#![forbid(unsafe_code)]
//! Shared geometry constants and index newtypes for FlatFS.
//!
//! The volume geometry is fixed: a 131072-byte image holding 128 blocks of
//! 1024 bytes. Block 0 is the metadata block; blocks 1–127 hold file data.
//! Everything that addresses a block or a record slot goes through the
//! unit-carrying newtypes here to keep the two index spaces from mixing.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Size of every block in bytes.
pub const BLOCK_SIZE: usize = 1024;
/// Total number of blocks on a volume, metadata block included.
pub const BLOCK_COUNT: usize = 128;
/// Number of data blocks (blocks 1–127).
pub const DATA_BLOCK_COUNT: usize = 127;
/// Total image size in bytes.
pub const IMAGE_SIZE: usize = BLOCK_SIZE * BLOCK_COUNT;

/// Number of record slots in the metadata block.
pub const RECORD_COUNT: usize = 126;
/// On-disk size of one metadata record in bytes.
pub const RECORD_SIZE: usize = 8;
/// Maximum stored name length in bytes.
pub const NAME_LEN: usize = 5;
/// Size of the free-space bitmap in bytes (one bit per block).
pub const BITMAP_LEN: usize = 16;

/// Largest file size in blocks.
pub const MAX_FILE_BLOCKS: u8 = 127;
/// Parent value naming the implicit root directory.
pub const ROOT_PARENT: u8 = 127;
/// Reserved parent value; never valid on a consistent volume.
pub const RESERVED_PARENT: u8 = 126;

/// An owned block-sized buffer.
pub type Block = [u8; BLOCK_SIZE];

/// Absolute block index on the volume (0–127).
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct BlockIndex(pub u8);

impl BlockIndex {
    /// The metadata block.
    pub const METADATA: Self = Self(0);

    /// Byte offset of this block within the image.
    #[must_use]
    pub fn byte_offset(self) -> u64 {
        u64::from(self.0) * BLOCK_SIZE as u64
    }
}

/// Index of a record slot in the metadata table (0–125).
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct SlotIndex(pub u8);

impl SlotIndex {
    #[must_use]
    pub fn as_usize(self) -> usize {
        usize::from(self.0)
    }
}

/// Reference to a directory: either the implicit root or a record slot.
///
/// The root directory is not stored in the record table; on disk it is the
/// sentinel parent value 127. `DirRef` keeps that encoding out of the rest
/// of the code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DirRef {
    Root,
    Slot(SlotIndex),
}

impl DirRef {
    /// Decode a 7-bit parent value. 127 names the root; everything else is
    /// taken as a slot index. The codec does not validate — 126 decodes to
    /// a slot and is caught by the consistency checker.
    #[must_use]
    pub fn from_raw(raw: u8) -> Self {
        if raw == ROOT_PARENT {
            Self::Root
        } else {
            Self::Slot(SlotIndex(raw))
        }
    }

    /// Encode back to the 7-bit on-disk parent value.
    #[must_use]
    pub fn raw(self) -> u8 {
        match self {
            Self::Root => ROOT_PARENT,
            Self::Slot(slot) => slot.0,
        }
    }
}

impl fmt::Display for BlockIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Display for SlotIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Display for DirRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Root => write!(f, "/"),
            Self::Slot(slot) => write!(f, "{slot}"),
        }
    }
}
