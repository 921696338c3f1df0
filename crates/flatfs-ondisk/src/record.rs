//! The packed 8-byte metadata record.
//!
//! On-disk layout:
//!
//! | Bytes | Field                                         |
//! |-------|-----------------------------------------------|
//! | 0–4   | name, ASCII, left-packed, zero-padded         |
//! | 5     | bit 7 = used flag, bits 0–6 = size in blocks  |
//! | 6     | start block                                   |
//! | 7     | bit 7 = directory flag, bits 0–6 = parent     |
//!
//! Two fields share a byte in two places, so the raw bytes never leave this
//! type: callers go through the named accessors, and every mutator
//! preserves the co-located bit. The codec performs no validation — that is
//! the consistency checker's job.

use flatfs_types::{BlockIndex, DirRef, NAME_LEN, RECORD_SIZE};
use serde::{Deserialize, Serialize};

const USED_FLAG: u8 = 0x80;
const SIZE_MASK: u8 = 0x7F;
const DIR_FLAG: u8 = 0x80;
const PARENT_MASK: u8 = 0x7F;

const STATE_BYTE: usize = 5;
const START_BYTE: usize = 6;
const PARENT_BYTE: usize = 7;

/// One slot of the metadata record table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Record([u8; RECORD_SIZE]);

impl Default for Record {
    fn default() -> Self {
        Self::zeroed()
    }
}

impl Record {
    /// An all-zero (free) record.
    #[must_use]
    pub fn zeroed() -> Self {
        Self([0u8; RECORD_SIZE])
    }

    #[must_use]
    pub fn from_bytes(bytes: [u8; RECORD_SIZE]) -> Self {
        Self(bytes)
    }

    #[must_use]
    pub fn as_bytes(&self) -> &[u8; RECORD_SIZE] {
        &self.0
    }

    /// Whether all 8 bytes are zero (the required state of a free slot).
    #[must_use]
    pub fn is_zeroed(&self) -> bool {
        self.0 == [0u8; RECORD_SIZE]
    }

    /// Reset the slot to the free state.
    pub fn clear(&mut self) {
        self.0 = [0u8; RECORD_SIZE];
    }

    // ── used flag / size (byte 5) ───────────────────────────────────────

    #[must_use]
    pub fn is_used(&self) -> bool {
        self.0[STATE_BYTE] & USED_FLAG != 0
    }

    pub fn set_used(&mut self, used: bool) {
        if used {
            self.0[STATE_BYTE] |= USED_FLAG;
        } else {
            self.0[STATE_BYTE] &= !USED_FLAG;
        }
    }

    /// Size in blocks (0–127). Always 0 for directories.
    #[must_use]
    pub fn size_blocks(&self) -> u8 {
        self.0[STATE_BYTE] & SIZE_MASK
    }

    pub fn set_size_blocks(&mut self, size: u8) {
        self.0[STATE_BYTE] = (self.0[STATE_BYTE] & USED_FLAG) | (size & SIZE_MASK);
    }

    // ── start block (byte 6) ────────────────────────────────────────────

    /// First data block (1–127 for files, 0 for directories).
    #[must_use]
    pub fn start_block(&self) -> BlockIndex {
        BlockIndex(self.0[START_BYTE])
    }

    pub fn set_start_block(&mut self, block: BlockIndex) {
        self.0[START_BYTE] = block.0;
    }

    // ── directory flag / parent (byte 7) ────────────────────────────────

    #[must_use]
    pub fn is_directory(&self) -> bool {
        self.0[PARENT_BYTE] & DIR_FLAG != 0
    }

    pub fn set_directory(&mut self, is_dir: bool) {
        if is_dir {
            self.0[PARENT_BYTE] |= DIR_FLAG;
        } else {
            self.0[PARENT_BYTE] &= !DIR_FLAG;
        }
    }

    /// Raw 7-bit parent value (0–125, 126 reserved, 127 root).
    #[must_use]
    pub fn parent_raw(&self) -> u8 {
        self.0[PARENT_BYTE] & PARENT_MASK
    }

    #[must_use]
    pub fn parent(&self) -> DirRef {
        DirRef::from_raw(self.parent_raw())
    }

    pub fn set_parent(&mut self, parent: DirRef) {
        self.0[PARENT_BYTE] = (self.0[PARENT_BYTE] & DIR_FLAG) | (parent.raw() & PARENT_MASK);
    }

    // ── name (bytes 0–4) ────────────────────────────────────────────────

    /// The stored name with trailing zero padding stripped.
    ///
    /// Names are exactly 5 bytes on disk and never null-terminated; a
    /// 5-character name occupies the whole field.
    #[must_use]
    pub fn name(&self) -> String {
        let end = self.0[..NAME_LEN]
            .iter()
            .position(|&b| b == 0)
            .unwrap_or(NAME_LEN);
        String::from_utf8_lossy(&self.0[..end]).into_owned()
    }

    /// Store a name, zero-padding short names and truncating past 5 bytes.
    pub fn set_name(&mut self, name: &str) {
        let bytes = name.as_bytes();
        let len = bytes.len().min(NAME_LEN);
        self.0[..NAME_LEN].fill(0);
        self.0[..len].copy_from_slice(&bytes[..len]);
    }

    /// Case-insensitive comparison of the stored name against a query.
    ///
    /// The query is not truncated: a 6-character query never matches a
    /// stored (5-byte) name.
    #[must_use]
    pub fn name_matches(&self, query: &str) -> bool {
        self.name().eq_ignore_ascii_case(query)
    }
}
