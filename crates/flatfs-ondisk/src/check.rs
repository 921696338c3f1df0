//! Mount-time consistency checking.
//!
//! A candidate metadata block must pass all six rules before it may become
//! the active volume state. Rules are evaluated strictly in order 1–6 and
//! the first violation wins; callers surface the rule number in their
//! diagnostics, so the ordering is a contract, not an optimization.

use crate::Superblock;
use flatfs_types::{BlockIndex, BLOCK_COUNT, RESERVED_PARENT, ROOT_PARENT};
use thiserror::Error;

/// One violated consistency rule.
///
/// `code()` yields the rule number (1–6) used in mount diagnostics.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum ConsistencyError {
    /// Rule 1: a free slot must be entirely zero; a used slot's name must
    /// start with a nonzero byte.
    #[error("free record not zeroed, or used record with empty name")]
    RecordState,

    /// Rule 2: every file extent must lie within data blocks 1–127.
    #[error("file extent outside data blocks 1-127")]
    FileExtent,

    /// Rule 3: directories hold no blocks — size and start must be zero.
    #[error("directory with nonzero size or start block")]
    DirectoryShape,

    /// Rule 4: no self-parenting, parent 126 is reserved, and a numeric
    /// parent must reference a used directory slot.
    #[error("invalid parent reference")]
    ParentReference,

    /// Rule 5: sibling names within one directory must be unique
    /// (case-insensitive).
    #[error("duplicate name within a directory")]
    DuplicateName,

    /// Rule 6: the bitmap must be the exact union of block 0 and every
    /// file's extent, each used block owned by exactly one file.
    #[error("free-space bitmap does not match file extents")]
    BitmapMismatch,
}

impl ConsistencyError {
    /// Rule number for diagnostics.
    #[must_use]
    pub fn code(self) -> u8 {
        match self {
            Self::RecordState => 1,
            Self::FileExtent => 2,
            Self::DirectoryShape => 3,
            Self::ParentReference => 4,
            Self::DuplicateName => 5,
            Self::BitmapMismatch => 6,
        }
    }
}

/// Validate a candidate metadata block against rules 1–6.
///
/// Returns the first violated rule and checks nothing past it.
pub fn check_consistency(sb: &Superblock) -> Result<(), ConsistencyError> {
    check_record_state(sb)?;
    check_file_extents(sb)?;
    check_directory_shape(sb)?;
    check_parent_references(sb)?;
    check_name_uniqueness(sb)?;
    check_bitmap(sb)
}

/// Rule 1: free slots all-zero, used slots named.
fn check_record_state(sb: &Superblock) -> Result<(), ConsistencyError> {
    for record in &sb.records {
        if record.is_used() {
            if record.as_bytes()[0] == 0 {
                return Err(ConsistencyError::RecordState);
            }
        } else if !record.is_zeroed() {
            return Err(ConsistencyError::RecordState);
        }
    }
    Ok(())
}

/// Rule 2: file extents within [1, 127].
fn check_file_extents(sb: &Superblock) -> Result<(), ConsistencyError> {
    for record in &sb.records {
        if !record.is_used() || record.is_directory() {
            continue;
        }
        let start = usize::from(record.start_block().0);
        let size = usize::from(record.size_blocks());
        if start < 1 || start >= BLOCK_COUNT {
            return Err(ConsistencyError::FileExtent);
        }
        if start + size > BLOCK_COUNT {
            return Err(ConsistencyError::FileExtent);
        }
    }
    Ok(())
}

/// Rule 3: directories have size 0 and start block 0.
fn check_directory_shape(sb: &Superblock) -> Result<(), ConsistencyError> {
    for record in &sb.records {
        if record.is_used()
            && record.is_directory()
            && (record.size_blocks() != 0 || record.start_block().0 != 0)
        {
            return Err(ConsistencyError::DirectoryShape);
        }
    }
    Ok(())
}

/// Rule 4: parent references resolve to used directories.
fn check_parent_references(sb: &Superblock) -> Result<(), ConsistencyError> {
    for (i, record) in sb.records.iter().enumerate() {
        if !record.is_used() {
            continue;
        }
        let parent = record.parent_raw();
        if usize::from(parent) == i || parent == RESERVED_PARENT {
            return Err(ConsistencyError::ParentReference);
        }
        if parent != ROOT_PARENT {
            let target = &sb.records[usize::from(parent)];
            if !target.is_used() || !target.is_directory() {
                return Err(ConsistencyError::ParentReference);
            }
        }
    }
    Ok(())
}

/// Duplicate scan over one directory's children, identified by raw parent
/// value.
fn has_duplicate_children(sb: &Superblock, parent: u8) -> bool {
    for i in 0..sb.records.len() {
        let a = &sb.records[i];
        if !a.is_used() || a.parent_raw() != parent {
            continue;
        }
        let name_a = a.name();
        for b in sb.records.iter().skip(i + 1) {
            if b.is_used()
                && b.parent_raw() == parent
                && name_a.eq_ignore_ascii_case(&b.name())
            {
                return true;
            }
        }
    }
    false
}

/// Rule 5: names unique within each directory.
///
/// Root's children (parent 127) and each stored directory's children form
/// independent groups; the same name may appear in different directories.
fn check_name_uniqueness(sb: &Superblock) -> Result<(), ConsistencyError> {
    if has_duplicate_children(sb, ROOT_PARENT) {
        return Err(ConsistencyError::DuplicateName);
    }
    for (i, record) in sb.records.iter().enumerate() {
        if record.is_used()
            && record.is_directory()
            && has_duplicate_children(sb, i as u8)
        {
            return Err(ConsistencyError::DuplicateName);
        }
    }
    Ok(())
}

/// Rule 6: bitmap equals block 0 plus the union of file extents, with no
/// sharing.
fn check_bitmap(sb: &Superblock) -> Result<(), ConsistencyError> {
    let mut tally = [0u32; BLOCK_COUNT];
    tally[0] = 1; // the metadata block is always owned

    for record in &sb.records {
        if !record.is_used() || record.is_directory() {
            continue;
        }
        let start = usize::from(record.start_block().0);
        let size = usize::from(record.size_blocks());
        // Rule 2 already bounded the extent.
        for slot in &mut tally[start..start + size] {
            *slot += 1;
        }
    }

    for (block, &owners) in tally.iter().enumerate() {
        let free = flatfs_alloc::is_free(&sb.free_block_list, BlockIndex(block as u8));
        if free && owners > 0 {
            return Err(ConsistencyError::BitmapMismatch);
        }
        if !free && owners != 1 {
            return Err(ConsistencyError::BitmapMismatch);
        }
    }
    Ok(())
}
