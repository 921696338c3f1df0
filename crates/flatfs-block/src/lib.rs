#![forbid(unsafe_code)]
//! Block I/O layer.
//!
//! Provides the `BlockDevice` trait plus the two device implementations:
//! `FileBlockDevice` for image files (positional reads/writes, no shared
//! seek position) and `MemBlockDevice` for tests and embedders that want a
//! volume without touching the filesystem.
//!
//! This layer is pure offset arithmetic: a block index maps to byte offset
//! `index * 1024`. It knows nothing about the metadata layout.

use flatfs_error::{FsError, Result};
use flatfs_types::{Block, BlockIndex, BLOCK_COUNT, BLOCK_SIZE};
use parking_lot::Mutex;
use std::fs::{File, OpenOptions};
use std::os::unix::fs::FileExt;
use std::path::Path;
use std::sync::Arc;

/// Block-addressed I/O over a 128-block volume image.
///
/// Indices run 0–127; anything larger is an error. Writes take effect
/// immediately (no caching layer, no deferred flush).
pub trait BlockDevice: Send + Sync {
    /// Read one block. Blocks that were never written read as zeros.
    fn read_block(&self, block: BlockIndex) -> Result<Block>;

    /// Write one block.
    fn write_block(&self, block: BlockIndex, data: &Block) -> Result<()>;
}

fn check_range(block: BlockIndex) -> Result<()> {
    if usize::from(block.0) >= BLOCK_COUNT {
        return Err(FsError::Io(std::io::Error::new(
            std::io::ErrorKind::InvalidInput,
            format!("block {block} out of range (volume has {BLOCK_COUNT} blocks)"),
        )));
    }
    Ok(())
}

/// File-backed block device using positional I/O.
///
/// Reads past the image's current length yield zeros; writes past it extend
/// the file. A freshly formatted 1024-byte image therefore behaves exactly
/// like a full 131072-byte one.
#[derive(Debug)]
pub struct FileBlockDevice {
    file: File,
    /// Current file length; grows as writes extend the image.
    len: Mutex<u64>,
}

impl FileBlockDevice {
    /// Open an image file read-write.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .open(path.as_ref())?;
        let len = file.metadata()?.len();
        Ok(Self {
            file,
            len: Mutex::new(len),
        })
    }

    /// Current image length in bytes.
    #[must_use]
    pub fn len_bytes(&self) -> u64 {
        *self.len.lock()
    }
}

impl BlockDevice for FileBlockDevice {
    fn read_block(&self, block: BlockIndex) -> Result<Block> {
        check_range(block)?;
        let offset = block.byte_offset();
        let len = *self.len.lock();
        let mut buf = [0u8; BLOCK_SIZE];
        if offset < len {
            // At most one block; the cast cannot truncate.
            let avail = (len - offset).min(BLOCK_SIZE as u64) as usize;
            self.file.read_exact_at(&mut buf[..avail], offset)?;
        }
        Ok(buf)
    }

    fn write_block(&self, block: BlockIndex, data: &Block) -> Result<()> {
        check_range(block)?;
        let offset = block.byte_offset();
        self.file.write_all_at(data, offset)?;
        let mut len = self.len.lock();
        *len = (*len).max(offset + BLOCK_SIZE as u64);
        Ok(())
    }
}

/// In-memory block device holding a full 128-block image.
///
/// Cloning shares the underlying image, so a test can keep a handle to the
/// device after handing a clone to the volume and inspect what was actually
/// written.
#[derive(Debug, Clone, Default)]
pub struct MemBlockDevice {
    blocks: Arc<Mutex<Vec<Block>>>,
}

impl MemBlockDevice {
    /// A zero-filled volume image.
    #[must_use]
    pub fn new() -> Self {
        Self {
            blocks: Arc::new(Mutex::new(vec![[0u8; BLOCK_SIZE]; BLOCK_COUNT])),
        }
    }

    /// Snapshot the raw image contents.
    #[must_use]
    pub fn to_image(&self) -> Vec<u8> {
        let blocks = self.blocks.lock();
        let mut image = Vec::with_capacity(BLOCK_COUNT * BLOCK_SIZE);
        for block in blocks.iter() {
            image.extend_from_slice(block);
        }
        image
    }
}

impl BlockDevice for MemBlockDevice {
    fn read_block(&self, block: BlockIndex) -> Result<Block> {
        check_range(block)?;
        Ok(self.blocks.lock()[usize::from(block.0)])
    }

    fn write_block(&self, block: BlockIndex, data: &Block) -> Result<()> {
        check_range(block)?;
        self.blocks.lock()[usize::from(block.0)] = *data;
        Ok(())
    }
}
