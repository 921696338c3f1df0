#![forbid(unsafe_code)]
//! Volume state and namespace operations.
//!
//! [`FlatFs`] is the operation surface a command front end drives: mount,
//! create, delete, read, write, set_buffer, list, change_directory, and
//! defragment. It owns the shared 1024-byte data buffer (which lives for
//! the whole process and survives remounts) and at most one mounted
//! [`Volume`] — mounting a new image replaces and discards the previous
//! one.
//!
//! Every operation checks its preconditions in a fixed order and reports
//! the first violated one; a failing operation leaves the volume state
//! completely untouched. Mutating operations (create, delete, defragment)
//! persist the metadata block to disk before returning; read, write,
//! set_buffer, list, and change_directory never touch metadata.
//!
//! Strictly single-threaded: operations run to completion with no
//! suspension points. A concurrent host must treat each call as one
//! critical section guarding the whole `FlatFs`.

mod defrag;

use flatfs_block::{BlockDevice, FileBlockDevice};
use flatfs_error::{FsError, Result};
use flatfs_ondisk::{check_consistency, Superblock};
use flatfs_types::{Block, BlockIndex, DirRef, SlotIndex, BLOCK_SIZE};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;

/// One rendered entry of a directory listing.
///
/// Directories (including the synthetic `.` and `..`) report their
/// direct-child count plus two; files report their size in blocks. The
/// `Display` impl renders the fixed listing columns: name left-justified
/// to 5, number right-justified to 3, files suffixed with ` KB`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ListEntry {
    Directory { name: String, entries: u8 },
    File { name: String, size: u8 },
}

impl fmt::Display for ListEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Directory { name, entries } => write!(f, "{name:<5} {entries:>3}"),
            Self::File { name, size } => write!(f, "{name:<5} {size:>3} KB"),
        }
    }
}

/// The active mounted volume: decoded metadata, the open image, and the
/// current-directory cursor.
pub(crate) struct Volume {
    /// Image name as given to mount; used in diagnostics.
    disk: String,
    dev: Box<dyn BlockDevice>,
    sb: Superblock,
    cwd: DirRef,
}

/// The filesystem engine: shared data buffer plus the mounted volume.
pub struct FlatFs {
    buffer: Block,
    volume: Option<Volume>,
}

impl Default for FlatFs {
    fn default() -> Self {
        Self::new()
    }
}

impl FlatFs {
    /// A fresh engine with a zeroed buffer and nothing mounted.
    #[must_use]
    pub fn new() -> Self {
        Self {
            buffer: [0u8; BLOCK_SIZE],
            volume: None,
        }
    }

    // ── mount ───────────────────────────────────────────────────────────

    /// Mount the image file at `path`.
    ///
    /// Fails with `DiskNotFound` if the file cannot be opened or cannot
    /// yield a full metadata block, and with `Inconsistent` if the image
    /// violates a consistency rule. On any failure a previously mounted
    /// volume stays mounted and untouched. On success the cursor resets to
    /// root; the shared buffer is never cleared by mount.
    pub fn mount(&mut self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let disk = path.display().to_string();
        let dev =
            FileBlockDevice::open(path).map_err(|_| FsError::DiskNotFound(disk.clone()))?;
        if dev.len_bytes() < BLOCK_SIZE as u64 {
            return Err(FsError::DiskNotFound(disk));
        }
        self.install(disk, Box::new(dev))
    }

    /// Mount an already-open block device under a display name.
    ///
    /// Same validation and replacement semantics as [`mount`](Self::mount);
    /// intended for embedders and tests using in-memory devices.
    pub fn mount_device(&mut self, disk: impl Into<String>, dev: Box<dyn BlockDevice>) -> Result<()> {
        self.install(disk.into(), dev)
    }

    fn install(&mut self, disk: String, dev: Box<dyn BlockDevice>) -> Result<()> {
        let raw = dev.read_block(BlockIndex::METADATA)?;
        let sb = Superblock::parse(&raw);
        if let Err(violation) = check_consistency(&sb) {
            return Err(FsError::Inconsistent {
                disk,
                code: violation.code(),
            });
        }
        tracing::info!(disk = %disk, "mounted volume");
        // Replacing the option drops (and thereby closes) any previous
        // volume only after the candidate has fully validated.
        self.volume = Some(Volume {
            disk,
            dev,
            sb,
            cwd: DirRef::Root,
        });
        Ok(())
    }

    // ── namespace operations ────────────────────────────────────────────

    /// Create a file (`size` 1–127 blocks) or directory (`size` 0) in the
    /// cursor directory.
    ///
    /// The front end passes names of 1–5 ASCII characters; anything longer
    /// is truncated to the 5 stored bytes.
    pub fn create(&mut self, name: &str, size: u8) -> Result<()> {
        self.volume_mut()?.create(name, size)
    }

    /// Delete the named child of the cursor directory. Directories are
    /// removed with all of their contents; this is never an error.
    pub fn delete(&mut self, name: &str) -> Result<()> {
        self.volume_mut()?.delete(name)
    }

    /// Read block `block` of the named file into the shared buffer.
    pub fn read(&mut self, name: &str, block: u8) -> Result<()> {
        let data = self.volume_ref()?.read_file_block(name, block)?;
        self.buffer = data;
        Ok(())
    }

    /// Write the shared buffer to block `block` of the named file.
    ///
    /// No metadata changes, so nothing is persisted.
    pub fn write(&mut self, name: &str, block: u8) -> Result<()> {
        let vol = self.volume.as_ref().ok_or(FsError::NotMounted)?;
        vol.write_file_block(name, block, &self.buffer)
    }

    /// Replace the shared buffer: zero it, then copy in up to 1024 bytes.
    /// Longer input is truncated; shorter input leaves the tail zeroed.
    pub fn set_buffer(&mut self, data: &[u8]) -> Result<()> {
        self.volume_ref()?;
        self.buffer = [0u8; BLOCK_SIZE];
        let len = data.len().min(BLOCK_SIZE);
        self.buffer[..len].copy_from_slice(&data[..len]);
        Ok(())
    }

    /// List the cursor directory: `.`, `..`, then children ascending by
    /// slot index.
    pub fn list(&self) -> Result<Vec<ListEntry>> {
        Ok(self.volume_ref()?.list())
    }

    /// Change the cursor directory. `.` is a no-op; `..` moves to the
    /// parent and stays at root when already there.
    pub fn change_directory(&mut self, name: &str) -> Result<()> {
        self.volume_mut()?.change_directory(name)
    }

    /// Repack all file extents into a gap-free prefix starting at block 1
    /// and rebuild the bitmap.
    pub fn defragment(&mut self) -> Result<()> {
        self.volume_mut()?.defragment()
    }

    // ── introspection ───────────────────────────────────────────────────

    #[must_use]
    pub fn is_mounted(&self) -> bool {
        self.volume.is_some()
    }

    /// The shared data buffer (filled by `read`, consumed by `write`).
    #[must_use]
    pub fn buffer(&self) -> &Block {
        &self.buffer
    }

    /// Decoded metadata of the mounted volume, if any.
    #[must_use]
    pub fn superblock(&self) -> Option<&Superblock> {
        self.volume.as_ref().map(|vol| &vol.sb)
    }

    /// Current-directory cursor of the mounted volume, if any.
    #[must_use]
    pub fn current_dir(&self) -> Option<DirRef> {
        self.volume.as_ref().map(|vol| vol.cwd)
    }

    /// Display name of the mounted image, if any.
    #[must_use]
    pub fn disk_name(&self) -> Option<&str> {
        self.volume.as_ref().map(|vol| vol.disk.as_str())
    }

    fn volume_ref(&self) -> Result<&Volume> {
        self.volume.as_ref().ok_or(FsError::NotMounted)
    }

    fn volume_mut(&mut self) -> Result<&mut Volume> {
        self.volume.as_mut().ok_or(FsError::NotMounted)
    }
}

impl Volume {
    // ── lookups ─────────────────────────────────────────────────────────

    /// Children of `dir`, ascending by slot index. Linear scan of the
    /// record table; slot order is part of the listing contract, so no
    /// auxiliary index is kept.
    fn children_of(&self, dir: DirRef) -> Vec<SlotIndex> {
        let parent = dir.raw();
        self.sb
            .records
            .iter()
            .enumerate()
            .filter(|(_, rec)| rec.is_used() && rec.parent_raw() == parent)
            .map(|(i, _)| SlotIndex(i as u8))
            .collect()
    }

    /// Resolve `name` among the cursor directory's direct children,
    /// case-insensitively.
    fn find_child(&self, name: &str) -> Option<SlotIndex> {
        let parent = self.cwd.raw();
        self.sb
            .records
            .iter()
            .enumerate()
            .find(|(_, rec)| {
                rec.is_used() && rec.parent_raw() == parent && rec.name_matches(name)
            })
            .map(|(i, _)| SlotIndex(i as u8))
    }

    fn free_slot(&self) -> Option<SlotIndex> {
        self.sb
            .records
            .iter()
            .position(|rec| !rec.is_used())
            .map(|i| SlotIndex(i as u8))
    }

    /// Listing count for a directory: direct children plus the two dot
    /// entries.
    fn count_entries(&self, dir: DirRef) -> u8 {
        self.children_of(dir).len() as u8 + 2
    }

    /// Serialize the metadata block to block 0. Called after every
    /// mutation, never batched.
    fn persist(&self) -> Result<()> {
        self.dev
            .write_block(BlockIndex::METADATA, &self.sb.to_bytes())
    }

    // ── create ──────────────────────────────────────────────────────────

    fn create(&mut self, name: &str, size: u8) -> Result<()> {
        // Precondition order is observable: slot, then name, then space.
        let slot = self.free_slot().ok_or_else(|| FsError::TableFull {
            disk: self.disk.clone(),
            name: name.to_owned(),
        })?;

        if name == "." || name == ".." || self.find_child(name).is_some() {
            return Err(FsError::NameConflict(name.to_owned()));
        }

        let start = if size > 0 {
            let start = flatfs_alloc::find_contiguous(&self.sb.free_block_list, size)
                .ok_or_else(|| FsError::AllocationFailure {
                    disk: self.disk.clone(),
                    size,
                })?;
            // New file content starts as zeros on disk.
            let zero = [0u8; BLOCK_SIZE];
            for i in 0..size {
                self.dev.write_block(BlockIndex(start.0 + i), &zero)?;
            }
            Some(start)
        } else {
            None
        };

        let cwd = self.cwd;
        let record = &mut self.sb.records[slot.as_usize()];
        record.clear();
        record.set_name(name);
        record.set_used(true);
        record.set_parent(cwd);
        match start {
            None => record.set_directory(true),
            Some(start) => {
                record.set_size_blocks(size);
                record.set_start_block(start);
                flatfs_alloc::mark_range(&mut self.sb.free_block_list, start, size, true);
            }
        }

        self.persist()?;
        tracing::debug!(
            disk = %self.disk,
            name = %name,
            size,
            slot = %slot,
            "created entry"
        );
        Ok(())
    }

    // ── delete ──────────────────────────────────────────────────────────

    fn delete(&mut self, name: &str) -> Result<()> {
        let target = self
            .find_child(name)
            .ok_or_else(|| FsError::NotFound(name.to_owned()))?;

        // Collect the whole subtree with an explicit work list. Each
        // record is freed independently, so order across siblings does not
        // matter.
        let mut stack = vec![target];
        let mut doomed = Vec::new();
        while let Some(slot) = stack.pop() {
            doomed.push(slot);
            if self.sb.records[slot.as_usize()].is_directory() {
                stack.extend(self.children_of(DirRef::Slot(slot)));
            }
        }

        let zero = [0u8; BLOCK_SIZE];
        for slot in &doomed {
            let record = self.sb.records[slot.as_usize()];
            if !record.is_directory() {
                let start = record.start_block();
                let size = record.size_blocks();
                for i in 0..size {
                    self.dev.write_block(BlockIndex(start.0 + i), &zero)?;
                }
                flatfs_alloc::mark_range(&mut self.sb.free_block_list, start, size, false);
            }
            self.sb.records[slot.as_usize()].clear();
        }

        self.persist()?;
        tracing::debug!(
            disk = %self.disk,
            name = %name,
            removed = doomed.len(),
            "deleted entry"
        );
        Ok(())
    }

    // ── read / write ────────────────────────────────────────────────────

    /// Resolve `name` to a file. Absence and being a directory are one
    /// signal here.
    fn resolve_file(&self, name: &str) -> Result<SlotIndex> {
        match self.find_child(name) {
            Some(slot) if !self.sb.records[slot.as_usize()].is_directory() => Ok(slot),
            _ => Err(FsError::NotAFile(name.to_owned())),
        }
    }

    fn file_block(&self, name: &str, block: u8) -> Result<BlockIndex> {
        let slot = self.resolve_file(name)?;
        let record = &self.sb.records[slot.as_usize()];
        if block >= record.size_blocks() {
            return Err(FsError::BlockOutOfRange {
                name: name.to_owned(),
                block,
            });
        }
        Ok(BlockIndex(record.start_block().0 + block))
    }

    fn read_file_block(&self, name: &str, block: u8) -> Result<Block> {
        let abs = self.file_block(name, block)?;
        self.dev.read_block(abs)
    }

    fn write_file_block(&self, name: &str, block: u8, data: &Block) -> Result<()> {
        let abs = self.file_block(name, block)?;
        self.dev.write_block(abs, data)
    }

    // ── list / cd ───────────────────────────────────────────────────────

    fn list(&self) -> Vec<ListEntry> {
        let mut out = Vec::new();
        let here = self.count_entries(self.cwd);
        out.push(ListEntry::Directory {
            name: ".".to_owned(),
            entries: here,
        });

        // At root, `..` is the root itself by convention.
        let up = match self.cwd {
            DirRef::Root => here,
            DirRef::Slot(slot) => {
                self.count_entries(self.sb.records[slot.as_usize()].parent())
            }
        };
        out.push(ListEntry::Directory {
            name: "..".to_owned(),
            entries: up,
        });

        for slot in self.children_of(self.cwd) {
            let record = &self.sb.records[slot.as_usize()];
            if record.is_directory() {
                out.push(ListEntry::Directory {
                    name: record.name(),
                    entries: self.count_entries(DirRef::Slot(slot)),
                });
            } else {
                out.push(ListEntry::File {
                    name: record.name(),
                    size: record.size_blocks(),
                });
            }
        }
        out
    }

    fn change_directory(&mut self, name: &str) -> Result<()> {
        if name == "." {
            return Ok(());
        }
        if name == ".." {
            // Stays at root when already there.
            if let DirRef::Slot(slot) = self.cwd {
                self.cwd = self.sb.records[slot.as_usize()].parent();
            }
            return Ok(());
        }
        match self.find_child(name) {
            Some(slot) if self.sb.records[slot.as_usize()].is_directory() => {
                self.cwd = DirRef::Slot(slot);
                Ok(())
            }
            _ => Err(FsError::NotADirectory(name.to_owned())),
        }
    }
}
