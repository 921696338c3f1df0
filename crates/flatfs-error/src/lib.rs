#![forbid(unsafe_code)]
//! Error types for FlatFS.
//!
//! `FsError` is the single user-facing error type returned by every volume
//! operation. Crate-internal errors (the consistency checker's
//! `ConsistencyError` in `flatfs-ondisk`) convert into `FsError` at the
//! `flatfs-core` boundary; this crate stays independent of the on-disk
//! crates so the dependency graph has no cycles.
//!
//! Every failing operation is a complete no-op on volume state: the error
//! is classified and returned before any mutation or persistence happens.
//! `Display` strings are the exact diagnostics a command front end prints,
//! so callers can surface them verbatim.
//!
//! | Variant             | Reported by                                  |
//! |---------------------|----------------------------------------------|
//! | `NotMounted`        | every operation, before anything else        |
//! | `DiskNotFound`      | mount: open failure or short metadata block  |
//! | `Inconsistent`      | mount: consistency rule 1–6 violated         |
//! | `TableFull`         | create: no free record slot                  |
//! | `NameConflict`      | create: reserved or duplicate name           |
//! | `AllocationFailure` | create: no contiguous free run               |
//! | `NotFound`          | delete: name absent from cursor directory    |
//! | `NotAFile`          | read/write: absent *or* a directory          |
//! | `NotADirectory`     | cd: absent *or* a file                       |
//! | `BlockOutOfRange`   | read/write: block index outside the file     |
//! | `Io`                | device-level failure surfaced mid-operation  |
//!
//! `NotAFile` and `NotADirectory` deliberately cover both "does not exist"
//! and "exists with the wrong kind" — the lookup operations report a single
//! unified signal, while `delete` keeps the distinct `NotFound`. That
//! asymmetry is part of the observable contract, not an oversight.

use thiserror::Error;

/// Unified error type for all FlatFS volume operations.
#[derive(Debug, Error)]
pub enum FsError {
    /// No volume is mounted.
    #[error("no file system is mounted")]
    NotMounted,

    /// The image file could not be opened, or it could not yield a full
    /// metadata block.
    #[error("cannot find disk {0}")]
    DiskNotFound(String),

    /// The candidate image failed the mount-time consistency check.
    ///
    /// `code` is the lowest-numbered violated rule (1–6). A previously
    /// mounted volume, if any, stays mounted and untouched.
    #[error("file system in {disk} is inconsistent (error code: {code})")]
    Inconsistent { disk: String, code: u8 },

    /// The record table has no free slot.
    #[error("superblock in disk {disk} is full, cannot create {name}")]
    TableFull { disk: String, name: String },

    /// The name is reserved (`.`/`..`) or already taken in the cursor
    /// directory (case-insensitive).
    #[error("file or directory {0} already exists")]
    NameConflict(String),

    /// No contiguous run of free blocks is long enough.
    #[error("cannot allocate {size} blocks on {disk}")]
    AllocationFailure { disk: String, size: u8 },

    /// The name does not resolve among the cursor directory's children.
    #[error("file or directory {0} does not exist")]
    NotFound(String),

    /// The name does not resolve to a file (absent, or a directory).
    #[error("file {0} does not exist")]
    NotAFile(String),

    /// The name does not resolve to a directory (absent, or a file).
    #[error("directory {0} does not exist")]
    NotADirectory(String),

    /// The block index is outside `[0, size)` for the named file.
    #[error("{name} does not have block {block}")]
    BlockOutOfRange { name: String, block: u8 },

    /// Operating system I/O error (wraps `std::io::Error`).
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result alias using `FsError`.
pub type Result<T> = std::result::Result<T, FsError>;
