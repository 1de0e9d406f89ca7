//! A flat, log-structured filesystem for small MCUs that pair an external
//! SPI NOR data flash with a small on-chip "super" flash.
//!
//! There are no directories. Files carry short names (up to eight basename
//! characters plus a three character extension), are written once front to
//! back, and are rewritten by deleting and recreating them. Reads may seek
//! anywhere. The filesystem survives reformat, reboot, running out of
//! space, and wear-induced bad blocks.
//!
//! ## On-flash layout
//!
//! The data flash is an array of uniform sectors, each either blank, owned
//! by exactly one file, or released and waiting for an erase. All bookkeeping
//! lives in a *superblock* kept twice in the super flash: a byte-per-sector
//! ownership map, an append-only table of 16-byte name slots, and a small
//! metadata record. Updates accumulate in RAM while the filesystem is in
//! write mode and are published atomically by rewriting the inactive bank
//! and flipping over to it; a monotone version field decides the live bank
//! on boot. See [`ZeroFs`] for the operation set.
//!
//! ## Modes
//!
//! The instance is in exactly one of read mode or write mode. Write mode
//! materialises the sector map in RAM and is required for every mutation;
//! switching back to read mode publishes the pending state (the *repack*).
//! Read mode additionally allows lazy background reclamation of released
//! sectors, one at a time.
//!
//! The backend is anything implementing [`FlashAccess`]; an in-memory
//! simulator with timing and wear modelling ships in [`sim`].
#![no_std]
#![warn(clippy::all)]
#![warn(missing_docs)]

extern crate alloc;

use thiserror::Error;

pub mod flash;
pub mod sim;

mod file;
mod fs;
mod map;
mod name;
mod superblock;


pub use file::{FileFlags, FileHandle, Mode};
pub use flash::{AccessError, Area, FlashAccess};
pub use fs::ZeroFs;

/// Size of the data flash in KiB.
pub const FLASH_SIZE_KB: usize = 4096;

/// Size of one data flash sector in bytes. This is the erase unit.
pub const FLASH_SECTOR_SIZE: usize = 4096;

/// Number of sectors in the data flash.
pub const NUMBER_OF_SECTORS: usize = FLASH_SIZE_KB * 1024 / FLASH_SECTOR_SIZE;

/// Maximum number of namemap slots, and therefore of simultaneously
/// existing files. Bounded by the sector map cell encoding.
pub const MAX_NUMBER_OF_FILES: usize = 191;

/// Size of one superblock bank sector in the super flash.
pub const SUPER_SECTOR_SIZE: usize = 4096;

/// Write granularity of the super flash. Every program into a superblock
/// bank must be aligned to this.
pub const SUPER_WRITE_GRANULARITY: usize = 4;

/// Recognised file extensions, sorted. The type id stored for a file is
/// its index here plus one; unrecognised extensions get type 0.
pub const EXTENSIONS: &[&str] = &["bin", "txt", "zip"];

const _: () = {
    assert!(FLASH_SECTOR_SIZE <= 0xFFFF, "sector size must fit in 16 bits");
    assert!(
        MAX_NUMBER_OF_FILES <= map::MAX_FILE_ID as usize + 1,
        "file ids above 0xFC collide with the sector map markers"
    );
    assert!(NUMBER_OF_SECTORS % SUPER_WRITE_GRANULARITY == 0);
    assert!(superblock::ENTRY_LEN % SUPER_WRITE_GRANULARITY == 0);
    assert!(superblock::META_LEN % SUPER_WRITE_GRANULARITY == 0);
    assert!(
        superblock::BANK_LEN <= SUPER_SECTOR_SIZE,
        "superblock does not fit in one super sector, reduce MAX_NUMBER_OF_FILES"
    );
    let mut i = 0;
    while i < EXTENSIONS.len() {
        assert!(EXTENSIONS[i].len() == 3, "extensions are exactly three characters");
        i += 1;
    }
};

/// Errors reported by filesystem operations.
///
/// Each variant maps to a stable integer code (see [`Error::code`]) so the
/// enumeration can cross an FFI or RPC boundary unchanged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum Error {
    /// Every namemap slot is taken, even after compaction.
    #[error("no namemap slot available")]
    MaxFiles,
    /// No file with the given name and type exists.
    #[error("file not found")]
    NotFound,
    /// The operation mutates state but the filesystem is in read mode.
    #[error("filesystem is in read mode")]
    ReadMode,
    /// No data sector is free for allocation.
    #[error("no free data sector")]
    NoSpace,
    /// The flash backend failed while reading.
    #[error("flash read failed")]
    Open,
    /// An argument is out of range.
    #[error("invalid argument")]
    Arg,
    /// The operation requires read mode but the filesystem (or the handle)
    /// is writable.
    #[error("filesystem is in write mode")]
    WriteMode,
    /// A sector chain traversal ran past the end of the map.
    #[error("sector chain overflow")]
    Overflow,
    /// A programmed sector failed read-back verification and was retired.
    #[error("sector failed write verification")]
    BadSector,
    /// The file name does not parse as `basename.ext`.
    #[error("invalid file name")]
    InvalidName,
    /// The file handle is closed or does not belong to this filesystem.
    #[error("invalid file handle")]
    InvalidHandle,
}

impl Error {
    /// The stable integer code for this error.
    #[must_use]
    pub fn code(self) -> i32 {
        match self {
            Error::MaxFiles => -2,
            Error::NotFound => -3,
            Error::ReadMode => -4,
            Error::NoSpace => -5,
            Error::Open => -6,
            Error::Arg => -7,
            Error::WriteMode => -8,
            Error::Overflow => -9,
            Error::BadSector => -10,
            Error::InvalidName => -11,
            Error::InvalidHandle => -12,
        }
    }
}
