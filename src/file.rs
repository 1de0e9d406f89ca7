//! File handles.

use bitflags::bitflags;

/// Access mode of a file handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Mode {
    /// Not open; every read or write fails.
    #[default]
    Closed,
    /// Open for reading and seeking.
    ReadOnly,
    /// Open for sequential writing.
    WriteOnly,
}

bitflags! {
    /// Per-handle state bits.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct FileFlags: u8 {
        /// The file started inside a partially used tail sector shared
        /// with the previous file. Cleared once the write crosses its
        /// first sector boundary.
        const NO_MORE = 1 << 0;
    }
}

/// A file opened on a [`ZeroFs`](crate::ZeroFs) instance.
///
/// Handles are plain state; all I/O goes through the owning filesystem's
/// methods. A handle stays usable only as long as the filesystem it came
/// from is alive and has not been reformatted underneath it.
#[derive(Debug, Default)]
pub struct FileHandle {
    pub(crate) id: u8,
    pub(crate) mode: Mode,
    pub(crate) sector: u16,
    pub(crate) pos: u16,
    pub(crate) file_type: u8,
    pub(crate) size: u32,
    pub(crate) flags: FileFlags,
}

impl FileHandle {
    /// Length of the file in bytes.
    ///
    /// For a write handle this tracks the bytes written so far; for a
    /// read handle it is the size recorded at close.
    #[must_use]
    pub fn len(&self) -> u32 {
        self.size
    }

    /// Whether the file holds no bytes.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.size == 0
    }

    /// Current access mode.
    #[must_use]
    pub fn mode(&self) -> Mode {
        self.mode
    }

    /// Type id derived from the file's extension at create time.
    #[must_use]
    pub fn file_type(&self) -> u8 {
        self.file_type
    }

    /// State bits.
    #[must_use]
    pub fn flags(&self) -> FileFlags {
        self.flags
    }
}
