//! Superblock bank layout and record codecs.
//!
//! Each of the two banks in the super flash holds a complete superblock:
//!
//! ```none
//! +--------------------+------------------------------+----------+
//! |     sector map     |           namemap            | metadata |
//! |  1 byte x sectors  |  16 bytes x MAX_NUMBER_OF_FILES  |  8 bytes |
//! +--------------------+------------------------------+----------+
//! ```
//!
//! All multi-byte fields are little endian. The records are programmed in
//! place while a bank is active (a namemap slot is born as an in-progress
//! placeholder of all ones and only ever has bits cleared afterwards), and
//! wholesale during a repack of the inactive bank.

use core::cmp::Ordering;

use crate::name::{ENCODED_LEN, EncodedName};
use crate::{MAX_NUMBER_OF_FILES, NUMBER_OF_SECTORS, SUPER_SECTOR_SIZE};

/// Byte offset of the namemap inside a bank.
pub const NAMEMAP_OFFSET: usize = NUMBER_OF_SECTORS;

/// Size of one namemap slot.
pub const ENTRY_LEN: usize = 16;

/// Byte offset of the type/length word inside a slot.
pub const TYPE_LEN_OFFSET: usize = 12;

/// Byte offset of the metadata record inside a bank.
pub const META_OFFSET: usize = NAMEMAP_OFFSET + MAX_NUMBER_OF_FILES * ENTRY_LEN;

/// Size of the metadata record.
pub const META_LEN: usize = 8;

/// Total size of one bank image.
pub const BANK_LEN: usize = META_OFFSET + META_LEN;

/// `type_len` value of a slot that was created but never closed.
pub const TYPE_LEN_IN_PROGRESS: u32 = 0xFFFF_FFFF;

/// Largest version value; written on wrap-around and at first use.
pub const VERSION_MAX: u16 = 0xFFFE;

/// Base address of a bank within the super flash area.
#[must_use]
pub fn bank_base(bank: u8) -> u32 {
    u32::from(bank) * SUPER_SECTOR_SIZE as u32
}

/// Address of a bank's sector map.
#[must_use]
pub fn map_addr(bank: u8) -> u32 {
    bank_base(bank)
}

/// Address of namemap slot `id` within a bank.
#[must_use]
pub fn entry_addr(bank: u8, id: u8) -> u32 {
    bank_base(bank) + NAMEMAP_OFFSET as u32 + u32::from(id) * ENTRY_LEN as u32
}

/// Address of a bank's metadata record.
#[must_use]
pub fn meta_addr(bank: u8) -> u32 {
    bank_base(bank) + META_OFFSET as u32
}

/// One 16-byte namemap slot.
///
/// A zero name or a zero length marks a deleted slot; an all-ones
/// `type_len` marks a file that is still being written.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NamemapEntry {
    /// Packed basename.
    pub name: EncodedName,
    /// First sector of the file's chain.
    pub first_sector: u16,
    /// Byte offset of the file's first byte within that sector.
    pub first_offset: u16,
    /// Type id in the top byte, length in bytes in the low 24 bits.
    pub type_len: u32,
}

impl NamemapEntry {
    /// The placeholder programmed at create time; `type_len` stays all
    /// ones until close clears it down to the real type and length.
    #[must_use]
    pub fn in_progress(name: EncodedName, first_sector: u16, first_offset: u16) -> Self {
        NamemapEntry {
            name,
            first_sector,
            first_offset,
            type_len: TYPE_LEN_IN_PROGRESS,
        }
    }

    /// Type id of the file.
    #[must_use]
    pub fn file_type(&self) -> u8 {
        (self.type_len >> 24) as u8
    }

    /// Length of the file in bytes.
    #[must_use]
    pub fn size(&self) -> u32 {
        self.type_len & 0x00FF_FFFF
    }

    /// Whether the slot still describes an open write.
    #[must_use]
    pub fn is_in_progress(&self) -> bool {
        self.type_len == TYPE_LEN_IN_PROGRESS
    }

    /// Whether the slot survives a repack: named, closed, and non-empty.
    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.name != [0u8; ENCODED_LEN] && self.size() != 0 && !self.is_in_progress()
    }

    /// Serialise for programming into a bank. The reserved halfword stays
    /// erased so later in-place programs keep their freedom.
    #[must_use]
    pub fn to_bytes(&self) -> [u8; ENTRY_LEN] {
        let mut b = [0xFF; ENTRY_LEN];
        b[..6].copy_from_slice(&self.name);
        b[6..8].copy_from_slice(&self.first_sector.to_le_bytes());
        b[8..10].copy_from_slice(&self.first_offset.to_le_bytes());
        b[TYPE_LEN_OFFSET..].copy_from_slice(&self.type_len.to_le_bytes());
        b
    }

    /// Deserialise a slot read out of a bank.
    #[must_use]
    pub fn from_bytes(b: &[u8; ENTRY_LEN]) -> Self {
        NamemapEntry {
            name: b[..6].try_into().unwrap(),
            first_sector: u16::from_le_bytes(b[6..8].try_into().unwrap()),
            first_offset: u16::from_le_bytes(b[8..10].try_into().unwrap()),
            type_len: u32::from_le_bytes(b[TYPE_LEN_OFFSET..].try_into().unwrap()),
        }
    }
}

/// The per-bank metadata record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Metadata {
    /// Sector where the previous file's tail landed.
    pub last_written: u16,
    /// Byte offset of that tail within the sector; 0 means the tail ended
    /// exactly on a sector boundary.
    pub last_written_len: u16,
    /// Monotone-decreasing bank version.
    pub version: u16,
}

impl Metadata {
    /// The state of a bank that has never been programmed.
    pub const BLANK: Metadata = Metadata {
        last_written: 0,
        last_written_len: 0,
        version: 0xFFFF,
    };

    /// Serialise for programming into a bank.
    #[must_use]
    pub fn to_bytes(&self) -> [u8; META_LEN] {
        let mut b = [0xFF; META_LEN];
        b[0..2].copy_from_slice(&self.last_written.to_le_bytes());
        b[2..4].copy_from_slice(&self.last_written_len.to_le_bytes());
        b[4..6].copy_from_slice(&self.version.to_le_bytes());
        b
    }

    /// Deserialise a record read out of a bank.
    #[must_use]
    pub fn from_bytes(b: &[u8; META_LEN]) -> Self {
        Metadata {
            last_written: u16::from_le_bytes(b[0..2].try_into().unwrap()),
            last_written_len: u16::from_le_bytes(b[2..4].try_into().unwrap()),
            version: u16::from_le_bytes(b[4..6].try_into().unwrap()),
        }
    }
}

/// Boot-time rank of a bank's raw version field.
///
/// The version counts *down* from [`VERSION_MAX`], so among banks that
/// have ever been repacked the numerically smaller value is newer. Two
/// states rank below every used value: blank flash (`0xFFFF`, never
/// programmed) and the `0xFFFE` ground-state sentinel written by a
/// wrapping repack. The sentinel still outranks blank — after a wrap the
/// sibling bank is erased, so a lone `0xFFFE` identifies the live bank —
/// but loses to any used value, which is what rolls an interrupted wrap
/// back to the prior superblock.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BankVersion(Option<u16>);

impl BankVersion {
    /// Interpret a raw on-flash version field.
    #[must_use]
    pub fn from_raw(v: u16) -> Self {
        if v == 0xFFFF {
            BankVersion(None)
        } else {
            BankVersion(Some(v))
        }
    }

    /// Whether this is a used (post-reset) version.
    #[must_use]
    pub fn is_used(&self) -> bool {
        matches!(self.0, Some(v) if v < VERSION_MAX)
    }

    fn rank(&self) -> u32 {
        match self.0 {
            None => 0,
            Some(VERSION_MAX) => 1,
            Some(v) => 0x1_0000 - u32::from(v),
        }
    }
}

impl Ord for BankVersion {
    fn cmp(&self, other: &Self) -> Ordering {
        self.rank().cmp(&other.rank())
    }
}

impl PartialOrd for BankVersion {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn entry_roundtrip() {
        let e = NamemapEntry {
            name: [0x12, 0x34, 0x56, 0x78, 0x9A, 0xBC],
            first_sector: 0x0203,
            first_offset: 0x0405,
            type_len: (3 << 24) | 0x0001_5678,
        };
        assert_eq!(NamemapEntry::from_bytes(&e.to_bytes()), e);
        assert_eq!(e.file_type(), 3);
        assert_eq!(e.size(), 0x0001_5678);
    }

    #[test]
    fn entry_reserved_halfword_stays_erased() {
        let e = NamemapEntry::in_progress([1; 6], 7, 9);
        let b = e.to_bytes();
        assert_eq!(&b[10..12], &[0xFF, 0xFF]);
        assert_eq!(&b[TYPE_LEN_OFFSET..], &[0xFF; 4]);
    }

    #[test]
    fn validity_classes() {
        let live = NamemapEntry {
            name: [1; 6],
            first_sector: 0,
            first_offset: 0,
            type_len: (1 << 24) | 10,
        };
        assert!(live.is_valid());

        let mut deleted = live;
        deleted.name = [0; 6];
        assert!(!deleted.is_valid());

        let mut empty = live;
        empty.type_len = 1 << 24;
        assert!(!empty.is_valid());

        let open = NamemapEntry::in_progress([1; 6], 0, 0);
        assert!(open.is_in_progress());
        assert!(!open.is_valid());
    }

    #[test]
    fn metadata_roundtrip() {
        let m = Metadata {
            last_written: 513,
            last_written_len: 1024,
            version: 0xFFFD,
        };
        assert_eq!(Metadata::from_bytes(&m.to_bytes()), m);
    }

    #[test]
    fn blank_metadata_matches_erased_flash() {
        let m = Metadata::from_bytes(&[0xFF; META_LEN]);
        assert_eq!(m.version, 0xFFFF);
        assert!(!BankVersion::from_raw(m.version).is_used());
    }

    #[test]
    fn bank_layout_is_contiguous() {
        assert_eq!(NAMEMAP_OFFSET, NUMBER_OF_SECTORS);
        assert_eq!(META_OFFSET, NAMEMAP_OFFSET + MAX_NUMBER_OF_FILES * ENTRY_LEN);
        assert!(BANK_LEN <= SUPER_SECTOR_SIZE);
        assert_eq!(entry_addr(1, 2), bank_base(1) + NAMEMAP_OFFSET as u32 + 32);
    }

    #[test]
    fn version_order_prefers_smaller_used_values() {
        let used = |v| BankVersion::from_raw(v);
        assert!(used(0xFFFD) > used(0xFFFE));
        assert!(used(1) > used(2));
        assert!(used(5) > used(0xFFFD));
    }

    #[test]
    fn sentinel_outranks_blank_but_loses_to_used() {
        let blank = BankVersion::from_raw(0xFFFF);
        let sentinel = BankVersion::from_raw(VERSION_MAX);
        let used = BankVersion::from_raw(1);
        assert!(sentinel > blank);
        assert!(used > sentinel);
        assert!(used > blank);
        assert_eq!(blank.cmp(&BankVersion::from_raw(0xFFFF)), Ordering::Equal);
    }
}
