//! Sector ownership map.
//!
//! One byte per data sector. A cell either names the file occupying the
//! sector or carries one of three reserved markers. In write mode the map
//! lives in RAM and every mutation lands here; in read mode the map is
//! whatever the active superblock bank says.

use alloc::vec::Vec;

use crate::NUMBER_OF_SECTORS;

/// The sector holds no live data but has not been erased since release.
pub const EMPTY: u8 = 0xFE;

/// The sector is blank (all ones) and ready to program.
pub const ERASED: u8 = 0xFF;

/// The sector failed a write verification and is never allocated again.
pub const BAD: u8 = 0xFD;

/// Largest cell value that still denotes a file id.
pub const MAX_FILE_ID: u8 = 0xFC;

/// Index of scan slot `i` in the circular order rooted at `last_written`.
///
/// Allocation and background reclamation both walk the map in this order,
/// which biases activity forward from the current tail and spreads erases
/// across the device.
#[must_use]
pub fn rotated(last_written: u16, i: usize) -> usize {
    (last_written as usize + i) % NUMBER_OF_SECTORS
}

/// The RAM copy of the sector map held while the filesystem is writable.
pub struct SectorMap {
    cells: Vec<u8>,
}

impl SectorMap {
    /// Wrap the raw map bytes read out of the active bank.
    ///
    /// # Panics
    ///
    /// Panics if `cells` is not exactly one byte per sector.
    #[must_use]
    pub fn from_bytes(cells: Vec<u8>) -> Self {
        assert_eq!(cells.len(), NUMBER_OF_SECTORS);
        SectorMap { cells }
    }

    /// Cell value for sector `i`.
    #[must_use]
    pub fn get(&self, i: usize) -> u8 {
        self.cells[i]
    }

    /// Set the cell for sector `i`.
    pub fn set(&mut self, i: usize, v: u8) {
        self.cells[i] = v;
    }

    /// The raw bytes, for programming into a bank.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.cells
    }

    /// Promote released cells that background reclamation already erased.
    ///
    /// `erased_max` counts rotated scan slots covered during the previous
    /// read-mode epoch; every `EMPTY` cell in that range is physically
    /// blank by now and can be handed out without another erase.
    pub fn promote_erased(&mut self, last_written: u16, erased_max: u16) {
        for i in 0..erased_max as usize {
            let s = rotated(last_written, i);
            if self.cells[s] == EMPTY {
                self.cells[s] = ERASED;
            }
        }
    }

    /// Drop file `id` from the map during compaction.
    ///
    /// Cells owned by `id` are released and every higher file id shifts
    /// down by one so ownership stays aligned with the compacted namemap.
    /// Markers are untouched.
    pub fn retire_id(&mut self, id: u8) {
        for c in &mut self.cells {
            if *c == id {
                *c = EMPTY;
            } else if *c < BAD && *c > id {
                *c -= 1;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::vec;

    fn map_with(cells: &[(usize, u8)]) -> SectorMap {
        let mut m = SectorMap::from_bytes(vec![ERASED; NUMBER_OF_SECTORS]);
        for &(i, v) in cells {
            m.set(i, v);
        }
        m
    }

    #[test]
    fn markers_do_not_collide_with_file_ids() {
        assert!(MAX_FILE_ID < BAD);
        assert!(BAD < EMPTY);
        assert!(EMPTY < ERASED);
    }

    #[test]
    fn rotated_order_wraps() {
        assert_eq!(rotated(0, 5), 5);
        assert_eq!(rotated((NUMBER_OF_SECTORS - 1) as u16, 2), 1);
    }

    #[test]
    fn retire_shifts_higher_ids_down() {
        let mut m = map_with(&[(0, 0), (1, 2), (2, 2), (3, 5), (4, BAD), (5, EMPTY)]);
        m.retire_id(2);
        assert_eq!(m.get(0), 0);
        assert_eq!(m.get(1), EMPTY);
        assert_eq!(m.get(2), EMPTY);
        assert_eq!(m.get(3), 4);
        assert_eq!(m.get(4), BAD);
        assert_eq!(m.get(5), EMPTY);
    }

    #[test]
    fn retire_leaves_lower_ids_alone() {
        let mut m = map_with(&[(0, 0), (1, 1), (2, 3)]);
        m.retire_id(3);
        assert_eq!(m.get(0), 0);
        assert_eq!(m.get(1), 1);
        assert_eq!(m.get(2), EMPTY);
    }

    #[test]
    fn repeated_retire_matches_dense_renumbering() {
        // files 0..=4 on sectors 0..=4; drop 1 and 3 (as a repack would,
        // lowest id first with the threshold already shifted)
        let mut m = map_with(&[(0, 0), (1, 1), (2, 2), (3, 3), (4, 4)]);
        m.retire_id(1);
        m.retire_id(2); // old id 3, shifted down once
        assert_eq!(m.get(0), 0);
        assert_eq!(m.get(1), EMPTY);
        assert_eq!(m.get(2), 1); // was 2
        assert_eq!(m.get(3), EMPTY);
        assert_eq!(m.get(4), 2); // was 4
    }

    #[test]
    fn promote_only_covers_the_scanned_range() {
        let mut m = map_with(&[(0, EMPTY), (1, EMPTY), (2, EMPTY)]);
        m.promote_erased(0, 2);
        assert_eq!(m.get(0), ERASED);
        assert_eq!(m.get(1), ERASED);
        assert_eq!(m.get(2), EMPTY);
    }

    #[test]
    fn promote_respects_the_rotated_origin() {
        let last = (NUMBER_OF_SECTORS - 1) as u16;
        let mut m = map_with(&[(NUMBER_OF_SECTORS - 1, EMPTY), (0, EMPTY), (1, 7)]);
        m.promote_erased(last, 2);
        assert_eq!(m.get(NUMBER_OF_SECTORS - 1), ERASED);
        assert_eq!(m.get(0), ERASED);
        assert_eq!(m.get(1), 7);
    }
}
