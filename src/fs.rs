//! The filesystem core: mode discipline, the dual-bank repack, and the
//! file operations.

use alloc::vec;

use crc::{CRC_8_SMBUS, Crc};
use log::{debug, trace, warn};

use crate::file::{FileFlags, FileHandle, Mode};
use crate::flash::{Area, FlashAccess};
use crate::map::{self, SectorMap};
use crate::name::{self, EncodedName};
use crate::superblock::{self, BankVersion, Metadata, NamemapEntry, VERSION_MAX};
use crate::{Error, FLASH_SECTOR_SIZE, MAX_NUMBER_OF_FILES, NUMBER_OF_SECTORS, SUPER_SECTOR_SIZE};

const CRC8: Crc<u8> = Crc::<u8>::new(&CRC_8_SMBUS);

const SECTOR_LEN: u32 = FLASH_SECTOR_SIZE as u32;

/// The filesystem instance.
///
/// Owns the flash backend and, while in write mode, the RAM copy of the
/// sector map. Exactly one of read mode and write mode is active at any
/// time: every mutating operation requires write mode, and switching back
/// to read mode publishes all pending state by repacking the superblock
/// into the inactive bank.
pub struct ZeroFs<F: FlashAccess> {
    flash: F,
    ram_map: Option<SectorMap>,
    meta: Metadata,
    bank: u8,
    last_namemap_id: u8,
    erased_max: u16,
    verify_period: u8,
    verify_cnt: u8,
}

impl<F: FlashAccess> ZeroFs<F> {
    /// Mount the filesystem found on `flash`.
    ///
    /// Reads both superblock banks and activates the one whose version
    /// ranks newest; if neither bank has ever been written the filesystem
    /// comes up empty. The instance starts in read mode.
    pub fn new(flash: F) -> Result<Self, Error> {
        let mut zfs = ZeroFs {
            flash,
            ram_map: None,
            meta: Metadata::BLANK,
            bank: 0,
            last_namemap_id: 0,
            erased_max: 0,
            verify_period: 0,
            verify_cnt: 0,
        };
        zfs.boot()?;
        Ok(zfs)
    }

    /// Give the flash backend back, consuming the instance.
    ///
    /// Pending write-mode state is *not* published; call
    /// [`set_read_mode`](Self::set_read_mode) first if it matters.
    pub fn into_flash(self) -> F {
        self.flash
    }

    /// Direct access to the flash backend, e.g. for simulator knobs.
    pub fn flash_mut(&mut self) -> &mut F {
        &mut self.flash
    }

    /// Enable read-back verification: every `period`-th data program is
    /// re-read and checksummed. 0 disables.
    pub fn set_verify(&mut self, period: u8) {
        self.verify_period = period;
        self.verify_cnt = period;
    }

    /// Whether the filesystem is in read mode.
    #[must_use]
    pub fn is_read_only(&self) -> bool {
        self.ram_map.is_none()
    }

    fn boot(&mut self) -> Result<(), Error> {
        let m0 = self.read_meta(0)?;
        let m1 = self.read_meta(1)?;
        let v0 = BankVersion::from_raw(m0.version);
        let v1 = BankVersion::from_raw(m1.version);
        use core::cmp::Ordering;
        let chosen = match v0.cmp(&v1) {
            Ordering::Greater => Some((0, m0)),
            Ordering::Less => Some((1, m1)),
            // two banks with the same used version only arise from
            // corruption; keep bank 0. Matching reset states mean empty.
            Ordering::Equal if v0.is_used() => Some((0, m0)),
            Ordering::Equal => None,
        };
        match chosen {
            Some((bank, meta)) => {
                self.bank = bank;
                self.meta = meta;
                self.last_namemap_id = self.scan_last_namemap_id()?;
                debug!(
                    "mounted bank {} version {:#06x}, {} namemap slots used",
                    self.bank, self.meta.version, self.last_namemap_id
                );
            }
            None => {
                self.bank = 0;
                self.meta = Metadata::BLANK;
                self.last_namemap_id = 0;
                debug!("no valid superblock bank, mounting empty");
            }
        }
        self.erased_max = 0;
        Ok(())
    }

    /// Switch to write mode, materialising the sector map in RAM.
    ///
    /// Released sectors that background reclamation already erased are
    /// promoted so the allocator can hand them out without further I/O.
    /// A no-op when already in write mode.
    pub fn set_write_mode(&mut self) -> Result<(), Error> {
        if self.ram_map.is_some() {
            return Ok(());
        }
        let mut bytes = vec![0u8; NUMBER_OF_SECTORS];
        self.flash
            .read(Area::Super, superblock::map_addr(self.bank), &mut bytes)
            .map_err(|_| Error::Open)?;
        let mut m = SectorMap::from_bytes(bytes);
        m.promote_erased(self.meta.last_written, self.erased_max);
        self.erased_max = 0;
        self.ram_map = Some(m);
        debug!("write mode enabled");
        Ok(())
    }

    /// Switch to read mode, publishing all pending state via a repack.
    /// A no-op when already in read mode.
    pub fn set_read_mode(&mut self) -> Result<(), Error> {
        if self.ram_map.is_none() {
            return Ok(());
        }
        self.repack_superblock()?;
        self.ram_map = None;
        debug!("read mode enabled");
        Ok(())
    }

    /// Erase the filesystem: both superblock banks are wiped and every
    /// file is gone. Requires write mode; leaves the instance in read
    /// mode. Data sectors are not touched, they are reclaimed lazily.
    pub fn format(&mut self) -> Result<(), Error> {
        if self.is_read_only() {
            return Err(Error::ReadMode);
        }
        self.ram_map = None;
        self.meta = Metadata::BLANK;
        self.last_namemap_id = 0;
        self.erased_max = 0;
        for bank in 0..2u8 {
            self.flash
                .erase(
                    Area::Super,
                    superblock::bank_base(bank),
                    SUPER_SECTOR_SIZE as u32,
                    false,
                )
                .map_err(|_| Error::BadSector)?;
        }
        debug!("formatted");
        Ok(())
    }

    /// One step of lazy reclamation: erase the next released sector, if
    /// any. Read mode only; silently does nothing in write mode.
    ///
    /// The erase is issued with the background hint and the map is left
    /// saying `EMPTY`; the next switch into write mode promotes every
    /// cell this walk covered.
    pub fn background_erase(&mut self) -> Result<(), Error> {
        if !self.is_read_only() {
            return Ok(());
        }
        for i in self.erased_max..NUMBER_OF_SECTORS as u16 {
            let s = map::rotated(self.meta.last_written, i as usize);
            if self.map_get(s)? == map::EMPTY {
                self.flash
                    .erase(Area::Data, s as u32 * SECTOR_LEN, SECTOR_LEN, true)
                    .map_err(|_| Error::BadSector)?;
                self.erased_max = i + 1;
                trace!("background erased sector {s}");
                return Ok(());
            }
        }
        Ok(())
    }

    /// Open an existing file for reading.
    pub fn open(&mut self, file_name: &str) -> Result<FileHandle, Error> {
        let (encoded, ty) = name::encode(file_name)?;
        let id = self.find_by_name(&encoded, ty)?.ok_or(Error::NotFound)?;
        let entry = self.read_entry(self.bank, id)?;
        Ok(FileHandle {
            id,
            mode: Mode::ReadOnly,
            sector: entry.first_sector,
            pos: entry.first_offset,
            file_type: entry.file_type(),
            size: entry.size(),
            flags: FileFlags::empty(),
        })
    }

    /// Create a file, replacing any existing file of the same name.
    ///
    /// The new file starts inside the previous file's tail sector when
    /// that sector is only partially used, otherwise a free sector is
    /// claimed (erasing it first if it was merely released). The handle
    /// is write-only; the file becomes visible to [`open`](Self::open)
    /// once it is closed.
    pub fn create(&mut self, file_name: &str) -> Result<FileHandle, Error> {
        if self.is_read_only() {
            return Err(Error::ReadMode);
        }
        let (encoded, ty) = name::encode(file_name)?;
        match self.delete_encoded(&encoded, ty) {
            Ok(()) | Err(Error::NotFound) => {}
            Err(e) => return Err(e),
        }
        let id = self.find_slot()?;

        let mut file = FileHandle {
            id,
            mode: Mode::WriteOnly,
            file_type: ty,
            ..FileHandle::default()
        };
        if self.meta.last_written_len > 0 && (self.meta.last_written_len as usize) < FLASH_SECTOR_SIZE
        {
            // tail sharing: squeeze in after the previous file's last byte
            file.flags |= FileFlags::NO_MORE;
            file.sector = self.meta.last_written;
            file.pos = self.meta.last_written_len;
        } else {
            file.sector = self.find_free_block().ok_or(Error::NoSpace)?;
            file.pos = 0;
        }

        if self.map_cell(file.sector) == map::EMPTY {
            self.erase_data_sector(file.sector)?;
        }
        if self.map_cell(file.sector) == map::ERASED {
            self.ram_map
                .as_mut()
                .expect("write mode")
                .set(file.sector as usize, id);
        }

        let entry = NamemapEntry::in_progress(encoded, file.sector, file.pos);
        self.program_entry(self.bank, id, &entry)?;
        trace!("created slot {id} at sector {} offset {}", file.sector, file.pos);
        Ok(file)
    }

    /// Append bytes to a write-only file.
    ///
    /// Returns the number of bytes written (all of `buf` unless an error
    /// cuts the write short). Crossing a sector boundary claims the next
    /// free sector; if none is left the file's sectors are released, the
    /// handle is closed and the write fails with [`Error::NoSpace`].
    pub fn write(&mut self, file: &mut FileHandle, buf: &[u8]) -> Result<usize, Error> {
        if self.is_read_only() {
            return Err(Error::ReadMode);
        }
        match file.mode {
            Mode::WriteOnly => {}
            Mode::Closed => return Err(Error::InvalidHandle),
            Mode::ReadOnly => return Err(Error::ReadMode),
        }

        let mut written = 0usize;
        while written < buf.len() {
            let room = FLASH_SECTOR_SIZE - file.pos as usize;
            let l = (buf.len() - written).min(room);
            if l > 0 {
                let addr = u32::from(file.sector) * SECTOR_LEN + u32::from(file.pos);
                let chunk = &buf[written..written + l];
                self.flash
                    .program(Area::Data, addr, chunk)
                    .map_err(|_| Error::BadSector)?;
                if self.verify_due() && !self.verify_chunk(addr, chunk) {
                    self.ram_map
                        .as_mut()
                        .expect("write mode")
                        .set(file.sector as usize, map::BAD);
                    warn!("sector {} failed read-back verification", file.sector);
                    return Err(Error::BadSector);
                }
                file.pos += l as u16;
                file.size += l as u32;
                written += l;
                self.meta.last_written = file.sector;
                self.meta.last_written_len = file.pos;
            } else {
                // sector boundary: claim the next sector before going on
                file.flags.remove(FileFlags::NO_MORE);
                match self.find_free_block() {
                    Some(s) => {
                        if self.map_cell(s) != map::ERASED {
                            self.erase_data_sector(s)?;
                        }
                        self.ram_map
                            .as_mut()
                            .expect("write mode")
                            .set(s as usize, file.id);
                        file.sector = s;
                        file.pos = 0;
                    }
                    None => {
                        self.release_sectors(file.id);
                        file.mode = Mode::Closed;
                        return Err(Error::NoSpace);
                    }
                }
            }
        }
        Ok(written)
    }

    /// Read bytes sequentially from a read-only file.
    ///
    /// Fills all of `buf` and returns its length; reading past the end of
    /// the file is not bounds-checked beyond the sector chain itself.
    pub fn read(&mut self, file: &mut FileHandle, buf: &mut [u8]) -> Result<usize, Error> {
        match file.mode {
            Mode::ReadOnly => {}
            Mode::Closed => return Err(Error::InvalidHandle),
            Mode::WriteOnly => return Err(Error::WriteMode),
        }

        let mut done = 0usize;
        while done < buf.len() {
            if file.pos as usize >= FLASH_SECTOR_SIZE {
                file.sector = self
                    .next_sector_with_id(file.sector, file.id)?
                    .ok_or(Error::Overflow)?;
                file.pos = 0;
            }
            let room = FLASH_SECTOR_SIZE - file.pos as usize;
            let l = (buf.len() - done).min(room);
            let addr = u32::from(file.sector) * SECTOR_LEN + u32::from(file.pos);
            self.flash
                .read(Area::Data, addr, &mut buf[done..done + l])
                .map_err(|_| Error::Open)?;
            file.pos += l as u16;
            done += l;
        }
        Ok(done)
    }

    /// Reposition a read-only file.
    ///
    /// Non-negative `pos` counts from the start, negative from the end.
    /// Positions at or beyond the file length fail with [`Error::Arg`].
    pub fn seek(&mut self, file: &mut FileHandle, pos: i32) -> Result<(), Error> {
        if !self.is_read_only() {
            return Err(Error::WriteMode);
        }
        match file.mode {
            Mode::ReadOnly => {}
            Mode::Closed => return Err(Error::InvalidHandle),
            Mode::WriteOnly => return Err(Error::WriteMode),
        }
        if pos.unsigned_abs() >= file.size {
            return Err(Error::Arg);
        }
        let target = if pos < 0 {
            file.size - pos.unsigned_abs()
        } else {
            pos as u32
        };

        let entry = self.read_entry(self.bank, file.id)?;
        let first_fill = SECTOR_LEN - u32::from(entry.first_offset);
        if target < first_fill {
            file.sector = entry.first_sector;
            file.pos = entry.first_offset + target as u16;
        } else {
            // consume the first sector's fill, then whole sectors
            let mut remaining = target - first_fill;
            let mut sector = entry.first_sector;
            loop {
                sector = self
                    .next_sector_with_id(sector, file.id)?
                    .ok_or(Error::Overflow)?;
                if remaining < SECTOR_LEN {
                    break;
                }
                remaining -= SECTOR_LEN;
            }
            file.sector = sector;
            file.pos = remaining as u16;
        }
        Ok(())
    }

    /// Close a file.
    ///
    /// For a write handle this publishes the final type and length into
    /// the namemap slot, making the file visible to future opens — the
    /// all-ones placeholder goes down to the real word, which flash
    /// programming permits in place. Closing a read handle or an already
    /// closed handle just marks it closed.
    pub fn close(&mut self, file: &mut FileHandle) -> Result<(), Error> {
        if file.mode == Mode::WriteOnly && !self.is_read_only() {
            let type_len = (u32::from(file.file_type) << 24) | (file.size & 0x00FF_FFFF);
            let addr =
                superblock::entry_addr(self.bank, file.id) + superblock::TYPE_LEN_OFFSET as u32;
            self.flash
                .program(Area::Super, addr, &type_len.to_le_bytes())
                .map_err(|_| Error::BadSector)?;
        }
        file.mode = Mode::Closed;
        Ok(())
    }

    /// Reopen an existing file for appending.
    ///
    /// The file moves to a fresh namemap slot (the old slot cannot be
    /// reopened in place on flash); its sector chain is transferred to
    /// the new id and the handle comes back write-only, positioned at the
    /// current end.
    pub fn append(&mut self, file_name: &str) -> Result<FileHandle, Error> {
        if self.is_read_only() {
            return Err(Error::ReadMode);
        }
        let (encoded, ty) = name::encode(file_name)?;
        self.find_by_name(&encoded, ty)?.ok_or(Error::NotFound)?;
        let new_id = self.find_slot()?;
        // the slot hunt may have repacked and renumbered, look again
        let old_id = self.find_by_name(&encoded, ty)?.ok_or(Error::NotFound)?;
        let old = self.read_entry(self.bank, old_id)?;

        let size = old.size();
        let mut file = FileHandle {
            id: new_id,
            mode: Mode::WriteOnly,
            file_type: ty,
            size,
            pos: ((size + u32::from(old.first_offset)) % SECTOR_LEN) as u16,
            ..FileHandle::default()
        };

        // walk the chain to the sector holding the current tail
        let first_fill = SECTOR_LEN - u32::from(old.first_offset);
        let mut sector = old.first_sector;
        if size > first_fill {
            let mut remaining = size - first_fill;
            while remaining > 0 {
                sector = self
                    .next_sector_with_id(sector, old_id)?
                    .ok_or(Error::Overflow)?;
                remaining = remaining.saturating_sub(SECTOR_LEN);
            }
        }
        file.sector = sector;

        if file.pos == 0 {
            // tail ended exactly on a boundary, start on a fresh sector
            let s = self.find_free_block().ok_or(Error::NoSpace)?;
            if self.map_cell(s) == map::EMPTY {
                self.erase_data_sector(s)?;
            }
            self.ram_map
                .as_mut()
                .expect("write mode")
                .set(s as usize, new_id);
            file.sector = s;
        }

        // hand the whole chain over to the new id
        let m = self.ram_map.as_mut().expect("write mode");
        for i in 0..NUMBER_OF_SECTORS {
            if m.get(i) == old_id {
                m.set(i, new_id);
            }
        }

        let entry = NamemapEntry::in_progress(encoded, old.first_sector, old.first_offset);
        self.program_entry(self.bank, new_id, &entry)?;
        self.zero_entry_head(old_id)?;
        trace!("append moved slot {old_id} to {new_id}");
        Ok(file)
    }

    /// Delete a file by name.
    pub fn delete(&mut self, file_name: &str) -> Result<(), Error> {
        if self.is_read_only() {
            return Err(Error::ReadMode);
        }
        let (encoded, ty) = name::encode(file_name)?;
        self.delete_encoded(&encoded, ty)
    }

    fn delete_encoded(&mut self, encoded: &EncodedName, ty: u8) -> Result<(), Error> {
        let id = self.find_by_name(encoded, ty)?.ok_or(Error::NotFound)?;
        self.delete_by_id(id)
    }

    fn delete_by_id(&mut self, id: u8) -> Result<(), Error> {
        let entry = self.read_entry(self.bank, id)?;
        self.zero_entry_head(id)?;

        let from = entry.first_sector as usize;
        let mut last = None;
        {
            let m = self.ram_map.as_mut().expect("write mode");
            for i in 0..NUMBER_OF_SECTORS {
                let s = (from + i) % NUMBER_OF_SECTORS;
                if m.get(s) == id {
                    last = Some(s as u16);
                    m.set(s, map::EMPTY);
                }
            }
        }
        if let Some(last) = last {
            // the released tail may double as the head of a later file
            // that started inside it; give the cell back to that file
            if let Some(owner) = self.find_by_first_sector(last)? {
                self.ram_map
                    .as_mut()
                    .expect("write mode")
                    .set(last as usize, owner);
            }
        }
        trace!("deleted slot {id}");
        Ok(())
    }

    /// Copy the live superblock into the inactive bank and flip to it.
    ///
    /// Deleted and never-closed namemap slots are compacted away; for
    /// each dropped slot the sector map is renumbered in lockstep so
    /// ownership follows the new, dense ids. The version is decremented
    /// last-but-one and the bank flip is the final store, so a crash
    /// anywhere in between leaves the old bank authoritative.
    fn repack_superblock(&mut self) -> Result<(), Error> {
        debug_assert!(self.ram_map.is_some());
        let nb = self.bank ^ 1;
        self.flash
            .erase(Area::Super, superblock::bank_base(nb), SUPER_SECTOR_SIZE as u32, false)
            .map_err(|_| Error::BadSector)?;

        let mut dropped = 0u8;
        let mut next_id = 0u8;
        for id in 0..=self.last_namemap_id {
            if id as usize >= MAX_NUMBER_OF_FILES {
                break;
            }
            let entry = self.read_entry(self.bank, id)?;
            if entry.is_valid() {
                self.program_entry(nb, next_id, &entry)?;
                next_id += 1;
            } else {
                self.ram_map
                    .as_mut()
                    .expect("write mode")
                    .retire_id(id - dropped);
                dropped += 1;
            }
        }
        self.last_namemap_id = next_id;

        self.flash
            .program(
                Area::Super,
                superblock::map_addr(nb),
                self.ram_map.as_ref().expect("write mode").as_bytes(),
            )
            .map_err(|_| Error::BadSector)?;

        self.meta.version = self.meta.version.wrapping_sub(1);
        if self.meta.version == 0 {
            self.meta.version = VERSION_MAX;
        }
        self.flash
            .program(Area::Super, superblock::meta_addr(nb), &self.meta.to_bytes())
            .map_err(|_| Error::BadSector)?;

        if self.meta.version == VERSION_MAX {
            // ground-state restart: the retiring bank must not be left
            // carrying a version that would outrank the sentinel
            self.flash
                .erase(
                    Area::Super,
                    superblock::bank_base(self.bank),
                    SUPER_SECTOR_SIZE as u32,
                    false,
                )
                .map_err(|_| Error::BadSector)?;
        }
        self.bank = nb;
        debug!(
            "repacked into bank {nb}, {next_id} slots live, version {:#06x}",
            self.meta.version
        );
        Ok(())
    }

    /// Hand out the next namemap slot, compacting once if the table is
    /// exhausted.
    fn find_slot(&mut self) -> Result<u8, Error> {
        let mut id = self.last_namemap_id;
        self.last_namemap_id += 1;
        if self.last_namemap_id as usize >= MAX_NUMBER_OF_FILES {
            self.repack_superblock()?;
            id = self.last_namemap_id;
            if id as usize >= MAX_NUMBER_OF_FILES {
                return Err(Error::MaxFiles);
            }
            self.last_namemap_id += 1;
        }
        Ok(id)
    }

    /// Find a sector for new data: the first `ERASED` cell in the scan
    /// order rooted at the write tail, falling back to the first `EMPTY`
    /// cell seen in the same pass (which the caller must erase).
    fn find_free_block(&self) -> Option<u16> {
        let m = self.ram_map.as_ref()?;
        let mut fallback = None;
        for i in 0..NUMBER_OF_SECTORS {
            let s = map::rotated(self.meta.last_written, i);
            match m.get(s) {
                map::ERASED => return Some(s as u16),
                map::EMPTY if fallback.is_none() => fallback = Some(s as u16),
                _ => {}
            }
        }
        fallback
    }

    /// Next cell carrying `id`, scanning circularly after `from` (and
    /// ending on `from` itself).
    fn next_sector_with_id(&mut self, from: u16, id: u8) -> Result<Option<u16>, Error> {
        for i in 1..=NUMBER_OF_SECTORS {
            let s = (from as usize + i) % NUMBER_OF_SECTORS;
            if self.map_get(s)? == id {
                return Ok(Some(s as u16));
            }
        }
        Ok(None)
    }

    /// Slot whose name and type match, if any.
    fn find_by_name(&mut self, encoded: &EncodedName, ty: u8) -> Result<Option<u8>, Error> {
        for id in 0..MAX_NUMBER_OF_FILES as u8 {
            let e = self.read_entry(self.bank, id)?;
            if e.name == *encoded && e.file_type() == ty && e.name != [0u8; 6] {
                return Ok(Some(id));
            }
        }
        Ok(None)
    }

    /// Slot of the live or in-progress file whose chain starts at
    /// `sector`, if any.
    fn find_by_first_sector(&mut self, sector: u16) -> Result<Option<u8>, Error> {
        for id in 0..self.last_namemap_id {
            let e = self.read_entry(self.bank, id)?;
            if e.type_len != 0 && e.name != [0u8; 6] && e.first_sector == sector {
                return Ok(Some(id));
            }
        }
        Ok(None)
    }

    fn scan_last_namemap_id(&mut self) -> Result<u8, Error> {
        let mut last = 0;
        for id in 0..MAX_NUMBER_OF_FILES as u8 {
            let e = self.read_entry(self.bank, id)?;
            if e.type_len != 0 && !e.is_in_progress() {
                last = id + 1;
            }
        }
        Ok(last)
    }

    /// Sector map cell, from RAM in write mode or the active bank in
    /// read mode.
    fn map_get(&mut self, i: usize) -> Result<u8, Error> {
        if let Some(m) = &self.ram_map {
            return Ok(m.get(i));
        }
        let mut b = [0u8; 1];
        self.flash
            .read(Area::Super, superblock::map_addr(self.bank) + i as u32, &mut b)
            .map_err(|_| Error::Open)?;
        Ok(b[0])
    }

    /// RAM map cell; write mode only.
    fn map_cell(&self, sector: u16) -> u8 {
        self.ram_map.as_ref().expect("write mode").get(sector as usize)
    }

    fn erase_data_sector(&mut self, sector: u16) -> Result<(), Error> {
        self.flash
            .erase(Area::Data, u32::from(sector) * SECTOR_LEN, SECTOR_LEN, false)
            .map_err(|_| Error::BadSector)?;
        self.ram_map
            .as_mut()
            .expect("write mode")
            .set(sector as usize, map::ERASED);
        Ok(())
    }

    fn release_sectors(&mut self, id: u8) {
        let m = self.ram_map.as_mut().expect("write mode");
        for i in 0..NUMBER_OF_SECTORS {
            if m.get(i) == id {
                m.set(i, map::EMPTY);
            }
        }
    }

    fn verify_due(&mut self) -> bool {
        if self.verify_period == 0 {
            return false;
        }
        self.verify_cnt -= 1;
        if self.verify_cnt == 0 {
            self.verify_cnt = self.verify_period;
            true
        } else {
            false
        }
    }

    /// Read the chunk back and compare checksums. Any failure to read
    /// counts as a failed verification.
    fn verify_chunk(&mut self, addr: u32, chunk: &[u8]) -> bool {
        let expected = CRC8.checksum(chunk);
        let mut back = vec![0u8; chunk.len()];
        if self.flash.read(Area::Data, addr, &mut back).is_err() {
            return false;
        }
        CRC8.checksum(&back) == expected
    }

    fn read_entry(&mut self, bank: u8, id: u8) -> Result<NamemapEntry, Error> {
        let mut b = [0u8; superblock::ENTRY_LEN];
        self.flash
            .read(Area::Super, superblock::entry_addr(bank, id), &mut b)
            .map_err(|_| Error::Open)?;
        Ok(NamemapEntry::from_bytes(&b))
    }

    fn program_entry(&mut self, bank: u8, id: u8, entry: &NamemapEntry) -> Result<(), Error> {
        self.flash
            .program(Area::Super, superblock::entry_addr(bank, id), &entry.to_bytes())
            .map_err(|_| Error::BadSector)
    }

    /// Invalidate a slot in place by zeroing its name and first sector.
    /// Zeroing only clears bits, so this is programmable from any state.
    fn zero_entry_head(&mut self, id: u8) -> Result<(), Error> {
        self.flash
            .program(Area::Super, superblock::entry_addr(self.bank, id), &[0u8; 8])
            .map_err(|_| Error::BadSector)
    }

    fn read_meta(&mut self, bank: u8) -> Result<Metadata, Error> {
        let mut b = [0u8; superblock::META_LEN];
        self.flash
            .read(Area::Super, superblock::meta_addr(bank), &mut b)
            .map_err(|_| Error::Open)?;
        Ok(Metadata::from_bytes(&b))
    }
}

#[cfg(test)]
impl<F: FlashAccess> ZeroFs<F> {
    pub(crate) fn probe_map_cell(&mut self, i: usize) -> u8 {
        self.map_get(i).unwrap()
    }

    pub(crate) fn probe_meta(&self) -> Metadata {
        self.meta
    }

    pub(crate) fn probe_bank(&self) -> u8 {
        self.bank
    }

    pub(crate) fn probe_last_namemap_id(&self) -> u8 {
        self.last_namemap_id
    }

    pub(crate) fn probe_erased_max(&self) -> u16 {
        self.erased_max
    }

    pub(crate) fn probe_entry(&mut self, id: u8) -> NamemapEntry {
        self.read_entry(self.bank, id).unwrap()
    }
}
