//! In-memory flash simulator.
//!
//! The reference backend for development and testing: two RAM-backed
//! areas (data and super) with NOR semantics — programs AND bits down,
//! erases bring whole sectors back to ones — plus per-sector wear
//! counters, an optional wear-driven bad-block model, and an elapsed-time
//! account fed by the configured timing parameters.
//!
//! Reads from a sector that has gone bad return `0x55` filler instead of
//! the stored bytes, which is what lets the filesystem's sampled CRC
//! verification catch the failure.

use alloc::vec;
use alloc::vec::Vec;

use log::warn;

use crate::flash::{AccessError, Area, FlashAccess, program_overwrite_ok};
use crate::{FLASH_SECTOR_SIZE, FLASH_SIZE_KB, SUPER_SECTOR_SIZE, SUPER_WRITE_GRANULARITY};

/// Geometry and timing of one simulated flash area.
#[derive(Debug, Clone, Copy)]
pub struct FlashProps {
    /// Total size in bytes.
    pub size: u32,
    /// Erase unit in bytes.
    pub sector_size: u32,
    /// Program alignment in bytes.
    pub write_granularity: u32,
    /// Sector erase time.
    pub erase_time_us: f64,
    /// Page program time.
    pub page_program_us: f64,
    /// Setup time for the first programmed byte.
    pub first_byte_us: f64,
    /// Per-byte program time after the first.
    pub per_byte_us: f64,
    /// Bus transfer time per byte.
    pub comm_byte_us: f64,
    /// Nominal erase cycles before the bad-block probability reaches 1.
    pub lifecycle: u32,
}

impl FlashProps {
    /// A 4 MB SPI NOR data flash, byte programmable.
    #[must_use]
    pub fn data_default() -> Self {
        FlashProps {
            size: (FLASH_SIZE_KB * 1024) as u32,
            sector_size: FLASH_SECTOR_SIZE as u32,
            write_granularity: 1,
            erase_time_us: 45_000.0,
            page_program_us: 700.0,
            first_byte_us: 8.0,
            per_byte_us: 2.5,
            comm_byte_us: 0.1,
            lifecycle: 100_000,
        }
    }

    /// The on-chip super flash: two bank sectors, word programmed.
    #[must_use]
    pub fn super_default() -> Self {
        FlashProps {
            size: 2 * SUPER_SECTOR_SIZE as u32,
            sector_size: SUPER_SECTOR_SIZE as u32,
            write_granularity: SUPER_WRITE_GRANULARITY as u32,
            erase_time_us: 20_000.0,
            page_program_us: 100.0,
            first_byte_us: 1.0,
            per_byte_us: 0.5,
            comm_byte_us: 0.0,
            lifecycle: 10_000,
        }
    }
}

/// Wear summary of one area, see [`SimFlash::wear_stats`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WearStats {
    /// Mean erase count across sectors.
    pub average: f64,
    /// Standard deviation of the erase counts.
    pub stddev: f64,
    /// Fewest erases seen on a sector.
    pub min: u32,
    /// Most erases seen on a sector.
    pub max: u32,
}

/// xoshiro-style generator driving the bad-block lottery; deterministic
/// for a given seed.
struct Rng {
    state: [u32; 4],
}

impl Rng {
    fn new(seed: u32) -> Self {
        let mut state = [1014776995, 476057059, 3301633994, 706340607];
        state[0] ^= seed;
        state[2] ^= seed.rotate_left(16);
        Rng { state }
    }

    fn next_u32(&mut self) -> u32 {
        let result = (self.state[0].wrapping_add(self.state[3]))
            .rotate_left(7)
            .wrapping_mul(9);
        let t = self.state[1].wrapping_shr(9);

        self.state[2] ^= self.state[0];
        self.state[3] ^= self.state[1];
        self.state[1] ^= self.state[2];
        self.state[0] ^= self.state[3];

        self.state[2] ^= t;
        self.state[3] = self.state[3].rotate_left(11);

        result
    }

    /// Uniform draw in `[0, 1)`.
    fn next_unit(&mut self) -> f64 {
        f64::from(self.next_u32() >> 8) / f64::from(1u32 << 24)
    }
}

/// Bad-block probability after `wear` erases of a sector rated for
/// `lifecycle` cycles.
fn prob_bad(wear: u32, lifecycle: u32) -> f64 {
    let x = (f64::from(wear) / f64::from(lifecycle)).clamp(0.0, 2.0);
    libm::exp(8.0 * (x - 1.0))
}

struct SimArea {
    props: FlashProps,
    bytes: Vec<u8>,
    /// Erase count per sector; negated once the sector has gone bad.
    wear: Vec<i64>,
    elapsed_us: f64,
}

impl SimArea {
    fn new(props: FlashProps) -> Self {
        let sectors = (props.size / props.sector_size) as usize;
        SimArea {
            props,
            bytes: vec![0xFF; props.size as usize],
            wear: vec![0; sectors],
            elapsed_us: 0.0,
        }
    }

    fn sector_of(&self, addr: u32) -> usize {
        (addr / self.props.sector_size) as usize
    }

    fn in_bounds(&self, addr: u32, len: usize) -> bool {
        addr as usize + len <= self.props.size as usize
    }
}

/// The simulated device pair behind a [`ZeroFs`](crate::ZeroFs).
pub struct SimFlash {
    data: SimArea,
    sup: SimArea,
    rng: Rng,
    bad_blocks: bool,
    corrupt_next_program: bool,
}

impl SimFlash {
    /// Both areas with default geometry, bad-block model off.
    #[must_use]
    pub fn new() -> Self {
        SimFlash::with_props(FlashProps::data_default(), FlashProps::super_default())
    }

    /// Custom area geometry.
    #[must_use]
    pub fn with_props(data: FlashProps, sup: FlashProps) -> Self {
        SimFlash {
            data: SimArea::new(data),
            sup: SimArea::new(sup),
            rng: Rng::new(0),
            bad_blocks: false,
            corrupt_next_program: false,
        }
    }

    /// Turn the wear-driven bad-block lottery on, reseeding the
    /// generator so runs are reproducible.
    pub fn enable_bad_blocks(&mut self, seed: u32) {
        self.bad_blocks = true;
        self.rng = Rng::new(seed);
    }

    /// Make the next data program store mangled bytes, as a failing chip
    /// would. The write itself reports success; only reading back
    /// reveals the damage.
    pub fn corrupt_next_program(&mut self) {
        self.corrupt_next_program = true;
    }

    /// Raw bytes of an area, for test inspection.
    #[must_use]
    pub fn bytes(&self, area: Area) -> &[u8] {
        &self.area(area).bytes
    }

    /// Accumulated device busy time of an area in microseconds.
    #[must_use]
    pub fn elapsed_us(&self, area: Area) -> f64 {
        self.area(area).elapsed_us
    }

    /// Erase-count distribution over an area's sectors.
    #[must_use]
    pub fn wear_stats(&self, area: Area) -> WearStats {
        let wear = &self.area(area).wear;
        let counts: Vec<u32> = wear.iter().map(|&w| w.unsigned_abs() as u32).collect();
        let n = counts.len() as f64;
        let average = counts.iter().map(|&c| f64::from(c)).sum::<f64>() / n;
        let sq_diff = counts
            .iter()
            .map(|&c| {
                let d = f64::from(c) - average;
                d * d
            })
            .sum::<f64>();
        WearStats {
            average,
            stddev: libm::sqrt(sq_diff / n),
            min: counts.iter().copied().min().unwrap_or(0),
            max: counts.iter().copied().max().unwrap_or(0),
        }
    }

    fn area(&self, area: Area) -> &SimArea {
        match area {
            Area::Data => &self.data,
            Area::Super => &self.sup,
        }
    }

    fn area_mut(&mut self, area: Area) -> &mut SimArea {
        match area {
            Area::Data => &mut self.data,
            Area::Super => &mut self.sup,
        }
    }
}

impl Default for SimFlash {
    fn default() -> Self {
        SimFlash::new()
    }
}

impl FlashAccess for SimFlash {
    fn read(&mut self, area: Area, addr: u32, buf: &mut [u8]) -> Result<(), AccessError> {
        let a = self.area_mut(area);
        if !a.in_bounds(addr, buf.len()) {
            return Err(AccessError::Corrupt);
        }
        if a.wear[a.sector_of(addr)] < 0 {
            buf.fill(0x55);
        } else {
            let start = addr as usize;
            buf.copy_from_slice(&a.bytes[start..start + buf.len()]);
        }
        a.elapsed_us += a.props.comm_byte_us * buf.len() as f64;
        Ok(())
    }

    fn program(&mut self, area: Area, addr: u32, data: &[u8]) -> Result<(), AccessError> {
        let corrupt = area == Area::Data && core::mem::take(&mut self.corrupt_next_program);
        let a = self.area_mut(area);
        let g = a.props.write_granularity;
        if addr % g != 0 || data.len() as u32 % g != 0 {
            return Err(AccessError::Corrupt);
        }
        if !a.in_bounds(addr, data.len()) {
            return Err(AccessError::Corrupt);
        }
        for (i, &d) in data.iter().enumerate() {
            let cell = &mut a.bytes[addr as usize + i];
            if !program_overwrite_ok(*cell, d) {
                warn!("program raises bits at {area:?}:{:#x}", addr as usize + i);
            }
            *cell &= d;
        }
        if corrupt && !data.is_empty() {
            // a failing program leaves some cells short of their target
            a.bytes[addr as usize] &= 0x55;
            if data.len() > 1 {
                a.bytes[addr as usize + 1] &= 0xAA;
            }
        }
        a.elapsed_us += a.props.comm_byte_us * data.len() as f64
            + a.props.first_byte_us
            + (data.len().saturating_sub(1)) as f64 * a.props.per_byte_us;
        Ok(())
    }

    fn erase(&mut self, area: Area, addr: u32, len: u32, _background: bool) -> Result<(), AccessError> {
        let bad_blocks = self.bad_blocks;
        let roll = if bad_blocks { self.rng.next_unit() } else { 1.0 };
        let a = self.area_mut(area);
        if addr % a.props.sector_size != 0 || len % a.props.sector_size != 0 {
            return Err(AccessError::Corrupt);
        }
        if !a.in_bounds(addr, len as usize) {
            return Err(AccessError::Corrupt);
        }
        if len == 0 {
            return Ok(());
        }
        let start = addr as usize;
        a.bytes[start..start + len as usize].fill(0xFF);
        for sector in a.sector_of(addr)..a.sector_of(addr + len - 1) + 1 {
            if a.wear[sector] < 0 {
                continue;
            }
            a.wear[sector] += 1;
            if bad_blocks && roll < prob_bad(a.wear[sector] as u32, a.props.lifecycle) {
                a.wear[sector] = -a.wear[sector];
                warn!("sector {sector} of {area:?} went bad after {} cycles", -a.wear[sector]);
            }
        }
        a.elapsed_us += a.props.erase_time_us;
        Ok(())
    }
}
