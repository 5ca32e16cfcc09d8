//! Sector directory embedded in the executable.
//!
//! A fixed table of `slot_count` entries starting at `offset`, stride 8:
//!
//! ```text
//! [+0] sector index  (u32 LE, in 2048-byte sectors)
//! [+4] byte size     (u32 LE)
//! ```
//!
//! A (0,0) pair is an empty slot.  Two or more empty slots in a row followed
//! by a used one start a new section; sections are bookkeeping only.

use std::io::{self, Cursor, Read, Seek, SeekFrom, Write};

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use thiserror::Error;

use crate::codec::SECTOR_SIZE;

pub const DEFAULT_SECTORS_OFFSET: usize = 0x50D80;
pub const DEFAULT_SLOT_COUNT:     usize = 1864 / SLOT_STRIDE;
/// Disc sector of the container's first sector.
pub const DEFAULT_CD_SECTOR_BASE: u32   = 245;
pub const SLOT_STRIDE:            usize = 8;

#[derive(Error, Debug)]
pub enum DirectoryError {
    #[error("sector directory {start:#x}..{end:#x} lies outside the {len}-byte directory file")]
    OutOfBounds { start: usize, end: usize, len: usize },
    #[error("{slots} slots do not fit a directory of {capacity} slots")]
    TooManySlots { slots: usize, capacity: usize },
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

/// Where the directory lives inside the directory file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DirectoryLayout {
    pub offset:         usize,
    pub slot_count:     usize,
    pub cd_sector_base: u32,
}

impl Default for DirectoryLayout {
    fn default() -> Self {
        Self {
            offset:         DEFAULT_SECTORS_OFFSET,
            slot_count:     DEFAULT_SLOT_COUNT,
            cd_sector_base: DEFAULT_CD_SECTOR_BASE,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SectorSlot {
    pub sector:  u32,
    pub size:    u32,
    pub section: u32,
}

impl SectorSlot {
    pub fn is_empty(&self) -> bool { self.sector == 0 && self.size == 0 }

    /// Absolute byte offset of the slot's data in the container.
    pub fn byte_offset(&self) -> usize { self.sector as usize * SECTOR_SIZE }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SectorDirectory {
    pub slots: Vec<SectorSlot>,
}

impl SectorDirectory {
    /// Build from raw (sector, size) pairs, assigning sections.
    pub fn from_pairs<I: IntoIterator<Item = (u32, u32)>>(pairs: I) -> Self {
        let mut slots = Vec::new();
        let mut section = 0;
        let mut empty_run = 0;
        for (sector, size) in pairs {
            if sector == 0 && size == 0 {
                empty_run += 1;
            } else {
                if empty_run >= 2 {
                    section += 1;
                }
                empty_run = 0;
            }
            slots.push(SectorSlot { sector, size, section });
        }
        Self { slots }
    }

    /// Read up to `layout.slot_count` slots; a short file ends the table early.
    pub fn read_from<R: Read + Seek>(mut reader: R, layout: &DirectoryLayout) -> Result<Self, DirectoryError> {
        let len = reader.seek(SeekFrom::End(0))? as usize;
        if layout.offset > len {
            return Err(DirectoryError::OutOfBounds {
                start: layout.offset,
                end:   layout.offset + layout.slot_count * SLOT_STRIDE,
                len,
            });
        }
        reader.seek(SeekFrom::Start(layout.offset as u64))?;

        let available = (len - layout.offset) / SLOT_STRIDE;
        let mut pairs = Vec::with_capacity(layout.slot_count.min(available));
        for _ in 0..layout.slot_count.min(available) {
            let sector = reader.read_u32::<LittleEndian>()?;
            let size = reader.read_u32::<LittleEndian>()?;
            pairs.push((sector, size));
        }
        Ok(Self::from_pairs(pairs))
    }

    pub fn read(bytes: &[u8], layout: &DirectoryLayout) -> Result<Self, DirectoryError> {
        Self::read_from(Cursor::new(bytes), layout)
    }

    pub fn write_to<W: Write>(&self, mut writer: W) -> io::Result<()> {
        for slot in &self.slots {
            writer.write_u32::<LittleEndian>(slot.sector)?;
            writer.write_u32::<LittleEndian>(slot.size)?;
        }
        Ok(())
    }

    /// Overwrite the directory bytes in place; nothing else is touched.
    pub fn patch(&self, bytes: &mut [u8], layout: &DirectoryLayout) -> Result<(), DirectoryError> {
        if self.slots.len() > layout.slot_count {
            return Err(DirectoryError::TooManySlots { slots: self.slots.len(), capacity: layout.slot_count });
        }
        let start = layout.offset;
        let end = start + self.slots.len() * SLOT_STRIDE;
        let len = bytes.len();
        let region = bytes.get_mut(start..end)
            .ok_or(DirectoryError::OutOfBounds { start, end, len })?;
        self.write_to(region)?;
        Ok(())
    }

    pub fn len(&self) -> usize { self.slots.len() }

    pub fn is_empty(&self) -> bool { self.slots.is_empty() }
}
