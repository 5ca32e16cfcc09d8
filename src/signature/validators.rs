//! Structural validators used by the classifier.
//!
//! Every predicate only checks that a buffer is self-consistent for one
//! layout: declared sizes inside the buffer, monotonic offset tables, header
//! fields that agree with each other.  Payload content is never inspected.
//! A read past the end of the buffer fails the check instead of panicking.

use crate::codec::{align_4, read_u16, read_u32, SECTOR_SIZE};

/// Upper bound for one block inside a packed container.
const MAX_PACKED_BLOCK: usize = 10_000_000;
/// Upper bound for the offset table of an archive.
const MAX_ARCHIVE_SEGMENTS: usize = 10_000;

/// Read a `u32` as `usize`, `None` when out of bounds.
#[inline]
fn dword(data: &[u8], offset: usize) -> Option<usize> {
    read_u32(data, offset).map(|v| v as usize)
}

/// Database blob: five ascending section offsets, the first at 0x14.
pub fn is_database(data: &[u8]) -> bool {
    let mut offsets = [0usize; 5];
    for i in 0..offsets.len() {
        let Some(offset) = dword(data, 4 * i) else { return false };
        if offset == 0 || offset > data.len() {
            return false;
        }
        if i > 0 && offset < offsets[i - 1] {
            return false;
        }
        offsets[i] = offset;
    }
    offsets[0] == 0x14 && offsets.iter().sum::<usize>() >= data.len()
}

/// String table shared by scenario and dialog blobs.
pub fn is_text_table(data: &[u8]) -> bool {
    if data.len() < 12 {
        return false;
    }
    let (Some(file_size), Some(table_size)) = (dword(data, 0), dword(data, 4)) else {
        return false;
    };
    if file_size == 0 || file_size > data.len() || table_size % 4 != 0 {
        return false;
    }

    let mut previous = None;
    for i in 0..table_size / 4 {
        let Some(offset) = dword(data, 8 + 4 * i) else { return false };
        if offset == 0 || offset < table_size {
            return false;
        }
        if previous.is_some_and(|p| offset < p) {
            return false;
        }
        if previous.is_none() && offset != table_size {
            return false;
        }
        previous = Some(offset);
    }
    previous.is_some()
}

/// Scenario script: two length-prefixed code regions and a text table.
pub fn is_scenario(data: &[u8]) -> bool {
    let check = || -> Option<bool> {
        if dword(data, 0)? == 0 {
            return Some(false);
        }
        let o1 = dword(data, 4)?;
        if o1 == 0 || o1 > data.len() {
            return Some(false);
        }
        let o2 = align_4(dword(data, 8)? * 2);
        if o2 == 0 || o2 + o1 > data.len() {
            return Some(false);
        }
        if !is_text_table(data.get(12 + o2..)?) {
            return Some(false);
        }
        let o3 = dword(data, 12 + o2)?;
        if o3 == 0 || o3 + o2 > data.len() {
            return Some(false);
        }
        Some(8 + o3 + 4 + o2 + 4 == data.len())
    };
    check().unwrap_or(false)
}

/// Dialog blob: first-part size, two word-count regions, then a text table.
pub fn is_dialog(data: &[u8]) -> bool {
    let check = || -> Option<bool> {
        let first_part = dword(data, 0)?;
        if first_part == 0 || first_part > data.len() {
            return Some(false);
        }
        let o1 = align_4(dword(data, 4)? * 2);
        if o1 == 0 || o1 > first_part {
            return Some(false);
        }
        for i in 0..o1 / 4 {
            if dword(data, 8 + 4 * i)? == 0 {
                return Some(false);
            }
        }
        let o2 = align_4(dword(data, 8 + o1)? * 2);
        if o2 == 0 || o2 + o1 > first_part {
            return Some(false);
        }
        if !is_text_table(data.get(12 + o1 + o2..)?) {
            return Some(false);
        }
        let o3 = dword(data, 12 + o1 + o2)?;
        if o3 == 0 || o3 + o2 + o1 > first_part {
            return Some(false);
        }
        Some((16 + o3 + o2 + o1).saturating_sub(first_part) <= 4)
    };
    check().unwrap_or(false)
}

/// Tilemap: a size prefix covering the rest and five header words.
pub fn is_tilemap(data: &[u8]) -> bool {
    let Some(size) = dword(data, 0) else { return false };
    if size == 0 || size + 4 != data.len() {
        return false;
    }
    let mut zeros = 0;
    for i in 0..5 {
        let Some(word) = dword(data, 4 + 4 * i) else { return false };
        if word == 0 {
            zeros += 1;
        }
        if word >= size {
            return false;
        }
    }
    zeros == 0 || zeros == 5
}

/// PlayStation TIM image.
pub fn is_tim(data: &[u8]) -> bool {
    if data.len() < 20 {
        return false;
    }
    let check = || -> Option<bool> {
        if dword(data, 0)? != 0x10 || !matches!(dword(data, 4)?, 0x02 | 0x08 | 0x09) {
            return Some(false);
        }
        let offset = dword(data, 8)?;
        if offset + 16 + 4 > data.len() {
            return Some(false);
        }
        let width = read_u16(data, offset + 16)?;
        let height = read_u16(data, offset + 18)?;
        Some(width != 0 && height != 0 && height <= 4096)
    };
    check().unwrap_or(false)
}

/// Map container: 8-byte header with a doubled half-word, four offsets.
pub fn is_map(data: &[u8]) -> bool {
    if data.len() < 24 {
        return false;
    }
    let check = || -> Option<bool> {
        if dword(data, 0)? == 0 {
            return Some(false);
        }
        let (x1, x2) = (read_u16(data, 4)?, read_u16(data, 6)?);
        if x1 == 0 || x1 != x2 {
            return Some(false);
        }
        let o = [dword(data, 8)?, dword(data, 12)?, dword(data, 16)?, dword(data, 20)?];
        Some(o[0] == 0x18 && o[0] < o[1] && o[1] < o[2] && o[2] < o[3] && o[3] < data.len())
    };
    check().unwrap_or(false)
}

/// Archive container: segment count followed by an offset table.
pub fn is_archive(data: &[u8]) -> bool {
    let Some(segments) = dword(data, 0) else { return false };
    if segments < 1 || segments > MAX_ARCHIVE_SEGMENTS || data.len() < (segments + 3) * 4 {
        return false;
    }

    let table_end = (segments + 1) * 4;
    let mut offsets = Vec::with_capacity(segments);
    for i in 1..=segments {
        let Some(offset) = dword(data, i * 4) else { return false };
        if offset < table_end || offset > data.len() {
            return false;
        }
        offsets.push(offset);
    }

    if offsets[0] == SECTOR_SIZE {
        dword(data, (segments + 2) * 4) == Some(0)
    } else {
        let min = offsets.iter().copied().min().unwrap_or(0);
        min == (segments + 2) * 4 || min == table_end
    }
}

/// Packed container: a walk of length-prefixed 4-aligned blocks.
pub fn is_packed(data: &[u8]) -> bool {
    if data.len() < 8 {
        return false;
    }
    let mut pos = 0;
    let mut blocks = 0;
    while data.len() - pos >= 4 {
        let Some(length) = dword(data, pos) else { return false };
        if length == 0 {
            if blocks == 0 {
                return false;
            }
            break;
        }
        let remaining = data.len() - pos - 4;
        if length > remaining || length >= MAX_PACKED_BLOCK {
            return false;
        }
        let block = align_4(length) + 4;
        if block > data.len() - pos {
            return false;
        }
        pos += block;
        blocks += 1;
    }
    blocks > 0
}

/// Packed container preceded by a zero dword.
pub fn is_tab_packed(data: &[u8]) -> bool {
    dword(data, 0) == Some(0) && data.get(4..).is_some_and(is_packed)
}

/// Model: vertex count, vertex table of 8-byte entries, primitive count.
pub fn is_model(data: &[u8]) -> bool {
    let Some(vertices) = dword(data, 0) else { return false };
    let Some(table) = vertices.checked_mul(8) else { return false };
    if vertices == 0 || table >= data.len() {
        return false;
    }
    matches!(dword(data, 4 + table), Some(primitives) if primitives != 0)
}
