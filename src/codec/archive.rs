//! Archive containers: a segment count followed by an offset table.
//!
//! ```text
//! compact:    [count][off0]..[offN-1]([total])  data...
//! sectored:   [count][off0]..[offN-1][total][0] zero pad to 0x800, data...
//! ```
//!
//! Offsets are relative to the archive start and may repeat; repeated
//! offsets alias one physical copy of the data.  Sectored archives pad every
//! child to a 2048-byte boundary, compact archives pad to 4 bytes.

use tracing::warn;

use super::{
    align_4, align_sector, expect_u32, pad_to, push_u32, read_u32, to_u32, ChildSpan, CodecError,
    SECTOR_SIZE,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ArchiveHeader {
    pub segments:       u32,
    /// First offset is exactly one sector; the header fills that sector.
    pub sectored:       bool,
    /// Offsets were stored in non-decreasing order.
    pub sorted:         bool,
    /// A total-length dword follows the offset table.
    pub archive_length: bool,
    /// The declared total length agrees with the slice within one sector.
    pub archive_ok:     bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveLayout {
    pub header:   ArchiveHeader,
    /// Declared offsets, in table order.
    pub offsets:  Vec<usize>,
    /// One span per declared offset, in table order.
    pub children: Vec<ChildSpan>,
}

/// Parse the offset table and derive every child's span.
pub fn decode(data: &[u8]) -> Result<ArchiveLayout, CodecError> {
    let segments = expect_u32(data, 0)?;
    if segments == 0 {
        return Err(CodecError::violation(0, "archive declares zero segments"));
    }
    let table_end = 4 + 4 * segments as usize;
    if table_end > data.len() {
        return Err(CodecError::violation(0, format!(
            "offset table of {segments} entries exceeds archive of {} bytes", data.len()
        )));
    }

    let mut offsets = Vec::with_capacity(segments as usize);
    for i in 0..segments as usize {
        let at = 4 + 4 * i;
        let offset = expect_u32(data, at)? as usize;
        if offset < table_end || offset > data.len() {
            return Err(CodecError::violation(at, format!(
                "child offset {offset:#x} outside {table_end:#x}..={:#x}", data.len()
            )));
        }
        offsets.push(offset);
    }

    let min = offsets.iter().copied().min().unwrap_or(table_end);
    let sectored = offsets[0] == SECTOR_SIZE;
    let sorted = offsets.windows(2).all(|w| w[0] <= w[1]);
    let archive_length = sectored || min == table_end + 4;

    let declared_total = if archive_length { read_u32(data, table_end).map(|v| v as usize) } else { None };
    let mut distinct = offsets.clone();
    distinct.sort_unstable();
    distinct.dedup();
    let last = distinct[distinct.len() - 1];
    let end = match declared_total {
        Some(total) if total >= last && total <= data.len() => total,
        _ => data.len(),
    };

    let children = offsets.iter().map(|&offset| {
        let next = distinct.iter().copied().find(|&o| o > offset).unwrap_or(end);
        ChildSpan { offset, length: next - offset }
    }).collect();

    let archive_ok = declared_total.map_or(true, |total| data.len().abs_diff(total) < SECTOR_SIZE);

    Ok(ArchiveLayout {
        header: ArchiveHeader { segments, sectored, sorted, archive_length, archive_ok },
        offsets,
        children,
    })
}

/// Rebuild an archive.
///
/// `offsets` are the originally declared offsets; they only decide physical
/// order and aliasing.  Children that shared an offset are written once and
/// every alias points at that copy.
pub fn encode(
    header:   &ArchiveHeader,
    offsets:  &[usize],
    children: &[Vec<u8>],
) -> Result<Vec<u8>, CodecError> {
    let segments = header.segments as usize;
    if children.len() != segments || offsets.len() != segments {
        return Err(CodecError::ChildCount { expected: segments, got: children.len() });
    }

    let table_len = 4 + 4 * segments
        + if header.archive_length { 4 } else { 0 }
        + if header.sectored { 4 } else { 0 };
    let data_start = if header.sectored {
        if table_len > SECTOR_SIZE {
            return Err(CodecError::violation(0, format!(
                "sectored archive header of {table_len} bytes does not fit one sector"
            )));
        }
        SECTOR_SIZE
    } else {
        table_len
    };

    let mut order: Vec<usize> = (0..segments).collect();
    order.sort_by_key(|&i| offsets[i]);

    let mut placed = vec![0usize; segments];
    let mut body: Vec<u8> = Vec::new();
    let mut primary: Option<usize> = None;
    for i in order {
        if let Some(p) = primary.filter(|&p| offsets[p] == offsets[i]) {
            placed[i] = placed[p];
            if children[i] != children[p] {
                warn!(index = i, alias_of = p, "aliased archive child differs from its primary copy, keeping the primary");
            }
            continue;
        }
        placed[i] = data_start + body.len();
        body.extend_from_slice(&children[i]);
        let aligned = if header.sectored { align_sector(body.len()) } else { align_4(body.len()) };
        pad_to(&mut body, aligned);
        primary = Some(i);
    }

    let total = data_start + body.len();
    let mut out = Vec::with_capacity(total);
    push_u32(&mut out, header.segments);
    for &offset in &placed {
        let field = to_u32(offset, out.len())?;
        push_u32(&mut out, field);
    }
    if header.archive_length {
        let field = to_u32(total, out.len())?;
        push_u32(&mut out, field);
    }
    if header.sectored {
        push_u32(&mut out, 0);
    }
    pad_to(&mut out, data_start);
    out.extend_from_slice(&body);
    Ok(out)
}
