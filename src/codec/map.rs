//! Map containers: an 8-byte header and exactly four children.
//!
//! ```text
//! [0x00] header   (8 bytes, opaque)
//! [0x08] off0..off3 (u32 each, off0 == 0x18)
//! [0x18] child0 child1 child2 child3   (contiguous, no padding)
//! ```

use byteorder::{ByteOrder, LittleEndian};

use super::{expect_u32, pad_to, push_u32, to_u32, ChildSpan, CodecError};

/// Number of children in every map.
pub const MAP_SLOTS: usize = 4;
/// Position of the offset table.
pub const MAP_TABLE_OFFSET: usize = 0x08;
/// Where the first child starts.
pub const MAP_DATA_OFFSET: usize = 0x18;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MapLayout {
    pub map_header: u64,
    pub children:   [ChildSpan; MAP_SLOTS],
}

pub fn decode(data: &[u8]) -> Result<MapLayout, CodecError> {
    if data.len() < MAP_DATA_OFFSET {
        return Err(CodecError::violation(0, format!("map of {} bytes has no room for its header", data.len())));
    }
    let map_header = LittleEndian::read_u64(&data[..8]);

    let mut offsets = [0usize; MAP_SLOTS];
    for (i, slot) in offsets.iter_mut().enumerate() {
        *slot = expect_u32(data, MAP_TABLE_OFFSET + 4 * i)? as usize;
    }
    if offsets[0] != MAP_DATA_OFFSET {
        return Err(CodecError::violation(MAP_TABLE_OFFSET, format!(
            "first map offset is {:#x}, expected {MAP_DATA_OFFSET:#x}", offsets[0]
        )));
    }
    for i in 1..MAP_SLOTS {
        if offsets[i] <= offsets[i - 1] || offsets[i] > data.len() {
            return Err(CodecError::violation(MAP_TABLE_OFFSET + 4 * i, format!(
                "map offset {:#x} breaks the ascending table or exceeds {:#x}", offsets[i], data.len()
            )));
        }
    }

    let children = std::array::from_fn(|i| {
        let end = if i + 1 < MAP_SLOTS { offsets[i + 1] } else { data.len() };
        ChildSpan { offset: offsets[i], length: end - offsets[i] }
    });
    Ok(MapLayout { map_header, children })
}

pub fn encode(map_header: u64, children: &[Vec<u8>]) -> Result<Vec<u8>, CodecError> {
    if children.len() != MAP_SLOTS {
        return Err(CodecError::ChildCount { expected: MAP_SLOTS, got: children.len() });
    }
    let body: usize = children.iter().map(Vec::len).sum();
    let mut out = Vec::with_capacity(MAP_DATA_OFFSET + body);
    out.extend_from_slice(&map_header.to_le_bytes());

    let mut cursor = MAP_DATA_OFFSET;
    for child in children {
        let field = to_u32(cursor, out.len())?;
        push_u32(&mut out, field);
        cursor += child.len();
    }
    pad_to(&mut out, MAP_DATA_OFFSET);
    for child in children {
        out.extend_from_slice(child);
    }
    Ok(out)
}
