//! Packed containers: length-prefixed, 4-byte aligned concatenations.
//!
//! ```text
//! [tab]        optional u32 zero      (`tabed`)
//! [len0][data0][pad to 4]
//! [len1][data1][pad to 4]
//! ...
//! [zero]       optional u32 zero      (`last_tabed`, before the final child)
//! [lenN][dataN][pad to 4]
//! [0]          terminator / tail
//! ```

use tracing::warn;

use super::{align_4, expect_u32, pad_to, push_u32, to_u32, ChildSpan, CodecError, SECTOR_SIZE};
use crate::signature::validators::is_tab_packed;

/// Layout flags recovered from a packed container.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PackedHeader {
    pub tabed:      bool,
    pub last_tabed: bool,
    pub packed_ok:  bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackedLayout {
    pub header:   PackedHeader,
    pub children: Vec<ChildSpan>,
}

/// Split a packed container into its child spans.
pub fn decode(data: &[u8]) -> Result<PackedLayout, CodecError> {
    let tabed = is_tab_packed(data);
    let mut pos = if tabed { 4 } else { 0 };
    let mut last_tabed = false;
    let mut children = Vec::new();

    while data.len() - pos >= 4 {
        let mut length = expect_u32(data, pos)? as usize;
        let mut after_pad = false;

        if length == 0 {
            // A zero dword followed by more non-zero data is the pad that
            // sits in front of the final child; anything else ends the scan.
            let rest = &data[pos + 4..];
            if rest.len() >= 4 && rest.iter().any(|&b| b != 0) {
                pos += 4;
                length = expect_u32(data, pos)? as usize;
                after_pad = true;
            } else {
                break;
            }
        }

        if pos + 4 + length > data.len() {
            warn!(offset = pos, length, available = data.len() - pos - 4,
                  "packed block overruns its container, stopping scan");
            break;
        }

        children.push(ChildSpan { offset: pos + 4, length });
        last_tabed |= after_pad;
        pos = (pos + 4 + align_4(length)).min(data.len());
    }

    if children.is_empty() {
        return Err(CodecError::violation(0, "packed container holds no length-prefixed blocks"));
    }

    let tail = data.len() - pos;
    Ok(PackedLayout {
        header: PackedHeader { tabed, last_tabed, packed_ok: tail < SECTOR_SIZE },
        children,
    })
}

/// Rebuild a packed container from its children.
pub fn encode(header: &PackedHeader, children: &[Vec<u8>]) -> Result<Vec<u8>, CodecError> {
    let body: usize = children.iter().map(|c| 4 + align_4(c.len())).sum();
    let mut out = Vec::with_capacity(body + 8);

    if header.tabed {
        push_u32(&mut out, 0);
    }
    for (i, child) in children.iter().enumerate() {
        if header.last_tabed && i + 1 == children.len() {
            push_u32(&mut out, 0);
        }
        let length = to_u32(child.len(), out.len())?;
        push_u32(&mut out, length);
        out.extend_from_slice(child);
        let aligned = align_4(out.len());
        pad_to(&mut out, aligned);
    }
    Ok(out)
}
