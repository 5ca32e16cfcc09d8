//! Container codecs: packed, archive and map layouts.
//!
//! Each codec works on one container's byte range only.  `decode` returns the
//! container metadata plus the byte span of every child, relative to the
//! container start; it never classifies or recurses.  `encode` is the inverse
//! and takes the already rebuilt child payloads in manifest order.
//!
//! # Endianness
//! Every integer in the container format is little-endian.

pub mod archive;
pub mod map;
pub mod packed;

use byteorder::{ByteOrder, LittleEndian};
use thiserror::Error;

/// Fixed addressing unit of the container file and of sectored archives.
pub const SECTOR_SIZE: usize = 2048;

// ── Error type ───────────────────────────────────────────────────────────────

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CodecError {
    /// Internal offsets or lengths disagree with the container's own bounds.
    #[error("structural violation at offset {offset:#x}: {reason}")]
    StructuralViolation { offset: usize, reason: String },
    /// A fixed-arity container was given the wrong number of children.
    #[error("expected {expected} children, got {got}")]
    ChildCount { expected: usize, got: usize },
}

impl CodecError {
    pub(crate) fn violation(offset: usize, reason: impl Into<String>) -> Self {
        CodecError::StructuralViolation { offset, reason: reason.into() }
    }
}

// ── Child spans ──────────────────────────────────────────────────────────────

/// Byte range of one child inside its container.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChildSpan {
    pub offset: usize,
    pub length: usize,
}

impl ChildSpan {
    pub fn end(&self) -> usize { self.offset + self.length }

    /// The span rounded up to 4 bytes, without running past `limit`.
    pub fn aligned_within(&self, limit: usize) -> ChildSpan {
        let end = (self.offset + align_4(self.length)).min(limit).max(self.end());
        ChildSpan { offset: self.offset, length: end - self.offset }
    }

    /// Borrow the child bytes out of the container buffer.
    pub fn slice<'a>(&self, data: &'a [u8]) -> Result<&'a [u8], CodecError> {
        data.get(self.offset..self.end()).ok_or_else(|| {
            CodecError::violation(
                self.offset,
                format!("child of {} bytes runs past container end {}", self.length, data.len()),
            )
        })
    }
}

// ── Helpers ──────────────────────────────────────────────────────────────────

/// Round up to the next multiple of 4.
#[inline]
pub fn align_4(n: usize) -> usize { (n + 3) & !3 }

/// Round up to the next sector boundary.
#[inline]
pub fn align_sector(n: usize) -> usize { n.div_ceil(SECTOR_SIZE) * SECTOR_SIZE }

/// Bounds-checked little-endian `u32` read.
#[inline]
pub fn read_u32(data: &[u8], offset: usize) -> Option<u32> {
    data.get(offset..offset.checked_add(4)?).map(LittleEndian::read_u32)
}

/// Bounds-checked little-endian `u16` read.
#[inline]
pub fn read_u16(data: &[u8], offset: usize) -> Option<u16> {
    data.get(offset..offset.checked_add(2)?).map(LittleEndian::read_u16)
}

/// `u32` read that turns a short buffer into a structural violation.
pub(crate) fn expect_u32(data: &[u8], offset: usize) -> Result<u32, CodecError> {
    read_u32(data, offset)
        .ok_or_else(|| CodecError::violation(offset, "truncated 32-bit field"))
}

pub(crate) fn push_u32(out: &mut Vec<u8>, value: u32) {
    let mut b = [0u8; 4];
    LittleEndian::write_u32(&mut b, value);
    out.extend_from_slice(&b);
}

/// Zero-pad `out` up to `len` bytes.
pub(crate) fn pad_to(out: &mut Vec<u8>, len: usize) {
    if out.len() < len {
        out.resize(len, 0);
    }
}

/// Convert an in-memory length to an on-disk `u32` field.
pub(crate) fn to_u32(value: usize, offset: usize) -> Result<u32, CodecError> {
    u32::try_from(value)
        .map_err(|_| CodecError::violation(offset, format!("value {value} exceeds 32 bits")))
}
