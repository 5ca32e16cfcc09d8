//! Heuristic type classification.
//!
//! Most formats in the container carry no magic number and several are
//! structurally ambiguous, so classification is an ordered list of
//! `(predicate, tag)` pairs: the first validator that accepts the buffer
//! wins.  Order matters and new heuristics are added by inserting into
//! [`VALIDATORS`], never by editing an existing predicate.
//!
//! Classification never fails.  Anything unrecognised is [`TypeTag::File`].

pub mod validators;

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::codec::read_u32;
use validators::*;

/// Marker found at bytes 4..8 of compressed blobs.
pub const LZ_MARKER: u32 = 0x0800_2100;

// ── TypeTag ──────────────────────────────────────────────────────────────────

/// Structural type of a byte range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TypeTag {
    File,
    Lz,
    Database,
    Scenario,
    Dialog,
    Tilemap,
    Tim,
    Map,
    Archive,
    Packed,
    Model,
    Tmd,
    Pmd,
    Hmd,
    Vhb,
    VhbPart,
    Seq,
    Vag,
    Pocket,
}

impl TypeTag {
    /// Lower-case name used in manifests and directory names.
    pub fn name(self) -> &'static str {
        match self {
            TypeTag::File     => "file",
            TypeTag::Lz       => "lz",
            TypeTag::Database => "database",
            TypeTag::Scenario => "scenario",
            TypeTag::Dialog   => "dialog",
            TypeTag::Tilemap  => "tilemap",
            TypeTag::Tim      => "tim",
            TypeTag::Map      => "map",
            TypeTag::Archive  => "archive",
            TypeTag::Packed   => "packed",
            TypeTag::Model    => "model",
            TypeTag::Tmd      => "tmd",
            TypeTag::Pmd      => "pmd",
            TypeTag::Hmd      => "hmd",
            TypeTag::Vhb      => "vhb",
            TypeTag::VhbPart  => "vhb_part",
            TypeTag::Seq      => "seq",
            TypeTag::Vag      => "vag",
            TypeTag::Pocket   => "pocket",
        }
    }

    /// File extension for a leaf of this type, dot included.
    pub fn extension(self) -> String {
        match self {
            TypeTag::File => ".bin".to_owned(),
            other         => format!(".{}", other.name()),
        }
    }

    /// Whether the orchestrator decomposes this type into children.
    pub fn is_container(self) -> bool {
        matches!(self, TypeTag::Packed | TypeTag::Archive | TypeTag::Map)
    }
}

impl fmt::Display for TypeTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

// ── Strategy tables ──────────────────────────────────────────────────────────

type Validator = fn(&[u8]) -> bool;

fn is_any_packed(data: &[u8]) -> bool {
    is_packed(data) || is_tab_packed(data)
}

/// Ordered structural validators.  Earlier entries shadow later ones.
pub const VALIDATORS: &[(Validator, TypeTag)] = &[
    (is_database, TypeTag::Database),
    (is_scenario, TypeTag::Scenario),
    (is_dialog,   TypeTag::Dialog),
    (is_tilemap,  TypeTag::Tilemap),
    (is_tim,      TypeTag::Tim),
    (is_map,      TypeTag::Map),
    (is_archive,  TypeTag::Archive),
    (is_any_packed, TypeTag::Packed),
    (is_model,    TypeTag::Model),
];

/// Leading-dword magic values, compared as little-endian `u32`.
pub const MAGIC_TABLE: &[(u32, TypeTag)] = &[
    (0x0000_0041, TypeTag::Tmd),
    (0x0000_0042, TypeTag::Pmd),
    (0x0000_0050, TypeTag::Hmd),
    (u32::from_le_bytes(*b"pBAV"), TypeTag::Vhb),
    (u32::from_le_bytes(*b"pQES"), TypeTag::Seq),
    (u32::from_le_bytes(*b"VAGp"), TypeTag::Vag),
    (0x0C11_4353, TypeTag::Pocket),
];

// ── classify ─────────────────────────────────────────────────────────────────

/// Classify `data`.
///
/// With `suppress_packed_check` the packed validator is skipped; children of
/// a container are classified this way so that ordinary length-prefixed
/// leaves are not mistaken for nested packed containers.
pub fn classify(data: &[u8], suppress_packed_check: bool) -> TypeTag {
    if data.len() < 8 {
        return TypeTag::File;
    }
    if read_u32(data, 4) == Some(LZ_MARKER) {
        return TypeTag::Lz;
    }

    let structural = VALIDATORS.iter()
        .filter(|(_, tag)| !(suppress_packed_check && *tag == TypeTag::Packed))
        .find(|(check, _)| check(data));
    if let Some(&(_, tag)) = structural {
        return tag;
    }

    let lead = read_u32(data, 0).unwrap_or(0);
    MAGIC_TABLE.iter()
        .find(|(magic, _)| *magic == lead)
        .map(|&(_, tag)| tag)
        .unwrap_or(TypeTag::File)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dwords(values: &[u32]) -> Vec<u8> {
        values.iter().flat_map(|v| v.to_le_bytes()).collect()
    }

    #[test]
    fn short_buffers_are_plain_files() {
        assert_eq!(classify(&[], false), TypeTag::File);
        assert_eq!(classify(&[0x41, 0, 0, 0, 0, 0, 0], false), TypeTag::File);
    }

    #[test]
    fn lz_marker_wins_over_everything() {
        let mut data = dwords(&[0x14, LZ_MARKER]);
        data.resize(64, 0);
        assert_eq!(classify(&data, false), TypeTag::Lz);
    }

    #[test]
    fn magic_table_fallback() {
        let mut vag = b"VAGp".to_vec();
        vag.resize(48, 0);
        assert_eq!(classify(&vag, false), TypeTag::Vag);

        let mut vhb = b"pBAV".to_vec();
        vhb.resize(48, 0);
        assert_eq!(classify(&vhb, false), TypeTag::Vhb);

        let mut tmd = dwords(&[0x41, 0]);
        tmd.resize(16, 0);
        assert_eq!(classify(&tmd, false), TypeTag::Tmd);
    }

    #[test]
    fn zero_filled_data_is_a_file() {
        assert_eq!(classify(&[0u8; 4096], false), TypeTag::File);
    }

    #[test]
    fn packed_only_when_not_suppressed() {
        let mut data = dwords(&[6]);
        data.extend_from_slice(b"abcdef\0\0");
        data.extend_from_slice(&dwords(&[2]));
        data.extend_from_slice(b"gh\0\0");
        data.extend_from_slice(&dwords(&[0]));

        assert_eq!(classify(&data, false), TypeTag::Packed);
        assert_ne!(classify(&data, true), TypeTag::Packed);
    }

    #[test]
    fn map_container_detected() {
        let mut data = dwords(&[1, 0x0002_0002, 0x18, 0x20, 0x28, 0x30]);
        data.resize(0x40, 0x11);
        assert_eq!(classify(&data, false), TypeTag::Map);
    }

    #[test]
    fn extensions() {
        assert_eq!(TypeTag::File.extension(), ".bin");
        assert_eq!(TypeTag::Tim.extension(), ".tim");
        assert_eq!(TypeTag::VhbPart.extension(), ".vhb_part");
    }

    #[test]
    fn tag_serializes_snake_case() {
        assert_eq!(serde_json::to_string(&TypeTag::VhbPart).unwrap(), "\"vhb_part\"");
        let back: TypeTag = serde_json::from_str("\"archive\"").unwrap();
        assert_eq!(back, TypeTag::Archive);
    }
}
