//! Structural manifest: the persisted entry tree.
//!
//! Unpack writes the manifest before any leaf file so that repack can rebuild
//! every container from it without classifying anything again.  The manifest
//! is pretty-printed JSON; each entry carries its id, offset and length within
//! its parent plus a `type`-tagged body:
//!
//! ```json
//! { "id": 7, "offset": 14336, "length": 5000, "type": "archive",
//!   "segments": 2, "sectored": false, ..., "children": [ ... ] }
//! ```

use std::fs;
use std::io;
use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::codec::archive::ArchiveHeader;
use crate::codec::packed::PackedHeader;
use crate::signature::TypeTag;

/// File name of the manifest inside an extraction directory.
pub const MANIFEST_FILE: &str = ".structure.json";
/// Manifest layout revision written by this build.
pub const MANIFEST_VERSION: u32 = 1;

#[derive(Error, Debug)]
pub enum ManifestError {
    #[error("manifest JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("unsupported manifest version {0} (this build reads {MANIFEST_VERSION})")]
    UnsupportedVersion(u32),
    #[error("manifest I/O error: {0}")]
    Io(#[from] io::Error),
}

// ── Entry tree ───────────────────────────────────────────────────────────────

/// One node of the entry tree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Entry {
    /// Run-scoped unique id; names the extracted file or directory.
    pub id:     u32,
    /// Byte offset within the parent range.
    pub offset: usize,
    /// Byte length as found in the source container.
    pub length: usize,
    #[serde(flatten)]
    pub body:   EntryBody,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EntryBody {
    /// A (0,0) directory slot.  Only appears at the top level.
    Empty,
    Leaf(LeafEntry),
    Packed(PackedEntry),
    Archive(ArchiveEntry),
    Map(MapEntry),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LeafEntry {
    pub kind:     TypeTag,
    /// BLAKE3 of the bytes written at unpack time, hex encoded.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub checksum: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackedEntry {
    pub tabed:      bool,
    pub last_tabed: bool,
    pub packed_ok:  bool,
    pub children:   Vec<Entry>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArchiveEntry {
    pub segments:       u32,
    pub sectored:       bool,
    pub sorted:         bool,
    pub archive_length: bool,
    pub archive_ok:     bool,
    pub children:       Vec<Entry>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MapEntry {
    pub map_header: u64,
    pub children:   Vec<Entry>,
}

impl PackedEntry {
    pub fn header(&self) -> PackedHeader {
        PackedHeader { tabed: self.tabed, last_tabed: self.last_tabed, packed_ok: self.packed_ok }
    }
}

impl ArchiveEntry {
    pub fn header(&self) -> ArchiveHeader {
        ArchiveHeader {
            segments:       self.segments,
            sectored:       self.sectored,
            sorted:         self.sorted,
            archive_length: self.archive_length,
            archive_ok:     self.archive_ok,
        }
    }

    /// Originally declared child offsets, in table order.
    pub fn offsets(&self) -> Vec<usize> {
        self.children.iter().map(|c| c.offset).collect()
    }
}

impl Entry {
    /// Type name as used in directory names (`{type}_{id}`).
    pub fn type_name(&self) -> &'static str {
        match &self.body {
            EntryBody::Empty      => "empty",
            EntryBody::Leaf(leaf) => leaf.kind.name(),
            EntryBody::Packed(_)  => TypeTag::Packed.name(),
            EntryBody::Archive(_) => TypeTag::Archive.name(),
            EntryBody::Map(_)     => TypeTag::Map.name(),
        }
    }

    pub fn is_container(&self) -> bool {
        matches!(self.body, EntryBody::Packed(_) | EntryBody::Archive(_) | EntryBody::Map(_))
    }

    pub fn children(&self) -> &[Entry] {
        match &self.body {
            EntryBody::Packed(p)  => &p.children,
            EntryBody::Archive(a) => &a.children,
            EntryBody::Map(m)     => &m.children,
            EntryBody::Empty | EntryBody::Leaf(_) => &[],
        }
    }

    /// File name of an extracted leaf.
    pub fn leaf_file_name(&self) -> String {
        let ext = match &self.body {
            EntryBody::Leaf(leaf) => leaf.kind.extension(),
            _                     => TypeTag::File.extension(),
        };
        format!("file_{}{}", self.id, ext)
    }

    /// Directory holding a container's children.
    pub fn dir_name(&self) -> String {
        format!("{}_{}", self.type_name(), self.id)
    }

    /// Number of entries in this subtree, self included.
    pub fn count(&self) -> usize {
        1 + self.children().iter().map(Entry::count).sum::<usize>()
    }
}

// ── Top level ────────────────────────────────────────────────────────────────

/// A sector directory slot together with the entry it points at.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlotRecord {
    /// Position in the sector directory.
    pub slot:      usize,
    pub section:   u32,
    /// Sector index in the source container.
    pub sector:    u32,
    /// Sector on the disc image; informational.
    pub cd_sector: u32,
    pub entry:     Entry,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Manifest {
    pub version:       u32,
    pub created:       DateTime<Utc>,
    pub container_len: u64,
    pub entries:       Vec<SlotRecord>,
}

impl Manifest {
    pub fn new(container_len: u64, entries: Vec<SlotRecord>) -> Self {
        Self { version: MANIFEST_VERSION, created: Utc::now(), container_len, entries }
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>, ManifestError> {
        Ok(serde_json::to_vec_pretty(self)?)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, ManifestError> {
        let manifest: Manifest = serde_json::from_slice(bytes)?;
        if manifest.version != MANIFEST_VERSION {
            return Err(ManifestError::UnsupportedVersion(manifest.version));
        }
        Ok(manifest)
    }

    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<(), ManifestError> {
        fs::write(path, self.to_bytes()?)?;
        Ok(())
    }

    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ManifestError> {
        Self::from_bytes(&fs::read(path)?)
    }

    /// Total number of entries, nested ones included.
    pub fn entry_count(&self) -> usize {
        self.entries.iter().map(|r| r.entry.count()).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn leaf(id: u32, offset: usize, kind: TypeTag) -> Entry {
        Entry { id, offset, length: 4, body: EntryBody::Leaf(LeafEntry { kind, checksum: None }) }
    }

    fn sample() -> Manifest {
        let archive = Entry {
            id: 2,
            offset: 2048,
            length: 64,
            body: EntryBody::Archive(ArchiveEntry {
                segments: 2,
                sectored: false,
                sorted: true,
                archive_length: false,
                archive_ok: true,
                children: vec![leaf(3, 12, TypeTag::Tim), leaf(4, 16, TypeTag::File)],
            }),
        };
        Manifest::new(4096, vec![
            SlotRecord {
                slot: 0, section: 0, sector: 0, cd_sector: 245,
                entry: Entry { id: 1, offset: 0, length: 0, body: EntryBody::Empty },
            },
            SlotRecord { slot: 1, section: 0, sector: 1, cd_sector: 246, entry: archive },
        ])
    }

    #[test]
    fn json_round_trip() {
        let manifest = sample();
        let bytes = manifest.to_bytes().unwrap();
        let back = Manifest::from_bytes(&bytes).unwrap();
        assert_eq!(back, manifest);
        assert_eq!(back.entry_count(), 4);
    }

    #[test]
    fn body_is_flattened_under_type() {
        let json: serde_json::Value = serde_json::from_slice(&sample().to_bytes().unwrap()).unwrap();
        let archive = &json["entries"][1]["entry"];
        assert_eq!(archive["type"], "archive");
        assert_eq!(archive["segments"], 2);
        assert_eq!(archive["children"][0]["kind"], "tim");
        assert_eq!(json["entries"][0]["entry"]["type"], "empty");
    }

    #[test]
    fn naming() {
        let manifest = sample();
        let archive = &manifest.entries[1].entry;
        assert_eq!(archive.dir_name(), "archive_2");
        assert_eq!(archive.children()[0].leaf_file_name(), "file_3.tim");
        assert_eq!(archive.children()[1].leaf_file_name(), "file_4.bin");
    }

    #[test]
    fn rejects_future_versions() {
        let mut manifest = sample();
        manifest.version = MANIFEST_VERSION + 1;
        let bytes = serde_json::to_vec(&manifest).unwrap();
        assert!(matches!(Manifest::from_bytes(&bytes), Err(ManifestError::UnsupportedVersion(_))));
    }
}
