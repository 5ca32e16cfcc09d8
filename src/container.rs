//! Recursive unpack and repack of the whole container.
//!
//! ```no_run
//! use spiritpak::container::{unpack_files, repack_files, RepackOptions};
//! use spiritpak::directory::DirectoryLayout;
//!
//! let layout = DirectoryLayout::default();
//! unpack_files("SPIRIT.DAT", "SLPM_862.74", "out/", &layout)?;
//! // ... edit leaves under out/ ...
//! repack_files("out/", "SLPM_862.74", "SPIRIT.NEW", "SLPM.NEW", &layout, &RepackOptions::default())?;
//! # Ok::<(), spiritpak::container::PackError>(())
//! ```
//!
//! # Unpack
//! Every directory slot is sliced out of the container, classified and, for
//! container types, decomposed recursively.  Children of a container live in
//! a `{type}_{id}/` directory; leaves are written as `file_{id}{ext}`.  The
//! manifest is written before any leaf.
//!
//! # Repack
//! Top-level entries are rebuilt in their original physical (sector) order
//! and laid out sector-aligned.  Directory slots keep their position; only
//! the (sector, size) values change.

use std::fs;
use std::io;
use std::ops::Range;
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::{debug, info, warn};

use crate::codec::{align_4, align_sector, archive, map, packed, pad_to, ChildSpan, CodecError, SECTOR_SIZE};
use crate::directory::{DirectoryError, DirectoryLayout, SectorDirectory};
use crate::manifest::{
    ArchiveEntry, Entry, EntryBody, LeafEntry, Manifest, ManifestError, MapEntry, PackedEntry,
    SlotRecord, MANIFEST_FILE,
};
use crate::signature::{classify, TypeTag};

// ── Errors ───────────────────────────────────────────────────────────────────

#[derive(Error, Debug)]
pub enum PackError {
    /// A container's offsets disagree with its own bounds.  Fatal for the run.
    #[error("entry {id} at {offset:#x}: {source}")]
    Structural { id: u32, offset: usize, source: CodecError },
    /// The manifest names a leaf that is not on disk.
    #[error("entry {id}: extracted file {} is missing", path.display())]
    MissingAsset { id: u32, path: PathBuf },
    #[error(transparent)]
    Manifest(#[from] ManifestError),
    #[error(transparent)]
    Directory(#[from] DirectoryError),
    #[error("{}: {source}", path.display())]
    Io { path: PathBuf, source: io::Error },
}

fn io_at(path: &Path) -> impl FnOnce(io::Error) -> PackError + '_ {
    move |source| PackError::Io { path: path.to_owned(), source }
}

// ── Options ──────────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct RepackOptions {
    /// Append a zero dword after every top-level packed container.
    pub packed_terminator: bool,
}

impl Default for RepackOptions {
    fn default() -> Self {
        Self { packed_terminator: true }
    }
}

// ── IdAllocator ──────────────────────────────────────────────────────────────

/// Hands out entry ids for one run.  Ids are unique within the run only.
#[derive(Debug, Clone)]
pub struct IdAllocator {
    next: u32,
}

impl IdAllocator {
    pub fn new() -> Self { Self::starting_at(1) }

    pub fn starting_at(first: u32) -> Self { Self { next: first } }

    pub fn next_id(&mut self) -> u32 {
        let id = self.next;
        self.next += 1;
        id
    }
}

impl Default for IdAllocator {
    fn default() -> Self { Self::new() }
}

// ── Unpack ───────────────────────────────────────────────────────────────────

/// A leaf to be written, as a path relative to the extraction root and a
/// byte range of the container.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmittedFile {
    pub id:    u32,
    pub path:  PathBuf,
    pub range: Range<usize>,
}

/// Result of [`unpack`]: the manifest plus every leaf it references.
#[derive(Debug)]
pub struct Unpacked<'a> {
    pub manifest: Manifest,
    pub files:    Vec<EmittedFile>,
    container:    &'a [u8],
}

impl<'a> Unpacked<'a> {
    /// Recover the leaf list of an earlier unpack from its manifest, without
    /// classifying anything.
    pub fn from_manifest(manifest: Manifest, container: &'a [u8]) -> Result<Self, PackError> {
        let mut files = Vec::new();
        for record in &manifest.entries {
            collect_leaves(&record.entry, record.entry.offset, Path::new(""), container.len(), &mut files)?;
        }
        Ok(Self { manifest, files, container })
    }

    pub fn bytes(&self, file: &EmittedFile) -> &'a [u8] {
        &self.container[file.range.clone()]
    }

    /// Write the manifest, then every leaf, under `dest`.
    pub fn write_to<P: AsRef<Path>>(&self, dest: P) -> Result<(), PackError> {
        let dest = dest.as_ref();
        fs::create_dir_all(dest).map_err(io_at(dest))?;
        self.manifest.save(dest.join(MANIFEST_FILE))?;

        for file in &self.files {
            let path = dest.join(&file.path);
            if let Some(parent) = path.parent() {
                fs::create_dir_all(parent).map_err(io_at(parent))?;
            }
            fs::write(&path, self.bytes(file)).map_err(io_at(&path))?;
        }
        info!(entries = self.manifest.entry_count(), files = self.files.len(),
              dest = %dest.display(), "unpacked container");
        Ok(())
    }
}

fn collect_leaves(
    entry: &Entry,
    start: usize,
    dir:   &Path,
    limit: usize,
    files: &mut Vec<EmittedFile>,
) -> Result<(), PackError> {
    match &entry.body {
        EntryBody::Empty => {}
        EntryBody::Leaf(_) => {
            let end = start + entry.length;
            if end > limit {
                return Err(PackError::Structural {
                    id:     entry.id,
                    offset: start,
                    source: CodecError::violation(start, format!(
                        "leaf of {} bytes runs past the {limit}-byte container", entry.length
                    )),
                });
            }
            files.push(EmittedFile { id: entry.id, path: dir.join(entry.leaf_file_name()), range: start..end });
        }
        _ => {
            let child_dir = dir.join(entry.dir_name());
            for child in entry.children() {
                collect_leaves(child, start + child.offset, &child_dir, limit, files)?;
            }
        }
    }
    Ok(())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ChildMode {
    Packed,
    Archive,
    Map,
}

struct Unpacker<'b> {
    ids:   &'b mut IdAllocator,
    files: Vec<EmittedFile>,
}

impl Unpacker<'_> {
    /// Build the entry for `data`, which starts at absolute offset `base`
    /// and at `offset` within its parent.
    ///
    /// `data` may extend past the recorded `length` (the alignment pad of a
    /// packed block); containers decode the whole view, leaves keep `length`.
    #[allow(clippy::too_many_arguments)]
    fn build(
        &mut self,
        id:     u32,
        tag:    TypeTag,
        data:   &[u8],
        length: usize,
        offset: usize,
        base:   usize,
        dir:    &Path,
    ) -> Result<Entry, PackError> {
        let structural = |source: CodecError| PackError::Structural { id, offset: base, source };
        let child_dir = dir.join(format!("{tag}_{id}"));

        let body = match tag {
            TypeTag::Packed => {
                let layout = packed::decode(data).map_err(structural)?;
                if !layout.header.packed_ok {
                    warn!(id, offset = base, "packed container leaves more than a sector unconsumed");
                }
                EntryBody::Packed(PackedEntry {
                    tabed:      layout.header.tabed,
                    last_tabed: layout.header.last_tabed,
                    packed_ok:  layout.header.packed_ok,
                    children:   self.children(id, &layout.children, data, base, &child_dir, ChildMode::Packed)?,
                })
            }
            TypeTag::Archive => {
                let layout = archive::decode(data).map_err(structural)?;
                if !layout.header.archive_ok {
                    warn!(id, offset = base, "archive length field disagrees with its slice");
                }
                let h = layout.header;
                EntryBody::Archive(ArchiveEntry {
                    segments:       h.segments,
                    sectored:       h.sectored,
                    sorted:         h.sorted,
                    archive_length: h.archive_length,
                    archive_ok:     h.archive_ok,
                    children:       self.children(id, &layout.children, data, base, &child_dir, ChildMode::Archive)?,
                })
            }
            TypeTag::Map => {
                let layout = map::decode(data).map_err(structural)?;
                EntryBody::Map(MapEntry {
                    map_header: layout.map_header,
                    children:   self.children(id, &layout.children, data, base, &child_dir, ChildMode::Map)?,
                })
            }
            kind => {
                let path = dir.join(format!("file_{id}{}", kind.extension()));
                self.files.push(EmittedFile { id, path, range: base..base + length });
                EntryBody::Leaf(LeafEntry {
                    kind,
                    checksum: Some(blake3::hash(&data[..length]).to_hex().to_string()),
                })
            }
        };

        debug!(id, %tag, offset = base, length, "entry");
        Ok(Entry { id, offset, length, body })
    }

    /// Classify and build every child of one container.
    ///
    /// Children are classified with the packed check suppressed.  Packed
    /// children are classified on their 4-aligned view.  In packed and
    /// archive containers a plain file right after a VAB header is its body.
    fn children(
        &mut self,
        parent: u32,
        spans:  &[ChildSpan],
        data:   &[u8],
        base:   usize,
        dir:    &Path,
        mode:   ChildMode,
    ) -> Result<Vec<Entry>, PackError> {
        let mut entries = Vec::with_capacity(spans.len());
        let mut previous: Option<TypeTag> = None;
        for span in spans {
            let view = match mode {
                ChildMode::Packed => span.aligned_within(data.len()),
                ChildMode::Archive | ChildMode::Map => *span,
            };
            let child = view.slice(data)
                .map_err(|source| PackError::Structural { id: parent, offset: base, source })?;
            let mut tag = classify(child, true);
            if mode != ChildMode::Map && tag == TypeTag::File && previous == Some(TypeTag::Vhb) {
                tag = TypeTag::VhbPart;
            }
            let id = self.ids.next_id();
            entries.push(self.build(id, tag, child, span.length, span.offset, base + span.offset, dir)?);
            previous = Some(tag);
        }
        Ok(entries)
    }
}

/// Decompose `container` along `directory` into a manifest and leaf list.
///
/// Nothing is written; see [`Unpacked::write_to`].
pub fn unpack<'a>(
    container: &'a [u8],
    directory: &SectorDirectory,
    layout:    &DirectoryLayout,
    ids:       &mut IdAllocator,
) -> Result<Unpacked<'a>, PackError> {
    let mut unpacker = Unpacker { ids, files: Vec::new() };
    let mut records = Vec::with_capacity(directory.len());

    for (slot_index, slot) in directory.slots.iter().enumerate() {
        let id = unpacker.ids.next_id();
        let start = slot.byte_offset();

        let entry = if slot.size == 0 {
            if slot.sector != 0 {
                warn!(slot = slot_index, sector = slot.sector, "zero-sized slot with a sector index, it will repack as (0,0)");
            }
            Entry { id, offset: start, length: 0, body: EntryBody::Empty }
        } else {
            let end = start + slot.size as usize;
            let data = container.get(start..end).ok_or_else(|| PackError::Structural {
                id,
                offset: start,
                source: CodecError::violation(start, format!(
                    "slot {slot_index} ({} bytes at sector {}) runs past the {}-byte container",
                    slot.size, slot.sector, container.len()
                )),
            })?;
            let tag = classify(data, false);
            unpacker.build(id, tag, data, data.len(), start, start, Path::new(""))?
        };

        records.push(SlotRecord {
            slot:      slot_index,
            section:   slot.section,
            sector:    slot.sector,
            cd_sector: slot.sector.saturating_add(layout.cd_sector_base),
            entry,
        });
    }

    Ok(Unpacked {
        manifest: Manifest::new(container.len() as u64, records),
        files:    unpacker.files,
        container,
    })
}

// ── Repack ───────────────────────────────────────────────────────────────────

/// Result of [`repack`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Repacked {
    pub container: Vec<u8>,
    /// New (sector, size) for every slot, in slot order.
    pub directory: SectorDirectory,
}

/// Rebuild one entry from the files under `dir`.
pub fn rebuild_entry(entry: &Entry, dir: &Path) -> Result<Vec<u8>, PackError> {
    let structural = |source: CodecError| PackError::Structural { id: entry.id, offset: entry.offset, source };
    let child_dir = dir.join(entry.dir_name());

    match &entry.body {
        EntryBody::Empty => Ok(Vec::new()),
        EntryBody::Leaf(leaf) => {
            let path = dir.join(entry.leaf_file_name());
            let data = fs::read(&path).map_err(|e| match e.kind() {
                io::ErrorKind::NotFound => PackError::MissingAsset { id: entry.id, path: path.clone() },
                _ => PackError::Io { path: path.clone(), source: e },
            })?;
            if let Some(expected) = &leaf.checksum {
                if blake3::hash(&data).to_hex().as_str() != expected {
                    debug!(id = entry.id, old = entry.length, new = data.len(), "leaf edited since unpack");
                }
            }
            Ok(data)
        }
        EntryBody::Packed(p) => {
            let mut children = rebuild_children(&p.children, &child_dir)?;
            for (child, data) in p.children.iter().zip(children.iter_mut()) {
                if child.is_container() {
                    trim_block_pad(data, child.length);
                }
            }
            packed::encode(&p.header(), &children).map_err(structural)
        }
        EntryBody::Archive(a) => {
            let children = rebuild_children(&a.children, &child_dir)?;
            archive::encode(&a.header(), &a.offsets(), &children).map_err(structural)
        }
        EntryBody::Map(m) => {
            let children = rebuild_children(&m.children, &child_dir)?;
            map::encode(m.map_header, &children).map_err(structural)
        }
    }
}

fn rebuild_children(children: &[Entry], dir: &Path) -> Result<Vec<Vec<u8>>, PackError> {
    children.iter().map(|child| {
        let data = rebuild_entry(child, dir)?;
        if child.is_container() {
            note_drift(child, data.len());
        }
        Ok(data)
    }).collect()
}

/// Drop the zero tail a nested container picked up from its packed block's
/// alignment pad, restoring the recorded block length.
fn trim_block_pad(data: &mut Vec<u8>, recorded: usize) {
    if recorded < data.len()
        && data.len() <= align_4(recorded)
        && data[recorded..].iter().all(|&b| b == 0)
    {
        data.truncate(recorded);
    }
}

/// Log a rebuilt container whose size moved beyond alignment slack.
fn note_drift(entry: &Entry, rebuilt: usize) {
    if align_4(rebuilt) != align_4(entry.length) {
        warn!(id = entry.id, kind = entry.type_name(), manifest = entry.length, rebuilt,
              "rebuilt container size differs from manifest");
    }
}

/// Rebuild the container described by `manifest` from the files in `source`.
pub fn repack(manifest: &Manifest, source: &Path, opts: &RepackOptions) -> Result<Repacked, PackError> {
    let mut order: Vec<&SlotRecord> = manifest.entries.iter().collect();
    order.sort_by_key(|r| r.sector);

    let slot_total = manifest.entries.iter().map(|r| r.slot + 1).max().unwrap_or(0);
    let mut pairs = vec![(0u32, 0u32); slot_total];
    let mut out: Vec<u8> = Vec::with_capacity(manifest.container_len as usize);

    for record in order {
        let entry = &record.entry;
        if matches!(entry.body, EntryBody::Empty) {
            continue;
        }

        let mut data = rebuild_entry(entry, source)?;
        if opts.packed_terminator && matches!(entry.body, EntryBody::Packed(_)) {
            data.extend_from_slice(&[0u8; 4]);
        }
        if entry.is_container() {
            note_drift(entry, data.len());
        }

        let too_large = |what: &str, value: usize| PackError::Structural {
            id:     entry.id,
            offset: out.len(),
            source: CodecError::violation(out.len(), format!("{what} {value} exceeds 32 bits")),
        };
        let sector = u32::try_from(out.len() / SECTOR_SIZE).map_err(|_| too_large("sector", out.len() / SECTOR_SIZE))?;
        let size = u32::try_from(data.len()).map_err(|_| too_large("size", data.len()))?;

        debug!(slot = record.slot, id = entry.id, old_sector = record.sector, sector, size, "placed entry");
        out.extend_from_slice(&data);
        let aligned = align_sector(out.len());
        pad_to(&mut out, aligned);
        pairs[record.slot] = (sector, size);
    }

    info!(slots = slot_total, bytes = out.len(), "repacked container");
    Ok(Repacked { container: out, directory: SectorDirectory::from_pairs(pairs) })
}

// ── File-level helpers ───────────────────────────────────────────────────────

/// Unpack `container` into `dest`, reading the directory from `directory`.
pub fn unpack_files<P, Q, R>(
    container: P,
    directory: Q,
    dest:      R,
    layout:    &DirectoryLayout,
) -> Result<Manifest, PackError>
where
    P: AsRef<Path>,
    Q: AsRef<Path>,
    R: AsRef<Path>,
{
    let container = container.as_ref();
    let directory = directory.as_ref();
    let data = fs::read(container).map_err(io_at(container))?;
    let dir_bytes = fs::read(directory).map_err(io_at(directory))?;
    let sectors = SectorDirectory::read(&dir_bytes, layout)?;
    info!(slots = sectors.len(), container = %container.display(), "read sector directory");

    let mut ids = IdAllocator::new();
    let unpacked = unpack(&data, &sectors, layout, &mut ids)?;
    unpacked.write_to(dest)?;
    Ok(unpacked.manifest)
}

/// Re-extract the leaves of `container` into `dest` along an existing
/// manifest.  The directory file is not read.
pub fn unpack_files_with_manifest<P, Q, R>(container: P, manifest: Q, dest: R) -> Result<Manifest, PackError>
where
    P: AsRef<Path>,
    Q: AsRef<Path>,
    R: AsRef<Path>,
{
    let container = container.as_ref();
    let data = fs::read(container).map_err(io_at(container))?;
    let manifest = Manifest::load(manifest)?;
    if manifest.container_len != data.len() as u64 {
        warn!(expected = manifest.container_len, actual = data.len(), "container length differs from manifest");
    }

    let unpacked = Unpacked::from_manifest(manifest, &data)?;
    unpacked.write_to(dest)?;
    Ok(unpacked.manifest)
}

/// Repack the extraction in `source` and write a new container plus a
/// patched copy of `directory`.
pub fn repack_files<P, Q, R, S>(
    source:        P,
    directory:     Q,
    out_container: R,
    out_directory: S,
    layout:        &DirectoryLayout,
    opts:          &RepackOptions,
) -> Result<Repacked, PackError>
where
    P: AsRef<Path>,
    Q: AsRef<Path>,
    R: AsRef<Path>,
    S: AsRef<Path>,
{
    let source = source.as_ref();
    let directory = directory.as_ref();
    let manifest = Manifest::load(source.join(MANIFEST_FILE))?;
    let repacked = repack(&manifest, source, opts)?;

    let mut dir_bytes = fs::read(directory).map_err(io_at(directory))?;
    repacked.directory.patch(&mut dir_bytes, layout)?;

    let out_container = out_container.as_ref();
    let out_directory = out_directory.as_ref();
    fs::write(out_container, &repacked.container).map_err(io_at(out_container))?;
    fs::write(out_directory, &dir_bytes).map_err(io_at(out_directory))?;
    info!(container = %out_container.display(), directory = %out_directory.display(), "wrote repacked files");
    Ok(repacked)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::directory::DEFAULT_CD_SECTOR_BASE;

    fn dwords(values: &[u32]) -> Vec<u8> {
        values.iter().flat_map(|v| v.to_le_bytes()).collect()
    }

    /// Packed (slot 0), two empties, map (slot 3), archive with a VAB pair (slot 4).
    fn fixture() -> (Vec<u8>, SectorDirectory) {
        let mut packed = dwords(&[8]);
        packed.extend_from_slice(b"HELLOxyz");
        packed.extend_from_slice(&dwords(&[4]));
        packed.extend_from_slice(b"BODY");
        packed.extend_from_slice(&[0u8; 4]);

        let mut archive = dwords(&[2, 12, 20]);
        archive.extend_from_slice(b"pBAV\x01\x00\x00\x00");
        archive.extend_from_slice(b"DATA");

        let mut map = vec![1, 0, 0, 0, 2, 0, 2, 0];
        map.extend_from_slice(&dwords(&[0x18, 0x1C, 0x20, 0x24]));
        map.extend_from_slice(b"AAAABBBBCCCCDDDD");

        let mut container = packed.clone();
        container.resize(SECTOR_SIZE, 0);
        container.extend_from_slice(&archive);
        container.resize(2 * SECTOR_SIZE, 0);
        container.extend_from_slice(&map);
        container.resize(3 * SECTOR_SIZE, 0);

        let directory = SectorDirectory::from_pairs([
            (0, packed.len() as u32),
            (0, 0),
            (0, 0),
            (2, map.len() as u32),
            (1, archive.len() as u32),
        ]);
        (container, directory)
    }

    fn kinds(entry: &Entry) -> Vec<&'static str> {
        entry.children().iter().map(Entry::type_name).collect()
    }

    #[test]
    fn ids_are_preorder_and_containers_recurse() {
        let (container, directory) = fixture();
        let mut ids = IdAllocator::new();
        let unpacked = unpack(&container, &directory, &DirectoryLayout::default(), &mut ids).unwrap();
        let entries = &unpacked.manifest.entries;

        assert_eq!(entries.len(), 5);
        assert_eq!(entries[0].entry.type_name(), "packed");
        assert_eq!(entries[0].entry.id, 1);
        assert_eq!(entries[0].entry.children()[0].id, 2);
        assert_eq!(entries[1].entry.id, 4);
        assert!(matches!(entries[2].entry.body, EntryBody::Empty));
        assert_eq!(entries[3].entry.type_name(), "map");
        assert_eq!(kinds(&entries[3].entry), vec!["file"; 4]);
        assert_eq!(entries[4].entry.id, 11);
        assert_eq!(kinds(&entries[4].entry), vec!["vhb", "vhb_part"]);
        assert_eq!(entries[4].cd_sector, 1 + DEFAULT_CD_SECTOR_BASE);
        assert_eq!(unpacked.manifest.entry_count(), 13);
    }

    #[test]
    fn leaves_point_into_the_container() {
        let (container, directory) = fixture();
        let mut ids = IdAllocator::new();
        let unpacked = unpack(&container, &directory, &DirectoryLayout::default(), &mut ids).unwrap();

        let paths: Vec<String> = unpacked.files.iter()
            .map(|f| f.path.to_string_lossy().replace('\\', "/"))
            .collect();
        assert_eq!(paths[0], "packed_1/file_2.bin");
        assert!(paths.contains(&"archive_11/file_12.vhb".to_owned()));
        assert!(paths.contains(&"archive_11/file_13.vhb_part".to_owned()));

        let hello = &unpacked.files[0];
        assert_eq!(unpacked.bytes(hello), b"HELLOxyz");
        let data = unpacked.files.iter().find(|f| f.id == 13).unwrap();
        assert_eq!(unpacked.bytes(data), b"DATA");
        assert_eq!(data.range.start, SECTOR_SIZE + 20);
    }

    #[test]
    fn slot_past_container_end_is_structural() {
        let (container, _) = fixture();
        let directory = SectorDirectory::from_pairs([(2, 4096)]);
        let mut ids = IdAllocator::new();
        let err = unpack(&container, &directory, &DirectoryLayout::default(), &mut ids).unwrap_err();
        assert!(matches!(err, PackError::Structural { id: 1, .. }));
    }

    #[test]
    fn zero_size_slot_repacks_as_empty() {
        let (container, _) = fixture();
        let directory = SectorDirectory::from_pairs([(7, 0), (0, 24)]);
        let mut ids = IdAllocator::new();
        let unpacked = unpack(&container, &directory, &DirectoryLayout::default(), &mut ids).unwrap();
        assert!(matches!(unpacked.manifest.entries[0].entry.body, EntryBody::Empty));

        let dir = tempfile::tempdir().unwrap();
        unpacked.write_to(dir.path()).unwrap();
        let repacked = repack(&unpacked.manifest, dir.path(), &RepackOptions::default()).unwrap();
        assert!(repacked.directory.slots[0].is_empty());
        assert_eq!(repacked.directory.slots[1].size, 24);
    }

    #[test]
    fn repack_reproduces_the_container() {
        let (container, directory) = fixture();
        let mut ids = IdAllocator::new();
        let unpacked = unpack(&container, &directory, &DirectoryLayout::default(), &mut ids).unwrap();
        let dir = tempfile::tempdir().unwrap();
        unpacked.write_to(dir.path()).unwrap();

        let manifest = Manifest::load(dir.path().join(MANIFEST_FILE)).unwrap();
        let repacked = repack(&manifest, dir.path(), &RepackOptions::default()).unwrap();
        assert_eq!(repacked.container, container);
        assert_eq!(repacked.directory, directory);
    }

    #[test]
    fn missing_leaf_is_reported() {
        let (container, directory) = fixture();
        let mut ids = IdAllocator::new();
        let unpacked = unpack(&container, &directory, &DirectoryLayout::default(), &mut ids).unwrap();
        let dir = tempfile::tempdir().unwrap();
        unpacked.write_to(dir.path()).unwrap();
        fs::remove_file(dir.path().join("map_6").join("file_8.bin")).unwrap();

        let err = repack(&unpacked.manifest, dir.path(), &RepackOptions::default()).unwrap_err();
        assert!(matches!(err, PackError::MissingAsset { id: 8, .. }));
    }

    /// A 22-byte archive stored in a packed block; only its 4-aligned view
    /// satisfies the archive bounds.
    fn nested_archive() -> Vec<u8> {
        let mut inner = dwords(&[2, 16, 24, 24]);
        inner.extend_from_slice(b"ABCDEF");

        let mut outer = dwords(&[inner.len() as u32]);
        outer.extend_from_slice(&inner);
        outer.extend_from_slice(&[0u8; 2]);
        outer.extend_from_slice(&[0u8; 4]);
        outer
    }

    #[test]
    fn packed_child_is_classified_on_its_aligned_view() {
        let outer = nested_archive();
        assert_eq!(classify(&outer[4..26], true), TypeTag::File);
        assert_eq!(classify(&outer[4..28], true), TypeTag::Archive);

        let directory = SectorDirectory::from_pairs([(0, outer.len() as u32)]);
        let mut ids = IdAllocator::new();
        let unpacked = unpack(&outer, &directory, &DirectoryLayout::default(), &mut ids).unwrap();

        let top = &unpacked.manifest.entries[0].entry;
        assert_eq!(top.type_name(), "packed");
        let child = &top.children()[0];
        assert_eq!(child.type_name(), "archive");
        assert_eq!(child.length, 22);
        assert_eq!(kinds(child), vec!["file", "file"]);
        let leaf = unpacked.files.iter().find(|f| f.id == 3).unwrap();
        assert_eq!(unpacked.bytes(leaf), b"ABCDEF\0\0");
    }

    #[test]
    fn nested_archive_keeps_its_block_length_on_repack() {
        let outer = nested_archive();
        let directory = SectorDirectory::from_pairs([(0, outer.len() as u32)]);
        let mut ids = IdAllocator::new();
        let unpacked = unpack(&outer, &directory, &DirectoryLayout::default(), &mut ids).unwrap();

        let dir = tempfile::tempdir().unwrap();
        unpacked.write_to(dir.path()).unwrap();
        let repacked = repack(&unpacked.manifest, dir.path(), &RepackOptions::default()).unwrap();
        assert_eq!(&repacked.container[..outer.len()], &outer[..]);
        assert_eq!(repacked.directory.slots[0].size, outer.len() as u32);
    }

    #[test]
    fn manifest_alone_recovers_the_leaf_list() {
        let (container, directory) = fixture();
        let mut ids = IdAllocator::new();
        let unpacked = unpack(&container, &directory, &DirectoryLayout::default(), &mut ids).unwrap();

        let again = Unpacked::from_manifest(unpacked.manifest.clone(), &container).unwrap();
        assert_eq!(again.files, unpacked.files);
    }

    #[test]
    fn manifest_leaf_past_container_is_structural() {
        let (container, directory) = fixture();
        let mut ids = IdAllocator::new();
        let unpacked = unpack(&container, &directory, &DirectoryLayout::default(), &mut ids).unwrap();

        let err = Unpacked::from_manifest(unpacked.manifest.clone(), &container[..SECTOR_SIZE]).unwrap_err();
        assert!(matches!(err, PackError::Structural { .. }));
    }

    #[test]
    fn ids_can_start_elsewhere() {
        let mut ids = IdAllocator::starting_at(100);
        assert_eq!(ids.next_id(), 100);
        assert_eq!(ids.next_id(), 101);
    }
}
