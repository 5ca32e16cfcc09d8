pub mod codec;
pub mod container;
pub mod directory;
pub mod manifest;
pub mod signature;

pub use codec::{ChildSpan, CodecError, SECTOR_SIZE};
pub use container::{repack, repack_files, unpack, unpack_files, unpack_files_with_manifest, IdAllocator, PackError, RepackOptions};
pub use directory::{DirectoryLayout, SectorDirectory, SectorSlot};
pub use manifest::{Entry, EntryBody, Manifest, MANIFEST_FILE};
pub use signature::{classify, TypeTag};
