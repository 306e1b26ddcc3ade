//! Core of castorfs: the backend client contract, the path-based adapter and
//! the virtual extended attributes synthesized from tape segment records.

mod adapter;
mod error;
mod fs;
mod gate;
mod memory;
mod path;
mod traits;
pub mod xattr;

pub use adapter::{build_backend, CastorFs};
pub use error::{BackendError, FsError, FsResult};
pub use fs::FsBackend;
pub use gate::{Mutation, ReadOnlyGate};
pub use memory::MemoryBackend;
pub use path::PathResolver;
pub use traits::{
    Backend, DirEntry, DirHandle, FileHandle, FileStat, MigrationStatus, SegmentRecord, S_IFDIR,
    S_IFLNK, S_IFMT, S_IFREG,
};
pub use xattr::{AttributeCatalog, VirtualAttr, XattrReply};
