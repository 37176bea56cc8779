//! Binary pipeline archives.
//!
//! An archive packs named shader and pipeline-state descriptors into one
//! checksummed blob. [`Archiver`] writes it, [`Dearchiver`] loads it and
//! materializes descriptors through a [`RenderDevice`].
//!
//! ## Container layout
//!
//! ```text
//! +--------------------+
//! | header (32 bytes)  |  magic, versions, entry count, body size, xxh3
//! +--------------------+
//! | directory          |  kind, pipeline type, flags, name, offset, size
//! +--------------------+
//! | payloads           |  encoded descriptors, optionally zlib-compressed
//! +--------------------+
//! ```
//!
//! [`RenderDevice`]: crate::pipeline::RenderDevice

pub mod codec;
pub mod compression;
mod data;
mod dearchiver;
pub mod format;
mod reader;
mod stream;
mod writer;

pub use data::ArchiveData;
pub use dearchiver::Dearchiver;
pub use format::{ArchiveHeader, EntryKind, ARCHIVE_MAGIC, CURRENT_VERSION, HEADER_SIZE};
pub use reader::{ArchiveEntry, ArchiveReader};
pub use writer::{Archiver, DEFAULT_COMPRESSION_LEVEL};
