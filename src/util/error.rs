//! Error types for the rtbind library.

use std::path::PathBuf;
use thiserror::Error;

use crate::archive::EntryKind;
use crate::sbt::SbtTable;

/// Main error type for binding-table and archive operations.
#[derive(Error, Debug)]
pub enum Error {
    /// Shader group name is not registered with the pipeline
    #[error("Unknown shader group: {0}")]
    UnknownGroup(String),

    /// A name is already taken (shader group, archive entry, TLAS instance, geometry)
    #[error("Duplicate name: {0}")]
    DuplicateName(String),

    /// Instance or geometry name does not exist in the acceleration structure
    #[error("Not found in '{structure}': {what}")]
    NotFound { structure: String, what: String },

    /// Payload length differs from the group's declared inline data size
    #[error("Payload size mismatch for group '{group}': expected {expected} bytes, got {actual}")]
    PayloadSizeMismatch {
        group: String,
        expected: usize,
        actual: usize,
    },

    /// Shader group kind cannot be placed in the requested sub-table
    #[error("Shader group '{group}' cannot be bound in the {table} table")]
    GroupKindMismatch { group: String, table: SbtTable },

    /// Shader handle has the wrong size or is the null sentinel
    #[error("Invalid shader handle for group '{group}': {reason}")]
    InvalidHandle { group: String, reason: String },

    /// Device reported an unusable binding table layout
    #[error("Invalid binding table layout: {0}")]
    InvalidLayout(String),

    /// Acceleration structure binding mode does not allow this kind of bind
    #[error("Acceleration structure '{structure}' does not support {operation}")]
    InvalidBindingMode { structure: String, operation: String },

    /// Ray offset is not smaller than the hit group stride
    #[error("Ray offset {offset} out of range (hit group stride: {stride})")]
    InvalidRayOffset { offset: u32, stride: u32 },

    /// Record index exceeds the sub-table capacity limit
    #[error("{table} record index {index} out of range (limit: {limit})")]
    SlotOutOfRange {
        table: SbtTable,
        index: u32,
        limit: u32,
    },

    /// Acceleration structure was rebuilt after records were bound against it
    #[error("Acceleration structure '{structure}' was rebuilt (bound at generation {bound}, now {current})")]
    StaleStructure {
        structure: String,
        bound: u64,
        current: u64,
    },

    /// A record the dispatch may reach was never bound
    #[error("{table} record {index} is not bound")]
    UnboundRecord { table: SbtTable, index: u32 },

    /// Archive blob failed validation
    #[error("Corrupt archive: {0}")]
    CorruptArchive(String),

    /// Unsupported archive container version
    #[error("Unsupported archive version: {0}")]
    UnsupportedVersion(u16),

    /// Archive content version differs from the one the caller expects
    #[error("Archive content version mismatch: expected {expected}, got {actual}")]
    ContentVersionMismatch { expected: u32, actual: u32 },

    /// Dearchiver already holds an archive
    #[error("Archive is already loaded")]
    AlreadyLoaded,

    /// Dearchiver has no archive loaded
    #[error("No archive is loaded")]
    NotLoaded,

    /// No archive entry with this kind and name
    #[error("{kind} entry not found: {name}")]
    EntryNotFound { kind: EntryKind, name: String },

    /// Type mismatch when unpacking
    #[error("Type mismatch: expected {expected}, got {actual}")]
    TypeMismatch { expected: String, actual: String },

    /// Descriptor failed validation
    #[error("Invalid descriptor: {0}")]
    InvalidDescriptor(String),

    /// File does not exist or cannot be accessed
    #[error("File not found: {0}")]
    FileNotFound(PathBuf),

    /// Memory mapping failed
    #[error("Memory mapping failed: {0}")]
    MmapFailed(String),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Generic error with message
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Create an "other" error from a string.
    pub fn other(msg: impl Into<String>) -> Self {
        Self::Other(msg.into())
    }

    /// Create a corrupt archive error.
    pub fn corrupt(msg: impl Into<String>) -> Self {
        Self::CorruptArchive(msg.into())
    }

    /// Create an invalid descriptor error.
    pub fn invalid_desc(msg: impl Into<String>) -> Self {
        Self::InvalidDescriptor(msg.into())
    }
}

/// Result type alias for rtbind operations.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let e = Error::PayloadSizeMismatch {
            group: "Hit0".into(),
            expected: 16,
            actual: 12,
        };
        let s = e.to_string();
        assert!(s.contains("Hit0"));
        assert!(s.contains("16"));
        assert!(s.contains("12"));

        let e = Error::SlotOutOfRange {
            table: SbtTable::Miss,
            index: 9,
            limit: 4,
        };
        assert!(e.to_string().starts_with("miss"));

        let e = Error::EntryNotFound {
            kind: EntryKind::Shader,
            name: "X".into(),
        };
        assert!(e.to_string().contains("shader"));
    }

    #[test]
    fn test_error_from_io() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "test");
        let err: Error = io_err.into();
        assert!(matches!(err, Error::Io(_)));
    }
}
