//! Backing storage of a loaded archive.

use std::fs::File;
use std::io::Read;
use std::ops::Deref;
use std::path::Path;
use std::sync::Arc;

#[cfg(feature = "mmap")]
use memmap2::Mmap;

use crate::util::{Error, Result};

/// Archive bytes, either owned or memory-mapped.
#[derive(Clone)]
pub enum ArchiveData {
    /// Bytes held in memory.
    Owned(Arc<[u8]>),
    /// Memory-mapped file (preferred for large archives).
    #[cfg(feature = "mmap")]
    Mapped(Arc<Mmap>),
}

impl ArchiveData {
    /// Open a file, memory-mapping it when the `mmap` feature is enabled.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        Self::open_opts(path, cfg!(feature = "mmap"))
    }

    /// Open a file with optional memory mapping.
    pub fn open_opts(path: impl AsRef<Path>, use_mmap: bool) -> Result<Self> {
        let path = path.as_ref();
        let mut file = File::open(path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                Error::FileNotFound(path.to_path_buf())
            } else {
                Error::Io(e)
            }
        })?;
        let size = file.metadata()?.len();

        #[cfg(feature = "mmap")]
        {
            if use_mmap && size > 0 {
                // Safety: the file is opened read-only; the archive is validated
                // (checksum included) before any payload is trusted.
                let mmap = unsafe { Mmap::map(&file) }.map_err(|e| Error::MmapFailed(e.to_string()))?;
                tracing::debug!(path = %path.display(), size, "mapped archive");
                return Ok(Self::Mapped(Arc::new(mmap)));
            }
        }
        #[cfg(not(feature = "mmap"))]
        let _ = use_mmap;

        let mut buf = Vec::with_capacity(size as usize);
        file.read_to_end(&mut buf)?;
        tracing::debug!(path = %path.display(), size = buf.len(), "read archive");
        Ok(Self::Owned(buf.into()))
    }

    /// Whether the bytes come from a memory map.
    pub fn is_mapped(&self) -> bool {
        match self {
            Self::Owned(_) => false,
            #[cfg(feature = "mmap")]
            Self::Mapped(_) => true,
        }
    }
}

impl Deref for ArchiveData {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        match self {
            Self::Owned(bytes) => &bytes[..],
            #[cfg(feature = "mmap")]
            Self::Mapped(mmap) => &mmap[..],
        }
    }
}

impl AsRef<[u8]> for ArchiveData {
    fn as_ref(&self) -> &[u8] {
        self
    }
}

impl From<Vec<u8>> for ArchiveData {
    fn from(bytes: Vec<u8>) -> Self {
        Self::Owned(bytes.into())
    }
}

impl From<&[u8]> for ArchiveData {
    fn from(bytes: &[u8]) -> Self {
        Self::Owned(bytes.into())
    }
}

impl From<Arc<[u8]>> for ArchiveData {
    fn from(bytes: Arc<[u8]>) -> Self {
        Self::Owned(bytes)
    }
}

impl std::fmt::Debug for ArchiveData {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ArchiveData")
            .field("mapped", &self.is_mapped())
            .field("len", &self.len())
            .finish()
    }
}
