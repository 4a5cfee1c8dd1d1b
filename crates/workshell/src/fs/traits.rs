//! Filesystem trait definitions

use async_trait::async_trait;
use std::path::Path;
use std::time::SystemTime;

use crate::error::Result;

/// Async filesystem trait.
///
/// Paths are absolute; callers resolve them against the shell's cwd first.
/// Failures are `Error::Io` carrying POSIX-style messages such as
/// `No such file or directory`, which end up verbatim on a command's stderr.
#[async_trait]
pub trait FileSystem: Send + Sync {
    /// Read a file's contents.
    async fn read_file(&self, path: &Path) -> Result<Vec<u8>>;

    /// Create or replace a file. The parent directory must exist.
    async fn write_file(&self, path: &Path, content: &[u8]) -> Result<()>;

    /// Append to a file, creating it if missing.
    async fn append_file(&self, path: &Path, content: &[u8]) -> Result<()>;

    /// Create a directory, with `recursive` behaving like `mkdir -p`.
    async fn mkdir(&self, path: &Path, recursive: bool) -> Result<()>;

    /// Remove a file or directory. Non-empty directories need `recursive`.
    async fn remove(&self, path: &Path, recursive: bool) -> Result<()>;

    /// Get file metadata.
    async fn stat(&self, path: &Path) -> Result<Metadata>;

    /// Directory entries sorted by name.
    async fn read_dir(&self, path: &Path) -> Result<Vec<DirEntry>>;

    /// Check if a path exists.
    async fn exists(&self, path: &Path) -> Result<bool>;
}

/// File metadata.
#[derive(Debug, Clone)]
pub struct Metadata {
    pub file_type: FileType,
    /// Size in bytes (0 for directories)
    pub size: u64,
    pub modified: SystemTime,
}

/// File type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileType {
    File,
    Directory,
}

impl FileType {
    pub fn is_file(&self) -> bool {
        matches!(self, FileType::File)
    }

    pub fn is_dir(&self) -> bool {
        matches!(self, FileType::Directory)
    }
}

/// Directory entry.
#[derive(Debug, Clone)]
pub struct DirEntry {
    /// Entry name (not full path)
    pub name: String,
    pub metadata: Metadata,
}
