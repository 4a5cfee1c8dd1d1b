//! In-memory filesystem implementation

use async_trait::async_trait;
use std::collections::HashMap;
use std::io::{Error as IoError, ErrorKind};
use std::path::{Component, Path, PathBuf};
use std::time::SystemTime;
use tokio::sync::RwLock;

use super::traits::{DirEntry, FileSystem, FileType, Metadata};
use crate::error::Result;

/// In-memory filesystem.
///
/// Stores all files and directories in a map keyed by normalized absolute
/// path. A fresh filesystem contains `/`, `/tmp`, `/home` and `/home/user`.
pub struct InMemoryFs {
    entries: RwLock<HashMap<PathBuf, FsEntry>>,
}

#[derive(Debug, Clone)]
enum FsEntry {
    File { content: Vec<u8>, modified: SystemTime },
    Directory { modified: SystemTime },
}

impl FsEntry {
    fn dir() -> Self {
        FsEntry::Directory {
            modified: SystemTime::now(),
        }
    }

    fn file(content: Vec<u8>) -> Self {
        FsEntry::File {
            content,
            modified: SystemTime::now(),
        }
    }

    fn metadata(&self) -> Metadata {
        match self {
            FsEntry::File { content, modified } => Metadata {
                file_type: FileType::File,
                size: content.len() as u64,
                modified: *modified,
            },
            FsEntry::Directory { modified } => Metadata {
                file_type: FileType::Directory,
                size: 0,
                modified: *modified,
            },
        }
    }
}

fn not_found() -> IoError {
    IoError::new(ErrorKind::NotFound, "No such file or directory")
}

fn is_a_directory() -> IoError {
    IoError::other("Is a directory")
}

fn not_a_directory() -> IoError {
    IoError::other("Not a directory")
}

impl Default for InMemoryFs {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryFs {
    /// Create a new in-memory filesystem.
    pub fn new() -> Self {
        let entries = ["/", "/tmp", "/home", "/home/user"]
            .iter()
            .map(|dir| (PathBuf::from(dir), FsEntry::dir()))
            .collect();

        Self {
            entries: RwLock::new(entries),
        }
    }

    /// Seed a file, creating its parent directories.
    pub fn with_file(mut self, path: impl AsRef<Path>, content: impl Into<Vec<u8>>) -> Self {
        let path = normalize_path(path.as_ref());
        let entries = self.entries.get_mut();
        for ancestor in path.ancestors().skip(1) {
            entries
                .entry(ancestor.to_path_buf())
                .or_insert_with(FsEntry::dir);
        }
        entries.insert(path, FsEntry::file(content.into()));
        self
    }
}

/// Collapse `.`/`..` and make the path absolute.
fn normalize_path(path: &Path) -> PathBuf {
    let mut result = PathBuf::from("/");
    for component in path.components() {
        match component {
            Component::Normal(name) => result.push(name),
            Component::ParentDir => {
                result.pop();
            }
            Component::RootDir | Component::CurDir | Component::Prefix(_) => {}
        }
    }
    result
}

/// The parent of `path` must be an existing directory.
fn check_parent(entries: &HashMap<PathBuf, FsEntry>, path: &Path) -> std::io::Result<()> {
    let Some(parent) = path.parent() else {
        return Ok(());
    };
    match entries.get(parent) {
        Some(FsEntry::Directory { .. }) => Ok(()),
        Some(FsEntry::File { .. }) => Err(not_a_directory()),
        None => Err(not_found()),
    }
}

#[async_trait]
impl FileSystem for InMemoryFs {
    async fn read_file(&self, path: &Path) -> Result<Vec<u8>> {
        let path = normalize_path(path);
        let entries = self.entries.read().await;

        match entries.get(&path) {
            Some(FsEntry::File { content, .. }) => Ok(content.clone()),
            Some(FsEntry::Directory { .. }) => Err(is_a_directory().into()),
            None => Err(not_found().into()),
        }
    }

    async fn write_file(&self, path: &Path, content: &[u8]) -> Result<()> {
        let path = normalize_path(path);
        let mut entries = self.entries.write().await;

        check_parent(&entries, &path)?;
        if let Some(FsEntry::Directory { .. }) = entries.get(&path) {
            return Err(is_a_directory().into());
        }
        entries.insert(path, FsEntry::file(content.to_vec()));
        Ok(())
    }

    async fn append_file(&self, path: &Path, content: &[u8]) -> Result<()> {
        let path = normalize_path(path);
        let mut entries = self.entries.write().await;

        match entries.get_mut(&path) {
            Some(FsEntry::File {
                content: existing,
                modified,
            }) => {
                existing.extend_from_slice(content);
                *modified = SystemTime::now();
                Ok(())
            }
            Some(FsEntry::Directory { .. }) => Err(is_a_directory().into()),
            None => {
                check_parent(&entries, &path)?;
                entries.insert(path, FsEntry::file(content.to_vec()));
                Ok(())
            }
        }
    }

    async fn mkdir(&self, path: &Path, recursive: bool) -> Result<()> {
        let path = normalize_path(path);
        let mut entries = self.entries.write().await;

        if recursive {
            let mut current = PathBuf::from("/");
            for component in path.components().skip(1) {
                current.push(component);
                match entries.get(&current) {
                    Some(FsEntry::Directory { .. }) => {}
                    Some(FsEntry::File { .. }) if current == path => {
                        return Err(IoError::new(ErrorKind::AlreadyExists, "File exists").into());
                    }
                    Some(FsEntry::File { .. }) => return Err(not_a_directory().into()),
                    None => {
                        entries.insert(current.clone(), FsEntry::dir());
                    }
                }
            }
            return Ok(());
        }

        check_parent(&entries, &path)?;
        if entries.contains_key(&path) {
            return Err(IoError::new(ErrorKind::AlreadyExists, "File exists").into());
        }
        entries.insert(path, FsEntry::dir());
        Ok(())
    }

    async fn remove(&self, path: &Path, recursive: bool) -> Result<()> {
        let path = normalize_path(path);
        let mut entries = self.entries.write().await;

        if path == Path::new("/") {
            return Err(IoError::new(ErrorKind::PermissionDenied, "Operation not permitted").into());
        }

        match entries.get(&path) {
            Some(FsEntry::Directory { .. }) => {
                let children: Vec<PathBuf> = entries
                    .keys()
                    .filter(|p| *p != &path && p.starts_with(&path))
                    .cloned()
                    .collect();
                if !children.is_empty() && !recursive {
                    return Err(IoError::other("Directory not empty").into());
                }
                for child in children {
                    entries.remove(&child);
                }
                entries.remove(&path);
                Ok(())
            }
            Some(FsEntry::File { .. }) => {
                entries.remove(&path);
                Ok(())
            }
            None => Err(not_found().into()),
        }
    }

    async fn stat(&self, path: &Path) -> Result<Metadata> {
        let path = normalize_path(path);
        let entries = self.entries.read().await;

        entries
            .get(&path)
            .map(FsEntry::metadata)
            .ok_or_else(|| not_found().into())
    }

    async fn read_dir(&self, path: &Path) -> Result<Vec<DirEntry>> {
        let path = normalize_path(path);
        let entries = self.entries.read().await;

        match entries.get(&path) {
            Some(FsEntry::Directory { .. }) => {
                let mut result: Vec<DirEntry> = entries
                    .iter()
                    .filter(|(p, _)| p.parent() == Some(path.as_path()))
                    .filter_map(|(p, entry)| {
                        let name = p.file_name()?.to_string_lossy().into_owned();
                        Some(DirEntry {
                            name,
                            metadata: entry.metadata(),
                        })
                    })
                    .collect();
                result.sort_by(|a, b| a.name.cmp(&b.name));
                Ok(result)
            }
            Some(FsEntry::File { .. }) => Err(not_a_directory().into()),
            None => Err(not_found().into()),
        }
    }

    async fn exists(&self, path: &Path) -> Result<bool> {
        let path = normalize_path(path);
        let entries = self.entries.read().await;
        Ok(entries.contains_key(&path))
    }
}
