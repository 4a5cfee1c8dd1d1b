//! Tests for custom FileSystem implementations
//!
//! Verifies that everything needed to implement a FileSystem is exported and
//! that filesystem errors surface as ordinary command failures.

use std::io::{Error as IoError, ErrorKind};
use std::path::Path;
use std::sync::Arc;
use workshell::{
    DirEntry, Error, FileSystem, FileType, InMemoryFs, Metadata, Result, Shell, async_trait,
};

/// Read-only view over a seeded in-memory filesystem.
struct ReadOnlyFs {
    inner: InMemoryFs,
}

fn read_only() -> Error {
    IoError::new(ErrorKind::PermissionDenied, "Read-only file system").into()
}

#[async_trait]
impl FileSystem for ReadOnlyFs {
    async fn read_file(&self, path: &Path) -> Result<Vec<u8>> {
        self.inner.read_file(path).await
    }

    async fn write_file(&self, _path: &Path, _content: &[u8]) -> Result<()> {
        Err(read_only())
    }

    async fn append_file(&self, _path: &Path, _content: &[u8]) -> Result<()> {
        Err(read_only())
    }

    async fn mkdir(&self, _path: &Path, _recursive: bool) -> Result<()> {
        Err(read_only())
    }

    async fn remove(&self, _path: &Path, _recursive: bool) -> Result<()> {
        Err(read_only())
    }

    async fn stat(&self, path: &Path) -> Result<Metadata> {
        self.inner.stat(path).await
    }

    async fn read_dir(&self, path: &Path) -> Result<Vec<DirEntry>> {
        self.inner.read_dir(path).await
    }

    async fn exists(&self, path: &Path) -> Result<bool> {
        self.inner.exists(path).await
    }
}

fn shell() -> Shell {
    let inner = InMemoryFs::new()
        .with_file("/repo/README.md", "# demo\n")
        .with_file("/repo/check.sh", "cat /repo/README.md\necho done > /repo/out\necho $?\n");
    Shell::builder()
        .fs(Arc::new(ReadOnlyFs { inner }))
        .build()
}

#[tokio::test]
async fn test_reads_go_through_custom_fs() {
    let mut shell = shell();
    let result = shell.exec("cat /repo/README.md; ls /repo").await.unwrap();
    assert_eq!(result.stdout, "# demo\nREADME.md\ncheck.sh\n");
}

#[tokio::test]
async fn test_write_errors_are_command_failures() {
    let output = shell().run("sh /repo/check.sh").await.unwrap();
    assert_eq!(output.stdout, "# demo\n1\n");
    assert_eq!(output.stderr, "sh: /repo/out: Read-only file system\n");
    assert_eq!(output.code, 0);
}

#[tokio::test]
async fn test_builtin_reports_fs_error() {
    let mut shell = shell();
    let result = shell.exec("mkdir /repo/new").await.unwrap();
    assert_eq!(result.exit_code, 1);
    assert!(result.stderr.contains("Read-only file system"), "{}", result.stderr);
}

#[tokio::test]
async fn test_metadata_types_are_public() {
    let shell = shell();
    let meta = shell.fs().stat(Path::new("/repo")).await.unwrap();
    assert_eq!(meta.file_type, FileType::Directory);
    assert!(meta.file_type.is_dir());

    let entries = shell.fs().read_dir(Path::new("/repo")).await.unwrap();
    let names: Vec<&str> = entries.iter().map(|e| e.name.as_str()).collect();
    assert!(names.contains(&"README.md"));
}
