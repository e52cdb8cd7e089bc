//! A uniform view of files with real and in-memory backends.
//!
//! Every component that touches storage (the route tree builder, the
//! transform cache, the production builder) accepts `Arc<dyn FileSystem>`
//! instead of calling `tokio::fs` directly, so tests can pin any component
//! to [`memory::MemoryFileSystem`] without touching the host disk.

mod memory;
mod real;

pub use memory::MemoryFileSystem;
pub use real::RealFileSystem;

use anyhow::Result;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

/// A single directory entry as returned by [`FileSystem::read_dir`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DirEntry {
    pub name: String,
    pub is_dir: bool,
}

/// File metadata as returned by [`FileSystem::stat`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Metadata {
    pub is_dir: bool,
    pub is_file: bool,
    pub len: u64,
    pub modified: SystemTime,
}

pub type BoxFuture<'a, T> = std::pin::Pin<Box<dyn std::future::Future<Output = T> + Send + 'a>>;

/// Uniform filesystem operations used throughout the core.
///
/// Implementations must return entries from [`FileSystem::read_dir`] in
/// stable sorted order (by name) so route-tree construction is
/// deterministic across backends.
pub trait FileSystem: Send + Sync {
    /// List the immediate children of `path`. Returns an empty vector (not
    /// an error) for a missing directory, matching the route builder's
    /// "missing root yields an empty tree" edge policy.
    fn read_dir<'a>(&'a self, path: &'a Path) -> BoxFuture<'a, Result<Vec<DirEntry>>>;

    fn stat<'a>(&'a self, path: &'a Path) -> BoxFuture<'a, Result<Metadata>>;

    fn read_bytes<'a>(&'a self, path: &'a Path) -> BoxFuture<'a, Result<Vec<u8>>>;

    fn read_text<'a>(&'a self, path: &'a Path) -> BoxFuture<'a, Result<String>> {
        Box::pin(async move {
            let bytes = self.read_bytes(path).await?;
            Ok(String::from_utf8(bytes)?)
        })
    }

    fn write<'a>(&'a self, path: &'a Path, contents: &'a [u8]) -> BoxFuture<'a, Result<()>>;

    fn mkdir_recursive<'a>(&'a self, path: &'a Path) -> BoxFuture<'a, Result<()>>;

    fn unlink<'a>(&'a self, path: &'a Path) -> BoxFuture<'a, Result<()>>;

    fn copy_recursive<'a>(&'a self, from: &'a Path, to: &'a Path) -> BoxFuture<'a, Result<()>>;

    fn exists<'a>(&'a self, path: &'a Path) -> BoxFuture<'a, bool> {
        Box::pin(async move { self.stat(path).await.is_ok() })
    }

    fn set_mtime<'a>(&'a self, path: &'a Path, time: SystemTime) -> BoxFuture<'a, Result<()>>;
}

/// Collect every regular file under `root`, recursively, as paths relative
/// to `root` with posix separators. Used by the production builder to
/// enumerate the public folder and the asset directory for compression.
pub async fn walk_files(fs: &dyn FileSystem, root: &Path) -> Result<Vec<PathBuf>> {
    let mut out = Vec::new();
    let mut stack = vec![PathBuf::new()];
    while let Some(rel) = stack.pop() {
        let dir = if rel.as_os_str().is_empty() {
            root.to_path_buf()
        } else {
            root.join(&rel)
        };
        for entry in fs.read_dir(&dir).await? {
            let child_rel = rel.join(&entry.name);
            if entry.is_dir {
                stack.push(child_rel);
            } else {
                out.push(child_rel);
            }
        }
    }
    out.sort();
    Ok(out)
}
