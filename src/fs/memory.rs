use super::{BoxFuture, DirEntry, FileSystem, Metadata};
use crate::common::normalize_rel_path;
use anyhow::{anyhow, Result};
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Mutex;
use std::time::SystemTime;

/// A fully in-process filesystem, byte-exact for every operation the core
/// uses. Paths are normalized to a posix-style key (`.` collapsed,
/// backslashes turned to forward slashes) before lookup, so
/// `MemoryFileSystem` behaves the same whether tests build paths with
/// `PathBuf::join` or string concatenation.
#[derive(Default)]
pub struct MemoryFileSystem {
    files: Mutex<BTreeMap<String, Vec<u8>>>,
    mtimes: Mutex<BTreeMap<String, SystemTime>>,
}

impl MemoryFileSystem {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed the filesystem with a file, creating any implied parent
    /// directories implicitly (directories are not stored separately; a
    /// directory "exists" iff some file key is prefixed by it).
    pub fn with_file(self, path: impl AsRef<Path>, contents: impl Into<Vec<u8>>) -> Self {
        self.set_file(path, contents);
        self
    }

    pub fn set_file(&self, path: impl AsRef<Path>, contents: impl Into<Vec<u8>>) {
        let key = key_of(path.as_ref());
        self.files.lock().unwrap().insert(key, contents.into());
    }

    fn is_directory(&self, key: &str) -> bool {
        if key.is_empty() {
            return true;
        }
        let prefix = format!("{key}/");
        self.files.lock().unwrap().keys().any(|k| k.starts_with(&prefix))
    }
}

fn key_of(path: &Path) -> String {
    normalize_rel_path(path)
}

impl FileSystem for MemoryFileSystem {
    fn read_dir<'a>(&'a self, path: &'a Path) -> BoxFuture<'a, Result<Vec<DirEntry>>> {
        Box::pin(async move {
            let key = key_of(path);
            let prefix = if key.is_empty() {
                String::new()
            } else {
                format!("{key}/")
            };
            let files = self.files.lock().unwrap();
            let mut seen = std::collections::BTreeMap::new();
            for full_key in files.keys() {
                let Some(rest) = full_key.strip_prefix(prefix.as_str()) else {
                    continue;
                };
                if rest.is_empty() {
                    continue;
                }
                let mut segments = rest.splitn(2, '/');
                let name = segments.next().unwrap().to_string();
                let is_dir = segments.next().is_some();
                seen.entry(name).or_insert(is_dir);
            }
            Ok(seen
                .into_iter()
                .map(|(name, is_dir)| DirEntry { name, is_dir })
                .collect())
        })
    }

    fn stat<'a>(&'a self, path: &'a Path) -> BoxFuture<'a, Result<Metadata>> {
        Box::pin(async move {
            let key = key_of(path);
            let files = self.files.lock().unwrap();
            if let Some(contents) = files.get(&key) {
                let modified = self
                    .mtimes
                    .lock()
                    .unwrap()
                    .get(&key)
                    .copied()
                    .unwrap_or(std::time::UNIX_EPOCH);
                return Ok(Metadata {
                    is_dir: false,
                    is_file: true,
                    len: contents.len() as u64,
                    modified,
                });
            }
            drop(files);
            if self.is_directory(&key) {
                Ok(Metadata {
                    is_dir: true,
                    is_file: false,
                    len: 0,
                    modified: std::time::UNIX_EPOCH,
                })
            } else {
                Err(anyhow!("no such file or directory: {}", key))
            }
        })
    }

    fn read_bytes<'a>(&'a self, path: &'a Path) -> BoxFuture<'a, Result<Vec<u8>>> {
        Box::pin(async move {
            let key = key_of(path);
            self.files
                .lock()
                .unwrap()
                .get(&key)
                .cloned()
                .ok_or_else(|| anyhow!("no such file: {}", key))
        })
    }

    fn write<'a>(&'a self, path: &'a Path, contents: &'a [u8]) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            self.set_file(path, contents.to_vec());
            Ok(())
        })
    }

    fn mkdir_recursive<'a>(&'a self, _path: &'a Path) -> BoxFuture<'a, Result<()>> {
        // Directories are implicit in this backend: they exist iff a file
        // key is nested under them. Nothing to materialize.
        Box::pin(async move { Ok(()) })
    }

    fn unlink<'a>(&'a self, path: &'a Path) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            let key = key_of(path);
            self.files.lock().unwrap().remove(&key);
            self.mtimes.lock().unwrap().remove(&key);
            Ok(())
        })
    }

    fn copy_recursive<'a>(&'a self, from: &'a Path, to: &'a Path) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            let from_key = key_of(from);
            let to_key = key_of(to);
            let prefix = format!("{from_key}/");
            let mut updates = Vec::new();
            {
                let files = self.files.lock().unwrap();
                if let Some(contents) = files.get(&from_key) {
                    updates.push((to_key.clone(), contents.clone()));
                }
                for (key, contents) in files.iter() {
                    if let Some(rest) = key.strip_prefix(&prefix) {
                        updates.push((format!("{to_key}/{rest}"), contents.clone()));
                    }
                }
            }
            if updates.is_empty() {
                return Err(anyhow!("source path does not exist: {}", from_key));
            }
            let mut files = self.files.lock().unwrap();
            for (key, contents) in updates {
                files.insert(key, contents);
            }
            Ok(())
        })
    }

    fn set_mtime<'a>(&'a self, path: &'a Path, time: SystemTime) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            self.mtimes.lock().unwrap().insert(key_of(path), time);
            Ok(())
        })
    }
}

impl MemoryFileSystem {
    pub fn mtime_of(&self, path: impl AsRef<Path>) -> Option<SystemTime> {
        self.mtimes.lock().unwrap().get(&key_of(path.as_ref())).copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn read_dir_lists_stable_sorted_order() {
        let memfs = MemoryFileSystem::new()
            .with_file("src/pages/page.tsx", b"a".to_vec())
            .with_file("src/pages/users/page.tsx", b"b".to_vec())
            .with_file("src/pages/about/page.tsx", b"c".to_vec());
        let entries = memfs.read_dir(Path::new("src/pages")).await.unwrap();
        let names: Vec<_> = entries.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, vec!["about", "page.tsx", "users"]);
        assert!(entries.iter().find(|e| e.name == "about").unwrap().is_dir);
        assert!(!entries.iter().find(|e| e.name == "page.tsx").unwrap().is_dir);
    }

    #[tokio::test]
    async fn missing_root_reads_empty() {
        let memfs = MemoryFileSystem::new();
        let entries = memfs.read_dir(Path::new("src/pages")).await.unwrap();
        assert!(entries.is_empty());
    }

    #[tokio::test]
    async fn copy_recursive_is_byte_exact() {
        let memfs = MemoryFileSystem::new()
            .with_file("a/one.txt", b"1".to_vec())
            .with_file("a/b/two.txt", b"2".to_vec());
        memfs
            .copy_recursive(Path::new("a"), Path::new("z"))
            .await
            .unwrap();
        assert_eq!(memfs.read_bytes(Path::new("z/one.txt")).await.unwrap(), b"1");
        assert_eq!(memfs.read_bytes(Path::new("z/b/two.txt")).await.unwrap(), b"2");
    }
}
