use super::{BoxFuture, DirEntry, FileSystem, Metadata};
use anyhow::{Context, Result};
use std::path::Path;
use std::time::SystemTime;

/// The host-filesystem backed implementation, used in dev/prod and backed
/// by `tokio::fs`.
#[derive(Clone, Copy, Debug, Default)]
pub struct RealFileSystem;

impl FileSystem for RealFileSystem {
    fn read_dir<'a>(&'a self, path: &'a Path) -> BoxFuture<'a, Result<Vec<DirEntry>>> {
        Box::pin(async move {
            let mut read = match tokio::fs::read_dir(path).await {
                Ok(read) => read,
                Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
                Err(err) => {
                    return Err(err).with_context(|| format!("reading directory {path:?}"))
                }
            };
            let mut out = Vec::new();
            while let Some(entry) = read.next_entry().await? {
                let file_type = entry.file_type().await?;
                out.push(DirEntry {
                    name: entry.file_name().to_string_lossy().into_owned(),
                    is_dir: file_type.is_dir(),
                });
            }
            out.sort_by(|a, b| a.name.cmp(&b.name));
            Ok(out)
        })
    }

    fn stat<'a>(&'a self, path: &'a Path) -> BoxFuture<'a, Result<Metadata>> {
        Box::pin(async move {
            let meta = tokio::fs::metadata(path)
                .await
                .with_context(|| format!("stat {path:?}"))?;
            Ok(Metadata {
                is_dir: meta.is_dir(),
                is_file: meta.is_file(),
                len: meta.len(),
                modified: meta.modified().unwrap_or(std::time::UNIX_EPOCH),
            })
        })
    }

    fn read_bytes<'a>(&'a self, path: &'a Path) -> BoxFuture<'a, Result<Vec<u8>>> {
        Box::pin(async move {
            tokio::fs::read(path)
                .await
                .with_context(|| format!("reading {path:?}"))
        })
    }

    fn write<'a>(&'a self, path: &'a Path, contents: &'a [u8]) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            if let Some(parent) = path.parent() {
                tokio::fs::create_dir_all(parent).await.ok();
            }
            tokio::fs::write(path, contents)
                .await
                .with_context(|| format!("writing {path:?}"))
        })
    }

    fn mkdir_recursive<'a>(&'a self, path: &'a Path) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            tokio::fs::create_dir_all(path)
                .await
                .with_context(|| format!("creating directory {path:?}"))
        })
    }

    fn unlink<'a>(&'a self, path: &'a Path) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            match tokio::fs::remove_file(path).await {
                Ok(()) => Ok(()),
                Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
                Err(err) => Err(err).with_context(|| format!("removing {path:?}")),
            }
        })
    }

    fn copy_recursive<'a>(&'a self, from: &'a Path, to: &'a Path) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move { copy_recursive(from, to).await })
    }

    fn set_mtime<'a>(&'a self, path: &'a Path, time: SystemTime) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            let path = path.to_path_buf();
            tokio::task::spawn_blocking(move || {
                let file = std::fs::File::options().write(true).open(&path)?;
                file.set_modified(time)
            })
            .await
            .context("joining blocking set_mtime task")?
            .with_context(|| "setting mtime")
        })
    }
}

async fn copy_recursive(from: &Path, to: &Path) -> Result<()> {
    let meta = tokio::fs::metadata(from)
        .await
        .with_context(|| format!("stat {from:?} for recursive copy"))?;
    if meta.is_dir() {
        tokio::fs::create_dir_all(to).await?;
        let mut read = tokio::fs::read_dir(from).await?;
        let mut children = Vec::new();
        while let Some(entry) = read.next_entry().await? {
            children.push(entry.file_name());
        }
        children.sort();
        for name in children {
            Box::pin(copy_recursive(&from.join(&name), &to.join(&name))).await?;
        }
    } else {
        if let Some(parent) = to.parent() {
            tokio::fs::create_dir_all(parent).await.ok();
        }
        tokio::fs::copy(from, to)
            .await
            .with_context(|| format!("copying {from:?} to {to:?}"))?;
    }
    Ok(())
}
