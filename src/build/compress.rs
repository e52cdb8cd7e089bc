//! Pre-compression of the asset directory (spec §4.H step 6): every file
//! gets a `.gz` and `.br` sibling whose mtime matches the source's, so a
//! re-run that finds matching mtimes already in place can skip the work.

use crate::fs::{walk_files, FileSystem};
use anyhow::{Context, Result};
use async_compression::tokio::bufread::{BrotliEncoder, GzipEncoder};
use std::path::Path;
use tokio::io::AsyncReadExt;

/// Compress every file under `dir` with gzip and brotli, writing `<f>.gz`
/// and `<f>.br` siblings. Skips a file whose siblings already carry the
/// same mtime as the source, making repeated passes idempotent.
pub async fn precompress_tree(fs: &dyn FileSystem, dir: &Path) -> Result<()> {
    for rel in walk_files(fs, dir).await? {
        let name = rel.to_string_lossy();
        if name.ends_with(".gz") || name.ends_with(".br") {
            continue;
        }
        let source_path = dir.join(&rel);
        let source_meta = fs.stat(&source_path).await?;

        let gz_path = append_suffix(&source_path, ".gz");
        let br_path = append_suffix(&source_path, ".br");
        if siblings_up_to_date(fs, &gz_path, &br_path, source_meta.modified).await {
            continue;
        }

        let bytes = fs.read_bytes(&source_path).await?;
        let gz_bytes = gzip(&bytes).await.context("gzip-compressing asset")?;
        let br_bytes = brotli(&bytes).await.context("brotli-compressing asset")?;

        fs.write(&gz_path, &gz_bytes).await?;
        fs.write(&br_path, &br_bytes).await?;
        fs.set_mtime(&gz_path, source_meta.modified).await?;
        fs.set_mtime(&br_path, source_meta.modified).await?;
    }
    Ok(())
}

async fn siblings_up_to_date(
    fs: &dyn FileSystem,
    gz_path: &Path,
    br_path: &Path,
    source_modified: std::time::SystemTime,
) -> bool {
    let gz_matches = fs
        .stat(gz_path)
        .await
        .map(|m| m.modified == source_modified)
        .unwrap_or(false);
    let br_matches = fs
        .stat(br_path)
        .await
        .map(|m| m.modified == source_modified)
        .unwrap_or(false);
    gz_matches && br_matches
}

fn append_suffix(path: &Path, suffix: &str) -> std::path::PathBuf {
    let mut name = path.as_os_str().to_os_string();
    name.push(suffix);
    std::path::PathBuf::from(name)
}

async fn gzip(bytes: &[u8]) -> Result<Vec<u8>> {
    let mut encoder = GzipEncoder::new(bytes);
    let mut out = Vec::new();
    encoder.read_to_end(&mut out).await?;
    Ok(out)
}

async fn brotli(bytes: &[u8]) -> Result<Vec<u8>> {
    let mut encoder = BrotliEncoder::new(bytes);
    let mut out = Vec::new();
    encoder.read_to_end(&mut out).await?;
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fs::MemoryFileSystem;
    use std::time::{Duration, UNIX_EPOCH};

    #[tokio::test]
    async fn compresses_every_file_and_matches_source_mtime() {
        let memfs = MemoryFileSystem::new().with_file("assets-abc/app.js", b"console.log(1);".to_vec());
        let now = UNIX_EPOCH + Duration::from_secs(1_700_000_000);
        memfs.set_mtime(Path::new("assets-abc/app.js"), now).await.unwrap();

        precompress_tree(&memfs, Path::new("assets-abc")).await.unwrap();

        assert!(memfs.read_bytes(Path::new("assets-abc/app.js.gz")).await.is_ok());
        assert!(memfs.read_bytes(Path::new("assets-abc/app.js.br")).await.is_ok());
        assert_eq!(memfs.mtime_of("assets-abc/app.js.gz"), Some(now));
        assert_eq!(memfs.mtime_of("assets-abc/app.js.br"), Some(now));
    }

    #[tokio::test]
    async fn second_pass_with_matching_mtime_is_a_no_op() {
        let memfs = MemoryFileSystem::new().with_file("assets-abc/app.js", b"console.log(1);".to_vec());
        let now = UNIX_EPOCH + Duration::from_secs(1_700_000_000);
        memfs.set_mtime(Path::new("assets-abc/app.js"), now).await.unwrap();

        precompress_tree(&memfs, Path::new("assets-abc")).await.unwrap();
        let first_gz = memfs.read_bytes(Path::new("assets-abc/app.js.gz")).await.unwrap();

        precompress_tree(&memfs, Path::new("assets-abc")).await.unwrap();
        let second_gz = memfs.read_bytes(Path::new("assets-abc/app.js.gz")).await.unwrap();
        assert_eq!(first_gz, second_gz);
    }
}
