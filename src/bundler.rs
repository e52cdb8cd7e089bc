//! The bundler collaborator (spec §6 "Bundler"): takes an entry module, a
//! project root and an output directory, and returns the bundled JS plus
//! the list of `'use server'` modules it passed through.

use anyhow::{bail, Context, Result};
use std::path::{Path, PathBuf};
use tokio::process::Command;

/// The bundler's report for one bundling pass (spec §4.H step 2).
#[derive(Clone, Debug)]
pub struct BundleOutput {
    pub js: Vec<u8>,
    /// A bundler-reported input-byte metafile, surfaced by `--analyze`;
    /// opaque to the core (spec §9 open questions).
    pub metafile: Option<String>,
    pub server_shim_modules: Vec<String>,
}

pub trait Bundler: Send + Sync {
    fn bundle<'a>(
        &'a self,
        entry_source: &'a str,
        project_root: &'a Path,
        out_dir: &'a Path,
        minify: bool,
    ) -> crate::fs::BoxFuture<'a, Result<BundleOutput>>;
}

/// Adapter over the `esbuild` CLI binary (spec's out-of-scope "JavaScript
/// bundler backend"). Writes the entry to a temp file under `out_dir` and
/// invokes esbuild as a subprocess, since no JS bundler is a Rust crate.
pub struct EsbuildBundler {
    pub binary: PathBuf,
}

impl Default for EsbuildBundler {
    fn default() -> Self {
        Self {
            binary: PathBuf::from("esbuild"),
        }
    }
}

impl Bundler for EsbuildBundler {
    fn bundle<'a>(
        &'a self,
        entry_source: &'a str,
        project_root: &'a Path,
        out_dir: &'a Path,
        minify: bool,
    ) -> crate::fs::BoxFuture<'a, Result<BundleOutput>> {
        Box::pin(async move {
            tokio::fs::create_dir_all(out_dir).await.ok();
            let entry_path = out_dir.join("__peaque_entry.jsx");
            tokio::fs::write(&entry_path, entry_source)
                .await
                .context("writing generated frontend entry")?;

            let mut command = Command::new(&self.binary);
            command
                .arg(&entry_path)
                .arg("--bundle")
                .arg("--format=esm")
                .arg(format!("--outfile={}", out_dir.join("bundle.js").display()))
                .arg(format!("--metafile={}", out_dir.join("meta.json").display()))
                .current_dir(project_root);
            if minify {
                command.arg("--minify");
            }

            let output = command
                .output()
                .await
                .with_context(|| format!("invoking bundler at {}", self.binary.display()))?;
            if !output.status.success() {
                bail!(
                    "bundler exited with {}: {}",
                    output.status,
                    String::from_utf8_lossy(&output.stderr)
                );
            }

            let js = tokio::fs::read(out_dir.join("bundle.js"))
                .await
                .context("reading bundler output")?;
            let metafile = tokio::fs::read_to_string(out_dir.join("meta.json")).await.ok();
            let server_shim_modules = detect_server_shim_modules(project_root).await;

            Ok(BundleOutput {
                js,
                metafile,
                server_shim_modules,
            })
        })
    }
}

/// Scan the project's `src/` tree for files beginning with `'use
/// server'`, the set the generated backend entry needs to register RPC
/// routes for (spec §4.H step 2, §4.F). A full implementation defers to
/// the bundler's own dependency graph; absent that, this conservative
/// directory scan finds every module the build could possibly ship.
async fn detect_server_shim_modules(project_root: &Path) -> Vec<String> {
    let mut out = Vec::new();
    let mut stack = vec![project_root.join("src")];
    while let Some(dir) = stack.pop() {
        let Ok(mut entries) = tokio::fs::read_dir(&dir).await else {
            continue;
        };
        while let Ok(Some(entry)) = entries.next_entry().await {
            let path = entry.path();
            if entry.file_type().await.map(|t| t.is_dir()).unwrap_or(false) {
                stack.push(path);
                continue;
            }
            let Some(ext) = path.extension().and_then(|e| e.to_str()) else {
                continue;
            };
            if !matches!(ext, "ts" | "tsx" | "js" | "jsx") {
                continue;
            }
            if let Ok(text) = tokio::fs::read_to_string(&path).await {
                if crate::transform::server_action::is_server_action_file(&text) {
                    if let Ok(rel) = path.strip_prefix(project_root) {
                        out.push(rel.to_string_lossy().replace('\\', "/"));
                    }
                }
            }
        }
    }
    out.sort();
    out
}
