//! Job discovery for the production builder (spec §4.H "Jobs"): finds
//! every `src/jobs/**/job.ts` file and computes its display name.

use crate::fs::{walk_files, FileSystem};
use crate::router::FileRef;
use anyhow::Result;
use std::path::Path;

/// One discovered job module: its file and the directory-relative
/// display name used in log lines (spec: "directory-relative path with
/// trailing `/job.ts` stripped").
#[derive(Clone, Debug)]
pub struct JobFile {
    pub display_name: String,
    pub file: FileRef,
}

/// Walk `jobs_root` (typically `src/jobs`) for files literally named
/// `job.ts`, returning them in sorted path order so the generated
/// backend entry's import order is deterministic.
pub async fn discover_jobs(fs: &dyn FileSystem, jobs_root: &Path) -> Result<Vec<JobFile>> {
    let mut out = Vec::new();
    for rel in walk_files(fs, jobs_root).await? {
        if rel.file_name().and_then(|n| n.to_str()) != Some("job.ts") {
            continue;
        }
        let display_name = rel
            .to_string_lossy()
            .replace('\\', "/")
            .trim_end_matches("/job.ts")
            .to_string();
        out.push(JobFile {
            display_name,
            file: FileRef {
                path: jobs_root.join(&rel),
            },
        });
    }
    out.sort_by(|a, b| a.display_name.cmp(&b.display_name));
    Ok(out)
}
