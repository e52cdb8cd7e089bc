//! URL family dispatch and `/@src/` source resolution (spec §4.E: the
//! URL table and the source-candidate resolution algorithm).

use crate::common::{join_contained, SOURCE_CANDIDATE_SUFFIXES};
use crate::fs::FileSystem;
use std::path::{Path, PathBuf};

/// Which of the dev server's URL families a request path belongs to; the
/// first matching family wins (spec §4.E table).
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum UrlFamily {
    Deps { name: String },
    Src { path: String },
    Rpc { module: String, function: String },
    Api { path: String },
    RuntimeAsset { name: String },
    Hmr,
    Fallback,
}

const RUNTIME_ASSETS: &[&str] = &["/peaque-dev.js", "/peaque-loader.js", "/peaque.js", "/peaque.css"];

pub fn classify(path: &str) -> UrlFamily {
    if let Some(name) = path.strip_prefix("/@deps/") {
        return UrlFamily::Deps { name: name.to_string() };
    }
    if let Some(rest) = path.strip_prefix("/@src/") {
        return UrlFamily::Src { path: rest.to_string() };
    }
    if let Some(rest) = path.strip_prefix("/api/__rpc/") {
        if let Some((module, function)) = rest.rsplit_once('/') {
            return UrlFamily::Rpc {
                module: module.to_string(),
                function: function.to_string(),
            };
        }
    }
    if let Some(rest) = path.strip_prefix("/api/") {
        return UrlFamily::Api {
            path: format!("/api/{rest}"),
        };
    }
    if RUNTIME_ASSETS.contains(&path) {
        return UrlFamily::RuntimeAsset {
            name: path.trim_start_matches('/').to_string(),
        };
    }
    if path == "/hmr" {
        return UrlFamily::Hmr;
    }
    UrlFamily::Fallback
}

/// Resolve a `/@src/<p>` request to a concrete project-root-relative
/// file, trying the candidate suffixes in order (spec §4.E "Source
/// resolution"). Returns `None` for escape attempts (caller maps this to
/// 403) versus a found-but-missing candidate (caller maps to 404) —
/// distinguished by [`SourceResolution`].
pub enum SourceResolution {
    Escaped,
    NotFound,
    Found(PathBuf),
}

pub async fn resolve_source_candidate(
    fs: &dyn FileSystem,
    project_root: &Path,
    requested: &str,
) -> SourceResolution {
    for suffix in SOURCE_CANDIDATE_SUFFIXES {
        let candidate_rel = format!("{requested}{suffix}");
        let Some(candidate_path) = join_contained(project_root, &candidate_rel) else {
            continue;
        };
        if !candidate_path.starts_with(project_root) {
            return SourceResolution::Escaped;
        }
        if let Ok(meta) = fs.stat(&candidate_path).await {
            if meta.is_file {
                return SourceResolution::Found(candidate_path);
            }
        }
    }
    if requested.contains("..") {
        return SourceResolution::Escaped;
    }
    SourceResolution::NotFound
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fs::MemoryFileSystem;

    #[test]
    fn classifies_each_url_family_in_table_order() {
        assert_eq!(
            classify("/@deps/react"),
            UrlFamily::Deps { name: "react".into() }
        );
        assert_eq!(
            classify("/@src/pages/page.tsx"),
            UrlFamily::Src { path: "pages/page.tsx".into() }
        );
        assert_eq!(
            classify("/api/__rpc/src/actions/user/updateUser"),
            UrlFamily::Rpc {
                module: "src/actions/user".into(),
                function: "updateUser".into()
            }
        );
        assert_eq!(
            classify("/api/users"),
            UrlFamily::Api { path: "/api/users".into() }
        );
        assert_eq!(
            classify("/peaque.js"),
            UrlFamily::RuntimeAsset { name: "peaque.js".into() }
        );
        assert_eq!(classify("/hmr"), UrlFamily::Hmr);
        assert_eq!(classify("/favicon.ico"), UrlFamily::Fallback);
    }

    #[tokio::test]
    async fn resolves_first_matching_suffix() {
        let memfs = MemoryFileSystem::new().with_file("pages/users/page.tsx", b"x");
        let resolution = resolve_source_candidate(&memfs, Path::new(""), "pages/users/page").await;
        assert!(matches!(resolution, SourceResolution::Found(_)));
    }

    #[tokio::test]
    async fn resolves_index_fallback_for_directory_specifier() {
        let memfs = MemoryFileSystem::new().with_file("pages/users/index.tsx", b"x");
        let resolution = resolve_source_candidate(&memfs, Path::new(""), "pages/users").await;
        match resolution {
            SourceResolution::Found(path) => {
                assert_eq!(path, Path::new("pages/users/index.tsx"));
            }
            _ => panic!("expected a match"),
        }
    }

    #[tokio::test]
    async fn escape_attempt_is_rejected() {
        let memfs = MemoryFileSystem::new();
        let resolution = resolve_source_candidate(&memfs, Path::new("root"), "../../etc/passwd").await;
        assert!(matches!(resolution, SourceResolution::Escaped));
    }

    #[tokio::test]
    async fn missing_candidate_is_not_found() {
        let memfs = MemoryFileSystem::new();
        let resolution = resolve_source_candidate(&memfs, Path::new(""), "pages/missing").await;
        assert!(matches!(resolution, SourceResolution::NotFound));
    }
}
