//! Common functionality and types shared across the core.

use console::Emoji;
use std::path::{Component, Path, PathBuf};

pub static BUILDING: Emoji = Emoji("📦 ", "");
pub static SUCCESS: Emoji = Emoji("✅ ", "");
pub static ERROR: Emoji = Emoji("❌ ", "");
pub static SERVER: Emoji = Emoji("📡 ", "");
pub static LOCAL: Emoji = Emoji("🏠 ", "");
pub static NETWORK: Emoji = Emoji("💻 ", "");
pub static STARTING: Emoji = Emoji("🚀 ", "");
pub static WATCH: Emoji = Emoji("👀 ", "");

/// Normalize a URL path string the way route matching expects: backslashes
/// become forward slashes, `.` components are dropped, and the result never
/// carries a leading or trailing slash.
pub fn normalize_path_string(path: &str) -> String {
    let replaced = path.replace('\\', "/");
    let mut out = Vec::new();
    for part in replaced.split('/') {
        match part {
            "" | "." => continue,
            other => out.push(other),
        }
    }
    out.join("/")
}

/// Normalize a relative filesystem path to posix-style forward slashes,
/// collapsing `.` and `..` components, used as the canonical form for cache
/// keys and route file references.
pub fn normalize_rel_path(path: &Path) -> String {
    let mut parts: Vec<String> = Vec::new();
    for component in path.components() {
        match component {
            Component::Normal(seg) => parts.push(seg.to_string_lossy().replace('\\', "/")),
            Component::CurDir => {}
            Component::RootDir | Component::Prefix(_) => {}
            Component::ParentDir => {
                parts.pop();
            }
        }
    }
    parts.join("/")
}

/// Strip a recognized JS/TS extension off a path string, if present.
pub fn strip_js_extension(path: &str) -> &str {
    for ext in [".tsx", ".ts", ".jsx", ".js", ".mjs", ".cjs"] {
        if let Some(stripped) = path.strip_suffix(ext) {
            return stripped;
        }
    }
    path
}

/// Candidate suffixes tried, in order, when resolving a bare module
/// specifier or directory to a concrete source file.
pub const SOURCE_CANDIDATE_SUFFIXES: &[&str] = &[
    "",
    ".ts",
    ".tsx",
    ".js",
    ".jsx",
    "/index.ts",
    "/index.tsx",
    "/index.js",
    "/index.jsx",
];

/// The default slow-request threshold used when `PEAQUE_PERF_LOG` is set
/// to `true` without a more specific value.
pub const DEFAULT_PERF_LOG_THRESHOLD_MS: u64 = 1000;

/// Parse the `PEAQUE_PERF_LOG` env var into a slow-request threshold
/// (spec §4.K): unset or `false`/`0` disables per-request perf warnings
/// entirely; `true` enables them at [`DEFAULT_PERF_LOG_THRESHOLD_MS`]; any
/// other value is parsed as an explicit millisecond threshold, falling
/// back to disabled if it doesn't parse. Takes the raw value rather than
/// reading the env directly so the threshold logic is unit-testable.
pub fn parse_perf_log_threshold(raw: Option<&str>) -> Option<std::time::Duration> {
    match raw?.trim() {
        "" | "0" | "false" => None,
        "true" => Some(std::time::Duration::from_millis(DEFAULT_PERF_LOG_THRESHOLD_MS)),
        other => other.parse::<u64>().ok().map(std::time::Duration::from_millis),
    }
}

/// Join a project-relative path onto a root, guaranteeing the result stays
/// contained within `root`. Returns `None` if any `..` segment appears,
/// which is treated as an escape attempt regardless of where it occurs.
pub fn join_contained(root: &Path, rel: &str) -> Option<PathBuf> {
    let mut resolved = root.to_path_buf();
    for segment in rel.split('/') {
        match segment {
            "" | "." => continue,
            ".." => return None,
            other => resolved.push(other),
        }
    }
    Some(resolved)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalizes_backslashes_and_dots() {
        assert_eq!(normalize_path_string("./foo\\bar/"), "foo/bar");
        assert_eq!(normalize_path_string("//a//b//"), "a/b");
    }

    #[test]
    fn perf_log_threshold_disabled_when_unset_or_falsy() {
        assert_eq!(parse_perf_log_threshold(None), None);
        assert_eq!(parse_perf_log_threshold(Some("false")), None);
        assert_eq!(parse_perf_log_threshold(Some("0")), None);
    }

    #[test]
    fn perf_log_threshold_true_uses_default() {
        assert_eq!(
            parse_perf_log_threshold(Some("true")),
            Some(std::time::Duration::from_millis(DEFAULT_PERF_LOG_THRESHOLD_MS))
        );
    }

    #[test]
    fn perf_log_threshold_accepts_explicit_milliseconds() {
        assert_eq!(parse_perf_log_threshold(Some("250")), Some(std::time::Duration::from_millis(250)));
    }

    #[test]
    fn perf_log_threshold_falls_back_to_disabled_on_garbage() {
        assert_eq!(parse_perf_log_threshold(Some("not-a-number")), None);
    }

    #[test]
    fn join_contained_rejects_escape() {
        let root = Path::new("/project");
        assert_eq!(
            join_contained(root, "a/b"),
            Some(PathBuf::from("/project/a/b"))
        );
        assert_eq!(join_contained(root, "../etc/passwd"), None);
        assert_eq!(join_contained(root, "a/../../etc"), None);
    }
}
