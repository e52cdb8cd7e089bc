//! Fast-refresh wrapper injection (spec §4.C "Fast-refresh wrapper").
//!
//! Wrapping is idempotent: the preamble/trailer pair is keyed on the
//! module's path, and a module that already carries the marker for that
//! path is returned unchanged.

fn marker(module_path: &str) -> String {
    format!("/* @peaque-refresh:{module_path} */")
}

/// Wrap `source` (a transformed module body) with a fast-refresh
/// registration preamble and hand-off trailer, keyed on `module_path`.
/// A second call with the same `module_path` on already-wrapped source
/// is a no-op.
pub fn wrap(source: &str, module_path: &str) -> String {
    let marker = marker(module_path);
    if source.contains(&marker) {
        return source.to_string();
    }
    format!(
        "{marker}\nimport {{ registerRefreshScope as __peaque_register }} from \"/peaque-dev.js\";\n__peaque_register(\"{module_path}\");\n{source}\nimport {{ performRefresh as __peaque_refresh }} from \"/peaque-dev.js\";\n__peaque_refresh(\"{module_path}\");\n"
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wrapping_twice_is_idempotent() {
        let source = "export default function Page() { return null; }";
        let once = wrap(source, "src/pages/users/page");
        let twice = wrap(&once, "src/pages/users/page");
        assert_eq!(once, twice);
    }

    #[test]
    fn wrapper_carries_module_path_through_both_hooks() {
        let wrapped = wrap("export default function Page() {}", "src/pages/page");
        assert!(wrapped.contains("__peaque_register(\"src/pages/page\")"));
        assert!(wrapped.contains("__peaque_refresh(\"src/pages/page\")"));
    }

    #[test]
    fn different_module_paths_do_not_collide() {
        let a = wrap("export default function A() {}", "src/pages/a/page");
        let b = wrap(&a, "src/pages/b/page");
        assert!(b.contains("src/pages/a/page"));
        assert!(b.contains("src/pages/b/page"));
    }
}
