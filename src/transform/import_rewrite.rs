//! Import specifier rewriter (spec §4.C "Import rewriter", testable
//! property 3: applying the rewriter twice is idempotent).

use crate::common::{normalize_path_string, strip_js_extension};
use regex::Regex;
use std::collections::BTreeMap;
use std::sync::LazyLock;

static STATIC_IMPORT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?m)\bimport\s+([^;'"\n]*?\s+from\s+)?["']([^"']+)["']"#).unwrap()
});
static DYNAMIC_IMPORT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"\bimport\(\s*["']([^"']+)["']\s*\)"#).unwrap());

/// A `tsconfig`-style `paths` alias map: alias prefix → rewrite target
/// prefix, longest alias wins on overlap.
#[derive(Clone, Debug, Default)]
pub struct AliasMap {
    entries: BTreeMap<String, String>,
}

impl AliasMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, alias: impl Into<String>, target: impl Into<String>) -> Self {
        self.entries.insert(alias.into(), target.into());
        self
    }

    fn resolve(&self, specifier: &str) -> Option<String> {
        let mut best: Option<(&str, &str)> = None;
        for (alias, target) in &self.entries {
            if specifier == alias || specifier.starts_with(&format!("{alias}/")) {
                if best.is_none_or(|(a, _)| alias.len() > a.len()) {
                    best = Some((alias, target));
                }
            }
        }
        best.map(|(alias, target)| {
            let rest = specifier.strip_prefix(alias).unwrap_or("");
            format!("{target}{rest}")
        })
    }
}

/// Rewrite a single import specifier found in `from_dir` (the importing
/// file's project-relative directory), per spec §4.C's ordered rules.
pub fn rewrite_specifier(specifier: &str, from_dir: &str, aliases: &AliasMap) -> String {
    if specifier.starts_with("/@deps/") || specifier.starts_with("/@src/") {
        return specifier.to_string();
    }
    if specifier.starts_with("./") || specifier.starts_with("../") {
        let joined = if from_dir.is_empty() {
            specifier.to_string()
        } else {
            format!("{from_dir}/{specifier}")
        };
        let resolved = normalize_path_string(&joined);
        let stripped = strip_js_extension(&resolved);
        return format!("/@src/{stripped}");
    }
    if let Some(target) = aliases.resolve(specifier) {
        return format!("/@src/{}", normalize_path_string(&target));
    }
    if let Some(project_path) = specifier.strip_prefix('/') {
        return format!("/@src/{project_path}");
    }
    format!("/@deps/{specifier}")
}

/// Rewrite every static and dynamic import in `source`, as emitted by a
/// file living at `from_dir` (the file's project-relative directory).
pub fn rewrite_source(source: &str, from_dir: &str, aliases: &AliasMap) -> String {
    let pass = STATIC_IMPORT.replace_all(source, |caps: &regex::Captures| {
        let binding = caps.get(1).map(|m| m.as_str()).unwrap_or("");
        let specifier = &caps[2];
        let rewritten = rewrite_specifier(specifier, from_dir, aliases);
        format!("import {binding}\"{rewritten}\"")
    });
    DYNAMIC_IMPORT
        .replace_all(&pass, |caps: &regex::Captures| {
            let specifier = &caps[1];
            let rewritten = rewrite_specifier(specifier, from_dir, aliases);
            format!("import(\"{rewritten}\")")
        })
        .into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn passes_through_already_resolved_specifiers() {
        let aliases = AliasMap::new();
        assert_eq!(
            rewrite_specifier("/@src/pages/page", "pages", &aliases),
            "/@src/pages/page"
        );
        assert_eq!(
            rewrite_specifier("/@deps/react", "pages", &aliases),
            "/@deps/react"
        );
    }

    #[test]
    fn relative_path_resolves_against_from_dir_and_strips_extension() {
        let aliases = AliasMap::new();
        assert_eq!(
            rewrite_specifier("./button.tsx", "src/pages/users", &aliases),
            "/@src/src/pages/users/button"
        );
        assert_eq!(
            rewrite_specifier("../shared/button", "src/pages/users", &aliases),
            "/@src/src/pages/shared/button"
        );
    }

    #[test]
    fn aliased_path_rewrites_through_target() {
        let aliases = AliasMap::new().with("@ui", "src/ui");
        assert_eq!(
            rewrite_specifier("@ui/button", "src/pages", &aliases),
            "/@src/src/ui/button"
        );
    }

    #[test]
    fn absolute_project_path_gets_src_prefix() {
        let aliases = AliasMap::new();
        assert_eq!(
            rewrite_specifier("/src/lib/date", "src/pages", &aliases),
            "/@src/src/lib/date"
        );
    }

    #[test]
    fn bare_package_becomes_deps() {
        let aliases = AliasMap::new();
        assert_eq!(rewrite_specifier("react", "src/pages", &aliases), "/@deps/react");
        assert_eq!(
            rewrite_specifier("lodash/debounce", "src/pages", &aliases),
            "/@deps/lodash/debounce"
        );
    }

    #[test]
    fn rewriting_twice_is_idempotent() {
        let aliases = AliasMap::new();
        let source = r#"import React from "react";
import { Button } from "./button";
const mod = import("../lazy");
"#;
        let once = rewrite_source(source, "src/pages/users", &aliases);
        let twice = rewrite_source(&once, "src/pages/users", &aliases);
        assert_eq!(once, twice);
    }
}
