//! Route matching: walk the tree following a request path's
//! segments, preferring static over parameter over wildcard children at
//! each level, and backtracking when a deeper match fails. The returned
//! pattern renders parameter segments as `:name` and a wildcard as
//! `*name`, group segments omitted.

use super::tree::{FileRef, RouteNode};
use std::collections::BTreeMap;

/// A successful match: `{pattern, params, names, stacks}`.
/// `names` and `stacks` are copied verbatim from the matched node (already
/// parent-flattened by the tree builder).
pub struct RouteMatch<'a> {
    pub node: &'a RouteNode,
    pub params: BTreeMap<String, String>,
    pub pattern: String,
    pub names: &'a BTreeMap<String, FileRef>,
    pub stacks: &'a BTreeMap<String, Vec<FileRef>>,
}

/// Match `path` (a slash-separated request path, leading slash optional)
/// against `root`. Returns `None` if no accepting node is reachable.
pub fn match_route<'a>(root: &'a RouteNode, path: &str) -> Option<RouteMatch<'a>> {
    let segments: Vec<&str> = path
        .trim_start_matches('/')
        .split('/')
        .filter(|s| !s.is_empty())
        .collect();
    let mut params = BTreeMap::new();
    let mut pattern_segments = Vec::new();
    let node = walk(root, &segments, &mut params, &mut pattern_segments)?;
    Some(RouteMatch {
        node,
        params,
        pattern: format!("/{}", pattern_segments.join("/")),
        names: &node.names,
        stacks: &node.stacks,
    })
}

fn walk<'a>(
    node: &'a RouteNode,
    segments: &[&str],
    params: &mut BTreeMap<String, String>,
    pattern_segments: &mut Vec<String>,
) -> Option<&'a RouteNode> {
    let Some((head, rest)) = segments.split_first() else {
        return if node.accept { Some(node) } else { None };
    };

    if let Some(child) = node.static_children.get(*head) {
        let pushed = !child.exclude_from_path;
        if pushed {
            pattern_segments.push((*head).to_string());
        }
        if let Some(found) = walk(child, rest, params, pattern_segments) {
            return Some(found);
        }
        if pushed {
            pattern_segments.pop();
        }
    }

    if let Some(param_child) = &node.param_child {
        let mut trial_params = params.clone();
        trial_params.insert(param_child.name.clone(), (*head).to_string());
        pattern_segments.push(format!(":{}", param_child.name));
        let mut trial_segments = pattern_segments.clone();
        if let Some(found) = walk(&param_child.node, rest, &mut trial_params, &mut trial_segments)
        {
            *params = trial_params;
            *pattern_segments = trial_segments;
            return Some(found);
        }
        pattern_segments.pop();
    }

    if let Some(wildcard_child) = &node.wildcard_child {
        let remainder = segments.join("/");
        params.insert(wildcard_child.name.clone(), remainder);
        pattern_segments.push(format!("*{}", wildcard_child.name));
        if wildcard_child.node.accept {
            return Some(&wildcard_child.node);
        }
        pattern_segments.pop();
        params.remove(&wildcard_child.name);
    }

    None
}

/// Depth-first enumeration of every accepting pattern in the tree, used by
/// tests and by the production builder to print a route manifest.
pub fn collect_patterns(root: &RouteNode) -> Vec<String> {
    let mut out = Vec::new();
    let mut segments = Vec::new();
    collect(root, &mut segments, &mut out);
    out
}

fn collect(node: &RouteNode, segments: &mut Vec<String>, out: &mut Vec<String>) {
    if node.accept {
        out.push(format!("/{}", segments.join("/")));
    }
    for (name, child) in &node.static_children {
        if !child.exclude_from_path {
            segments.push(name.clone());
        }
        collect(child, segments, out);
        if !child.exclude_from_path {
            segments.pop();
        }
    }
    if let Some(param_child) = &node.param_child {
        segments.push(format!(":{}", param_child.name));
        collect(&param_child.node, segments, out);
        segments.pop();
    }
    if let Some(wildcard_child) = &node.wildcard_child {
        segments.push(format!("*{}", wildcard_child.name));
        collect(&wildcard_child.node, segments, out);
        segments.pop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fs::MemoryFileSystem;
    use crate::router::config::page_config;
    use crate::router::tree::build_route_tree;
    use std::path::Path;

    async fn tree(memfs: &MemoryFileSystem) -> RouteNode {
        build_route_tree(memfs, Path::new("src/pages"), &page_config())
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn static_beats_param_at_same_level() {
        let memfs = MemoryFileSystem::new()
            .with_file("src/pages/users/page.tsx", b"static")
            .with_file("src/pages/[id]/page.tsx", b"param");
        let root = tree(&memfs).await;
        let m = match_route(&root, "/users").unwrap();
        assert_eq!(m.pattern, "/users");
        assert!(m.params.is_empty());
    }

    #[tokio::test]
    async fn param_captured_when_no_static_match() {
        let memfs = MemoryFileSystem::new().with_file("src/pages/[id]/page.tsx", b"param");
        let root = tree(&memfs).await;
        let m = match_route(&root, "/42").unwrap();
        assert_eq!(m.params["id"], "42");
        assert_eq!(m.pattern, "/:id");
    }

    /// Scenario 1 — page route matching.
    #[tokio::test]
    async fn scenario_1_page_route_matching() {
        let memfs = MemoryFileSystem::new()
            .with_file("src/pages/page.tsx", b"root")
            .with_file("src/pages/users/page.tsx", b"users")
            .with_file("src/pages/users/[id]/page.tsx", b"user");
        let root = tree(&memfs).await;
        let m = match_route(&root, "/users/42").unwrap();
        assert_eq!(m.pattern, "/users/:id");
        assert_eq!(m.params["id"], "42");
    }

    #[tokio::test]
    async fn wildcard_captures_remaining_segments() {
        let memfs =
            MemoryFileSystem::new().with_file("src/pages/docs/[...slug]/page.tsx", b"catch");
        let root = tree(&memfs).await;
        let m = match_route(&root, "/docs/a/b/c").unwrap();
        assert_eq!(m.params["slug"], "a/b/c");
    }

    #[tokio::test]
    async fn group_segments_excluded_from_matched_path() {
        let memfs =
            MemoryFileSystem::new().with_file("src/pages/(marketing)/about/page.tsx", b"about");
        let root = tree(&memfs).await;
        let m = match_route(&root, "/about").unwrap();
        assert_eq!(m.pattern, "/about");
    }

    /// Scenario 2 — group does not affect URL.
    #[tokio::test]
    async fn scenario_2_group_does_not_affect_url() {
        let memfs = MemoryFileSystem::new().with_file("src/pages/(auth)/login/page.tsx", b"login");
        let root = tree(&memfs).await;
        assert_eq!(match_route(&root, "/login").unwrap().pattern, "/login");
        assert!(match_route(&root, "/auth/login").is_none());
    }

    #[tokio::test]
    async fn no_match_returns_none() {
        let memfs = MemoryFileSystem::new().with_file("src/pages/users/page.tsx", b"static");
        let root = tree(&memfs).await;
        assert!(match_route(&root, "/missing").is_none());
    }
}
