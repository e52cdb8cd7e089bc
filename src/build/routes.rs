//! Reachable-route enumeration for the production builder (spec §4.H
//! steps 1, 7-8): walks a built route tree the same way
//! [`crate::router::matcher::collect_patterns`] does, but keeps each
//! node's own file bindings alongside the pattern instead of discarding
//! them, since the builder needs the page/handler file and its stacks,
//! not just the pattern string.

use crate::router::{FileRef, RouteNode};

/// One reachable page route: its URL pattern plus the page file and the
/// ancestor-first stacks that apply to it.
#[derive(Clone, Debug)]
pub struct PageRouteEntry {
    pub pattern: String,
    pub page: FileRef,
    pub layouts: Vec<FileRef>,
    pub guards: Vec<FileRef>,
    pub heads: Vec<FileRef>,
}

/// One reachable API route: its URL pattern plus the handler file and
/// the middleware stack that applies to it.
#[derive(Clone, Debug)]
pub struct ApiRouteEntry {
    pub pattern: String,
    pub handler: FileRef,
    pub middleware: Vec<FileRef>,
}

pub fn collect_page_routes(root: &RouteNode) -> Vec<PageRouteEntry> {
    let mut out = Vec::new();
    let mut segments = Vec::new();
    walk_pages(root, &mut segments, &mut out);
    out
}

fn walk_pages(node: &RouteNode, segments: &mut Vec<String>, out: &mut Vec<PageRouteEntry>) {
    if let Some(page) = node.names.get("page") {
        out.push(PageRouteEntry {
            pattern: format!("/{}", segments.join("/")),
            page: page.clone(),
            layouts: node.stacks.get("layout").cloned().unwrap_or_default(),
            guards: node.stacks.get("guard").cloned().unwrap_or_default(),
            heads: node.stacks.get("heads").cloned().unwrap_or_default(),
        });
    }
    descend(node, segments, out, walk_pages);
}

pub fn collect_api_routes(root: &RouteNode) -> Vec<ApiRouteEntry> {
    let mut out = Vec::new();
    let mut segments = Vec::new();
    walk_api(root, &mut segments, &mut out);
    out
}

fn walk_api(node: &RouteNode, segments: &mut Vec<String>, out: &mut Vec<ApiRouteEntry>) {
    if let Some(handler) = node.names.get("handler") {
        out.push(ApiRouteEntry {
            pattern: format!("/{}", segments.join("/")),
            handler: handler.clone(),
            middleware: node.stacks.get("middleware").cloned().unwrap_or_default(),
        });
    }
    descend(node, segments, out, walk_api);
}

/// Shared child-recursion: static children (skipping excluded group
/// segments from the pattern), then the single param child, then the
/// single wildcard child — mirroring the tie-break order used for
/// matching (spec §4.B step 5).
fn descend<T>(
    node: &RouteNode,
    segments: &mut Vec<String>,
    out: &mut Vec<T>,
    mut visit: impl FnMut(&RouteNode, &mut Vec<String>, &mut Vec<T>) + Copy,
) {
    for (name, child) in &node.static_children {
        if !child.exclude_from_path {
            segments.push(name.clone());
        }
        visit(child, segments, out);
        if !child.exclude_from_path {
            segments.pop();
        }
    }
    if let Some(param_child) = &node.param_child {
        segments.push(format!(":{}", param_child.name));
        visit(&param_child.node, segments, out);
        segments.pop();
    }
    if let Some(wildcard_child) = &node.wildcard_child {
        segments.push(format!("*{}", wildcard_child.name));
        visit(&wildcard_child.node, segments, out);
        segments.pop();
    }
}
