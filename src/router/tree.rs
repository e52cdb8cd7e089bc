//! Radix-style route tree construction.
//!
//! A directory is walked once, bottom-up via recursion, top-down via data
//! flow: each recursive call receives the already-merged stack map from its
//! parent, folds in whatever stack files live at its own level, and passes
//! the merged result to its children. One pass satisfies the "stacks
//! inherit in declaration order, ancestor first" invariant without a
//! separate propagation phase.

use super::config::RouteFileConfig;
use crate::fs::FileSystem;
use anyhow::Result;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// A single source file bound into the tree, with the path used to derive
/// its import specifier and component name.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FileRef {
    pub path: PathBuf,
}

#[derive(Clone, Debug)]
pub struct ParamChild {
    pub name: String,
    pub node: RouteNode,
}

#[derive(Clone, Debug)]
pub struct WildcardChild {
    pub name: String,
    pub node: RouteNode,
}

/// One node in the route tree. A node without `accept` set is a pure
/// path segment with no routable leaf of its own (e.g. a layout-only
/// directory).
#[derive(Clone, Debug, Default)]
pub struct RouteNode {
    pub static_children: BTreeMap<String, RouteNode>,
    pub param_child: Option<Box<ParamChild>>,
    pub wildcard_child: Option<Box<WildcardChild>>,
    /// True when this segment came from a `(group)` directory: the
    /// directory name is excluded from the matched URL path but its
    /// children still nest under this node.
    pub exclude_from_path: bool,
    /// Whether this node can terminate a route match (a `page.tsx` or
    /// `route.ts` was found at this level).
    pub accept: bool,
    /// Scalar per-node file bindings, keyed by slot (e.g. `"page"`,
    /// `"handler"`, `"middleware"`).
    pub names: BTreeMap<String, FileRef>,
    /// Ordered, ancestor-first sequences inherited down the tree, keyed
    /// by slot (e.g. `"layout"`, `"guard"`, `"heads"`).
    pub stacks: BTreeMap<String, Vec<FileRef>>,
}

impl RouteNode {
    fn new(exclude_from_path: bool) -> Self {
        Self {
            exclude_from_path,
            ..Default::default()
        }
    }
}

/// Directory-name syntax recognized while descending:
/// `[name]` → parameter segment, `[...name]` → wildcard segment,
/// `(name)` → excluded group, anything else → literal static segment.
enum Segment<'a> {
    Static(&'a str),
    Param(&'a str),
    Wildcard(&'a str),
    Group(&'a str),
}

fn classify(dirname: &str) -> Segment<'_> {
    if let Some(inner) = dirname.strip_prefix('[').and_then(|s| s.strip_suffix(']')) {
        if let Some(name) = inner.strip_prefix("...") {
            Segment::Wildcard(name)
        } else {
            Segment::Param(inner)
        }
    } else if let Some(inner) = dirname.strip_prefix('(').and_then(|s| s.strip_suffix(')')) {
        Segment::Group(inner)
    } else {
        Segment::Static(dirname)
    }
}

/// Build a route tree by walking `root` with `fs`, classifying each file
/// against `config`. Returns an empty, non-accepting root node if `root`
/// does not exist.
pub async fn build_route_tree(
    fs: &dyn FileSystem,
    root: &Path,
    config: &RouteFileConfig,
) -> Result<RouteNode> {
    build_node(fs, root, config, &BTreeMap::new(), false).await
}

async fn build_node(
    fs: &dyn FileSystem,
    dir: &Path,
    config: &RouteFileConfig,
    inherited_stacks: &BTreeMap<String, Vec<FileRef>>,
    exclude_from_path: bool,
) -> Result<RouteNode> {
    let mut node = RouteNode::new(exclude_from_path);
    let entries = fs.read_dir(dir).await?;

    let mut own_stacks: BTreeMap<String, FileRef> = BTreeMap::new();
    let mut subdirs = Vec::new();

    for entry in &entries {
        if entry.is_dir {
            subdirs.push(entry.name.clone());
            continue;
        }
        let Some(pattern) = config.match_filename(&entry.name) else {
            continue;
        };
        let file_ref = FileRef {
            path: dir.join(&entry.name),
        };
        if pattern.accept {
            node.accept = true;
        }
        if pattern.stacks {
            own_stacks.insert(pattern.slot.to_string(), file_ref);
        } else {
            node.names.insert(pattern.slot.to_string(), file_ref);
        }
    }

    let mut merged_stacks = inherited_stacks.clone();
    for (slot, file_ref) in own_stacks {
        merged_stacks.entry(slot).or_default().push(file_ref);
    }
    node.stacks = merged_stacks.clone();

    for dirname in subdirs {
        let child_dir = dir.join(&dirname);
        match classify(&dirname) {
            Segment::Static(name) => {
                let child =
                    Box::pin(build_node(fs, &child_dir, config, &merged_stacks, false)).await?;
                node.static_children.insert(name.to_string(), child);
            }
            Segment::Group(name) => {
                let child =
                    Box::pin(build_node(fs, &child_dir, config, &merged_stacks, true)).await?;
                node.static_children.insert(name.to_string(), child);
            }
            Segment::Param(name) => {
                let child =
                    Box::pin(build_node(fs, &child_dir, config, &merged_stacks, false)).await?;
                node.param_child = Some(Box::new(ParamChild {
                    name: name.to_string(),
                    node: child,
                }));
            }
            Segment::Wildcard(name) => {
                let child =
                    Box::pin(build_node(fs, &child_dir, config, &merged_stacks, false)).await?;
                node.wildcard_child = Some(Box::new(WildcardChild {
                    name: name.to_string(),
                    node: child,
                }));
            }
        }
    }

    Ok(node)
}
