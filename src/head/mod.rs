//! Head merger and HTML emitter (spec §4.G): merges a stack of per-route
//! head descriptors into one HTML `<head>` fragment, with one
//! pre-rendered document per distinct head-stack key.

use serde::Deserialize;
use std::collections::BTreeMap;

#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct MetaTag {
    pub name: Option<String>,
    pub property: Option<String>,
    pub http_equiv: Option<String>,
    pub content: String,
}

impl MetaTag {
    /// The first of `name`/`property`/`httpEquiv` that both sides define
    /// is this item's identity for merge purposes (spec §4.G "meta").
    fn identity(&self) -> Option<(&'static str, &str)> {
        self.name
            .as_deref()
            .map(|v| ("name", v))
            .or_else(|| self.property.as_deref().map(|v| ("property", v)))
            .or_else(|| self.http_equiv.as_deref().map(|v| ("httpEquiv", v)))
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct LinkTag {
    pub rel: String,
    pub href: String,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ScriptTag {
    pub src: Option<String>,
    pub inline: Option<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct StyleTag {
    pub kind: Option<String>,
    #[serde(rename = "innerHTML")]
    pub inner_html: String,
}

/// A head descriptor (spec §3): optional title plus ordered sequences of
/// meta/link/script/style/extra items. Matches, field for field, the
/// plain object a project's `head.ts` default export evaluates to.
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct HeadDescriptor {
    pub title: Option<String>,
    pub meta: Vec<MetaTag>,
    pub link: Vec<LinkTag>,
    pub script: Vec<ScriptTag>,
    pub style: Vec<StyleTag>,
    pub extra: Vec<String>,
}

/// Merge `child` on top of `parent` (spec §4.G). `merge(∅, x) == x` and
/// `merge(x, ∅) == x` hold because an empty side contributes no overrides
/// and no identity collisions.
pub fn merge(parent: &HeadDescriptor, child: &HeadDescriptor) -> HeadDescriptor {
    HeadDescriptor {
        title: child.title.clone().or_else(|| parent.title.clone()),
        meta: merge_meta(&parent.meta, &child.meta),
        link: merge_by_identity(&parent.link, &child.link, |l| (l.rel.clone(), l.href.clone())),
        script: merge_scripts(&parent.script, &child.script),
        style: merge_by_identity(&parent.style, &child.style, |s| {
            (s.kind.clone().unwrap_or_default(), s.inner_html.clone())
        }),
        extra: parent.extra.iter().chain(&child.extra).cloned().collect(),
    }
}

fn merge_meta(parent: &[MetaTag], child: &[MetaTag]) -> Vec<MetaTag> {
    let mut out: Vec<MetaTag> = parent.to_vec();
    for item in child {
        match item.identity() {
            Some(identity) => {
                let existing = out.iter().position(|p| p.identity() == Some(identity));
                match existing {
                    Some(idx) => out[idx] = item.clone(),
                    None => out.push(item.clone()),
                }
            }
            None => out.push(item.clone()),
        }
    }
    out
}

fn merge_scripts(parent: &[ScriptTag], child: &[ScriptTag]) -> Vec<ScriptTag> {
    let mut out: Vec<ScriptTag> = parent.to_vec();
    for item in child {
        match &item.src {
            Some(src) => {
                let existing = out.iter().position(|p| p.src.as_deref() == Some(src));
                match existing {
                    Some(idx) => out[idx] = item.clone(),
                    None => out.push(item.clone()),
                }
            }
            None => out.push(item.clone()),
        }
    }
    out
}

fn merge_by_identity<T, I>(parent: &[T], child: &[T], identity: I) -> Vec<T>
where
    T: Clone,
    I: Fn(&T) -> (String, String),
{
    let mut out: Vec<T> = parent.to_vec();
    for item in child {
        let key = identity(item);
        let existing = out.iter().position(|p| identity(p) == key);
        match existing {
            Some(idx) => out[idx] = item.clone(),
            None => out.push(item.clone()),
        }
    }
    out
}

/// Merge an ordered stack of descriptors root-to-leaf on top of a
/// default, as the production builder does per reachable route.
pub fn merge_stack(default: &HeadDescriptor, stack: &[HeadDescriptor]) -> HeadDescriptor {
    stack.iter().fold(default.clone(), |acc, next| merge(&acc, next))
}

/// A stable key identifying a head stack, so routes sharing the same
/// sequence of head files emit one HTML document instead of duplicates.
pub fn stack_key(stack_file_paths: &[String]) -> String {
    stack_file_paths.join("\u{0}")
}

/// Render a merged descriptor into an HTML `<head>`-body fragment.
/// `asset_prefix` (with or without a leading slash; e.g. `assets-<hash>`)
/// is prepended to `href`/`src` attribute values that begin with `/` and
/// don't already start with `//` or the prefix itself.
pub fn render_html(descriptor: &HeadDescriptor, asset_prefix: &str) -> String {
    let mut out = String::new();
    if let Some(title) = &descriptor.title {
        out.push_str(&format!("<title>{}</title>\n", escape(title)));
    }
    for meta in &descriptor.meta {
        out.push_str("<meta");
        if let Some(name) = &meta.name {
            out.push_str(&format!(" name=\"{}\"", escape(name)));
        }
        if let Some(property) = &meta.property {
            out.push_str(&format!(" property=\"{}\"", escape(property)));
        }
        if let Some(http_equiv) = &meta.http_equiv {
            out.push_str(&format!(" http-equiv=\"{}\"", escape(http_equiv)));
        }
        out.push_str(&format!(" content=\"{}\">\n", escape(&meta.content)));
    }
    for link in &descriptor.link {
        out.push_str(&format!(
            "<link rel=\"{}\" href=\"{}\">\n",
            escape(&link.rel),
            escape(&prefix_asset_url(&link.href, asset_prefix))
        ));
    }
    for script in &descriptor.script {
        match &script.src {
            Some(src) => out.push_str(&format!(
                "<script src=\"{}\"></script>\n",
                escape(&prefix_asset_url(src, asset_prefix))
            )),
            None => out.push_str(&format!(
                "<script>{}</script>\n",
                script.inline.clone().unwrap_or_default()
            )),
        }
    }
    for style in &descriptor.style {
        match &style.kind {
            Some(kind) => out.push_str(&format!(
                "<style type=\"{}\">{}</style>\n",
                escape(kind),
                style.inner_html
            )),
            None => out.push_str(&format!("<style>{}</style>\n", style.inner_html)),
        }
    }
    for extra in &descriptor.extra {
        out.push_str(extra);
        out.push('\n');
    }
    out
}

fn prefix_asset_url(value: &str, asset_prefix: &str) -> String {
    let prefix = asset_prefix.trim_start_matches('/');
    let prefixed = format!("/{prefix}");
    if value.starts_with('/') && !value.starts_with("//") && !value.starts_with(&format!("{prefixed}/")) {
        format!("{prefixed}{value}")
    } else {
        value.to_string()
    }
}

fn escape(value: &str) -> String {
    htmlescape::encode_minimal(value)
}

/// Per-route head stacks collected by the production builder, mapping a
/// stable stack key to the already-rendered HTML.
pub type RenderedHeads = BTreeMap<String, String>;

#[cfg(test)]
mod tests {
    use super::*;

    fn meta(name: &str, content: &str) -> MetaTag {
        MetaTag {
            name: Some(name.to_string()),
            property: None,
            http_equiv: None,
            content: content.to_string(),
        }
    }

    #[test]
    fn merge_empty_is_identity_both_sides() {
        let x = HeadDescriptor {
            title: Some("T".into()),
            meta: vec![meta("description", "d")],
            ..Default::default()
        };
        assert_eq!(merge(&HeadDescriptor::default(), &x), x);
        assert_eq!(merge(&x, &HeadDescriptor::default()), x);
    }

    #[test]
    fn meta_with_shared_identity_replaces_in_place() {
        let parent = HeadDescriptor {
            meta: vec![meta("description", "parent"), meta("author", "root")],
            ..Default::default()
        };
        let child = HeadDescriptor {
            meta: vec![meta("description", "child")],
            ..Default::default()
        };
        let merged = merge(&parent, &child);
        assert_eq!(merged.meta[0].content, "child");
        assert_eq!(merged.meta[1].content, "root");
    }

    #[test]
    fn title_child_wins_when_present() {
        let parent = HeadDescriptor {
            title: Some("Parent".into()),
            ..Default::default()
        };
        let child = HeadDescriptor {
            title: Some("Child".into()),
            ..Default::default()
        };
        assert_eq!(merge(&parent, &child).title.as_deref(), Some("Child"));
        let no_title_child = HeadDescriptor::default();
        assert_eq!(
            merge(&parent, &no_title_child).title.as_deref(),
            Some("Parent")
        );
    }

    #[test]
    fn link_identity_is_rel_and_href() {
        let parent = HeadDescriptor {
            link: vec![LinkTag {
                rel: "icon".into(),
                href: "/old.ico".into(),
            }],
            ..Default::default()
        };
        let child = HeadDescriptor {
            link: vec![LinkTag {
                rel: "icon".into(),
                href: "/new.ico".into(),
            }],
            ..Default::default()
        };
        let merged = merge(&parent, &child);
        assert_eq!(merged.link.len(), 1);
        assert_eq!(merged.link[0].href, "/new.ico");
    }

    #[test]
    fn render_prefixes_absolute_asset_paths() {
        let descriptor = HeadDescriptor {
            link: vec![LinkTag {
                rel: "stylesheet".into(),
                href: "/main.css".into(),
            }],
            ..Default::default()
        };
        let html = render_html(&descriptor, "/assets-abc12345");
        assert!(html.contains("href=\"/assets-abc12345/main.css\""));
    }

    #[test]
    fn render_prefixes_with_bare_prefix_missing_leading_slash() {
        // The production builder passes the bare `assets-<hash>` value
        // (spec §3's `asset_prefix`, no leading slash) through untouched.
        let descriptor = HeadDescriptor {
            link: vec![LinkTag {
                rel: "stylesheet".into(),
                href: "/main.css".into(),
            }],
            ..Default::default()
        };
        let html = render_html(&descriptor, "assets-abc12345");
        assert!(html.contains("href=\"/assets-abc12345/main.css\""));
    }

    #[test]
    fn render_does_not_double_prefix() {
        let descriptor = HeadDescriptor {
            link: vec![LinkTag {
                rel: "stylesheet".into(),
                href: "/assets-abc12345/main.css".into(),
            }],
            ..Default::default()
        };
        let html = render_html(&descriptor, "/assets-abc12345");
        assert_eq!(html.matches("assets-abc12345").count(), 1);
    }

    #[test]
    fn stack_key_distinguishes_different_stacks() {
        let a = stack_key(&["src/head.ts".into()]);
        let b = stack_key(&["src/head.ts".into(), "src/dashboard/head.ts".into()]);
        assert_ne!(a, b);
        assert_eq!(a, stack_key(&["src/head.ts".into()]));
    }
}
