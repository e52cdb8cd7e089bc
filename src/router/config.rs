//! Route file configuration: the declarative `{pattern, role, stacks?,
//! accept?}` tuples that classify files encountered while walking a route
//! directory.

/// One recognized filename and how it binds into a route node.
#[derive(Clone, Copy, Debug)]
pub struct RoutePattern {
    /// The exact filename this pattern matches, e.g. `"page.tsx"`.
    pub filename: &'static str,
    /// The slot key this file is bound to in the node's `names`/`stacks`
    /// map, e.g. `"page"`, `"layout"`, `"handler"`.
    pub slot: &'static str,
    /// Whether a node carrying this slot becomes `accept`-eligible.
    pub accept: bool,
    /// Whether this slot accumulates an ordered sequence inherited from
    /// ancestors (`stacks`) or holds a single scalar file reference
    /// (`names`).
    pub stacks: bool,
}

/// A named collection of [`RoutePattern`]s, one per route-file convention
/// recognized under a given root (pages vs. API).
#[derive(Clone, Copy, Debug)]
pub struct RouteFileConfig {
    pub patterns: &'static [RoutePattern],
}

impl RouteFileConfig {
    pub fn match_filename(&self, filename: &str) -> Option<&'static RoutePattern> {
        self.patterns.iter().find(|p| p.filename == filename)
    }
}

/// `page.tsx` → page + accept, `layout.tsx` → stack, `guard.ts` → stack,
/// `head.ts` → stack, `middleware.ts` → scalar.
pub fn page_config() -> RouteFileConfig {
    const PATTERNS: &[RoutePattern] = &[
        RoutePattern {
            filename: "page.tsx",
            slot: "page",
            accept: true,
            stacks: false,
        },
        RoutePattern {
            filename: "layout.tsx",
            slot: "layout",
            accept: false,
            stacks: true,
        },
        RoutePattern {
            filename: "guard.ts",
            slot: "guard",
            accept: false,
            stacks: true,
        },
        RoutePattern {
            filename: "head.ts",
            slot: "heads",
            accept: false,
            stacks: true,
        },
        RoutePattern {
            filename: "middleware.ts",
            slot: "middleware",
            accept: false,
            stacks: false,
        },
    ];
    RouteFileConfig { patterns: PATTERNS }
}

/// `route.ts` → handler + accept, `middleware.ts` → stack.
pub fn api_config() -> RouteFileConfig {
    const PATTERNS: &[RoutePattern] = &[
        RoutePattern {
            filename: "route.ts",
            slot: "handler",
            accept: true,
            stacks: false,
        },
        RoutePattern {
            filename: "middleware.ts",
            slot: "middleware",
            accept: false,
            stacks: true,
        },
    ];
    RouteFileConfig { patterns: PATTERNS }
}
