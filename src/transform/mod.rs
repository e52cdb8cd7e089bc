//! The module transformation/caching layer (spec §4.C): import rewriting,
//! fast-refresh injection, `'use server'` shim generation, and a
//! content-hash-addressed disk cache tying them together.

pub mod cache;
pub mod fast_refresh;
pub mod import_rewrite;
pub mod parser;
pub mod server_action;

pub use cache::TransformCache;
pub use import_rewrite::AliasMap;
pub use parser::ModuleParser;

use anyhow::Result;
use sha1::{Digest, Sha1};
use std::sync::Arc;

/// Transform one source module for the dev server (spec §4.C, §4.E
/// "Source resolution"): either a server-action shim replaces the
/// transform entirely, or the import rewriter and fast-refresh wrapper
/// run over the original source.
pub struct Transformer {
    parser: Arc<dyn ModuleParser>,
    aliases: AliasMap,
}

impl Transformer {
    pub fn new(parser: Arc<dyn ModuleParser>, aliases: AliasMap) -> Self {
        Self { parser, aliases }
    }

    /// Transform `source`, a module project-relatively at `module_path`
    /// (used both to resolve relative imports and to key the fast-refresh
    /// wrapper and RPC endpoint).
    pub fn transform(&self, source: &str, module_path: &str) -> Result<String> {
        if server_action::is_server_action_file(source) {
            let shim = server_action::generate_shim(self.parser.as_ref(), source, module_path)?;
            return Ok(shim.shim_source);
        }

        let from_dir = module_path.rsplit_once('/').map(|(dir, _)| dir).unwrap_or("");
        let rewritten = import_rewrite::rewrite_source(source, from_dir, &self.aliases);
        Ok(fast_refresh::wrap(&rewritten, module_path))
    }
}

/// SHA-1 over `bytes`, as used for both the transform cache's
/// content-hash and the production build hash (spec §4.C, §4.H).
pub fn content_hash(bytes: &[u8]) -> String {
    let mut hasher = Sha1::new();
    hasher.update(bytes);
    hasher.finalize().iter().map(|b| format!("{b:02x}")).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transform::parser::SwcModuleParser;

    #[test]
    fn server_action_source_is_replaced_entirely() {
        let transformer = Transformer::new(Arc::new(SwcModuleParser), AliasMap::new());
        let source = "'use server'\nexport async function save(x){}";
        let output = transformer.transform(source, "src/actions/user").unwrap();
        assert!(output.contains("/api/__rpc/src/actions/user/"));
        assert!(!output.contains("'use server'"));
    }

    #[test]
    fn ordinary_module_gets_rewritten_imports_and_refresh_wrapper() {
        let transformer = Transformer::new(Arc::new(SwcModuleParser), AliasMap::new());
        let source = "import { Button } from \"./button\";\nexport default function Page() {}";
        let output = transformer.transform(source, "src/pages/users/page").unwrap();
        assert!(output.contains("/@src/src/pages/users/button"));
        assert!(output.contains("__peaque_register(\"src/pages/users/page\")"));
    }

    #[test]
    fn content_hash_is_stable_for_identical_bytes() {
        assert_eq!(content_hash(b"same"), content_hash(b"same"));
        assert_ne!(content_hash(b"a"), content_hash(b"b"));
    }
}
