//! The production build orchestrator (spec §4.H): runs the ten-step
//! pipeline that turns a project's `src/` tree into a `dist/` directory —
//! a hashed, pre-compressed asset bundle plus a standalone backend entry
//! a `peaque start` (or any Node host) can run directly.

mod asset_rewrite;
mod backend_entry;
mod compress;
mod frontend_entry;
mod hash;
mod jobs;
mod routes;

pub use asset_rewrite::rewrite_asset_references;
pub use backend_entry::{
    generate_backend_entry, BackendApiRoute, BackendEntryInput, BackendPageRoute, JobEntry, ServerActionModule,
};
pub use compress::precompress_tree;
pub use frontend_entry::generate_frontend_entry;
pub use hash::{asset_prefix, build_hash};
pub use jobs::{discover_jobs, JobFile};
pub use routes::{collect_api_routes, collect_page_routes, ApiRouteEntry, PageRouteEntry};

use crate::bundler::Bundler;
use crate::config::RtcBuild;
use crate::fs::{walk_files, FileSystem};
use crate::head::{self, HeadDescriptor, RenderedHeads};
use crate::router::{api_config, build_route_tree, page_config, FileRef};
use crate::runtime::{Invocation, ScriptRuntime};
use crate::transform::parser::{ModuleParser, SwcModuleParser};
use crate::transform::server_action;
use anyhow::{Context, Result};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// HTTP-method export names an API handler module may carry (spec §4.H
/// "Imports every API handler module statically, mapping each
/// HTTP-method export to a router registration").
const HTTP_METHODS: &[&str] = &["GET", "POST", "PUT", "DELETE", "PATCH", "OPTIONS", "HEAD"];

/// Everything a successful `peaque build` run produced.
#[derive(Clone, Debug)]
pub struct BuildArtifact {
    pub output_dir: PathBuf,
    pub asset_dir: PathBuf,
    pub asset_prefix: String,
    pub build_hash: String,
    pub backend_entry_path: PathBuf,
    pub main_cjs_path: PathBuf,
}

/// Run the full production build pipeline (spec §4.H steps 1-10).
pub async fn run_build(
    rtc: &RtcBuild,
    fs: Arc<dyn FileSystem>,
    bundler: Arc<dyn Bundler>,
    runtime: Arc<dyn ScriptRuntime>,
) -> Result<BuildArtifact> {
    let parser = SwcModuleParser;
    fs.mkdir_recursive(&rtc.output).await.context("creating the output directory")?;

    // Step 1: page route tree, frontend entry.
    let page_tree = build_route_tree(fs.as_ref(), &rtc.base.join("src/pages"), &page_config())
        .await
        .context("building the page route tree")?;
    let page_routes_abs = collect_page_routes(&page_tree);
    let page_routes = relativize_pages(&page_routes_abs, &rtc.base);
    let entry_source = generate_frontend_entry(&page_routes);

    let build_hash_value = build_hash(entry_source.as_bytes());
    let prefix = asset_prefix(&build_hash_value);
    let asset_dir = rtc.output.join(&prefix);
    fs.mkdir_recursive(&asset_dir).await.context("creating the asset directory")?;

    // Step 2: hand the entry to the bundler.
    let bundle = bundler
        .bundle(&entry_source, &rtc.base, &asset_dir, rtc.minify)
        .await
        .context("bundling the frontend entry")?;
    if rtc.analyze {
        if let Some(metafile) = &bundle.metafile {
            tracing::info!(bytes = metafile.len(), "bundler analyze output captured");
        }
    }

    let public_dir = rtc.base.join("src/public");
    let public_paths = collect_public_paths(fs.as_ref(), &public_dir).await?;

    // Step 3: rewrite asset references in the bundled JS.
    if rtc.asset_rewrite {
        let js_text = String::from_utf8(bundle.js).context("bundled JS is not valid UTF-8")?;
        let rewritten_js = rewrite_asset_references(&js_text, &public_paths, &prefix);
        fs.write(&asset_dir.join("app.js"), rewritten_js.as_bytes())
            .await
            .context("writing the bundled app.js")?;
    } else {
        fs.write(&asset_dir.join("app.js"), &bundle.js)
            .await
            .context("writing the bundled app.js")?;
    }

    // Step 4: bundle and rewrite the project's CSS, if it has any.
    let css_source_path = rtc.base.join("src/global.css");
    if fs.exists(&css_source_path).await {
        let css = fs
            .read_text(&css_source_path)
            .await
            .context("reading src/global.css")?;
        let rewritten_css = if rtc.asset_rewrite {
            rewrite_asset_references(&css, &public_paths, &prefix)
        } else {
            css
        };
        fs.write(&asset_dir.join("app.css"), rewritten_css.as_bytes())
            .await
            .context("writing the bundled app.css")?;
    }

    // Step 5: copy the public folder into the asset directory.
    if fs.exists(&public_dir).await {
        fs.copy_recursive(&public_dir, &asset_dir)
            .await
            .context("copying the public folder into the asset directory")?;
    }

    // Step 6: pre-compress the asset directory.
    precompress_tree(fs.as_ref(), &asset_dir)
        .await
        .context("pre-compressing the asset directory")?;

    // Step 7: API route tree.
    let api_tree = build_route_tree(fs.as_ref(), &rtc.base.join("src/api"), &api_config())
        .await
        .context("building the API route tree")?;
    let api_routes_abs = collect_api_routes(&api_tree);

    // Step 8: head stacks.
    let rendered_heads = render_head_stacks(runtime.as_ref(), &page_routes, &prefix).await?;
    let backend_page_routes: Vec<BackendPageRoute> = page_routes
        .iter()
        .map(|route| BackendPageRoute {
            pattern: route.pattern.clone(),
            stack_key: head_stack_key(route),
        })
        .collect();

    let server_dir = rtc.output.join("server");
    let backend_entry_path = server_dir.join("index.js");
    let main_cjs_path = rtc.output.join("main.cjs");

    // Steps 9-10 are skipped for `--serverless-frontend`: the build
    // ships only the hashed asset directory, with no standalone backend
    // a `peaque start` could run (spec §6 "Emit a frontend bundle with
    // no generated backend entry").
    if !rtc.serverless_frontend {
        let server_actions = load_server_actions(fs.as_ref(), &parser, &bundle.server_shim_modules, &rtc.base).await?;
        let backend_api_routes = load_backend_api_routes(fs.as_ref(), &parser, &api_routes_abs, &rtc.base).await?;

        let jobs_abs = discover_jobs(fs.as_ref(), &rtc.base.join("src/jobs"))
            .await
            .context("discovering jobs")?;
        let jobs: Vec<JobEntry> = jobs_abs
            .iter()
            .map(|job| JobEntry {
                display_name: job.display_name.clone(),
                file: rel_file_ref(&job.file, &rtc.base),
            })
            .collect();

        let has_startup = fs.exists(&rtc.base.join("src/startup.ts")).await;
        let has_middleware = fs.exists(&rtc.base.join("src/middleware.ts")).await;

        // Step 9: generate the standalone backend entry.
        let backend_entry_input = BackendEntryInput {
            api_routes: &backend_api_routes,
            page_routes: &backend_page_routes,
            server_actions: &server_actions,
            jobs: &jobs,
            heads: &rendered_heads,
            asset_prefix: &prefix,
            has_startup,
            has_middleware,
        };
        let backend_entry_source = generate_backend_entry(&backend_entry_input);

        fs.mkdir_recursive(&server_dir)
            .await
            .context("creating the server output directory")?;
        fs.write(&backend_entry_path, backend_entry_source.as_bytes())
            .await
            .context("writing the generated backend entry")?;

        // Step 10: bundle the backend entry, plus a thin main.cjs loader.
        let backend_bundle = bundler
            .bundle(&backend_entry_source, &rtc.base, &server_dir, rtc.minify)
            .await
            .context("bundling the backend entry")?;
        fs.write(&server_dir.join("server.cjs"), &backend_bundle.js)
            .await
            .context("writing the bundled backend server.cjs")?;

        fs.write(
            &main_cjs_path,
            b"require(\"dotenv\").config();\nrequire(\"./server/server.cjs\");\n",
        )
        .await
        .context("writing main.cjs")?;
    } else {
        tracing::info!("--serverless-frontend: skipping the generated backend entry");
    }

    Ok(BuildArtifact {
        output_dir: rtc.output.clone(),
        asset_dir,
        asset_prefix: prefix,
        build_hash: build_hash_value,
        backend_entry_path,
        main_cjs_path,
    })
}

fn rel_file_ref(file_ref: &FileRef, base: &Path) -> FileRef {
    FileRef {
        path: file_ref
            .path
            .strip_prefix(base)
            .map(Path::to_path_buf)
            .unwrap_or_else(|_| file_ref.path.clone()),
    }
}

fn relativize_pages(routes: &[PageRouteEntry], base: &Path) -> Vec<PageRouteEntry> {
    routes
        .iter()
        .map(|route| PageRouteEntry {
            pattern: route.pattern.clone(),
            page: rel_file_ref(&route.page, base),
            layouts: route.layouts.iter().map(|f| rel_file_ref(f, base)).collect(),
            guards: route.guards.iter().map(|f| rel_file_ref(f, base)).collect(),
            heads: route.heads.iter().map(|f| rel_file_ref(f, base)).collect(),
        })
        .collect()
}

async fn collect_public_paths(fs: &dyn FileSystem, public_dir: &Path) -> Result<BTreeSet<String>> {
    let mut set = BTreeSet::new();
    for rel in walk_files(fs, public_dir).await? {
        set.insert(format!("/{}", rel.to_string_lossy().replace('\\', "/")));
    }
    Ok(set)
}

fn head_stack_key(route: &PageRouteEntry) -> String {
    let paths: Vec<String> = route
        .heads
        .iter()
        .map(|f| f.path.to_string_lossy().replace('\\', "/"))
        .collect();
    head::stack_key(&paths)
}

/// Load and merge every route's head stack, rendering one HTML fragment
/// per distinct stack key (spec §4.G, §4.H step 8).
async fn render_head_stacks(
    runtime: &dyn ScriptRuntime,
    page_routes: &[PageRouteEntry],
    asset_prefix: &str,
) -> Result<RenderedHeads> {
    let mut rendered = RenderedHeads::new();
    for route in page_routes {
        let key = head_stack_key(route);
        if rendered.contains_key(&key) {
            continue;
        }
        let mut merged = HeadDescriptor::default();
        for head_file in &route.heads {
            let descriptor = load_head_descriptor(runtime, &head_file.path).await?;
            merged = head::merge(&merged, &descriptor);
        }
        rendered.insert(key, head::render_html(&merged, asset_prefix));
    }
    Ok(rendered)
}

/// Invoke a `head.ts` module's default export and decode its plain
/// object into a [`HeadDescriptor`] (spec §4.G: a head descriptor is
/// loaded, not computed, so this is the one place the builder calls into
/// the script runtime for data rather than side effects).
async fn load_head_descriptor(runtime: &dyn ScriptRuntime, path: &Path) -> Result<HeadDescriptor> {
    let module_path = crate::common::strip_js_extension(&path.to_string_lossy().replace('\\', "/")).to_string();
    let wire = runtime
        .invoke(Invocation {
            module_path,
            export_name: "default".to_string(),
            args: Vec::new(),
        })
        .await
        .with_context(|| format!("loading head descriptor from {}", path.display()))?;
    let value = crate::wire::encode(&wire);
    serde_json::from_value(value).with_context(|| format!("{} did not evaluate to a head descriptor", path.display()))
}

/// Generate a shim-shaped summary (module path plus exported function
/// names) for every `'use server'` module the bundler encountered (spec
/// §4.H step 2, §4.C).
async fn load_server_actions(
    fs: &dyn FileSystem,
    parser: &dyn ModuleParser,
    shim_modules: &[String],
    base: &Path,
) -> Result<Vec<ServerActionModule>> {
    let mut out = Vec::new();
    for rel in shim_modules {
        let module_path = crate::common::strip_js_extension(rel).to_string();
        let source = fs
            .read_text(&base.join(rel))
            .await
            .with_context(|| format!("reading server action module {rel}"))?;
        let shim = server_action::generate_shim(parser, &source, &module_path)
            .with_context(|| format!("generating the server-action shim for {module_path}"))?;
        out.push(ServerActionModule {
            module_path,
            functions: shim.exported_functions.into_iter().map(|f| f.name).collect(),
        });
    }
    Ok(out)
}

/// For each reachable API route, read its handler source and keep only
/// the HTTP-method exports it actually carries (spec §4.H: "mapping each
/// HTTP-method export to a router registration").
async fn load_backend_api_routes(
    fs: &dyn FileSystem,
    parser: &dyn ModuleParser,
    api_routes: &[ApiRouteEntry],
    base: &Path,
) -> Result<Vec<BackendApiRoute>> {
    let mut out = Vec::new();
    for route in api_routes {
        let source = fs
            .read_text(&route.handler.path)
            .await
            .with_context(|| format!("reading API handler {}", route.handler.path.display()))?;
        let module_path = route.handler.path.to_string_lossy().replace('\\', "/");
        let parsed = parser.parse(&source, &module_path)?;
        let methods: Vec<String> = parsed
            .exports
            .iter()
            .filter(|e| HTTP_METHODS.contains(&e.name.as_str()))
            .map(|e| e.name.clone())
            .collect();
        out.push(BackendApiRoute {
            pattern: route.pattern.clone(),
            handler: rel_file_ref(&route.handler, base),
            methods,
            middleware: route.middleware.iter().map(|f| rel_file_ref(f, base)).collect(),
        });
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bundler::{BundleOutput, Bundler};
    use crate::fs::MemoryFileSystem;
    use crate::runtime::tests::StubRuntime;
    use crate::wire::Wire;
    use std::time::Duration;

    /// A bundler stub that echoes the entry source back as its "bundle",
    /// so the orchestrator's asset-rewrite and precompression steps have
    /// deterministic input to work against without an esbuild binary.
    struct EchoBundler;

    impl Bundler for EchoBundler {
        fn bundle<'a>(
            &'a self,
            entry_source: &'a str,
            _project_root: &'a Path,
            _out_dir: &'a Path,
            _minify: bool,
        ) -> crate::fs::BoxFuture<'a, Result<BundleOutput>> {
            Box::pin(async move {
                Ok(BundleOutput {
                    js: entry_source.as_bytes().to_vec(),
                    metafile: None,
                    server_shim_modules: Vec::new(),
                })
            })
        }
    }

    fn rtc(base: PathBuf) -> RtcBuild {
        RtcBuild {
            output: base.join("dist"),
            base,
            minify: false,
            analyze: false,
            asset_rewrite: true,
            serverless_frontend: false,
            react_compiler: true,
        }
    }

    #[tokio::test]
    async fn full_pipeline_produces_artifact_and_files() {
        let base = PathBuf::from("/project");
        let memfs = MemoryFileSystem::new()
            .with_file(base.join("src/pages/page.tsx"), b"home".to_vec())
            .with_file(base.join("src/api/users/route.ts"), b"export async function GET(){}".to_vec());
        let fs: Arc<dyn FileSystem> = Arc::new(memfs);
        let bundler: Arc<dyn Bundler> = Arc::new(EchoBundler);
        let runtime: Arc<dyn ScriptRuntime> = Arc::new(StubRuntime { response: Wire::Null });

        let artifact = run_build(&rtc(base.clone()), fs.clone(), bundler, runtime).await.unwrap();
        assert_eq!(artifact.asset_prefix, asset_prefix(&artifact.build_hash));
        assert!(fs.exists(&artifact.asset_dir.join("app.js")).await);
        assert!(fs.exists(&artifact.backend_entry_path).await);
        assert!(fs.exists(&artifact.main_cjs_path).await);

        let backend_source = fs.read_text(&artifact.backend_entry_path).await.unwrap();
        assert!(backend_source.contains("app.get(\"/users\", (req) => handler_0.GET(req));"));
        assert!(backend_source.contains("app.get(\"/\", (req) => req.html(HEADS["));
    }

    #[tokio::test]
    async fn two_builds_of_identical_sources_share_a_build_hash() {
        let base = PathBuf::from("/project");
        let memfs = MemoryFileSystem::new().with_file(base.join("src/pages/page.tsx"), b"home".to_vec());
        let fs: Arc<dyn FileSystem> = Arc::new(memfs);
        let bundler: Arc<dyn Bundler> = Arc::new(EchoBundler);
        let runtime: Arc<dyn ScriptRuntime> = Arc::new(StubRuntime { response: Wire::Null });

        let first = run_build(&rtc(base.clone()), fs.clone(), bundler.clone(), runtime.clone()).await.unwrap();
        tokio::time::sleep(Duration::from_millis(1)).await;
        let second = run_build(&rtc(base.clone()), fs.clone(), bundler, runtime).await.unwrap();
        assert_eq!(first.build_hash, second.build_hash);
    }

    #[tokio::test]
    async fn public_asset_reference_is_rewritten_with_the_asset_prefix() {
        // EchoBundler echoes the frontend entry, not CSS, so the asset
        // rewrite is exercised through the global.css pass-through instead.
        let base = PathBuf::from("/project");
        let memfs = MemoryFileSystem::new()
            .with_file(base.join("src/pages/page.tsx"), b"home".to_vec())
            .with_file(base.join("src/global.css"), b"body { background: url(/logo.png); }".to_vec())
            .with_file(base.join("src/public/logo.png"), b"PNGDATA".to_vec());
        let fs: Arc<dyn FileSystem> = Arc::new(memfs);
        let bundler: Arc<dyn Bundler> = Arc::new(EchoBundler);
        let runtime: Arc<dyn ScriptRuntime> = Arc::new(StubRuntime { response: Wire::Null });

        let artifact = run_build(&rtc(base.clone()), fs.clone(), bundler, runtime).await.unwrap();
        let css = fs.read_text(&artifact.asset_dir.join("app.css")).await.unwrap();
        assert!(css.contains(&format!("url(/{}/logo.png)", artifact.asset_prefix)));
    }
}
