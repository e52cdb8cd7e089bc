//! The generated standalone backend entry (spec §4.H "Generated backend
//! entry contract"): a self-contained module that, executed, re-creates
//! the whole request surface offline — API handlers, server-action RPC
//! endpoints, pre-rendered page routes, the asset directory, startup
//! side effects, outermost middleware, and cron-scheduled jobs.
//!
//! The Rust core never executes this file; it only assembles
//! deterministic source text through [`crate::codegen`] so that two
//! builds from the same route/job/action set are byte-identical
//! (testable property 7).

use crate::codegen::{CodeWriter, ImportCollector};
use crate::head::RenderedHeads;
use crate::router::FileRef;

/// One API route as the backend entry needs it: the HTTP-method exports
/// the handler module carries (spec: "mapping each HTTP-method export to
/// a router registration") and the ancestor-first middleware stack ahead
/// of it, which gets wired into the generated registration through the
/// runtime's `withMiddleware` helper (spec §4.D), not just the single
/// global `src/middleware.ts`.
pub struct BackendApiRoute {
    pub pattern: String,
    pub handler: FileRef,
    pub methods: Vec<String>,
    pub middleware: Vec<FileRef>,
}

/// One page route as the backend entry needs it: just the pattern and
/// the stack key into the pre-rendered `HEADS` table (spec §4.G).
pub struct BackendPageRoute {
    pub pattern: String,
    pub stack_key: String,
}

/// One `'use server'` module's exported functions, registered at
/// `/api/__rpc/<module_path>/<name>` — the same URL shape the shared
/// shim generator bakes into the client stub (spec §4.C), so dev and
/// production dispatch identically instead of needing two RPC URL
/// conventions (Open Question, see DESIGN.md).
pub struct ServerActionModule {
    pub module_path: String,
    pub functions: Vec<String>,
}

/// One `src/jobs/**/job.ts` module (spec §4.H "Jobs").
pub struct JobEntry {
    pub display_name: String,
    pub file: FileRef,
}

pub struct BackendEntryInput<'a> {
    pub api_routes: &'a [BackendApiRoute],
    pub page_routes: &'a [BackendPageRoute],
    pub server_actions: &'a [ServerActionModule],
    pub jobs: &'a [JobEntry],
    /// Pre-rendered head HTML keyed by stack key (spec §4.G), embedded
    /// verbatim into the generated entry's `HEADS` table.
    pub heads: &'a RenderedHeads,
    pub asset_prefix: &'a str,
    pub has_startup: bool,
    pub has_middleware: bool,
}

fn specifier_of(path: &std::path::Path) -> String {
    format!("./{}", crate::common::strip_js_extension(&path.to_string_lossy().replace('\\', "/")))
}

/// Generate the backend entry source (spec §4.H "Generated backend entry
/// contract"). Deterministic: identifiers are derived from the sorted
/// position of each input slice, not from a hash map iteration order.
pub fn generate_backend_entry(input: &BackendEntryInput) -> String {
    let mut imports = ImportCollector::new();
    imports.add_named("peaque/runtime", "createApp");
    imports.add_named("peaque/runtime", "Cron");
    imports.add_named("peaque/runtime", "decodeWire");
    imports.add_named("peaque/runtime", "encodeWire");
    imports.add_named("peaque/runtime", "serveCompressed");
    imports.add_named("peaque/runtime", "checkCrossOrigin");

    let handler_idents: Vec<String> = (0..input.api_routes.len()).map(|i| format!("handler_{i}")).collect();
    for (route, ident) in input.api_routes.iter().zip(&handler_idents) {
        imports.add_namespace(specifier_of(&route.handler.path), ident.clone());
    }

    // Per-route middleware stacks (spec §4.D), deduped by path so a
    // shared ancestor `middleware.ts` gets one import no matter how many
    // routes inherit it.
    let mut middleware_idents: Vec<(std::path::PathBuf, String)> = Vec::new();
    for route in input.api_routes {
        for file in &route.middleware {
            if !middleware_idents.iter().any(|(path, _)| path == &file.path) {
                let ident = format!("mw_{}", middleware_idents.len());
                imports.add_namespace(specifier_of(&file.path), ident.clone());
                middleware_idents.push((file.path.clone(), ident));
            }
        }
    }
    let middleware_ident_of = |path: &std::path::Path| -> String {
        middleware_idents
            .iter()
            .find(|(p, _)| p == path)
            .map(|(_, ident)| ident.clone())
            .expect("middleware import registered above")
    };
    let any_route_has_middleware = input.api_routes.iter().any(|r| !r.middleware.is_empty());
    if any_route_has_middleware {
        imports.add_named("peaque/runtime", "withMiddleware");
    }

    let shim_idents: Vec<String> = (0..input.server_actions.len()).map(|i| format!("actions_{i}")).collect();
    for (module, ident) in input.server_actions.iter().zip(&shim_idents) {
        imports.add_namespace(format!("./{}", module.module_path), ident.clone());
    }

    let job_idents: Vec<String> = (0..input.jobs.len()).map(|i| format!("job_{i}")).collect();
    for (job, ident) in input.jobs.iter().zip(&job_idents) {
        imports.add_default(specifier_of(&job.file.path), ident.clone());
    }

    if input.has_middleware {
        imports.add_default("./src/middleware", "globalMiddleware");
    }

    let mut writer = CodeWriter::new();
    if input.has_startup {
        writer.line("import \"./src/startup\";");
    }
    writer.line(imports.render().trim_end());
    writer.blank();
    writer.line("const app = createApp();");
    writer.blank();

    writer.block("const HEADS = {", "};", |w| {
        for (key, html) in input.heads {
            w.line(format!(
                "{}: {},",
                serde_json::to_string(key).unwrap(),
                serde_json::to_string(html).unwrap()
            ));
        }
    });
    writer.blank();

    for (route, ident) in input.api_routes.iter().zip(&handler_idents) {
        for method in &route.methods {
            if route.middleware.is_empty() {
                writer.line(format!(
                    "app.{}(\"{}\", (req) => {ident}.{method}(req));",
                    method.to_ascii_lowercase(),
                    route.pattern
                ));
            } else {
                let mw_list = route
                    .middleware
                    .iter()
                    .map(|f| format!("{}.default", middleware_ident_of(&f.path)))
                    .collect::<Vec<_>>()
                    .join(", ");
                writer.line(format!(
                    "app.{}(\"{}\", withMiddleware([{mw_list}], (req) => {ident}.{method}(req)));",
                    method.to_ascii_lowercase(),
                    route.pattern
                ));
            }
        }
    }
    writer.blank();

    for (module, ident) in input.server_actions.iter().zip(&shim_idents) {
        for function in &module.functions {
            writer.block(
                &format!(
                    "app.post(\"/api/__rpc/{}/{function}\", async (req) => {{",
                    module.module_path
                ),
                "});",
                |w| {
                    w.block("if (!checkCrossOrigin(req)) {", "}", |w| {
                        w.line("return req.status(403).json({ error: \"Forbidden: Cross-origin request rejected\" });");
                    });
                    w.line("const { args } = decodeWire(await req.json());");
                    w.block("try {", "}", |w| {
                        w.line(format!("const result = await {ident}.{function}(...args);"));
                        w.line("return req.status(200).json(encodeWire(result));");
                    });
                    w.block("catch (err) {", "}", |w| {
                        w.line("return req.status(500).send(String(err && err.message || err));");
                    });
                },
            );
        }
    }
    writer.blank();

    for route in input.page_routes {
        writer.line(format!(
            "app.get(\"{}\", (req) => req.html(HEADS[\"{}\"]));",
            route.pattern, route.stack_key
        ));
    }
    writer.blank();

    writer.line(format!(
        "app.get(\"/{}/*\", (req) => serveCompressed(\"{}\", req));",
        input.asset_prefix, input.asset_prefix
    ));
    writer.blank();

    if input.has_middleware {
        writer.line("app.use(globalMiddleware);");
        writer.blank();
    }

    for (job, ident) in input.jobs.iter().zip(&job_idents) {
        writer.block(&format!("for (const schedule of {ident}.schedule) {{"), "}", |w| {
            w.block(
                &format!("Cron(schedule, {{ protect: true }}, async () => {{"),
                "});",
                |w| {
                    w.block("try {", "}", |w| {
                        w.line(format!("await {ident}.runJob();"));
                    });
                    w.block("catch (err) {", "}", |w| {
                        w.line(format!(
                            "console.error(\"[{}]\", err);",
                            job.display_name
                        ));
                    });
                },
            );
        });
    }
    writer.blank();

    writer.line("const portFlagIndex = process.argv.findIndex((a) => a === \"--port\" || a === \"-p\");");
    writer.line("const port = portFlagIndex >= 0 ? Number(process.argv[portFlagIndex + 1]) : 3000;");
    writer.line("const server = app.listen(port, () => console.log(`Peaque listening on http://localhost:${port}`));");
    writer.blank();
    writer.line("process.on(\"SIGINT\", () => server.close(() => process.exit(0)));");
    writer.line("process.on(\"SIGTERM\", () => server.close(() => process.exit(0)));");

    writer.finish()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn sample() -> (Vec<BackendApiRoute>, Vec<BackendPageRoute>, Vec<ServerActionModule>, Vec<JobEntry>) {
        let api = vec![BackendApiRoute {
            pattern: "/users".into(),
            handler: FileRef { path: PathBuf::from("src/api/users/route.ts") },
            methods: vec!["GET".into(), "POST".into()],
            middleware: Vec::new(),
        }];
        let pages = vec![BackendPageRoute {
            pattern: "/users".into(),
            stack_key: "src/head.ts".into(),
        }];
        let actions = vec![ServerActionModule {
            module_path: "src/actions/user".into(),
            functions: vec!["updateUser".into()],
        }];
        let jobs = vec![JobEntry {
            display_name: "cleanup".into(),
            file: FileRef { path: PathBuf::from("src/jobs/cleanup/job.ts") },
        }];
        (api, pages, actions, jobs)
    }

    fn sample_heads() -> RenderedHeads {
        let mut heads = RenderedHeads::new();
        heads.insert("src/head.ts".into(), "<title>Users</title>\n".into());
        heads
    }

    #[test]
    fn registers_every_contract_surface() {
        let (api, pages, actions, jobs) = sample();
        let heads = sample_heads();
        let input = BackendEntryInput {
            api_routes: &api,
            page_routes: &pages,
            server_actions: &actions,
            jobs: &jobs,
            heads: &heads,
            asset_prefix: "assets-deadbeef",
            has_startup: true,
            has_middleware: true,
        };
        let source = generate_backend_entry(&input);
        assert!(source.contains("import \"./src/startup\";"));
        assert!(source.contains("app.get(\"/users\", (req) => handler_0.GET(req));"));
        assert!(source.contains("app.post(\"/users\", (req) => handler_0.POST(req));"));
        assert!(source.contains("app.post(\"/api/__rpc/src/actions/user/updateUser\""));
        assert!(source.contains("app.get(\"/users\", (req) => req.html(HEADS[\"src/head.ts\"]));"));
        assert!(source.contains("\"src/head.ts\": \"<title>Users</title>\\n\","));
        assert!(source.contains("app.get(\"/assets-deadbeef/*\""));
        assert!(source.contains("app.use(globalMiddleware);"));
        assert!(source.contains("Cron(schedule"));
        assert!(source.contains("console.error(\"[cleanup]\", err);"));
        assert!(source.contains("process.on(\"SIGINT\""));
        assert!(source.contains("process.on(\"SIGTERM\""));
    }

    #[test]
    fn per_route_middleware_wraps_the_handler_registration() {
        let api = vec![BackendApiRoute {
            pattern: "/users".into(),
            handler: FileRef { path: PathBuf::from("src/api/users/route.ts") },
            methods: vec!["GET".into()],
            middleware: vec![
                FileRef { path: PathBuf::from("src/api/middleware.ts") },
                FileRef { path: PathBuf::from("src/api/users/middleware.ts") },
            ],
        }];
        let heads = RenderedHeads::new();
        let input = BackendEntryInput {
            api_routes: &api,
            page_routes: &[],
            server_actions: &[],
            jobs: &[],
            heads: &heads,
            asset_prefix: "assets-deadbeef",
            has_startup: false,
            has_middleware: false,
        };
        let source = generate_backend_entry(&input);
        assert!(source.contains("import * as mw_0 from \"./src/api/middleware\";"));
        assert!(source.contains("import * as mw_1 from \"./src/api/users/middleware\";"));
        assert!(source.contains("withMiddleware"));
        assert!(source.lines().any(|l| l.starts_with("import {") && l.contains("withMiddleware") && l.contains("peaque/runtime")));
        assert!(source.contains(
            "app.get(\"/users\", withMiddleware([mw_0.default, mw_1.default], (req) => handler_0.GET(req)));"
        ));
    }

    #[test]
    fn identical_input_produces_byte_identical_output() {
        let (api, pages, actions, jobs) = sample();
        let heads = sample_heads();
        let input = BackendEntryInput {
            api_routes: &api,
            page_routes: &pages,
            server_actions: &actions,
            jobs: &jobs,
            heads: &heads,
            asset_prefix: "assets-deadbeef",
            has_startup: false,
            has_middleware: false,
        };
        assert_eq!(generate_backend_entry(&input), generate_backend_entry(&input));
    }

    #[test]
    fn no_startup_no_middleware_omits_both() {
        let heads = RenderedHeads::new();
        let input = BackendEntryInput {
            api_routes: &[],
            page_routes: &[],
            server_actions: &[],
            jobs: &[],
            heads: &heads,
            asset_prefix: "assets-deadbeef",
            has_startup: false,
            has_middleware: false,
        };
        let source = generate_backend_entry(&input);
        assert!(!source.contains("./src/startup"));
        assert!(!source.contains("globalMiddleware"));
    }
}
