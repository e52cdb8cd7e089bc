#![deny(clippy::expect_used)]
#![deny(clippy::unwrap_used)]

mod actions;
mod build;
mod bundler;
mod codegen;
mod common;
mod config;
mod context;
mod csrf;
mod dev;
mod error;
mod fs;
mod head;
mod router;
mod runtime;
mod transform;
mod wire;

use anyhow::{Context, Result};
use clap::{ArgAction, Parser, Subcommand};
use common::{ERROR, STARTING, SUCCESS};
use fs::{FileSystem, RealFileSystem};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use tracing_subscriber::prelude::*;

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Peaque::parse();

    tracing_subscriber::registry()
        .with(eval_logging(&cli))
        .with(tracing_subscriber::fmt::layer().with_target(false).compact())
        .try_init()
        .context("error initializing logging")?;

    tracing::info!("{}peaque {}", STARTING, env!("CARGO_PKG_VERSION"));

    Ok(match cli.run().await {
        Ok(code) => code,
        Err(err) => {
            tracing::error!("{}{err}", ERROR);
            for (n, cause) in err.chain().enumerate().skip(1) {
                tracing::info!("  {n}: {cause}");
            }
            ExitCode::FAILURE
        }
    })
}

/// Choose the filter directives for the global subscriber (spec §4.K),
/// the same way the teacher's `eval_logging` does it: an explicit
/// `--log`/`RUST_LOG` filter wins outright, otherwise `-v`/`-q` step the
/// default `peaque` target's verbosity up or down while other crates
/// stay at `error`. A plain function of its inputs so the verbosity
/// ladder is unit-testable without touching the process environment.
fn logging_directives(log: Option<&str>, rust_log: Option<&str>, verbose: u8, quiet: bool) -> String {
    if let Some(directives) = log {
        return directives.to_string();
    }
    if let Some(directives) = rust_log {
        return directives.to_string();
    }
    match (verbose, quiet) {
        (_, true) => "error,peaque=warn",
        (0, false) => "error,peaque=info",
        (1, false) => "error,peaque=debug",
        (_, false) => "error,peaque=trace",
    }
    .to_string()
}

fn eval_logging(cli: &Peaque) -> tracing_subscriber::EnvFilter {
    let rust_log = std::env::var("RUST_LOG").ok();
    let directives = logging_directives(cli.log.as_deref(), rust_log.as_deref(), cli.verbose, cli.quiet);
    tracing_subscriber::EnvFilter::new(directives)
}

/// Turn a project directory into a running dev server, or a
/// self-contained production bundle (spec §6 "CLI surface").
#[derive(Parser)]
#[command(name = "peaque", about, version)]
struct Peaque {
    #[command(subcommand)]
    action: PeaqueCommand,
    /// Enable verbose logging.
    #[arg(short, long, global(true), action = ArgAction::Count)]
    verbose: u8,
    /// Be more quiet, conflicts with --verbose.
    #[arg(short, long, global(true), conflicts_with("verbose"))]
    quiet: bool,
    /// Provide a `RUST_LOG`-style filter, conflicts with --verbose and --quiet.
    #[arg(long, global(true), conflicts_with_all(["verbose", "quiet"]))]
    log: Option<String>,
}

#[derive(Subcommand)]
enum PeaqueCommand {
    /// Serve a project with hot module replacement.
    Dev(config::DevArgs),
    /// Produce a self-contained production bundle.
    Build(config::BuildArgs),
    /// Run a previously produced production build.
    Start(config::StartArgs),
}

impl Peaque {
    async fn run(self) -> Result<ExitCode> {
        match self.action {
            PeaqueCommand::Dev(args) => run_dev(args.into()).await,
            PeaqueCommand::Build(args) => run_build(args.into()).await,
            PeaqueCommand::Start(args) => run_start(args.into()).await,
        }
    }
}

/// `peaque dev` (spec §4.E): loads the environment, wires the route
/// trees, transform cache and script runtime, runs the startup sequence,
/// and serves until SIGINT/SIGTERM.
async fn run_dev(mut rtc: config::RtcDev) -> Result<ExitCode> {
    rtc.base = normalize_base(&rtc.base);

    // A malformed `.env` is a `config` error (spec §7): logged, never
    // fatal in dev.
    if let Err(err) = config::load_dotenv(&rtc.base, true) {
        tracing::warn!("{err:#}");
    }

    let fs: Arc<dyn FileSystem> = Arc::new(RealFileSystem);
    let parser: Arc<dyn transform::ModuleParser> = Arc::new(transform::parser::SwcModuleParser);
    let aliases = config::load_alias_map(&rtc.base);
    let transformer = transform::Transformer::new(parser, aliases);
    let transform_cache = transform::TransformCache::load(fs.clone(), rtc.base.join(".peaque-cache"))
        .await
        .context("loading the transform cache")?;
    let bundler: Arc<dyn bundler::Bundler> = Arc::new(bundler::EsbuildBundler::default());
    let runtime = spawn_script_runtime(&rtc.base).await?;

    let mut csrf_bypass = csrf::CsrfBypass::default();
    if !rtc.strict {
        tracing::warn!("--no-strict: relaxing the cross-origin guard's bypass allow-list enforcement");
        if let Ok(allow_all) = regex::Regex::new(".*") {
            csrf_bypass.path_patterns.push(allow_all);
        }
    }

    // Startup sequence (spec §4.E "Startup", steps 1-3).
    run_startup_script(runtime.as_ref(), fs.as_ref(), &rtc.base).await?;
    let jobs = start_jobs(runtime.as_ref(), fs.as_ref(), &rtc.base).await?;
    if !jobs.is_empty() {
        tracing::info!("loaded {} job(s)", jobs.len());
    }
    if fs.exists(&rtc.base.join("src/middleware.ts")).await {
        tracing::info!("global middleware src/middleware.ts hooked as the outermost layer");
    }

    let server = dev::DevServer::build(
        rtc.base.clone(),
        fs.clone(),
        transformer,
        transform_cache,
        bundler,
        runtime,
        csrf_bypass,
        rtc.port,
    )
    .await
    .context("building the dev server")?;

    watch_and_serve(server, rtc).await
}

/// Bind the watcher and run the dev server until a shutdown signal
/// arrives (spec §4.E "Watcher handling", §5 "Cancellation").
async fn watch_and_serve(server: dev::DevServer, rtc: config::RtcDev) -> Result<ExitCode> {
    let server = Arc::new(server);
    let watch_server = server.clone();
    let base = rtc.base.clone();
    let watcher_task = tokio::spawn(async move {
        if let Err(err) = run_watch_loop(watch_server, base).await {
            tracing::warn!("watcher stopped: {err}");
        }
    });

    let addr = format!("127.0.0.1:{}", rtc.port);
    let listener = match tokio::net::TcpListener::bind(&addr).await {
        Ok(listener) => listener,
        Err(err) => {
            tracing::error!("{}failed to bind {addr}: {err}", ERROR);
            watcher_task.abort();
            return Ok(ExitCode::FAILURE);
        }
    };
    server.log_listening();

    let router = server.router();
    let serve = axum::serve(listener, router).with_graceful_shutdown(shutdown_signal());
    serve.await.context("dev server stopped")?;

    watcher_task.abort();
    tracing::info!("{}dev server shut down cleanly", SUCCESS);
    Ok(ExitCode::SUCCESS)
}

/// Subscribe to the project's source tree and forward every event to the
/// running server's classification/rebuild/broadcast logic (spec §4.E
/// "Watcher handling").
async fn run_watch_loop(server: Arc<dev::DevServer>, base: PathBuf) -> Result<()> {
    use notify::{RecursiveMode, Watcher};
    use notify_debouncer_full::new_debouncer;

    let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
    let mut debouncer = new_debouncer(std::time::Duration::from_millis(150), None, move |result| {
        let _ = tx.send(result);
    })
    .context("creating the filesystem watcher")?;
    debouncer
        .watcher()
        .watch(&base.join("src"), RecursiveMode::Recursive)
        .context("watching src/")?;

    while let Some(result) = rx.recv().await {
        let Ok(events) = result else {
            continue;
        };
        for event in events {
            let Some(rel) = event
                .paths
                .first()
                .and_then(|p| p.strip_prefix(&base).ok())
                .map(|p| p.to_string_lossy().replace('\\', "/"))
            else {
                continue;
            };
            let kind = match event.kind {
                notify::EventKind::Create(_) => dev::EventKind::Create,
                notify::EventKind::Remove(_) => dev::EventKind::Delete,
                _ => dev::EventKind::Update,
            };
            if let Err(err) = server.on_watch_event(&rel, kind).await {
                tracing::warn!("failed to process watch event for {rel}: {err}");
            }
        }
    }
    Ok(())
}

/// `peaque build` (spec §4.H): runs the ten-step production pipeline.
async fn run_build(mut rtc: config::RtcBuild) -> Result<ExitCode> {
    rtc.base = normalize_base(&rtc.base);

    // Same `config` disposition as dev (spec §7): log and continue with
    // defaults rather than aborting the build over a malformed `.env`.
    if let Err(err) = config::load_dotenv(&rtc.base, false) {
        tracing::warn!("{err:#}");
    }

    let fs: Arc<dyn FileSystem> = Arc::new(RealFileSystem);
    let bundler: Arc<dyn bundler::Bundler> = Arc::new(bundler::EsbuildBundler::default());
    let runtime = spawn_script_runtime(&rtc.base).await?;

    tracing::info!("{}building {}", common::BUILDING, rtc.base.display());
    match build::run_build(&rtc, fs, bundler, runtime).await {
        Ok(artifact) => {
            tracing::info!(
                "{}build complete: {} (asset prefix {})",
                SUCCESS,
                artifact.output_dir.display(),
                artifact.asset_prefix
            );
            Ok(ExitCode::SUCCESS)
        }
        Err(err) => {
            tracing::error!("{}build failed: {err}", ERROR);
            Ok(ExitCode::FAILURE)
        }
    }
}

/// `peaque start` (spec §6): runs a previously produced build's
/// `main.cjs` as a child `node` process and mirrors its exit code.
async fn run_start(mut rtc: config::RtcStart) -> Result<ExitCode> {
    rtc.base = normalize_base(&rtc.base);
    let main_cjs = rtc.base.join("dist/main.cjs");
    anyhow::ensure!(main_cjs.is_file(), "no production build found at {}; run `peaque build` first", main_cjs.display());

    let node = resolve_node_binary()?;
    tracing::info!("{}starting {}", common::SERVER, main_cjs.display());
    let mut child = tokio::process::Command::new(node)
        .arg(&main_cjs)
        .arg("--port")
        .arg(rtc.port.to_string())
        .current_dir(&rtc.base)
        .kill_on_drop(true)
        .spawn()
        .context("spawning the production server process")?;

    let status = tokio::select! {
        status = child.wait() => status.context("waiting on the production server process")?,
        _ = shutdown_signal() => {
            let _ = child.kill().await;
            child.wait().await.context("waiting on the production server process after shutdown")?
        }
    };

    Ok(match status.code() {
        Some(0) => ExitCode::SUCCESS,
        Some(_) => ExitCode::FAILURE,
        None => ExitCode::FAILURE,
    })
}

/// Run `src/startup.ts`'s side effects, if the file exists (spec §4.E
/// "Startup" step 1). A startup script that throws is `fatal` (spec §7):
/// logged and the process exits 1.
async fn run_startup_script(runtime: &dyn runtime::ScriptRuntime, fs: &dyn FileSystem, base: &Path) -> Result<()> {
    let path = base.join("src/startup.ts");
    if !fs.exists(&path).await {
        return Ok(());
    }
    tracing::info!("running src/startup.ts");
    runtime
        .invoke(runtime::Invocation {
            module_path: "src/startup".to_string(),
            export_name: SIDE_EFFECT_IMPORT.to_string(),
            args: Vec::new(),
        })
        .await
        .context("src/startup.ts threw during startup")?;
    Ok(())
}

/// The script runtime's reserved export name for "load this module for
/// its top-level side effects, ignore any specific export" — used for
/// `src/startup.ts` and job registration, neither of which are called
/// through a named export (spec §4.E startup steps 1-2).
const SIDE_EFFECT_IMPORT: &str = "__side_effect_import__";

/// Discover `src/jobs/**/job.ts` and tell the script runtime to load and
/// schedule each one (spec §4.E "Startup" step 2). Actual cron
/// registration happens in the worker process via the external cron
/// collaborator (spec §1 out-of-scope); the Rust core's role is
/// discovery and ordering, the same split as the generated backend
/// entry's jobs handling (spec §4.H "Jobs").
async fn start_jobs(runtime: &dyn runtime::ScriptRuntime, fs: &dyn FileSystem, base: &Path) -> Result<Vec<build::JobFile>> {
    let jobs = build::discover_jobs(fs, &base.join("src/jobs")).await.context("discovering jobs")?;
    for job in &jobs {
        let module_path = common::strip_js_extension(&job.file.path.to_string_lossy().replace('\\', "/")).to_string();
        if let Err(err) = runtime
            .invoke(runtime::Invocation {
                module_path,
                export_name: SIDE_EFFECT_IMPORT.to_string(),
                args: Vec::new(),
            })
            .await
        {
            tracing::warn!("job {} failed to load: {err}", job.display_name);
        }
    }
    Ok(jobs)
}

/// Spawn the `ScriptRuntime` collaborator: a long-lived Node worker
/// rooted at the project, resolved from `PEAQUE_NODE_BINARY`/`PATH` and
/// the worker script shipped alongside this binary (spec §6 "out of
/// scope: the JSX component runtime" — this is the one seam where the
/// Rust core actually calls into JS).
async fn spawn_script_runtime(project_root: &Path) -> Result<Arc<dyn runtime::ScriptRuntime>> {
    let node_binary = resolve_node_binary()?;
    let worker_script = std::env::var_os("PEAQUE_WORKER_SCRIPT")
        .map(PathBuf::from)
        .unwrap_or_else(|| {
            std::env::current_exe()
                .ok()
                .and_then(|exe| exe.parent().map(|dir| dir.join("peaque-worker.js")))
                .unwrap_or_else(|| PathBuf::from("peaque-worker.js"))
        });
    let worker = runtime::NodeWorkerRuntime::spawn(&node_binary, worker_script, project_root)
        .await
        .context("spawning the script runtime's Node worker")?;
    Ok(Arc::new(worker))
}

fn resolve_node_binary() -> Result<PathBuf> {
    if let Some(path) = std::env::var_os("PEAQUE_NODE_BINARY") {
        return Ok(PathBuf::from(path));
    }
    which::which("node").context("could not find a `node` executable on PATH")
}

/// Resolve `base` to an absolute, `\\?\`-stripped path where possible,
/// falling back to the path as given when it doesn't exist yet or
/// canonicalization fails for any other reason.
fn normalize_base(base: &Path) -> PathBuf {
    dunce::canonicalize(base).unwrap_or_else(|_| base.to_path_buf())
}

/// Resolves once both SIGINT and SIGTERM are supported by the platform
/// the way `tokio::signal` exposes them (spec §5 "Cancellation": "Server
/// shutdown stops accepting new connections... scheduled jobs are
/// stopped before the listener exits").
async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        let mut sigint = match signal(SignalKind::interrupt()) {
            Ok(s) => s,
            Err(_) => return,
        };
        let mut sigterm = match signal(SignalKind::terminate()) {
            Ok(s) => s,
            Err(_) => return,
        };
        tokio::select! {
            _ = sigint.recv() => {}
            _ = sigterm.recv() => {}
        }
    }
    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}
