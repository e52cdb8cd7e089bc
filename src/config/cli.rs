use clap::Args;
use std::path::PathBuf;

/// Serve a project directory with hot module replacement.
#[derive(Clone, Debug, Args)]
#[command(name = "dev")]
#[command(next_help_heading = "Dev")]
pub struct DevArgs {
    /// The port to serve on.
    #[arg(short, long, env = "PEAQUE_DEV_PORT", default_value_t = 3000)]
    pub port: u16,
    /// The project root directory.
    #[arg(short, long, env = "PEAQUE_DEV_BASE", default_value = ".")]
    pub base: PathBuf,
    /// Relax the cross-origin guard's bypass allow-list enforcement.
    #[arg(long, env = "PEAQUE_DEV_NO_STRICT")]
    pub no_strict: bool,
    /// Surface full stack traces on 500 responses (off by default in dev too).
    #[arg(long, env = "PEAQUE_DEV_FULL_STACK_TRACES")]
    pub full_stack_traces: bool,
}

/// Produce a self-contained production bundle.
#[derive(Clone, Debug, Args)]
#[command(name = "build")]
#[command(next_help_heading = "Build")]
pub struct BuildArgs {
    /// The directory final build artifacts are written to.
    #[arg(short, long, env = "PEAQUE_BUILD_OUTPUT")]
    pub output: Option<PathBuf>,
    /// The project root directory.
    #[arg(short, long, env = "PEAQUE_BUILD_BASE", default_value = ".")]
    pub base: PathBuf,
    /// Skip bundler minification.
    #[arg(long, env = "PEAQUE_BUILD_NO_MINIFY")]
    pub no_minify: bool,
    /// Emit the bundler's size-analysis metafile alongside the build.
    #[arg(long, env = "PEAQUE_BUILD_ANALYZE")]
    pub analyze: bool,
    /// Skip rewriting public-asset references with the build's asset prefix.
    #[arg(long, env = "PEAQUE_BUILD_NO_ASSET_REWRITE")]
    pub no_asset_rewrite: bool,
    /// Emit a frontend bundle with no generated backend entry.
    #[arg(long, env = "PEAQUE_BUILD_SERVERLESS_FRONTEND")]
    pub serverless_frontend: bool,
    /// Disable the React compiler pass in the bundler, if supported.
    #[arg(long, env = "PEAQUE_BUILD_NO_REACT_COMPILER")]
    pub no_react_compiler: bool,
}

/// Run a previously produced production build.
#[derive(Clone, Debug, Args)]
#[command(name = "start")]
#[command(next_help_heading = "Start")]
pub struct StartArgs {
    /// The project root directory.
    #[arg(short, long, env = "PEAQUE_START_BASE", default_value = ".")]
    pub base: PathBuf,
    /// The port to serve on.
    #[arg(short, long, env = "PEAQUE_START_PORT", default_value_t = 3000)]
    pub port: u16,
}
