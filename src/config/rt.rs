use super::cli::{BuildArgs, DevArgs, StartArgs};
use crate::transform::AliasMap;
use anyhow::{Context, Result};
use std::path::{Path, PathBuf};

/// Load `.env` (always) and, when `dev` is true, `.env.local` (overriding
/// `.env`) from `base`. Process environment always wins over both.
/// Missing files are not an error.
pub fn load_dotenv(base: &Path, dev: bool) -> Result<()> {
    let dot_env = base.join(".env");
    if dot_env.is_file() {
        dotenvy::from_path(&dot_env)
            .with_context(|| format!("loading {}", dot_env.display()))?;
    }
    if dev {
        let dot_env_local = base.join(".env.local");
        if dot_env_local.is_file() {
            dotenvy::from_path_override(&dot_env_local)
                .with_context(|| format!("loading {}", dot_env_local.display()))?;
        }
    }
    Ok(())
}

#[derive(serde::Deserialize)]
struct TsConfig {
    #[serde(default, rename = "compilerOptions")]
    compiler_options: CompilerOptions,
}

#[derive(serde::Deserialize, Default)]
struct CompilerOptions {
    #[serde(default)]
    paths: std::collections::BTreeMap<String, Vec<String>>,
}

/// Load the `paths` alias map out of `<base>/tsconfig.json`, if present.
/// A malformed or absent file is a `config` error: logged, and the
/// import rewriter falls back to no aliases, never fatal.
pub fn load_alias_map(base: &Path) -> AliasMap {
    let path = base.join("tsconfig.json");
    let text = match std::fs::read_to_string(&path) {
        Ok(text) => text,
        Err(_) => return AliasMap::new(),
    };
    let parsed: TsConfig = match serde_json::from_str(&text) {
        Ok(parsed) => parsed,
        Err(err) => {
            tracing::warn!("ignoring malformed {}: {err}", path.display());
            return AliasMap::new();
        }
    };
    let mut aliases = AliasMap::new();
    for (pattern, targets) in parsed.compiler_options.paths {
        let Some(target) = targets.first() else { continue };
        let alias = pattern.trim_end_matches("/*").to_string();
        let resolved = target.trim_end_matches("/*").to_string();
        aliases = aliases.with(alias, resolved);
    }
    aliases
}

/// Runtime config for `peaque dev`.
#[derive(Clone, Debug)]
pub struct RtcDev {
    pub base: PathBuf,
    pub port: u16,
    pub strict: bool,
    pub full_stack_traces: bool,
}

impl From<DevArgs> for RtcDev {
    fn from(args: DevArgs) -> Self {
        Self {
            base: args.base,
            port: args.port,
            strict: !args.no_strict,
            full_stack_traces: args.full_stack_traces,
        }
    }
}

/// Runtime config for `peaque build`.
#[derive(Clone, Debug)]
pub struct RtcBuild {
    pub base: PathBuf,
    pub output: PathBuf,
    pub minify: bool,
    pub analyze: bool,
    pub asset_rewrite: bool,
    pub serverless_frontend: bool,
    pub react_compiler: bool,
}

impl From<BuildArgs> for RtcBuild {
    fn from(args: BuildArgs) -> Self {
        let output = args.output.unwrap_or_else(|| args.base.join("dist"));
        Self {
            base: args.base,
            output,
            minify: !args.no_minify,
            analyze: args.analyze,
            asset_rewrite: !args.no_asset_rewrite,
            serverless_frontend: args.serverless_frontend,
            react_compiler: !args.no_react_compiler,
        }
    }
}

/// Runtime config for `peaque start`.
#[derive(Clone, Debug)]
pub struct RtcStart {
    pub base: PathBuf,
    pub port: u16,
}

impl From<StartArgs> for RtcStart {
    fn from(args: StartArgs) -> Self {
        Self {
            base: args.base,
            port: args.port,
        }
    }
}
