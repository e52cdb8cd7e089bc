//! The script execution collaborator: actually running user-authored
//! JS/TS (API route handlers, middleware, guards, server actions,
//! `src/startup.ts`, jobs) happens in a subprocess, not in this core —
//! the specification's out-of-scope list names the JSX runtime and
//! bundler as external collaborators for the same reason. What *is* in
//! scope, and implemented here plus `router::middleware`, is the
//! middleware chain's composition contract (spec §4.D): this core drives
//! the outermost-to-innermost loop itself, invoking each middleware
//! module's `default` export twice through [`ScriptRuntime`] (once
//! before the inner chain/handler runs, once after), rather than handing
//! the chain to the worker as inert metadata.
//!
//! This module defines the seam: a [`ScriptRuntime`] trait the dev server
//! and production entry call into, with an adapter that shells out to a
//! long-lived Node.js worker subprocess over line-delimited JSON — the
//! same shape as the wire codec uses for RPC bodies, so a call's
//! arguments and return value cross the process boundary with the same
//! fidelity they'd have over HTTP.

use crate::wire::Wire;
use anyhow::{anyhow, bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStdin, Command};
use tokio::sync::{oneshot, Mutex};

/// One invocation of an exported function in a loaded module. Middleware
/// chain composition (spec §4.D) is not part of this shape — it's driven
/// by `router::middleware::run_chain`, which issues one `Invocation` per
/// phase per middleware module, then one more for the terminal handler.
#[derive(Clone, Debug)]
pub struct Invocation {
    pub module_path: String,
    pub export_name: String,
    pub args: Vec<Wire>,
}

pub trait ScriptRuntime: Send + Sync {
    fn invoke<'a>(&'a self, call: Invocation) -> crate::fs::BoxFuture<'a, Result<Wire>>;
}

#[derive(Serialize)]
struct WorkerRequest<'a> {
    id: u64,
    module_path: &'a str,
    export_name: &'a str,
    args: Vec<serde_json::Value>,
}

#[derive(Deserialize)]
struct WorkerResponse {
    id: u64,
    #[serde(default)]
    result: Option<serde_json::Value>,
    #[serde(default)]
    error: Option<String>,
}

/// Drives a single persistent `node` subprocess that loads modules
/// on demand and executes exported functions, communicating over
/// newline-delimited JSON on stdin/stdout (spec §6 "out of scope: the
/// JSX component runtime" — this is the load-bearing half that lets
/// the rest of the core stay pure Rust).
type PendingMap = std::collections::HashMap<u64, oneshot::Sender<WorkerResponse>>;

pub struct NodeWorkerRuntime {
    stdin: Mutex<ChildStdin>,
    pending: std::sync::Arc<Mutex<PendingMap>>,
    next_id: AtomicU64,
    _child: Mutex<Child>,
}

impl NodeWorkerRuntime {
    /// Spawn the worker script (generated alongside the project, or a
    /// fixed runtime script shipped with the framework) rooted at
    /// `project_root`.
    pub async fn spawn(node_binary: &std::path::Path, worker_script: PathBuf, project_root: &std::path::Path) -> Result<Self> {
        let mut child = Command::new(node_binary)
            .arg(&worker_script)
            .current_dir(project_root)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .spawn()
            .with_context(|| format!("spawning node worker {}", worker_script.display()))?;

        let stdin = child.stdin.take().ok_or_else(|| anyhow!("worker stdin not piped"))?;
        let stdout = child.stdout.take().ok_or_else(|| anyhow!("worker stdout not piped"))?;

        let pending: std::sync::Arc<Mutex<PendingMap>> = Default::default();
        let reader_pending = pending.clone();
        tokio::spawn(async move {
            let mut lines = BufReader::new(stdout).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                let Ok(response) = serde_json::from_str::<WorkerResponse>(&line) else {
                    continue;
                };
                if let Some(sender) = reader_pending.lock().await.remove(&response.id) {
                    let _ = sender.send(response);
                }
            }
        });

        Ok(Self {
            stdin: Mutex::new(stdin),
            pending,
            next_id: AtomicU64::new(1),
            _child: Mutex::new(child),
        })
    }
}

impl ScriptRuntime for NodeWorkerRuntime {
    fn invoke<'a>(&'a self, call: Invocation) -> crate::fs::BoxFuture<'a, Result<Wire>> {
        Box::pin(async move {
            let id = self.next_id.fetch_add(1, Ordering::SeqCst);
            let (tx, rx) = oneshot::channel();
            self.pending.lock().await.insert(id, tx);

            let request = WorkerRequest {
                id,
                module_path: &call.module_path,
                export_name: &call.export_name,
                args: call.args.iter().map(crate::wire::encode).collect(),
            };
            let mut line = serde_json::to_string(&request)?;
            line.push('\n');
            self.stdin.lock().await.write_all(line.as_bytes()).await?;

            let response = rx.await.context("node worker closed before responding")?;
            if let Some(error) = response.error {
                bail!("{error}");
            }
            match response.result {
                Some(value) => crate::wire::decode(&value),
                None => Ok(Wire::Undefined),
            }
        })
    }
}
