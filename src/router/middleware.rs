//! Middleware chain composition (spec §4.D "Middleware chain"): which
//! files apply, ancestor-first, to a matched node, and the actual
//! outermost-to-innermost invocation contract.
//!
//! The spec's REDESIGN FLAGS call for "an explicit index-threaded loop"
//! over a closure tower, which is what [`run_chain`] is: rather than
//! handing each middleware a live `next` closure (impossible across a
//! process boundary), each middleware file's default export is invoked
//! twice through the [`ScriptRuntime`] — once on the way in, once on the
//! way out — with an explicit [`ChainDirective`] marking which of the
//! two it is:
//!
//! - *before*: the middleware receives the request and returns either
//!   `Next(request)` (continue inward, request possibly amended) or
//!   `Respond(response)` (short-circuit; the handler and every
//!   remaining middleware's *before* phase never runs).
//! - *after*: only runs for middleware that chose `Next`. It receives
//!   the response produced by everything inside it (the next
//!   middleware, or the handler) and returns the response to hand back
//!   to its own caller, amended or not.

use super::tree::{FileRef, RouteNode};
use crate::fs::BoxFuture;
use crate::runtime::{Invocation, ScriptRuntime};
use crate::wire::Wire;
use anyhow::{bail, Result};
use std::collections::BTreeMap;

/// The ordered list of middleware files that apply to a matched node,
/// ancestor-first, as accumulated by the route tree builder under the
/// `"middleware"` stack slot.
#[derive(Clone, Debug, Default)]
pub struct MiddlewareChain {
    pub files: Vec<FileRef>,
}

impl MiddlewareChain {
    pub fn for_node(node: &RouteNode) -> Self {
        Self {
            files: node.stacks.get("middleware").cloned().unwrap_or_default(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }
}

const DIRECTIVE_TAG: &str = "$peaqueMiddlewareDirective";

/// What a middleware invocation decided, for one phase of the chain.
#[derive(Clone, Debug, PartialEq)]
pub enum ChainDirective {
    /// Continue inward (or, on the *after* phase, hand the response back
    /// to the caller) with this value.
    Next(Wire),
    /// Short-circuit: this is the final response. Only meaningful on the
    /// *before* phase.
    Respond(Wire),
}

impl ChainDirective {
    pub fn into_wire(self) -> Wire {
        let (tag, value) = match self {
            ChainDirective::Next(v) => ("next", v),
            ChainDirective::Respond(v) => ("respond", v),
        };
        let mut fields = BTreeMap::new();
        fields.insert(DIRECTIVE_TAG.to_string(), Wire::String(tag.to_string()));
        fields.insert("value".to_string(), value);
        Wire::Object(fields)
    }

    pub fn from_wire(wire: &Wire) -> Result<Self> {
        let Wire::Object(fields) = wire else {
            bail!("middleware response must be a tagged chain directive object, got {wire:?}");
        };
        let tag = match fields.get(DIRECTIVE_TAG) {
            Some(Wire::String(s)) => s.as_str(),
            _ => bail!("middleware response missing `{DIRECTIVE_TAG}` tag"),
        };
        let value = fields.get("value").cloned().unwrap_or(Wire::Undefined);
        match tag {
            "next" => Ok(ChainDirective::Next(value)),
            "respond" => Ok(ChainDirective::Respond(value)),
            other => bail!("unknown middleware chain directive `{other}`"),
        }
    }

    /// The value carried regardless of which variant this is — used on
    /// the *after* phase, where either variant hands back the response.
    fn into_value(self) -> Wire {
        match self {
            ChainDirective::Next(v) | ChainDirective::Respond(v) => v,
        }
    }
}

/// Run `chain` outermost-to-innermost around `handler` (spec §4.D). Each
/// middleware module's `default` export is invoked through `runtime`
/// once per phase; see the module docs for the before/after contract.
/// `handler` is called at most once, only once the chain is exhausted
/// without a short-circuit.
pub fn run_chain<'a, H, F>(chain: &'a [String], runtime: &'a dyn ScriptRuntime, request: Wire, handler: &'a H) -> BoxFuture<'a, Result<Wire>>
where
    H: Fn(Wire) -> F + Sync,
    F: std::future::Future<Output = Result<Wire>> + Send + 'a,
{
    run_step(chain, 0, runtime, request, handler)
}

fn run_step<'a, H, F>(chain: &'a [String], index: usize, runtime: &'a dyn ScriptRuntime, request: Wire, handler: &'a H) -> BoxFuture<'a, Result<Wire>>
where
    H: Fn(Wire) -> F + Sync,
    F: std::future::Future<Output = Result<Wire>> + Send + 'a,
{
    Box::pin(async move {
        let Some(module_path) = chain.get(index) else {
            return handler(request).await;
        };

        let before = runtime
            .invoke(Invocation {
                module_path: module_path.clone(),
                export_name: "default".into(),
                args: vec![request, ChainDirective::Next(Wire::Undefined).into_wire()],
            })
            .await?;

        match ChainDirective::from_wire(&before)? {
            ChainDirective::Respond(response) => Ok(response),
            ChainDirective::Next(amended_request) => {
                let inner_response = run_step(chain, index + 1, runtime, amended_request, handler).await?;
                let after = runtime
                    .invoke(Invocation {
                        module_path: module_path.clone(),
                        export_name: "default".into(),
                        args: vec![inner_response, ChainDirective::Respond(Wire::Undefined).into_wire()],
                    })
                    .await?;
                Ok(ChainDirective::from_wire(&after)?.into_value())
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fs::MemoryFileSystem;
    use crate::router::config::api_config;
    use crate::router::tree::build_route_tree;
    use std::path::Path;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};

    #[tokio::test]
    async fn middleware_chain_inherits_ancestor_first() {
        let memfs = MemoryFileSystem::new()
            .with_file("src/api/middleware.ts", b"root")
            .with_file("src/api/users/middleware.ts", b"users")
            .with_file("src/api/users/route.ts", b"handler");
        let root = build_route_tree(&memfs, Path::new("src/api"), &api_config())
            .await
            .unwrap();
        let users = &root.static_children["users"];
        let chain = MiddlewareChain::for_node(users);
        assert_eq!(chain.files.len(), 2);
        assert_eq!(chain.files[0].path, Path::new("src/api/middleware.ts"));
        assert_eq!(chain.files[1].path, Path::new("src/api/users/middleware.ts"));
    }

    /// A `ScriptRuntime` double that applies a fixed per-module directive
    /// function, so chain composition can be exercised without a Node
    /// worker. Records every `(module_path, phase)` pair it sees so tests
    /// can assert on call order and short-circuit behavior.
    struct ScriptedRuntime {
        calls: Mutex<Vec<(String, &'static str)>>,
        behavior: Box<dyn Fn(&str, &'static str, &Wire) -> Wire + Send + Sync>,
    }

    fn phase_of(args: &[Wire]) -> &'static str {
        match args.get(1) {
            Some(Wire::Object(fields)) if fields.get(DIRECTIVE_TAG) == Some(&Wire::String("respond".into())) => "after",
            _ => "before",
        }
    }

    impl ScriptRuntime for ScriptedRuntime {
        fn invoke<'a>(&'a self, call: Invocation) -> BoxFuture<'a, Result<Wire>> {
            Box::pin(async move {
                let phase = phase_of(&call.args);
                self.calls.lock().unwrap().push((call.module_path.clone(), phase));
                Ok((self.behavior)(&call.module_path, phase, &call.args[0]))
            })
        }
    }

    #[tokio::test]
    async fn short_circuit_skips_inner_middleware_and_handler() {
        let handler_called = Arc::new(AtomicUsize::new(0));
        let counter = handler_called.clone();
        let handler = move |_req: Wire| -> BoxFuture<'static, Result<Wire>> {
            let counter = counter.clone();
            Box::pin(async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(Wire::String("handler".into()))
            })
        };
        let runtime = ScriptedRuntime {
            calls: Mutex::new(Vec::new()),
            behavior: Box::new(|module_path, _phase, _req| {
                if module_path == "src/api/guard" {
                    ChainDirective::Respond(Wire::String("denied".into())).into_wire()
                } else {
                    ChainDirective::Next(Wire::String("req".into())).into_wire()
                }
            }),
        };
        let chain = vec!["src/api/guard".to_string(), "src/api/users/middleware".to_string()];
        let result = run_chain(&chain, &runtime, Wire::String("req".into()), &handler)
            .await
            .unwrap();
        assert_eq!(result, Wire::String("denied".into()));
        let calls = runtime.calls.lock().unwrap().clone();
        assert_eq!(calls, vec![("src/api/guard".to_string(), "before")]);
        assert_eq!(handler_called.load(Ordering::SeqCst), 0, "handler must not run when a middleware short-circuits");
    }

    #[tokio::test]
    async fn next_runs_handler_and_after_phase_can_amend_response() {
        let handler = |_req: Wire| -> BoxFuture<'static, Result<Wire>> { Box::pin(async { Ok(Wire::String("handler".into())) }) };
        let runtime = ScriptedRuntime {
            calls: Mutex::new(Vec::new()),
            behavior: Box::new(|module_path, phase, req| match phase {
                "before" => ChainDirective::Next(req.clone()).into_wire(),
                _ => {
                    // Amend whatever the inner chain produced by wrapping it.
                    let Wire::String(inner) = req else { unreachable!() };
                    ChainDirective::Next(Wire::String(format!("{module_path}+{inner}"))).into_wire()
                }
            }),
        };
        let chain = vec!["src/api/logging".to_string()];
        let result = run_chain(&chain, &runtime, Wire::String("req".into()), &handler)
            .await
            .unwrap();
        assert_eq!(result, Wire::String("src/api/logging+handler".into()));
        let calls = runtime.calls.lock().unwrap().clone();
        assert_eq!(
            calls,
            vec![
                ("src/api/logging".to_string(), "before"),
                ("src/api/logging".to_string(), "after"),
            ]
        );
    }

    #[tokio::test]
    async fn empty_chain_invokes_handler_directly() {
        let handler = |req: Wire| -> BoxFuture<'static, Result<Wire>> { Box::pin(async move { Ok(req) }) };
        let runtime = ScriptedRuntime {
            calls: Mutex::new(Vec::new()),
            behavior: Box::new(|_, _, req| req.clone()),
        };
        let result = run_chain(&[], &runtime, Wire::String("pass-through".into()), &handler)
            .await
            .unwrap();
        assert_eq!(result, Wire::String("pass-through".into()));
        assert!(runtime.calls.lock().unwrap().is_empty());
    }

    #[test]
    fn directive_round_trips_through_wire_encoding() {
        let next = ChainDirective::Next(Wire::Number(1.0));
        let wire = next.clone().into_wire();
        let encoded = crate::wire::encode(&wire);
        let decoded = crate::wire::decode(&encoded).unwrap();
        assert_eq!(ChainDirective::from_wire(&decoded).unwrap(), next);

        let respond = ChainDirective::Respond(Wire::String("nope".into()));
        let wire = respond.clone().into_wire();
        let encoded = crate::wire::encode(&wire);
        let decoded = crate::wire::decode(&encoded).unwrap();
        assert_eq!(ChainDirective::from_wire(&decoded).unwrap(), respond);
    }
}
