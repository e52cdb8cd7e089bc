//! Server-action dispatcher: reverse-maps an RPC URL to a loaded
//! module's exported function, decodes arguments through the wire
//! codec, establishes request context, invokes, and encodes the result.

use crate::context::{self, RequestContext};
use crate::csrf::{self, CsrfBypass, Verdict};
use crate::router;
use crate::runtime::{Invocation, ScriptRuntime};
use crate::transform::parser::ModuleParser;
use crate::wire::{self, Wire};
use anyhow::{anyhow, bail, Result};
use axum::http::{HeaderMap, Method};

/// Split `/api/__rpc/<module-path>/<function-name>`'s path tail (already
/// stripped of the `/api/__rpc/` prefix) into its module path and
/// function name: the segment after the last `/`.
pub fn split_rpc_path(tail: &str) -> Option<(&str, &str)> {
    tail.rsplit_once('/')
}

/// The outcome of dispatching one RPC call, already shaped for an HTTP
/// response.
pub enum DispatchOutcome {
    Forbidden,
    NotFound,
    Ok(serde_json::Value),
    /// The invoked function threw; surfaced as 500 with the message in
    /// the body, since actions use throw/catch for client-side control
    /// flow.
    Thrown(String),
}

/// Run the full dispatch pipeline for one RPC request whose decoded
/// `{args}` wire payload is `body`.
pub async fn dispatch(
    runtime: &dyn ScriptRuntime,
    method: &Method,
    rpc_tail: &str,
    headers: &HeaderMap,
    bypass: &CsrfBypass,
    body: &serde_json::Value,
) -> Result<DispatchOutcome> {
    let path = format!("/api/__rpc/{rpc_tail}");
    if csrf::check(method, &path, headers, bypass) == Verdict::Deny {
        return Ok(DispatchOutcome::Forbidden);
    }

    let Some((module_path, function_name)) = split_rpc_path(rpc_tail) else {
        return Ok(DispatchOutcome::NotFound);
    };

    let args = decode_args(body)?;

    let ctx = RequestContext {
        method: method.clone(),
        path,
        headers: headers.clone(),
    };

    let result = context::scope(ctx, async {
        runtime
            .invoke(Invocation {
                module_path: module_path.to_string(),
                export_name: function_name.to_string(),
                args,
            })
            .await
    })
    .await;

    Ok(match result {
        Ok(value) => DispatchOutcome::Ok(wire::encode(&value)),
        Err(err) => DispatchOutcome::Thrown(err.to_string()),
    })
}

/// Run the API-route dispatch pipeline: confirm the handler module
/// actually exports `method`, run the matched `middleware` stack
/// outermost-to-innermost around the invocation (spec §4.D "Middleware
/// chain"), and translate the outcome to the same response shape the
/// RPC dispatcher uses.
///
/// Unlike [`dispatch`], this path carries no CSRF guard — that guard is
/// scoped to the RPC dispatcher; plain API handlers opt into their own
/// auth via guards/middleware.
pub async fn dispatch_api(
    runtime: &dyn ScriptRuntime,
    parser: &dyn ModuleParser,
    source: &str,
    method: &Method,
    module_path: &str,
    path: &str,
    headers: &HeaderMap,
    middleware: &[String],
) -> Result<DispatchOutcome> {
    let parsed = parser.parse(source, module_path)?;
    if !parsed.exports.iter().any(|e| e.name == method.as_str()) {
        return Ok(DispatchOutcome::NotFound);
    }

    let ctx = RequestContext {
        method: method.clone(),
        path: path.to_string(),
        headers: headers.clone(),
    };

    let module_path_owned = module_path.to_string();
    let export_name = method.to_string();
    let handler = move |_request: Wire| {
        let module_path = module_path_owned.clone();
        let export_name = export_name.clone();
        async move {
            // The generated handler module takes no arguments; the
            // chain's (possibly middleware-amended) request value is
            // informational for middleware only, not forwarded here.
            runtime
                .invoke(Invocation {
                    module_path,
                    export_name,
                    args: Vec::new(),
                })
                .await
        }
    };

    let mut request_fields = std::collections::BTreeMap::new();
    request_fields.insert("method".to_string(), Wire::String(method.to_string()));
    request_fields.insert("path".to_string(), Wire::String(path.to_string()));
    let request = Wire::Object(request_fields);

    let result = context::scope(ctx, router::middleware::run_chain(middleware, runtime, request, &handler)).await;

    Ok(match result {
        Ok(value) => DispatchOutcome::Ok(wire::encode(&value)),
        Err(err) => DispatchOutcome::Thrown(err.to_string()),
    })
}

fn decode_args(body: &serde_json::Value) -> Result<Vec<Wire>> {
    let args_value = body
        .get("args")
        .ok_or_else(|| anyhow!("RPC body missing 'args'"))?;
    let serde_json::Value::Array(items) = args_value else {
        bail!("RPC body 'args' must be an array");
    };
    items.iter().map(wire::decode).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::tests::StubRuntime;
    use serde_json::json;

    #[test]
    fn splits_module_path_from_trailing_function_name() {
        assert_eq!(
            split_rpc_path("src/actions/user/updateUser"),
            Some(("src/actions/user", "updateUser"))
        );
        assert_eq!(split_rpc_path("updateUser"), None);
    }

    #[tokio::test]
    async fn cross_site_request_is_forbidden_before_invocation() {
        let runtime = StubRuntime {
            response: Wire::Null,
        };
        let mut headers = HeaderMap::new();
        headers.insert("sec-fetch-site", "cross-site".parse().unwrap());
        let bypass = CsrfBypass::default();
        let outcome = dispatch(
            &runtime,
            &Method::POST,
            "src/actions/user/updateUser",
            &headers,
            &bypass,
            &json!({"args": []}),
        )
        .await
        .unwrap();
        assert!(matches!(outcome, DispatchOutcome::Forbidden));
    }

    #[tokio::test]
    async fn dispatch_api_returns_not_found_when_method_is_unexported() {
        use crate::transform::parser::SwcModuleParser;

        let runtime = StubRuntime { response: Wire::Null };
        let parser = SwcModuleParser;
        let source = "export async function GET() {}";
        let outcome = dispatch_api(
            &runtime,
            &parser,
            source,
            &Method::POST,
            "src/api/users/route",
            "/api/users",
            &HeaderMap::new(),
            &[],
        )
        .await
        .unwrap();
        assert!(matches!(outcome, DispatchOutcome::NotFound));
    }

    #[tokio::test]
    async fn dispatch_api_invokes_matching_method_export() {
        use crate::transform::parser::SwcModuleParser;

        let runtime = StubRuntime {
            response: Wire::String("ok".into()),
        };
        let parser = SwcModuleParser;
        let source = "export async function GET() {}";
        let outcome = dispatch_api(
            &runtime,
            &parser,
            source,
            &Method::GET,
            "src/api/users/route",
            "/api/users",
            &HeaderMap::new(),
            &[],
        )
        .await
        .unwrap();
        match outcome {
            DispatchOutcome::Ok(value) => assert_eq!(value, json!("ok")),
            _ => panic!("expected Ok outcome"),
        }
    }

    #[tokio::test]
    async fn successful_call_decodes_args_and_encodes_result() {
        let runtime = StubRuntime {
            response: Wire::String("saved".into()),
        };
        let bypass = CsrfBypass::default();
        let outcome = dispatch(
            &runtime,
            &Method::POST,
            "src/actions/user/updateUser",
            &HeaderMap::new(),
            &bypass,
            &json!({"args": [{"$wire": "undefined", "value": null}]}),
        )
        .await
        .unwrap();
        match outcome {
            DispatchOutcome::Ok(value) => assert_eq!(value, json!("saved")),
            _ => panic!("expected Ok outcome"),
        }
    }
}
