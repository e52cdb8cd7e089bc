//! Server-action shim generation (spec §4.C "Server-action shim
//! generator"). When a source file begins with `'use server'`, its
//! transform is replaced entirely by a generated client stub.

use super::parser::{ExportKind, ModuleParser};
use crate::codegen::CodeWriter;
use anyhow::{bail, Result};

/// True iff the first non-whitespace content of `source` is the
/// `'use server'` directive, either quotation style (spec §6 "File
/// format contracts").
pub fn is_server_action_file(source: &str) -> bool {
    let trimmed = source.trim_start();
    trimmed.starts_with("'use server'") || trimmed.starts_with("\"use server\"")
}

/// One function re-exported by a generated shim.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ShimFunction {
    pub name: String,
}

/// `{module_path, exported_functions, shim_source}` (spec §3 "Server
/// shim").
#[derive(Clone, Debug)]
pub struct ServerShim {
    pub module_path: String,
    pub exported_functions: Vec<ShimFunction>,
    pub shim_source: String,
}

/// Generate the client-side shim for a `'use server'` module at
/// `module_path` (spec §4.C steps 1-4). Fails with a deterministic,
/// diagnostic-carrying error if any export is a non-async function or an
/// `export * from` re-export (spec §4.C steps 2-3).
pub fn generate_shim(
    parser: &dyn ModuleParser,
    source: &str,
    module_path: &str,
) -> Result<ServerShim> {
    let parsed = parser.parse(source, module_path)?;

    for export in &parsed.exports {
        if export.kind == ExportKind::Star {
            bail!("export * from '…' is not allowed in a 'use server' file ({module_path})");
        }
        if !export.is_async {
            bail!("{} is not async in 'use server' file {module_path}", export.name);
        }
    }

    let functions: Vec<ShimFunction> = parsed
        .exports
        .iter()
        .map(|e| ShimFunction { name: e.name.clone() })
        .collect();

    let mut writer = CodeWriter::new();
    writer.line("import { encode, decode } from \"/peaque-rpc.js\";");
    writer.blank();
    writer.block(
        "async function rpcCall(name, args) {",
        "}",
        |w| {
            w.line(&format!(
                "const response = await fetch(\"/api/__rpc/{module_path}/\" + name, {{"
            ));
            w.line("  method: \"POST\",");
            w.line("  headers: { \"content-type\": \"application/json\" },");
            w.line("  body: JSON.stringify(encode({ args })),");
            w.line("});");
            w.line("return decode(await response.json());");
        },
    );
    writer.blank();
    for function in &functions {
        if function.name == "default" {
            writer.line(&format!(
                "export default (...args) => rpcCall(\"default\", args);"
            ));
        } else {
            writer.line(&format!(
                "export const {name} = (...args) => rpcCall(\"{name}\", args);",
                name = function.name
            ));
        }
    }

    Ok(ServerShim {
        module_path: module_path.to_string(),
        exported_functions: functions,
        shim_source: writer.finish(),
    })
}
