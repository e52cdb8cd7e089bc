//! The JS/TS parser collaborator (spec §6 "Parser", §4.C "Server-action
//! shim generator" step 1-3): parses a source module and exposes its
//! export declarations with async-ness, for the shim generator to verify
//! against.

use anyhow::{anyhow, Result};
use swc_common::sync::Lrc;
use swc_common::{FileName, SourceMap};
use swc_ecma_ast::{Decl, DefaultDecl, ExportSpecifier, ModuleDecl, ModuleItem, Program};
use swc_ecma_parser::{lexer::Lexer, Parser, StringInput, Syntax, TsConfig};

/// One exported binding found at the top level of a module.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ExportDecl {
    pub name: String,
    pub is_async: bool,
    pub kind: ExportKind,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ExportKind {
    Named,
    Default,
    ReExport,
    Star,
}

#[derive(Clone, Debug, Default)]
pub struct ParsedModule {
    pub exports: Vec<ExportDecl>,
}

/// The collaborator boundary: any JS/TS parser able to enumerate a
/// module's exports can back the server-action shim generator.
pub trait ModuleParser: Send + Sync {
    fn parse(&self, source: &str, file_name: &str) -> Result<ParsedModule>;
}

/// Adapter over `swc_ecma_parser`, parsing in TSX mode (a superset that
/// also accepts plain `.ts`/`.js` syntax).
pub struct SwcModuleParser;

impl ModuleParser for SwcModuleParser {
    fn parse(&self, source: &str, file_name: &str) -> Result<ParsedModule> {
        let source_map: Lrc<SourceMap> = Default::default();
        let file = source_map.new_source_file(
            Lrc::new(FileName::Custom(file_name.to_string())),
            source.to_string(),
        );
        let syntax = Syntax::Typescript(TsConfig {
            tsx: true,
            ..Default::default()
        });
        let lexer = Lexer::new(
            syntax,
            swc_ecma_ast::EsVersion::EsNext,
            StringInput::from(&*file),
            None,
        );
        let mut parser = Parser::new_from(lexer);
        let program = parser
            .parse_program()
            .map_err(|err| anyhow!("parse error in {file_name}: {err:?}"))?;

        let module = match program {
            Program::Module(module) => module,
            Program::Script(_) => {
                return Err(anyhow!("{file_name} is not an ES module"));
            }
        };

        let mut exports = Vec::new();
        for item in &module.body {
            let ModuleItem::ModuleDecl(decl) = item else {
                continue;
            };
            collect_export(decl, &mut exports);
        }
        Ok(ParsedModule { exports })
    }
}

fn collect_export(decl: &ModuleDecl, exports: &mut Vec<ExportDecl>) {
    match decl {
        ModuleDecl::ExportDecl(export) => match &export.decl {
            Decl::Fn(func) => exports.push(ExportDecl {
                name: func.ident.sym.to_string(),
                is_async: func.function.is_async,
                kind: ExportKind::Named,
            }),
            Decl::Var(var) => {
                for declarator in &var.decls {
                    let Some(name) = binding_ident_name(declarator) else {
                        continue;
                    };
                    let is_async = declarator
                        .init
                        .as_deref()
                        .map(is_async_expr)
                        .unwrap_or(false);
                    exports.push(ExportDecl {
                        name,
                        is_async,
                        kind: ExportKind::Named,
                    });
                }
            }
            _ => {}
        },
        ModuleDecl::ExportDefaultDecl(export) => {
            let is_async = match &export.decl {
                DefaultDecl::Fn(func) => func.function.is_async,
                _ => false,
            };
            exports.push(ExportDecl {
                name: "default".to_string(),
                is_async,
                kind: ExportKind::Default,
            });
        }
        ModuleDecl::ExportDefaultExpr(export) => {
            exports.push(ExportDecl {
                name: "default".to_string(),
                is_async: is_async_expr(&export.expr),
                kind: ExportKind::Default,
            });
        }
        ModuleDecl::ExportNamed(export) => {
            if export.src.is_some() {
                for specifier in &export.specifiers {
                    if let ExportSpecifier::Named(named) = specifier {
                        let name = named
                            .exported
                            .as_ref()
                            .map(export_name_to_string)
                            .unwrap_or_else(|| export_name_to_string(&named.orig));
                        exports.push(ExportDecl {
                            name,
                            is_async: false,
                            kind: ExportKind::ReExport,
                        });
                    }
                }
            }
        }
        ModuleDecl::ExportAll(_) => {
            exports.push(ExportDecl {
                name: "*".to_string(),
                is_async: false,
                kind: ExportKind::Star,
            });
        }
        _ => {}
    }
}

fn export_name_to_string(name: &swc_ecma_ast::ModuleExportName) -> String {
    match name {
        swc_ecma_ast::ModuleExportName::Ident(ident) => ident.sym.to_string(),
        swc_ecma_ast::ModuleExportName::Str(s) => s.value.to_string(),
    }
}

fn binding_ident_name(declarator: &swc_ecma_ast::VarDeclarator) -> Option<String> {
    declarator.name.as_ident().map(|ident| ident.id.sym.to_string())
}

fn is_async_expr(expr: &swc_ecma_ast::Expr) -> bool {
    match expr {
        swc_ecma_ast::Expr::Fn(f) => f.function.is_async,
        swc_ecma_ast::Expr::Arrow(a) => a.is_async,
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn finds_named_async_function_export() {
        let parser = SwcModuleParser;
        let module = parser
            .parse("export async function updateUser(x) {}", "mod.ts")
            .unwrap();
        assert_eq!(module.exports.len(), 1);
        assert_eq!(module.exports[0].name, "updateUser");
        assert!(module.exports[0].is_async);
    }

    #[test]
    fn flags_non_async_export() {
        let parser = SwcModuleParser;
        let module = parser
            .parse("export function updateUser(x) {}", "mod.ts")
            .unwrap();
        assert!(!module.exports[0].is_async);
    }

    #[test]
    fn detects_export_star() {
        let parser = SwcModuleParser;
        let module = parser.parse("export * from './other';", "mod.ts").unwrap();
        assert_eq!(module.exports[0].kind, ExportKind::Star);
    }

    #[test]
    fn default_exported_arrow_function_async() {
        let parser = SwcModuleParser;
        let module = parser
            .parse("export default async (x) => x;", "mod.ts")
            .unwrap();
        assert_eq!(module.exports[0].kind, ExportKind::Default);
        assert!(module.exports[0].is_async);
    }
}
