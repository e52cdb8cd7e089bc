//! Deterministic code generation (spec §9 "Generated code"): the
//! production builder assembles the frontend entry and the standalone
//! backend entry through this small builder abstraction instead of ad-hoc
//! string concatenation, so the generated output is diff-friendly and
//! byte-stable across builds with identical inputs (testable property 7,
//! scenario 7).

use std::collections::BTreeMap;
use std::fmt::Write as _;

/// The three import-statement shapes a generated module may need.
#[derive(Clone, Debug, PartialEq, Eq)]
enum ImportKind {
    /// `import { a, b } from "spec"`, identifiers sorted.
    Named(Vec<String>),
    /// `import Default from "spec"`.
    Default(String),
    /// `import * as Name from "spec"`.
    Namespace(String),
}

/// Collects import statements keyed by specifier, merging named imports
/// requested for the same module and sorting both specifiers and
/// identifiers on output so two builds from the same input set produce
/// byte-identical import blocks.
#[derive(Default)]
pub struct ImportCollector {
    named: BTreeMap<String, Vec<String>>,
    defaults: BTreeMap<String, String>,
    namespaces: BTreeMap<String, String>,
}

impl ImportCollector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_named(&mut self, specifier: impl Into<String>, identifier: impl Into<String>) {
        let entry = self.named.entry(specifier.into()).or_default();
        let identifier = identifier.into();
        if !entry.contains(&identifier) {
            entry.push(identifier);
        }
    }

    pub fn add_default(&mut self, specifier: impl Into<String>, identifier: impl Into<String>) {
        self.defaults.insert(specifier.into(), identifier.into());
    }

    pub fn add_namespace(&mut self, specifier: impl Into<String>, identifier: impl Into<String>) {
        self.namespaces.insert(specifier.into(), identifier.into());
    }

    /// Render every collected import as one line per specifier, specifiers
    /// in sorted order, named identifiers sorted within their line.
    pub fn render(&self) -> String {
        let mut specifiers: Vec<&String> = self
            .named
            .keys()
            .chain(self.defaults.keys())
            .chain(self.namespaces.keys())
            .collect();
        specifiers.sort();
        specifiers.dedup();

        let mut out = String::new();
        for specifier in specifiers {
            if let Some(default) = self.defaults.get(specifier) {
                let _ = writeln!(out, "import {default} from \"{specifier}\";");
            }
            if let Some(namespace) = self.namespaces.get(specifier) {
                let _ = writeln!(out, "import * as {namespace} from \"{specifier}\";");
            }
            if let Some(names) = self.named.get(specifier) {
                let mut sorted = names.clone();
                sorted.sort();
                let _ = writeln!(out, "import {{ {} }} from \"{specifier}\";", sorted.join(", "));
            }
        }
        out
    }
}

/// A small indentation-tracking text builder for generated module bodies.
#[derive(Default)]
pub struct CodeWriter {
    lines: Vec<String>,
    indent: usize,
}

impl CodeWriter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn line(&mut self, text: impl AsRef<str>) -> &mut Self {
        let prefix = "  ".repeat(self.indent);
        self.lines.push(format!("{prefix}{}", text.as_ref()));
        self
    }

    pub fn blank(&mut self) -> &mut Self {
        self.lines.push(String::new());
        self
    }

    /// Emit `open`, run `body` at one deeper indentation level, then emit
    /// `close` back at the current level.
    pub fn block(
        &mut self,
        open: impl AsRef<str>,
        close: impl AsRef<str>,
        body: impl FnOnce(&mut Self),
    ) -> &mut Self {
        self.line(open);
        self.indent += 1;
        body(self);
        self.indent -= 1;
        self.line(close);
        self
    }

    pub fn finish(self) -> String {
        let mut out = self.lines.join("\n");
        out.push('\n');
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn import_collector_sorts_specifiers_and_identifiers() {
        let mut collector = ImportCollector::new();
        collector.add_named("/@src/pages/users/page", "UsersPage");
        collector.add_named("/@src/pages/about/page", "AboutPage");
        collector.add_named("/@src/pages/about/page", "AboutPage");
        collector.add_default("/@deps/react", "React");
        let rendered = collector.render();
        let about_idx = rendered.find("about/page").unwrap();
        let users_idx = rendered.find("users/page").unwrap();
        let react_idx = rendered.find("react").unwrap();
        assert!(about_idx < users_idx);
        assert!(react_idx < about_idx);
        assert_eq!(rendered.matches("AboutPage").count(), 1);
    }

    #[test]
    fn code_writer_indents_blocks() {
        let mut writer = CodeWriter::new();
        writer.line("function main() {");
        writer.block("if (true) {", "}", |w| {
            w.line("doThing();");
        });
        writer.line("}");
        let out = writer.finish();
        assert_eq!(
            out,
            "function main() {\n  if (true) {\n    doThing();\n  }\n}\n"
        );
    }

    #[test]
    fn identical_inputs_produce_byte_identical_output() {
        let build = || {
            let mut collector = ImportCollector::new();
            collector.add_named("/@src/a", "A");
            collector.add_named("/@src/b", "B");
            collector.render()
        };
        assert_eq!(build(), build());
    }
}
