//! The generated frontend entry module (spec §4.H step 1): a small file
//! that imports every discovered page component (and its layouts/guards)
//! under a deterministic identifier and hands the route table to the
//! client runtime collaborator to render.

use super::routes::PageRouteEntry;
use crate::codegen::{CodeWriter, ImportCollector};
use crate::router::{ComponentDescriptor, ComponentRegistry};

/// Strip a recognized JS/TS extension and prefix `./`, the specifier
/// shape a project-root-relative entry module imports sibling source
/// files under (spec §4.H: the generated file "imports every discovered
/// component identifier").
fn project_specifier(path: &std::path::Path) -> String {
    format!("./{}", crate::common::strip_js_extension(&path.to_string_lossy().replace('\\', "/")))
}

/// One route as it appears in the generated entry's route table.
struct GeneratedRoute {
    pattern: String,
    page: ComponentDescriptor,
    layouts: Vec<ComponentDescriptor>,
    guards: Vec<ComponentDescriptor>,
}

/// Generate the frontend entry source for `routes` (spec §4.H step 1).
/// Deterministic for a given route set: two builds of the same tree
/// produce byte-identical output (testable property 7 depends on this
/// holding before the bundler even runs).
pub fn generate_frontend_entry(routes: &[PageRouteEntry]) -> String {
    let mut imports = ImportCollector::new();
    imports.add_named("/@deps/peaque-runtime", "createRouter");

    let mut registry = ComponentRegistry::new();
    let mut generated = Vec::with_capacity(routes.len());

    for route in routes {
        let page = registry.register(&route.page, project_specifier(&route.page.path));
        imports.add_default(page.specifier.clone(), page.identifier.clone());

        let layouts: Vec<ComponentDescriptor> = route
            .layouts
            .iter()
            .map(|f| {
                let d = registry.register(f, project_specifier(&f.path));
                imports.add_default(d.specifier.clone(), d.identifier.clone());
                d
            })
            .collect();
        let guards: Vec<ComponentDescriptor> = route
            .guards
            .iter()
            .map(|f| {
                let d = registry.register(f, project_specifier(&f.path));
                imports.add_default(d.specifier.clone(), d.identifier.clone());
                d
            })
            .collect();

        generated.push(GeneratedRoute {
            pattern: route.pattern.clone(),
            page,
            layouts,
            guards,
        });
    }

    let mut writer = CodeWriter::new();
    writer.line(imports.render().trim_end());
    writer.blank();
    writer.block("const routes = [", "];", |w| {
        for route in &generated {
            let layouts = route
                .layouts
                .iter()
                .map(|d| d.identifier.clone())
                .collect::<Vec<_>>()
                .join(", ");
            let guards = route
                .guards
                .iter()
                .map(|d| d.identifier.clone())
                .collect::<Vec<_>>()
                .join(", ");
            w.line(format!(
                "{{ pattern: \"{}\", Component: {}, layouts: [{layouts}], guards: [{guards}] }},",
                route.pattern, route.page.identifier
            ));
        }
    });
    writer.blank();
    writer.line("createRouter(routes).mount(document.getElementById(\"root\"));");
    writer.finish()
}
