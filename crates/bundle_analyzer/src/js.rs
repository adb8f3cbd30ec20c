//! ES module parsing and import enumeration, built on the same
//! `swc_ecma_parser` + `swc_ecma_visit` combination used elsewhere in this
//! workspace for source-position-aware static analysis.

use ahashmap::AHashSet;
use bundler_err::BundlerErr;
use swc_common::sync::Lrc;
use swc_common::{SourceMap, Span, Spanned};
use swc_ecma_ast::{CallExpr, Callee, ExportAll, ImportDecl, Lit, Module, NamedExport};
use swc_ecma_visit::{Visit, VisitWith};

/// How a module specifier was referenced, which determines how the JS
/// rewriter treats it (eager rollup candidate vs. left as a dynamic
/// `import()` whose target is merely retargeted to its post-bundling URL).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImportKind {
    /// `import foo from './bar'` / `import './bar'`
    Static,
    /// `import('./bar')`
    Dynamic,
    /// `export { foo } from './bar'` / `export * from './bar'`
    ReExport,
}

#[derive(Debug, Clone)]
pub struct JsImport {
    pub specifier: String,
    pub kind: ImportKind,
    pub span: Span,
}

pub fn parse_module(url: &str, source: &str) -> Result<(Lrc<SourceMap>, Module), BundlerErr> {
    std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
        swc_utils_parse::parse_ecma_src(url.to_string(), source)
    }))
    .map_err(|_| BundlerErr::malformed_document(anyhow::anyhow!("{url}: failed to parse module")))
}

pub fn print_module(cm: &Lrc<SourceMap>, module: &Module) -> String {
    normalize_src::ast_to_str(cm, module, Default::default())
}

/// Walks `module` collecting every static import, dynamic `import()`, and
/// re-export specifier it contains, in source order.
pub fn collect_imports(module: &Module) -> Vec<JsImport> {
    let mut visitor = ImportCollector::default();
    module.visit_with(&mut visitor);
    visitor.imports
}

/// Distinct specifiers referenced anywhere in `module`, regardless of kind.
/// Used by the dependency-index builder, which doesn't distinguish static
/// from dynamic edges when deciding whether a file is reachable.
pub fn referenced_specifiers(module: &Module) -> AHashSet<String> {
    collect_imports(module)
        .into_iter()
        .map(|i| i.specifier)
        .collect()
}

#[derive(Default)]
struct ImportCollector {
    imports: Vec<JsImport>,
}

impl Visit for ImportCollector {
    fn visit_import_decl(&mut self, decl: &ImportDecl) {
        decl.visit_children_with(self);
        self.imports.push(JsImport {
            specifier: decl.src.value.to_string(),
            kind: ImportKind::Static,
            span: decl.span(),
        });
    }

    fn visit_named_export(&mut self, export: &NamedExport) {
        export.visit_children_with(self);
        if let Some(src) = &export.src {
            self.imports.push(JsImport {
                specifier: src.value.to_string(),
                kind: ImportKind::ReExport,
                span: export.span(),
            });
        }
    }

    fn visit_export_all(&mut self, export: &ExportAll) {
        export.visit_children_with(self);
        self.imports.push(JsImport {
            specifier: export.src.value.to_string(),
            kind: ImportKind::ReExport,
            span: export.span(),
        });
    }

    fn visit_call_expr(&mut self, expr: &CallExpr) {
        expr.visit_children_with(self);
        if let Callee::Import(_) = &expr.callee {
            if let Some(specifier) = first_string_arg(expr) {
                self.imports.push(JsImport {
                    specifier,
                    kind: ImportKind::Dynamic,
                    span: expr.span(),
                });
            }
        }
    }
}

fn first_string_arg(expr: &CallExpr) -> Option<String> {
    let arg = expr.args.first()?;
    match arg.expr.as_lit()? {
        Lit::Str(s) => Some(s.value.to_string()),
        _ => None,
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn collects_static_and_dynamic_and_reexport_specifiers() {
        let (_, module) = swc_utils_parse::parse_ecma_src(
            "entry.js",
            r#"
            import a from './a.js';
            export { b } from './b.js';
            export * from './c.js';
            const loaded = import('./d.js');
            "#,
        );
        let imports = collect_imports(&module);
        let specifiers: Vec<_> = imports.iter().map(|i| i.specifier.as_str()).collect();
        assert_eq!(specifiers, vec!["./a.js", "./b.js", "./c.js", "./d.js"]);
        assert_eq!(imports[3].kind, ImportKind::Dynamic);
    }

    #[test]
    fn print_module_round_trips_simple_source() {
        let (cm, module) = swc_utils_parse::parse_ecma_src("entry.js", "const x = 1;");
        let printed = print_module(&cm, &module);
        assert_eq!(printed.trim(), "const x = 1;");
    }
}
