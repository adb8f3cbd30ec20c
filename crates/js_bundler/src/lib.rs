//! ES6 module bundler/rewriter: rolls same-bundle modules up into a single
//! top-level scope (renaming every export via [`names::ExportNames`]),
//! retargets imports that cross bundle boundaries, rewrites dynamic
//! `import()` targets, and dedups the import declarations left behind.
//!
//! Tree-shaking is out of scope: every module reachable through a static or
//! dynamic import is kept, in full, whether or not the bundle ends up using
//! all of it.

mod names;

use ahashmap::{AHashMap, AHashSet};
use bundle_manifest::{Bundle, BundleManifest};
use bundle_url::{ResolvedUrl, UrlLoader, UrlResolver};
use bundler_err::BundlerErr;
use swc_ecma_ast::{
    CallExpr, Callee, Decl, DefaultDecl, Expr, ImportDecl, ImportSpecifier, Lit, ModuleDecl,
    ModuleItem, Pat, Stmt, VarDecl, VarDeclKind, VarDeclarator,
};
use swc_ecma_visit::{VisitMut, VisitMutWith};

pub use names::ExportNames;

/// Rewrites ES modules into their post-bundling form for one target
/// [`BundleManifest`]. Constructed once per rewrite pass; `names` must
/// already be fully populated (see [`ExportNames::build`]) before any call
/// here, since the rewrite itself only reads from it.
pub struct JsBundler<'a> {
    pub manifest: &'a BundleManifest,
    pub resolver: &'a dyn UrlResolver,
    pub loader: &'a dyn UrlLoader,
    pub names: &'a ExportNames,
}

impl<'a> JsBundler<'a> {
    /// Rolls up the JS file at `bundle_url` — a basis bundle whose own file
    /// is itself the entrypoint — into one module body.
    pub fn bundle_file(&self, bundle_url: &ResolvedUrl, bundle: &mut Bundle) -> Result<String, BundlerErr> {
        let source = self.read(bundle_url)?;
        self.rewrite(bundle_url, bundle_url, &source, bundle)
    }

    /// Rewrites one inline `<script type="module">`'s source. Same-bundle
    /// imports are inlined exactly as in [`Self::bundle_file`]; specifiers
    /// are resolved against `host_url` (the HTML document containing the
    /// script), since the inline script has no URL of its own.
    pub fn rewrite_inline_module(
        &self,
        host_url: &ResolvedUrl,
        bundle_url: &ResolvedUrl,
        source: &str,
        bundle: &mut Bundle,
    ) -> Result<String, BundlerErr> {
        self.rewrite(host_url, bundle_url, source, bundle)
    }

    fn read(&self, url: &ResolvedUrl) -> Result<String, BundlerErr> {
        let bytes = self.loader.load(url)?;
        String::from_utf8(bytes).map_err(|e| BundlerErr::malformed_document(anyhow::anyhow!("{url}: {e}")))
    }

    fn rewrite(
        &self,
        module_base_url: &ResolvedUrl,
        bundle_url: &ResolvedUrl,
        source: &str,
        bundle: &mut Bundle,
    ) -> Result<String, BundlerErr> {
        let (cm, mut module) = bundle_analyzer::js::parse_module(module_base_url.as_str(), source)?;
        let mut merged: AHashSet<ResolvedUrl> = AHashSet::default();
        let mut prelude: Vec<ModuleItem> = Vec::new();
        let body = self.process_items(&mut module.body, module_base_url, bundle_url, bundle, &mut merged, &mut prelude)?;

        let mut final_body = prelude;
        final_body.extend(body);
        dedupe_imports(&mut final_body);
        module.body = final_body;
        Ok(bundle_analyzer::js::print_module(&cm, &module))
    }

    /// Resolves `nameFor(bundle_url, module, original)`, reserving a fresh
    /// name on the fly when `module` is an identity the precompute pass
    /// never walked (an inline module script's host document URL).
    fn resolve_name(&self, bundle_url: &ResolvedUrl, module: &ResolvedUrl, original: &str, bundle: &mut Bundle) -> String {
        if let Some(existing) = self.names.get(bundle_url, module, original) {
            return existing.to_string();
        }
        let preserve = module == bundle_url && bundle.basis_entrypoint() == Some(bundle_url);
        names::reserve(bundle, original, preserve)
    }

    fn fresh_binding(&self, name: &str) -> Result<swc_ecma_ast::BindingIdent, BundlerErr> {
        let src = format!("var {name};");
        let (_, module) = bundle_analyzer::js::parse_module("synthetic.js", &src)?;
        if let Some(ModuleItem::Stmt(Stmt::Decl(Decl::Var(v)))) = module.body.into_iter().next() {
            if let Some(d) = v.decls.into_iter().next() {
                if let Pat::Ident(binding) = d.name {
                    return Ok(binding);
                }
            }
        }
        Err(BundlerErr::malformed_document(anyhow::anyhow!(
            "failed to synthesize identifier {name}"
        )))
    }

    fn synthesize_item(&self, src: &str) -> Result<ModuleItem, BundlerErr> {
        let (_, mut module) = bundle_analyzer::js::parse_module("synthetic.js", src)?;
        module
            .body
            .pop()
            .ok_or_else(|| BundlerErr::malformed_document(anyhow::anyhow!("empty synthesized module: {src}")))
    }

    fn synthesize_expr(&self, src: &str) -> Result<Expr, BundlerErr> {
        let full = format!("const __bundled_expr__ = {src};");
        let (_, module) = bundle_analyzer::js::parse_module("synthetic.js", &full)?;
        if let Some(ModuleItem::Stmt(Stmt::Decl(Decl::Var(v)))) = module.body.into_iter().next() {
            if let Some(d) = v.decls.into_iter().next() {
                if let Some(init) = d.init {
                    return Ok(*init);
                }
            }
        }
        Err(BundlerErr::malformed_document(anyhow::anyhow!(
            "failed to synthesize expression: {src}"
        )))
    }

    /// Processes one module's own item list: strips `export` from every
    /// declaration (renaming its binding to the name `nameFor` chose),
    /// inlines or retargets every import, rewrites dynamic `import()`
    /// targets, and appends a namespace object literal standing in for the
    /// module's exports. Same-bundle dependencies are merged depth-first
    /// into `prelude` so they land before their first use.
    fn process_items(
        &self,
        items: &mut Vec<ModuleItem>,
        module_base_url: &ResolvedUrl,
        bundle_url: &ResolvedUrl,
        bundle: &mut Bundle,
        merged: &mut AHashSet<ResolvedUrl>,
        prelude: &mut Vec<ModuleItem>,
    ) -> Result<Vec<ModuleItem>, BundlerErr> {
        let mut rename: AHashMap<String, String> = AHashMap::default();
        let mut kept: Vec<ModuleItem> = Vec::with_capacity(items.len());
        let mut exports: Vec<(String, String)> = Vec::new();

        for item in items.drain(..) {
            match item {
                ModuleItem::ModuleDecl(ModuleDecl::Import(import)) => {
                    self.handle_import(import, module_base_url, bundle_url, bundle, merged, prelude, &mut rename, &mut kept)?;
                }
                ModuleItem::ModuleDecl(ModuleDecl::ExportDecl(export)) => match export.decl {
                    Decl::Class(c) => {
                        let original = c.ident.sym.to_string();
                        let target = self.resolve_name(bundle_url, module_base_url, &original, bundle);
                        rename.insert(original.clone(), target.clone());
                        exports.push((original, target));
                        kept.push(ModuleItem::Stmt(Stmt::Decl(Decl::Class(c))));
                    }
                    Decl::Fn(f) => {
                        let original = f.ident.sym.to_string();
                        let target = self.resolve_name(bundle_url, module_base_url, &original, bundle);
                        rename.insert(original.clone(), target.clone());
                        exports.push((original, target));
                        kept.push(ModuleItem::Stmt(Stmt::Decl(Decl::Fn(f))));
                    }
                    Decl::Var(v) => {
                        for d in &v.decls {
                            if let Pat::Ident(b) = &d.name {
                                let original = b.id.sym.to_string();
                                let target = self.resolve_name(bundle_url, module_base_url, &original, bundle);
                                rename.insert(original.clone(), target.clone());
                                exports.push((original, target));
                            }
                        }
                        kept.push(ModuleItem::Stmt(Stmt::Decl(Decl::Var(v))));
                    }
                    other => kept.push(ModuleItem::Stmt(Stmt::Decl(other))),
                },
                ModuleItem::ModuleDecl(ModuleDecl::ExportDefaultDecl(export)) => {
                    let target = self.resolve_name(bundle_url, module_base_url, "default", bundle);
                    let expr = match export.decl {
                        DefaultDecl::Class(c) => {
                            if let Some(ident) = &c.ident {
                                rename.insert(ident.sym.to_string(), target.clone());
                            }
                            Expr::Class(c)
                        }
                        DefaultDecl::Fn(f) => {
                            if let Some(ident) = &f.ident {
                                rename.insert(ident.sym.to_string(), target.clone());
                            }
                            Expr::Fn(f)
                        }
                        DefaultDecl::TsInterfaceDecl(_) => continue,
                    };
                    let binding = self.fresh_binding(&target)?;
                    exports.push(("default".to_string(), target));
                    kept.push(ModuleItem::Stmt(Stmt::Decl(Decl::Var(Box::new(VarDecl {
                        span: swc_common::DUMMY_SP,
                        kind: VarDeclKind::Const,
                        declare: false,
                        decls: vec![VarDeclarator {
                            span: swc_common::DUMMY_SP,
                            name: Pat::Ident(binding),
                            init: Some(Box::new(expr)),
                            definite: false,
                        }],
                    }))));
                }
                ModuleItem::ModuleDecl(ModuleDecl::ExportDefaultExpr(export)) => {
                    let target = self.resolve_name(bundle_url, module_base_url, "default", bundle);
                    let binding = self.fresh_binding(&target)?;
                    exports.push(("default".to_string(), target));
                    kept.push(ModuleItem::Stmt(Stmt::Decl(Decl::Var(Box::new(VarDecl {
                        span: swc_common::DUMMY_SP,
                        kind: VarDeclKind::Const,
                        declare: false,
                        decls: vec![VarDeclarator {
                            span: swc_common::DUMMY_SP,
                            name: Pat::Ident(binding),
                            init: Some(export.expr),
                            definite: false,
                        }],
                    }))));
                }
                ModuleItem::ModuleDecl(ModuleDecl::ExportNamed(named)) if named.src.is_none() => {
                    for spec in named.specifiers {
                        if let swc_ecma_ast::ExportSpecifier::Named(n) = spec {
                            let orig = names::module_export_name_str(&n.orig);
                            let exported_name = n
                                .exported
                                .as_ref()
                                .map(names::module_export_name_str)
                                .unwrap_or_else(|| orig.clone());
                            let target = self.resolve_name(bundle_url, module_base_url, &exported_name, bundle);
                            rename.insert(orig, target.clone());
                            exports.push((exported_name, target));
                        }
                    }
                }
                ModuleItem::ModuleDecl(ModuleDecl::ExportNamed(named)) => {
                    // `export { x } from './y'`: only resolvable within the
                    // same bundle, where `y` is merged like a normal import
                    // and its already-chosen names are simply forwarded.
                    let specifier = named.src.as_ref().unwrap().value.to_string();
                    let resolved = self.resolver.resolve(module_base_url, &specifier);
                    let dest = resolved.as_ref().and_then(|r| self.manifest.bundle_for_file(r));
                    if let (Some(r), Some((dest_bundle_url, _))) = (&resolved, dest) {
                        if dest_bundle_url == bundle_url {
                            if merged.insert(r.clone()) {
                                let source = self.read(r)?;
                                let (_, mut sub_module) = bundle_analyzer::js::parse_module(r.as_str(), &source)?;
                                let sub_body =
                                    self.process_items(&mut sub_module.body, r, bundle_url, bundle, merged, prelude)?;
                                prelude.extend(sub_body);
                            }
                            for spec in named.specifiers {
                                if let swc_ecma_ast::ExportSpecifier::Named(n) = spec {
                                    let orig = names::module_export_name_str(&n.orig);
                                    let exported_name = n
                                        .exported
                                        .as_ref()
                                        .map(names::module_export_name_str)
                                        .unwrap_or_else(|| orig.clone());
                                    if let Some(target) = self.names.get(bundle_url, r, &orig) {
                                        exports.push((exported_name, target.to_string()));
                                    }
                                }
                            }
                        }
                    }
                }
                ModuleItem::ModuleDecl(ModuleDecl::ExportAll(export)) => {
                    let specifier = export.src.value.to_string();
                    let resolved = self.resolver.resolve(module_base_url, &specifier);
                    let dest = resolved.as_ref().and_then(|r| self.manifest.bundle_for_file(r));
                    if let (Some(r), Some((dest_bundle_url, _))) = (&resolved, dest) {
                        if dest_bundle_url == bundle_url && merged.insert(r.clone()) {
                            let source = self.read(r)?;
                            let (_, mut sub_module) = bundle_analyzer::js::parse_module(r.as_str(), &source)?;
                            let sub_body = self.process_items(&mut sub_module.body, r, bundle_url, bundle, merged, prelude)?;
                            prelude.extend(sub_body);
                        }
                    }
                    // re-exported names aren't forwarded into this module's
                    // own namespace object (see the crate-level docs).
                }
                ModuleItem::Stmt(stmt) => kept.push(ModuleItem::Stmt(stmt)),
                other @ ModuleItem::ModuleDecl(_) => kept.push(other),
            }
        }

        kept.visit_mut_with(&mut RenameIdents { map: &rename });
        let mut dynamic_rewriter = DynamicImportRewriter {
            bundler: self,
            base: module_base_url,
            bundle_url,
        };
        kept.visit_mut_with(&mut dynamic_rewriter);

        let ns_name = self.resolve_name(bundle_url, module_base_url, "*", bundle);
        kept.push(self.build_namespace_const(&ns_name, &exports)?);

        Ok(kept)
    }

    fn build_namespace_const(&self, name: &str, exports: &[(String, String)]) -> Result<ModuleItem, BundlerErr> {
        let props: Vec<String> = exports
            .iter()
            .map(|(k, v)| format!("{}: {v}", prop_key(k)))
            .collect();
        let src = format!("const {name} = {{ {} }};", props.join(", "));
        self.synthesize_item(&src)
    }

    fn handle_import(
        &self,
        import: ImportDecl,
        module_base_url: &ResolvedUrl,
        bundle_url: &ResolvedUrl,
        bundle: &mut Bundle,
        merged: &mut AHashSet<ResolvedUrl>,
        prelude: &mut Vec<ModuleItem>,
        rename: &mut AHashMap<String, String>,
        kept: &mut Vec<ModuleItem>,
    ) -> Result<(), BundlerErr> {
        let specifier = import.src.value.to_string();
        let resolved = self.resolver.resolve(module_base_url, &specifier);
        let dest = resolved.as_ref().and_then(|r| self.manifest.bundle_for_file(r));

        match (&resolved, dest) {
            (Some(r), Some((dest_bundle_url, _))) if dest_bundle_url == bundle_url => {
                if merged.insert(r.clone()) {
                    let source = self.read(r)?;
                    let (_, mut sub_module) = bundle_analyzer::js::parse_module(r.as_str(), &source)?;
                    let sub_body = self.process_items(&mut sub_module.body, r, bundle_url, bundle, merged, prelude)?;
                    prelude.extend(sub_body);
                }
                for spec in import.specifiers {
                    match spec {
                        ImportSpecifier::Named(named) => {
                            let imported_name = named
                                .imported
                                .as_ref()
                                .map(names::module_export_name_str)
                                .unwrap_or_else(|| named.local.sym.to_string());
                            let target = self.resolve_name(bundle_url, r, &imported_name, bundle);
                            rename.insert(named.local.sym.to_string(), target);
                        }
                        ImportSpecifier::Default(d) => {
                            let target = self.resolve_name(bundle_url, r, "default", bundle);
                            rename.insert(d.local.sym.to_string(), target);
                        }
                        ImportSpecifier::Namespace(n) => {
                            let target = self.resolve_name(bundle_url, r, "*", bundle);
                            rename.insert(n.local.sym.to_string(), target);
                        }
                    }
                }
            }
            (Some(r), dest) => {
                let target_bundle_url = dest.map(|(b, _)| b.clone());
                let target_url = target_bundle_url.clone().unwrap_or_else(|| r.clone());
                let new_path = relative_specifier(self.resolver, bundle_url, &target_url);
                for spec in import.specifiers {
                    let (imported_name, local_sym, keyword) = match &spec {
                        ImportSpecifier::Named(n) => (
                            n.imported
                                .as_ref()
                                .map(names::module_export_name_str)
                                .unwrap_or_else(|| n.local.sym.to_string()),
                            n.local.sym.to_string(),
                            "named",
                        ),
                        ImportSpecifier::Default(d) => ("default".to_string(), d.local.sym.to_string(), "default"),
                        ImportSpecifier::Namespace(n) => ("*".to_string(), n.local.sym.to_string(), "namespace"),
                    };
                    let target_name = target_bundle_url
                        .as_ref()
                        .and_then(|b| self.names.get(b, r, &imported_name))
                        .map(|s| s.to_string())
                        .unwrap_or_else(|| imported_name.clone());
                    rename.insert(local_sym, target_name.clone());

                    let literal = format!("{new_path:?}");
                    let item_src = match keyword {
                        "default" => format!("import {target_name} from {literal};"),
                        "namespace" => format!("import * as {target_name} from {literal};"),
                        _ => format!("import {{ {target_name} }} from {literal};"),
                    };
                    kept.push(self.synthesize_item(&item_src)?);
                }
            }
            (None, _) => {
                kept.push(ModuleItem::ModuleDecl(ModuleDecl::Import(import)));
            }
        }
        Ok(())
    }
}

fn prop_key(k: &str) -> String {
    let is_plain_ident = !k.is_empty()
        && k.chars().next().is_some_and(|c| c.is_ascii_alphabetic() || c == '_' || c == '$')
        && k.chars().all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '$');
    if is_plain_ident {
        k.to_string()
    } else {
        format!("{k:?}")
    }
}

fn relative_specifier(resolver: &dyn UrlResolver, from: &ResolvedUrl, to: &ResolvedUrl) -> String {
    let rel = resolver.relative(from, to);
    if rel.starts_with('.') {
        rel
    } else {
        format!("./{rel}")
    }
}

/// Merges consecutive-or-not import declarations sharing the same source
/// into one declaration (§4.4 "declaration dedup"), preserving first-seen
/// position.
fn dedupe_imports(items: &mut Vec<ModuleItem>) {
    let mut first_index: AHashMap<String, usize> = AHashMap::default();
    let mut result: Vec<ModuleItem> = Vec::with_capacity(items.len());
    for item in items.drain(..) {
        if let ModuleItem::ModuleDecl(ModuleDecl::Import(mut import)) = item {
            let key = import.src.value.to_string();
            if let Some(&idx) = first_index.get(&key) {
                if let ModuleItem::ModuleDecl(ModuleDecl::Import(existing)) = &mut result[idx] {
                    existing.specifiers.append(&mut import.specifiers);
                    continue;
                }
            }
            first_index.insert(key, result.len());
            result.push(ModuleItem::ModuleDecl(ModuleDecl::Import(import)));
        } else {
            result.push(item);
        }
    }
    *items = result;
}

struct RenameIdents<'a> {
    map: &'a AHashMap<String, String>,
}

impl VisitMut for RenameIdents<'_> {
    fn visit_mut_ident(&mut self, ident: &mut swc_ecma_ast::Ident) {
        if let Some(new_name) = self.map.get(ident.sym.as_str()) {
            ident.sym = new_name.clone().into();
        }
    }
}

struct DynamicImportRewriter<'a, 'b> {
    bundler: &'a JsBundler<'b>,
    base: &'a ResolvedUrl,
    bundle_url: &'a ResolvedUrl,
}

impl VisitMut for DynamicImportRewriter<'_, '_> {
    fn visit_mut_expr(&mut self, expr: &mut Expr) {
        expr.visit_mut_children_with(self);

        let Expr::Call(call) = expr else { return };
        if !matches!(call.callee, Callee::Import(_)) {
            return;
        }
        let Some(specifier) = first_call_string_arg(call) else { return };

        let resolved = self.bundler.resolver.resolve(self.base, &specifier);
        let dest = resolved.as_ref().and_then(|r| self.bundler.manifest.bundle_for_file(r));

        let target_url = match (&resolved, &dest) {
            (Some(r), Some((b, _))) => (*b).clone(),
            (Some(r), None) => r.clone(),
            (None, _) => return,
        };
        let new_specifier = relative_specifier(self.bundler.resolver, self.bundle_url, &target_url);
        let literal = format!("{new_specifier:?}");

        let snippet = match (&resolved, &dest) {
            (Some(r), Some((b, _))) => match self.bundler.names.get(b, r, "*") {
                Some(ns) => format!("import({literal}).then(({{ {ns} }}) => {ns})"),
                None => format!("import({literal})"),
            },
            _ => format!("import({literal})"),
        };

        if let Ok(new_expr) = self.bundler.synthesize_expr(&snippet) {
            *expr = new_expr;
        }
    }
}

fn first_call_string_arg(call: &CallExpr) -> Option<String> {
    let arg = call.args.first()?;
    match arg.expr.as_lit()? {
        Lit::Str(s) => Some(s.value.to_string()),
        _ => None,
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use bundle_url::FsUrlResolver;
    use pretty_assertions::assert_eq;

    struct FakeLoader(AHashMap<String, String>);
    impl UrlLoader for FakeLoader {
        fn load(&self, url: &ResolvedUrl) -> Result<Vec<u8>, BundlerErr> {
            self.0
                .get(url.as_str())
                .map(|s| s.clone().into_bytes())
                .ok_or_else(|| BundlerErr::io(anyhow::anyhow!("no such file: {url}")))
        }
    }

    fn basis_manifest(bundle_url: &str, files: &[&str]) -> BundleManifest {
        let url = ResolvedUrl::new(bundle_url);
        let mut bundle = Bundle {
            files: files.iter().map(|f| ResolvedUrl::new(*f)).collect(),
            ..Default::default()
        };
        bundle.entrypoints.insert(url.clone());
        let mut bundles = AHashMap::default();
        bundles.insert(url, bundle);
        let mut manifest = BundleManifest::default();
        manifest.bundles = bundles;
        manifest.file_to_bundle = manifest
            .bundles
            .iter()
            .flat_map(|(b, bundle)| bundle.files.iter().map(move |f| (f.clone(), b.clone())))
            .collect();
        manifest
    }

    #[test]
    fn same_bundle_named_import_is_inlined_and_renamed() {
        let mut manifest = basis_manifest("a.js", &["a.js", "b.js"]);
        let loader = FakeLoader(
            [
                ("a.js".to_string(), "import { value } from './b.js';\nconsole.log(value);".to_string()),
                ("b.js".to_string(), "export const value = 1;".to_string()),
            ]
            .into_iter()
            .collect(),
        );
        let resolver = FsUrlResolver;
        let names = ExportNames::build(&mut manifest, &loader).unwrap();
        let bundler = JsBundler {
            manifest: &manifest,
            resolver: &resolver,
            loader: &loader,
            names: &names,
        };
        let bundle_url = ResolvedUrl::new("a.js");
        let mut bundle = manifest.bundles[&bundle_url].clone();
        let output = bundler.bundle_file(&bundle_url, &mut bundle).unwrap();

        assert!(!output.contains("import"));
        assert!(output.contains("console.log"));
    }

    #[test]
    fn dynamic_import_of_same_bundle_module_is_wrapped_with_then() {
        let mut manifest = basis_manifest("a.js", &["a.js", "b.js"]);
        let loader = FakeLoader(
            [
                ("a.js".to_string(), "import('./b.js').then(m => m.value);".to_string()),
                ("b.js".to_string(), "export const value = 1;".to_string()),
            ]
            .into_iter()
            .collect(),
        );
        let resolver = FsUrlResolver;
        let names = ExportNames::build(&mut manifest, &loader).unwrap();
        let bundler = JsBundler {
            manifest: &manifest,
            resolver: &resolver,
            loader: &loader,
            names: &names,
        };
        let bundle_url = ResolvedUrl::new("a.js");
        let mut bundle = manifest.bundles[&bundle_url].clone();
        let output = bundler.bundle_file(&bundle_url, &mut bundle).unwrap();

        assert!(output.contains(".then"));
    }
}
