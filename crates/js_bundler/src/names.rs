//! `nameFor`: picks a collision-free, deterministic export name for a
//! module's binding once it is merged into a bundle's single top-level
//! scope. Names are decided for every bundle up front, in a fixed traversal
//! order, before any rewriting starts — the per-bundle rewrite pass that
//! follows only reads from the resulting table, so two bundles merging
//! concurrently never contend over the same name.

use ahashmap::AHashMap;
use bundle_manifest::BundleManifest;
use bundle_url::{ResolvedUrl, UrlLoader};
use bundler_err::BundlerErr;
use swc_ecma_ast::{Decl, ExportSpecifier, Module, ModuleDecl, ModuleExportName, ModuleItem};

/// `(bundle, module, original-export-name) -> chosen-name`, plus the set of
/// names already claimed in each bundle (mirrors `Bundle::bundled_exports`,
/// which is updated in lockstep as each name is picked).
#[derive(Debug, Default)]
pub struct ExportNames {
    names: AHashMap<(ResolvedUrl, ResolvedUrl, String), String>,
}

impl ExportNames {
    /// Walks every JS file in every bundle, in bundle-url then file-url
    /// order, assigning a name to each exported symbol plus a `"*"` entry
    /// standing for the module's namespace object (always reserved, since a
    /// dynamic `import()` or `import * as` of the module may need it even
    /// when nothing else does — tree-shaking is out of scope here).
    pub fn build(manifest: &mut BundleManifest, loader: &dyn UrlLoader) -> Result<Self, BundlerErr> {
        let mut table = ExportNames::default();

        let mut bundle_urls: Vec<ResolvedUrl> = manifest.bundles.keys().cloned().collect();
        bundle_urls.sort();

        for bundle_url in bundle_urls {
            let mut files: Vec<ResolvedUrl> = manifest.bundles[&bundle_url]
                .files
                .iter()
                .filter(|f| f.is_js())
                .cloned()
                .collect();
            files.sort();

            for file in files {
                let preserve = file == bundle_url
                    && manifest.bundles[&bundle_url].basis_entrypoint() == Some(&bundle_url);

                // a missing or unparsable file has nothing to export; its
                // absence is tracked separately in `Bundle::missing_imports`.
                let exported = loader
                    .load(&file)
                    .ok()
                    .and_then(|bytes| String::from_utf8(bytes).ok())
                    .and_then(|text| bundle_analyzer::js::parse_module(file.as_str(), &text).ok())
                    .map(|(_, module)| collect_export_names(&module))
                    .unwrap_or_default();

                let bundle = manifest.bundles.get_mut(&bundle_url).unwrap();
                for original in exported.iter().chain(std::iter::once(&"*".to_string())) {
                    table.assign(&bundle_url, bundle, &file, original, preserve);
                }
            }
        }

        Ok(table)
    }

    fn assign(
        &mut self,
        bundle_url: &ResolvedUrl,
        bundle: &mut bundle_manifest::Bundle,
        module: &ResolvedUrl,
        original: &str,
        preserve: bool,
    ) -> String {
        let key = (bundle_url.clone(), module.clone(), original.to_string());
        if let Some(existing) = self.names.get(&key) {
            return existing.clone();
        }

        let base = if preserve {
            original.to_string()
        } else {
            sanitize(original)
        };

        let claimed: std::collections::HashSet<&str> =
            bundle.bundled_exports.iter().map(|s| s.as_str()).collect();
        let chosen = dedupe(&base, &claimed);
        bundle.bundled_exports.insert(chosen.clone());
        self.names.insert(key, chosen.clone());
        chosen
    }

    pub fn get(&self, bundle_url: &ResolvedUrl, module: &ResolvedUrl, original: &str) -> Option<&str> {
        self.names
            .get(&(bundle_url.clone(), module.clone(), original.to_string()))
            .map(|s| s.as_str())
    }
}

/// Used by the rewrite pass for module identities the precompute pass never
/// saw (an inline `<script type="module">`'s body isn't a file on disk, so
/// it has no entry in [`ExportNames`] until something inside it is actually
/// exported and looked up).
pub(crate) fn reserve(bundle: &mut bundle_manifest::Bundle, original: &str, preserve: bool) -> String {
    let base = if preserve {
        original.to_string()
    } else {
        sanitize(original)
    };
    let claimed: std::collections::HashSet<&str> =
        bundle.bundled_exports.iter().map(|s| s.as_str()).collect();
    let chosen = dedupe(&base, &claimed);
    bundle.bundled_exports.insert(chosen.clone());
    chosen
}

fn sanitize(original: &str) -> String {
    match original {
        "default" => "$default".to_string(),
        "*" => "$all".to_string(),
        _ => original
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() || c == '_' { c } else { '$' })
            .collect(),
    }
}

fn dedupe(base: &str, claimed: &std::collections::HashSet<&str>) -> String {
    if !claimed.contains(base) {
        return base.to_string();
    }
    let mut n = 1usize;
    loop {
        let candidate = format!("{base}${n}");
        if !claimed.contains(candidate.as_str()) {
            return candidate;
        }
        n += 1;
    }
}

/// Top-level export bindings a module declares directly (re-exports via
/// `export ... from` are treated as declaring the re-exported name too,
/// since from the bundle's point of view this module is still the facade
/// other modules import it through).
fn collect_export_names(module: &Module) -> Vec<String> {
    let mut names = Vec::new();
    for item in &module.body {
        let ModuleItem::ModuleDecl(decl) = item else {
            continue;
        };
        match decl {
            ModuleDecl::ExportDecl(export) => match &export.decl {
                Decl::Class(c) => names.push(c.ident.sym.to_string()),
                Decl::Fn(f) => names.push(f.ident.sym.to_string()),
                Decl::Var(v) => {
                    for d in &v.decls {
                        collect_pat_names(&d.name, &mut names);
                    }
                }
                _ => {}
            },
            ModuleDecl::ExportDefaultDecl(_) | ModuleDecl::ExportDefaultExpr(_) => {
                names.push("default".to_string());
            }
            ModuleDecl::ExportNamed(named) => {
                for spec in &named.specifiers {
                    if let ExportSpecifier::Named(n) = spec {
                        let exported = n.exported.as_ref().unwrap_or(&n.orig);
                        names.push(module_export_name_str(exported));
                    }
                }
            }
            _ => {}
        }
    }
    names
}

fn collect_pat_names(pat: &swc_ecma_ast::Pat, out: &mut Vec<String>) {
    if let swc_ecma_ast::Pat::Ident(binding) = pat {
        out.push(binding.id.sym.to_string());
    }
}

pub(crate) fn module_export_name_str(name: &ModuleExportName) -> String {
    match name {
        ModuleExportName::Ident(i) => i.sym.to_string(),
        ModuleExportName::Str(s) => s.value.to_string(),
    }
}
