//! Top-level orchestrator (§4.5): `generate_manifest` drives the
//! dependency-index builder and manifest generator; `bundle` forks the
//! manifest, builds the export-name table once sequentially, then fans out
//! over bundles with `rayon`, dispatching each to `html_bundler` or
//! `js_bundler` by inferred type.

mod options;
mod overlay;

pub use options::{BundlerJSONOptions, BundlerOptions};
pub use overlay::OverlayLoader;

use ahashmap::AHashMap;
use bundle_analyzer::DocumentAnalyzer;
use bundle_manifest::BundleManifest;
use bundle_url::{ResolvedUrl, UrlLoader, UrlResolver};
use bundler_err::BundlerErr;
use html_bundler::{HtmlBundler, HtmlBundlerOptions};
use js_bundler::{ExportNames, JsBundler};
use logger::Logger;
use multi_err::MultiErr;
use rayon::prelude::*;

/// Output for one bundle: its serialized content plus the files that ended
/// up inlined/concatenated into it.
#[derive(Debug, Clone)]
pub struct BundledDocument {
    pub content: String,
    pub files: Vec<ResolvedUrl>,
}

/// `bundle()`'s return value: `{manifest, documents}` from §6.
#[derive(Debug)]
pub struct BundledOutput {
    pub manifest: BundleManifest,
    pub documents: AHashMap<ResolvedUrl, BundledDocument>,
}

/// The public core API (§6): `Bundler(options)` exposing `generate_manifest`
/// and `bundle`. Borrows its collaborators rather than owning them, the way
/// `html_bundler::HtmlBundler`/`js_bundler::JsBundler` borrow theirs.
pub struct Bundler<'a> {
    pub resolver: &'a dyn UrlResolver,
    pub loader: &'a dyn UrlLoader,
    pub analyzer: &'a dyn DocumentAnalyzer,
    pub options: BundlerOptions,
}

impl<'a> Bundler<'a> {
    pub fn new(
        resolver: &'a dyn UrlResolver,
        loader: &'a dyn UrlLoader,
        analyzer: &'a dyn DocumentAnalyzer,
        options: BundlerOptions,
    ) -> Self {
        Self {
            resolver,
            loader,
            analyzer,
            options,
        }
    }

    /// Builds the §4.1 transitive-deps map for `entrypoints`, reporting any
    /// missing files to `logger` (non-fatal per §7).
    fn build_deps(
        &self,
        entrypoints: &[ResolvedUrl],
        logger: &impl Logger,
    ) -> Result<dep_index::TransitiveDepsMap, BundlerErr> {
        if entrypoints.is_empty() {
            return Err(BundlerErr::configuration(anyhow::anyhow!(
                "generate_manifest requires at least one entrypoint"
            )));
        }

        let (deps, missing) =
            dep_index::build_index(entrypoints, self.loader, self.resolver, self.analyzer);
        let missing: Vec<dep_index::MissingFile> = missing.into();
        for m in &missing {
            logger.warn(format!(
                "missing dependency {} referenced from {} (entrypoint {})",
                m.url, m.referenced_from, m.entrypoint
            ));
        }
        Ok(deps)
    }

    /// Drives §4.1 + §4.2: builds the transitive-deps map from `entrypoints`
    /// then partitions/merges/names it into a manifest using the configured
    /// `strategy`/`url_mapper`.
    pub fn generate_manifest(
        &self,
        entrypoints: &[ResolvedUrl],
        logger: impl Logger,
    ) -> Result<BundleManifest, BundlerErr> {
        let deps = self.build_deps(entrypoints, &logger)?;
        Ok(bundle_manifest::generate_manifest(
            &deps,
            &self.options.excludes,
            self.options.strategy.as_ref(),
            self.options.url_mapper.as_ref(),
        ))
    }

    /// Same as [`Self::generate_manifest`], but applies `ShellMerge(shell,
    /// k=2)` instead of the configured `strategy` (§4.2) — used by the CLI's
    /// `--shell` flag, whose "shell file not present in any bundle" failure
    /// is a Configuration error (§7) that doesn't fit the infallible
    /// `strategy: Vec<Bundle> -> Vec<Bundle>` shape.
    pub fn generate_manifest_with_shell(
        &self,
        entrypoints: &[ResolvedUrl],
        shell: &ResolvedUrl,
        logger: impl Logger,
    ) -> Result<BundleManifest, BundlerErr> {
        let deps = self.build_deps(entrypoints, &logger)?;
        let bundles = bundle_manifest::maximal_sharding(&deps);
        let bundles = bundle_manifest::filter_excludes(bundles, &self.options.excludes);
        let bundles = bundle_manifest::shell_merge(bundles, shell, 2)?;
        Ok(BundleManifest::from_bundles((self.options.url_mapper)(
            bundles,
        )))
    }

    /// Forks `manifest`, then for each bundle dispatches by inferred type
    /// (HTML or JS) to `html_bundler`/`js_bundler`, running bundles
    /// concurrently via `rayon` (§5: "scheduling bundles concurrently" is
    /// realized as a data-parallel fan-out, one `Bundle` per work item).
    ///
    /// `ExportNames::build` runs once, sequentially, before the fan-out
    /// starts: per §5 it is the one pass every concurrent rewriter reads
    /// from without writing to, so it must be fully populated first.
    pub fn bundle(
        &self,
        manifest: &BundleManifest,
        logger: impl Logger + Sync,
    ) -> Result<BundledOutput, BundlerErr> {
        let mut manifest = manifest.fork();
        let names = ExportNames::build(&mut manifest, self.loader)?;

        let mut bundle_urls: Vec<ResolvedUrl> = manifest.bundles.keys().cloned().collect();
        bundle_urls.sort();

        let html_options = HtmlBundlerOptions {
            inline_scripts: self.options.inline_scripts,
            inline_css: self.options.inline_css,
            rewrite_urls_in_templates: self.options.rewrite_urls_in_templates,
            strip_comments: self.options.strip_comments,
        };

        // Each work item gets its own OverlayLoader, so no mutable state
        // (the overlay map) crosses from one bundle's rewrite pass into
        // another's — the analyzer itself is stateless (StdAnalyzer) so a
        // shared reference already satisfies "fork the analyzer per bundle".
        let results: Vec<Result<(ResolvedUrl, bundle_manifest::Bundle, BundledDocument), BundlerErr>> =
            bundle_urls
                .par_iter()
                .map(|bundle_url| {
                    let overlay = OverlayLoader::new(self.loader);
                    let mut bundle = manifest.bundles[bundle_url].clone();

                    let content = if bundle_url.is_html() {
                        let js = JsBundler {
                            manifest: &manifest,
                            resolver: self.resolver,
                            loader: &overlay,
                            names: &names,
                        };
                        let html = HtmlBundler {
                            manifest: &manifest,
                            resolver: self.resolver,
                            loader: &overlay,
                            js: Some(&js),
                            options: html_options.clone(),
                        };
                        html.bundle_document(bundle_url, &mut bundle)?
                    } else if bundle_url.is_js() {
                        let js = JsBundler {
                            manifest: &manifest,
                            resolver: self.resolver,
                            loader: &overlay,
                            names: &names,
                        };
                        js.bundle_file(bundle_url, &mut bundle)?
                    } else {
                        // A basis bundle whose entrypoint is neither HTML nor
                        // JS (e.g. a lone CSS file) has nothing to rewrite;
                        // emit it unchanged.
                        let bytes = self.loader.load(bundle_url)?;
                        String::from_utf8(bytes).map_err(|e| {
                            BundlerErr::malformed_document(anyhow::anyhow!(
                                "{bundle_url}: {e}"
                            ))
                        })?
                    };

                    overlay.set(bundle_url.clone(), content.clone().into_bytes());

                    let mut files: Vec<ResolvedUrl> = bundle.files.iter().cloned().collect();
                    files.sort();
                    Ok((bundle_url.clone(), bundle, BundledDocument { content, files }))
                })
                .collect();

        let mut documents = AHashMap::default();
        let mut errs = MultiErr::new();
        for result in results {
            match result {
                Ok((bundle_url, bundle, document)) => {
                    let missing_count = bundle.missing_imports.len();
                    if missing_count > 0 {
                        logger.warn(format!(
                            "{bundle_url}: {missing_count} missing import(s)"
                        ));
                    }
                    manifest.bundles.insert(bundle_url.clone(), bundle);
                    documents.insert(bundle_url, document);
                }
                Err(e) => errs.add_single(e),
            }
        }

        // A malformed document is fatal (§7); the first one observed is
        // surfaced to the caller. Module-rewrite-conflict diagnostics never
        // reach here because `js_bundler`/`html_bundler` discard them
        // internally per §7's "suppressed at the core level".
        let errs: Vec<BundlerErr> = errs.into();
        if let Some(first) = errs.into_iter().next() {
            return Err(first);
        }

        Ok(BundledOutput { manifest, documents })
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use ahashmap::AHashMap as Map;
    use bundle_analyzer::StdAnalyzer;
    use bundle_url::FsUrlResolver;
    use logger::VecLogger;
    use pretty_assertions::assert_eq;
    use std::sync::Mutex;

    struct FakeLoader(Mutex<Map<String, Vec<u8>>>);
    impl FakeLoader {
        fn new(files: &[(&str, &str)]) -> Self {
            Self(Mutex::new(
                files
                    .iter()
                    .map(|(k, v)| (k.to_string(), v.as_bytes().to_vec()))
                    .collect(),
            ))
        }
    }
    impl UrlLoader for FakeLoader {
        fn load(&self, url: &ResolvedUrl) -> Result<Vec<u8>, BundlerErr> {
            self.0
                .lock()
                .unwrap()
                .get(url.as_str())
                .cloned()
                .ok_or_else(|| BundlerErr::io(anyhow::anyhow!("no such file: {url}")))
        }
    }

    #[test]
    fn end_to_end_inlines_an_html_import_and_reports_no_missing_files() {
        let loader = FakeLoader::new(&[
            (
                "index.html",
                r#"<!DOCTYPE html><html><head><link rel="import" href="app.html"></head><body></body></html>"#,
            ),
            ("app.html", "<p>hi</p>"),
        ]);
        let resolver = FsUrlResolver;
        let analyzer = StdAnalyzer;
        let bundler = Bundler::new(&resolver, &loader, &analyzer, BundlerOptions::default());
        let logger = VecLogger::new();

        let manifest = bundler
            .generate_manifest(&[ResolvedUrl::new("index.html")], &logger)
            .unwrap();
        let output = bundler.bundle(&manifest, &logger).unwrap();

        let doc = output.documents.get(&ResolvedUrl::new("index.html")).unwrap();
        assert!(doc.content.contains("<p>hi</p>"));
        assert!(!doc.content.contains("link rel=\"import\""));
        assert!(logger.get_logs().unwrap().is_empty());
    }

    #[test]
    fn end_to_end_reports_missing_dependency_without_failing() {
        let loader = FakeLoader::new(&[(
            "index.html",
            r#"<!DOCTYPE html><html><head><link rel="import" href="missing.html"></head><body></body></html>"#,
        )]);
        let resolver = FsUrlResolver;
        let analyzer = StdAnalyzer;
        let bundler = Bundler::new(&resolver, &loader, &analyzer, BundlerOptions::default());
        let logger = VecLogger::new();

        let manifest = bundler
            .generate_manifest(&[ResolvedUrl::new("index.html")], &logger)
            .unwrap();
        let output = bundler.bundle(&manifest, &logger).unwrap();

        let doc = output.documents.get(&ResolvedUrl::new("index.html")).unwrap();
        assert!(doc.content.contains("missing.html"));
        assert!(logger
            .get_logs()
            .unwrap()
            .iter()
            .any(|l| l.contains("missing.html")));
    }

    #[test]
    fn generate_manifest_rejects_empty_entrypoints() {
        let loader = FakeLoader::new(&[]);
        let resolver = FsUrlResolver;
        let analyzer = StdAnalyzer;
        let bundler = Bundler::new(&resolver, &loader, &analyzer, BundlerOptions::default());
        let logger = VecLogger::new();

        let result = bundler.generate_manifest(&[], &logger);
        assert_eq!(result.unwrap_err().kind(), bundler_err::Kind::Configuration);
    }
}
