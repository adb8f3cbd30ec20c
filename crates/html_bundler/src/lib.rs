//! Per-bundle HTML document rewriter: produces one serialized document
//! equivalent, in observable behavior, to loading the bundle's entrypoint
//! plus its eager transitive closure restricted to the bundle's own files.
//!
//! Works directly on a `markup5ever_rcdom` tree rather than through an
//! intermediate AST/re-analyze cycle: every step below mutates the same
//! live DOM in place, so there is nothing to re-parse between steps.

use ahashmap::AHashSet;
use bundle_analyzer::html;
use bundle_manifest::{Bundle, BundleManifest};
use bundle_url::{ResolvedUrl, UrlLoader, UrlResolver};
use bundler_err::BundlerErr;
use js_bundler::JsBundler;
use markup5ever_rcdom::{Handle, RcDom};

const HIDDEN_CONTAINER_MARKER: &str = "by-polymer-bundler";

#[derive(Debug, Clone)]
pub struct HtmlBundlerOptions {
    pub inline_scripts: bool,
    pub inline_css: bool,
    pub rewrite_urls_in_templates: bool,
    pub strip_comments: bool,
}

impl Default for HtmlBundlerOptions {
    fn default() -> Self {
        Self {
            inline_scripts: true,
            inline_css: true,
            rewrite_urls_in_templates: false,
            strip_comments: false,
        }
    }
}

pub struct HtmlBundler<'a> {
    pub manifest: &'a BundleManifest,
    pub resolver: &'a dyn UrlResolver,
    pub loader: &'a dyn UrlLoader,
    /// Module rewriter used for step 7 (inline `<script type="module">`
    /// rollup). `None` leaves inline module scripts untouched.
    pub js: Option<&'a JsBundler<'a>>,
    pub options: HtmlBundlerOptions,
}

impl<'a> HtmlBundler<'a> {
    pub fn bundle_document(&self, bundle_url: &ResolvedUrl, bundle: &mut Bundle) -> Result<String, BundlerErr> {
        let dom = self.prepare_document(bundle_url, bundle)?;

        self.apply_base_tag_emulation(&dom.document, bundle_url);
        self.hoist_head_imports_into_hidden_container(&dom);
        self.inject_other_bundle_imports(&dom, bundle_url, bundle);
        self.inline_or_rewrite_import_links(&dom, bundle_url, bundle)?;
        self.rewrite_module_scripts(&dom, bundle_url);
        self.inline_scripts(&dom, bundle_url, bundle)?;
        self.rollup_inline_modules(&dom, bundle_url, bundle)?;
        self.inline_stylesheets(&dom, bundle_url, bundle)?;
        self.strip_comments(&dom);
        self.remove_empty_hidden_containers(&dom);

        Ok(html::serialize_document(&dom))
    }

    fn read(&self, url: &ResolvedUrl) -> Result<String, BundlerErr> {
        let bytes = self.loader.load(url)?;
        String::from_utf8(bytes).map_err(|e| BundlerErr::malformed_document(anyhow::anyhow!("{url}: {e}")))
    }

    /// Step 1 (load half). A basis bundle (named after one of its own
    /// files) starts from that file's parsed document; a generated shared
    /// bundle has no file of its own and starts empty.
    fn prepare_document(&self, bundle_url: &ResolvedUrl, bundle: &Bundle) -> Result<RcDom, BundlerErr> {
        let is_basis = bundle.files.contains(bundle_url) && bundle.basis_entrypoint() == Some(bundle_url);
        if is_basis {
            let source = self.read(bundle_url)?;
            html::parse_document_str(bundle_url.as_str(), &source)
        } else {
            html::parse_document_str(
                bundle_url.as_str(),
                "<!DOCTYPE html><html><head></head><body></body></html>",
            )
        }
    }

    /// Step 1 (hoist half). Moves head HTML-imports, plus everything that
    /// textually follows the first one (order-dependent imperatives), into
    /// the hidden container.
    fn hoist_head_imports_into_hidden_container(&self, dom: &RcDom) {
        let Some(head) = html::find_first(&dom.document, "head") else {
            return;
        };
        let children = head.children.borrow().clone();
        let Some(first_import_idx) = children.iter().position(is_html_import_link) else {
            return;
        };
        let to_move = &children[first_import_idx..];
        if to_move.is_empty() {
            return;
        }
        let container = self.hidden_container(dom);
        for child in to_move {
            html::append_child(&container, child.clone());
        }
    }

    /// Step 2. Injects a `<link rel="import">` for every other HTML file
    /// in the bundle, appended to the hidden container. The spec also asks
    /// for precedence-aware placement ahead of an already-present import
    /// that transitively depends on the injected file; this rewriter
    /// doesn't have that dependency graph in hand here, so it always
    /// appends — documented as a simplification in DESIGN.md.
    fn inject_other_bundle_imports(&self, dom: &RcDom, bundle_url: &ResolvedUrl, bundle: &Bundle) {
        let mut others: Vec<&ResolvedUrl> = bundle
            .files
            .iter()
            .filter(|f| f.is_html() && *f != bundle_url)
            .collect();
        others.sort();
        if others.is_empty() {
            return;
        }
        let container = self.hidden_container(dom);
        for f in others {
            let href = self.resolver.relative(bundle_url, f);
            let link = html::new_element("link", vec![("rel", "import".to_string()), ("href", href)]);
            html::append_child(&container, link);
        }
    }

    fn hidden_container(&self, dom: &RcDom) -> Handle {
        if let Some(existing) = find_hidden_container(&dom.document) {
            return existing;
        }
        let container = html::new_element(
            "div",
            vec![("hidden", String::new()), (HIDDEN_CONTAINER_MARKER, String::new())],
        );
        let body = html::find_first(&dom.document, "body").expect("prepare_document always produces <body>");
        let anchor = body.children.borrow().iter().find(|c| is_html_import_link(c)).cloned();
        match anchor {
            Some(a) => html::insert_after(&a, container.clone()),
            None => html::prepend_child(&body, container.clone()),
        }
        container
    }

    /// Step 3-4. Repeatedly finds the next not-yet-processed import link
    /// and inlines/rewrites/drops it per its destination; newly inlined
    /// subtrees fall back into the same scan on the next pass, which is
    /// the recursion the spec describes.
    fn inline_or_rewrite_import_links(&self, dom: &RcDom, bundle_url: &ResolvedUrl, bundle: &mut Bundle) -> Result<(), BundlerErr> {
        loop {
            let Some(link) = find_import_links(&dom.document)
                .into_iter()
                .find(|l| !html::has_attr(l, "data-bundler-seen"))
            else {
                break;
            };
            html::set_attr(&link, "data-bundler-seen", "1");

            let rel = html::get_attr(&link, "rel").unwrap_or_default();
            let Some(href) = html::get_attr(&link, "href") else {
                continue;
            };
            if bundle_url::is_opaque(&href) {
                continue;
            }
            let Some(target) = self.resolver.resolve(bundle_url, &href) else {
                continue;
            };

            if rel == "lazy-import" {
                if let Some((dest_bundle, _)) = self.manifest.bundle_for_file(&target) {
                    if dest_bundle != bundle_url {
                        html::set_attr(&link, "href", &self.resolver.relative(bundle_url, dest_bundle));
                    }
                }
                continue;
            }

            if target == *bundle_url {
                html::detach(&link);
                continue;
            }

            match self.manifest.bundle_for_file(&target) {
                Some((dest_bundle, _)) if dest_bundle == bundle_url => {
                    if !bundle.inlined_html_imports.insert(target.clone()) {
                        html::detach(&link);
                        continue;
                    }
                    let source = self.read(&target)?;
                    let fragment = html::parse_fragment_str(target.as_str(), &source)?;
                    let wrapper = html::new_element("div", vec![]);
                    for node in fragment {
                        html::append_child(&wrapper, node);
                    }
                    self.apply_base_tag_emulation(&wrapper, &target);
                    rewrite_urls_in_subtree(
                        std::slice::from_ref(&wrapper),
                        &target,
                        bundle_url,
                        self.resolver,
                        self.options.rewrite_urls_in_templates,
                    );
                    let children: Vec<Handle> = wrapper.children.borrow().clone();
                    for c in &children {
                        html::detach(c);
                    }
                    html::replace_with_many(&link, children);
                }
                Some((dest_bundle, _)) => {
                    if !bundle.strip_imports.insert(dest_bundle.clone()) {
                        html::detach(&link);
                    } else {
                        html::set_attr(&link, "href", &self.resolver.relative(bundle_url, dest_bundle));
                    }
                }
                None => {
                    bundle.missing_imports.insert(target);
                }
            }
        }

        for link in find_import_links(&dom.document) {
            html::remove_attr(&link, "data-bundler-seen");
        }
        Ok(())
    }

    /// Step 5.
    fn rewrite_module_scripts(&self, dom: &RcDom, bundle_url: &ResolvedUrl) {
        for script in html::find_all(&dom.document, "script") {
            if html::get_attr(&script, "type").as_deref() != Some("module") {
                continue;
            }
            let Some(src) = html::get_attr(&script, "src") else {
                continue;
            };
            if bundle_url::is_opaque(&src) {
                continue;
            }
            let Some(resolved) = self.resolver.resolve(bundle_url, &src) else {
                continue;
            };
            if let Some((dest_bundle, _)) = self.manifest.bundle_for_file(&resolved) {
                html::set_attr(&script, "src", &self.resolver.relative(bundle_url, dest_bundle));
            }
        }
    }

    /// Step 6.
    fn inline_scripts(&self, dom: &RcDom, bundle_url: &ResolvedUrl, bundle: &mut Bundle) -> Result<(), BundlerErr> {
        if !self.options.inline_scripts {
            return Ok(());
        }
        for script in html::find_all(&dom.document, "script") {
            if html::get_attr(&script, "type").as_deref() == Some("module") {
                continue;
            }
            let Some(src) = html::get_attr(&script, "src") else {
                continue;
            };
            if bundle_url::is_opaque(&src) {
                continue;
            }
            let Some(resolved) = self.resolver.resolve(bundle_url, &src) else {
                continue;
            };
            match self.read(&resolved) {
                Ok(contents) => {
                    html::remove_attr(&script, "src");
                    html::set_text_of(&script, &escape_close_script(&contents));
                    bundle.inlined_scripts.insert(resolved);
                }
                Err(_) => {
                    bundle.missing_imports.insert(resolved);
                }
            }
        }
        Ok(())
    }

    /// Step 7.
    fn rollup_inline_modules(&self, dom: &RcDom, bundle_url: &ResolvedUrl, bundle: &mut Bundle) -> Result<(), BundlerErr> {
        let Some(js) = self.js else {
            return Ok(());
        };
        for script in html::find_all(&dom.document, "script") {
            if html::get_attr(&script, "type").as_deref() != Some("module") {
                continue;
            }
            if html::has_attr(&script, "src") {
                continue;
            }
            let source = html::text_of(&script);
            if source.trim().is_empty() {
                continue;
            }
            let rewritten = js.rewrite_inline_module(bundle_url, bundle_url, &source, bundle)?;
            html::set_text_of(&script, &escape_close_script(&rewritten));
        }
        Ok(())
    }

    /// Step 8.
    fn inline_stylesheets(&self, dom: &RcDom, bundle_url: &ResolvedUrl, bundle: &mut Bundle) -> Result<(), BundlerErr> {
        if !self.options.inline_css {
            return Ok(());
        }
        for link in html::find_all(&dom.document, "link") {
            let rel = html::get_attr(&link, "rel").unwrap_or_default();
            let is_css_import = rel == "import" && html::get_attr(&link, "type").as_deref() == Some("css");
            if rel != "stylesheet" && !is_css_import {
                continue;
            }
            let Some(href) = html::get_attr(&link, "href") else {
                continue;
            };
            if bundle_url::is_opaque(&href) {
                continue;
            }
            let Some(resolved) = self.resolver.resolve(bundle_url, &href) else {
                continue;
            };
            let contents = match self.read(&resolved) {
                Ok(c) => c,
                Err(_) => {
                    bundle.missing_imports.insert(resolved);
                    html::detach(&link);
                    continue;
                }
            };
            let rewritten_css = rewrite_css_urls(&contents, &resolved, bundle_url, self.resolver);
            let style = html::new_element("style", vec![]);
            if let Some(media) = html::get_attr(&link, "media") {
                html::set_attr(&style, "media", &media);
            }
            html::set_text_of(&style, &rewritten_css);

            if let Some(dom_module) = find_ancestor(&link, "dom-module") {
                let template = html::find_first(&dom_module, "template").unwrap_or_else(|| {
                    let t = html::new_element("template", vec![]);
                    html::append_child(&dom_module, t.clone());
                    t
                });
                let content = html::ensure_template_content(&template);
                html::detach(&link);
                html::append_child(&content, style);
            } else {
                html::replace_with_many(&link, vec![style]);
            }
            bundle.inlined_styles.insert(resolved);
        }
        Ok(())
    }

    /// Step 9.
    fn strip_comments(&self, dom: &RcDom) {
        if !self.options.strip_comments {
            return;
        }
        let mut all = Vec::new();
        html::walk_all(&dom.document, &mut all);

        let mut seen_licenses: AHashSet<String> = AHashSet::default();
        let mut license_comments: Vec<Handle> = Vec::new();

        for node in &all {
            if !html::is_comment(node) {
                continue;
            }
            let text = html::comment_text(node).unwrap_or_default();
            let trimmed = text.trim_start();
            if trimmed.starts_with("@license") {
                let normalized = text.split_whitespace().collect::<Vec<_>>().join(" ");
                if seen_licenses.insert(normalized) {
                    license_comments.push(node.clone());
                } else {
                    html::detach(node);
                }
            } else if trimmed.starts_with('!') || trimmed.starts_with('#') {
                // server-side-include directives and `<!--! ... -->` are left in place.
            } else {
                html::detach(node);
            }
        }

        if let Some(head) = html::find_first(&dom.document, "head") {
            for comment in license_comments.into_iter().rev() {
                html::detach(&comment);
                html::prepend_child(&head, comment);
            }
        }
    }

    /// Step 10.
    fn remove_empty_hidden_containers(&self, dom: &RcDom) {
        for div in html::find_all(&dom.document, "div") {
            if html::has_attr(&div, HIDDEN_CONTAINER_MARKER) && div.children.borrow().is_empty() {
                html::detach(&div);
            }
        }
    }

    /// Base-tag emulation, run against `root` (the whole document for the
    /// top-level pass, or a wrapper around a just-inlined fragment for its
    /// own embedded `<base>`).
    fn apply_base_tag_emulation(&self, root: &Handle, doc_url: &ResolvedUrl) {
        let Some(base) = html::find_first(root, "base") else {
            return;
        };
        let href = html::get_attr(&base, "href");
        let target = html::get_attr(&base, "target");
        html::detach(&base);

        if let Some(href) = href {
            if let Some(base_url) = self.resolver.resolve(doc_url, &href) {
                rewrite_urls_in_subtree(
                    std::slice::from_ref(root),
                    &base_url,
                    doc_url,
                    self.resolver,
                    self.options.rewrite_urls_in_templates,
                );
            }
        }

        if let Some(target) = target {
            for tag in ["a", "form"] {
                for el in html::find_all(root, tag) {
                    if !html::has_attr(&el, "target") {
                        html::set_attr(&el, "target", &target);
                    }
                }
            }
        }
    }
}

fn is_html_import_link(node: &Handle) -> bool {
    html::is_element(node, "link")
        && matches!(html::get_attr(node, "rel").as_deref(), Some("import") | Some("lazy-import"))
}

fn find_hidden_container(root: &Handle) -> Option<Handle> {
    let mut nodes = Vec::new();
    html::walk_all(root, &mut nodes);
    nodes
        .into_iter()
        .find(|n| html::is_element(n, "div") && html::has_attr(n, HIDDEN_CONTAINER_MARKER))
}

/// Eager and lazy import links, excluding the deprecated `rel="import"
/// type="css"` spelling (handled by stylesheet inlining instead).
fn find_import_links(root: &Handle) -> Vec<Handle> {
    let mut nodes = Vec::new();
    html::walk_all(root, &mut nodes);
    nodes
        .into_iter()
        .filter(|n| is_html_import_link(n) && html::get_attr(n, "type").as_deref() != Some("css"))
        .collect()
}

fn find_ancestor(node: &Handle, tag: &str) -> Option<Handle> {
    let mut current = html::parent_of(node);
    while let Some(n) = current {
        if html::is_element(&n, tag) {
            return Some(n);
        }
        current = html::parent_of(&n);
    }
    None
}

fn escape_close_script(source: &str) -> String {
    let re = regex::Regex::new(r"(?i)</script").expect("static pattern");
    re.replace_all(source, "<\\/script").to_string()
}

/// URL rewriting semantics (§4.3): recomputes `href`/`src`/`action`/
/// `assetpath`/`style` (plus `<style>` text) as
/// `relative(new_base, resolve(old_base, value))`, skipping templated
/// placeholders, data URIs, and absolute URLs. By default stops at
/// `<template>` boundaries; `rewrite_in_templates` descends into their
/// content fragment instead.
fn rewrite_urls_in_subtree(
    roots: &[Handle],
    old_base: &ResolvedUrl,
    new_base: &ResolvedUrl,
    resolver: &dyn UrlResolver,
    rewrite_in_templates: bool,
) {
    for root in roots {
        rewrite_urls_in_node(root, old_base, new_base, resolver, rewrite_in_templates);
    }
}

fn rewrite_urls_in_node(
    node: &Handle,
    old_base: &ResolvedUrl,
    new_base: &ResolvedUrl,
    resolver: &dyn UrlResolver,
    rewrite_in_templates: bool,
) {
    if html::is_element(node, "style") {
        let css = html::text_of(node);
        if !css.is_empty() {
            html::set_text_of(node, &rewrite_css_urls(&css, old_base, new_base, resolver));
        }
    }

    for attr in ["href", "src", "action", "assetpath"] {
        if let Some(value) = html::get_attr(node, attr) {
            let new_value = rewrite_url_value(&value, old_base, new_base, resolver, attr == "assetpath");
            html::set_attr(node, attr, &new_value);
        }
    }
    if let Some(style_attr) = html::get_attr(node, "style") {
        html::set_attr(node, "style", &rewrite_css_urls(&style_attr, old_base, new_base, resolver));
    }

    if html::is_element(node, "template") {
        if !rewrite_in_templates {
            return;
        }
        if let Some(content) = html::template_content(node) {
            for child in content.children.borrow().iter() {
                rewrite_urls_in_node(child, old_base, new_base, resolver, rewrite_in_templates);
            }
        }
        return;
    }

    for child in node.children.borrow().iter() {
        rewrite_urls_in_node(child, old_base, new_base, resolver, rewrite_in_templates);
    }
}

fn rewrite_url_value(
    value: &str,
    old_base: &ResolvedUrl,
    new_base: &ResolvedUrl,
    resolver: &dyn UrlResolver,
    is_assetpath: bool,
) -> String {
    if bundle_url::is_templated(value) || bundle_url::is_opaque(value) {
        return value.to_string();
    }
    let Some(resolved) = resolver.resolve(old_base, value) else {
        return value.to_string();
    };
    let mut rel = resolver.relative(new_base, &resolved);
    if is_assetpath && !rel.ends_with('/') {
        rel.push('/');
    }
    rel
}

fn rewrite_css_urls(css: &str, old_base: &ResolvedUrl, new_base: &ResolvedUrl, resolver: &dyn UrlResolver) -> String {
    let re = regex::Regex::new(r#"url\(\s*(['"]?)([^'")]+)\1\s*\)"#).expect("static pattern");
    re.replace_all(css, |caps: &regex::Captures| {
        let quote = &caps[1];
        let inner = &caps[2];
        if bundle_url::is_templated(inner) || bundle_url::is_opaque(inner) {
            return caps[0].to_string();
        }
        match resolver.resolve(old_base, inner) {
            Some(resolved) => format!("url({quote}{}{quote})", resolver.relative(new_base, &resolved)),
            None => caps[0].to_string(),
        }
    })
    .to_string()
}

#[cfg(test)]
mod test {
    use super::*;
    use ahashmap::AHashMap;
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
    fn same_bundle_import_is_inlined_and_link_removed() {
        let manifest = basis_manifest("index.html", &["index.html", "components/app.html"]);
        let loader = FakeLoader(
            [
                (
                    "index.html".to_string(),
                    r#"<!DOCTYPE html><html><head><link rel="import" href="components/app.html"></head><body></body></html>"#.to_string(),
                ),
                ("components/app.html".to_string(), "<p>hi</p>".to_string()),
            ]
            .into_iter()
            .collect(),
        );
        let resolver = FsUrlResolver;
        let bundler = HtmlBundler {
            manifest: &manifest,
            resolver: &resolver,
            loader: &loader,
            js: None,
            options: HtmlBundlerOptions::default(),
        };
        let bundle_url = ResolvedUrl::new("index.html");
        let mut bundle = manifest.bundles[&bundle_url].clone();
        let output = bundler.bundle_document(&bundle_url, &mut bundle).unwrap();

        assert!(!output.contains("link rel=\"import\""));
        assert!(output.contains("<p>hi</p>"));
        assert!(bundle.inlined_html_imports.contains(&ResolvedUrl::new("components/app.html")));
    }

    #[test]
    fn cross_bundle_import_is_rewritten_to_destination_url() {
        let mut manifest = basis_manifest("index.html", &["index.html"]);
        let other_url = ResolvedUrl::new("shared_bundle_1.html");
        let mut other_bundle = Bundle {
            files: [ResolvedUrl::new("components/app.html")].into_iter().collect(),
            ..Default::default()
        };
        other_bundle.entrypoints.insert(other_url.clone());
        manifest.bundles.insert(other_url.clone(), other_bundle);
        manifest
            .file_to_bundle
            .insert(ResolvedUrl::new("components/app.html"), other_url.clone());

        let loader = FakeLoader(
            [(
                "index.html".to_string(),
                r#"<!DOCTYPE html><html><head><link rel="import" href="components/app.html"></head><body></body></html>"#.to_string(),
            )]
            .into_iter()
            .collect(),
        );
        let resolver = FsUrlResolver;
        let bundler = HtmlBundler {
            manifest: &manifest,
            resolver: &resolver,
            loader: &loader,
            js: None,
            options: HtmlBundlerOptions::default(),
        };
        let bundle_url = ResolvedUrl::new("index.html");
        let mut bundle = manifest.bundles[&bundle_url].clone();
        let output = bundler.bundle_document(&bundle_url, &mut bundle).unwrap();

        assert!(output.contains("shared_bundle_1.html"));
        assert!(bundle.strip_imports.contains(&other_url));
    }

    #[test]
    fn missing_import_is_tracked_and_left_alone() {
        let manifest = basis_manifest("index.html", &["index.html"]);
        let loader = FakeLoader(
            [(
                "index.html".to_string(),
                r#"<!DOCTYPE html><html><head><link rel="import" href="ghost.html"></head><body></body></html>"#.to_string(),
            )]
            .into_iter()
            .collect(),
        );
        let resolver = FsUrlResolver;
        let bundler = HtmlBundler {
            manifest: &manifest,
            resolver: &resolver,
            loader: &loader,
            js: None,
            options: HtmlBundlerOptions::default(),
        };
        let bundle_url = ResolvedUrl::new("index.html");
        let mut bundle = manifest.bundles[&bundle_url].clone();
        bundler.bundle_document(&bundle_url, &mut bundle).unwrap();

        assert!(bundle.missing_imports.contains(&ResolvedUrl::new("ghost.html")));
    }

    #[test]
    fn non_license_comments_are_stripped_license_comments_deduped_to_head() {
        let manifest = basis_manifest("index.html", &["index.html"]);
        let loader = FakeLoader(
            [(
                "index.html".to_string(),
                r#"<!DOCTYPE html><html><head><!-- @license MIT --></head><body><!-- noise --><!-- @license MIT --><p>hi</p></body></html>"#.to_string(),
            )]
            .into_iter()
            .collect(),
        );
        let resolver = FsUrlResolver;
        let bundler = HtmlBundler {
            manifest: &manifest,
            resolver: &resolver,
            loader: &loader,
            js: None,
            options: HtmlBundlerOptions {
                strip_comments: true,
                ..HtmlBundlerOptions::default()
            },
        };
        let bundle_url = ResolvedUrl::new("index.html");
        let mut bundle = manifest.bundles[&bundle_url].clone();
        let output = bundler.bundle_document(&bundle_url, &mut bundle).unwrap();

        assert!(!output.contains("noise"));
        assert_eq!(output.matches("@license").count(), 1);
    }

    #[test]
    fn stylesheet_is_inlined_with_rewritten_urls() {
        let manifest = basis_manifest("components/app.html", &["components/app.html"]);
        let loader = FakeLoader(
            [
                (
                    "components/app.html".to_string(),
                    r#"<!DOCTYPE html><html><head><link rel="stylesheet" href="app.css"></head><body></body></html>"#.to_string(),
                ),
                (
                    "components/app.css".to_string(),
                    "body { background: url(bg.png); }".to_string(),
                ),
            ]
            .into_iter()
            .collect(),
        );
        let resolver = FsUrlResolver;
        let bundler = HtmlBundler {
            manifest: &manifest,
            resolver: &resolver,
            loader: &loader,
            js: None,
            options: HtmlBundlerOptions::default(),
        };
        let bundle_url = ResolvedUrl::new("components/app.html");
        let mut bundle = manifest.bundles[&bundle_url].clone();
        let output = bundler.bundle_document(&bundle_url, &mut bundle).unwrap();

        assert!(!output.contains("stylesheet"));
        assert!(output.contains("url(bg.png)"));
        assert!(bundle.inlined_styles.contains(&ResolvedUrl::new("components/app.css")));
    }
}
