//! Parses HTML documents and ES module sources and enumerates the typed
//! imports they contain, without knowing anything about bundle manifests or
//! URL resolution — the dependency-index builder overlays resolution on top
//! of this layer's raw specifiers.

pub mod html;
pub mod js;

use bundle_url::ResolvedUrl;
use bundler_err::BundlerErr;

pub use html::*;
pub use js::{collect_imports, referenced_specifiers, ImportKind, JsImport};

/// One specifier discovered in a document, before resolution against a
/// [`bundle_url::UrlResolver`]. `lazy` marks specifiers that must not pull
/// their target into the same bundle as the referencing document: a
/// `<link rel="lazy-import">` or a dynamic `import()`.
#[derive(Debug, Clone)]
pub struct Dependency {
    pub specifier: String,
    pub lazy: bool,
}

/// Everything a document references that the dependency-index builder and
/// the bundlers need to know about.
#[derive(Debug, Clone, Default)]
pub struct DocumentFeatures {
    pub dependencies: Vec<Dependency>,
}

/// Pluggable front end over the two document kinds the bundler understands.
/// `bundler_core` is generic over this trait so tests can substitute a fake
/// analyzer without touching real HTML/JS parsers.
pub trait DocumentAnalyzer: Send + Sync {
    fn analyze(&self, url: &ResolvedUrl, source: &[u8]) -> Result<DocumentFeatures, BundlerErr>;
}

/// Default [`DocumentAnalyzer`]: dispatches on [`ResolvedUrl::is_html`] /
/// [`ResolvedUrl::is_js`] and delegates to the `html`/`js` modules. CSS
/// documents have no dependencies of their own in this pipeline (there is no
/// `@import` support; see the CSS non-goal) and get an empty feature set.
#[derive(Debug, Default, Clone, Copy)]
pub struct StdAnalyzer;

impl DocumentAnalyzer for StdAnalyzer {
    fn analyze(&self, url: &ResolvedUrl, source: &[u8]) -> Result<DocumentFeatures, BundlerErr> {
        if url.is_html() {
            let text = std::str::from_utf8(source)
                .map_err(|e| BundlerErr::malformed_document(anyhow::anyhow!("{url}: {e}")))?;
            let dom = html::parse_document_str(url.as_str(), text)?;
            Ok(DocumentFeatures {
                dependencies: html_dependencies(&dom.document),
            })
        } else if url.is_js() {
            let text = std::str::from_utf8(source)
                .map_err(|e| BundlerErr::malformed_document(anyhow::anyhow!("{url}: {e}")))?;
            let (_, module) = js::parse_module(url.as_str(), text)?;
            Ok(DocumentFeatures {
                dependencies: js::collect_imports(&module)
                    .into_iter()
                    .map(|i| Dependency {
                        specifier: i.specifier,
                        lazy: matches!(i.kind, js::ImportKind::Dynamic),
                    })
                    .collect(),
            })
        } else {
            Ok(DocumentFeatures::default())
        }
    }
}

/// Enumerates every `<link rel="import">`/`rel="lazy-import">` href,
/// `<script src>`, and `<link rel="stylesheet">` href in `root`, in document
/// order.
fn html_dependencies(root: &markup5ever_rcdom::Handle) -> Vec<Dependency> {
    let mut nodes = Vec::new();
    html::walk_all(root, &mut nodes);

    nodes
        .iter()
        .filter_map(|node| {
            if html::is_element(node, "link") {
                let rel = html::get_attr(node, "rel").unwrap_or_default();
                let href = html::get_attr(node, "href")?;
                match rel.as_str() {
                    "import" => Some(Dependency {
                        specifier: href,
                        lazy: false,
                    }),
                    "lazy-import" => Some(Dependency {
                        specifier: href,
                        lazy: true,
                    }),
                    "stylesheet" => Some(Dependency {
                        specifier: href,
                        lazy: false,
                    }),
                    _ => None,
                }
            } else if html::is_element(node, "script") {
                html::get_attr(node, "src").map(|src| Dependency {
                    specifier: src,
                    lazy: false,
                })
            } else {
                None
            }
        })
        .collect()
}

#[cfg(test)]
mod test {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn analyzes_html_imports_and_scripts() {
        let analyzer = StdAnalyzer;
        let url = ResolvedUrl::new("index.html");
        let source = br#"
            <html><head>
                <link rel="import" href="components/app.html">
                <link rel="lazy-import" href="components/modal.html">
                <script src="main.js"></script>
            </head><body></body></html>
        "#;
        let features = analyzer.analyze(&url, source).unwrap();
        let specifiers: Vec<_> = features
            .dependencies
            .iter()
            .map(|d| d.specifier.as_str())
            .collect();
        assert_eq!(
            specifiers,
            vec!["components/app.html", "components/modal.html", "main.js"]
        );
        assert!(!features.dependencies[0].lazy);
        assert!(features.dependencies[1].lazy);
    }

    #[test]
    fn analyzes_js_imports() {
        let analyzer = StdAnalyzer;
        let url = ResolvedUrl::new("main.js");
        let source = b"import './a.js'; const m = import('./b.js');";
        let features = analyzer.analyze(&url, source).unwrap();
        assert_eq!(features.dependencies.len(), 2);
        assert!(features.dependencies[1].lazy);
    }

    #[test]
    fn css_has_no_dependencies() {
        let analyzer = StdAnalyzer;
        let url = ResolvedUrl::new("style.css");
        let features = analyzer.analyze(&url, b"body { color: red; }").unwrap();
        assert!(features.dependencies.is_empty());
    }
}
