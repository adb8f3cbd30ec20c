//! The URL model consumed by the rest of the bundling pipeline: an opaque,
//! canonical [`ResolvedUrl`] identity, the `resolve`/`relative` resolver
//! interface, and the `load` loader interface, plus filesystem-backed
//! default implementations of both.
//!
//! Every `ResolvedUrl` is a forward-slashed, `..`-free path relative to a
//! project root (there is no `scheme://host` component anywhere in this
//! pipeline — documents are always reached through an injected loader, per
//! the non-goal on HTTP fetching). Two `ResolvedUrl`s are equal iff their
//! underlying strings are byte-equal.

use std::path::{Path, PathBuf};

use abspath::join_abspath;
use bundler_err::BundlerErr;
use path_clean::PathClean;
use path_slash::{PathBufExt, PathExt};
use serde::{Deserialize, Serialize};

/// Canonical, opaque identity for a resource reachable from the bundler's
/// root. See the module docs for the equality/representation contract.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ResolvedUrl(String);

impl ResolvedUrl {
    pub fn new(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn extension(&self) -> Option<&str> {
        Path::new(&self.0).extension().and_then(|e| e.to_str())
    }

    pub fn is_html(&self) -> bool {
        matches!(self.extension(), Some("html" | "htm"))
    }

    pub fn is_js(&self) -> bool {
        matches!(self.extension(), Some("js" | "mjs"))
    }

    pub fn is_css(&self) -> bool {
        matches!(self.extension(), Some("css"))
    }

    /// True if `self == other`, or `self` sits inside the `other` folder
    /// (`other` followed by a `/`). Used by manifest exclude-prefix
    /// filtering, where a configured exclude may name either a single file
    /// or a folder.
    pub fn is_or_is_under(&self, other: &ResolvedUrl) -> bool {
        self == other || self.0.starts_with(&format!("{}/", other.0))
    }
}

impl std::fmt::Display for ResolvedUrl {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for ResolvedUrl {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// True for any specifier the resolver/rewriter must leave untouched:
/// absolute URLs, data URIs, and templated placeholders
/// (`{{…}}`/`[[…]]`, used by data-binding templates in the HTML bundler).
pub fn is_opaque(spec: &str) -> bool {
    is_absolute(spec) || is_data_uri(spec) || is_templated(spec)
}

pub fn is_absolute(spec: &str) -> bool {
    spec.starts_with('/') || spec.contains("://")
}

pub fn is_data_uri(spec: &str) -> bool {
    spec.starts_with("data:")
}

pub fn is_templated(spec: &str) -> bool {
    spec.contains("{{") || spec.contains("[[")
}

fn dirname(url: &str) -> &str {
    match url.rfind('/') {
        Some(idx) => &url[..idx],
        None => "",
    }
}

/// The resolver interface the core consumes: `resolve(base, relative)` and
/// `relative(from, to)`. Implementations never need to touch the
/// filesystem; [`FsUrlResolver`] operates purely on path string algebra.
pub trait UrlResolver: Send + Sync {
    /// Resolve `relative` against `base`. Returns `None` if `relative` is
    /// opaque (callers should check [`is_opaque`] first and skip the call
    /// entirely in that case) or if the resolved path would escape the
    /// project root.
    fn resolve(&self, base: &ResolvedUrl, relative: &str) -> Option<ResolvedUrl>;

    /// Compute `to` expressed as a path relative to `from`'s directory.
    /// Does not add a leading `./`; callers that need one (e.g. specifier
    /// rewriting in the JS bundler) add it themselves.
    fn relative(&self, from: &ResolvedUrl, to: &ResolvedUrl) -> String;
}

/// The loader interface the core consumes: `load(url) -> bytes`.
pub trait UrlLoader: Send + Sync {
    fn load(&self, url: &ResolvedUrl) -> Result<Vec<u8>, BundlerErr>;
}

/// Default [`UrlResolver`] for a project rooted at a single directory.
/// `ResolvedUrl`s are always root-relative, so this resolver never touches
/// disk; it's pure path-string algebra, same as `abspath`/`path_utils`.
#[derive(Debug, Default, Clone, Copy)]
pub struct FsUrlResolver;

impl UrlResolver for FsUrlResolver {
    fn resolve(&self, base: &ResolvedUrl, relative: &str) -> Option<ResolvedUrl> {
        if is_opaque(relative) {
            return None;
        }
        let base_dir = dirname(base.as_str());
        let joined = Path::new(base_dir).join(relative).clean();
        let slashed = joined.to_slash()?.to_string();
        if slashed == ".." || slashed.starts_with("../") {
            // escapes the project root
            return None;
        }
        Some(ResolvedUrl::new(slashed))
    }

    fn relative(&self, from: &ResolvedUrl, to: &ResolvedUrl) -> String {
        let from_dir = dirname(from.as_str());
        let diffed = pathdiff::diff_paths(to.as_str(), from_dir)
            .unwrap_or_else(|| PathBuf::from(to.as_str()));
        diffed
            .to_slash()
            .map(|s| s.to_string())
            .unwrap_or_else(|| to.as_str().to_string())
    }
}

/// Default [`UrlLoader`]: reads files relative to a fixed root directory.
#[derive(Debug, Clone)]
pub struct FsLoader {
    root: PathBuf,
}

impl FsLoader {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

impl UrlLoader for FsLoader {
    fn load(&self, url: &ResolvedUrl) -> Result<Vec<u8>, BundlerErr> {
        let path = join_abspath(&self.root, url.as_str()).map_err(BundlerErr::io)?;
        let bytes = std::fs::read(&path)
            .map_err(|e| BundlerErr::io(anyhow::anyhow!("failed to read {}: {e}", path.display())))?;
        Ok(bytes)
    }
}
