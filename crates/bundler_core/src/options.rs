//! `BundlerOptions` (§10.4): the Rust analogue of the teacher's
//! `UnusedFinderJSONConfig` → `UnusedFinderConfig` split. The JSON-facing
//! struct carries only the keys from §6 that are representable in JSON;
//! the strategy/url-mapper closures are Rust-only and always take their
//! defaults through `TryFrom`.

use ahashmap::AHashMap;
use bundle_manifest::{default_strategy, default_url_mapper, Bundle};
use bundle_url::ResolvedUrl;
use bundler_err::BundlerErr;
use serde::Deserialize;

fn default_true() -> bool {
    true
}

/// JSON-serializable proxy for [`BundlerOptions`], mirroring the teacher's
/// `UnusedFinderJSONConfig` (used to deserialize a `--manifest-out`-style
/// config file or an napi-bridged options object).
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BundlerJSONOptions {
    #[serde(default)]
    pub excludes: Vec<String>,
    #[serde(default = "default_true")]
    pub inline_scripts: bool,
    #[serde(default = "default_true")]
    pub inline_css: bool,
    #[serde(default)]
    pub rewrite_urls_in_templates: bool,
    #[serde(default)]
    pub strip_comments: bool,
    #[serde(default)]
    pub sourcemaps: bool,
}

impl Default for BundlerJSONOptions {
    fn default() -> Self {
        Self {
            excludes: Vec::new(),
            inline_scripts: true,
            inline_css: true,
            rewrite_urls_in_templates: false,
            strip_comments: false,
            sourcemaps: false,
        }
    }
}

/// Runtime options for [`crate::Bundler`]. Holds the resolved `excludes`
/// list plus the `strategy`/`url_mapper` function-typed fields as boxed
/// `Fn` trait objects (§9 "Pluggable strategy and url-mapper"), the same
/// shape the teacher gives closures on its config structs.
pub struct BundlerOptions {
    pub excludes: Vec<ResolvedUrl>,
    pub inline_scripts: bool,
    pub inline_css: bool,
    pub rewrite_urls_in_templates: bool,
    pub strip_comments: bool,
    /// Accepted for config-shape parity with §6; per-inline-script source
    /// map emission itself is not implemented by `html_bundler`.
    pub sourcemaps: bool,
    pub strategy: Box<dyn Fn(Vec<Bundle>) -> Vec<Bundle> + Send + Sync>,
    pub url_mapper: Box<dyn Fn(Vec<Bundle>) -> AHashMap<ResolvedUrl, Bundle> + Send + Sync>,
}

impl std::fmt::Debug for BundlerOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BundlerOptions")
            .field("excludes", &self.excludes)
            .field("inline_scripts", &self.inline_scripts)
            .field("inline_css", &self.inline_css)
            .field("rewrite_urls_in_templates", &self.rewrite_urls_in_templates)
            .field("strip_comments", &self.strip_comments)
            .field("sourcemaps", &self.sourcemaps)
            .field("strategy", &"<fn>")
            .field("url_mapper", &"<fn>")
            .finish()
    }
}

impl Default for BundlerOptions {
    fn default() -> Self {
        Self {
            excludes: Vec::new(),
            inline_scripts: true,
            inline_css: true,
            rewrite_urls_in_templates: false,
            strip_comments: false,
            sourcemaps: false,
            strategy: Box::new(default_strategy),
            url_mapper: Box::new(default_url_mapper),
        }
    }
}

/// Infallible today — `excludes` are plain URL prefixes, not globs, so
/// nothing here can fail to parse. Kept as `TryFrom` (rather than `From`)
/// for shape parity with the teacher's config conversion, and because a
/// future exclude syntax richer than prefix-matching would need it.
impl TryFrom<BundlerJSONOptions> for BundlerOptions {
    type Error = BundlerErr;

    fn try_from(value: BundlerJSONOptions) -> Result<Self, Self::Error> {
        Ok(Self {
            excludes: value.excludes.into_iter().map(ResolvedUrl::new).collect(),
            inline_scripts: value.inline_scripts,
            inline_css: value.inline_css,
            rewrite_urls_in_templates: value.rewrite_urls_in_templates,
            strip_comments: value.strip_comments,
            sourcemaps: value.sourcemaps,
            ..Default::default()
        })
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn json_options_default_inline_flags_to_true() {
        let json: BundlerJSONOptions = serde_json::from_str("{}").unwrap();
        assert!(json.inline_scripts);
        assert!(json.inline_css);
        assert!(!json.strip_comments);
    }

    #[test]
    fn try_from_carries_excludes_through_as_resolved_urls() {
        let json = BundlerJSONOptions {
            excludes: vec!["vendor".to_string()],
            ..BundlerJSONOptions::default()
        };
        let opts = BundlerOptions::try_from(json).unwrap();
        assert_eq!(opts.excludes, vec![ResolvedUrl::new("vendor")]);
    }
}
