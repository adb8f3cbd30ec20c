//! The Bundle/BundleManifest data model (§3) and the manifest generator
//! (§4.2): maximal-sharding partitioning, the `SharedDepsMerge`/`ShellMerge`
//! post-processing strategies, exclude-prefix filtering, and the default
//! URL mapper.

use ahashmap::{AHashMap, AHashSet};
use bundle_url::ResolvedUrl;
use bundler_err::BundlerErr;
use dep_index::TransitiveDepsMap;

/// One bundle's membership plus the bookkeeping a rewriter accumulates
/// while producing its output. `entrypoints` and `files` are the partition
/// data; the remaining sets are written by `html_bundler`/`js_bundler`, not
/// by the manifest generator.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Bundle {
    pub entrypoints: AHashSet<ResolvedUrl>,
    pub files: AHashSet<ResolvedUrl>,
    pub inlined_html_imports: AHashSet<ResolvedUrl>,
    pub inlined_scripts: AHashSet<ResolvedUrl>,
    pub inlined_styles: AHashSet<ResolvedUrl>,
    pub strip_imports: AHashSet<ResolvedUrl>,
    pub missing_imports: AHashSet<ResolvedUrl>,
    /// Export names already claimed in this bundle, across every source
    /// module rewritten into it so far. Consulted and extended by
    /// `js_bundler::nameFor`'s collision resolution.
    pub bundled_exports: AHashSet<String>,
}

impl Bundle {
    /// True for a "basis" bundle: one of its own files is also one of its
    /// entrypoints, i.e. it's named after that file rather than a generated
    /// `shared_bundle_N` name.
    pub fn basis_entrypoint(&self) -> Option<&ResolvedUrl> {
        let mut candidates: Vec<&ResolvedUrl> = self
            .entrypoints
            .iter()
            .filter(|e| self.files.contains(*e))
            .collect();
        candidates.sort();
        candidates.into_iter().next()
    }
}

/// Mapping bundleUrl → Bundle, plus the reverse index fileUrl → bundleUrl
/// that rewriters consult to find a dependency's destination bundle.
#[derive(Debug, Clone, Default)]
pub struct BundleManifest {
    pub bundles: AHashMap<ResolvedUrl, Bundle>,
    pub file_to_bundle: AHashMap<ResolvedUrl, ResolvedUrl>,
}

impl BundleManifest {
    /// Builds a manifest directly from an already-named bundle set. Public
    /// so an orchestrator can drive the §4.2 pipeline manually (e.g. to run
    /// `shell_merge`, which is fallible and so doesn't fit the `strategy:
    /// Vec<Bundle> -> Vec<Bundle>` shape `generate_manifest` expects).
    pub fn from_bundles(bundles: AHashMap<ResolvedUrl, Bundle>) -> Self {
        let mut file_to_bundle = AHashMap::default();
        for (bundle_url, bundle) in &bundles {
            for file in &bundle.files {
                file_to_bundle.insert(file.clone(), bundle_url.clone());
            }
        }
        Self {
            bundles,
            file_to_bundle,
        }
    }

    /// Deep copy, safe for an independent rewrite pass to mutate without
    /// affecting a snapshot held elsewhere (every field here is owned, so
    /// `Clone` already gives the required semantics).
    pub fn fork(&self) -> Self {
        self.clone()
    }

    pub fn bundle_for_file(&self, file: &ResolvedUrl) -> Option<(&ResolvedUrl, &Bundle)> {
        let bundle_url = self.file_to_bundle.get(file)?;
        self.bundles.get(bundle_url).map(|b| (bundle_url, b))
    }
}

/// §4.2 "maximal-sharding": groups files by the exact set of entrypoints
/// that reach them. Files grouped in sorted order of their own URL, so that
/// bundle creation order (and thus indices used for tie-breaking by later
/// strategies) is deterministic across runs.
pub fn maximal_sharding(deps: &TransitiveDepsMap) -> Vec<Bundle> {
    let inverted = dep_index::invert(deps);

    let mut files_in_order: Vec<ResolvedUrl> = inverted.keys().cloned().collect();
    files_in_order.sort();

    let mut group_index: AHashMap<Vec<ResolvedUrl>, usize> = AHashMap::default();
    let mut groups: Vec<(Vec<ResolvedUrl>, AHashSet<ResolvedUrl>)> = Vec::new();

    for file in files_in_order {
        let mut entrypoints: Vec<ResolvedUrl> = inverted[&file].iter().cloned().collect();
        entrypoints.sort();
        let idx = *group_index.entry(entrypoints.clone()).or_insert_with(|| {
            groups.push((entrypoints.clone(), AHashSet::default()));
            groups.len() - 1
        });
        groups[idx].1.insert(file);
    }

    groups
        .into_iter()
        .map(|(entrypoints, files)| Bundle {
            entrypoints: entrypoints.into_iter().collect(),
            files,
            ..Default::default()
        })
        .collect()
}

/// Removes every excluded file from each bundle's `files`, then drops
/// bundles left with an empty `files` set. Applied once, before any
/// strategy runs (§4.2 "Excludes").
pub fn filter_excludes(bundles: Vec<Bundle>, excludes: &[ResolvedUrl]) -> Vec<Bundle> {
    bundles
        .into_iter()
        .filter_map(|mut bundle| {
            bundle
                .files
                .retain(|f| !excludes.iter().any(|e| f.is_or_is_under(e)));
            if bundle.files.is_empty() {
                None
            } else {
                Some(bundle)
            }
        })
        .collect()
}

fn shared_deps_merge_tracked(
    bundles: Vec<Bundle>,
    min_entrypoints: usize,
) -> (Vec<Bundle>, Option<usize>) {
    let all_entrypoints: AHashSet<ResolvedUrl> = bundles
        .iter()
        .flat_map(|b| b.entrypoints.iter().cloned())
        .collect();

    let mut rest = Vec::new();
    let mut shared: Option<Bundle> = None;
    for bundle in bundles {
        let is_shared =
            bundle.entrypoints.len() >= min_entrypoints || bundle.entrypoints == all_entrypoints;
        if is_shared {
            let acc = shared.get_or_insert_with(Bundle::default);
            acc.entrypoints.extend(bundle.entrypoints);
            acc.files.extend(bundle.files);
        } else {
            rest.push(bundle);
        }
    }
    let shared_idx = shared.map(|b| {
        rest.push(b);
        rest.len() - 1
    });
    (rest, shared_idx)
}

/// Merges every bundle whose entrypoint count is `>= min_entrypoints` (or
/// whose entrypoints cover the whole entrypoint set) into one shared
/// bundle; bundles below the threshold are left untouched.
pub fn shared_deps_merge(bundles: Vec<Bundle>, min_entrypoints: usize) -> Vec<Bundle> {
    shared_deps_merge_tracked(bundles, min_entrypoints).0
}

/// `SharedDepsMerge(min_entrypoints)` followed by folding the resulting
/// shared bundle into the bundle containing `shell_file`.
pub fn shell_merge(
    bundles: Vec<Bundle>,
    shell_file: &ResolvedUrl,
    min_entrypoints: usize,
) -> Result<Vec<Bundle>, BundlerErr> {
    let (mut bundles, shared_idx) = shared_deps_merge_tracked(bundles, min_entrypoints);

    let shell_idx = bundles
        .iter()
        .position(|b| b.files.contains(shell_file))
        .ok_or_else(|| {
            BundlerErr::configuration(anyhow::anyhow!(
                "shell file {shell_file} is not present in any bundle"
            ))
        })?;

    if let Some(shared_idx) = shared_idx {
        if shared_idx != shell_idx {
            let hi = shared_idx.max(shell_idx);
            let lo = shared_idx.min(shell_idx);
            let removed = bundles.remove(hi);
            bundles[lo].entrypoints.extend(removed.entrypoints);
            bundles[lo].files.extend(removed.files);
        }
    }

    Ok(bundles)
}

/// Default strategy: `SharedDepsMerge(2)`.
pub fn default_strategy(bundles: Vec<Bundle>) -> Vec<Bundle> {
    shared_deps_merge(bundles, 2)
}

/// Default URL mapper: a basis bundle is named after its basis entrypoint;
/// everything else gets a generated `shared_bundle_<n>` name, numbered in
/// the order bundles are given, with the extension inferred from the
/// lexicographically-first file in the bundle.
pub fn default_url_mapper(bundles: Vec<Bundle>) -> AHashMap<ResolvedUrl, Bundle> {
    let mut result = AHashMap::default();
    let mut shared_counter = 0usize;
    for bundle in bundles {
        let url = match bundle.basis_entrypoint().cloned() {
            Some(basis_url) => basis_url,
            None => {
                shared_counter += 1;
                let ext = infer_extension(&bundle.files);
                ResolvedUrl::new(format!("shared_bundle_{shared_counter}.{ext}"))
            }
        };
        result.insert(url, bundle);
    }
    result
}

fn infer_extension(files: &AHashSet<ResolvedUrl>) -> &'static str {
    let mut sorted: Vec<&ResolvedUrl> = files.iter().collect();
    sorted.sort();
    match sorted.first() {
        Some(f) if f.is_js() => "js",
        _ => "html",
    }
}

/// Drives §4.1's output through §4.2 end to end: partition, filter
/// excludes, apply `strategy`, then name bundles with `url_mapper`.
pub fn generate_manifest(
    deps: &TransitiveDepsMap,
    excludes: &[ResolvedUrl],
    strategy: &dyn Fn(Vec<Bundle>) -> Vec<Bundle>,
    url_mapper: &dyn Fn(Vec<Bundle>) -> AHashMap<ResolvedUrl, Bundle>,
) -> BundleManifest {
    let bundles = maximal_sharding(deps);
    let bundles = filter_excludes(bundles, excludes);
    let bundles = strategy(bundles);
    BundleManifest::from_bundles(url_mapper(bundles))
}

#[cfg(test)]
mod test {
    use super::*;
    use pretty_assertions::assert_eq;

    fn url(s: &str) -> ResolvedUrl {
        ResolvedUrl::new(s)
    }

    fn deps_map(pairs: &[(&str, &[&str])]) -> TransitiveDepsMap {
        pairs
            .iter()
            .map(|(entry, files)| {
                (
                    url(entry),
                    files.iter().map(|f| url(f)).collect::<AHashSet<_>>(),
                )
            })
            .collect()
    }

    fn files_of<'a>(bundles: &'a [Bundle], entry: &ResolvedUrl) -> Option<&'a AHashSet<ResolvedUrl>> {
        bundles
            .iter()
            .find(|b| b.entrypoints.len() == 1 && b.entrypoints.contains(entry))
            .map(|b| &b.files)
    }

    #[test]
    fn maximal_sharding_groups_files_by_reaching_entrypoint_set() {
        let deps = deps_map(&[
            ("a", &["a", "b", "c", "g"]),
            ("d", &["d", "b", "e"]),
            ("f", &["f", "g"]),
        ]);
        let bundles = maximal_sharding(&deps);

        // partitioning totality + disjointness (invariants 1 & 2)
        let mut all_files: Vec<ResolvedUrl> = bundles.iter().flat_map(|b| b.files.iter().cloned()).collect();
        all_files.sort();
        let mut expected: Vec<ResolvedUrl> = deps.values().flat_map(|s| s.iter().cloned()).collect();
        expected.sort();
        expected.dedup();
        all_files.dedup();
        assert_eq!(all_files, expected);

        let shared_b = bundles
            .iter()
            .find(|b| b.files.contains(&url("b")))
            .unwrap();
        assert_eq!(
            shared_b.entrypoints,
            [url("a"), url("d")].into_iter().collect()
        );

        let shared_g = bundles
            .iter()
            .find(|b| b.files.contains(&url("g")))
            .unwrap();
        assert_eq!(
            shared_g.entrypoints,
            [url("a"), url("f")].into_iter().collect()
        );
    }

    #[test]
    fn shared_deps_merge_combines_wide_bundles_only() {
        let deps = deps_map(&[
            ("a", &["a", "b", "c", "g"]),
            ("d", &["d", "b", "e"]),
            ("f", &["f", "g"]),
        ]);
        let bundles = maximal_sharding(&deps);
        let merged = shared_deps_merge(bundles, 2);

        // [b] and [g] are each reached by 2 entrypoints -> merged into one bundle.
        let shared = merged
            .iter()
            .find(|b| b.files.contains(&url("b")))
            .unwrap();
        assert!(shared.files.contains(&url("g")));
        assert_eq!(
            shared.entrypoints,
            [url("a"), url("d"), url("f")].into_iter().collect()
        );

        assert!(files_of(&merged, &url("a")).unwrap().contains(&url("c")));
        assert!(files_of(&merged, &url("d")).unwrap().contains(&url("e")));
        assert!(files_of(&merged, &url("f")).is_some());
    }

    #[test]
    fn shell_merge_folds_shared_bundle_into_shell() {
        let deps = deps_map(&[("a", &["a", "shared_dep"]), ("b", &["b", "shared_dep"])]);
        let bundles = maximal_sharding(&deps);
        let merged = shell_merge(bundles, &url("a"), 2).unwrap();

        let shell_bundle = merged
            .iter()
            .find(|b| b.files.contains(&url("a")))
            .unwrap();
        assert!(shell_bundle.files.contains(&url("shared_dep")));
    }

    #[test]
    fn shell_merge_errors_when_shell_file_absent() {
        let deps = deps_map(&[("a", &["a"])]);
        let bundles = maximal_sharding(&deps);
        let result = shell_merge(bundles, &url("missing"), 2);
        assert!(result.is_err());
    }

    #[test]
    fn excludes_drop_matching_files_and_empty_bundles() {
        let deps = deps_map(&[("a", &["a", "vendor/lib.js"])]);
        let bundles = maximal_sharding(&deps);
        let filtered = filter_excludes(bundles, &[url("vendor")]);
        assert_eq!(filtered.len(), 1);
        assert!(!filtered[0].files.contains(&url("vendor/lib.js")));
    }

    #[test]
    fn default_url_mapper_names_basis_bundles_by_entrypoint() {
        let deps = deps_map(&[("a.html", &["a.html", "c.html"])]);
        let bundles = maximal_sharding(&deps);
        let named = default_url_mapper(bundles);
        assert!(named.contains_key(&url("a.html")));
    }

    #[test]
    fn fork_is_independent_of_original() {
        let deps = deps_map(&[("a", &["a", "b"])]);
        let manifest = generate_manifest(&deps, &[], &default_strategy, &default_url_mapper);
        let mut forked = manifest.fork();
        for bundle in forked.bundles.values_mut() {
            bundle.missing_imports.insert(url("x"));
        }
        assert!(manifest
            .bundles
            .values()
            .all(|b| b.missing_imports.is_empty()));
    }
}
