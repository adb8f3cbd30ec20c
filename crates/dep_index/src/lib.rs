//! Builds the transitive dependency map (§4.1 of the bundling pipeline):
//! depth-first traversal from a set of entrypoints over *eager* imports
//! only, seeding a new entrypoint whenever a lazy import is encountered.
//!
//! Each file's outgoing edges are computed once and memoized — the split
//! between eager and lazy children is intrinsic to the file, not to which
//! entrypoint reached it — following the same "don't re-walk what's already
//! visited" discipline as a BFS import graph, just applied per-file instead
//! of per-(file, symbol).

use ahashmap::{AHashMap, AHashSet};
use bundle_analyzer::DocumentAnalyzer;
use bundle_url::{ResolvedUrl, UrlLoader, UrlResolver};
use bundler_err::BundlerErr;
use multi_err::MultiErr;

/// `map[entrypoint]` is the set of files reachable from `entrypoint` by
/// following eager imports, including `entrypoint` itself and any missing
/// files it (transitively) referenced.
pub type TransitiveDepsMap = AHashMap<ResolvedUrl, AHashSet<ResolvedUrl>>;

/// A specifier that resolved to a URL the loader could not read. Recorded
/// against the entrypoint whose traversal discovered it; does not fail the
/// build (§7 error handling: missing files are non-fatal).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MissingFile {
    pub entrypoint: ResolvedUrl,
    pub url: ResolvedUrl,
    pub referenced_from: ResolvedUrl,
}

#[derive(Debug, Clone, Default)]
struct FileReach {
    eager: Vec<ResolvedUrl>,
    lazy: Vec<ResolvedUrl>,
}

/// Builds the [`TransitiveDepsMap`] for `entrypoints`, growing the entrypoint
/// set as lazy imports are discovered. Returns the map plus every missing
/// file encountered, in discovery order.
pub fn build_index(
    entrypoints: &[ResolvedUrl],
    loader: &dyn UrlLoader,
    resolver: &dyn UrlResolver,
    analyzer: &dyn DocumentAnalyzer,
) -> (TransitiveDepsMap, MultiErr<MissingFile>) {
    let mut errs = MultiErr::new();
    let mut reach_cache: AHashMap<ResolvedUrl, Option<FileReach>> = AHashMap::default();
    let mut map: TransitiveDepsMap = AHashMap::default();

    // Entrypoints are processed from a queue that new lazy-import targets
    // are pushed onto; the loop terminates because the URL universe backing
    // a project is finite and each entrypoint is only ever queued once.
    let mut queue: Vec<ResolvedUrl> = entrypoints.to_vec();
    let mut queued: AHashSet<ResolvedUrl> = queue.iter().cloned().collect();
    let mut i = 0;
    while i < queue.len() {
        let entrypoint = queue[i].clone();
        i += 1;
        if map.contains_key(&entrypoint) {
            continue;
        }

        let mut reached = AHashSet::default();
        let mut stack = vec![entrypoint.clone()];
        let mut on_stack: AHashSet<ResolvedUrl> = AHashSet::default();
        while let Some(current) = stack.pop() {
            if !reached.insert(current.clone()) {
                continue;
            }
            on_stack.insert(current.clone());

            let reach = reach_cache
                .entry(current.clone())
                .or_insert_with(|| load_reach(&current, loader, resolver, analyzer))
                .clone();

            let Some(reach) = reach else {
                errs.add_single(MissingFile {
                    entrypoint: entrypoint.clone(),
                    url: current.clone(),
                    referenced_from: current.clone(),
                });
                continue;
            };

            for child in reach.eager {
                if !on_stack.contains(&child) {
                    stack.push(child);
                }
            }
            for lazy_target in reach.lazy {
                if queued.insert(lazy_target.clone()) {
                    queue.push(lazy_target);
                }
            }
        }

        map.insert(entrypoint, reached);
    }

    (map, errs)
}

/// Computes `current`'s direct eager/lazy children. Returns `None` if the
/// file itself could not be loaded (the caller records it as missing).
fn load_reach(
    current: &ResolvedUrl,
    loader: &dyn UrlLoader,
    resolver: &dyn UrlResolver,
    analyzer: &dyn DocumentAnalyzer,
) -> Option<FileReach> {
    let bytes = loader.load(current).ok()?;
    let features = analyzer.analyze(current, &bytes).ok()?;

    let mut reach = FileReach::default();
    for dep in features.dependencies {
        let Some(resolved) = resolver.resolve(current, &dep.specifier) else {
            continue;
        };
        if dep.lazy {
            reach.lazy.push(resolved);
        } else {
            reach.eager.push(resolved);
        }
    }
    Some(reach)
}

/// Inverts a [`TransitiveDepsMap`]: for each file, the set of entrypoints
/// that reach it. The core input to maximal-sharding bundle partitioning.
pub fn invert(map: &TransitiveDepsMap) -> AHashMap<ResolvedUrl, AHashSet<ResolvedUrl>> {
    let mut inverted: AHashMap<ResolvedUrl, AHashSet<ResolvedUrl>> = AHashMap::default();
    for (entrypoint, files) in map {
        for file in files {
            inverted
                .entry(file.clone())
                .or_default()
                .insert(entrypoint.clone());
        }
    }
    inverted
}

#[cfg(test)]
mod test {
    use super::*;
    use bundle_analyzer::{Dependency, DocumentFeatures};
    use pretty_assertions::assert_eq;
    use std::cell::RefCell;

    struct FakeLoader(AHashMap<String, ()>);
    impl UrlLoader for FakeLoader {
        fn load(&self, url: &ResolvedUrl) -> Result<Vec<u8>, BundlerErr> {
            if self.0.contains_key(url.as_str()) {
                Ok(Vec::new())
            } else {
                Err(BundlerErr::io(anyhow::anyhow!("no such file: {url}")))
            }
        }
    }

    struct FakeResolver;
    impl UrlResolver for FakeResolver {
        fn resolve(&self, _base: &ResolvedUrl, relative: &str) -> Option<ResolvedUrl> {
            Some(ResolvedUrl::new(relative.to_string()))
        }
        fn relative(&self, _from: &ResolvedUrl, to: &ResolvedUrl) -> String {
            to.as_str().to_string()
        }
    }

    struct FakeAnalyzer(RefCell<AHashMap<String, Vec<Dependency>>>);
    impl DocumentAnalyzer for FakeAnalyzer {
        fn analyze(&self, url: &ResolvedUrl, _source: &[u8]) -> Result<DocumentFeatures, BundlerErr> {
            let deps = self
                .0
                .borrow()
                .get(url.as_str())
                .cloned()
                .unwrap_or_default();
            Ok(DocumentFeatures { dependencies: deps })
        }
    }

    fn dep(spec: &str, lazy: bool) -> Dependency {
        Dependency {
            specifier: spec.to_string(),
            lazy,
        }
    }

    #[test]
    fn eager_chain_is_fully_reachable() {
        let mut files = AHashMap::default();
        files.insert("a.html".to_string(), vec![dep("b.html", false)]);
        files.insert("b.html".to_string(), vec![dep("c.html", false)]);
        files.insert("c.html".to_string(), vec![]);
        let loaded: AHashMap<String, ()> = files.keys().map(|k| (k.clone(), ())).collect();

        let (map, errs) = build_index(
            &[ResolvedUrl::new("a.html")],
            &FakeLoader(loaded),
            &FakeResolver,
            &FakeAnalyzer(RefCell::new(files)),
        );

        assert!(Vec::from(errs).is_empty());
        let reached = &map[&ResolvedUrl::new("a.html")];
        assert_eq!(reached.len(), 3);
        assert!(reached.contains(&ResolvedUrl::new("c.html")));
    }

    #[test]
    fn lazy_import_seeds_new_entrypoint_without_descending() {
        let mut files = AHashMap::default();
        files.insert("a.html".to_string(), vec![dep("modal.html", true)]);
        files.insert("modal.html".to_string(), vec![dep("widget.html", false)]);
        files.insert("widget.html".to_string(), vec![]);
        let loaded: AHashMap<String, ()> = files.keys().map(|k| (k.clone(), ())).collect();

        let (map, _) = build_index(
            &[ResolvedUrl::new("a.html")],
            &FakeLoader(loaded),
            &FakeResolver,
            &FakeAnalyzer(RefCell::new(files)),
        );

        assert_eq!(map[&ResolvedUrl::new("a.html")].len(), 1);
        assert_eq!(map[&ResolvedUrl::new("modal.html")].len(), 2);
    }

    #[test]
    fn missing_file_is_recorded_not_fatal() {
        let mut files = AHashMap::default();
        files.insert("a.html".to_string(), vec![dep("missing.html", false)]);
        let loaded: AHashMap<String, ()> = files.keys().map(|k| (k.clone(), ())).collect();

        let (map, errs) = build_index(
            &[ResolvedUrl::new("a.html")],
            &FakeLoader(loaded),
            &FakeResolver,
            &FakeAnalyzer(RefCell::new(files)),
        );

        let missing: Vec<MissingFile> = errs.into();
        assert_eq!(missing.len(), 1);
        assert_eq!(missing[0].url, ResolvedUrl::new("missing.html"));
        assert!(map.contains_key(&ResolvedUrl::new("a.html")));
    }

    #[test]
    fn invert_groups_files_by_reaching_entrypoints() {
        let mut map: TransitiveDepsMap = AHashMap::default();
        map.insert(
            ResolvedUrl::new("a"),
            [ResolvedUrl::new("a"), ResolvedUrl::new("shared")]
                .into_iter()
                .collect(),
        );
        map.insert(
            ResolvedUrl::new("b"),
            [ResolvedUrl::new("b"), ResolvedUrl::new("shared")]
                .into_iter()
                .collect(),
        );
        let inverted = invert(&map);
        assert_eq!(inverted[&ResolvedUrl::new("shared")].len(), 2);
        assert_eq!(inverted[&ResolvedUrl::new("a")].len(), 1);
    }
}
