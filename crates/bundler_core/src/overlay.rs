//! The overlay loader (§4.5): wraps the injected [`UrlLoader`] with an
//! in-memory URL→contents map consulted first, so a bundle's rewritten
//! output can be fed back to a later read of the same URL without going
//! back to disk.

use std::sync::Mutex;

use ahashmap::AHashMap;
use bundle_url::{ResolvedUrl, UrlLoader};
use bundler_err::BundlerErr;

/// One per bundle's rewrite pass (§5: "the overlay loader's in-memory map
/// ... is written only during a single rewriter pass") — never shared
/// across concurrent bundles, so the `Mutex` here only ever guards against
/// this wrapper's own internal borrow pattern, not cross-bundle contention.
pub struct OverlayLoader<'a> {
    inner: &'a dyn UrlLoader,
    overlay: Mutex<AHashMap<ResolvedUrl, Vec<u8>>>,
}

impl<'a> OverlayLoader<'a> {
    pub fn new(inner: &'a dyn UrlLoader) -> Self {
        Self {
            inner,
            overlay: Mutex::new(AHashMap::default()),
        }
    }

    /// Records `contents` as the current value for `url`, superseding
    /// whatever the underlying loader would return.
    pub fn set(&self, url: ResolvedUrl, contents: Vec<u8>) {
        self.overlay
            .lock()
            .expect("overlay loader mutex should not be poisoned")
            .insert(url, contents);
    }
}

impl UrlLoader for OverlayLoader<'_> {
    fn load(&self, url: &ResolvedUrl) -> Result<Vec<u8>, BundlerErr> {
        if let Some(bytes) = self
            .overlay
            .lock()
            .expect("overlay loader mutex should not be poisoned")
            .get(url)
        {
            return Ok(bytes.clone());
        }
        self.inner.load(url)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use pretty_assertions::assert_eq;

    struct FakeLoader;
    impl UrlLoader for FakeLoader {
        fn load(&self, url: &ResolvedUrl) -> Result<Vec<u8>, BundlerErr> {
            Ok(format!("disk:{url}").into_bytes())
        }
    }

    #[test]
    fn overlay_entry_shadows_the_underlying_loader() {
        let inner = FakeLoader;
        let overlay = OverlayLoader::new(&inner);
        let url = ResolvedUrl::new("a.html");

        assert_eq!(overlay.load(&url).unwrap(), b"disk:a.html".to_vec());

        overlay.set(url.clone(), b"rewritten".to_vec());
        assert_eq!(overlay.load(&url).unwrap(), b"rewritten".to_vec());
    }

    #[test]
    fn overlay_falls_through_for_unset_urls() {
        let inner = FakeLoader;
        let overlay = OverlayLoader::new(&inner);
        let url = ResolvedUrl::new("b.html");
        assert_eq!(overlay.load(&url).unwrap(), b"disk:b.html".to_vec());
    }
}
