//! `HashMap`/`HashSet` aliases using `ahash` as the hasher.
//!
//! Plain `std::collections::HashMap` uses a DoS-resistant but comparatively
//! slow hasher; the bundling pipeline hashes a lot of URL strings in hot
//! loops (dependency-index traversal, export-rename memoization) where that
//! tradeoff isn't needed.

#[cfg(feature = "ahash")]
pub type ARandomState = ahash::RandomState;
#[cfg(feature = "ahash")]
pub type AHashMap<K, V> = std::collections::HashMap<K, V, ARandomState>;
#[cfg(feature = "ahash")]
pub type AHashSet<K> = std::collections::HashSet<K, ARandomState>;

#[cfg(not(feature = "ahash"))]
pub type ARandomState = std::collections::hash_map::RandomState;
#[cfg(not(feature = "ahash"))]
pub type AHashMap<K, V> = std::collections::HashMap<K, V>;
#[cfg(not(feature = "ahash"))]
pub type AHashSet<K> = std::collections::HashSet<K>;
