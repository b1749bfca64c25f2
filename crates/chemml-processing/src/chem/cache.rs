//! Process-wide memo of per-molecule features.
//!
//! Keys are content addressed (canonical SMILES + feature kind), so entries
//! stay valid across every dataset version and are only dropped by
//! [`FeatureCache::clear`].

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use once_cell::sync::Lazy;
use parking_lot::RwLock;
use serde::Serialize;

use super::canonical::CanonicalSmiles;
use super::descriptors::DescriptorKind;
use super::fingerprint::{Fingerprint, FingerprintKind};
use crate::error::ParseError;

static GLOBAL_CACHE: Lazy<Arc<FeatureCache>> = Lazy::new(|| Arc::new(FeatureCache::new()));

/// The shared cache used by engines and extractors that were not given one.
pub fn global() -> Arc<FeatureCache> {
    Arc::clone(&GLOBAL_CACHE)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FeatureKind {
    Descriptor(DescriptorKind),
    Fingerprint(FingerprintKind),
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct FeatureKey {
    canonical: Arc<str>,
    kind: FeatureKind,
}

#[derive(Debug, Clone)]
enum FeatureValue {
    Scalar(f64),
    Bits(Arc<Fingerprint>),
}

/// Counters reported by [`FeatureCache::stats`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub entries: usize,
    pub canonical_entries: usize,
}

#[derive(Debug, Default)]
pub struct FeatureCache {
    features: RwLock<HashMap<FeatureKey, FeatureValue>>,
    canonical: RwLock<HashMap<String, Result<CanonicalSmiles, ParseError>>>,
    hits: AtomicU64,
    misses: AtomicU64,
}

static_assertions::assert_impl_all!(FeatureCache: Send, Sync);

impl FeatureCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Canonical form of `raw`, parsing it at most once per cache lifetime.
    /// Failures are memoized too.
    pub fn canonical(&self, raw: &str) -> Result<CanonicalSmiles, ParseError> {
        if let Some(found) = self.canonical.read().get(raw) {
            return found.clone();
        }
        let parsed = CanonicalSmiles::parse(raw);
        self.canonical
            .write()
            .insert(raw.to_string(), parsed.clone());
        parsed
    }

    pub fn descriptor(&self, smiles: &CanonicalSmiles, kind: DescriptorKind) -> f64 {
        let value = self.get_or_compute(smiles, FeatureKind::Descriptor(kind), || {
            FeatureValue::Scalar(kind.compute(smiles.molecule()))
        });
        match value {
            FeatureValue::Scalar(value) => value,
            FeatureValue::Bits(_) => unreachable!("descriptor key holds a fingerprint"),
        }
    }

    pub fn fingerprint(&self, smiles: &CanonicalSmiles, kind: FingerprintKind) -> Arc<Fingerprint> {
        let value = self.get_or_compute(smiles, FeatureKind::Fingerprint(kind), || {
            FeatureValue::Bits(Arc::new(kind.compute(smiles.molecule())))
        });
        match value {
            FeatureValue::Bits(bits) => bits,
            FeatureValue::Scalar(_) => unreachable!("fingerprint key holds a scalar"),
        }
    }

    /// Whether a value for this molecule and kind is already stored.
    pub fn contains(&self, smiles: &CanonicalSmiles, kind: FeatureKind) -> bool {
        self.features.read().contains_key(&FeatureKey {
            canonical: smiles.shared_text(),
            kind,
        })
    }

    // The value is computed without holding the lock; two threads missing on
    // the same key both compute and the last insert wins. Values for a key are
    // deterministic so either result is correct.
    fn get_or_compute(
        &self,
        smiles: &CanonicalSmiles,
        kind: FeatureKind,
        compute: impl FnOnce() -> FeatureValue,
    ) -> FeatureValue {
        let key = FeatureKey {
            canonical: smiles.shared_text(),
            kind,
        };
        if let Some(value) = self.features.read().get(&key) {
            self.hits.fetch_add(1, Ordering::Relaxed);
            return value.clone();
        }
        self.misses.fetch_add(1, Ordering::Relaxed);
        let value = compute();
        self.features.write().insert(key, value.clone());
        value
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            entries: self.features.read().len(),
            canonical_entries: self.canonical.read().len(),
        }
    }

    pub fn len(&self) -> usize {
        self.features.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop every entry and reset the counters.
    pub fn clear(&self) {
        self.features.write().clear();
        self.canonical.write().clear();
        self.hits.store(0, Ordering::Relaxed);
        self.misses.store(0, Ordering::Relaxed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_descriptor_hit_after_miss() {
        let cache = FeatureCache::new();
        let smiles = cache.canonical("CCO").unwrap();

        let first = cache.descriptor(&smiles, DescriptorKind::MolecularWeight);
        let second = cache.descriptor(&smiles, DescriptorKind::MolecularWeight);

        assert_eq!(first, second);
        let stats = cache.stats();
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.entries, 1);
    }

    #[test]
    fn test_equivalent_spellings_share_entries() {
        let cache = FeatureCache::new();
        let a = cache.canonical("OCC").unwrap();
        let b = cache.canonical("C(O)C").unwrap();
        cache.fingerprint(&a, FingerprintKind::ECFP4);
        cache.fingerprint(&b, FingerprintKind::ECFP4);
        assert_eq!(cache.stats().hits, 1);
        assert!(cache.contains(&a, FeatureKind::Fingerprint(FingerprintKind::ECFP4)));
    }

    #[test]
    fn test_parse_failures_are_memoized() {
        let cache = FeatureCache::new();
        assert!(cache.canonical("C1CC").is_err());
        assert!(cache.canonical("C1CC").is_err());
        assert_eq!(cache.stats().canonical_entries, 1);
    }

    #[test]
    fn test_clear() {
        let cache = FeatureCache::new();
        let smiles = cache.canonical("c1ccccc1").unwrap();
        cache.descriptor(&smiles, DescriptorKind::LogP);
        cache.clear();
        assert_eq!(cache.stats(), CacheStats::default());
        assert!(cache.is_empty());
    }

    #[test]
    fn test_global_is_shared() {
        assert!(Arc::ptr_eq(&global(), &global()));
    }
}
