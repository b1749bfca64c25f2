//! SMILES detection and per-column feature derivation.

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use once_cell::sync::Lazy;
use polars::prelude::{DataType, Series};
use regex::Regex;
use tracing::{debug, warn};

use super::cache::{self, CacheStats, FeatureCache};
use super::canonical::CanonicalSmiles;
use super::descriptors::DescriptorKind;
use super::fingerprint::{Fingerprint, FingerprintKind};
use crate::cancellation::{CancellationToken, checkpoint};
use crate::config::{DEFAULT_SMILES_SAMPLE, DEFAULT_SMILES_THRESHOLD, EngineConfig};
use crate::dataset::Dataset;
use crate::error::ParseError;
use crate::utils::collect_sample_values;

// Characters that can appear in a SMILES string; anything else is rejected
// before parsing.
static SMILES_CHARSET: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[A-Za-z0-9@+\-\[\]()=#$:/\\%.*]+$").expect("Invalid regex: SMILES charset")
});

/// Computes chemistry features for datasets, backed by a [`FeatureCache`].
#[derive(Debug, Clone)]
pub struct ChemFeatureExtractor {
    cache: Arc<FeatureCache>,
    detection_threshold: f64,
    detection_sample: usize,
}

impl Default for ChemFeatureExtractor {
    fn default() -> Self {
        Self::new(cache::global())
    }
}

impl ChemFeatureExtractor {
    pub fn new(cache: Arc<FeatureCache>) -> Self {
        Self {
            cache,
            detection_threshold: DEFAULT_SMILES_THRESHOLD,
            detection_sample: DEFAULT_SMILES_SAMPLE,
        }
    }

    /// Use the detection settings from `config`.
    pub fn with_config(cache: Arc<FeatureCache>, config: &EngineConfig) -> Self {
        Self {
            cache,
            detection_threshold: config.smiles_detection_threshold,
            detection_sample: config.smiles_detection_sample,
        }
    }

    pub fn cache(&self) -> &Arc<FeatureCache> {
        &self.cache
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.cache.stats()
    }

    // =========================================================================
    // Detection
    // =========================================================================

    /// String columns whose sampled values mostly parse as molecules.
    pub fn detect_smiles_columns(&self, dataset: &Dataset) -> BTreeSet<String> {
        dataset
            .frame()
            .get_columns()
            .iter()
            .filter(|column| matches!(column.dtype(), DataType::String))
            .filter(|column| self.looks_like_smiles(column.as_materialized_series()))
            .map(|column| column.name().to_string())
            .collect()
    }

    /// Whether enough sampled values of `series` parse as molecules.
    pub fn looks_like_smiles(&self, series: &Series) -> bool {
        let samples = collect_sample_values(series, self.detection_sample);
        if samples.is_empty() {
            return false;
        }
        let parsed = samples
            .iter()
            .filter(|value| SMILES_CHARSET.is_match(value) && self.canonicalize(value).is_ok())
            .count();
        let ratio = parsed as f64 / samples.len() as f64;
        debug!(
            column = %series.name(),
            ratio,
            sampled = samples.len(),
            "SMILES detection"
        );
        ratio >= self.detection_threshold
    }

    // =========================================================================
    // Single molecules
    // =========================================================================

    pub fn canonicalize(&self, smiles: &str) -> Result<CanonicalSmiles, ParseError> {
        self.cache.canonical(smiles.trim())
    }

    pub fn compute_descriptor(&self, smiles: &CanonicalSmiles, kind: DescriptorKind) -> f64 {
        self.cache.descriptor(smiles, kind)
    }

    pub fn compute_fingerprint(
        &self,
        smiles: &CanonicalSmiles,
        kind: FingerprintKind,
    ) -> Arc<Fingerprint> {
        self.cache.fingerprint(smiles, kind)
    }

    // =========================================================================
    // Columns
    // =========================================================================

    /// One result per row; missing values stay `None`.
    pub fn canonicalize_values(
        &self,
        values: &[Option<String>],
        token: Option<&CancellationToken>,
    ) -> Result<Vec<Option<Result<CanonicalSmiles, ParseError>>>, ParseError> {
        let mut out = Vec::with_capacity(values.len());
        for value in values {
            checkpoint(token)?;
            out.push(value.as_deref().map(|smiles| self.canonicalize(smiles)));
        }
        Ok(out)
    }

    /// Descriptor per row, computed once per distinct molecule. Missing and
    /// unparseable values give `None`.
    pub fn descriptor_values(
        &self,
        values: &[Option<String>],
        kind: DescriptorKind,
        token: Option<&CancellationToken>,
    ) -> Result<Vec<Option<f64>>, ParseError> {
        self.per_distinct(values, token, |smiles| {
            self.compute_descriptor(smiles, kind)
        })
    }

    /// Fingerprint per row, computed once per distinct molecule.
    pub fn fingerprint_values(
        &self,
        values: &[Option<String>],
        kind: FingerprintKind,
        token: Option<&CancellationToken>,
    ) -> Result<Vec<Option<Arc<Fingerprint>>>, ParseError> {
        self.per_distinct(values, token, |smiles| {
            self.compute_fingerprint(smiles, kind)
        })
    }

    fn per_distinct<T: Clone>(
        &self,
        values: &[Option<String>],
        token: Option<&CancellationToken>,
        compute: impl Fn(&CanonicalSmiles) -> T,
    ) -> Result<Vec<Option<T>>, ParseError> {
        let mut computed: HashMap<&str, Option<T>> = HashMap::new();
        let mut out = Vec::with_capacity(values.len());
        for (row, value) in values.iter().enumerate() {
            let Some(raw) = value.as_deref() else {
                out.push(None);
                continue;
            };
            if let Some(known) = computed.get(raw) {
                out.push(known.clone());
                continue;
            }
            checkpoint(token)?;
            let result = match self.canonicalize(raw) {
                Ok(smiles) => Some(compute(&smiles)),
                Err(err) => {
                    warn!(row, error = %err, "Skipping unparseable molecule");
                    None
                }
            };
            computed.insert(raw, result.clone());
            out.push(result);
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use polars::prelude::*;
    use pretty_assertions::assert_eq;

    fn extractor() -> ChemFeatureExtractor {
        ChemFeatureExtractor::new(Arc::new(FeatureCache::new()))
    }

    fn owned(values: &[Option<&str>]) -> Vec<Option<String>> {
        values.iter().map(|v| v.map(str::to_string)).collect()
    }

    #[test]
    fn test_detect_smiles_columns() {
        let frame = df! {
            "smiles" => ["CCO", "c1ccccc1", "CC(=O)O", "N#N", "O"],
            "name" => ["ethanol", "benzene", "acetic acid", "nitrogen", "water"],
            "value" => [1.0, 2.0, 3.0, 4.0, 5.0],
        }
        .unwrap();
        let detected = extractor().detect_smiles_columns(&Dataset::new(frame));
        assert_eq!(detected, BTreeSet::from(["smiles".to_string()]));
    }

    #[test]
    fn test_detection_threshold() {
        let frame = df! {
            "mixed" => ["CCO", "not a molecule", "hello world", "CC", "xyz!"],
        }
        .unwrap();
        let dataset = Dataset::new(frame);
        assert!(extractor().detect_smiles_columns(&dataset).is_empty());

        let config = EngineConfig::builder()
            .smiles_detection_threshold(0.4)
            .build()
            .unwrap();
        let lenient = ChemFeatureExtractor::with_config(Arc::new(FeatureCache::new()), &config);
        assert!(lenient.detect_smiles_columns(&dataset).contains("mixed"));
    }

    #[test]
    fn test_canonicalize_values_reports_rows() {
        let values = owned(&[Some("CCO"), Some("invalid_x"), None, Some("c1ccccc1")]);
        let results = extractor().canonicalize_values(&values, None).unwrap();
        assert!(matches!(results[0], Some(Ok(_))));
        assert!(matches!(
            results[1],
            Some(Err(ParseError::Unparseable { .. }))
        ));
        assert!(results[2].is_none());
        assert!(matches!(results[3], Some(Ok(_))));
    }

    #[test]
    fn test_descriptor_values_once_per_molecule() {
        let extractor = extractor();
        let values = owned(&[Some("CCO"), Some("OCC"), Some("CCO"), None, Some("bad(")]);
        let weights = extractor
            .descriptor_values(&values, DescriptorKind::MolecularWeight, None)
            .unwrap();

        assert_eq!(weights[0], weights[1]);
        assert_eq!(weights[0], weights[2]);
        assert!(weights[3].is_none());
        assert!(weights[4].is_none());
        // "CCO" and "OCC" are distinct raw values with one canonical form.
        let stats = extractor.cache_stats();
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.hits, 1);
    }

    #[test]
    fn test_cancelled_batch() {
        let token = CancellationToken::new();
        token.cancel();
        let values = owned(&[Some("CCO")]);
        let result =
            extractor().fingerprint_values(&values, FingerprintKind::ECFP4, Some(&token));
        assert_eq!(result.unwrap_err(), ParseError::Cancelled);
    }
}
