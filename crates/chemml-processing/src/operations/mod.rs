//! Replayable dataset transformations.
//!
//! An [`Operation`] is plain data: it serializes into the session log and
//! applying it to the same dataset always yields the same result. The
//! extractor and cancellation token passed through [`OpContext`] only affect
//! speed and whether the call completes. The context also carries the loaded
//! dataset, which is what [`Operation::ResetToInitial`] restores.

mod encode;
mod filter;
mod impute;
mod molecules;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::cancellation::{CancellationToken, checkpoint};
use crate::chem::{ChemFeatureExtractor, DescriptorKind, FingerprintKind};
use crate::dataset::Dataset;
use crate::error::{OpError, Result};

pub use filter::{FilterCondition, FilterSpec};
pub use impute::ImputeStrategy;
pub use molecules::RowPolicy;

/// Collaborators an operation may use while it runs.
#[derive(Debug, Clone, Copy)]
pub struct OpContext<'a> {
    pub extractor: &'a ChemFeatureExtractor,
    pub token: Option<&'a CancellationToken>,
    /// Dataset as loaded, before any operation.
    pub origin: Option<&'a Dataset>,
}

impl<'a> OpContext<'a> {
    pub fn new(extractor: &'a ChemFeatureExtractor) -> Self {
        Self {
            extractor,
            token: None,
            origin: None,
        }
    }

    #[must_use]
    pub fn with_token(mut self, token: &'a CancellationToken) -> Self {
        self.token = Some(token);
        self
    }

    #[must_use]
    pub fn with_origin(mut self, origin: &'a Dataset) -> Self {
        self.origin = Some(origin);
        self
    }
}

/// One transformation between snapshots.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Operation {
    Filter(FilterSpec),
    Impute {
        column: String,
        strategy: ImputeStrategy,
    },
    /// Impute every column with missing values.
    ImputeAll { strategy: ImputeStrategy },
    /// `categories` is filled in by [`Operation::resolve`] so replay encodes
    /// exactly the columns seen when the operation was first applied.
    OneHotEncode {
        column: String,
        #[serde(default)]
        categories: Option<Vec<String>>,
        #[serde(default)]
        drop_first: bool,
    },
    CanonicalizeSmiles {
        column: String,
        #[serde(default)]
        policy: RowPolicy,
    },
    AddDescriptorColumn {
        source_column: String,
        kind: DescriptorKind,
    },
    AddFingerprintColumn {
        source_column: String,
        kind: FingerprintKind,
    },
    DropColumn { column: String },
    /// Return to the loaded dataset. Recorded like any other operation, so
    /// it can be undone and replays to the same state.
    ResetToInitial,
}

impl Operation {
    pub fn filter(spec: FilterSpec) -> Self {
        Operation::Filter(spec)
    }

    pub fn one_hot(column: impl Into<String>) -> Self {
        Operation::OneHotEncode {
            column: column.into(),
            categories: None,
            drop_first: false,
        }
    }

    pub fn canonicalize(column: impl Into<String>, policy: RowPolicy) -> Self {
        Operation::CanonicalizeSmiles {
            column: column.into(),
            policy,
        }
    }

    pub fn add_descriptor(source_column: impl Into<String>, kind: DescriptorKind) -> Self {
        Operation::AddDescriptorColumn {
            source_column: source_column.into(),
            kind,
        }
    }

    pub fn add_fingerprint(source_column: impl Into<String>, kind: FingerprintKind) -> Self {
        Operation::AddFingerprintColumn {
            source_column: source_column.into(),
            kind,
        }
    }

    pub fn drop_column(column: impl Into<String>) -> Self {
        Operation::DropColumn {
            column: column.into(),
        }
    }

    /// Short machine-friendly name, matching the serialized `op` tag.
    pub fn name(&self) -> &'static str {
        match self {
            Operation::Filter(_) => "filter",
            Operation::Impute { .. } => "impute",
            Operation::ImputeAll { .. } => "impute_all",
            Operation::OneHotEncode { .. } => "one_hot_encode",
            Operation::CanonicalizeSmiles { .. } => "canonicalize_smiles",
            Operation::AddDescriptorColumn { .. } => "add_descriptor_column",
            Operation::AddFingerprintColumn { .. } => "add_fingerprint_column",
            Operation::DropColumn { .. } => "drop_column",
            Operation::ResetToInitial => "reset_to_initial",
        }
    }

    /// Human-readable summary for logs and history views.
    pub fn describe(&self) -> String {
        match self {
            Operation::Filter(spec) => format!("Filter rows where {spec}"),
            Operation::Impute { column, strategy } => {
                format!("Impute '{column}' with {strategy}")
            }
            Operation::ImputeAll { strategy } => format!("Impute all columns with {strategy}"),
            Operation::OneHotEncode {
                column,
                categories,
                drop_first,
            } => {
                let count = categories.as_ref().map_or(0, Vec::len);
                let suffix = if *drop_first { " (first dropped)" } else { "" };
                format!("One-hot encode '{column}' into {count} categories{suffix}")
            }
            Operation::CanonicalizeSmiles { column, policy } => {
                format!("Canonicalize SMILES in '{column}' ({policy:?})")
            }
            Operation::AddDescriptorColumn {
                source_column,
                kind,
            } => format!(
                "Add '{}' from '{source_column}'",
                molecules::descriptor_column_name(source_column, *kind)
            ),
            Operation::AddFingerprintColumn {
                source_column,
                kind,
            } => format!("Add {kind} fingerprint of '{source_column}'"),
            Operation::DropColumn { column } => format!("Drop column '{column}'"),
            Operation::ResetToInitial => "Reset to the loaded dataset".to_string(),
        }
    }

    /// Capture data-dependent parameters so the operation replays exactly.
    ///
    /// Only one-hot encoding has any today: its category list.
    pub fn resolve(&self, dataset: &Dataset) -> Result<Operation> {
        match self {
            Operation::OneHotEncode {
                column,
                categories: None,
                drop_first,
            } => Ok(Operation::OneHotEncode {
                column: column.clone(),
                categories: Some(encode::observed_categories(dataset, column)?),
                drop_first: *drop_first,
            }),
            other => Ok(other.clone()),
        }
    }

    /// Apply to `dataset`, producing a new snapshot. `dataset` is untouched.
    pub fn apply(&self, dataset: &Dataset, ctx: &OpContext<'_>) -> Result<Dataset> {
        checkpoint(ctx.token)?;
        debug!(op = self.name(), rows = dataset.height(), "Applying operation");

        match self {
            Operation::Filter(spec) => filter::apply(dataset, spec),
            Operation::Impute { column, strategy } => {
                impute::impute_column(dataset, column, *strategy)
            }
            Operation::ImputeAll { strategy } => impute::impute_all(dataset, *strategy),
            Operation::OneHotEncode {
                column,
                categories: Some(categories),
                drop_first,
            } => encode::one_hot(dataset, column, categories, *drop_first),
            Operation::OneHotEncode { .. } => self.resolve(dataset)?.apply(dataset, ctx),
            Operation::CanonicalizeSmiles { column, policy } => {
                molecules::canonicalize(dataset, column, *policy, ctx)
            }
            Operation::AddDescriptorColumn {
                source_column,
                kind,
            } => molecules::add_descriptor(dataset, source_column, *kind, ctx),
            Operation::AddFingerprintColumn {
                source_column,
                kind,
            } => molecules::add_fingerprint(dataset, source_column, *kind, ctx),
            Operation::DropColumn { column } => molecules::drop_column(dataset, column),
            Operation::ResetToInitial => ctx.origin.cloned().ok_or_else(|| {
                OpError::InvalidParameter("reset requires the loaded dataset".to_string())
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::chem::FeatureCache;
    use polars::prelude::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_resolve_captures_categories() {
        let ds = Dataset::new(df! { "c" => ["b", "a", "b"] }.unwrap());
        let resolved = Operation::one_hot("c").resolve(&ds).unwrap();
        assert_eq!(
            resolved,
            Operation::OneHotEncode {
                column: "c".to_string(),
                categories: Some(vec!["a".to_string(), "b".to_string()]),
                drop_first: false,
            }
        );
        // Already resolved operations are left alone.
        assert_eq!(resolved.resolve(&ds).unwrap(), resolved);
    }

    #[test]
    fn test_unresolved_one_hot_applies() {
        let extractor = ChemFeatureExtractor::new(Arc::new(FeatureCache::new()));
        let ds = Dataset::new(df! { "c" => ["b", "a", "b"] }.unwrap());
        let out = Operation::one_hot("c")
            .apply(&ds, &OpContext::new(&extractor))
            .unwrap();
        assert_eq!(out.column_names(), vec!["c_a", "c_b"]);
    }

    #[test]
    fn test_serde_tagging() {
        let op = Operation::add_fingerprint("smiles", FingerprintKind::ECFP4);
        let json = serde_json::to_value(&op).unwrap();
        assert_eq!(json["op"], "add_fingerprint_column");
        assert_eq!(json["kind"]["type"], "morgan");
        assert_eq!(json["kind"]["radius"], 2);

        let op = Operation::Impute {
            column: "x".to_string(),
            strategy: ImputeStrategy::Constant(1.5),
        };
        let back: Operation = serde_json::from_str(&serde_json::to_string(&op).unwrap()).unwrap();
        assert_eq!(back, op);
        assert_eq!(back.name(), "impute");
    }

    #[test]
    fn test_defaults_when_deserializing() {
        let op: Operation =
            serde_json::from_str(r#"{"op": "canonicalize_smiles", "column": "s"}"#).unwrap();
        assert_eq!(op, Operation::canonicalize("s", RowPolicy::Reject));
    }

    #[test]
    fn test_apply_checks_token() {
        let extractor = ChemFeatureExtractor::new(Arc::new(FeatureCache::new()));
        let token = CancellationToken::new();
        token.cancel();
        let ds = Dataset::new(df! { "c" => [1, 2] }.unwrap());
        let err = Operation::drop_column("c")
            .apply(&ds, &OpContext::new(&extractor).with_token(&token))
            .unwrap_err();
        assert!(err.is_cancelled());
    }

    #[test]
    fn test_reset_restores_origin() {
        let extractor = ChemFeatureExtractor::new(Arc::new(FeatureCache::new()));
        let origin = Dataset::new(df! { "a" => [1, 2], "b" => [3, 4] }.unwrap());
        let current = Dataset::new(df! { "a" => [1] }.unwrap());

        let out = Operation::ResetToInitial
            .apply(&current, &OpContext::new(&extractor).with_origin(&origin))
            .unwrap();
        assert_eq!(out, origin);

        let err = Operation::ResetToInitial
            .apply(&current, &OpContext::new(&extractor))
            .unwrap_err();
        assert_eq!(err.error_code(), "INVALID_PARAMETER");

        let json = serde_json::to_string(&Operation::ResetToInitial).unwrap();
        assert_eq!(json, r#"{"op":"reset_to_initial"}"#);
    }

    #[test]
    fn test_describe() {
        let op = Operation::filter(FilterSpec::new("mw", FilterCondition::LessThan, "500"));
        assert_eq!(op.describe(), "Filter rows where 'mw' < '500'");
        assert_eq!(
            Operation::add_descriptor("smiles", DescriptorKind::TopologicalPolarSurfaceArea)
                .describe(),
            "Add 'smiles_TPSA' from 'smiles'"
        );
    }
}
