//! Operations backed by the chemistry extractor.

use polars::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::OpContext;
use crate::chem::{DescriptorKind, FingerprintKind};
use crate::dataset::Dataset;
use crate::error::{OpError, ParseError, Result};
use crate::utils::text_values;

/// What to do with a row whose value does not parse as a molecule.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RowPolicy {
    /// Fail the whole operation, naming the first bad row.
    #[default]
    Reject,
    SetMissing,
    KeepOriginal,
}

fn batch_error(err: ParseError, column: &str) -> OpError {
    match err {
        ParseError::Cancelled => OpError::Cancelled,
        other => OpError::InvalidSmiles {
            column: column.to_string(),
            row: 0,
            source: other,
        },
    }
}

fn string_values(dataset: &Dataset, column: &str) -> Result<Vec<Option<String>>> {
    let series = dataset.series(column)?;
    if series.dtype() != &DataType::String {
        return Err(OpError::type_mismatch(column, "string", series.dtype()));
    }
    Ok(text_values(series)?)
}

/// Descriptor and fingerprint sources must be tagged or pass detection.
fn smiles_source(
    dataset: &Dataset,
    column: &str,
    ctx: &OpContext<'_>,
) -> Result<Vec<Option<String>>> {
    let values = string_values(dataset, column)?;
    if !dataset.is_smiles_column(column)
        && !ctx.extractor.looks_like_smiles(dataset.series(column)?)
    {
        return Err(OpError::type_mismatch(column, "SMILES", "text"));
    }
    Ok(values)
}

pub(crate) fn canonicalize(
    dataset: &Dataset,
    column: &str,
    policy: RowPolicy,
    ctx: &OpContext<'_>,
) -> Result<Dataset> {
    let values = string_values(dataset, column)?;
    let results = ctx
        .extractor
        .canonicalize_values(&values, ctx.token)
        .map_err(|err| batch_error(err, column))?;

    let mut rewritten: Vec<Option<String>> = Vec::with_capacity(values.len());
    let mut failures = 0usize;
    for (row, (original, result)) in values.into_iter().zip(results).enumerate() {
        let value = match result {
            None => None,
            Some(Ok(smiles)) => Some(smiles.as_str().to_string()),
            Some(Err(source)) => {
                failures += 1;
                match policy {
                    RowPolicy::Reject => {
                        return Err(OpError::InvalidSmiles {
                            column: column.to_string(),
                            row,
                            source,
                        });
                    }
                    RowPolicy::SetMissing => None,
                    RowPolicy::KeepOriginal => original,
                }
            }
        };
        rewritten.push(value);
    }
    debug!(column, failures, ?policy, "Canonicalized SMILES column");

    let mut frame = dataset.frame().clone();
    frame.replace(column, Series::new(column.into(), rewritten))?;
    dataset.derive_tagged(frame, column)
}

pub(crate) fn descriptor_column_name(source: &str, kind: DescriptorKind) -> String {
    format!("{source}_{}", kind.short_name())
}

pub(crate) fn add_descriptor(
    dataset: &Dataset,
    source: &str,
    kind: DescriptorKind,
    ctx: &OpContext<'_>,
) -> Result<Dataset> {
    let name = descriptor_column_name(source, kind);
    dataset.ensure_absent(&name)?;
    let values = smiles_source(dataset, source, ctx)?;

    let computed = ctx
        .extractor
        .descriptor_values(&values, kind, ctx.token)
        .map_err(|err| batch_error(err, source))?;

    let mut frame = dataset.frame().clone();
    frame.with_column(Series::new(name.into(), computed))?;
    dataset.derive_tagged(frame, source)
}

pub(crate) fn fingerprint_column_names(source: &str, kind: FingerprintKind) -> Vec<String> {
    let prefix = kind.column_prefix();
    (0..kind.n_bits())
        .map(|bit| format!("{source}_{prefix}_{bit}"))
        .collect()
}

pub(crate) fn add_fingerprint(
    dataset: &Dataset,
    source: &str,
    kind: FingerprintKind,
    ctx: &OpContext<'_>,
) -> Result<Dataset> {
    if kind.n_bits() == 0 {
        return Err(OpError::InvalidParameter(
            "fingerprint length must be at least 1 bit".to_string(),
        ));
    }
    let names = fingerprint_column_names(source, kind);
    for name in &names {
        dataset.ensure_absent(name)?;
    }
    let values = smiles_source(dataset, source, ctx)?;

    let fingerprints = ctx
        .extractor
        .fingerprint_values(&values, kind, ctx.token)
        .map_err(|err| batch_error(err, source))?;

    let columns: Vec<Column> = names
        .into_iter()
        .enumerate()
        .map(|(bit, name)| {
            let flags: Vec<Option<bool>> = fingerprints
                .iter()
                .map(|fp| fp.as_ref().map(|fp| fp.get(bit)))
                .collect();
            Series::new(name.into(), flags).into_column()
        })
        .collect();

    let frame = dataset.frame().hstack(&columns)?;
    dataset.derive_tagged(frame, source)
}

pub(crate) fn drop_column(dataset: &Dataset, column: &str) -> Result<Dataset> {
    dataset.column(column)?;
    let frame = dataset.frame().drop(column)?;
    Ok(dataset.derive(frame))
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::CancellationToken;
    use crate::chem::{ChemFeatureExtractor, FeatureCache};
    use pretty_assertions::assert_eq;

    fn extractor() -> ChemFeatureExtractor {
        ChemFeatureExtractor::new(Arc::new(FeatureCache::new()))
    }

    fn molecules() -> Dataset {
        Dataset::new(
            df! {
                "smiles" => [Some("OCC"), Some("invalid_x"), None, Some("c1ccccc1")],
                "y" => [1.0, 2.0, 3.0, 4.0],
            }
            .unwrap(),
        )
    }

    fn strings(dataset: &Dataset, column: &str) -> Vec<Option<String>> {
        text_values(dataset.series(column).unwrap()).unwrap()
    }

    #[test]
    fn test_canonicalize_policies() {
        let extractor = extractor();
        let ctx = OpContext::new(&extractor);
        let ds = molecules();

        let err = canonicalize(&ds, "smiles", RowPolicy::Reject, &ctx).unwrap_err();
        assert!(matches!(
            err,
            OpError::InvalidSmiles { row: 1, source: ParseError::Unparseable { .. }, .. }
        ));

        let out = canonicalize(&ds, "smiles", RowPolicy::SetMissing, &ctx).unwrap();
        assert_eq!(
            strings(&out, "smiles"),
            vec![Some("CCO".to_string()), None, None, Some("c1ccccc1".to_string())]
        );
        assert!(out.is_smiles_column("smiles"));

        let out = canonicalize(&ds, "smiles", RowPolicy::KeepOriginal, &ctx).unwrap();
        assert_eq!(strings(&out, "smiles")[1].as_deref(), Some("invalid_x"));
    }

    #[test]
    fn test_add_descriptor_column() {
        let extractor = extractor();
        let ctx = OpContext::new(&extractor);
        let ds = canonicalize(&molecules(), "smiles", RowPolicy::SetMissing, &ctx).unwrap();

        let out = add_descriptor(&ds, "smiles", DescriptorKind::HeavyAtomCount, &ctx).unwrap();
        let heavy: Vec<Option<f64>> = out
            .series("smiles_HeavyAtoms")
            .unwrap()
            .f64()
            .unwrap()
            .into_iter()
            .collect();
        assert_eq!(heavy, vec![Some(3.0), None, None, Some(6.0)]);

        let err = add_descriptor(&out, "smiles", DescriptorKind::HeavyAtomCount, &ctx).unwrap_err();
        assert_eq!(err.error_code(), "DUPLICATE_COLUMN");
    }

    #[test]
    fn test_descriptor_source_must_be_smiles() {
        let extractor = extractor();
        let ctx = OpContext::new(&extractor);
        let ds = Dataset::new(df! { "name" => ["ethanol", "water"], "n" => [1, 2] }.unwrap());

        let err = add_descriptor(&ds, "name", DescriptorKind::LogP, &ctx).unwrap_err();
        assert_eq!(err.error_code(), "TYPE_MISMATCH");
        let err = add_descriptor(&ds, "n", DescriptorKind::LogP, &ctx).unwrap_err();
        assert_eq!(err.error_code(), "TYPE_MISMATCH");
    }

    #[test]
    fn test_add_fingerprint_columns() {
        let extractor = extractor();
        let ctx = OpContext::new(&extractor);
        let ds = Dataset::with_smiles_columns(
            df! { "smiles" => [Some("CCO"), None] }.unwrap(),
            ["smiles"],
        )
        .unwrap();

        let out = add_fingerprint(&ds, "smiles", FingerprintKind::Maccs, &ctx).unwrap();
        assert_eq!(out.width(), 1 + 167);
        let oh = out.series("smiles_MACCS_139").unwrap().bool().unwrap();
        assert_eq!(oh.get(0), Some(true));
        assert_eq!(oh.get(1), None);
    }

    #[test]
    fn test_cancelled_fingerprint() {
        let extractor = extractor();
        let token = CancellationToken::new();
        token.cancel();
        let ctx = OpContext::new(&extractor).with_token(&token);
        let ds = Dataset::with_smiles_columns(df! { "smiles" => ["CCO"] }.unwrap(), ["smiles"])
            .unwrap();

        let err = add_fingerprint(&ds, "smiles", FingerprintKind::ECFP4, &ctx).unwrap_err();
        assert!(err.is_cancelled());
    }

    #[test]
    fn test_drop_column_removes_tag() {
        let ds = Dataset::with_smiles_columns(
            df! { "smiles" => ["CCO"], "y" => [1.0] }.unwrap(),
            ["smiles"],
        )
        .unwrap();
        let out = drop_column(&ds, "smiles").unwrap();
        assert_eq!(out.column_names(), vec!["y"]);
        assert!(out.smiles_columns().is_empty());
        assert_eq!(drop_column(&ds, "nope").unwrap_err().error_code(), "COLUMN_NOT_FOUND");
    }
}
