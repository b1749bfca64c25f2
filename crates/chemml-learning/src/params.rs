//! Hyperparameter schemas and validated parameter access.
//!
//! Every [`ModelFactory`](crate::ModelFactory) describes its parameters with a
//! [`ParamSchema`]. The orchestrator validates user values (and every grid
//! candidate) against it before any data is touched, then hands the family a
//! [`Params`] view with defaults filled in.

use std::collections::BTreeMap;
use std::fmt;

use serde_json::Value;

use crate::error::TrainError;

/// Hyperparameter values by name.
pub type Hyperparameters = BTreeMap<String, Value>;

/// Candidate values per hyperparameter for grid search.
pub type HyperparameterGrid = BTreeMap<String, Vec<Value>>;

/// Allowed values of one hyperparameter.
#[derive(Debug, Clone, PartialEq)]
pub enum ParamKind {
    /// Integer in `[min, max]`.
    Int { min: i64, max: Option<i64> },
    /// Like `Int`, but `null` is also accepted (e.g. unlimited tree depth).
    OptionalInt { min: i64 },
    /// Finite float; `min` is exclusive when `exclusive_min` is set.
    Float {
        min: f64,
        max: Option<f64>,
        exclusive_min: bool,
    },
    Bool,
    /// One of a fixed set of strings.
    Choice(Vec<&'static str>),
}

impl ParamKind {
    fn check(&self, value: &Value) -> Result<(), String> {
        match self {
            ParamKind::Int { min, max } => {
                let v = value
                    .as_i64()
                    .ok_or_else(|| format!("expected an integer, got {value}"))?;
                check_int(v, *min, *max)
            }
            ParamKind::OptionalInt { min } => match value {
                Value::Null => Ok(()),
                other => {
                    let v = other
                        .as_i64()
                        .ok_or_else(|| format!("expected an integer or null, got {other}"))?;
                    check_int(v, *min, None)
                }
            },
            ParamKind::Float {
                min,
                max,
                exclusive_min,
            } => {
                let v = value
                    .as_f64()
                    .ok_or_else(|| format!("expected a number, got {value}"))?;
                if !v.is_finite() {
                    return Err(format!("{v} is not finite"));
                }
                if *exclusive_min && v <= *min {
                    return Err(format!("{v} must be > {min}"));
                }
                if !*exclusive_min && v < *min {
                    return Err(format!("{v} must be >= {min}"));
                }
                if let Some(max) = max
                    && v > *max
                {
                    return Err(format!("{v} must be <= {max}"));
                }
                Ok(())
            }
            ParamKind::Bool => value
                .as_bool()
                .map(|_| ())
                .ok_or_else(|| format!("expected true or false, got {value}")),
            ParamKind::Choice(options) => {
                let v = value
                    .as_str()
                    .ok_or_else(|| format!("expected a string, got {value}"))?;
                if options.contains(&v) {
                    Ok(())
                } else {
                    Err(format!("'{v}' is not one of {}", options.join(", ")))
                }
            }
        }
    }
}

fn check_int(v: i64, min: i64, max: Option<i64>) -> Result<(), String> {
    if v < min {
        return Err(format!("{v} must be >= {min}"));
    }
    if let Some(max) = max
        && v > max
    {
        return Err(format!("{v} must be <= {max}"));
    }
    Ok(())
}

/// One named hyperparameter with its default.
#[derive(Debug, Clone, PartialEq)]
pub struct ParamSpec {
    pub name: &'static str,
    pub kind: ParamKind,
    pub default: Value,
}

impl ParamSpec {
    pub fn int(name: &'static str, default: i64, min: i64, max: Option<i64>) -> Self {
        Self {
            name,
            kind: ParamKind::Int { min, max },
            default: Value::from(default),
        }
    }

    pub fn optional_int(name: &'static str, default: Option<i64>, min: i64) -> Self {
        Self {
            name,
            kind: ParamKind::OptionalInt { min },
            default: default.map_or(Value::Null, Value::from),
        }
    }

    /// Float with an inclusive lower bound.
    pub fn float(name: &'static str, default: f64, min: f64, max: Option<f64>) -> Self {
        Self {
            name,
            kind: ParamKind::Float {
                min,
                max,
                exclusive_min: false,
            },
            default: Value::from(default),
        }
    }

    /// Float strictly greater than zero.
    pub fn positive(name: &'static str, default: f64) -> Self {
        Self {
            name,
            kind: ParamKind::Float {
                min: 0.0,
                max: None,
                exclusive_min: true,
            },
            default: Value::from(default),
        }
    }

    pub fn boolean(name: &'static str, default: bool) -> Self {
        Self {
            name,
            kind: ParamKind::Bool,
            default: Value::from(default),
        }
    }

    pub fn choice(name: &'static str, default: &'static str, options: &[&'static str]) -> Self {
        Self {
            name,
            kind: ParamKind::Choice(options.to_vec()),
            default: Value::from(default),
        }
    }
}

/// All hyperparameters a family accepts.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParamSchema {
    params: Vec<ParamSpec>,
}

impl ParamSchema {
    pub fn new(params: Vec<ParamSpec>) -> Self {
        Self { params }
    }

    /// Schema with no parameters (e.g. ordinary least squares).
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn params(&self) -> &[ParamSpec] {
        &self.params
    }

    pub fn get(&self, name: &str) -> Option<&ParamSpec> {
        self.params.iter().find(|p| p.name == name)
    }

    /// Reject unknown names and out-of-range or wrong-typed values.
    pub fn validate(&self, family: impl fmt::Display, values: &Hyperparameters) -> Result<(), TrainError> {
        for (name, value) in values {
            let spec = self.get(name).ok_or_else(|| {
                let known: Vec<&str> = self.params.iter().map(|p| p.name).collect();
                let reason = if known.is_empty() {
                    "this family takes no hyperparameters".to_string()
                } else {
                    format!("unknown name, expected one of {}", known.join(", "))
                };
                TrainError::hyperparameter(&family, name, reason)
            })?;
            spec.kind
                .check(value)
                .map_err(|reason| TrainError::hyperparameter(&family, name, reason))?;
        }
        Ok(())
    }

    /// Validate every candidate of every grid entry.
    pub fn validate_grid(
        &self,
        family: impl fmt::Display,
        grid: &HyperparameterGrid,
    ) -> Result<(), TrainError> {
        for (name, candidates) in grid {
            if candidates.is_empty() {
                return Err(TrainError::hyperparameter(
                    &family,
                    name,
                    "grid entry has no candidates",
                ));
            }
            for candidate in candidates {
                let single = Hyperparameters::from([(name.clone(), candidate.clone())]);
                self.validate(&family, &single)?;
            }
        }
        Ok(())
    }

    /// `values` over the schema defaults.
    pub fn resolve(&self, values: &Hyperparameters) -> Hyperparameters {
        let mut resolved: Hyperparameters = self
            .params
            .iter()
            .map(|p| (p.name.to_string(), p.default.clone()))
            .collect();
        resolved.extend(values.iter().map(|(k, v)| (k.clone(), v.clone())));
        resolved
    }
}

/// Every combination of the grid laid over `base`, in lexicographic order of
/// parameter names with candidates in the given order.
pub fn grid_combinations(base: &Hyperparameters, grid: &HyperparameterGrid) -> Vec<Hyperparameters> {
    grid.iter().fold(vec![base.clone()], |combos, (name, candidates)| {
        combos
            .iter()
            .flat_map(|combo| {
                candidates.iter().map(move |candidate| {
                    let mut next = combo.clone();
                    next.insert(name.clone(), candidate.clone());
                    next
                })
            })
            .collect()
    })
}

/// Resolved, validated hyperparameters handed to a
/// [`ModelFactory`](crate::ModelFactory).
#[derive(Debug, Clone)]
pub struct Params<'a> {
    family: String,
    values: &'a Hyperparameters,
}

impl<'a> Params<'a> {
    pub fn new(family: impl Into<String>, values: &'a Hyperparameters) -> Self {
        Self {
            family: family.into(),
            values,
        }
    }

    pub fn values(&self) -> &Hyperparameters {
        self.values
    }

    fn value(&self, name: &str) -> Result<&Value, TrainError> {
        self.values
            .get(name)
            .ok_or_else(|| TrainError::hyperparameter(&self.family, name, "missing value"))
    }

    fn mismatch(&self, name: &str, expected: &str) -> TrainError {
        TrainError::hyperparameter(&self.family, name, format!("expected {expected}"))
    }

    pub fn float(&self, name: &str) -> Result<f64, TrainError> {
        self.value(name)?
            .as_f64()
            .ok_or_else(|| self.mismatch(name, "a number"))
    }

    pub fn usize(&self, name: &str) -> Result<usize, TrainError> {
        self.value(name)?
            .as_u64()
            .and_then(|v| usize::try_from(v).ok())
            .ok_or_else(|| self.mismatch(name, "a non-negative integer"))
    }

    /// `None` for `null`.
    pub fn optional_usize(&self, name: &str) -> Result<Option<usize>, TrainError> {
        match self.value(name)? {
            Value::Null => Ok(None),
            _ => self.usize(name).map(Some),
        }
    }

    pub fn bool(&self, name: &str) -> Result<bool, TrainError> {
        self.value(name)?
            .as_bool()
            .ok_or_else(|| self.mismatch(name, "a boolean"))
    }

    pub fn choice(&self, name: &str) -> Result<&str, TrainError> {
        self.value(name)?
            .as_str()
            .ok_or_else(|| self.mismatch(name, "a string"))
    }
}
