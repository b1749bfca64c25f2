//! Versioned chemistry dataset engine
//!
//! A transactional data-transformation engine for tabular chemistry data,
//! built on Polars, with SMILES-aware feature extraction.
//!
//! # Overview
//!
//! - **Dataset snapshots**: every transformation produces a new immutable
//!   [`Dataset`]; old snapshots stay shared with the history
//! - **Undo / redo**: linear history with an optional size cap
//! - **Replay**: the applied operations serialize to a [`SessionLog`] that
//!   rebuilds the same dataset from the same input
//! - **SMILES handling**: column detection, canonicalization, molecular
//!   descriptors and fingerprints
//! - **Feature cache**: per-molecule results shared across snapshots
//!
//! # Quick Start
//!
//! ```rust,ignore
//! use chemml_processing::{
//!     Dataset, DatasetEngine, DescriptorKind, FingerprintKind, Operation, RowPolicy,
//! };
//! use polars::prelude::*;
//!
//! let frame = CsvReadOptions::default()
//!     .with_has_header(true)
//!     .try_into_reader_with_file_path(Some("molecules.csv".into()))?
//!     .finish()?;
//!
//! let engine = DatasetEngine::new(Dataset::new(frame));
//! engine.apply_operation(Operation::canonicalize("smiles", RowPolicy::SetMissing))?;
//! engine.apply_operation(Operation::add_descriptor("smiles", DescriptorKind::MolecularWeight))?;
//! engine.apply_operation(Operation::add_fingerprint("smiles", FingerprintKind::ECFP4))?;
//!
//! engine.undo()?;
//! let log = engine.session_log().to_json()?;
//! ```
//!
//! # Cancellation
//!
//! Long operations check a [`CancellationToken`] between molecules:
//!
//! ```rust,ignore
//! let token = CancellationToken::new();
//! let worker = token.clone();
//! std::thread::spawn(move || engine.apply_operation_with_token(op, &worker));
//! token.cancel();
//! ```

pub mod cancellation;
pub mod chem;
pub mod config;
pub mod dataset;
pub mod engine;
pub mod error;
pub mod history;
pub mod operations;
pub mod session;
pub mod utils;

pub use cancellation::CancellationToken;
pub use chem::{
    CacheStats, CanonicalSmiles, ChemFeatureExtractor, DescriptorKind, FeatureCache, Fingerprint,
    FingerprintKind, Molecule,
};
pub use config::{ConfigValidationError, EngineConfig, EngineConfigBuilder};
pub use dataset::{ColumnKind, Dataset};
pub use engine::{DatasetEngine, DatasetEngineBuilder};
pub use error::{Cancelled, HistoryError, OpError, ParseError, Result as OpResult};
pub use history::{HistoryEntry, HistoryItem};
pub use operations::{
    FilterCondition, FilterSpec, ImputeStrategy, OpContext, Operation, RowPolicy,
};
pub use session::{SESSION_LOG_VERSION, SessionLog};
