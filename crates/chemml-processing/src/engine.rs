//! The dataset versioning engine.
//!
//! Holds the history behind a mutex; every apply, undo and redo runs as one
//! transaction under that lock, so readers only ever see whole snapshots.

use std::collections::BTreeSet;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, info, warn};

use crate::cancellation::CancellationToken;
use crate::chem::{self, ChemFeatureExtractor, FeatureCache};
use crate::config::{ConfigValidationError, EngineConfig};
use crate::dataset::Dataset;
use crate::error::{HistoryError, OpError, Result};
use crate::history::{History, HistoryItem};
use crate::operations::{OpContext, Operation};
use crate::session::SessionLog;

/// Versioned dataset with linear undo/redo.
///
/// # Example
///
/// ```rust,ignore
/// use chemml_processing::{DatasetEngine, Operation, RowPolicy, DescriptorKind};
///
/// let engine = DatasetEngine::new(dataset);
/// engine.apply_operation(Operation::canonicalize("smiles", RowPolicy::SetMissing))?;
/// engine.apply_operation(Operation::add_descriptor("smiles", DescriptorKind::LogP))?;
/// engine.undo()?;
/// let log = engine.session_log();
/// ```
#[derive(Debug)]
pub struct DatasetEngine {
    config: EngineConfig,
    extractor: ChemFeatureExtractor,
    history: Mutex<History>,
}

static_assertions::assert_impl_all!(DatasetEngine: Send, Sync);

impl DatasetEngine {
    /// Engine with the default configuration and the global feature cache.
    pub fn new(initial: Dataset) -> Self {
        let config = EngineConfig::default();
        let extractor = ChemFeatureExtractor::with_config(chem::cache::global(), &config);
        Self::assemble(initial, config, extractor)
    }

    pub fn builder() -> DatasetEngineBuilder {
        DatasetEngineBuilder::default()
    }

    fn assemble(initial: Dataset, config: EngineConfig, extractor: ChemFeatureExtractor) -> Self {
        let initial = if config.auto_tag_smiles {
            tag_detected(initial, &extractor)
        } else {
            initial
        };
        info!(
            rows = initial.height(),
            columns = initial.width(),
            smiles_columns = initial.smiles_columns().len(),
            "Dataset engine ready"
        );
        Self {
            history: Mutex::new(History::new(Arc::new(initial), config.max_history)),
            config,
            extractor,
        }
    }

    /// Rebuild a session: a fresh engine over `initial`, configured as
    /// recorded in `log`, with every logged operation applied in order.
    pub fn replay(initial: Dataset, log: &SessionLog) -> Result<Self> {
        Self::builder().replay(initial, log)
    }

    /// Apply every operation of `log` on top of the current snapshot.
    pub fn apply_log(&self, log: &SessionLog) -> Result<Arc<Dataset>> {
        if !log.is_supported() {
            return Err(OpError::InvalidParameter(format!(
                "unsupported session log version {}",
                log.version
            )));
        }
        let mut current = self.current_dataset();
        for operation in &log.operations {
            current = self.apply_operation(operation.clone())?;
        }
        Ok(current)
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn extractor(&self) -> &ChemFeatureExtractor {
        &self.extractor
    }

    // =========================================================================
    // Transactions
    // =========================================================================

    pub fn apply_operation(&self, operation: Operation) -> Result<Arc<Dataset>> {
        self.apply_internal(operation, None)
    }

    /// Like [`apply_operation`](Self::apply_operation), stopping with
    /// [`OpError::Cancelled`] once `token` is cancelled. History is left
    /// unchanged on cancellation.
    pub fn apply_operation_with_token(
        &self,
        operation: Operation,
        token: &CancellationToken,
    ) -> Result<Arc<Dataset>> {
        self.apply_internal(operation, Some(token))
    }

    fn apply_internal(
        &self,
        operation: Operation,
        token: Option<&CancellationToken>,
    ) -> Result<Arc<Dataset>> {
        let mut history = self.history.lock();
        let current = history.current();
        let origin = history.initial();

        let ctx = OpContext {
            extractor: &self.extractor,
            token,
            origin: Some(&origin),
        };
        let result = operation
            .resolve(&current)
            .and_then(|resolved| Ok((resolved.apply(&current, &ctx)?, resolved)));
        let (next, resolved) = match result {
            Ok(done) => done,
            Err(err) => {
                warn!(op = operation.name(), code = err.error_code(), "Operation failed: {}", err);
                return Err(err);
            }
        };

        info!(
            op = resolved.name(),
            rows = next.height(),
            columns = next.width(),
            "Applied operation"
        );
        debug!("{}", resolved.describe());

        let next = Arc::new(next);
        history.push(resolved, Arc::clone(&next));
        Ok(next)
    }

    /// Return to the loaded dataset as a new undoable step. Redo entries are
    /// discarded and the reset is recorded in the session log.
    pub fn reset_to_initial(&self) -> Result<Arc<Dataset>> {
        self.apply_operation(Operation::ResetToInitial)
    }

    pub fn undo(&self) -> std::result::Result<Arc<Dataset>, HistoryError> {
        let dataset = self.history.lock().undo()?;
        info!(rows = dataset.height(), columns = dataset.width(), "Undo");
        Ok(dataset)
    }

    pub fn redo(&self) -> std::result::Result<Arc<Dataset>, HistoryError> {
        let dataset = self.history.lock().redo()?;
        info!(rows = dataset.height(), columns = dataset.width(), "Redo");
        Ok(dataset)
    }

    // =========================================================================
    // Queries
    // =========================================================================

    pub fn current_dataset(&self) -> Arc<Dataset> {
        self.history.lock().current()
    }

    pub fn initial_dataset(&self) -> Arc<Dataset> {
        self.history.lock().initial()
    }

    pub fn can_undo(&self) -> bool {
        self.history.lock().can_undo()
    }

    pub fn can_redo(&self) -> bool {
        self.history.lock().can_redo()
    }

    /// Number of entries, counting undone ones still available for redo.
    pub fn history_len(&self) -> usize {
        self.history.lock().len()
    }

    pub fn history_items(&self) -> Vec<HistoryItem> {
        self.history.lock().items()
    }

    /// Resolved operations from the initial snapshot to the current one.
    pub fn operations(&self) -> Vec<Operation> {
        self.history.lock().applied_operations()
    }

    /// Operations and configuration needed to replay this session.
    pub fn session_log(&self) -> SessionLog {
        SessionLog::new(self.operations()).with_config(self.config.clone())
    }

    /// SMILES columns of the current snapshot, by detection.
    pub fn detect_smiles_columns(&self) -> BTreeSet<String> {
        self.extractor
            .detect_smiles_columns(&self.current_dataset())
    }

    pub fn clear_feature_cache(&self) {
        self.extractor.cache().clear();
        info!("Feature cache cleared");
    }
}

fn tag_detected(dataset: Dataset, extractor: &ChemFeatureExtractor) -> Dataset {
    let detected = extractor.detect_smiles_columns(&dataset);
    detected.iter().fold(dataset, |dataset, column| {
        dataset
            .tagged(column)
            .expect("Detected SMILES column is not a string column")
    })
}

/// Builder for [`DatasetEngine`].
#[derive(Debug, Default)]
pub struct DatasetEngineBuilder {
    config: Option<EngineConfig>,
    cache: Option<Arc<FeatureCache>>,
    extractor: Option<ChemFeatureExtractor>,
}

impl DatasetEngineBuilder {
    #[must_use]
    pub fn config(mut self, config: EngineConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Use an isolated cache instead of the process-wide one.
    #[must_use]
    pub fn feature_cache(mut self, cache: Arc<FeatureCache>) -> Self {
        self.cache = Some(cache);
        self
    }

    /// Use a pre-built extractor. Takes precedence over
    /// [`feature_cache`](Self::feature_cache) and the detection settings in
    /// the config.
    #[must_use]
    pub fn extractor(mut self, extractor: ChemFeatureExtractor) -> Self {
        self.extractor = Some(extractor);
        self
    }

    pub fn build(self, initial: Dataset) -> std::result::Result<DatasetEngine, ConfigValidationError> {
        let config = self.config.unwrap_or_default();
        config.validate()?;
        let extractor = self.extractor.unwrap_or_else(|| {
            let cache = self.cache.unwrap_or_else(chem::cache::global);
            ChemFeatureExtractor::with_config(cache, &config)
        });
        Ok(DatasetEngine::assemble(initial, config, extractor))
    }

    /// Build under the configuration recorded in `log`, replacing any set on
    /// the builder, then apply the logged operations.
    pub fn replay(self, initial: Dataset, log: &SessionLog) -> Result<DatasetEngine> {
        let engine = self
            .config(log.config.clone())
            .build(initial)
            .map_err(|err| OpError::InvalidParameter(format!("session log config: {err}")))?;
        engine.apply_log(log)?;
        Ok(engine)
    }
}
