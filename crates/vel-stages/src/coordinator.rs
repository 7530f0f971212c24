//! Run Coordinator: validates a run request and dispatches it to its stage
//!
//! ```text
//! RunRequest → RunConfig → validate → match StageKind → executor.run
//!                              ↓                              ↓
//!                      ConfigurationError          StageResult (Failed on
//!                      (nothing attempted)          any storage error)
//! ```

use crate::settings::{Settings, SettingsError};
use crate::{ShadowValidator, SignalExtractor, TranscriptGenerator, TranscriptValidator};
use chrono::Utc;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{info, info_span, warn, Instrument};
use vel_core::{
    is_valid_label, DatasetAccessor, ExecutionContext, PipelineError, RunConfig, RunRequest,
    StageExecutor, StageKind, StageResult,
};

/// Hook called once per attempted run, after the result is final.
pub trait RunObserver: Send + Sync {
    fn run_finished(&self, result: &StageResult);
}

pub struct RunCoordinator {
    accessor: Arc<dyn DatasetAccessor>,
    generator: TranscriptGenerator,
    validator: TranscriptValidator,
    extractor: SignalExtractor,
    shadow: ShadowValidator,
    read_timeout: Option<Duration>,
    max_limit: u64,
    observer: Option<Arc<dyn RunObserver>>,
}

impl RunCoordinator {
    /// Coordinator with default executors, no deadline and the default limit cap.
    pub fn new(accessor: Arc<dyn DatasetAccessor>) -> Self {
        Self {
            accessor,
            generator: TranscriptGenerator,
            validator: TranscriptValidator::default(),
            extractor: SignalExtractor,
            shadow: ShadowValidator::default(),
            read_timeout: None,
            max_limit: Settings::default().max_limit,
            observer: None,
        }
    }

    pub fn from_settings(settings: &Settings) -> Result<Self, SettingsError> {
        Ok(Self::new(settings.open_store())
            .with_validator(TranscriptValidator::with_rules(settings.rule_set()?))
            .with_shadow(ShadowValidator::with_options(settings.compare.clone()))
            .with_read_timeout(settings.read_timeout())
            .with_max_limit(settings.max_limit))
    }

    pub fn with_read_timeout(mut self, timeout: Duration) -> Self {
        self.read_timeout = Some(timeout);
        self
    }

    pub fn with_max_limit(mut self, max_limit: u64) -> Self {
        self.max_limit = max_limit;
        self
    }

    pub fn with_validator(mut self, validator: TranscriptValidator) -> Self {
        self.validator = validator;
        self
    }

    pub fn with_shadow(mut self, shadow: ShadowValidator) -> Self {
        self.shadow = shadow;
        self
    }

    pub fn with_observer(mut self, observer: Arc<dyn RunObserver>) -> Self {
        self.observer = Some(observer);
        self
    }

    pub fn accessor(&self) -> &Arc<dyn DatasetAccessor> {
        &self.accessor
    }

    fn executor(&self, stage: StageKind) -> &dyn StageExecutor {
        match stage {
            StageKind::TranscriptGenerator => &self.generator,
            StageKind::TranscriptValidator => &self.validator,
            StageKind::SignalExtractor => &self.extractor,
            StageKind::ShadowValidator => &self.shadow,
        }
    }

    /// Reject a configuration before any I/O.
    pub fn validate(&self, config: &RunConfig) -> Result<(), PipelineError> {
        let label = |what: &str, value: &str| {
            if value.is_empty() {
                Err(PipelineError::config(format!("{} is required", what)))
            } else if !is_valid_label(value) {
                Err(PipelineError::config(format!(
                    "{} '{}' may only contain letters, digits, '_', '-' and '.'",
                    what, value
                )))
            } else {
                Ok(())
            }
        };

        label("project_id", &config.scope.project_id)?;
        label("dataset", &config.scope.dataset)?;
        label("source_version", &config.source_version)?;

        if config.limit == 0 {
            return Err(PipelineError::config("limit must be greater than zero"));
        }
        if config.limit > self.max_limit {
            return Err(PipelineError::config(format!(
                "limit {} exceeds the maximum of {}",
                config.limit, self.max_limit
            )));
        }

        match config.target_label() {
            Some(target) => {
                label("target_version", target)?;
                if target == config.source_version {
                    return Err(PipelineError::config(
                        "target_version must differ from source_version",
                    ));
                }
            }
            None if config.stage.is_validator() => {
                return Err(PipelineError::config(format!(
                    "target_version is required for {}",
                    config.stage.label()
                )));
            }
            None => {}
        }
        Ok(())
    }

    /// Parse a wire request and run it.
    pub async fn execute_request(&self, request: RunRequest) -> Result<StageResult, PipelineError> {
        let config = RunConfig::try_from(request)?;
        self.execute(config).await
    }

    /// Run one stage. Only configuration problems are returned as `Err`;
    /// everything that goes wrong once the run starts is a `Failed` result.
    pub async fn execute(&self, config: RunConfig) -> Result<StageResult, PipelineError> {
        if let Err(e) = self.validate(&config) {
            warn!(stage = %config.stage, error = %e, "run rejected");
            return Err(e);
        }

        let ctx = match self.read_timeout {
            Some(timeout) => ExecutionContext::new().with_timeout(timeout),
            None => ExecutionContext::new(),
        };
        let span = info_span!(
            "run",
            run_id = %ctx.run_id,
            stage = %config.stage,
            scope = %config.scope,
            backend = self.accessor.backend(),
        );

        let result = self.dispatch(&config, &ctx).instrument(span).await;
        if let Some(observer) = &self.observer {
            observer.run_finished(&result);
        }
        Ok(result)
    }

    async fn dispatch(&self, config: &RunConfig, ctx: &ExecutionContext) -> StageResult {
        let started_at = Utc::now();
        let start = Instant::now();
        let executor = self.executor(config.stage);
        info!(
            executor = executor.id(),
            source = %config.source_version,
            target_version = config.target_label().unwrap_or("-"),
            limit = config.limit,
            "run started"
        );

        let mut result = match executor.run(config, self.accessor.as_ref(), ctx).await {
            Ok(result) => result,
            Err(e) => {
                warn!(error = %e, "run failed");
                let mut failed = StageResult::failed(config.stage, e.to_string());
                failed.target_version = config.target_label().map(str::to_string);
                failed
            }
        };
        result.run_id = ctx.run_id;
        result.started_at = started_at;
        result.latency_ms = start.elapsed().as_millis() as u64;

        info!(
            status = ?result.status,
            processed = result.rows_processed,
            written = result.rows_written,
            skipped = result.rows_skipped,
            discrepancies = result.discrepancies.len(),
            latency_ms = result.latency_ms,
            "run finished"
        );
        result
    }
}
