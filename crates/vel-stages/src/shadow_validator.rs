use async_trait::async_trait;
use tracing::info;
use vel_core::{
    DatasetAccessor, DiscrepancyKind, ExecutionContext, PipelineError, RunConfig, StageExecutor, StageKind,
    StageResult, StageStatus,
};
use vel_quality::{CompareOptions, Comparator, Comparison};

/// Compares a production version (source) against a shadow version (target).
#[derive(Debug, Clone, Default)]
pub struct ShadowValidator {
    comparator: Comparator,
}

impl ShadowValidator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_options(options: CompareOptions) -> Self {
        Self {
            comparator: Comparator::with_options(options),
        }
    }

    /// `Failed` when nothing joined and there is something to report.
    fn status(comparison: &Comparison) -> StageStatus {
        if comparison.is_clean() {
            StageStatus::Success
        } else if comparison.matched_rows > 0 {
            StageStatus::PartialSuccess
        } else {
            StageStatus::Failed
        }
    }
}

#[async_trait]
impl StageExecutor for ShadowValidator {
    fn kind(&self) -> StageKind {
        StageKind::ShadowValidator
    }

    fn id(&self) -> &'static str {
        "shadow.validate.v1"
    }

    async fn run(
        &self,
        config: &RunConfig,
        accessor: &dyn DatasetAccessor,
        ctx: &ExecutionContext,
    ) -> Result<StageResult, PipelineError> {
        let shadow_version = config
            .target_label()
            .ok_or_else(|| PipelineError::config("target_version is required for shadow validation"))?;

        // One row past the limit tells whether production was sampled.
        let production = ctx
            .bounded(
                "reading production version",
                accessor.read_version(
                    &config.scope,
                    &config.source_version,
                    config.limit.saturating_add(1),
                ),
            )
            .await?;
        let sampled = production.len() as u64 > config.limit;
        let sample = production.iter().take(production.len().min(config.limit as usize));

        // The limit bounds the production sample only.
        let shadow = ctx
            .bounded(
                "reading shadow version",
                accessor.read_version(&config.scope, shadow_version, u64::MAX),
            )
            .await?;

        let mut comparison = self.comparator.compare_detailed(sample, shadow.iter());
        if sampled {
            // Unsampled production rows may still own these ids.
            comparison
                .discrepancies
                .retain(|d| d.kind != DiscrepancyKind::Extra);
        }
        let status = Self::status(&comparison);
        info!(
            production = comparison.source_rows,
            shadow = comparison.target_rows,
            matched = comparison.matched_rows,
            sampled,
            discrepancies = comparison.discrepancies.len(),
            "shadow comparison finished"
        );

        let mut result = StageResult::new(
            self.kind(),
            status,
            format!(
                "compared {} production rows with {} shadow rows ({} matched): {} discrepancies",
                comparison.source_rows,
                comparison.target_rows,
                comparison.matched_rows,
                comparison.discrepancies.len()
            ),
        );
        result.rows_processed = comparison.source_rows as u64;
        result.target_version = Some(shadow_version.to_string());
        result.discrepancies = comparison.discrepancies;
        Ok(result)
    }
}
