use crate::SkipLog;
use async_trait::async_trait;
use tracing::{info, warn};
use vel_core::{
    DatasetAccessor, Discrepancy, ExecutionContext, PipelineError, RunConfig, StageExecutor,
    StageKind, StageResult, StageStatus,
};
use vel_quality::{ReferenceSchema, RuleSet, Violation};

/// Checks transcript rows against a reference version and a value rule set.
#[derive(Debug, Clone)]
pub struct TranscriptValidator {
    rules: RuleSet,
}

impl Default for TranscriptValidator {
    fn default() -> Self {
        Self {
            rules: RuleSet::transcript_defaults(),
        }
    }
}

impl TranscriptValidator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_rules(rules: RuleSet) -> Self {
        Self { rules }
    }
}

fn to_discrepancy(row_id: &vel_core::Value, violation: Violation) -> Discrepancy {
    Discrepancy::mismatch(row_id.clone(), violation.column, violation.value, None)
        .with_detail(violation.message)
}

#[async_trait]
impl StageExecutor for TranscriptValidator {
    fn kind(&self) -> StageKind {
        StageKind::TranscriptValidator
    }

    fn id(&self) -> &'static str {
        "transcript.validate.v1"
    }

    async fn run(
        &self,
        config: &RunConfig,
        accessor: &dyn DatasetAccessor,
        ctx: &ExecutionContext,
    ) -> Result<StageResult, PipelineError> {
        let reference_version = config
            .target_label()
            .ok_or_else(|| PipelineError::config("target_version is required for validation"))?;

        let source = ctx
            .bounded(
                "reading source version",
                accessor.read_version(&config.scope, &config.source_version, config.limit),
            )
            .await?;
        let reference = ctx
            .bounded(
                "reading reference version",
                accessor.read_version(&config.scope, reference_version, 1),
            )
            .await?;

        let schema = reference
            .iter()
            .next()
            .map(ReferenceSchema::from_row)
            .unwrap_or_default();
        if schema.is_empty() {
            warn!(reference = %reference_version, "reference version has no rows, checking rules only");
        }

        let mut skips = SkipLog::default();
        let mut discrepancies = Vec::new();
        for (index, row) in source.iter().enumerate() {
            let Some(id) = row.id().filter(|v| !v.is_null()) else {
                skips.record(index, row, "row has no identifier");
                continue;
            };
            discrepancies.extend(
                schema
                    .check(row)
                    .into_iter()
                    .chain(self.rules.check(row))
                    .map(|v| to_discrepancy(id, v)),
            );
        }

        let processed = source.len() as u64;
        let status = if discrepancies.is_empty() && skips.count() == 0 {
            StageStatus::Success
        } else {
            StageStatus::PartialSuccess
        };
        info!(
            processed,
            discrepancies = discrepancies.len(),
            reference = %reference_version,
            "transcripts validated"
        );

        let mut result = StageResult::new(
            self.kind(),
            status,
            skips.summarize(format!(
                "validated {} rows against '{}': {} discrepancies",
                processed,
                reference_version,
                discrepancies.len()
            )),
        );
        result.rows_processed = processed;
        result.rows_skipped = skips.count();
        result.target_version = Some(reference_version.to_string());
        result.discrepancies = discrepancies;
        Ok(result)
    }
}
