//! Stage trait: the contract shared by all stage executors
use crate::context::ExecutionContext;
use crate::data_model::{RunConfig, StageKind, StageResult, StageStatus};
use crate::dataset::DatasetAccessor;
use crate::error::PipelineError;
use async_trait::async_trait;

/// One processing mode of the pipeline.
///
/// Executors return `Err` only for storage-level failures; the coordinator
/// turns those into a `Failed` result. Row-level problems are reported in the
/// result itself.
#[async_trait]
pub trait StageExecutor: Send + Sync {
    fn kind(&self) -> StageKind;

    /// Stable identifier (ex: "transcript.generate.v1")
    fn id(&self) -> &'static str;

    async fn run(
        &self,
        config: &RunConfig,
        accessor: &dyn DatasetAccessor,
        ctx: &ExecutionContext,
    ) -> Result<StageResult, PipelineError>;
}

/// Status of a writing stage from its row counts.
///
/// Nothing read is a success; rows read but none written is a failure; any
/// skipped row downgrades the run to a partial success.
pub fn write_status(rows_processed: u64, rows_written: u64, rows_skipped: u64) -> StageStatus {
    if rows_processed == 0 {
        StageStatus::Success
    } else if rows_written == 0 {
        StageStatus::Failed
    } else if rows_skipped > 0 {
        StageStatus::PartialSuccess
    } else {
        StageStatus::Success
    }
}
