use crate::transcript::{normalize_language, parse_turns, render_turns, round2};
use crate::SkipLog;
use async_trait::async_trait;
use chrono::SecondsFormat;
use thiserror::Error;
use tracing::info;
use vel_core::{
    write_status, DatasetAccessor, ExecutionContext, PipelineError, Row, RunConfig, StageExecutor,
    StageKind, StageResult, Value,
};

const REQUIRED: [&str; 5] = [
    "conversation_id",
    "spm_name",
    "channel_name",
    "recording_start",
    "recording_end",
];

/// Why a source row could not become a transcript row.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum TransformError {
    #[error("missing required column '{0}'")]
    MissingColumn(&'static str),

    #[error("column '{column}' is not a timestamp: {value}")]
    InvalidTimestamp { column: &'static str, value: String },

    #[error("recording ends before it starts")]
    NegativeDuration,
}

/// Turns conversation records into normalized transcript rows.
#[derive(Debug, Default, Clone)]
pub struct TranscriptGenerator;

impl TranscriptGenerator {
    /// Label written to when the caller gives no target.
    pub fn default_target(source_version: &str) -> String {
        format!("{}_transcripts", source_version)
    }

    /// Deterministic row transformation.
    pub fn transform(row: &Row) -> Result<Row, TransformError> {
        for column in REQUIRED {
            if row.get_present(column).is_none() {
                return Err(TransformError::MissingColumn(column));
            }
        }

        let timestamp = |column: &'static str| {
            let value = row.get_present(column).ok_or(TransformError::MissingColumn(column))?;
            value.as_timestamp().ok_or_else(|| TransformError::InvalidTimestamp {
                column,
                value: value.to_string(),
            })
        };
        let start = timestamp("recording_start")?;
        let end = timestamp("recording_end")?;
        if end < start {
            return Err(TransformError::NegativeDuration);
        }
        let minutes = round2((end - start).num_seconds() as f64 / 60.0);

        let text = |column: &str| -> Value {
            match row.get_present(column) {
                Some(Value::Text(s)) => Value::Text(s.trim().to_string()),
                Some(other) => other.clone(),
                None => Value::Null,
            }
        };

        let tone = row
            .get_present("creator_tone")
            .map(|v| v.to_string().trim().to_ascii_lowercase())
            .filter(|t| !t.is_empty())
            .unwrap_or_else(|| "neutral".to_string());
        let region = match text("creator_region") {
            Value::Text(s) => Value::Text(s.to_ascii_uppercase()),
            other => other,
        };
        let language = row
            .get_present("language_code")
            .map(|v| normalize_language(&v.to_string()))
            .filter(|l| !l.is_empty())
            .unwrap_or_else(|| "en-US".to_string());
        let turns = row
            .get_present("transcript")
            .map(|v| parse_turns(&v.to_string()))
            .unwrap_or_default();

        Ok(Row::new()
            .with("conversation_id", text("conversation_id"))
            .with("creator_id", row.get("creator_id").cloned().unwrap_or(Value::Null))
            .with("channel_name", text("channel_name"))
            .with("spm_name", text("spm_name"))
            .with("scenario", text("scenario"))
            .with("product_topic", text("product_topic"))
            .with("creator_tone", tone)
            .with("creator_region", region)
            .with("creator_niche", text("creator_niche"))
            .with("creator_persona", text("creator_persona"))
            .with("language_code", language)
            .with("recording_start", start.to_rfc3339_opts(SecondsFormat::Secs, true))
            .with("recording_end", end.to_rfc3339_opts(SecondsFormat::Secs, true))
            .with("duration_minutes", minutes)
            .with("turn_count", turns.len() as i64)
            .with("raw_transcript", render_turns(&turns)))
    }
}

#[async_trait]
impl StageExecutor for TranscriptGenerator {
    fn kind(&self) -> StageKind {
        StageKind::TranscriptGenerator
    }

    fn id(&self) -> &'static str {
        "transcript.generate.v1"
    }

    async fn run(
        &self,
        config: &RunConfig,
        accessor: &dyn DatasetAccessor,
        ctx: &ExecutionContext,
    ) -> Result<StageResult, PipelineError> {
        let target = config
            .target_label()
            .map(str::to_string)
            .unwrap_or_else(|| Self::default_target(&config.source_version));

        let source = ctx
            .bounded(
                "reading source version",
                accessor.read_version(&config.scope, &config.source_version, config.limit),
            )
            .await?;

        let mut skips = SkipLog::default();
        let mut rows = Vec::with_capacity(source.len());
        for (index, row) in source.iter().enumerate() {
            match Self::transform(row) {
                Ok(transformed) => rows.push(transformed),
                Err(e) => skips.record(index, row, e),
            }
        }

        let processed = source.len() as u64;
        let written = if rows.is_empty() {
            0
        } else {
            ctx.bounded(
                "writing target version",
                accessor.write_version(&config.scope, &target, rows, config.overwrite),
            )
            .await?
        };

        let status = write_status(processed, written, skips.count());
        info!(processed, written, skipped = skips.count(), target_version = %target, "transcripts generated");

        let mut result = StageResult::new(
            self.kind(),
            status,
            skips.summarize(format!(
                "generated {} of {} transcript rows into '{}'",
                written, processed, target
            )),
        );
        result.rows_processed = processed;
        result.rows_written = written;
        result.rows_skipped = skips.count();
        result.target_version = Some(target);
        Ok(result)
    }
}
