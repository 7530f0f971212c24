//! Data Model: RunConfig, StageResult, Discrepancy
use crate::error::PipelineError;
use crate::row::Value;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// The four processing modes of the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StageKind {
    TranscriptGenerator,
    TranscriptValidator,
    SignalExtractor,
    ShadowValidator,
}

impl StageKind {
    pub const ALL: [StageKind; 4] = [
        StageKind::TranscriptGenerator,
        StageKind::TranscriptValidator,
        StageKind::SignalExtractor,
        StageKind::ShadowValidator,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            StageKind::TranscriptGenerator => "TranscriptGenerator",
            StageKind::TranscriptValidator => "TranscriptValidator",
            StageKind::SignalExtractor => "SignalExtractor",
            StageKind::ShadowValidator => "ShadowValidator",
        }
    }

    /// Label used by the presentation layer (e.g. "Transcript Generator").
    pub fn label(self) -> &'static str {
        match self {
            StageKind::TranscriptGenerator => "Transcript Generator",
            StageKind::TranscriptValidator => "Transcript Validator",
            StageKind::SignalExtractor => "Signal Extractor",
            StageKind::ShadowValidator => "Shadow Validator",
        }
    }

    /// Validator stages compare against a second version and never write.
    pub fn is_validator(self) -> bool {
        matches!(
            self,
            StageKind::TranscriptValidator | StageKind::ShadowValidator
        )
    }
}

impl fmt::Display for StageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StageKind {
    type Err = PipelineError;

    /// Accepts `TranscriptGenerator`, `Transcript Generator` and
    /// `transcript_generator` spellings, case-insensitively.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let folded: String = s
            .chars()
            .filter(|c| !matches!(c, ' ' | '_' | '-'))
            .collect::<String>()
            .to_ascii_lowercase();

        StageKind::ALL
            .into_iter()
            .find(|kind| kind.as_str().to_ascii_lowercase() == folded)
            .ok_or_else(|| PipelineError::UnsupportedStage(s.to_string()))
    }
}

/// Project/dataset pair that scopes every table version.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Scope {
    pub project_id: String,
    pub dataset: String,
}

impl Scope {
    pub fn new(project_id: impl Into<String>, dataset: impl Into<String>) -> Self {
        Self {
            project_id: project_id.into(),
            dataset: dataset.into(),
        }
    }
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.project_id, self.dataset)
    }
}

/// Validated-on-use configuration of a single run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunConfig {
    pub stage: StageKind,
    pub scope: Scope,
    pub source_version: String,
    /// Empty when the stage does not need a target.
    #[serde(default)]
    pub target_version: String,
    pub limit: u64,
    /// Replace an existing target version instead of failing with a conflict.
    #[serde(default)]
    pub overwrite: bool,
}

impl RunConfig {
    pub fn new(stage: StageKind, scope: Scope, source_version: impl Into<String>) -> Self {
        Self {
            stage,
            scope,
            source_version: source_version.into(),
            target_version: String::new(),
            limit: 100,
            overwrite: false,
        }
    }

    pub fn target(mut self, version: impl Into<String>) -> Self {
        self.target_version = version.into();
        self
    }

    pub fn limit(mut self, limit: u64) -> Self {
        self.limit = limit;
        self
    }

    pub fn overwrite(mut self, overwrite: bool) -> Self {
        self.overwrite = overwrite;
        self
    }

    /// Target label, `None` when the caller left it blank.
    pub fn target_label(&self) -> Option<&str> {
        let target = self.target_version.trim();
        (!target.is_empty()).then_some(target)
    }
}

fn default_limit() -> u64 {
    100
}

/// Wire shape of `POST /run`. Scope and version fields are loose strings so that
/// bad values surface as configuration errors, not transport errors.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunRequest {
    #[serde(default)]
    pub stage: String,
    #[serde(default)]
    pub project_id: Option<String>,
    #[serde(default)]
    pub dataset: Option<String>,
    #[serde(default)]
    pub source_version: Option<String>,
    #[serde(default)]
    pub target_version: Option<String>,
    #[serde(default = "default_limit")]
    pub limit: u64,
    #[serde(default)]
    pub overwrite: bool,
}

impl TryFrom<RunRequest> for RunConfig {
    type Error = PipelineError;

    fn try_from(req: RunRequest) -> Result<Self, Self::Error> {
        let stage: StageKind = req.stage.parse()?;
        let text = |v: Option<String>| v.map(|s| s.trim().to_string()).unwrap_or_default();
        Ok(RunConfig {
            stage,
            scope: Scope::new(text(req.project_id), text(req.dataset)),
            source_version: text(req.source_version),
            target_version: text(req.target_version),
            limit: req.limit,
            overwrite: req.overwrite,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StageStatus {
    Success,
    PartialSuccess,
    Failed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DiscrepancyKind {
    /// Row exists in the source but not in the target.
    Missing,
    /// Row exists in the target but not in the source.
    Extra,
    /// Row exists on both sides but a column differs, or a row fails a check.
    Mismatch,
}

/// A single difference between two row sets.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Discrepancy {
    pub row_id: Value,
    /// Absent for row-level Missing/Extra entries.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub column: Option<String>,
    /// Absent when the column is absent on that side.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_value: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_value: Option<Value>,
    pub kind: DiscrepancyKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

impl Discrepancy {
    pub fn missing(row_id: Value) -> Self {
        Self {
            row_id,
            column: None,
            source_value: None,
            target_value: None,
            kind: DiscrepancyKind::Missing,
            detail: None,
        }
    }

    pub fn extra(row_id: Value) -> Self {
        Self {
            kind: DiscrepancyKind::Extra,
            ..Self::missing(row_id)
        }
    }

    pub fn mismatch(
        row_id: Value,
        column: impl Into<String>,
        source_value: Option<Value>,
        target_value: Option<Value>,
    ) -> Self {
        Self {
            row_id,
            column: Some(column.into()),
            source_value,
            target_value,
            kind: DiscrepancyKind::Mismatch,
            detail: None,
        }
    }

    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }
}

/// Outcome of one run.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StageResult {
    pub run_id: Uuid,
    pub stage: StageKind,
    pub status: StageStatus,
    pub rows_processed: u64,
    pub rows_written: u64,
    pub rows_skipped: u64,
    /// Version written (generator/extractor) or compared against (validators).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_version: Option<String>,
    pub discrepancies: Vec<Discrepancy>,
    pub message: String,
    pub started_at: DateTime<Utc>,
    pub latency_ms: u64,
}

impl StageResult {
    pub fn new(stage: StageKind, status: StageStatus, message: impl Into<String>) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            stage,
            status,
            rows_processed: 0,
            rows_written: 0,
            rows_skipped: 0,
            target_version: None,
            discrepancies: Vec::new(),
            message: message.into(),
            started_at: Utc::now(),
            latency_ms: 0,
        }
    }

    /// Result of a run that was accepted but could not complete.
    pub fn failed(stage: StageKind, message: impl Into<String>) -> Self {
        Self::new(stage, StageStatus::Failed, message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stage_kind_spellings() {
        for s in [
            "TranscriptGenerator",
            "Transcript Generator",
            "transcript_generator",
            "transcript-generator",
        ] {
            assert_eq!(s.parse::<StageKind>().unwrap(), StageKind::TranscriptGenerator);
        }
        assert_eq!("Shadow Validator".parse::<StageKind>().unwrap(), StageKind::ShadowValidator);
    }

    #[test]
    fn test_unknown_stage_is_unsupported() {
        let err = "Report Writer".parse::<StageKind>().unwrap_err();
        assert!(matches!(err, PipelineError::UnsupportedStage(ref s) if s == "Report Writer"));
    }

    #[test]
    fn test_request_into_config() {
        let req: RunRequest = serde_json::from_str(
            r#"{"stage":"Signal Extractor","projectId":"p","dataset":"d","sourceVersion":" v1 ","limit":5}"#,
        )
        .unwrap();
        let config = RunConfig::try_from(req).unwrap();
        assert_eq!(config.stage, StageKind::SignalExtractor);
        assert_eq!(config.scope, Scope::new("p", "d"));
        assert_eq!(config.source_version, "v1");
        assert_eq!(config.target_label(), None);
        assert_eq!(config.limit, 5);
        assert!(!config.overwrite);
    }

    #[test]
    fn test_request_limit_defaults() {
        let req: RunRequest = serde_json::from_str(r#"{"stage":"ShadowValidator"}"#).unwrap();
        assert_eq!(req.limit, 100);
    }

    #[test]
    fn test_result_serializes_camel_case() {
        let mut result = StageResult::new(StageKind::ShadowValidator, StageStatus::PartialSuccess, "ok");
        result.discrepancies.push(Discrepancy::missing(Value::Int(2)));
        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["stage"], "ShadowValidator");
        assert_eq!(json["status"], "PartialSuccess");
        assert_eq!(json["rowsProcessed"], 0);
        assert_eq!(json["discrepancies"][0]["rowId"], 2);
        assert_eq!(json["discrepancies"][0]["kind"], "Missing");
        assert!(json["discrepancies"][0].get("column").is_none());
    }
}
