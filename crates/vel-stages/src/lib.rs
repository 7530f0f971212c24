//! VEL Stages: the four stage executors and the run coordinator.
//!
//! # Pipeline Flow
//!
//! ```text
//! conversations ──TranscriptGenerator──▶ <v>_transcripts ──SignalExtractor──▶ <v>_signals
//!                                             │
//!                                  TranscriptValidator (vs reference)
//!
//! production ◀──ShadowValidator──▶ shadow
//! ```
//!
//! Writing stages publish a new table version through the
//! [`vel_core::DatasetAccessor`]; validators only read and report
//! [`vel_core::Discrepancy`] entries.

pub mod coordinator;
pub mod settings;
mod shadow_validator;
mod signal_extractor;
pub mod transcript;
mod transcript_generator;
mod transcript_validator;

pub use coordinator::{RunCoordinator, RunObserver};
pub use settings::{Settings, SettingsError, StoreSettings};
pub use shadow_validator::ShadowValidator;
pub use signal_extractor::SignalExtractor;
pub use transcript_generator::{TranscriptGenerator, TransformError};
pub use transcript_validator::TranscriptValidator;

use std::fmt::Display;
use tracing::warn;
use vel_core::Row;

/// Reasons kept in a result message.
const MAX_REPORTED_SKIPS: usize = 3;

/// Rows a stage could not use. Each skip is logged; the first few reasons end
/// up in the run's result message.
#[derive(Debug, Default)]
pub(crate) struct SkipLog {
    count: u64,
    reasons: Vec<String>,
}

impl SkipLog {
    pub(crate) fn record(&mut self, index: usize, row: &Row, reason: impl Display) {
        let row_ref = match row.id().filter(|v| !v.is_null()) {
            Some(id) => id.to_string(),
            None => format!("#{}", index),
        };
        warn!(row = %row_ref, reason = %reason, "row skipped");
        self.count += 1;
        if self.reasons.len() < MAX_REPORTED_SKIPS {
            self.reasons.push(format!("row {}: {}", row_ref, reason));
        }
    }

    pub(crate) fn count(&self) -> u64 {
        self.count
    }

    /// `message`, followed by the skip summary when anything was skipped.
    pub(crate) fn summarize(&self, message: String) -> String {
        if self.count == 0 {
            return message;
        }
        let more = if self.count as usize > self.reasons.len() {
            "; ..."
        } else {
            ""
        };
        format!(
            "{} ({} skipped: {}{})",
            message,
            self.count,
            self.reasons.join("; "),
            more
        )
    }
}
