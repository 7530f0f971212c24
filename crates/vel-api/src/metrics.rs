//! Prometheus registry fed by the run coordinator.
use prometheus::{Encoder, IntCounterVec, Opts, Registry, TextEncoder};
use vel_core::{StageResult, StageStatus};
use vel_stages::RunObserver;

pub struct Metrics {
    registry: Registry,
    runs: IntCounterVec,
    rows_processed: IntCounterVec,
    rows_written: IntCounterVec,
    discrepancies: IntCounterVec,
}

impl Metrics {
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new();
        let counter = |name: &str, help: &str, labels: &[&str]| -> Result<IntCounterVec, prometheus::Error> {
            let vec = IntCounterVec::new(Opts::new(name, help), labels)?;
            registry.register(Box::new(vec.clone()))?;
            Ok(vec)
        };

        let runs = counter("vel_runs_total", "Attempted runs by stage and status", &["stage", "status"])?;
        let rows_processed = counter("vel_rows_processed_total", "Rows read by stage", &["stage"])?;
        let rows_written = counter("vel_rows_written_total", "Rows published by stage", &["stage"])?;
        let discrepancies = counter("vel_discrepancies_total", "Discrepancies reported by stage", &["stage"])?;

        Ok(Self {
            registry,
            runs,
            rows_processed,
            rows_written,
            discrepancies,
        })
    }

    /// Text exposition format.
    pub fn encode(&self) -> Result<String, prometheus::Error> {
        let encoder = TextEncoder::new();
        let mut buffer = Vec::new();
        encoder.encode(&self.registry.gather(), &mut buffer)?;
        Ok(String::from_utf8_lossy(&buffer).to_string())
    }
}

fn status_label(status: StageStatus) -> &'static str {
    match status {
        StageStatus::Success => "success",
        StageStatus::PartialSuccess => "partial_success",
        StageStatus::Failed => "failed",
    }
}

impl RunObserver for Metrics {
    fn run_finished(&self, result: &StageResult) {
        let stage = result.stage.as_str();
        self.runs
            .with_label_values(&[stage, status_label(result.status)])
            .inc();
        self.rows_processed
            .with_label_values(&[stage])
            .inc_by(result.rows_processed);
        self.rows_written
            .with_label_values(&[stage])
            .inc_by(result.rows_written);
        self.discrepancies
            .with_label_values(&[stage])
            .inc_by(result.discrepancies.len() as u64);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vel_core::StageKind;

    #[test]
    fn test_records_runs() {
        let metrics = Metrics::new().unwrap();
        let mut result = StageResult::new(StageKind::TranscriptGenerator, StageStatus::PartialSuccess, "ok");
        result.rows_processed = 5;
        result.rows_written = 4;
        metrics.run_finished(&result);
        metrics.run_finished(&result);

        let text = metrics.encode().unwrap();
        assert!(text.contains(
            r#"vel_runs_total{stage="TranscriptGenerator",status="partial_success"} 2"#
        ));
        assert!(text.contains(r#"vel_rows_written_total{stage="TranscriptGenerator"} 8"#));
        assert!(text.contains(r#"vel_rows_processed_total{stage="TranscriptGenerator"} 10"#));
    }
}
