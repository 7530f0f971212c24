//! Execution Context: per-run state shared by the stages of one run
use crate::error::PipelineError;
use std::future::Future;
use std::time::Duration;
use tokio::time::Instant;
use uuid::Uuid;

#[derive(Debug, Clone)]
pub struct ExecutionContext {
    pub run_id: Uuid,
    /// Storage calls that have not completed by this instant fail with a timeout.
    pub deadline: Option<Instant>,
}

impl ExecutionContext {
    pub fn new() -> Self {
        Self {
            run_id: Uuid::new_v4(),
            deadline: None,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.deadline = Some(Instant::now() + timeout);
        self
    }

    /// Drive `fut` to completion, failing with [`PipelineError::Timeout`] once
    /// the deadline passes. The future is dropped on timeout, which cancels it.
    pub async fn bounded<T, F>(&self, what: &str, fut: F) -> Result<T, PipelineError>
    where
        F: Future<Output = Result<T, PipelineError>>,
    {
        match self.deadline {
            Some(deadline) => tokio::time::timeout_at(deadline, fut)
                .await
                .map_err(|_| PipelineError::Timeout(format!("{} exceeded the run deadline", what)))?,
            None => fut.await,
        }
    }
}

impl Default for ExecutionContext {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_bounded_without_deadline() {
        let ctx = ExecutionContext::new();
        let value = ctx.bounded("read", async { Ok::<_, PipelineError>(3) }).await.unwrap();
        assert_eq!(value, 3);
    }

    #[tokio::test]
    async fn test_bounded_times_out() {
        let ctx = ExecutionContext::new().with_timeout(Duration::from_millis(10));
        let err = ctx
            .bounded("read v1", async {
                tokio::time::sleep(Duration::from_secs(5)).await;
                Ok::<_, PipelineError>(())
            })
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::Timeout(ref m) if m.contains("read v1")));
    }
}
