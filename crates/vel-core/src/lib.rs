//! VEL Core: data model, dataset accessors and the stage contract
//!
//! Everything a stage needs to run: versioned row storage behind the
//! [`DatasetAccessor`] trait, the run configuration and result types, and the
//! shared error taxonomy.

pub mod context;
pub mod data_model;
pub mod dataset;
pub mod error;
pub mod row;
pub mod stage;

pub use context::ExecutionContext;
pub use data_model::{
    Discrepancy, DiscrepancyKind, RunConfig, RunRequest, Scope, StageKind, StageResult,
    StageStatus,
};
pub use dataset::{is_valid_label, DatasetAccessor, FileStore, MemoryStore, RowSet};
pub use error::PipelineError;
pub use row::{ColumnType, Row, Value};
pub use stage::{write_status, StageExecutor};

/// Engine version reported by the API.
pub const VEL_VERSION: &str = env!("CARGO_PKG_VERSION");
