// errors.rs
// Top-level error type for the engine crate. Wraps the three layers it
// talks to — data model/taxonomy (`wf_domain`), persistence (`wf_store`)
// and the calculation subsystem (`wf_calc`) — the same way the teacher's
// own `WorkflowError` wrapped `flow::errors::FlowError` and
// `chem_domain::DomainError`.
use thiserror::Error;

#[derive(Error, Debug, Clone)]
pub enum WorkflowError {
  #[error("{0}")]
  Engine(#[from] wf_domain::EngineError),

  #[error("store error: {0}")]
  Store(#[from] wf_store::StoreError),

  #[error("calculation error: {0}")]
  Calc(#[from] wf_calc::CalcError),

  #[error("serialization error: {0}")]
  Serialization(String),
}

impl From<serde_json::Error> for WorkflowError {
  fn from(e: serde_json::Error) -> Self {
    WorkflowError::Serialization(e.to_string())
  }
}

pub type Result<T> = std::result::Result<T, WorkflowError>;
