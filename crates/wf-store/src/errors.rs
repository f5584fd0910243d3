// errors.rs
// Persistence-layer failure taxonomy. Kept narrow and mapped onto
// `EngineError::Store`/`NotExistent` at the engine boundary rather than
// threaded through as its own type everywhere.
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
  #[error("not found: {0}")]
  NotFound(String),

  #[error("conflict: {0}")]
  Conflict(String),

  #[error("backend error: {0}")]
  Backend(String),
}

pub type Result<T> = std::result::Result<T, StoreError>;
