// errors.rs
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error, Clone)]
pub enum CalcError {
  #[error("calculation {0} not found")]
  NotFound(Uuid),

  #[error("calculation backend error: {0}")]
  Backend(String),
}
