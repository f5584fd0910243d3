//! `wf-domain` — shared data model and error taxonomy for the workflow engine.
//!
//! Holds the types persisted records are made of (`WorkflowRecord`,
//! `StepRecord`, the status/next-call enums, the three key-value bags) and
//! the engine-wide error taxonomy (`EngineError`), plus the fingerprint
//! helper used by the Identity & Integrity component. None of this module
//! talks to storage; `wf-store` defines the trait that does.
pub mod errors;
pub mod fingerprint;
pub mod record;

pub use errors::{EngineError, Result};
pub use record::{Bag, BagKind, NextCall, StepId, StepRecord, StepStatus, WorkflowId, WorkflowRecord, WorkflowStatus,
                  DEFAULT_SENTINEL, EXIT_SENTINEL};
