//! `wf-store` — the `WorkflowRepository` trait and an in-memory reference
//! implementation.
//!
//! The engine (`wf-engine`) never touches a concrete backend directly; it
//! holds an `Arc<dyn WorkflowRepository>`. `wf-persistence` provides the
//! Diesel-backed implementation used in production; `InMemoryWorkflowRepository`
//! here is for tests and the demo binary.
pub mod errors;
pub mod repository;
pub mod stubs;

pub use errors::{Result, StoreError};
pub use repository::WorkflowRepository;
pub use stubs::InMemoryWorkflowRepository;
