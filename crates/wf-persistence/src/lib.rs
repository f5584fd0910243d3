//! Diesel-backed implementation of `wf_store::WorkflowRepository`.
//!
//! Exposes the `schema` module and re-exports `DieselWorkflowRepository` plus
//! `new_from_env`, which picks Postgres or SQLite the same way the rest of
//! the connection-pool plumbing in this codebase does (feature `pg`, or
//! `cfg(test)` for a lightweight in-memory SQLite database).

pub mod schema;
mod workflow_persistence;

pub use workflow_persistence::{new_from_env, DieselWorkflowRepository, MIGRATIONS};
