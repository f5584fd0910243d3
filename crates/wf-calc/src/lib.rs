//! `wf-calc` — the opaque calculation-handle abstraction.
//!
//! The engine treats calculations as external collaborators: it attaches
//! them to a step, polls their state, and can kill them, but never drives
//! their execution directly. This crate defines that boundary and an
//! in-memory implementation for tests and the demo workflow.
pub mod calc;
pub mod errors;

pub use calc::{Calculation, CalculationRepository, CalcState, InMemoryCalculation, InMemoryCalculationRepository};
pub use errors::CalcError;
