// calc.rs
// The calculation subsystem is an external collaborator the engine never
// drives directly (spec "External Interfaces"): the engine only inspects
// state and issues `kill`. Everything about scheduling, retries and the
// actual computation lives outside this crate; `Calculation` is the opaque
// handle the engine polls.
use crate::errors::CalcError;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CalcState {
  New,
  Submitting,
  Running,
  Finished,
  Failed,
  Killed,
}

impl CalcState {
  pub fn is_terminal(&self) -> bool {
    matches!(self, CalcState::Finished | CalcState::Failed | CalcState::Killed)
  }
}

/// An opaque handle to a running (or finished) calculation. The engine
/// never constructs these directly; it gets them from a
/// `CalculationRepository` by id.
pub trait Calculation: Send + Sync {
  fn id(&self) -> Uuid;
  fn state(&self) -> CalcState;
  /// Requests termination. Idempotent: killing an already-terminal
  /// calculation is a no-op, not an error.
  fn kill(&self) -> Result<(), CalcError>;
}

pub trait CalculationRepository: Send + Sync {
  fn get(&self, id: &Uuid) -> Result<Arc<dyn Calculation>, CalcError>;
}

/// In-memory calculation used by tests and the demo workflow. State is
/// advanced manually (`set_state`) to simulate an external scheduler
/// reporting progress.
pub struct InMemoryCalculation {
  id: Uuid,
  state: Mutex<CalcState>,
}

impl InMemoryCalculation {
  pub fn new(id: Uuid) -> Self {
    Self { id, state: Mutex::new(CalcState::New) }
  }

  pub fn set_state(&self, state: CalcState) {
    *self.state.lock().unwrap_or_else(|e| e.into_inner()) = state;
  }
}

impl Calculation for InMemoryCalculation {
  fn id(&self) -> Uuid {
    self.id
  }

  fn state(&self) -> CalcState {
    *self.state.lock().unwrap_or_else(|e| e.into_inner())
  }

  fn kill(&self) -> Result<(), CalcError> {
    let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
    if !state.is_terminal() {
      *state = CalcState::Killed;
    }
    Ok(())
  }
}

#[derive(Default)]
pub struct InMemoryCalculationRepository {
  calcs: Mutex<HashMap<Uuid, Arc<InMemoryCalculation>>>,
}

impl InMemoryCalculationRepository {
  pub fn new() -> Self {
    Self::default()
  }

  fn lock(&self) -> MutexGuard<'_, HashMap<Uuid, Arc<InMemoryCalculation>>> {
    self.calcs.lock().unwrap_or_else(|e| e.into_inner())
  }

  /// Registers a freshly-created calculation and returns its handle, for
  /// use by step bodies that spawn calculations (C6's `attach_calculation`).
  pub fn spawn(&self) -> Arc<InMemoryCalculation> {
    let calc = Arc::new(InMemoryCalculation::new(Uuid::new_v4()));
    self.lock().insert(calc.id(), calc.clone());
    calc
  }
}

impl CalculationRepository for InMemoryCalculationRepository {
  fn get(&self, id: &Uuid) -> Result<Arc<dyn Calculation>, CalcError> {
    self.lock()
        .get(id)
        .cloned()
        .map(|c| c as Arc<dyn Calculation>)
        .ok_or(CalcError::NotFound(*id))
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn kill_is_idempotent_on_terminal_state() {
    let repo = InMemoryCalculationRepository::new();
    let calc = repo.spawn();
    calc.set_state(CalcState::Finished);
    calc.kill().unwrap();
    assert_eq!(calc.state(), CalcState::Finished);
  }

  #[test]
  fn kill_moves_running_calculation_to_killed() {
    let repo = InMemoryCalculationRepository::new();
    let calc = repo.spawn();
    calc.set_state(CalcState::Running);
    calc.kill().unwrap();
    assert_eq!(calc.state(), CalcState::Killed);
  }
}
