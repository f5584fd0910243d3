// control.rs
// Administrative operations on a live workflow: kill, sleep, revive, and a
// manual exit. These are the module-level `kill_from_pk` / `kill_from_uuid`
// / `kill_all` operations from the original implementation, generalized to
// work against any `WorkflowRepository`/`CalculationRepository` pair instead
// of a single hard-coded ORM.
use crate::errors::Result;
use std::path::Path;
use std::sync::Arc;
use wf_calc::CalculationRepository;
use wf_domain::{fingerprint, NextCall, StepId, StepStatus, WorkflowId, WorkflowRecord, WorkflowStatus};
use wf_store::WorkflowRepository;

pub struct ControlOps {
  store: Arc<dyn WorkflowRepository>,
  calc_repo: Arc<dyn CalculationRepository>,
}

impl ControlOps {
  pub fn new(store: Arc<dyn WorkflowRepository>, calc_repo: Arc<dyn CalculationRepository>) -> Self {
    Self { store, calc_repo }
  }

  /// For every RUNNING step, forces its attached calculations to a terminal
  /// state and recursively kills its attached sub-workflows, then moves the
  /// workflow itself to `FINISHED` (spec P7: kill closure — the whole tree
  /// ends up finished, never errored). A no-op on an already-finished
  /// workflow.
  #[tracing::instrument(skip(self))]
  pub fn kill(&self, workflow_id: &WorkflowId) -> Result<()> {
    let record = self.store.get_workflow(workflow_id)?;
    if record.status == WorkflowStatus::Finished {
      return Ok(());
    }
    for step in self.store.list_steps(workflow_id, Some(StepStatus::Running))? {
      for calc_id in &step.calculations {
        if let Ok(calc) = self.calc_repo.get(calc_id) {
          calc.kill()?;
        }
      }
      for sub_id in &step.sub_workflows {
        self.kill(sub_id)?;
      }
    }
    let mut record = record;
    record.status = WorkflowStatus::Finished;
    self.store.update_workflow(&record)?;
    tracing::warn!(workflow = %workflow_id, "workflow killed");
    Ok(())
  }

  /// `kill_from_uuid` equivalent: same as `kill`, uuids being this crate's
  /// only identifier for a workflow.
  pub fn kill_from_uuid(&self, workflow_id: &WorkflowId) -> Result<()> {
    self.kill(workflow_id)
  }

  /// Kills every root workflow belonging to `user` that has not already
  /// finished.
  pub fn kill_all(&self, user: &str) -> Result<usize> {
    let mut count = 0;
    for record in self.store.list_root_workflows(user, true)? {
      if record.status != WorkflowStatus::Finished {
        self.kill(&record.id)?;
        count += 1;
      }
    }
    Ok(count)
  }

  /// Suspends the given step — called from within a running step's own
  /// body (spec C9 `sleep`); a no-op if that step isn't currently running.
  /// SLEEP is one of the statuses the invoker treats as restartable, so a
  /// later re-invocation of the same step name cleans up and restarts it.
  #[tracing::instrument(skip(self))]
  pub fn sleep(&self, step_id: &StepId) -> Result<()> {
    let mut step = self.store.get_step(step_id)?;
    if step.status == StepStatus::Running {
      step.status = StepStatus::Sleep;
      self.store.update_step(&step)?;
    }
    Ok(())
  }

  /// Post-edit recovery: re-seals the workflow's fingerprint (warning if it
  /// changed), clears every ERROR step's attachments and resets it to
  /// INITIALIZED, and moves the workflow back to RUNNING.
  #[tracing::instrument(skip(self))]
  pub fn revive(&self, workflow_id: &WorkflowId) -> Result<()> {
    let mut record = self.store.get_workflow(workflow_id)?;
    self.reseal_fingerprint(&mut record)?;

    for mut step in self.store.list_steps(workflow_id, Some(StepStatus::Error))? {
      for sub_id in step.sub_workflows.drain(..) {
        self.kill(&sub_id)?;
      }
      for calc_id in step.calculations.drain(..) {
        if let Ok(calc) = self.calc_repo.get(&calc_id) {
          calc.kill()?;
        }
      }
      step.status = StepStatus::Initialized;
      step.next_call = NextCall::Pending;
      self.store.update_step(&step)?;
    }

    record.status = WorkflowStatus::Running;
    self.store.update_workflow(&record)?;
    Ok(())
  }

  fn reseal_fingerprint(&self, record: &mut WorkflowRecord) -> Result<()> {
    let fresh = fingerprint::fingerprint_path(Path::new(&record.script_path))
      .map_err(|e| wf_domain::EngineError::Io(e.to_string()))?;
    if record.script_fingerprint.as_deref() != Some(fresh.as_str()) {
      tracing::warn!(workflow = %record.id, "fingerprint changed across revive; re-sealing");
    }
    record.script_fingerprint = Some(fresh);
    Ok(())
  }

  /// Manually forces a workflow to `Finished`, independent of whatever its
  /// steps' `next_call`s say — the administrative escape hatch the
  /// original implementation exposes alongside the cooperative one.
  pub fn exit(&self, workflow_id: &WorkflowId) -> Result<()> {
    let mut record = self.store.get_workflow(workflow_id)?;
    record.status = WorkflowStatus::Finished;
    self.store.update_workflow(&record)?;
    Ok(())
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use wf_calc::InMemoryCalculationRepository;
  use wf_domain::StepRecord;
  use wf_store::InMemoryWorkflowRepository;

  fn setup() -> (ControlOps, Arc<InMemoryWorkflowRepository>, Arc<InMemoryCalculationRepository>) {
    let store = Arc::new(InMemoryWorkflowRepository::new());
    let calc_repo = Arc::new(InMemoryCalculationRepository::new());
    let ops = ControlOps::new(store.clone(), calc_repo.clone());
    (ops, store, calc_repo)
  }

  fn script_path() -> std::path::PathBuf {
    let path = std::env::temp_dir().join(format!("wf-engine-control-{}.rs", uuid::Uuid::new_v4()));
    std::fs::write(&path, b"fn main() {}").unwrap();
    path
  }

  fn new_workflow(store: &InMemoryWorkflowRepository, script_path: &std::path::Path) -> WorkflowId {
    let id = uuid::Uuid::new_v4();
    store.create_workflow(wf_domain::WorkflowRecord { id,
                                                       user: "alice".into(),
                                                       module: "workflows::demo".into(),
                                                       module_class: "workflows::demo::Demo".into(),
                                                       script_path: script_path.to_string_lossy().into_owned(),
                                                       script_fingerprint: None,
                                                       status: WorkflowStatus::Running,
                                                       ctime: chrono::Utc::now(),
                                                       report: String::new(),
                                                       parent_step_id: None })
         .unwrap();
    id
  }

  #[test]
  fn kill_moves_running_workflow_and_its_running_steps_to_finished() {
    let (ops, store, _calc) = setup();
    let path = script_path();
    let id = new_workflow(&store, &path);
    let mut step = StepRecord::new(id, "start", "alice");
    step.status = StepStatus::Running;
    store.create_step(step).unwrap();

    ops.kill(&id).unwrap();
    assert_eq!(store.get_workflow(&id).unwrap().status, WorkflowStatus::Finished);
  }

  #[test]
  fn kill_is_a_noop_on_an_already_finished_workflow() {
    let (ops, store, _calc) = setup();
    let path = script_path();
    let id = new_workflow(&store, &path);
    ops.exit(&id).unwrap();
    ops.kill(&id).unwrap();
    assert_eq!(store.get_workflow(&id).unwrap().status, WorkflowStatus::Finished);
  }

  #[test]
  fn sleep_sets_the_running_step_not_the_workflow() {
    let (ops, store, _calc) = setup();
    let path = script_path();
    let id = new_workflow(&store, &path);
    let step = StepRecord::new(id, "start", "alice");
    let step_id = step.id;
    store.create_step(step).unwrap();

    ops.sleep(&step_id).unwrap();

    assert_eq!(store.get_step(&step_id).unwrap().status, StepStatus::Sleep);
    assert_eq!(store.get_workflow(&id).unwrap().status, WorkflowStatus::Running);
  }

  #[test]
  fn revive_resets_error_steps_and_reseals_the_fingerprint() {
    let (ops, store, calc_repo) = setup();
    let path = script_path();
    let id = new_workflow(&store, &path);

    let mut step = StepRecord::new(id, "start", "alice");
    step.status = StepStatus::Error;
    step.next_call = NextCall::Pending;
    let calc = calc_repo.spawn();
    calc.set_state(wf_calc::CalcState::Running);
    step.calculations.push(calc.id());
    let step_id = step.id;
    store.create_step(step).unwrap();

    ops.revive(&id).unwrap();

    let revived = store.get_step(&step_id).unwrap();
    assert_eq!(revived.status, StepStatus::Initialized);
    assert!(revived.calculations.is_empty());
    assert_eq!(calc.state(), wf_calc::CalcState::Killed);
    let workflow = store.get_workflow(&id).unwrap();
    assert_eq!(workflow.status, WorkflowStatus::Running);
    assert!(workflow.script_fingerprint.is_some());
  }
}
