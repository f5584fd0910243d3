// next_engine.rs
// The step invoker. A step method runs to completion within a single
// invocation (the "burst" execution model): `next()` never suspends, it
// only records where execution should continue. Advancing a workflow means
// calling `invoke_step` again, later, for whichever step name the previous
// call returned.
use crate::errors::Result;
use crate::reporter::Reporter;
use crate::repository_folder::{FsRepositoryFolder, RepositoryFolder};
use crate::step::{Attachment, StepContext, StepRegistry};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use wf_calc::CalculationRepository;
use wf_domain::{fingerprint, EngineError, NextCall, StepRecord, StepStatus, WorkflowId, WorkflowRecord, WorkflowStatus};
use wf_store::WorkflowRepository;

pub const EXIT_STEP_NAME: &str = "__exit__";
pub const DEFAULT_STEP_NAME: &str = "__default__";

pub struct NextEngine {
  store: Arc<dyn WorkflowRepository>,
  calc_repo: Arc<dyn CalculationRepository>,
  repo_root: PathBuf,
}

impl NextEngine {
  pub fn new(store: Arc<dyn WorkflowRepository>, calc_repo: Arc<dyn CalculationRepository>, repo_root: PathBuf) -> Self {
    Self { store, calc_repo, repo_root }
  }

  /// Invokes `step_name` of `workflow_id` against `registry`, returning the
  /// continuation the step recorded (or `NextCall::Pending` if it recorded
  /// none — a step that only attaches a calculation and waits for it to
  /// finish is not required to call `next()` itself).
  #[tracing::instrument(skip(self, registry), fields(workflow = %workflow_id, step = %step_name))]
  pub fn invoke_step(&self, registry: &StepRegistry, workflow_id: &WorkflowId, step_name: &str, user: &str) -> Result<NextCall> {
    if step_name == EXIT_STEP_NAME || step_name == DEFAULT_STEP_NAME {
      return Err(EngineError::ReservedNameMisuse.into());
    }
    let step_impl = registry.get(step_name).ok_or_else(|| EngineError::NotAStep(step_name.to_string()))?;

    let mut workflow = self.store.get_workflow(workflow_id)?;
    self.commit_if_needed(&mut workflow)?;
    if workflow.status == WorkflowStatus::Created {
      workflow.status = WorkflowStatus::Running;
      self.store.update_workflow(&workflow)?;
    }

    // P4 (reentry guard): an existing, non-restartable step may only be
    // re-invoked under its own name when its `next_call` still permits it
    // (pending, or looping back to itself) — anything else is a genuine
    // re-entry into an already-advanced step.
    let mut record = match self.store.find_step(workflow_id, step_name)? {
      Some(existing) if existing.status.is_restartable() => self.restart_step(existing)?,
      Some(mut existing) if existing.next_call.permits_reentry_of(step_name) => {
        existing.status = StepStatus::Running;
        existing
      }
      Some(existing) => return Err(EngineError::StepAlreadyInitialized(existing.name).into()),
      None => {
        let mut fresh = StepRecord::new(*workflow_id, step_name, user);
        fresh.status = StepStatus::Running;
        self.store.create_step(fresh.clone())?;
        fresh
      }
    };

    let ctx = StepContext::new(*workflow_id, record.id, step_name, user, self.store.clone(), self.calc_repo.clone());
    if let Err(e) = step_impl.run(&ctx) {
      record.status = StepStatus::Error;
      self.store.update_step(&record)?;
      let reporter = Reporter::new(self.store.clone());
      reporter.append(workflow_id, &format!("step `{step_name}` failed: {e}")).ok();
      tracing::warn!(workflow = %workflow_id, step = %step_name, error = %e, "step failed");
      return Err(e);
    }

    self.flush_attachments(&record.id, ctx.take_attachments())?;

    let next_call = ctx.take_pending_next().unwrap_or(NextCall::Pending);
    if ctx.take_pending_sleep() {
      record.status = StepStatus::Sleep;
    } else if !next_call.is_pending() {
      // A step that never calls `next()` stays RUNNING — the engine never
      // auto-finishes a step; only an explicit continuation does (decided
      // open question: no implicit completion).
      record.status = StepStatus::Finished;
    }
    record.next_call = next_call.clone();
    self.store.update_step(&record)?;

    if next_call.is_exit() {
      self.mark_workflow_finished(workflow_id)?;
    }
    Ok(next_call)
  }

  /// Commits the workflow on first invocation: moves its staging folder into
  /// its permanent, per-id repository folder (C2) and seals the source
  /// fingerprint (C1). `script_fingerprint` doubles as the persisted
  /// "already committed" flag — `None` until this runs once.
  fn commit_if_needed(&self, workflow: &mut WorkflowRecord) -> Result<()> {
    if workflow.script_fingerprint.is_some() {
      return Ok(());
    }
    let folder = FsRepositoryFolder::new(self.repo_root.join(workflow.id.to_string())).map_err(|e| EngineError::Io(e.to_string()))?;
    let staging = folder.make_temp_folder()?;
    folder.move_into(&staging)?;
    folder.commit();

    let sealed = fingerprint::fingerprint_path(Path::new(&workflow.script_path)).map_err(|e| EngineError::Io(e.to_string()))?;
    workflow.script_fingerprint = Some(sealed);
    self.store.update_workflow(workflow)?;
    tracing::info!(workflow = %workflow.id, "workflow committed, fingerprint sealed");
    Ok(())
  }

  /// Drives a linear chain of steps (the shape the demo workflow and most
  /// example scenarios use) until a step returns `Exit`, loops back on
  /// itself with no progress, or names a step the registry doesn't have.
  pub fn run_to_completion(&self, registry: &StepRegistry, workflow_id: &WorkflowId, start_step: &str, user: &str) -> Result<()> {
    let mut current = start_step.to_string();
    loop {
      match self.invoke_step(registry, workflow_id, &current, user)? {
        NextCall::Exit => return Ok(()),
        NextCall::Step(next) => current = next,
        NextCall::Pending => return Ok(()),
      }
    }
  }

  fn restart_step(&self, mut existing: StepRecord) -> Result<StepRecord> {
    for calc_id in existing.calculations.drain(..) {
      if let Ok(calc) = self.calc_repo.get(&calc_id) {
        calc.kill()?;
      }
    }
    existing.sub_workflows.clear();
    existing.status = StepStatus::Running;
    existing.next_call = NextCall::Pending;
    self.store.update_step(&existing)?;
    Ok(existing)
  }

  fn flush_attachments(&self, step_id: &wf_domain::StepId, attachments: Vec<Attachment>) -> Result<()> {
    for attachment in attachments {
      match attachment {
        Attachment::Calculation(id) => self.store.append_calculation(step_id, id)?,
        Attachment::SubWorkflow(wf_id) => self.store.append_sub_workflow(step_id, wf_id)?,
      }
    }
    Ok(())
  }

  fn mark_workflow_finished(&self, workflow_id: &WorkflowId) -> Result<()> {
    let mut record = self.store.get_workflow(workflow_id)?;
    record.status = WorkflowStatus::Finished;
    self.store.update_workflow(&record)?;
    Ok(())
  }
}
