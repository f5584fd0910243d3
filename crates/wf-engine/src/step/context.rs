// context.rs
// `StepContext` replaces the original implementation's stack-introspection
// trick for finding out "who is calling `next()`": there is no call stack
// to walk in Rust, so the invoker hands the running step an explicit
// context that already knows its own name.
use crate::errors::Result;
use crate::step::registry::{Attachment, AttachmentBuffer};
use std::sync::{Arc, Mutex};
use wf_calc::CalculationRepository;
use wf_domain::{Bag, BagKind, NextCall, StepId, WorkflowId};
use wf_store::WorkflowRepository;

pub struct StepContext {
  pub workflow_id: WorkflowId,
  pub step_id: StepId,
  pub user: String,
  step_name: String,
  store: Arc<dyn WorkflowRepository>,
  calc_repo: Arc<dyn CalculationRepository>,
  attachments: Mutex<AttachmentBuffer>,
  /// Set by the step body via `set_next`; read back by the invoker once
  /// the step body returns. A step may call `next()` at most once per
  /// invocation (`InvalidStepCall` otherwise), enforced here.
  pending_next: Mutex<Option<NextCall>>,
  /// Set by the step body via `sleep`; read back by the invoker alongside
  /// `pending_next` so the burst's final status write happens once, instead
  /// of a second store write racing the invoker's own.
  pending_sleep: Mutex<bool>,
}

impl StepContext {
  pub fn new(workflow_id: WorkflowId,
             step_id: StepId,
             step_name: impl Into<String>,
             user: impl Into<String>,
             store: Arc<dyn WorkflowRepository>,
             calc_repo: Arc<dyn CalculationRepository>)
             -> Self {
    Self { workflow_id,
           step_id,
           user: user.into(),
           step_name: step_name.into(),
           store,
           calc_repo,
           attachments: Mutex::new(AttachmentBuffer::new()),
           pending_next: Mutex::new(None),
           pending_sleep: Mutex::new(false) }
  }

  /// The name of the step currently executing.
  pub fn caller_name(&self) -> &str {
    &self.step_name
  }

  pub fn store(&self) -> &Arc<dyn WorkflowRepository> {
    &self.store
  }

  pub fn calc_repo(&self) -> &Arc<dyn CalculationRepository> {
    &self.calc_repo
  }

  // -- parameter/attribute/result bags -------------------------------------
  pub fn get_parameters(&self) -> Result<Bag> {
    Ok(self.store.get_bag(&self.workflow_id, BagKind::Parameters)?)
  }

  pub fn get_parameter(&self, key: &str) -> Result<Option<serde_json::Value>> {
    Ok(self.get_parameters()?.get(key).cloned())
  }

  pub fn get_attributes(&self) -> Result<Bag> {
    Ok(self.store.get_bag(&self.workflow_id, BagKind::Attributes)?)
  }

  pub fn set_attribute(&self, key: &str, value: serde_json::Value) -> Result<()> {
    Ok(self.store.set_bag_entry(&self.workflow_id, BagKind::Attributes, key, value)?)
  }

  pub fn get_results(&self) -> Result<Bag> {
    Ok(self.store.get_bag(&self.workflow_id, BagKind::Results)?)
  }

  pub fn set_result(&self, key: &str, value: serde_json::Value) -> Result<()> {
    Ok(self.store.set_bag_entry(&self.workflow_id, BagKind::Results, key, value)?)
  }

  /// Records the step's continuation; `next()` itself does not suspend
  /// execution, it only tells the invoker where to go once the step body
  /// (running to completion, the "burst" model) returns.
  ///
  /// Verifies the workflow's source fingerprint first (spec property P1):
  /// a mismatch fails with `IntegrityViolation` before the continuation is
  /// recorded, so a failing `next()` never mutates `next_call` and never
  /// reaches the invoker's attachment flush.
  pub fn set_next(&self, next: NextCall) -> Result<()> {
    self.verify_fingerprint()?;
    let mut slot = self.pending_next.lock().unwrap_or_else(|e| e.into_inner());
    if slot.is_some() {
      return Err(wf_domain::EngineError::InvalidStepCall.into());
    }
    *slot = Some(next);
    Ok(())
  }

  fn verify_fingerprint(&self) -> Result<()> {
    let record = self.store.get_workflow(&self.workflow_id)?;
    let Some(expected) = record.script_fingerprint.as_ref() else {
      return Ok(());
    };
    let found = wf_domain::fingerprint::fingerprint_path(std::path::Path::new(&record.script_path))
      .map_err(|e| wf_domain::EngineError::Io(e.to_string()))?;
    if &found != expected {
      tracing::warn!(workflow = %self.workflow_id, script_path = %record.script_path, "fingerprint mismatch at next()");
      return Err(wf_domain::EngineError::IntegrityViolation { script_path: record.script_path.clone(),
                                                                expected: expected.clone(),
                                                                found }.into());
    }
    Ok(())
  }

  pub(crate) fn take_pending_next(&self) -> Option<NextCall> {
    self.pending_next.lock().unwrap_or_else(|e| e.into_inner()).take()
  }

  /// Suspends the current step (spec C9 `sleep`, called from within a step
  /// body). Recorded here rather than written straight to the store so the
  /// invoker can fold it into its single end-of-burst status write.
  pub fn sleep(&self) {
    *self.pending_sleep.lock().unwrap_or_else(|e| e.into_inner()) = true;
  }

  pub(crate) fn take_pending_sleep(&self) -> bool {
    std::mem::take(&mut *self.pending_sleep.lock().unwrap_or_else(|e| e.into_inner()))
  }

  /// Buffers a calculation id for attachment to the current step. The
  /// invoker flushes the buffer to the store, in call order, once the step
  /// body returns — attachments never land out of order relative to each
  /// other even though they are not written until the step completes.
  pub fn attach_calculation(&self, calc_id: uuid::Uuid) {
    self.attachments
        .lock()
        .unwrap_or_else(|e| e.into_inner())
        .push(self.caller_name(), Attachment::Calculation(calc_id));
  }

  pub fn attach_sub_workflow(&self, workflow_id: WorkflowId) {
    self.attachments
        .lock()
        .unwrap_or_else(|e| e.into_inner())
        .push(self.caller_name(), Attachment::SubWorkflow(workflow_id));
  }

  pub(crate) fn take_attachments(&self) -> Vec<Attachment> {
    self.attachments.lock().unwrap_or_else(|e| e.into_inner()).drain_all()
  }
}
