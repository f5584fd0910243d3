// repository.rs
// The `WorkflowRepository` trait: the contract the engine consumes and the
// persistence layer (in-memory here, Diesel-backed in `wf-persistence`)
// implements. Mirrors the "Persistence layer (consumed)" external interface.
use crate::errors::Result;
use wf_domain::{Bag, BagKind, StepId, StepRecord, StepStatus, WorkflowId, WorkflowRecord, WorkflowStatus};

pub trait WorkflowRepository: Send + Sync {
  // -- workflow records --------------------------------------------------
  fn create_workflow(&self, record: WorkflowRecord) -> Result<()>;
  fn get_workflow(&self, id: &WorkflowId) -> Result<WorkflowRecord>;
  fn update_workflow(&self, record: &WorkflowRecord) -> Result<()>;
  /// Lists workflows owned by `user`, optionally filtered to one status.
  fn list_workflows(&self, user: &str, status: Option<WorkflowStatus>) -> Result<Vec<WorkflowRecord>>;
  /// Lists only the workflows that are not sub-workflows of another step
  /// (`parent_step_id.is_none()`), for `list_workflows`'s CLI surface.
  fn list_root_workflows(&self, user: &str, include_finished: bool) -> Result<Vec<WorkflowRecord>>;

  // -- step records --------------------------------------------------------
  fn create_step(&self, step: StepRecord) -> Result<()>;
  fn get_step(&self, id: &StepId) -> Result<StepRecord>;
  /// Looks a step up by its owning workflow and name; the (workflow, name)
  /// pair is unique per workflow (spec's `StepAlreadyInitialized` guard).
  fn find_step(&self, workflow_id: &WorkflowId, name: &str) -> Result<Option<StepRecord>>;
  fn update_step(&self, step: &StepRecord) -> Result<()>;
  fn list_steps(&self, workflow_id: &WorkflowId, status: Option<StepStatus>) -> Result<Vec<StepRecord>>;

  // -- attachments (append-only lists per step) ---------------------------
  fn append_calculation(&self, step_id: &StepId, calc_id: uuid::Uuid) -> Result<()>;
  fn append_sub_workflow(&self, step_id: &StepId, workflow_id: WorkflowId) -> Result<()>;

  // -- key-value bags -------------------------------------------------------
  fn get_bag(&self, workflow_id: &WorkflowId, kind: BagKind) -> Result<Bag>;
  fn set_bag_entry(&self, workflow_id: &WorkflowId, kind: BagKind, key: &str, value: serde_json::Value) -> Result<()>;

  // -- relationships --------------------------------------------------------
  /// The step this workflow is attached to as a sub-workflow, if any.
  fn parent_step(&self, workflow_id: &WorkflowId) -> Result<Option<StepRecord>>;

  // -- report text ------------------------------------------------------------
  fn append_report(&self, workflow_id: &WorkflowId, line: &str) -> Result<()>;
  fn clear_report(&self, workflow_id: &WorkflowId) -> Result<()>;
}
