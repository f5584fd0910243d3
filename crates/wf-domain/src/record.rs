// record.rs
// Core data model shared by the store and the engine: workflow/step records,
// their status enums, the next-call sentinel, and the three key-value bags.
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub type WorkflowId = Uuid;
pub type StepId = Uuid;

/// Reserved next-call string for "no further steps" (see spec GLOSSARY).
pub const EXIT_SENTINEL: &str = "__exit__";
/// Reserved next-call string for "not yet set".
pub const DEFAULT_SENTINEL: &str = "__default__";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowStatus {
  Created,
  Running,
  Sleep,
  Finished,
  Error,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
  Initialized,
  Running,
  Sleep,
  Finished,
  Error,
}

impl StepStatus {
  /// Steps in these statuses are the "clean restart" candidates of C6 step
  /// 4/5: invoking them again first kills and clears their attachments.
  pub fn is_restartable(&self) -> bool {
    matches!(self, StepStatus::Error | StepStatus::Sleep)
  }
}

/// The reserved next-call value, kept as a distinct enum instead of raw
/// strings so `Pending` and `Exit` can never compare equal by accident
/// (Open Question (a) in spec §9, decided: treat them as distinct).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum NextCall {
  /// `__default__`: no `next()` has been issued yet.
  Pending,
  /// `__exit__`: explicit "no successor" sentinel.
  Exit,
  /// Names a step of the owning workflow's class.
  Step(String),
}

impl NextCall {
  pub fn is_pending(&self) -> bool {
    matches!(self, NextCall::Pending)
  }

  pub fn is_exit(&self) -> bool {
    matches!(self, NextCall::Exit)
  }

  pub fn step_name(&self) -> Option<&str> {
    match self {
      NextCall::Step(name) => Some(name.as_str()),
      _ => None,
    }
  }

  /// Mirrors P4's reentry-guard condition: is this next_call one of the two
  /// values that make re-invoking the *same* step name acceptable?
  pub fn permits_reentry_of(&self, step_name: &str) -> bool {
    match self {
      NextCall::Pending => true,
      NextCall::Step(n) => n == step_name,
      NextCall::Exit => false,
    }
  }

  /// Inverse of `Display`; used by persistence backends that store the
  /// rendered sentinel/name as a plain string column.
  pub fn parse(value: &str) -> NextCall {
    match value {
      DEFAULT_SENTINEL => NextCall::Pending,
      EXIT_SENTINEL => NextCall::Exit,
      other => NextCall::Step(other.to_string()),
    }
  }
}

impl std::fmt::Display for NextCall {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    match self {
      NextCall::Pending => write!(f, "{DEFAULT_SENTINEL}"),
      NextCall::Exit => write!(f, "{EXIT_SENTINEL}"),
      NextCall::Step(name) => write!(f, "{name}"),
    }
  }
}

/// A workflow instance as persisted (spec §3 "Workflow instance").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowRecord {
  pub id: WorkflowId,
  pub user: String,
  /// Registry key used by the resumer to locate the user class (C8).
  pub module: String,
  pub module_class: String,
  pub script_path: String,
  /// `None` until first commit seals it.
  pub script_fingerprint: Option<String>,
  pub status: WorkflowStatus,
  pub ctime: chrono::DateTime<chrono::Utc>,
  pub report: String,
  /// When `Some`, this workflow is a sub-workflow attached to that step.
  pub parent_step_id: Option<StepId>,
}

impl WorkflowRecord {
  pub fn is_subworkflow(&self) -> bool {
    self.parent_step_id.is_some()
  }
}

/// A step record as persisted (spec §3 "Step").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepRecord {
  pub id: StepId,
  pub workflow_id: WorkflowId,
  pub name: String,
  pub user: String,
  pub status: StepStatus,
  pub next_call: NextCall,
  /// Opaque calculation handles attached to this step, insertion order.
  pub calculations: Vec<Uuid>,
  /// Sub-workflow ids attached to this step, insertion order.
  pub sub_workflows: Vec<WorkflowId>,
}

impl StepRecord {
  pub fn new(workflow_id: WorkflowId, name: impl Into<String>, user: impl Into<String>) -> Self {
    Self { id: Uuid::new_v4(),
           workflow_id,
           name: name.into(),
           user: user.into(),
           status: StepStatus::Initialized,
           next_call: NextCall::Pending,
           calculations: Vec::new(),
           sub_workflows: Vec::new() }
  }
}

/// Which of the three bags (spec §3 "Parameters / attributes / results") a
/// store operation addresses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BagKind {
  Parameters,
  Attributes,
  Results,
}

/// An ordered key-value bag. `IndexMap` keeps insertion order, which is not
/// load-bearing for correctness but makes `format_tree`/debugging output
/// reproducible, matching `StepExecutionInfo.parameters`'s intent in the
/// teacher's `chem-workflow::step` module.
pub type Bag = IndexMap<String, serde_json::Value>;
