// stubs.rs
// In-memory `WorkflowRepository` for tests, demos and engine wiring. Not
// durable, not concurrency-isolated beyond the mutexes below — a reference
// implementation, not a production backend (see `wf-persistence` for that).
use crate::errors::{Result, StoreError};
use crate::repository::WorkflowRepository;
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};
use wf_domain::{Bag, BagKind, StepId, StepRecord, StepStatus, WorkflowId, WorkflowRecord, WorkflowStatus};

#[derive(Default)]
pub struct InMemoryWorkflowRepository {
  workflows: Mutex<HashMap<WorkflowId, WorkflowRecord>>,
  steps: Mutex<HashMap<StepId, StepRecord>>,
  /// (workflow_id, step name) -> step id, enforcing the unique-name-per-workflow rule.
  step_names: Mutex<HashMap<(WorkflowId, String), StepId>>,
  bags: Mutex<HashMap<(WorkflowId, BagKind), Bag>>,
}

impl InMemoryWorkflowRepository {
  pub fn new() -> Self {
    Self::default()
  }

  /// Maps a poisoned mutex into a `StoreError::Backend` instead of panicking.
  fn lock<'a, T>(&'a self, m: &'a Mutex<T>) -> std::result::Result<MutexGuard<'a, T>, StoreError> {
    m.lock().map_err(|e| StoreError::Backend(format!("mutex poisoned: {e}")))
  }
}

impl WorkflowRepository for InMemoryWorkflowRepository {
  fn create_workflow(&self, record: WorkflowRecord) -> Result<()> {
    self.lock(&self.workflows)?.insert(record.id, record);
    Ok(())
  }

  fn get_workflow(&self, id: &WorkflowId) -> Result<WorkflowRecord> {
    self.lock(&self.workflows)?
        .get(id)
        .cloned()
        .ok_or_else(|| StoreError::NotFound(format!("workflow {id}")))
  }

  fn update_workflow(&self, record: &WorkflowRecord) -> Result<()> {
    let mut workflows = self.lock(&self.workflows)?;
    if !workflows.contains_key(&record.id) {
      return Err(StoreError::NotFound(format!("workflow {}", record.id)));
    }
    workflows.insert(record.id, record.clone());
    Ok(())
  }

  fn list_workflows(&self, user: &str, status: Option<WorkflowStatus>) -> Result<Vec<WorkflowRecord>> {
    let workflows = self.lock(&self.workflows)?;
    Ok(workflows.values()
                .filter(|w| w.user == user)
                .filter(|w| status.map_or(true, |s| w.status == s))
                .cloned()
                .collect())
  }

  fn list_root_workflows(&self, user: &str, include_finished: bool) -> Result<Vec<WorkflowRecord>> {
    let workflows = self.lock(&self.workflows)?;
    Ok(workflows.values()
                .filter(|w| w.user == user)
                .filter(|w| !w.is_subworkflow())
                .filter(|w| include_finished || w.status != WorkflowStatus::Finished)
                .cloned()
                .collect())
  }

  fn create_step(&self, step: StepRecord) -> Result<()> {
    let key = (step.workflow_id, step.name.clone());
    let mut names = self.lock(&self.step_names)?;
    if names.contains_key(&key) {
      return Err(StoreError::Conflict(format!("step `{}` already exists on workflow {}", step.name, step.workflow_id)));
    }
    names.insert(key, step.id);
    self.lock(&self.steps)?.insert(step.id, step);
    Ok(())
  }

  fn get_step(&self, id: &StepId) -> Result<StepRecord> {
    self.lock(&self.steps)?.get(id).cloned().ok_or_else(|| StoreError::NotFound(format!("step {id}")))
  }

  fn find_step(&self, workflow_id: &WorkflowId, name: &str) -> Result<Option<StepRecord>> {
    let names = self.lock(&self.step_names)?;
    match names.get(&(*workflow_id, name.to_string())) {
      Some(id) => Ok(self.lock(&self.steps)?.get(id).cloned()),
      None => Ok(None),
    }
  }

  fn update_step(&self, step: &StepRecord) -> Result<()> {
    let mut steps = self.lock(&self.steps)?;
    if !steps.contains_key(&step.id) {
      return Err(StoreError::NotFound(format!("step {}", step.id)));
    }
    steps.insert(step.id, step.clone());
    Ok(())
  }

  fn list_steps(&self, workflow_id: &WorkflowId, status: Option<StepStatus>) -> Result<Vec<StepRecord>> {
    let steps = self.lock(&self.steps)?;
    Ok(steps.values()
            .filter(|s| &s.workflow_id == workflow_id)
            .filter(|s| status.map_or(true, |st| s.status == st))
            .cloned()
            .collect())
  }

  fn append_calculation(&self, step_id: &StepId, calc_id: uuid::Uuid) -> Result<()> {
    let mut steps = self.lock(&self.steps)?;
    let step = steps.get_mut(step_id).ok_or_else(|| StoreError::NotFound(format!("step {step_id}")))?;
    step.calculations.push(calc_id);
    Ok(())
  }

  fn append_sub_workflow(&self, step_id: &StepId, workflow_id: WorkflowId) -> Result<()> {
    let mut steps = self.lock(&self.steps)?;
    let step = steps.get_mut(step_id).ok_or_else(|| StoreError::NotFound(format!("step {step_id}")))?;
    step.sub_workflows.push(workflow_id);
    Ok(())
  }

  fn get_bag(&self, workflow_id: &WorkflowId, kind: BagKind) -> Result<Bag> {
    Ok(self.lock(&self.bags)?.get(&(*workflow_id, kind)).cloned().unwrap_or_default())
  }

  fn set_bag_entry(&self, workflow_id: &WorkflowId, kind: BagKind, key: &str, value: serde_json::Value) -> Result<()> {
    let mut bags = self.lock(&self.bags)?;
    bags.entry((*workflow_id, kind)).or_default().insert(key.to_string(), value);
    Ok(())
  }

  fn parent_step(&self, workflow_id: &WorkflowId) -> Result<Option<StepRecord>> {
    let parent_step_id = match self.get_workflow(workflow_id)?.parent_step_id {
      Some(id) => id,
      None => return Ok(None),
    };
    Ok(Some(self.get_step(&parent_step_id)?))
  }

  fn append_report(&self, workflow_id: &WorkflowId, line: &str) -> Result<()> {
    let mut workflows = self.lock(&self.workflows)?;
    let workflow = workflows.get_mut(workflow_id).ok_or_else(|| StoreError::NotFound(format!("workflow {workflow_id}")))?;
    if !workflow.report.is_empty() {
      workflow.report.push('\n');
    }
    workflow.report.push_str(line);
    Ok(())
  }

  fn clear_report(&self, workflow_id: &WorkflowId) -> Result<()> {
    let mut workflows = self.lock(&self.workflows)?;
    let workflow = workflows.get_mut(workflow_id).ok_or_else(|| StoreError::NotFound(format!("workflow {workflow_id}")))?;
    workflow.report.clear();
    Ok(())
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use chrono::Utc;
  use uuid::Uuid;

  fn sample_workflow(user: &str) -> WorkflowRecord {
    WorkflowRecord { id: Uuid::new_v4(),
                     user: user.to_string(),
                     module: "demo_workflows".into(),
                     module_class: "DemoWorkflow".into(),
                     script_path: "demo_workflows.py".into(),
                     script_fingerprint: None,
                     status: WorkflowStatus::Created,
                     ctime: Utc::now(),
                     report: String::new(),
                     parent_step_id: None }
  }

  #[test]
  fn duplicate_step_name_is_a_conflict() {
    let repo = InMemoryWorkflowRepository::new();
    let wf = sample_workflow("alice");
    repo.create_workflow(wf.clone()).unwrap();
    repo.create_step(StepRecord::new(wf.id, "start", "alice")).unwrap();
    let err = repo.create_step(StepRecord::new(wf.id, "start", "alice")).unwrap_err();
    assert!(matches!(err, StoreError::Conflict(_)));
  }

  #[test]
  fn root_workflows_excludes_subworkflows_and_respects_finished_filter() {
    let repo = InMemoryWorkflowRepository::new();
    let mut root = sample_workflow("bob");
    root.status = WorkflowStatus::Finished;
    repo.create_workflow(root.clone()).unwrap();

    let step = StepRecord::new(root.id, "start", "bob");
    repo.create_step(step.clone()).unwrap();

    let mut sub = sample_workflow("bob");
    sub.parent_step_id = Some(step.id);
    repo.create_workflow(sub).unwrap();

    let visible = repo.list_root_workflows("bob", false).unwrap();
    assert!(visible.is_empty());
    let all = repo.list_root_workflows("bob", true).unwrap();
    assert_eq!(all.len(), 1);
    assert_eq!(all[0].id, root.id);
  }

  #[test]
  fn bag_entries_accumulate_by_key() {
    let repo = InMemoryWorkflowRepository::new();
    let wf = sample_workflow("carol");
    repo.create_workflow(wf.clone()).unwrap();
    repo.set_bag_entry(&wf.id, BagKind::Parameters, "x", serde_json::json!(1)).unwrap();
    repo.set_bag_entry(&wf.id, BagKind::Parameters, "y", serde_json::json!(2)).unwrap();
    let bag = repo.get_bag(&wf.id, BagKind::Parameters).unwrap();
    assert_eq!(bag.get("x"), Some(&serde_json::json!(1)));
    assert_eq!(bag.get("y"), Some(&serde_json::json!(2)));
  }
}
