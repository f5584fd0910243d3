// reporter.rs
// Report lines always get appended to the *root* workflow's report, never a
// sub-workflow's own — so that reading the top-level workflow shows the
// whole tree's activity in one place. `Reporter::append` walks
// `parent_step_id` up to find that root before writing.
use crate::errors::Result;
use std::sync::Arc;
use wf_domain::WorkflowId;
use wf_store::WorkflowRepository;

pub struct Reporter {
  store: Arc<dyn WorkflowRepository>,
}

impl Reporter {
  pub fn new(store: Arc<dyn WorkflowRepository>) -> Self {
    Self { store }
  }

  fn root_of(&self, workflow_id: &WorkflowId) -> Result<WorkflowId> {
    let mut current = *workflow_id;
    loop {
      match self.store.parent_step(&current)? {
        Some(step) => current = step.workflow_id,
        None => return Ok(current),
      }
    }
  }

  pub fn append(&self, workflow_id: &WorkflowId, line: &str) -> Result<()> {
    let root = self.root_of(workflow_id)?;
    self.store.append_report(&root, line)?;
    Ok(())
  }

  pub fn get(&self, workflow_id: &WorkflowId) -> Result<String> {
    let root = self.root_of(workflow_id)?;
    Ok(self.store.get_workflow(&root)?.report)
  }

  pub fn clear(&self, workflow_id: &WorkflowId) -> Result<()> {
    let root = self.root_of(workflow_id)?;
    self.store.clear_report(&root)?;
    Ok(())
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use wf_domain::{StepRecord, WorkflowRecord, WorkflowStatus};
  use wf_store::InMemoryWorkflowRepository;

  fn workflow(parent_step_id: Option<wf_domain::StepId>) -> WorkflowRecord {
    WorkflowRecord { id: uuid::Uuid::new_v4(),
                     user: "alice".into(),
                     module: "workflows::demo".into(),
                     module_class: "workflows::demo::Demo".into(),
                     script_path: "demo.rs".into(),
                     script_fingerprint: None,
                     status: WorkflowStatus::Running,
                     ctime: chrono::Utc::now(),
                     report: String::new(),
                     parent_step_id }
  }

  #[test]
  fn report_lines_from_a_sub_workflow_land_on_the_root() {
    let store = Arc::new(InMemoryWorkflowRepository::new());
    let root = workflow(None);
    store.create_workflow(root.clone()).unwrap();
    let step = StepRecord::new(root.id, "launch", "alice");
    store.create_step(step.clone()).unwrap();

    let sub = workflow(Some(step.id));
    store.create_workflow(sub.clone()).unwrap();

    let reporter = Reporter::new(store.clone());
    reporter.append(&sub.id, "sub-workflow started").unwrap();

    assert_eq!(reporter.get(&root.id).unwrap(), "sub-workflow started");
    assert_eq!(reporter.get(&sub.id).unwrap(), "sub-workflow started");
  }
}
