// demo.rs
// A small concrete workflow exercising the whole stack end to end: two
// steps, a parameter read, an attached calculation, a report line and a
// clean exit. Registered under the reserved `workflows::` namespace so the
// resumer will actually accept it.
use crate::resumer::WorkflowDefinition;
use crate::step::{StepContext, StepRegistry};
use crate::workflow_step;
use wf_domain::NextCall;

workflow_step!(StartStep, "start", |ctx: &StepContext| {
  let multiplier = ctx.get_parameter("multiplier")?.and_then(|v| v.as_i64()).unwrap_or(1);
  ctx.set_attribute("multiplier", serde_json::json!(multiplier))?;

  ctx.attach_calculation(uuid::Uuid::new_v4());

  ctx.set_next(NextCall::Step("finish".to_string()))?;
  Ok(())
});

workflow_step!(FinishStep, "finish", |ctx: &StepContext| {
  let attrs = ctx.get_attributes()?;
  let multiplier = attrs.get("multiplier").and_then(|v| v.as_i64()).unwrap_or(1);
  ctx.set_result("doubled", serde_json::json!(multiplier * 2))?;
  ctx.set_next(NextCall::Exit)?;
  Ok(())
});

pub struct DemoWorkflow;

impl WorkflowDefinition for DemoWorkflow {
  fn steps(&self) -> StepRegistry {
    let mut registry = StepRegistry::new();
    registry.register(std::sync::Arc::new(StartStep)).register(std::sync::Arc::new(FinishStep));
    registry
  }
}

pub fn demo_workflow() -> Box<dyn WorkflowDefinition> {
  Box::new(DemoWorkflow)
}

pub const DEMO_MODULE: &str = "workflows::demo";
pub const DEMO_CLASS: &str = "workflows::demo::DemoWorkflow";

#[cfg(test)]
mod tests {
  use super::*;
  use crate::next_engine::NextEngine;
  use std::sync::Arc;
  use wf_calc::InMemoryCalculationRepository;
  use wf_domain::{WorkflowRecord, WorkflowStatus};
  use wf_store::InMemoryWorkflowRepository;

  #[test]
  fn demo_workflow_runs_to_completion_and_doubles_the_parameter() {
    let store = Arc::new(InMemoryWorkflowRepository::new());
    let calc_repo = Arc::new(InMemoryCalculationRepository::new());
    let workflow_id = uuid::Uuid::new_v4();

    let script_path = std::env::temp_dir().join(format!("wf-engine-demo-{workflow_id}.rs"));
    std::fs::write(&script_path, b"fn main() {}").unwrap();

    store.create_workflow(WorkflowRecord { id: workflow_id,
                                            user: "alice".into(),
                                            module: DEMO_MODULE.into(),
                                            module_class: DEMO_CLASS.into(),
                                            script_path: script_path.to_string_lossy().into_owned(),
                                            script_fingerprint: None,
                                            status: WorkflowStatus::Created,
                                            ctime: chrono::Utc::now(),
                                            report: String::new(),
                                            parent_step_id: None })
         .unwrap();
    store.set_bag_entry(&workflow_id, wf_domain::BagKind::Parameters, "multiplier", serde_json::json!(21)).unwrap();

    let repo_root = std::env::temp_dir().join(format!("wf-engine-demo-repo-{workflow_id}"));
    let engine = NextEngine::new(store.clone(), calc_repo.clone(), repo_root);
    let registry = demo_workflow().steps();
    engine.run_to_completion(&registry, &workflow_id, "start", "alice").unwrap();

    let results = store.get_bag(&workflow_id, wf_domain::BagKind::Results).unwrap();
    assert_eq!(results.get("doubled"), Some(&serde_json::json!(42)));
    assert_eq!(store.get_workflow(&workflow_id).unwrap().status, WorkflowStatus::Finished);
  }
}
