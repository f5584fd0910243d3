// scenarios.rs
// End-to-end coverage of the engine against a real store/calc-repo pair,
// exercising the continuation model, fingerprinting, restart, and the
// administrative operations together rather than in isolation.
use std::sync::Arc;
use wf_calc::InMemoryCalculationRepository;
use wf_domain::{BagKind, NextCall, StepStatus, WorkflowId, WorkflowRecord, WorkflowStatus};
use wf_engine::step::{StepContext, StepRegistry};
use wf_engine::{workflow_step, ControlOps, NextEngine, Reporter};
use wf_store::{InMemoryWorkflowRepository, WorkflowRepository};

fn write_script(contents: &[u8]) -> std::path::PathBuf {
  let path = std::env::temp_dir().join(format!("wf-scenario-{}.rs", uuid::Uuid::new_v4()));
  std::fs::write(&path, contents).unwrap();
  path
}

fn repo_root() -> std::path::PathBuf {
  std::env::temp_dir().join(format!("wf-scenario-repo-{}", uuid::Uuid::new_v4()))
}

fn new_workflow(store: &InMemoryWorkflowRepository, script_path: &std::path::Path, parent_step_id: Option<wf_domain::StepId>) -> WorkflowId {
  let id = uuid::Uuid::new_v4();
  store.create_workflow(WorkflowRecord { id,
                                          user: "alice".into(),
                                          module: "workflows::scenario".into(),
                                          module_class: "workflows::scenario::Scenario".into(),
                                          script_path: script_path.to_string_lossy().into_owned(),
                                          script_fingerprint: None,
                                          status: WorkflowStatus::Created,
                                          ctime: chrono::Utc::now(),
                                          report: String::new(),
                                          parent_step_id })
       .unwrap();
  id
}

workflow_step!(StartStep, "start", |ctx: &StepContext| {
  ctx.set_next(NextCall::Step("middle".to_string()))?;
  Ok(())
});

workflow_step!(MiddleStep, "middle", |ctx: &StepContext| {
  ctx.set_next(NextCall::Exit)?;
  Ok(())
});

fn linear_registry() -> StepRegistry {
  let mut registry = StepRegistry::new();
  registry.register(Arc::new(StartStep)).register(Arc::new(MiddleStep));
  registry
}

#[test]
fn scenario_1_straight_line_two_step_workflow() {
  let store = Arc::new(InMemoryWorkflowRepository::new());
  let calc_repo = Arc::new(InMemoryCalculationRepository::new());
  let script = write_script(b"start");
  let workflow_id = new_workflow(&store, &script, None);
  let engine = NextEngine::new(store.clone(), calc_repo, repo_root());
  let registry = linear_registry();

  engine.invoke_step(&registry, &workflow_id, "start", "alice").unwrap();
  assert_eq!(store.get_workflow(&workflow_id).unwrap().status, WorkflowStatus::Running);
  let start = store.find_step(&workflow_id, "start").unwrap().unwrap();
  assert_eq!(start.status, StepStatus::Running);
  assert_eq!(start.next_call, NextCall::Step("middle".to_string()));

  engine.invoke_step(&registry, &workflow_id, "middle", "alice").unwrap();
  let middle = store.find_step(&workflow_id, "middle").unwrap().unwrap();
  assert_eq!(middle.status, StepStatus::Running);
  assert_eq!(middle.next_call, NextCall::Exit);
}

workflow_step!(FailingStep, "start", |_ctx: &StepContext| {
  Err(wf_engine::errors::WorkflowError::Engine(wf_domain::EngineError::Other("boom".to_string())))
});

fn failing_registry() -> StepRegistry {
  let mut registry = StepRegistry::new();
  registry.register(Arc::new(FailingStep));
  registry
}

#[test]
fn scenario_2_error_then_revive() {
  let store = Arc::new(InMemoryWorkflowRepository::new());
  let calc_repo = Arc::new(InMemoryCalculationRepository::new());
  let script = write_script(b"start");
  let workflow_id = new_workflow(&store, &script, None);
  let engine = NextEngine::new(store.clone(), calc_repo.clone(), repo_root());
  let registry = failing_registry();

  let err = engine.invoke_step(&registry, &workflow_id, "start", "alice").unwrap_err();
  assert!(matches!(err, wf_engine::errors::WorkflowError::Engine(wf_domain::EngineError::Other(_))));

  let start = store.find_step(&workflow_id, "start").unwrap().unwrap();
  assert_eq!(start.status, StepStatus::Error);
  assert_eq!(start.next_call, NextCall::Pending);

  let report = Reporter::new(store.clone()).get(&workflow_id).unwrap();
  assert!(report.contains("boom"));

  let ops = ControlOps::new(store.clone(), calc_repo);
  ops.revive(&workflow_id).unwrap();

  let revived = store.find_step(&workflow_id, "start").unwrap().unwrap();
  assert_eq!(revived.status, StepStatus::Initialized);
  assert!(revived.calculations.is_empty());
  assert!(revived.sub_workflows.is_empty());
  let workflow = store.get_workflow(&workflow_id).unwrap();
  assert_eq!(workflow.status, WorkflowStatus::Running);
  assert!(workflow.script_fingerprint.is_some());
}

#[test]
fn scenario_3_fingerprint_mismatch_blocks_next_without_mutation() {
  let store = Arc::new(InMemoryWorkflowRepository::new());
  let calc_repo = Arc::new(InMemoryCalculationRepository::new());
  let script = write_script(b"original contents");
  let workflow_id = new_workflow(&store, &script, None);
  let engine = NextEngine::new(store.clone(), calc_repo, repo_root());
  let registry = linear_registry();

  // First invocation commits and seals the fingerprint over "original contents".
  engine.invoke_step(&registry, &workflow_id, "start", "alice").unwrap();
  let sealed = store.get_workflow(&workflow_id).unwrap().script_fingerprint;
  assert!(sealed.is_some());

  // Edit the source after commit, then invoke the step `start` pointed at.
  std::fs::write(&script, b"edited contents").unwrap();

  let err = engine.invoke_step(&registry, &workflow_id, "middle", "alice").unwrap_err();
  assert!(matches!(err, wf_engine::errors::WorkflowError::Engine(wf_domain::EngineError::IntegrityViolation { .. })));

  // `middle`'s set_next failed before it could record a continuation, so
  // the step the invoker created for it is left with no next_call and no
  // attachments — the mismatch never reached the flush.
  let middle = store.find_step(&workflow_id, "middle").unwrap().unwrap();
  assert_eq!(middle.status, StepStatus::Error);
  assert_eq!(middle.next_call, NextCall::Pending);
  assert!(middle.calculations.is_empty());
  assert!(middle.sub_workflows.is_empty());
}

workflow_step!(AttachingStep, "start", |ctx: &StepContext| {
  ctx.attach_calculation(uuid::Uuid::new_v4());
  ctx.attach_calculation(uuid::Uuid::new_v4());
  let sub = uuid::Uuid::new_v4();
  ctx.attach_sub_workflow(sub);
  ctx.set_next(NextCall::Step("middle".to_string()))?;
  Ok(())
});

fn attaching_registry() -> StepRegistry {
  let mut registry = StepRegistry::new();
  registry.register(Arc::new(AttachingStep)).register(Arc::new(MiddleStep));
  registry
}

#[test]
fn scenario_4_attachment_flush_ordering() {
  let store = Arc::new(InMemoryWorkflowRepository::new());
  let calc_repo = Arc::new(InMemoryCalculationRepository::new());
  let script = write_script(b"start");
  let workflow_id = new_workflow(&store, &script, None);
  let engine = NextEngine::new(store.clone(), calc_repo, repo_root());
  let registry = attaching_registry();

  let next = engine.invoke_step(&registry, &workflow_id, "start", "alice").unwrap();
  assert_eq!(next, NextCall::Step("middle".to_string()));

  let start = store.find_step(&workflow_id, "start").unwrap().unwrap();
  assert_eq!(start.calculations.len(), 2);
  assert_eq!(start.sub_workflows.len(), 1);
  assert_eq!(start.next_call, NextCall::Step("middle".to_string()));
}

#[test]
fn scenario_5_kill_cascade_forces_the_whole_tree_finished() {
  let store = Arc::new(InMemoryWorkflowRepository::new());
  let calc_repo = Arc::new(InMemoryCalculationRepository::new());
  let script_a = write_script(b"a");
  let script_b = write_script(b"b");

  let workflow_a = new_workflow(&store, &script_a, None);
  let mut step_s = wf_domain::StepRecord::new(workflow_a, "s", "alice");
  step_s.status = StepStatus::Running;
  let step_s_id = step_s.id;

  let workflow_b = new_workflow(&store, &script_b, Some(step_s_id));
  store.update_workflow(&WorkflowRecord { status: WorkflowStatus::Running, ..store.get_workflow(&workflow_b).unwrap() }).unwrap();
  step_s.sub_workflows.push(workflow_b);
  store.create_step(step_s).unwrap();

  let calc = calc_repo.spawn();
  calc.set_state(wf_calc::CalcState::Running);
  let mut step_t = wf_domain::StepRecord::new(workflow_b, "t", "alice");
  step_t.status = StepStatus::Running;
  step_t.calculations.push(calc.id());
  store.create_step(step_t).unwrap();

  let ops = ControlOps::new(store.clone(), calc_repo);
  ops.kill(&workflow_a).unwrap();

  assert_eq!(calc.state(), wf_calc::CalcState::Killed);
  assert_eq!(store.get_workflow(&workflow_b).unwrap().status, WorkflowStatus::Finished);
  assert_eq!(store.get_workflow(&workflow_a).unwrap().status, WorkflowStatus::Finished);
}

#[test]
fn scenario_6_sub_workflow_report_forwarding() {
  let store = Arc::new(InMemoryWorkflowRepository::new());
  let script_a = write_script(b"a");
  let script_b = write_script(b"b");

  let workflow_a = new_workflow(&store, &script_a, None);
  let step = wf_domain::StepRecord::new(workflow_a, "launch", "alice");
  let step_id = step.id;
  store.create_step(step).unwrap();
  let workflow_b = new_workflow(&store, &script_b, Some(step_id));

  let reporter = Reporter::new(store.clone());
  reporter.append(&workflow_b, "x").unwrap();

  assert_eq!(store.get_workflow(&workflow_a).unwrap().report, "x");
  assert_eq!(store.get_workflow(&workflow_b).unwrap().report, "");
}

#[test]
fn property_p3_at_most_one_step_record_per_workflow_and_name() {
  let store = Arc::new(InMemoryWorkflowRepository::new());
  let calc_repo = Arc::new(InMemoryCalculationRepository::new());
  let script = write_script(b"start");
  let workflow_id = new_workflow(&store, &script, None);
  let engine = NextEngine::new(store.clone(), calc_repo, repo_root());
  let registry = linear_registry();

  engine.invoke_step(&registry, &workflow_id, "start", "alice").unwrap();
  // `start` is done (next_call points at "middle"), so re-invoking it is a
  // genuine re-entry and must fail rather than create a second record.
  let err = engine.invoke_step(&registry, &workflow_id, "start", "alice").unwrap_err();
  assert!(matches!(err, wf_engine::errors::WorkflowError::Engine(wf_domain::EngineError::StepAlreadyInitialized(_))));
  assert_eq!(store.list_steps(&workflow_id, None).unwrap().iter().filter(|s| s.name == "start").count(), 1);
}

workflow_step!(PendingStep, "start", |_ctx: &StepContext| { Ok(()) });

#[test]
fn property_p4_reentry_permitted_while_pending_denied_once_advanced() {
  let store = Arc::new(InMemoryWorkflowRepository::new());
  let calc_repo = Arc::new(InMemoryCalculationRepository::new());
  let script = write_script(b"start");
  let workflow_id = new_workflow(&store, &script, None);
  let engine = NextEngine::new(store.clone(), calc_repo, repo_root());
  let mut registry = StepRegistry::new();
  registry.register(Arc::new(PendingStep));

  // Never calls next(), so next_call stays Pending: a second invocation of
  // the same step name is permitted re-entry, not a violation.
  engine.invoke_step(&registry, &workflow_id, "start", "alice").unwrap();
  assert_eq!(store.find_step(&workflow_id, "start").unwrap().unwrap().status, StepStatus::Running);
  engine.invoke_step(&registry, &workflow_id, "start", "alice").unwrap();
  assert_eq!(store.list_steps(&workflow_id, None).unwrap().iter().filter(|s| s.name == "start").count(), 1);
}

#[test]
fn property_p5_restart_clears_attachments_of_error_and_sleep_steps() {
  let store = Arc::new(InMemoryWorkflowRepository::new());
  let calc_repo = Arc::new(InMemoryCalculationRepository::new());
  let script = write_script(b"start");
  let workflow_id = new_workflow(&store, &script, None);
  let engine = NextEngine::new(store.clone(), calc_repo.clone(), repo_root());

  let mut step = wf_domain::StepRecord::new(workflow_id, "start", "alice");
  step.status = StepStatus::Error;
  let calc = calc_repo.spawn();
  calc.set_state(wf_calc::CalcState::Running);
  step.calculations.push(calc.id());
  step.sub_workflows.push(uuid::Uuid::new_v4());
  store.create_step(step).unwrap();

  let mut registry = StepRegistry::new();
  registry.register(Arc::new(PendingStep));
  engine.invoke_step(&registry, &workflow_id, "start", "alice").unwrap();

  let restarted = store.find_step(&workflow_id, "start").unwrap().unwrap();
  assert!(restarted.calculations.is_empty());
  assert!(restarted.sub_workflows.is_empty());
  assert_eq!(calc.state(), wf_calc::CalcState::Killed);
}

#[test]
fn property_p8_commit_happens_exactly_once() {
  let store = Arc::new(InMemoryWorkflowRepository::new());
  let calc_repo = Arc::new(InMemoryCalculationRepository::new());
  let script = write_script(b"start");
  let workflow_id = new_workflow(&store, &script, None);
  let engine = NextEngine::new(store.clone(), calc_repo, repo_root());
  let registry = linear_registry();

  engine.invoke_step(&registry, &workflow_id, "start", "alice").unwrap();
  let sealed_once = store.get_workflow(&workflow_id).unwrap().script_fingerprint.unwrap();

  engine.invoke_step(&registry, &workflow_id, "middle", "alice").unwrap();
  let sealed_twice = store.get_workflow(&workflow_id).unwrap().script_fingerprint.unwrap();

  assert_eq!(sealed_once, sealed_twice);
}

#[test]
fn property_p9_repository_folder_rejects_mutation_after_commit() {
  use wf_engine::{FsRepositoryFolder, RepositoryFolder};
  let folder = FsRepositoryFolder::new(repo_root()).unwrap();
  let src = write_script(b"payload");
  folder.insert_path(&src, "payload.txt").unwrap();
  folder.commit();
  let err = folder.insert_path(&src, "other.txt").unwrap_err();
  assert!(matches!(err, wf_engine::errors::WorkflowError::Engine(wf_domain::EngineError::ImmutableAfterCommit)));
}

#[test]
fn sleep_called_from_a_step_body_suspends_only_that_step() {
  workflow_step!(SleepyStep, "start", |ctx: &StepContext| {
    ctx.sleep();
    Ok(())
  });

  let store = Arc::new(InMemoryWorkflowRepository::new());
  let calc_repo = Arc::new(InMemoryCalculationRepository::new());
  let script = write_script(b"start");
  let workflow_id = new_workflow(&store, &script, None);
  let engine = NextEngine::new(store.clone(), calc_repo, repo_root());
  let mut registry = StepRegistry::new();
  registry.register(Arc::new(SleepyStep));

  engine.invoke_step(&registry, &workflow_id, "start", "alice").unwrap();

  assert_eq!(store.find_step(&workflow_id, "start").unwrap().unwrap().status, StepStatus::Sleep);
  assert_eq!(store.get_workflow(&workflow_id).unwrap().status, WorkflowStatus::Running);
}

#[test]
fn parameters_bag_is_readable_from_within_a_step() {
  workflow_step!(ReadsParamStep, "start", |ctx: &StepContext| {
    let value = ctx.get_parameter("count")?.and_then(|v| v.as_i64()).unwrap_or(0);
    ctx.set_result("doubled", serde_json::json!(value * 2))?;
    ctx.set_next(NextCall::Exit)?;
    Ok(())
  });

  let store = Arc::new(InMemoryWorkflowRepository::new());
  let calc_repo = Arc::new(InMemoryCalculationRepository::new());
  let script = write_script(b"start");
  let workflow_id = new_workflow(&store, &script, None);
  store.set_bag_entry(&workflow_id, BagKind::Parameters, "count", serde_json::json!(5)).unwrap();
  let engine = NextEngine::new(store.clone(), calc_repo, repo_root());
  let mut registry = StepRegistry::new();
  registry.register(Arc::new(ReadsParamStep));

  engine.invoke_step(&registry, &workflow_id, "start", "alice").unwrap();

  let results = store.get_bag(&workflow_id, BagKind::Results).unwrap();
  assert_eq!(results.get("doubled"), Some(&serde_json::json!(10)));
}
