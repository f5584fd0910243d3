// main.rs
// The workflow daemon: polls persisted workflows that aren't finished,
// resolves each back to its step table through the resumer, and invokes
// whatever step its `next_call` points at. Administrative actions (kill,
// list, tree) live in the separate `workflow-cli` binary; this process only
// advances state.
use std::error::Error;
use std::sync::Arc;
use std::time::Duration;
use wf_calc::InMemoryCalculationRepository;
use wf_domain::{NextCall, WorkflowStatus};
use wf_engine::{demo, EngineConfig, NextEngine, WorkflowRegistry};
use wf_store::WorkflowRepository;

const POLL_INTERVAL: Duration = Duration::from_secs(2);

fn main() -> Result<(), Box<dyn Error>> {
  tracing_subscriber::fmt().with_env_filter(tracing_subscriber::EnvFilter::from_default_env()).init();

  let config = EngineConfig::from_env();
  let store: Arc<dyn WorkflowRepository> = Arc::new(wf_persistence::new_from_env()?);
  let calc_repo = Arc::new(InMemoryCalculationRepository::new());
  let engine = NextEngine::new(store.clone(), calc_repo, config.repo_root.clone());

  let mut registry = WorkflowRegistry::new(config.reserved_module_prefix.clone());
  wf_engine::register_workflow!(registry, demo::DEMO_CLASS, demo::demo_workflow);

  tracing::info!(db_url = %config.database_url, poll_user = %config.poll_user, "workflow daemon starting");
  loop {
    if let Err(e) = poll_once(&*store, &engine, &registry, &config.poll_user) {
      tracing::error!(error = %e, "poll cycle failed");
    }
    std::thread::sleep(POLL_INTERVAL);
  }
}

/// One polling pass over `user`'s unfinished workflows.
fn poll_once(store: &dyn WorkflowRepository, engine: &NextEngine, registry: &WorkflowRegistry, user: &str)
             -> Result<(), Box<dyn Error>> {
  for status in [WorkflowStatus::Created, WorkflowStatus::Running] {
    for record in store.list_workflows(user, Some(status))? {
      let definition = match registry.resolve(&record) {
        Ok(def) => def,
        Err(e) => {
          tracing::warn!(workflow = %record.id, error = %e, "cannot resolve workflow class");
          continue;
        }
      };
      let steps = definition.steps();
      let pending = store.list_steps(&record.id, None)?
                         .into_iter()
                         .find(|s| matches!(s.next_call, NextCall::Step(_)) && steps.contains(s.next_call.step_name().unwrap()));
      let start = pending.as_ref()
                          .and_then(|s| s.next_call.step_name())
                          .map(str::to_string)
                          .unwrap_or_else(|| "start".to_string());
      engine.run_to_completion(&steps, &record.id, &start, &record.user)?;
    }
  }
  Ok(())
}
