// main.rs
// Administrative CLI for the workflow engine: kill workflows, list the ones
// a user owns, and print a workflow's step/sub-workflow tree. The daemon
// that actually advances workflows lives in the workspace root binary; this
// tool only reads and administers already-persisted state.
mod format;

use clap::{Parser, Subcommand};
use std::error::Error;
use std::sync::Arc;
use uuid::Uuid;
use wf_calc::InMemoryCalculationRepository;
use wf_domain::{StepStatus, WorkflowId};
use wf_engine::ControlOps;
use wf_store::WorkflowRepository;

#[derive(Parser)]
#[command(name = "workflow-cli", about = "Administer persisted workflows")]
struct Cli {
  #[command(subcommand)]
  command: Command,
}

#[derive(Subcommand)]
enum Command {
  /// Kill a single workflow by id.
  Kill {
    #[arg(long)]
    uuid: Uuid,
  },
  /// Kill every unfinished root workflow owned by a user.
  KillAll {
    #[arg(long)]
    user: String,
  },
  /// List a user's root workflows.
  List {
    #[arg(long)]
    user: String,
    #[arg(long, default_value_t = false)]
    extended: bool,
    #[arg(long, default_value_t = false)]
    include_finished: bool,
    #[arg(long, default_value_t = 2)]
    tab: usize,
  },
  /// Print a workflow's full tree: its steps and any attached sub-workflows.
  Tree {
    #[arg(long)]
    uuid: Uuid,
    #[arg(long, default_value_t = false)]
    extended: bool,
    #[arg(long, default_value_t = 2)]
    tab: usize,
  },
}

fn main() -> Result<(), Box<dyn Error>> {
  tracing_subscriber::fmt().with_env_filter(tracing_subscriber::EnvFilter::from_default_env()).init();

  let store: Arc<dyn WorkflowRepository> = Arc::new(wf_persistence::new_from_env()?);
  let calc_repo = Arc::new(InMemoryCalculationRepository::new());
  let control = ControlOps::new(store.clone(), calc_repo);

  match Cli::parse().command {
    Command::Kill { uuid } => {
      control.kill(&uuid)?;
      println!("killed {uuid}");
    }
    Command::KillAll { user } => {
      let count = control.kill_all(&user)?;
      println!("killed {count} workflow(s) for {user}");
    }
    Command::List { user, extended, include_finished, tab } => {
      let records = store.list_root_workflows(&user, include_finished)?;
      println!("{}", format::format_workflow_list(&records, extended, tab, include_finished));
    }
    Command::Tree { uuid, extended, tab } => {
      print_tree(&*store, &uuid, extended, tab, "")?;
    }
  }
  Ok(())
}

fn print_tree(store: &dyn WorkflowRepository, workflow_id: &WorkflowId, extended: bool, tab: usize, prefix: &str)
              -> Result<(), Box<dyn Error>> {
  let record = store.get_workflow(workflow_id)?;
  println!("{}", format::format_workflow_line(&record, tab, extended, prefix));

  let steps = store.list_steps(workflow_id, None)?;
  if steps.is_empty() {
    println!("{prefix}{}No steps recorded.", " ".repeat(tab));
    return Ok(());
  }
  let step_prefix = format!("{prefix}{}", " ".repeat(tab));
  for step in steps {
    let marker = match step.status {
      StepStatus::Finished => "done",
      StepStatus::Error => "error",
      StepStatus::Running => "running",
      StepStatus::Sleep => "sleep",
      StepStatus::Initialized => "initialized",
    };
    println!("{step_prefix}- {} [{marker}] next={}", step.name, step.next_call);
    for calc_id in &step.calculations {
      println!("{step_prefix}  calc {calc_id}");
    }
    for sub_id in &step.sub_workflows {
      print_tree(store, sub_id, extended, tab, &format!("{step_prefix}  "))?;
    }
  }
  Ok(())
}
