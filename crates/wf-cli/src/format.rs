// format.rs
// Tree/table rendering for the CLI's read-only views. Kept out of main.rs
// so it can be unit tested without a database.
use chrono::Utc;
use wf_domain::{WorkflowRecord, WorkflowStatus};

/// One line of `list_workflows` / `format_tree` output for a single
/// workflow, before its steps/sub-workflows are recursed into.
pub fn format_workflow_line(record: &WorkflowRecord, tab: usize, extended: bool, prefix: &str) -> String {
  let indent = " ".repeat(tab);
  let status = status_label(record.status);
  let mut line = format!("{prefix}{indent}[{status}] {} ({})", record.id, record.module_class);
  if extended {
    let age = Utc::now().signed_duration_since(record.ctime);
    line.push_str(&format!(" age={}s user={}", age.num_seconds().max(0), record.user));
  }
  line
}

pub fn status_label(status: WorkflowStatus) -> &'static str {
  match status {
    WorkflowStatus::Created => "created",
    WorkflowStatus::Running => "running",
    WorkflowStatus::Sleep => "sleep",
    WorkflowStatus::Finished => "finished",
    WorkflowStatus::Error => "error",
  }
}

/// Renders the flat list of root workflows the CLI's `list` subcommand
/// shows. Empty input renders a sentinel comment line rather than nothing,
/// so a script piping this output can always expect at least one line. The
/// sentinel's wording depends on `include_finished`: without it, an empty
/// result only means no workflows are currently running.
pub fn format_workflow_list(records: &[WorkflowRecord], extended: bool, tab: usize, include_finished: bool) -> String {
  if records.is_empty() {
    return if include_finished { "# No workflows found".to_string() } else { "# No running workflows found".to_string() };
  }
  records.iter().map(|r| format_workflow_line(r, tab, extended, "")).collect::<Vec<_>>().join("\n")
}
