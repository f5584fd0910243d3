// config.rs
// Process-wide configuration, read once from the environment (via
// `.env` + `dotenvy`, the same convention `chem-persistence::new_from_env`
// uses for its database URL).
use std::path::PathBuf;

/// Module prefix the resumer insists on before constructing a workflow
/// class by name (`DisallowedWorkflowLocation` otherwise).
pub const DEFAULT_RESERVED_PREFIX: &str = "workflows::";

/// Default poll-loop user when `WORKFLOW_POLL_USER` isn't set. The store has
/// no "list all users" query (lookups are always scoped to one user), so the
/// daemon polls a single configured user per process.
pub const DEFAULT_POLL_USER: &str = "daemon";

#[derive(Debug, Clone)]
pub struct EngineConfig {
  pub database_url: String,
  pub repo_root: PathBuf,
  pub reserved_module_prefix: String,
  pub poll_user: String,
}

impl EngineConfig {
  pub fn from_env() -> Self {
    dotenvy::dotenv().ok();
    let database_url = std::env::var("WORKFLOW_DB_URL").or_else(|_| std::env::var("DATABASE_URL"))
                                                        .unwrap_or_else(|_| "file:memdb1?mode=memory&cache=shared".into());
    let repo_root = std::env::var("WORKFLOW_REPO_ROOT").map(PathBuf::from)
                                                        .unwrap_or_else(|_| std::env::temp_dir().join("workflow-repo"));
    let reserved_module_prefix =
      std::env::var("WORKFLOW_RESERVED_PREFIX").unwrap_or_else(|_| DEFAULT_RESERVED_PREFIX.to_string());
    let poll_user = std::env::var("WORKFLOW_POLL_USER").unwrap_or_else(|_| DEFAULT_POLL_USER.to_string());
    Self { database_url, repo_root, reserved_module_prefix, poll_user }
  }
}

impl Default for EngineConfig {
  fn default() -> Self {
    Self { database_url: "file:memdb1?mode=memory&cache=shared".into(),
           repo_root: std::env::temp_dir().join("workflow-repo"),
           reserved_module_prefix: DEFAULT_RESERVED_PREFIX.to_string(),
           poll_user: DEFAULT_POLL_USER.to_string() }
  }
}
