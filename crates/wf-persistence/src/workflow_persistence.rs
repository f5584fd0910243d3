// workflow_persistence.rs
// Diesel-backed `WorkflowRepository`. Postgres in production, SQLite under
// `cfg(test)` or without the `pg` feature, selected the same way
// `chem-persistence` picked its backend.
use crate::schema;
use crate::schema::step_calculations::dsl as calc_dsl;
use crate::schema::step_sub_workflows::dsl as subwf_dsl;
use crate::schema::steps::dsl as steps_dsl;
use crate::schema::workflow_bags::dsl as bags_dsl;
use crate::schema::workflows::dsl as workflows_dsl;
use diesel::prelude::*;
use diesel::r2d2::{ConnectionManager, Pool, PooledConnection};
use diesel::result::Error as DieselError;
use diesel_migrations::{embed_migrations, EmbeddedMigrations, MigrationHarness};
use std::sync::Arc;
use uuid::Uuid;
use wf_domain::{Bag, BagKind, StepId, StepRecord, StepStatus, WorkflowId, WorkflowRecord, WorkflowStatus};
use wf_store::{Result, StoreError, WorkflowRepository};

pub const MIGRATIONS: EmbeddedMigrations = embed_migrations!("./migrations");

#[cfg(all(feature = "pg", not(test)))]
type DbPool = Pool<ConnectionManager<diesel::pg::PgConnection>>;
#[cfg(any(test, not(feature = "pg")))]
type DbPool = Pool<ConnectionManager<diesel::sqlite::SqliteConnection>>;
#[cfg(all(feature = "pg", not(test)))]
type DbConn = diesel::pg::PgConnection;
#[cfg(any(test, not(feature = "pg")))]
type DbConn = diesel::sqlite::SqliteConnection;

pub struct DieselWorkflowRepository {
  pool: Arc<DbPool>,
}

#[cfg(all(feature = "pg", not(test)))]
pub fn new_from_env() -> Result<DieselWorkflowRepository> {
  dotenvy::dotenv().ok();
  let url = std::env::var("WORKFLOW_DB_URL").or_else(|_| std::env::var("DATABASE_URL"))
                                            .map_err(|_| StoreError::Backend("WORKFLOW_DB_URL/DATABASE_URL not set".into()))?;
  if !(url.starts_with("postgres") || url.contains('@')) {
    return Err(StoreError::Backend("WORKFLOW_DB_URL does not look like a Postgres URL".into()));
  }
  Ok(DieselWorkflowRepository::new(&url))
}

#[cfg(test)]
pub fn new_from_env() -> Result<DieselWorkflowRepository> {
  dotenvy::dotenv().ok();
  let url = std::env::var("WORKFLOW_DB_URL").or_else(|_| std::env::var("DATABASE_URL"))
                                            .unwrap_or_else(|_| "file:memdb1?mode=memory&cache=shared".into());
  Ok(DieselWorkflowRepository::new(&url))
}

#[cfg(all(not(feature = "pg"), not(test)))]
pub fn new_from_env() -> Result<DieselWorkflowRepository> {
  dotenvy::dotenv().ok();
  let url = std::env::var("WORKFLOW_DB_URL").or_else(|_| std::env::var("DATABASE_URL"))
                                            .map_err(|_| StoreError::Backend("WORKFLOW_DB_URL/DATABASE_URL not set".into()))?;
  let url_l = url.to_lowercase();
  if url_l.starts_with("file:") || url_l.contains("mode=memory") || url_l.contains("sqlite") {
    return Ok(DieselWorkflowRepository::new(&url));
  }
  Err(StoreError::Backend("wf-persistence was compiled without the `pg` feature; enable it to use Postgres".into()))
}

impl DieselWorkflowRepository {
  pub fn new(database_url: &str) -> Self {
    #[cfg(any(test, not(feature = "pg")))]
    let manager = ConnectionManager::<diesel::sqlite::SqliteConnection>::new(database_url);
    #[cfg(all(feature = "pg", not(test)))]
    let manager = ConnectionManager::<diesel::pg::PgConnection>::new(database_url);
    let pool = Pool::builder().max_size(4).build(manager).expect("failed to build connection pool");
    let repo = DieselWorkflowRepository { pool: Arc::new(pool) };
    if let Ok(mut c) = repo.conn_raw() {
      #[cfg(any(test, not(feature = "pg")))]
      {
        let _ = diesel::sql_query("PRAGMA journal_mode = WAL;").execute(&mut c);
        let _ = diesel::sql_query("PRAGMA busy_timeout = 5000;").execute(&mut c);
      }
      let _ = c.run_pending_migrations(MIGRATIONS);
    }
    repo
  }

  fn conn_raw(&self) -> std::result::Result<PooledConnection<ConnectionManager<DbConn>>, r2d2::Error> {
    self.pool.get()
  }

  fn conn(&self) -> Result<PooledConnection<ConnectionManager<DbConn>>> {
    self.conn_raw().map_err(|e| StoreError::Backend(format!("pool: {e}")))
  }
}

fn map_db_err<T>(res: std::result::Result<T, DieselError>) -> Result<T> {
  res.map_err(|e| StoreError::Backend(format!("db: {e}")))
}

fn status_to_str(status: WorkflowStatus) -> &'static str {
  match status {
    WorkflowStatus::Created => "created",
    WorkflowStatus::Running => "running",
    WorkflowStatus::Sleep => "sleep",
    WorkflowStatus::Finished => "finished",
    WorkflowStatus::Error => "error",
  }
}

fn status_from_str(s: &str) -> Result<WorkflowStatus> {
  match s {
    "created" => Ok(WorkflowStatus::Created),
    "running" => Ok(WorkflowStatus::Running),
    "sleep" => Ok(WorkflowStatus::Sleep),
    "finished" => Ok(WorkflowStatus::Finished),
    "error" => Ok(WorkflowStatus::Error),
    other => Err(StoreError::Backend(format!("unknown workflow status `{other}`"))),
  }
}

fn step_status_to_str(status: StepStatus) -> &'static str {
  match status {
    StepStatus::Initialized => "initialized",
    StepStatus::Running => "running",
    StepStatus::Sleep => "sleep",
    StepStatus::Finished => "finished",
    StepStatus::Error => "error",
  }
}

fn step_status_from_str(s: &str) -> Result<StepStatus> {
  match s {
    "initialized" => Ok(StepStatus::Initialized),
    "running" => Ok(StepStatus::Running),
    "sleep" => Ok(StepStatus::Sleep),
    "finished" => Ok(StepStatus::Finished),
    "error" => Ok(StepStatus::Error),
    other => Err(StoreError::Backend(format!("unknown step status `{other}`"))),
  }
}

fn parse_uuid(s: &str) -> Result<Uuid> {
  Uuid::parse_str(s).map_err(|e| StoreError::Backend(format!("invalid uuid `{s}`: {e}")))
}

#[derive(Debug, Queryable, Insertable, AsChangeset)]
#[diesel(table_name = schema::workflows)]
struct WorkflowRow {
  id: String,
  user_name: String,
  module: String,
  module_class: String,
  script_path: String,
  script_fingerprint: Option<String>,
  status: String,
  ctime_ts: i64,
  report: String,
  parent_step_id: Option<String>,
}

impl WorkflowRow {
  fn from_record(r: &WorkflowRecord) -> Self {
    Self { id: r.id.to_string(),
           user_name: r.user.clone(),
           module: r.module.clone(),
           module_class: r.module_class.clone(),
           script_path: r.script_path.clone(),
           script_fingerprint: r.script_fingerprint.clone(),
           status: status_to_str(r.status).to_string(),
           ctime_ts: r.ctime.timestamp(),
           report: r.report.clone(),
           parent_step_id: r.parent_step_id.map(|id| id.to_string()) }
  }

  fn into_record(self) -> Result<WorkflowRecord> {
    Ok(WorkflowRecord { id: parse_uuid(&self.id)?,
                        user: self.user_name,
                        module: self.module,
                        module_class: self.module_class,
                        script_path: self.script_path,
                        script_fingerprint: self.script_fingerprint,
                        status: status_from_str(&self.status)?,
                        ctime: chrono::DateTime::from_timestamp(self.ctime_ts, 0).unwrap_or_else(chrono::Utc::now),
                        report: self.report,
                        parent_step_id: self.parent_step_id.as_deref().map(parse_uuid).transpose()? })
  }
}

#[derive(Debug, Queryable, Insertable, AsChangeset)]
#[diesel(table_name = schema::steps)]
struct StepRow {
  id: String,
  workflow_id: String,
  name: String,
  user_name: String,
  status: String,
  next_call: String,
}

impl StepRow {
  fn from_record(s: &StepRecord) -> Self {
    Self { id: s.id.to_string(),
           workflow_id: s.workflow_id.to_string(),
           name: s.name.clone(),
           user_name: s.user.clone(),
           status: step_status_to_str(s.status).to_string(),
           next_call: s.next_call.to_string() }
  }
}

impl DieselWorkflowRepository {
  fn load_step(&self, conn: &mut DbConn, row: StepRow) -> Result<StepRecord> {
    let id = parse_uuid(&row.id)?;
    let calcs: Vec<String> = calc_dsl::step_calculations.filter(calc_dsl::step_id.eq(&row.id))
                                                        .order(calc_dsl::seq.asc())
                                                        .select(calc_dsl::calc_id)
                                                        .load(conn)
                                                        .map_err(|e| StoreError::Backend(format!("db: {e}")))?;
    let sub_wfs: Vec<String> = subwf_dsl::step_sub_workflows.filter(subwf_dsl::step_id.eq(&row.id))
                                                            .order(subwf_dsl::seq.asc())
                                                            .select(subwf_dsl::workflow_id)
                                                            .load(conn)
                                                            .map_err(|e| StoreError::Backend(format!("db: {e}")))?;
    Ok(StepRecord { id,
                    workflow_id: parse_uuid(&row.workflow_id)?,
                    name: row.name,
                    user: row.user_name,
                    status: step_status_from_str(&row.status)?,
                    next_call: wf_domain::NextCall::parse(&row.next_call),
                    calculations: calcs.iter().map(|s| parse_uuid(s)).collect::<Result<_>>()?,
                    sub_workflows: sub_wfs.iter().map(|s| parse_uuid(s)).collect::<Result<_>>()? })
  }
}

impl WorkflowRepository for DieselWorkflowRepository {
  fn create_workflow(&self, record: WorkflowRecord) -> Result<()> {
    let mut conn = self.conn()?;
    let row = WorkflowRow::from_record(&record);
    map_db_err(diesel::insert_into(schema::workflows::table).values(&row).execute(&mut conn))?;
    Ok(())
  }

  fn get_workflow(&self, id: &WorkflowId) -> Result<WorkflowRecord> {
    let mut conn = self.conn()?;
    let id_s = id.to_string();
    let row = workflows_dsl::workflows.filter(workflows_dsl::id.eq(&id_s))
                                      .first::<WorkflowRow>(&mut conn)
                                      .optional()
                                      .map_err(|e| StoreError::Backend(format!("db: {e}")))?
                                      .ok_or_else(|| StoreError::NotFound(format!("workflow {id}")))?;
    row.into_record()
  }

  fn update_workflow(&self, record: &WorkflowRecord) -> Result<()> {
    let mut conn = self.conn()?;
    let id_s = record.id.to_string();
    let row = WorkflowRow::from_record(record);
    let affected =
      map_db_err(diesel::update(workflows_dsl::workflows.filter(workflows_dsl::id.eq(&id_s))).set(&row)
                                                                                              .execute(&mut conn))?;
    if affected == 0 {
      return Err(StoreError::NotFound(format!("workflow {}", record.id)));
    }
    Ok(())
  }

  fn list_workflows(&self, user: &str, status: Option<WorkflowStatus>) -> Result<Vec<WorkflowRecord>> {
    let mut conn = self.conn()?;
    let mut query = workflows_dsl::workflows.filter(workflows_dsl::user_name.eq(user)).into_boxed();
    if let Some(s) = status {
      query = query.filter(workflows_dsl::status.eq(status_to_str(s)));
    }
    let rows: Vec<WorkflowRow> = map_db_err(query.load(&mut conn))?;
    rows.into_iter().map(WorkflowRow::into_record).collect()
  }

  fn list_root_workflows(&self, user: &str, include_finished: bool) -> Result<Vec<WorkflowRecord>> {
    let mut conn = self.conn()?;
    let mut query = workflows_dsl::workflows.filter(workflows_dsl::user_name.eq(user))
                                            .filter(workflows_dsl::parent_step_id.is_null())
                                            .into_boxed();
    if !include_finished {
      query = query.filter(workflows_dsl::status.ne(status_to_str(WorkflowStatus::Finished)));
    }
    let rows: Vec<WorkflowRow> = map_db_err(query.load(&mut conn))?;
    rows.into_iter().map(WorkflowRow::into_record).collect()
  }

  fn create_step(&self, step: StepRecord) -> Result<()> {
    let mut conn = self.conn()?;
    let row = StepRow::from_record(&step);
    diesel::insert_into(schema::steps::table).values(&row)
                                             .execute(&mut conn)
                                             .map_err(|e| match e {
                                               DieselError::DatabaseError(diesel::result::DatabaseErrorKind::UniqueViolation,
                                                                           _) => {
                                                 StoreError::Conflict(format!("step `{}` already exists on workflow {}",
                                                                              step.name, step.workflow_id))
                                               }
                                               other => StoreError::Backend(format!("db: {other}")),
                                             })?;
    Ok(())
  }

  fn get_step(&self, id: &StepId) -> Result<StepRecord> {
    let mut conn = self.conn()?;
    let id_s = id.to_string();
    let row = steps_dsl::steps.filter(steps_dsl::id.eq(&id_s))
                              .first::<StepRow>(&mut conn)
                              .optional()
                              .map_err(|e| StoreError::Backend(format!("db: {e}")))?
                              .ok_or_else(|| StoreError::NotFound(format!("step {id}")))?;
    self.load_step(&mut conn, row)
  }

  fn find_step(&self, workflow_id: &WorkflowId, name: &str) -> Result<Option<StepRecord>> {
    let mut conn = self.conn()?;
    let wf_s = workflow_id.to_string();
    let opt = steps_dsl::steps.filter(steps_dsl::workflow_id.eq(&wf_s))
                              .filter(steps_dsl::name.eq(name))
                              .first::<StepRow>(&mut conn)
                              .optional()
                              .map_err(|e| StoreError::Backend(format!("db: {e}")))?;
    match opt {
      Some(row) => Ok(Some(self.load_step(&mut conn, row)?)),
      None => Ok(None),
    }
  }

  fn update_step(&self, step: &StepRecord) -> Result<()> {
    let mut conn = self.conn()?;
    let id_s = step.id.to_string();
    let row = StepRow::from_record(step);
    let affected =
      map_db_err(diesel::update(steps_dsl::steps.filter(steps_dsl::id.eq(&id_s))).set(&row).execute(&mut conn))?;
    if affected == 0 {
      return Err(StoreError::NotFound(format!("step {}", step.id)));
    }
    Ok(())
  }

  fn list_steps(&self, workflow_id: &WorkflowId, status: Option<StepStatus>) -> Result<Vec<StepRecord>> {
    let mut conn = self.conn()?;
    let wf_s = workflow_id.to_string();
    let mut query = steps_dsl::steps.filter(steps_dsl::workflow_id.eq(wf_s)).into_boxed();
    if let Some(s) = status {
      query = query.filter(steps_dsl::status.eq(step_status_to_str(s)));
    }
    let rows: Vec<StepRow> = map_db_err(query.load(&mut conn))?;
    rows.into_iter().map(|row| self.load_step(&mut conn, row)).collect()
  }

  fn append_calculation(&self, step_id: &StepId, calc_id: Uuid) -> Result<()> {
    let mut conn = self.conn()?;
    let step_s = step_id.to_string();
    let seq: i64 = calc_dsl::step_calculations.filter(calc_dsl::step_id.eq(&step_s))
                                              .count()
                                              .get_result(&mut conn)
                                              .map_err(|e| StoreError::Backend(format!("db: {e}")))?;
    map_db_err(diesel::insert_into(schema::step_calculations::table).values((calc_dsl::id.eq(Uuid::new_v4().to_string()),
                                                                             calc_dsl::step_id.eq(step_s),
                                                                             calc_dsl::calc_id.eq(calc_id.to_string()),
                                                                             calc_dsl::seq.eq(seq)))
                                                                    .execute(&mut conn))?;
    Ok(())
  }

  fn append_sub_workflow(&self, step_id: &StepId, workflow_id: WorkflowId) -> Result<()> {
    let mut conn = self.conn()?;
    let step_s = step_id.to_string();
    let seq: i64 = subwf_dsl::step_sub_workflows.filter(subwf_dsl::step_id.eq(&step_s))
                                                .count()
                                                .get_result(&mut conn)
                                                .map_err(|e| StoreError::Backend(format!("db: {e}")))?;
    map_db_err(diesel::insert_into(schema::step_sub_workflows::table).values((subwf_dsl::id.eq(Uuid::new_v4().to_string()),
                                                                              subwf_dsl::step_id.eq(step_s),
                                                                              subwf_dsl::workflow_id
                                                                                .eq(workflow_id.to_string()),
                                                                              subwf_dsl::seq.eq(seq)))
                                                                     .execute(&mut conn))?;
    Ok(())
  }

  fn get_bag(&self, workflow_id: &WorkflowId, kind: BagKind) -> Result<Bag> {
    let mut conn = self.conn()?;
    let wf_s = workflow_id.to_string();
    let kind_s = bag_kind_to_str(kind);
    let rows: Vec<(String, String)> =
      bags_dsl::workflow_bags.filter(bags_dsl::workflow_id.eq(&wf_s))
                             .filter(bags_dsl::kind.eq(kind_s))
                             .select((bags_dsl::bag_key, bags_dsl::bag_value))
                             .load(&mut conn)
                             .map_err(|e| StoreError::Backend(format!("db: {e}")))?;
    let mut bag = Bag::new();
    for (key, value) in rows {
      let parsed: serde_json::Value =
        serde_json::from_str(&value).map_err(|e| StoreError::Backend(format!("bag value: {e}")))?;
      bag.insert(key, parsed);
    }
    Ok(bag)
  }

  fn set_bag_entry(&self, workflow_id: &WorkflowId, kind: BagKind, key: &str, value: serde_json::Value) -> Result<()> {
    let mut conn = self.conn()?;
    let wf_s = workflow_id.to_string();
    let kind_s = bag_kind_to_str(kind);
    let value_s = value.to_string();
    #[cfg(feature = "pg")]
    {
      map_db_err(diesel::insert_into(schema::workflow_bags::table).values((bags_dsl::id.eq(Uuid::new_v4().to_string()),
                                                                           bags_dsl::workflow_id.eq(&wf_s),
                                                                           bags_dsl::kind.eq(kind_s),
                                                                           bags_dsl::bag_key.eq(key),
                                                                           bags_dsl::bag_value.eq(&value_s)))
                                                                  .on_conflict((bags_dsl::workflow_id,
                                                                                bags_dsl::kind,
                                                                                bags_dsl::bag_key))
                                                                  .do_update()
                                                                  .set(bags_dsl::bag_value.eq(&value_s))
                                                                  .execute(&mut conn))?;
    }
    #[cfg(not(feature = "pg"))]
    {
      let existing = bags_dsl::workflow_bags.filter(bags_dsl::workflow_id.eq(&wf_s))
                                            .filter(bags_dsl::kind.eq(kind_s))
                                            .filter(bags_dsl::bag_key.eq(key))
                                            .select(bags_dsl::id)
                                            .first::<String>(&mut conn)
                                            .optional()
                                            .map_err(|e| StoreError::Backend(format!("db: {e}")))?;
      if let Some(id) = existing {
        map_db_err(diesel::update(bags_dsl::workflow_bags.filter(bags_dsl::id.eq(id))).set(bags_dsl::bag_value.eq(&value_s))
                                                                                      .execute(&mut conn))?;
      } else {
        map_db_err(diesel::insert_into(schema::workflow_bags::table).values((bags_dsl::id.eq(Uuid::new_v4().to_string()),
                                                                             bags_dsl::workflow_id.eq(&wf_s),
                                                                             bags_dsl::kind.eq(kind_s),
                                                                             bags_dsl::bag_key.eq(key),
                                                                             bags_dsl::bag_value.eq(&value_s)))
                                                                    .execute(&mut conn))?;
      }
    }
    Ok(())
  }

  fn parent_step(&self, workflow_id: &WorkflowId) -> Result<Option<StepRecord>> {
    let parent_id = match self.get_workflow(workflow_id)?.parent_step_id {
      Some(id) => id,
      None => return Ok(None),
    };
    Ok(Some(self.get_step(&parent_id)?))
  }

  fn append_report(&self, workflow_id: &WorkflowId, line: &str) -> Result<()> {
    let mut conn = self.conn()?;
    let id_s = workflow_id.to_string();
    let current: String = workflows_dsl::workflows.filter(workflows_dsl::id.eq(&id_s))
                                                  .select(workflows_dsl::report)
                                                  .first(&mut conn)
                                                  .optional()
                                                  .map_err(|e| StoreError::Backend(format!("db: {e}")))?
                                                  .ok_or_else(|| StoreError::NotFound(format!("workflow {workflow_id}")))?;
    let new_report = if current.is_empty() { line.to_string() } else { format!("{current}\n{line}") };
    map_db_err(diesel::update(workflows_dsl::workflows.filter(workflows_dsl::id.eq(&id_s))).set(workflows_dsl::report
                                                                                                    .eq(new_report))
                                                                                           .execute(&mut conn))?;
    Ok(())
  }

  fn clear_report(&self, workflow_id: &WorkflowId) -> Result<()> {
    let mut conn = self.conn()?;
    let id_s = workflow_id.to_string();
    map_db_err(diesel::update(workflows_dsl::workflows.filter(workflows_dsl::id.eq(&id_s))).set(workflows_dsl::report
                                                                                                    .eq(""))
                                                                                           .execute(&mut conn))?;
    Ok(())
  }
}

fn bag_kind_to_str(kind: BagKind) -> &'static str {
  match kind {
    BagKind::Parameters => "parameters",
    BagKind::Attributes => "attributes",
    BagKind::Results => "results",
  }
}
