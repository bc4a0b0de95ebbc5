// Archivo: flow_persistence.rs
// Propósito: implementación Diesel de la unidad de trabajo del motor.
//
// `DieselWorkflowStore` abre una transacción por operación y entrega un
// `DieselTx` al motor. Bloqueo de filas:
// - Postgres (`pg`): `SELECT ... FOR UPDATE` sobre la solicitud, sus etapas y
//   el molde.
// - SQLite: la transacción se abre con `BEGIN IMMEDIATE`, que toma el bloqueo
//   de escritura de la base completa antes de la primera lectura.
use crate::schema;
use crate::schema::approval_stages::dsl as st_dsl;
use crate::schema::checklist_captures::dsl as cc_dsl;
use crate::schema::repair_requests::dsl as rr_dsl;
use crate::schema::scrapping_requests::dsl as sr_dsl;
use crate::schema::transfer_requests::dsl as tr_dsl;
use crate::schema::workflow_history::dsl as wh_dsl;
use crate::{from_millis, parse_uuid};
use chrono::{DateTime, Utc};
use diesel::prelude::*;
use diesel::r2d2::{ConnectionManager, Pool, PooledConnection};
use diesel::result::Error as DieselError;
use diesel_migrations::{embed_migrations, EmbeddedMigrations, MigrationHarness};
use flow::{ApprovalStage, ChecklistCapture, FlowError, HistoryAction, HistoryEntry, RepairDetails, Result,
           ScrappingDetails, StageStatus, TransferDetails, WorkflowDetails, WorkflowFilter, WorkflowKind, WorkflowRequest,
           WorkflowStatus, WorkflowStore, WorkflowTx};
use log::{debug, info};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;
use uuid::Uuid;

pub const MIGRATIONS: EmbeddedMigrations = embed_migrations!("./migrations");

#[cfg(feature = "pg")]
pub(crate) type DbConn = PgConnection;
#[cfg(not(feature = "pg"))]
pub(crate) type DbConn = SqliteConnection;
type DbPool = Pool<ConnectionManager<DbConn>>;

/// Error interno del cierre transaccional: Diesel exige `From<DieselError>`.
#[derive(Debug, Error)]
enum TxError {
    #[error("db: {0}")]
    Db(#[from] DieselError),
    #[error(transparent)]
    Flow(#[from] FlowError),
}

impl From<TxError> for FlowError {
    fn from(e: TxError) -> Self {
        match e {
            TxError::Db(e) => FlowError::Storage(format!("db: {}", e)),
            TxError::Flow(e) => e,
        }
    }
}

fn map_db_err<T>(res: std::result::Result<T, DieselError>) -> Result<T> {
    res.map_err(|e| FlowError::Storage(format!("db: {}", e)))
}

fn uuid_col(s: &str) -> Result<Uuid> {
    parse_uuid(s).map_err(FlowError::Storage)
}

fn ts_col(ms: i64) -> Result<DateTime<Utc>> {
    from_millis(ms).map_err(FlowError::Storage)
}

fn stored_status(kind: WorkflowKind, s: &str) -> Result<WorkflowStatus> {
    WorkflowStatus::parse(kind, s).map_err(|e| FlowError::Storage(format!("estado almacenado inválido: {}", e)))
}

/// Consulta por id con bloqueo de fila cuando el backend lo soporta.
macro_rules! load_by_id {
    ($conn:expr, $table:expr, $idcol:expr, $row:ty, $id:expr, $lock:expr) => {{
        let query = $table.filter($idcol.eq($id));
        #[cfg(feature = "pg")]
        let res = if $lock {
            query.for_update().first::<$row>($conn).optional()
        } else {
            query.first::<$row>($conn).optional()
        };
        #[cfg(not(feature = "pg"))]
        let res = {
            let _ = $lock;
            query.first::<$row>($conn).optional()
        };
        res
    }};
}

// --- filas ---

#[derive(Debug, Queryable, Insertable)]
#[diesel(table_name = schema::transfer_requests)]
struct TransferRow {
    id: String,
    mold_id: String,
    status: String,
    requested_by: String,
    from_company_id: String,
    to_company_id: String,
    developer_id: String,
    created_at_ts: i64,
    updated_at_ts: i64,
}

#[derive(Debug, Queryable, Insertable)]
#[diesel(table_name = schema::repair_requests)]
struct RepairRow {
    id: String,
    mold_id: String,
    status: String,
    requested_by: String,
    priority: String,
    title: String,
    description: String,
    checklist_instance_id: Option<String>,
    created_at_ts: i64,
    updated_at_ts: i64,
}

#[derive(Debug, Queryable, Insertable)]
#[diesel(table_name = schema::scrapping_requests)]
struct ScrappingRow {
    id: String,
    mold_id: String,
    status: String,
    requested_by: String,
    reason: String,
    current_shots: i64,
    estimated_scrap_value: Option<f64>,
    created_at_ts: i64,
    updated_at_ts: i64,
}

#[derive(Debug, Queryable, Insertable)]
#[diesel(table_name = schema::approval_stages)]
struct StageRow {
    workflow_kind: String,
    workflow_id: String,
    stage_order: i32,
    stage_name: String,
    stage_status: String,
    approver_id: Option<String>,
    decided_at_ts: Option<i64>,
    comments: Option<String>,
}

#[derive(Debug, Queryable, Insertable)]
#[diesel(table_name = schema::workflow_history)]
struct HistoryRow {
    id: String,
    workflow_kind: String,
    workflow_id: String,
    sequence: i64,
    action_type: String,
    old_status: Option<String>,
    new_status: String,
    actor_id: String,
    occurred_at_ts: i64,
    metadata: String,
    command_id: Option<String>,
}

#[derive(Debug, Queryable, Insertable)]
#[diesel(table_name = schema::checklist_captures)]
struct ChecklistRow {
    workflow_kind: String,
    workflow_id: String,
    stage_key: String,
    categories: String,
    captured_by: String,
    captured_at_ts: i64,
}

impl TransferRow {
    fn into_request(self) -> Result<WorkflowRequest> {
        let kind = WorkflowKind::Transfer;
        Ok(WorkflowRequest { id: uuid_col(&self.id)?,
                             kind,
                             mold_id: uuid_col(&self.mold_id)?,
                             status: stored_status(kind, &self.status)?,
                             requested_by: uuid_col(&self.requested_by)?,
                             created_at: ts_col(self.created_at_ts)?,
                             updated_at: ts_col(self.updated_at_ts)?,
                             details: WorkflowDetails::Transfer(TransferDetails { from_company_id:
                                                                                      uuid_col(&self.from_company_id)?,
                                                                                  to_company_id:
                                                                                      uuid_col(&self.to_company_id)?,
                                                                                  developer_id:
                                                                                      uuid_col(&self.developer_id)? }) })
    }
}

impl RepairRow {
    fn into_request(self) -> Result<WorkflowRequest> {
        let kind = WorkflowKind::Repair;
        let checklist_instance_id = self.checklist_instance_id.as_deref().map(uuid_col).transpose()?;
        Ok(WorkflowRequest { id: uuid_col(&self.id)?,
                             kind,
                             mold_id: uuid_col(&self.mold_id)?,
                             status: stored_status(kind, &self.status)?,
                             requested_by: uuid_col(&self.requested_by)?,
                             created_at: ts_col(self.created_at_ts)?,
                             updated_at: ts_col(self.updated_at_ts)?,
                             details: WorkflowDetails::Repair(RepairDetails { priority: self.priority.parse()?,
                                                                              title: self.title,
                                                                              description: self.description,
                                                                              checklist_instance_id }) })
    }
}

impl ScrappingRow {
    fn into_request(self) -> Result<WorkflowRequest> {
        let kind = WorkflowKind::Scrapping;
        Ok(WorkflowRequest { id: uuid_col(&self.id)?,
                             kind,
                             mold_id: uuid_col(&self.mold_id)?,
                             status: stored_status(kind, &self.status)?,
                             requested_by: uuid_col(&self.requested_by)?,
                             created_at: ts_col(self.created_at_ts)?,
                             updated_at: ts_col(self.updated_at_ts)?,
                             details: WorkflowDetails::Scrapping(ScrappingDetails { reason: self.reason,
                                                                                    current_shots: self.current_shots,
                                                                                    estimated_scrap_value:
                                                                                        self.estimated_scrap_value }) })
    }
}

impl StageRow {
    fn from_stage(s: &ApprovalStage) -> Self {
        StageRow { workflow_kind: s.workflow_kind.as_str().to_string(),
                   workflow_id: s.workflow_id.to_string(),
                   stage_order: s.stage_order,
                   stage_name: s.stage_name.clone(),
                   stage_status: s.stage_status.as_str().to_string(),
                   approver_id: s.approver_id.map(|a| a.to_string()),
                   decided_at_ts: s.decided_at.map(|d| d.timestamp_millis()),
                   comments: s.comments.clone() }
    }

    fn into_stage(self) -> Result<ApprovalStage> {
        Ok(ApprovalStage { workflow_kind: self.workflow_kind.parse()?,
                           workflow_id: uuid_col(&self.workflow_id)?,
                           stage_name: self.stage_name,
                           stage_order: self.stage_order,
                           stage_status: self.stage_status.parse::<StageStatus>()?,
                           approver_id: self.approver_id.as_deref().map(uuid_col).transpose()?,
                           decided_at: self.decided_at_ts.map(ts_col).transpose()?,
                           comments: self.comments })
    }
}

impl HistoryRow {
    fn into_entry(self) -> Result<HistoryEntry> {
        let kind: WorkflowKind = self.workflow_kind.parse()?;
        Ok(HistoryEntry { id: uuid_col(&self.id)?,
                          workflow_kind: kind,
                          workflow_id: uuid_col(&self.workflow_id)?,
                          sequence: self.sequence,
                          action_type: self.action_type.parse::<HistoryAction>()?,
                          old_status: self.old_status.as_deref().map(|s| stored_status(kind, s)).transpose()?,
                          new_status: stored_status(kind, &self.new_status)?,
                          actor_id: uuid_col(&self.actor_id)?,
                          occurred_at: ts_col(self.occurred_at_ts)?,
                          metadata: serde_json::from_str(&self.metadata)?,
                          command_id: self.command_id.as_deref().map(uuid_col).transpose()? })
    }
}

/// Manejador de una transacción Diesel abierta.
pub struct DieselTx<'a> {
    pub(crate) conn: &'a mut DbConn,
}

impl DieselTx<'_> {
    fn load_request(&mut self, kind: WorkflowKind, id: &Uuid, lock: bool) -> Result<Option<WorkflowRequest>> {
        let id = id.to_string();
        match kind {
            WorkflowKind::Transfer => {
                map_db_err(load_by_id!(self.conn, tr_dsl::transfer_requests, tr_dsl::id, TransferRow, &id, lock))?
                    .map(TransferRow::into_request)
                    .transpose()
            }
            WorkflowKind::Repair => {
                map_db_err(load_by_id!(self.conn, rr_dsl::repair_requests, rr_dsl::id, RepairRow, &id, lock))?
                    .map(RepairRow::into_request)
                    .transpose()
            }
            WorkflowKind::Scrapping => {
                map_db_err(load_by_id!(self.conn, sr_dsl::scrapping_requests, sr_dsl::id, ScrappingRow, &id, lock))?
                    .map(ScrappingRow::into_request)
                    .transpose()
            }
        }
    }

    fn select_stages(&mut self, kind: WorkflowKind, workflow_id: &Uuid, lock: bool) -> Result<Vec<ApprovalStage>> {
        let query = st_dsl::approval_stages.filter(st_dsl::workflow_kind.eq(kind.as_str()))
                                           .filter(st_dsl::workflow_id.eq(workflow_id.to_string()))
                                           .order(st_dsl::stage_order.asc());
        #[cfg(feature = "pg")]
        let rows = if lock {
            map_db_err(query.for_update().load::<StageRow>(self.conn))?
        } else {
            map_db_err(query.load::<StageRow>(self.conn))?
        };
        #[cfg(not(feature = "pg"))]
        let rows = {
            let _ = lock;
            map_db_err(query.load::<StageRow>(self.conn))?
        };
        rows.into_iter().map(StageRow::into_stage).collect()
    }
}

impl WorkflowTx for DieselTx<'_> {
    fn insert_request(&mut self, request: &WorkflowRequest) -> Result<()> {
        if self.load_request(request.kind, &request.id, false)?.is_some() {
            return Err(FlowError::Validation(format!("el workflow {} ya existe", request.id)));
        }
        let (id, mold_id, status, requested_by) = (request.id.to_string(),
                                                   request.mold_id.to_string(),
                                                   request.status.as_str().to_string(),
                                                   request.requested_by.to_string());
        let (created_at_ts, updated_at_ts) = (request.created_at.timestamp_millis(), request.updated_at.timestamp_millis());
        let res = match &request.details {
            WorkflowDetails::Transfer(t) => {
                let row = TransferRow { id,
                                        mold_id,
                                        status,
                                        requested_by,
                                        from_company_id: t.from_company_id.to_string(),
                                        to_company_id: t.to_company_id.to_string(),
                                        developer_id: t.developer_id.to_string(),
                                        created_at_ts,
                                        updated_at_ts };
                diesel::insert_into(tr_dsl::transfer_requests).values(&row).execute(self.conn)
            }
            WorkflowDetails::Repair(r) => {
                let row = RepairRow { id,
                                      mold_id,
                                      status,
                                      requested_by,
                                      priority: r.priority.as_str().to_string(),
                                      title: r.title.clone(),
                                      description: r.description.clone(),
                                      checklist_instance_id: r.checklist_instance_id.map(|c| c.to_string()),
                                      created_at_ts,
                                      updated_at_ts };
                diesel::insert_into(rr_dsl::repair_requests).values(&row).execute(self.conn)
            }
            WorkflowDetails::Scrapping(s) => {
                let row = ScrappingRow { id,
                                         mold_id,
                                         status,
                                         requested_by,
                                         reason: s.reason.clone(),
                                         current_shots: s.current_shots,
                                         estimated_scrap_value: s.estimated_scrap_value,
                                         created_at_ts,
                                         updated_at_ts };
                diesel::insert_into(sr_dsl::scrapping_requests).values(&row).execute(self.conn)
            }
        };
        map_db_err(res)?;
        Ok(())
    }

    fn find_request(&mut self, kind: WorkflowKind, id: &Uuid) -> Result<Option<WorkflowRequest>> {
        self.load_request(kind, id, false)
    }

    fn lock_request(&mut self, kind: WorkflowKind, id: &Uuid) -> Result<Option<WorkflowRequest>> {
        self.load_request(kind, id, true)
    }

    fn update_request(&mut self, request: &WorkflowRequest) -> Result<()> {
        let id = request.id.to_string();
        let status = request.status.as_str();
        let ts = request.updated_at.timestamp_millis();
        let n = match request.kind {
            WorkflowKind::Transfer => {
                diesel::update(tr_dsl::transfer_requests.filter(tr_dsl::id.eq(&id)))
                    .set((tr_dsl::status.eq(status), tr_dsl::updated_at_ts.eq(ts)))
                    .execute(self.conn)
            }
            WorkflowKind::Repair => {
                diesel::update(rr_dsl::repair_requests.filter(rr_dsl::id.eq(&id)))
                    .set((rr_dsl::status.eq(status), rr_dsl::updated_at_ts.eq(ts)))
                    .execute(self.conn)
            }
            WorkflowKind::Scrapping => {
                diesel::update(sr_dsl::scrapping_requests.filter(sr_dsl::id.eq(&id)))
                    .set((sr_dsl::status.eq(status), sr_dsl::updated_at_ts.eq(ts)))
                    .execute(self.conn)
            }
        };
        if map_db_err(n)? == 0 {
            return Err(FlowError::NotFound(format!("workflow {} {}", request.kind, request.id)));
        }
        Ok(())
    }

    fn list_requests(&mut self, kind: WorkflowKind, filter: &WorkflowFilter) -> Result<Vec<WorkflowRequest>> {
        let status = filter.status.map(|s| s.as_str().to_string());
        let mold = filter.mold_id.map(|m| m.to_string());
        match kind {
            WorkflowKind::Transfer => {
                let mut q = tr_dsl::transfer_requests.into_boxed();
                if let Some(s) = status {
                    q = q.filter(tr_dsl::status.eq(s));
                }
                if let Some(m) = mold {
                    q = q.filter(tr_dsl::mold_id.eq(m));
                }
                let rows = map_db_err(q.order((tr_dsl::created_at_ts.asc(), tr_dsl::id.asc()))
                                       .load::<TransferRow>(self.conn))?;
                rows.into_iter().map(TransferRow::into_request).collect()
            }
            WorkflowKind::Repair => {
                let mut q = rr_dsl::repair_requests.into_boxed();
                if let Some(s) = status {
                    q = q.filter(rr_dsl::status.eq(s));
                }
                if let Some(m) = mold {
                    q = q.filter(rr_dsl::mold_id.eq(m));
                }
                let rows = map_db_err(q.order((rr_dsl::created_at_ts.asc(), rr_dsl::id.asc()))
                                       .load::<RepairRow>(self.conn))?;
                rows.into_iter().map(RepairRow::into_request).collect()
            }
            WorkflowKind::Scrapping => {
                let mut q = sr_dsl::scrapping_requests.into_boxed();
                if let Some(s) = status {
                    q = q.filter(sr_dsl::status.eq(s));
                }
                if let Some(m) = mold {
                    q = q.filter(sr_dsl::mold_id.eq(m));
                }
                let rows = map_db_err(q.order((sr_dsl::created_at_ts.asc(), sr_dsl::id.asc()))
                                       .load::<ScrappingRow>(self.conn))?;
                rows.into_iter().map(ScrappingRow::into_request).collect()
            }
        }
    }

    fn insert_stages(&mut self, stages: &[ApprovalStage]) -> Result<()> {
        for s in stages {
            map_db_err(diesel::insert_into(st_dsl::approval_stages).values(&StageRow::from_stage(s)).execute(self.conn))?;
        }
        Ok(())
    }

    fn load_stages(&mut self, kind: WorkflowKind, workflow_id: &Uuid) -> Result<Vec<ApprovalStage>> {
        self.select_stages(kind, workflow_id, false)
    }

    fn lock_stages(&mut self, kind: WorkflowKind, workflow_id: &Uuid) -> Result<Vec<ApprovalStage>> {
        self.select_stages(kind, workflow_id, true)
    }

    fn update_stage(&mut self, stage: &ApprovalStage) -> Result<()> {
        let row = StageRow::from_stage(stage);
        let n = map_db_err(diesel::update(st_dsl::approval_stages.filter(st_dsl::workflow_kind.eq(&row.workflow_kind))
                                                                 .filter(st_dsl::workflow_id.eq(&row.workflow_id))
                                                                 .filter(st_dsl::stage_order.eq(row.stage_order)))
                .set((st_dsl::stage_status.eq(&row.stage_status),
                      st_dsl::approver_id.eq(&row.approver_id),
                      st_dsl::decided_at_ts.eq(row.decided_at_ts),
                      st_dsl::comments.eq(&row.comments)))
                .execute(self.conn))?;
        if n == 0 {
            return Err(FlowError::NotFound(format!("etapa '{}'", stage.stage_name)));
        }
        Ok(())
    }

    fn append_history(&mut self, entry: &HistoryEntry) -> Result<()> {
        let row = HistoryRow { id: entry.id.to_string(),
                               workflow_kind: entry.workflow_kind.as_str().to_string(),
                               workflow_id: entry.workflow_id.to_string(),
                               sequence: entry.sequence,
                               action_type: entry.action_type.as_str().to_string(),
                               old_status: entry.old_status.map(|s| s.as_str().to_string()),
                               new_status: entry.new_status.as_str().to_string(),
                               actor_id: entry.actor_id.to_string(),
                               occurred_at_ts: entry.occurred_at.timestamp_millis(),
                               metadata: serde_json::to_string(&entry.metadata)?,
                               command_id: entry.command_id.map(|c| c.to_string()) };
        map_db_err(diesel::insert_into(wh_dsl::workflow_history).values(&row).execute(self.conn))?;
        Ok(())
    }

    fn load_history(&mut self, kind: WorkflowKind, workflow_id: &Uuid) -> Result<Vec<HistoryEntry>> {
        let rows = map_db_err(wh_dsl::workflow_history.filter(wh_dsl::workflow_kind.eq(kind.as_str()))
                                                      .filter(wh_dsl::workflow_id.eq(workflow_id.to_string()))
                                                      .order((wh_dsl::occurred_at_ts.asc(), wh_dsl::sequence.asc()))
                                                      .load::<HistoryRow>(self.conn))?;
        rows.into_iter().map(HistoryRow::into_entry).collect()
    }

    fn save_checklist(&mut self, capture: &ChecklistCapture) -> Result<()> {
        let row = ChecklistRow { workflow_kind: capture.workflow_kind.as_str().to_string(),
                                 workflow_id: capture.workflow_id.to_string(),
                                 stage_key: capture.stage_key.clone(),
                                 categories: serde_json::to_string(&capture.categories)?,
                                 captured_by: capture.captured_by.to_string(),
                                 captured_at_ts: capture.captured_at.timestamp_millis() };
        map_db_err(diesel::delete(cc_dsl::checklist_captures.filter(cc_dsl::workflow_kind.eq(&row.workflow_kind))
                                                            .filter(cc_dsl::workflow_id.eq(&row.workflow_id))
                                                            .filter(cc_dsl::stage_key.eq(&row.stage_key)))
                   .execute(self.conn))?;
        map_db_err(diesel::insert_into(cc_dsl::checklist_captures).values(&row).execute(self.conn))?;
        Ok(())
    }

    fn load_checklists(&mut self, kind: WorkflowKind, workflow_id: &Uuid) -> Result<Vec<ChecklistCapture>> {
        let rows = map_db_err(cc_dsl::checklist_captures.filter(cc_dsl::workflow_kind.eq(kind.as_str()))
                                                        .filter(cc_dsl::workflow_id.eq(workflow_id.to_string()))
                                                        .order(cc_dsl::stage_key.asc())
                                                        .load::<ChecklistRow>(self.conn))?;
        rows.into_iter()
            .map(|r| {
                Ok(ChecklistCapture { workflow_kind: kind,
                                      workflow_id: uuid_col(&r.workflow_id)?,
                                      stage_key: r.stage_key,
                                      categories: serde_json::from_str(&r.categories)?,
                                      captured_by: uuid_col(&r.captured_by)?,
                                      captured_at: ts_col(r.captured_at_ts)? })
            })
            .collect()
    }
}

/// Parámetros de conexión.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DbConfig {
    pub database_url: String,
    pub pool_size: u32,
}

impl DbConfig {
    pub const URL_ENV: &'static str = "MOLDFLOW_DB_URL";
    pub const POOL_SIZE_ENV: &'static str = "MOLDFLOW_DB_POOL_SIZE";
    pub const DEFAULT_POOL_SIZE: u32 = 4;
    pub const DEFAULT_SQLITE_URL: &'static str = "moldflow.db";

    pub fn new(database_url: impl Into<String>) -> Self {
        Self { database_url: database_url.into(), pool_size: Self::DEFAULT_POOL_SIZE }
    }

    /// `MOLDFLOW_DB_URL` (o `DATABASE_URL`) y `MOLDFLOW_DB_POOL_SIZE`. Sin
    /// URL, SQLite usa `moldflow.db` en el directorio actual.
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();
        let url = match std::env::var(Self::URL_ENV).or_else(|_| std::env::var("DATABASE_URL")) {
            Ok(u) if !u.trim().is_empty() => u,
            _ if cfg!(feature = "pg") => {
                return Err(FlowError::Validation("MOLDFLOW_DB_URL / DATABASE_URL no definida".into()));
            }
            _ => Self::DEFAULT_SQLITE_URL.to_string(),
        };
        let pool_size = match std::env::var(Self::POOL_SIZE_ENV) {
            Ok(v) => v.trim()
                      .parse::<u32>()
                      .ok()
                      .filter(|n| *n > 0)
                      .ok_or_else(|| FlowError::Validation(format!("{} inválido: {}", Self::POOL_SIZE_ENV, v)))?,
            Err(_) => Self::DEFAULT_POOL_SIZE,
        };
        Ok(Self { database_url: url, pool_size })
    }
}

/// Ajustes aplicados a cada conexión SQLite que entrega el pool.
#[cfg(not(feature = "pg"))]
#[derive(Debug, Clone, Copy)]
struct SqlitePragmas;

#[cfg(not(feature = "pg"))]
impl diesel::r2d2::CustomizeConnection<SqliteConnection, diesel::r2d2::Error> for SqlitePragmas {
    fn on_acquire(&self, conn: &mut SqliteConnection) -> std::result::Result<(), diesel::r2d2::Error> {
        diesel::sql_query("PRAGMA busy_timeout = 5000;").execute(conn)
                                                         .map_err(diesel::r2d2::Error::QueryError)?;
        diesel::sql_query("PRAGMA foreign_keys = ON;").execute(conn)
                                                       .map_err(diesel::r2d2::Error::QueryError)?;
        Ok(())
    }
}

/// Store Diesel: pool r2d2 y migraciones embebidas.
#[derive(Clone)]
pub struct DieselWorkflowStore {
    pool: Arc<DbPool>,
}

impl DieselWorkflowStore {
    /// Crea el pool y aplica las migraciones pendientes.
    pub fn new(config: &DbConfig) -> Result<Self> {
        check_url(&config.database_url)?;
        let manager = ConnectionManager::<DbConn>::new(&config.database_url);
        let builder = Pool::builder().max_size(config.pool_size);
        #[cfg(not(feature = "pg"))]
        let builder = builder.connection_customizer(Box::new(SqlitePragmas));
        let pool = builder.build(manager)
                          .map_err(|e| FlowError::Storage(format!("no se pudo crear el pool de conexiones: {}", e)))?;
        let store = DieselWorkflowStore { pool: Arc::new(pool) };
        let mut conn = store.conn()?;
        #[cfg(not(feature = "pg"))]
        if let Err(e) = diesel::sql_query("PRAGMA journal_mode = WAL;").execute(&mut conn) {
            debug!("journal_mode=WAL no aplicado: {}", e);
        }
        let applied = conn.run_pending_migrations(MIGRATIONS)
                          .map_err(|e| FlowError::Storage(format!("migraciones: {}", e)))?;
        info!("store de workflows listo ({} migraciones aplicadas, pool {})", applied.len(), config.pool_size);
        Ok(store)
    }

    fn conn(&self) -> Result<PooledConnection<ConnectionManager<DbConn>>> {
        self.pool.get().map_err(|e| FlowError::Storage(format!("pool: {}", e)))
    }
}

#[cfg(feature = "pg")]
fn check_url(url: &str) -> Result<()> {
    let l = url.to_lowercase();
    if l.starts_with("postgres://") || l.starts_with("postgresql://") || url.contains('@') {
        Ok(())
    } else {
        Err(FlowError::Validation("MOLDFLOW_DB_URL no parece una URL de Postgres".into()))
    }
}

#[cfg(not(feature = "pg"))]
fn check_url(url: &str) -> Result<()> {
    let l = url.to_lowercase();
    if l.starts_with("postgres://") || l.starts_with("postgresql://") {
        return Err(FlowError::Validation("mold-persistence se compiló sin la feature 'pg'; habilítela para usar \
                                          Postgres"
                                                   .into()));
    }
    Ok(())
}

#[cfg(not(feature = "pg"))]
fn run_locked<T, F>(conn: &mut DbConn, f: F) -> std::result::Result<T, TxError>
    where F: FnOnce(&mut DbConn) -> std::result::Result<T, TxError>
{
    conn.immediate_transaction(f)
}

#[cfg(feature = "pg")]
fn run_locked<T, F>(conn: &mut DbConn, f: F) -> std::result::Result<T, TxError>
    where F: FnOnce(&mut DbConn) -> std::result::Result<T, TxError>
{
    conn.transaction(f)
}

impl WorkflowStore for DieselWorkflowStore {
    fn transaction<T, F>(&self, f: F) -> Result<T>
        where F: FnOnce(&mut dyn WorkflowTx) -> Result<T>
    {
        let mut conn = self.conn()?;
        let res = run_locked(&mut conn, |c| {
            let mut tx = DieselTx { conn: c };
            f(&mut tx).map_err(TxError::from)
        });
        if let Err(e) = &res {
            debug!("transacción revertida: {}", e);
        }
        res.map_err(FlowError::from)
    }
}

/// Store a partir de las variables de entorno.
pub fn new_from_env() -> Result<DieselWorkflowStore> {
    DieselWorkflowStore::new(&DbConfig::from_env()?)
}
