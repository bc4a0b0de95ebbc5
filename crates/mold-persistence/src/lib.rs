//! Persistencia Diesel del motor de workflows de moldes.
//! Expone el módulo `schema`, el store transaccional `DieselWorkflowStore`
//! (implementa `flow::WorkflowStore`) y su configuración. La implementación
//! del registro de moldes está en `mold_persistence.rs`; la de workflows,
//! etapas, historial y checklists en `flow_persistence.rs`.

mod flow_persistence;
mod mold_persistence;
pub mod schema;

pub use flow_persistence::{new_from_env, DbConfig, DieselTx, DieselWorkflowStore};

use chrono::{DateTime, TimeZone, Utc};
use uuid::Uuid;

pub(crate) fn parse_uuid(s: &str) -> std::result::Result<Uuid, String> {
    Uuid::parse_str(s).map_err(|e| format!("uuid inválido '{}': {}", s, e))
}

pub(crate) fn from_millis(ms: i64) -> std::result::Result<DateTime<Utc>, String> {
    Utc.timestamp_millis_opt(ms)
       .single()
       .ok_or_else(|| format!("marca de tiempo fuera de rango: {} ms", ms))
}
