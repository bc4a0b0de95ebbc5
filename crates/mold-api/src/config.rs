// Archivo: config.rs
// Propósito: configuración del servidor HTTP leída del entorno.
use flow::{FlowError, Result, WorkflowConfig};
use mold_persistence::DbConfig;
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerConfig {
    pub bind_addr: SocketAddr,
    /// Tabla `uuid=rol,...` para el autorizador estático.
    pub actor_roles: String,
    pub db: DbConfig,
    pub workflow: WorkflowConfig,
}

impl ServerConfig {
    pub const BIND_ENV: &'static str = "MOLDFLOW_BIND_ADDR";
    pub const ACTOR_ROLES_ENV: &'static str = "MOLDFLOW_ACTOR_ROLES";
    pub const DEFAULT_BIND: &'static str = "0.0.0.0:8080";

    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();
        let raw = std::env::var(Self::BIND_ENV).unwrap_or_else(|_| Self::DEFAULT_BIND.to_string());
        let bind_addr = raw.trim()
                           .parse::<SocketAddr>()
                           .map_err(|e| FlowError::Validation(format!("{} inválida '{}': {}", Self::BIND_ENV, raw, e)))?;
        Ok(Self { bind_addr,
                  actor_roles: std::env::var(Self::ACTOR_ROLES_ENV).unwrap_or_default(),
                  db: DbConfig::from_env()?,
                  workflow: WorkflowConfig::from_env()? })
    }
}
