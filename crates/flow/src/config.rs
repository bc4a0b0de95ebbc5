// Archivo: config.rs
// Propósito: configuración del motor leída del entorno (`.env` vía dotenvy).
use crate::errors::{FlowError, Result};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Qué hacer con una transición al mismo estado en un workflow no terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SameStatePolicy {
    /// Se acepta sin escrituras ni historial.
    #[default]
    AllowNoop,
    /// Se rechaza con `Validation`.
    Reject,
}

impl FromStr for SameStatePolicy {
    type Err = FlowError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "allow_noop" | "noop" => Ok(SameStatePolicy::AllowNoop),
            "reject" => Ok(SameStatePolicy::Reject),
            other => Err(FlowError::Validation(format!("política de mismo estado desconocida: {}", other))),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkflowConfig {
    pub same_state_policy: SameStatePolicy,
}

impl WorkflowConfig {
    pub const SAME_STATE_ENV: &'static str = "MOLDFLOW_SAME_STATE_POLICY";

    /// Lee `MOLDFLOW_SAME_STATE_POLICY`; si no está definida usa el valor por
    /// defecto.
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();
        let same_state_policy = match std::env::var(Self::SAME_STATE_ENV) {
            Ok(v) => v.parse()?,
            Err(_) => SameStatePolicy::default(),
        };
        Ok(Self { same_state_policy })
    }
}
