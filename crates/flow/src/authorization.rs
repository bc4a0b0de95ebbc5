// Archivo: authorization.rs
// Propósito: roles de actor y tabla de qué roles pueden decidir cada etapa o
// transición. La resolución actor -> rol es un colaborador externo.
use crate::errors::{FlowError, Result};
use crate::status::{RepairStatus, ScrappingStatus, WorkflowKind, WorkflowStatus};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    PlantManager,
    MoldDeveloper,
    Maker,
    SystemAdmin,
    DisposalOperator,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::PlantManager => "plant_manager",
            Role::MoldDeveloper => "mold_developer",
            Role::Maker => "maker",
            Role::SystemAdmin => "system_admin",
            Role::DisposalOperator => "disposal_operator",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = FlowError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim() {
            "plant_manager" => Ok(Role::PlantManager),
            "mold_developer" => Ok(Role::MoldDeveloper),
            "maker" => Ok(Role::Maker),
            "system_admin" => Ok(Role::SystemAdmin),
            "disposal_operator" => Ok(Role::DisposalOperator),
            other => Err(FlowError::Validation(format!("rol desconocido: {}", other))),
        }
    }
}

/// Actor ya autenticado con su rol resuelto.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Actor {
    pub id: Uuid,
    pub role: Role,
}

/// Colaborador que resuelve el rol de un actor autenticado.
pub trait Authorizer: Send + Sync {
    /// `Ok(None)` si el actor no es conocido.
    fn actor_role(&self, actor_id: &Uuid) -> Result<Option<Role>>;
}

/// Acción protegida sobre un workflow.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GuardedAction<'a> {
    /// Aprobar o rechazar una etapa con nombre.
    DecideStage(&'a str),
    /// Cambio de estado de una reparación.
    RepairStatus(RepairStatus),
    /// Paso final de disposición del desecho.
    Dispose,
    /// Rechazo de escape sobre un workflow en `current`.
    Reject { current: WorkflowStatus, pending_stage: Option<&'a str> },
}

/// Roles aceptados (además de `system_admin`) para la acción.
pub fn required_roles(kind: WorkflowKind, action: GuardedAction<'_>) -> Vec<Role> {
    match (kind, action) {
        (_, GuardedAction::DecideStage(stage)) => stage_roles(kind, stage),
        (WorkflowKind::Repair, GuardedAction::RepairStatus(RepairStatus::Rejected)) => {
            vec![Role::Maker, Role::PlantManager]
        }
        (WorkflowKind::Repair, GuardedAction::RepairStatus(_)) => vec![Role::Maker],
        (WorkflowKind::Scrapping, GuardedAction::Dispose) => vec![Role::DisposalOperator],
        (WorkflowKind::Repair, GuardedAction::Reject { .. }) => vec![Role::Maker, Role::PlantManager],
        (WorkflowKind::Scrapping,
         GuardedAction::Reject { current: WorkflowStatus::Scrapping(ScrappingStatus::Approved), .. }) => {
            vec![Role::DisposalOperator]
        }
        (_, GuardedAction::Reject { pending_stage: Some(stage), .. }) => stage_roles(kind, stage),
        _ => Vec::new(),
    }
}

fn stage_roles(kind: WorkflowKind, stage: &str) -> Vec<Role> {
    match (kind, stage) {
        (WorkflowKind::Transfer, "plant_approval") => vec![Role::PlantManager],
        (WorkflowKind::Transfer, "developer_approval") => vec![Role::MoldDeveloper],
        (WorkflowKind::Transfer, "receiver_approval") => vec![Role::PlantManager],
        (WorkflowKind::Scrapping, "first_approval") => vec![Role::MoldDeveloper],
        (WorkflowKind::Scrapping, "second_approval") => vec![Role::SystemAdmin],
        _ => Vec::new(),
    }
}

/// Falla con `Unauthorized` si el rol del actor no cubre la acción.
pub fn ensure_allowed(actor: &Actor, kind: WorkflowKind, action: GuardedAction<'_>) -> Result<()> {
    if actor.role == Role::SystemAdmin {
        return Ok(());
    }
    let roles = required_roles(kind, action);
    if roles.contains(&actor.role) {
        Ok(())
    } else {
        Err(FlowError::Unauthorized(format!("el rol {} no puede ejecutar {:?} en {}", actor.role, action, kind)))
    }
}
