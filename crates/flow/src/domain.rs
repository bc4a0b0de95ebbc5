// Archivo: domain.rs
// Propósito: registros persistidos del motor (solicitudes, etapas,
// historial, checklists) y DTOs de entrada/salida del servicio.
use crate::errors::{FlowError, Result};
use crate::side_effects::SideEffect;
use crate::status::{StageStatus, WorkflowKind, WorkflowStatus};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Prioridad de una reparación.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum RepairPriority {
    Low,
    #[default]
    Normal,
    High,
    Urgent,
}

impl RepairPriority {
    pub fn as_str(&self) -> &'static str {
        match self {
            RepairPriority::Low => "low",
            RepairPriority::Normal => "normal",
            RepairPriority::High => "high",
            RepairPriority::Urgent => "urgent",
        }
    }
}

impl fmt::Display for RepairPriority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RepairPriority {
    type Err = FlowError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "low" => Ok(RepairPriority::Low),
            "normal" => Ok(RepairPriority::Normal),
            "high" => Ok(RepairPriority::High),
            "urgent" => Ok(RepairPriority::Urgent),
            other => Err(FlowError::Validation(format!("prioridad desconocida: {}", other))),
        }
    }
}

/// Datos propios de una transferencia entre empresas (HQ, planta, fabricante).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransferDetails {
    pub from_company_id: Uuid,
    pub to_company_id: Uuid,
    pub developer_id: Uuid,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RepairDetails {
    #[serde(default)]
    pub priority: RepairPriority,
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub checklist_instance_id: Option<Uuid>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScrappingDetails {
    pub reason: String,
    pub current_shots: i64,
    #[serde(default)]
    pub estimated_scrap_value: Option<f64>,
}

/// Atributos específicos de cada tipo de solicitud.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum WorkflowDetails {
    Transfer(TransferDetails),
    Repair(RepairDetails),
    Scrapping(ScrappingDetails),
}

impl WorkflowDetails {
    pub fn kind(&self) -> WorkflowKind {
        match self {
            WorkflowDetails::Transfer(_) => WorkflowKind::Transfer,
            WorkflowDetails::Repair(_) => WorkflowKind::Repair,
            WorkflowDetails::Scrapping(_) => WorkflowKind::Scrapping,
        }
    }

    /// Deserializa el cuerpo de creación según el tipo indicado en la ruta.
    pub fn from_json(kind: WorkflowKind, body: JsonValue) -> Result<Self> {
        let parsed = match kind {
            WorkflowKind::Transfer => serde_json::from_value(body).map(WorkflowDetails::Transfer),
            WorkflowKind::Repair => serde_json::from_value(body).map(WorkflowDetails::Repair),
            WorkflowKind::Scrapping => serde_json::from_value(body).map(WorkflowDetails::Scrapping),
        };
        parsed.map_err(|e| FlowError::Validation(format!("payload de {} inválido: {}", kind, e)))
    }

    /// Validación de forma; las reglas que dependen del molde se aplican en
    /// el motor.
    pub fn validate(&self) -> Result<()> {
        match self {
            WorkflowDetails::Transfer(t) => {
                if t.from_company_id == t.to_company_id {
                    return Err(FlowError::Validation("la empresa de origen y destino deben ser distintas".into()));
                }
            }
            WorkflowDetails::Repair(r) => {
                if r.title.trim().is_empty() {
                    return Err(FlowError::Validation("el título de la reparación es obligatorio".into()));
                }
            }
            WorkflowDetails::Scrapping(s) => {
                if s.reason.trim().is_empty() {
                    return Err(FlowError::Validation("el motivo del desecho es obligatorio".into()));
                }
                if s.current_shots < 0 {
                    return Err(FlowError::Validation(format!("disparos inválidos: {}", s.current_shots)));
                }
                if let Some(v) = s.estimated_scrap_value {
                    if !v.is_finite() || v < 0.0 {
                        return Err(FlowError::Validation(format!("valor de desecho inválido: {}", v)));
                    }
                }
            }
        }
        Ok(())
    }
}

/// Solicitud de workflow (transferencia, reparación o desecho).
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WorkflowRequest {
    pub id: Uuid,
    pub kind: WorkflowKind,
    pub mold_id: Uuid,
    pub status: WorkflowStatus,
    pub requested_by: Uuid,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(flatten)]
    pub details: WorkflowDetails,
}

impl WorkflowRequest {
    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Empresas involucradas (para filtros por empresa).
    pub fn company_ids(&self) -> Vec<Uuid> {
        match &self.details {
            WorkflowDetails::Transfer(t) => vec![t.from_company_id, t.to_company_id],
            _ => Vec::new(),
        }
    }
}

/// Etapa ordenada de aprobación (sólo transferencia y desecho).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ApprovalStage {
    pub workflow_kind: WorkflowKind,
    pub workflow_id: Uuid,
    pub stage_name: String,
    pub stage_order: i32,
    pub stage_status: StageStatus,
    pub approver_id: Option<Uuid>,
    pub decided_at: Option<DateTime<Utc>>,
    pub comments: Option<String>,
}

/// Tipo de acción registrada en el historial.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HistoryAction {
    Created,
    Approval,
    Rejection,
    StatusChange,
    Completion,
}

impl HistoryAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            HistoryAction::Created => "created",
            HistoryAction::Approval => "approval",
            HistoryAction::Rejection => "rejection",
            HistoryAction::StatusChange => "status_change",
            HistoryAction::Completion => "completion",
        }
    }
}

impl FromStr for HistoryAction {
    type Err = FlowError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "created" => Ok(HistoryAction::Created),
            "approval" => Ok(HistoryAction::Approval),
            "rejection" => Ok(HistoryAction::Rejection),
            "status_change" => Ok(HistoryAction::StatusChange),
            "completion" => Ok(HistoryAction::Completion),
            other => Err(FlowError::Validation(format!("acción de historial desconocida: {}", other))),
        }
    }
}

/// Entrada inmutable del historial de auditoría.
///
/// `sequence` es contiguo por workflow (1..N) y, junto con `occurred_at`,
/// da el orden total de la vida del workflow.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HistoryEntry {
    pub id: Uuid,
    pub workflow_kind: WorkflowKind,
    pub workflow_id: Uuid,
    pub sequence: i64,
    pub action_type: HistoryAction,
    pub old_status: Option<WorkflowStatus>,
    pub new_status: WorkflowStatus,
    pub actor_id: Uuid,
    pub occurred_at: DateTime<Utc>,
    pub metadata: JsonValue,
    /// Clave de idempotencia del comando que produjo la entrada.
    pub command_id: Option<Uuid>,
}

/// Valor de un punto de inspección: marca sí/no o texto libre.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum InspectionValue {
    Flag(bool),
    Text(String),
}

/// Categorías -> puntos de inspección -> valor.
pub type ChecklistCategories = BTreeMap<String, BTreeMap<String, InspectionValue>>;

/// Categorías permitidas en el checklist 4M.
pub const FOUR_M_CATEGORIES: [&str; 4] = ["man", "machine", "material", "method"];

/// Evidencia estructurada asociada a una etapa. El motor no la puntúa.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChecklistCapture {
    pub workflow_kind: WorkflowKind,
    pub workflow_id: Uuid,
    pub stage_key: String,
    pub categories: ChecklistCategories,
    pub captured_by: Uuid,
    pub captured_at: DateTime<Utc>,
}

impl ChecklistCapture {
    /// Claves de checklist aceptadas por tipo de workflow.
    pub fn allowed_keys(kind: WorkflowKind) -> &'static [&'static str] {
        match kind {
            WorkflowKind::Transfer => &["4m", "shipment", "receiving"],
            WorkflowKind::Repair => &["repair"],
            WorkflowKind::Scrapping => &["condition"],
        }
    }

    /// Valida la clave y la forma de las categorías.
    pub fn validate(kind: WorkflowKind, stage_key: &str, categories: &ChecklistCategories) -> Result<()> {
        if !Self::allowed_keys(kind).contains(&stage_key) {
            return Err(FlowError::Validation(format!("checklist '{}' no aplica a {}", stage_key, kind)));
        }
        if categories.is_empty() || categories.values().all(|points| points.is_empty()) {
            return Err(FlowError::Validation("el checklist no contiene puntos de inspección".into()));
        }
        if stage_key == "4m" {
            if let Some(bad) = categories.keys().find(|c| !FOUR_M_CATEGORIES.contains(&c.as_str())) {
                return Err(FlowError::Validation(format!("categoría 4M desconocida: {}", bad)));
            }
        }
        Ok(())
    }
}

/// Filtros de listado.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WorkflowFilter {
    pub status: Option<WorkflowStatus>,
    /// Transferencia: origen o destino. Reparación/desecho: empresa donde
    /// está ubicado el molde.
    pub company_id: Option<Uuid>,
    pub mold_id: Option<Uuid>,
}

/// Vista completa de un workflow.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WorkflowView {
    pub request: WorkflowRequest,
    pub stages: Vec<ApprovalStage>,
    pub history: Vec<HistoryEntry>,
    pub checklists: Vec<ChecklistCapture>,
}

/// Resultado de una operación de mutación.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WorkflowOutcome {
    pub request: WorkflowRequest,
    /// Etapa decidida en esta llamada, si la hubo.
    pub stage: Option<ApprovalStage>,
    /// Todas las etapas del workflow quedaron aprobadas.
    pub all_completed: bool,
    /// La llamada repitió un `command_id` ya aplicado; no hubo escrituras.
    pub replayed: bool,
    /// Transición al mismo estado aceptada sin escrituras.
    pub noop: bool,
    pub side_effect: Option<SideEffect>,
}

/// Evento emitido tras confirmar una transición.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WorkflowEvent {
    pub mold_id: Uuid,
    pub entry: HistoryEntry,
}
