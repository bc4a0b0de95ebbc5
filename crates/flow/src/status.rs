// Archivo: status.rs
// Propósito: tipos de workflow y enumeraciones de estado por tipo. Cada tipo
// tiene su propia enumeración; un estado de otro tipo nunca es válido.
// Las etiquetas/colores de presentación son una búsqueda pura y no deciden
// la legalidad de una transición (ver `transitions.rs`).
use crate::errors::{FlowError, Result};
use serde::{Deserialize, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

/// Tipos de workflow soportados por el motor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WorkflowKind {
    Transfer,
    Repair,
    Scrapping,
}

impl WorkflowKind {
    pub const ALL: [WorkflowKind; 3] = [WorkflowKind::Transfer, WorkflowKind::Repair, WorkflowKind::Scrapping];

    pub fn as_str(&self) -> &'static str {
        match self {
            WorkflowKind::Transfer => "transfer",
            WorkflowKind::Repair => "repair",
            WorkflowKind::Scrapping => "scrapping",
        }
    }

    /// Estado con el que se crea toda solicitud de este tipo.
    pub fn initial_status(&self) -> WorkflowStatus {
        match self {
            WorkflowKind::Transfer => WorkflowStatus::Transfer(TransferStatus::Requested),
            WorkflowKind::Repair => WorkflowStatus::Repair(RepairStatus::Requested),
            WorkflowKind::Scrapping => WorkflowStatus::Scrapping(ScrappingStatus::Requested),
        }
    }

    pub fn rejected_status(&self) -> WorkflowStatus {
        match self {
            WorkflowKind::Transfer => WorkflowStatus::Transfer(TransferStatus::Rejected),
            WorkflowKind::Repair => WorkflowStatus::Repair(RepairStatus::Rejected),
            WorkflowKind::Scrapping => WorkflowStatus::Scrapping(ScrappingStatus::Rejected),
        }
    }

    /// Indica si el tipo tiene etapas de aprobación ordenadas.
    pub fn is_staged(&self) -> bool {
        !matches!(self, WorkflowKind::Repair)
    }
}

impl fmt::Display for WorkflowKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for WorkflowKind {
    type Err = FlowError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "transfer" => Ok(WorkflowKind::Transfer),
            "repair" => Ok(WorkflowKind::Repair),
            "scrapping" => Ok(WorkflowKind::Scrapping),
            other => Err(FlowError::Validation(format!("tipo de workflow desconocido: {}", other))),
        }
    }
}

/// Estados de una solicitud de reparación (una sola etapa).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RepairStatus {
    Requested,
    Accepted,
    InProgress,
    Done,
    Rejected,
}

impl RepairStatus {
    pub const ALL: [RepairStatus; 5] = [RepairStatus::Requested,
                                        RepairStatus::Accepted,
                                        RepairStatus::InProgress,
                                        RepairStatus::Done,
                                        RepairStatus::Rejected];

    pub fn as_str(&self) -> &'static str {
        match self {
            RepairStatus::Requested => "requested",
            RepairStatus::Accepted => "accepted",
            RepairStatus::InProgress => "in_progress",
            RepairStatus::Done => "done",
            RepairStatus::Rejected => "rejected",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, RepairStatus::Done | RepairStatus::Rejected)
    }
}

/// Estados de una transferencia. Se derivan de las etapas de aprobación.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransferStatus {
    Requested,
    InProgress,
    Completed,
    Rejected,
}

impl TransferStatus {
    pub const ALL: [TransferStatus; 4] = [TransferStatus::Requested,
                                          TransferStatus::InProgress,
                                          TransferStatus::Completed,
                                          TransferStatus::Rejected];

    pub fn as_str(&self) -> &'static str {
        match self {
            TransferStatus::Requested => "requested",
            TransferStatus::InProgress => "in_progress",
            TransferStatus::Completed => "completed",
            TransferStatus::Rejected => "rejected",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, TransferStatus::Completed | TransferStatus::Rejected)
    }
}

/// Estados de un desecho: dos aprobaciones y un paso final de disposición.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ScrappingStatus {
    Requested,
    FirstApproved,
    Approved,
    Scrapped,
    Rejected,
}

impl ScrappingStatus {
    pub const ALL: [ScrappingStatus; 5] = [ScrappingStatus::Requested,
                                           ScrappingStatus::FirstApproved,
                                           ScrappingStatus::Approved,
                                           ScrappingStatus::Scrapped,
                                           ScrappingStatus::Rejected];

    pub fn as_str(&self) -> &'static str {
        match self {
            ScrappingStatus::Requested => "requested",
            ScrappingStatus::FirstApproved => "first_approved",
            ScrappingStatus::Approved => "approved",
            ScrappingStatus::Scrapped => "scrapped",
            ScrappingStatus::Rejected => "rejected",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, ScrappingStatus::Scrapped | ScrappingStatus::Rejected)
    }
}

/// Estado de una solicitud, siempre atado a su tipo.
///
/// No implementa `FromStr`: un texto de estado sólo puede interpretarse
/// conociendo el tipo (`WorkflowStatus::parse`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WorkflowStatus {
    Transfer(TransferStatus),
    Repair(RepairStatus),
    Scrapping(ScrappingStatus),
}

impl WorkflowStatus {
    /// Interpreta `s` dentro de la enumeración del tipo `kind`.
    pub fn parse(kind: WorkflowKind, s: &str) -> Result<Self> {
        let wanted = s.trim().to_lowercase();
        Self::all(kind).into_iter()
                       .find(|st| st.as_str() == wanted)
                       .ok_or_else(|| FlowError::Validation(format!("estado '{}' no válido para {}", s, kind)))
    }

    /// Todos los estados del tipo, en orden de ciclo de vida.
    pub fn all(kind: WorkflowKind) -> Vec<WorkflowStatus> {
        match kind {
            WorkflowKind::Transfer => TransferStatus::ALL.iter().map(|s| WorkflowStatus::Transfer(*s)).collect(),
            WorkflowKind::Repair => RepairStatus::ALL.iter().map(|s| WorkflowStatus::Repair(*s)).collect(),
            WorkflowKind::Scrapping => ScrappingStatus::ALL.iter().map(|s| WorkflowStatus::Scrapping(*s)).collect(),
        }
    }

    pub fn kind(&self) -> WorkflowKind {
        match self {
            WorkflowStatus::Transfer(_) => WorkflowKind::Transfer,
            WorkflowStatus::Repair(_) => WorkflowKind::Repair,
            WorkflowStatus::Scrapping(_) => WorkflowKind::Scrapping,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            WorkflowStatus::Transfer(s) => s.as_str(),
            WorkflowStatus::Repair(s) => s.as_str(),
            WorkflowStatus::Scrapping(s) => s.as_str(),
        }
    }

    /// `done`, `completed`, `scrapped` o `rejected`.
    pub fn is_terminal(&self) -> bool {
        match self {
            WorkflowStatus::Transfer(s) => s.is_terminal(),
            WorkflowStatus::Repair(s) => s.is_terminal(),
            WorkflowStatus::Scrapping(s) => s.is_terminal(),
        }
    }

    /// Estado terminal de éxito: el único punto donde pueden aplicarse
    /// efectos sobre el molde.
    pub fn is_terminal_success(&self) -> bool {
        matches!(self,
                 WorkflowStatus::Transfer(TransferStatus::Completed)
                 | WorkflowStatus::Repair(RepairStatus::Done)
                 | WorkflowStatus::Scrapping(ScrappingStatus::Scrapped))
    }

    pub fn is_rejected(&self) -> bool {
        *self == self.kind().rejected_status()
    }

    /// Etiqueta de presentación.
    pub fn label(&self) -> &'static str {
        match self.as_str() {
            "requested" => "Requested",
            "accepted" => "Accepted",
            "in_progress" => "In progress",
            "done" => "Repair done",
            "completed" => "Transfer completed",
            "first_approved" => "First approval granted",
            "approved" => "Approved for disposal",
            "scrapped" => "Scrapped",
            _ => "Rejected",
        }
    }

    /// Color de insignia para pantallas y reportes.
    pub fn badge_color(&self) -> &'static str {
        if self.is_rejected() {
            return "red";
        }
        if self.is_terminal() {
            return if matches!(self, WorkflowStatus::Scrapping(_)) { "gray" } else { "green" };
        }
        match self.as_str() {
            "requested" => "blue",
            _ => "orange",
        }
    }
}

impl fmt::Display for WorkflowStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for WorkflowStatus {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
        where S: Serializer
    {
        serializer.serialize_str(self.as_str())
    }
}

/// Estado de una etapa de aprobación.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StageStatus {
    Pending,
    Approved,
    Rejected,
}

impl StageStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            StageStatus::Pending => "pending",
            StageStatus::Approved => "approved",
            StageStatus::Rejected => "rejected",
        }
    }
}

impl FromStr for StageStatus {
    type Err = FlowError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "pending" => Ok(StageStatus::Pending),
            "approved" => Ok(StageStatus::Approved),
            "rejected" => Ok(StageStatus::Rejected),
            other => Err(FlowError::Validation(format!("estado de etapa desconocido: {}", other))),
        }
    }
}

/// Decisión tomada sobre una etapa.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StageDecision {
    Approve,
    Reject,
}
