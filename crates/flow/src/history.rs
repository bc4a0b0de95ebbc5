// Archivo: history.rs
// Propósito: registrar una entrada de auditoría por transición, dentro de la
// misma transacción que la mutación que describe.
use crate::domain::{HistoryAction, HistoryEntry, WorkflowRequest};
use crate::errors::Result;
use crate::repository::WorkflowTx;
use crate::status::{WorkflowKind, WorkflowStatus};
use chrono::{DateTime, Utc};
use serde_json::Value as JsonValue;
use uuid::Uuid;

/// Datos de una transición a registrar.
#[derive(Debug, Clone)]
pub struct Transition {
    pub action: HistoryAction,
    pub old_status: Option<WorkflowStatus>,
    pub new_status: WorkflowStatus,
    pub actor_id: Uuid,
    pub metadata: JsonValue,
    pub command_id: Option<Uuid>,
}

pub struct HistoryRecorder;

impl HistoryRecorder {
    /// Anexa la entrada con `sequence` = última + 1. Debe invocarse con la
    /// fila del workflow ya bloqueada para que la secuencia sea contigua.
    pub fn record(tx: &mut dyn WorkflowTx,
                  request: &WorkflowRequest,
                  transition: Transition,
                  occurred_at: DateTime<Utc>)
                  -> Result<HistoryEntry> {
        let previous = tx.load_history(request.kind, &request.id)?;
        let sequence = previous.iter().map(|e| e.sequence).max().unwrap_or(0) + 1;
        let entry = HistoryEntry { id: Uuid::new_v4(),
                                   workflow_kind: request.kind,
                                   workflow_id: request.id,
                                   sequence,
                                   action_type: transition.action,
                                   old_status: transition.old_status,
                                   new_status: transition.new_status,
                                   actor_id: transition.actor_id,
                                   occurred_at,
                                   metadata: transition.metadata,
                                   command_id: transition.command_id };
        tx.append_history(&entry)?;
        Ok(entry)
    }

    /// Busca una entrada previa del mismo workflow con `command_id`.
    pub fn find_command(tx: &mut dyn WorkflowTx,
                        kind: WorkflowKind,
                        workflow_id: &Uuid,
                        command_id: &Uuid)
                        -> Result<Option<HistoryEntry>> {
        Ok(tx.load_history(kind, workflow_id)?
             .into_iter()
             .find(|e| e.command_id.as_ref() == Some(command_id)))
    }
}
