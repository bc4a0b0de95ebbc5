// Archivo: approval.rs
// Propósito: cadena ordenada de etapas de aprobación (transferencia y
// desecho). Verifica existencia, orden y estado de la etapa objetivo, aplica
// la decisión y pliega el estado del workflow a partir de todas las etapas.
use crate::domain::ApprovalStage;
use crate::errors::{FlowError, Result};
use crate::status::{ScrappingStatus, StageDecision, StageStatus, TransferStatus, WorkflowKind, WorkflowStatus};
use chrono::{DateTime, Utc};
use uuid::Uuid;

/// Etapas de una transferencia en orden.
pub const TRANSFER_STAGES: [&str; 3] = ["plant_approval", "developer_approval", "receiver_approval"];

/// Etapas de un desecho en orden. La disposición final no es una etapa.
pub const SCRAPPING_STAGES: [&str; 2] = ["first_approval", "second_approval"];

/// Plantilla de etapas del tipo (vacía para reparación).
pub fn stage_names(kind: WorkflowKind) -> &'static [&'static str] {
    match kind {
        WorkflowKind::Transfer => &TRANSFER_STAGES,
        WorkflowKind::Scrapping => &SCRAPPING_STAGES,
        WorkflowKind::Repair => &[],
    }
}

/// Filas `pending` que se crean junto con la solicitud.
pub fn initial_stages(kind: WorkflowKind, workflow_id: Uuid) -> Vec<ApprovalStage> {
    stage_names(kind).iter()
                     .enumerate()
                     .map(|(i, name)| ApprovalStage { workflow_kind: kind,
                                                      workflow_id,
                                                      stage_name: (*name).to_string(),
                                                      stage_order: i as i32 + 1,
                                                      stage_status: StageStatus::Pending,
                                                      approver_id: None,
                                                      decided_at: None,
                                                      comments: None })
                     .collect()
}

/// Resultado del plegado de las etapas.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChainState {
    pub approved: usize,
    pub total: usize,
    pub any_rejected: bool,
}

impl ChainState {
    pub fn all_approved(&self) -> bool {
        !self.any_rejected && self.total > 0 && self.approved == self.total
    }
}

/// Vista ordenada de las etapas de un workflow.
#[derive(Debug, Clone)]
pub struct ApprovalChain {
    kind: WorkflowKind,
    stages: Vec<ApprovalStage>,
}

impl ApprovalChain {
    pub fn new(kind: WorkflowKind, mut stages: Vec<ApprovalStage>) -> Self {
        stages.sort_by_key(|s| s.stage_order);
        Self { kind, stages }
    }

    pub fn stages(&self) -> &[ApprovalStage] {
        &self.stages
    }

    pub fn into_stages(self) -> Vec<ApprovalStage> {
        self.stages
    }

    /// Primera etapa pendiente, si todas las anteriores están aprobadas.
    pub fn pending_stage(&self) -> Option<&ApprovalStage> {
        for stage in &self.stages {
            match stage.stage_status {
                StageStatus::Approved => continue,
                StageStatus::Pending => return Some(stage),
                StageStatus::Rejected => return None,
            }
        }
        None
    }

    /// Comprueba que `stage_name` puede decidirse ahora. Devuelve su índice.
    pub fn check_decidable(&self, stage_name: &str) -> Result<usize> {
        let idx = self.stages
                      .iter()
                      .position(|s| s.stage_name == stage_name)
                      .ok_or_else(|| FlowError::NotFound(format!("etapa '{}' en workflow {}", stage_name, self.kind)))?;
        if let Some(prev) = self.stages[..idx].iter().find(|s| s.stage_status != StageStatus::Approved) {
            return Err(FlowError::StateConflict(format!("la etapa '{}' requiere que '{}' esté aprobada (actual: {})",
                                                        stage_name,
                                                        prev.stage_name,
                                                        prev.stage_status.as_str())));
        }
        let stage = &self.stages[idx];
        if stage.stage_status != StageStatus::Pending {
            return Err(FlowError::StateConflict(format!("la etapa '{}' ya fue decidida ({})",
                                                        stage_name,
                                                        stage.stage_status.as_str())));
        }
        Ok(idx)
    }

    /// Escribe la decisión en la etapa y devuelve la fila actualizada.
    pub fn apply_decision(&mut self,
                          stage_name: &str,
                          decision: StageDecision,
                          approver_id: Uuid,
                          comments: Option<String>,
                          decided_at: DateTime<Utc>)
                          -> Result<ApprovalStage> {
        let idx = self.check_decidable(stage_name)?;
        let stage = &mut self.stages[idx];
        stage.stage_status = match decision {
            StageDecision::Approve => StageStatus::Approved,
            StageDecision::Reject => StageStatus::Rejected,
        };
        stage.approver_id = Some(approver_id);
        stage.decided_at = Some(decided_at);
        stage.comments = comments;
        Ok(stage.clone())
    }

    pub fn fold(&self) -> ChainState {
        ChainState { approved: self.stages.iter().filter(|s| s.stage_status == StageStatus::Approved).count(),
                     total: self.stages.len(),
                     any_rejected: self.stages.iter().any(|s| s.stage_status == StageStatus::Rejected) }
    }

    /// Estado del workflow derivado de las etapas.
    pub fn derived_status(&self) -> WorkflowStatus {
        let state = self.fold();
        match self.kind {
            WorkflowKind::Transfer => {
                let s = if state.any_rejected {
                    TransferStatus::Rejected
                } else if state.all_approved() {
                    TransferStatus::Completed
                } else if state.approved > 0 {
                    TransferStatus::InProgress
                } else {
                    TransferStatus::Requested
                };
                WorkflowStatus::Transfer(s)
            }
            WorkflowKind::Scrapping => {
                let s = if state.any_rejected {
                    ScrappingStatus::Rejected
                } else if state.all_approved() {
                    ScrappingStatus::Approved
                } else if state.approved > 0 {
                    ScrappingStatus::FirstApproved
                } else {
                    ScrappingStatus::Requested
                };
                WorkflowStatus::Scrapping(s)
            }
            WorkflowKind::Repair => self.kind.initial_status(),
        }
    }
}
