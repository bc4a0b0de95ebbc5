// Archivo: engine.rs
// Propósito: reglas del motor de workflows ejecutadas sobre una unidad de
// trabajo ya abierta. Cada operación bloquea la fila del workflow, valida,
// muta, aplica efectos y registra historial usando el mismo manejador; el
// llamador (`WorkflowService`) decide confirmar o revertir.
use crate::approval::{initial_stages, ApprovalChain};
use crate::authorization::{ensure_allowed, Actor, GuardedAction};
use crate::config::{SameStatePolicy, WorkflowConfig};
use crate::domain::{ApprovalStage, ChecklistCapture, ChecklistCategories, HistoryAction, HistoryEntry, WorkflowDetails,
                    WorkflowEvent, WorkflowFilter, WorkflowOutcome, WorkflowRequest, WorkflowView};
use crate::errors::{FlowError, Result};
use crate::history::{HistoryRecorder, Transition};
use crate::repository::WorkflowTx;
use crate::side_effects::{SideEffect, SideEffectApplier};
use crate::status::{RepairStatus, ScrappingStatus, StageDecision, WorkflowKind, WorkflowStatus};
use crate::transitions;
use chrono::{DateTime, Utc};
use log::debug;
use serde_json::json;
use uuid::Uuid;

/// Datos de creación de un workflow.
#[derive(Debug, Clone, PartialEq)]
pub struct NewWorkflow {
    pub mold_id: Uuid,
    pub details: WorkflowDetails,
}

/// Resultado interno: lo que se devuelve al llamador y el evento a notificar
/// tras confirmar (ninguno si la llamada no escribió nada).
#[derive(Debug, Clone)]
pub struct Applied {
    pub outcome: WorkflowOutcome,
    pub event: Option<WorkflowEvent>,
}

/// Motor sin estado propio más allá de su configuración.
#[derive(Debug, Clone, Default)]
pub struct WorkflowEngine {
    config: WorkflowConfig,
}

impl WorkflowEngine {
    pub fn new(config: WorkflowConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &WorkflowConfig {
        &self.config
    }

    /// Crea la solicitud en su estado inicial, sus etapas `pending` y la
    /// entrada `created`.
    pub fn create(&self, tx: &mut dyn WorkflowTx, new: &NewWorkflow, actor: &Actor, now: DateTime<Utc>) -> Result<Applied> {
        new.details.validate()?;
        let kind = new.details.kind();
        let mold = tx.get_mold(&new.mold_id)?
                     .ok_or_else(|| FlowError::NotFound(format!("molde {}", new.mold_id)))?;
        if mold.is_scrapped() {
            return Err(FlowError::StateConflict(format!("el molde {} ya está desechado", mold.id())));
        }
        if let WorkflowDetails::Transfer(t) = &new.details {
            if t.from_company_id != mold.current_location_company_id() {
                return Err(FlowError::StateConflict(format!("el molde {} no está ubicado en la empresa {}",
                                                            mold.id(),
                                                            t.from_company_id)));
            }
        }

        let request = WorkflowRequest { id: Uuid::new_v4(),
                                        kind,
                                        mold_id: new.mold_id,
                                        status: kind.initial_status(),
                                        requested_by: actor.id,
                                        created_at: now,
                                        updated_at: now,
                                        details: new.details.clone() };
        tx.insert_request(&request)?;
        let stages = initial_stages(kind, request.id);
        if !stages.is_empty() {
            tx.insert_stages(&stages)?;
        }
        let entry = HistoryRecorder::record(tx,
                                            &request,
                                            Transition { action: HistoryAction::Created,
                                                         old_status: None,
                                                         new_status: request.status,
                                                         actor_id: actor.id,
                                                         metadata: json!({ "mold_id": request.mold_id,
                                                                           "stages": stages.len() }),
                                                         command_id: None },
                                            now)?;
        Ok(Self::applied(request, None, false, None, entry))
    }

    /// Cambio de estado pedido explícitamente.
    ///
    /// Reparación: según la tabla. Desecho: `first_approved` y `approved`
    /// deciden la etapa correspondiente, `scrapped` es la disposición final.
    /// Transferencia: sólo `rejected`, el resto se deriva de las etapas.
    /// `rejected` es el rechazo de escape: vale desde cualquier estado no
    /// terminal y exige `reason` no vacío.
    #[allow(clippy::too_many_arguments)]
    pub fn transition(&self,
                      tx: &mut dyn WorkflowTx,
                      kind: WorkflowKind,
                      id: &Uuid,
                      target: WorkflowStatus,
                      reason: Option<&str>,
                      actor: &Actor,
                      command_id: Option<Uuid>,
                      now: DateTime<Utc>)
                      -> Result<Applied> {
        if target.kind() != kind {
            return Err(FlowError::Validation(format!("estado '{}' no pertenece a {}", target, kind)));
        }
        let request = Self::lock_existing(tx, kind, id)?;
        if let Some(done) = Self::replayed(tx, &request, command_id)? {
            return Ok(done);
        }
        Self::ensure_open(&request)?;

        if target.is_rejected() {
            let reason = match reason.map(str::trim) {
                Some(r) if !r.is_empty() => r,
                _ => return Err(FlowError::Validation("el motivo del rechazo es obligatorio".into())),
            };
            return self.reject_locked(tx, request, Some(reason), actor, command_id, now);
        }
        if target == request.status {
            return self.same_state(tx, request, actor);
        }
        if !transitions::is_legal(kind, request.status, target) {
            return Err(FlowError::StateConflict(format!("transición ilegal {} -> {} en {}", request.status, target, kind)));
        }

        match target {
            WorkflowStatus::Repair(next) => self.advance_repair(tx, request, next, actor, command_id, now),
            WorkflowStatus::Scrapping(ScrappingStatus::FirstApproved) => {
                self.decide_locked(tx, request, "first_approval", StageDecision::Approve, None, actor, command_id, now)
            }
            WorkflowStatus::Scrapping(ScrappingStatus::Approved) => {
                self.decide_locked(tx, request, "second_approval", StageDecision::Approve, None, actor, command_id, now)
            }
            WorkflowStatus::Scrapping(ScrappingStatus::Scrapped) => self.dispose_locked(tx, request, actor, command_id, now),
            other => Err(FlowError::StateConflict(format!("el estado '{}' de {} se deriva de las etapas", other, kind))),
        }
    }

    /// Aprueba o rechaza una etapa con nombre.
    #[allow(clippy::too_many_arguments)]
    pub fn decide(&self,
                  tx: &mut dyn WorkflowTx,
                  kind: WorkflowKind,
                  id: &Uuid,
                  stage_name: &str,
                  decision: StageDecision,
                  comments: Option<String>,
                  actor: &Actor,
                  command_id: Option<Uuid>,
                  now: DateTime<Utc>)
                  -> Result<Applied> {
        if !kind.is_staged() {
            return Err(FlowError::NotFound(format!("etapa '{}': {} no tiene etapas de aprobación", stage_name, kind)));
        }
        let request = Self::lock_existing(tx, kind, id)?;
        if let Some(done) = Self::replayed(tx, &request, command_id)? {
            return Ok(done);
        }
        Self::ensure_open(&request)?;
        self.decide_locked(tx, request, stage_name, decision, comments, actor, command_id, now)
    }

    /// Rechazo de escape desde cualquier estado no terminal.
    #[allow(clippy::too_many_arguments)]
    pub fn reject(&self,
                  tx: &mut dyn WorkflowTx,
                  kind: WorkflowKind,
                  id: &Uuid,
                  reason: &str,
                  actor: &Actor,
                  command_id: Option<Uuid>,
                  now: DateTime<Utc>)
                  -> Result<Applied> {
        if reason.trim().is_empty() {
            return Err(FlowError::Validation("el motivo del rechazo es obligatorio".into()));
        }
        let request = Self::lock_existing(tx, kind, id)?;
        if let Some(done) = Self::replayed(tx, &request, command_id)? {
            return Ok(done);
        }
        Self::ensure_open(&request)?;
        self.reject_locked(tx, request, Some(reason.trim()), actor, command_id, now)
    }

    /// Guarda (o reemplaza) el checklist de `stage_key`. No cambia estado ni
    /// escribe historial.
    #[allow(clippy::too_many_arguments)]
    pub fn capture_checklist(&self,
                             tx: &mut dyn WorkflowTx,
                             kind: WorkflowKind,
                             id: &Uuid,
                             stage_key: &str,
                             categories: ChecklistCategories,
                             actor: &Actor,
                             now: DateTime<Utc>)
                             -> Result<ChecklistCapture> {
        ChecklistCapture::validate(kind, stage_key, &categories)?;
        let request = Self::lock_existing(tx, kind, id)?;
        Self::ensure_open(&request)?;
        let capture = ChecklistCapture { workflow_kind: kind,
                                         workflow_id: request.id,
                                         stage_key: stage_key.to_string(),
                                         categories,
                                         captured_by: actor.id,
                                         captured_at: now };
        tx.save_checklist(&capture)?;
        Ok(capture)
    }

    pub fn view(&self, tx: &mut dyn WorkflowTx, kind: WorkflowKind, id: &Uuid) -> Result<WorkflowView> {
        let request = tx.find_request(kind, id)?
                        .ok_or_else(|| FlowError::NotFound(format!("workflow {} {}", kind, id)))?;
        let stages = tx.load_stages(kind, id)?;
        let history = tx.load_history(kind, id)?;
        let checklists = tx.load_checklists(kind, id)?;
        Ok(WorkflowView { request, stages, history, checklists })
    }

    /// El almacén filtra por estado y molde; la empresa se resuelve aquí
    /// (transferencia: origen o destino; resto: ubicación actual del molde).
    pub fn list(&self, tx: &mut dyn WorkflowTx, kind: WorkflowKind, filter: &WorkflowFilter) -> Result<Vec<WorkflowRequest>> {
        if let Some(status) = filter.status {
            if status.kind() != kind {
                return Err(FlowError::Validation(format!("estado '{}' no pertenece a {}", status, kind)));
            }
        }
        let requests = tx.list_requests(kind, filter)?;
        let company = match filter.company_id {
            Some(c) => c,
            None => return Ok(requests),
        };
        let mut out = Vec::with_capacity(requests.len());
        for r in requests {
            let matches = match &r.details {
                WorkflowDetails::Transfer(_) => r.company_ids().contains(&company),
                _ => tx.get_mold(&r.mold_id)?
                       .map(|m| m.current_location_company_id() == company)
                       .unwrap_or(false),
            };
            if matches {
                out.push(r);
            }
        }
        Ok(out)
    }

    // --- pasos internos sobre un workflow ya bloqueado ---

    fn same_state(&self, tx: &mut dyn WorkflowTx, request: WorkflowRequest, actor: &Actor) -> Result<Applied> {
        if let WorkflowStatus::Repair(s) = request.status {
            ensure_allowed(actor, request.kind, GuardedAction::RepairStatus(s))?;
        }
        match self.config.same_state_policy {
            SameStatePolicy::Reject => {
                Err(FlowError::Validation(format!("el workflow ya está en '{}'", request.status)))
            }
            SameStatePolicy::AllowNoop => {
                debug!("transición al mismo estado '{}' en {} {}: sin cambios", request.status, request.kind, request.id);
                let all_completed = Self::chain_of(tx, &request)?.map(|c| c.fold().all_approved()).unwrap_or(false);
                Ok(Applied { outcome: WorkflowOutcome { request,
                                                        stage: None,
                                                        all_completed,
                                                        replayed: false,
                                                        noop: true,
                                                        side_effect: None },
                             event: None })
            }
        }
    }

    fn advance_repair(&self,
                      tx: &mut dyn WorkflowTx,
                      mut request: WorkflowRequest,
                      next: RepairStatus,
                      actor: &Actor,
                      command_id: Option<Uuid>,
                      now: DateTime<Utc>)
                      -> Result<Applied> {
        ensure_allowed(actor, request.kind, GuardedAction::RepairStatus(next))?;
        let previous = request.status;
        request.status = WorkflowStatus::Repair(next);
        request.updated_at = now;
        tx.update_request(&request)?;
        let side_effect = SideEffectApplier::apply(tx, &request, previous)?;
        let action = match next {
            RepairStatus::Accepted => HistoryAction::Approval,
            RepairStatus::Done => HistoryAction::Completion,
            RepairStatus::Rejected => HistoryAction::Rejection,
            RepairStatus::Requested | RepairStatus::InProgress => HistoryAction::StatusChange,
        };
        let entry = HistoryRecorder::record(tx,
                                            &request,
                                            Transition { action,
                                                         old_status: Some(previous),
                                                         new_status: request.status,
                                                         actor_id: actor.id,
                                                         metadata: json!({}),
                                                         command_id },
                                            now)?;
        Ok(Self::applied(request, None, false, side_effect, entry))
    }

    #[allow(clippy::too_many_arguments)]
    fn decide_locked(&self,
                     tx: &mut dyn WorkflowTx,
                     mut request: WorkflowRequest,
                     stage_name: &str,
                     decision: StageDecision,
                     comments: Option<String>,
                     actor: &Actor,
                     command_id: Option<Uuid>,
                     now: DateTime<Utc>)
                     -> Result<Applied> {
        let mut chain = ApprovalChain::new(request.kind, tx.lock_stages(request.kind, &request.id)?);
        chain.check_decidable(stage_name)?;
        ensure_allowed(actor, request.kind, GuardedAction::DecideStage(stage_name))?;
        let comments = comments.map(|c| c.trim().to_string()).filter(|c| !c.is_empty());
        if decision == StageDecision::Reject && comments.is_none() {
            return Err(FlowError::Validation("el motivo del rechazo es obligatorio".into()));
        }

        let stage = chain.apply_decision(stage_name, decision, actor.id, comments.clone(), now)?;
        let previous = request.status;
        let next = chain.derived_status();
        if next != previous && !transitions::is_legal(request.kind, previous, next) {
            return Err(FlowError::StateConflict(format!("transición ilegal {} -> {} en {}", previous, next, request.kind)));
        }
        tx.update_stage(&stage)?;
        request.status = next;
        request.updated_at = now;
        tx.update_request(&request)?;
        let side_effect = SideEffectApplier::apply(tx, &request, previous)?;

        let action = match decision {
            StageDecision::Reject => HistoryAction::Rejection,
            StageDecision::Approve if request.status.is_terminal_success() => HistoryAction::Completion,
            StageDecision::Approve => HistoryAction::Approval,
        };
        let entry = HistoryRecorder::record(tx,
                                            &request,
                                            Transition { action,
                                                         old_status: Some(previous),
                                                         new_status: request.status,
                                                         actor_id: actor.id,
                                                         metadata: json!({ "stage": stage.stage_name,
                                                                           "stage_order": stage.stage_order,
                                                                           "decision": decision,
                                                                           "comments": comments,
                                                                           "side_effect": side_effect }),
                                                         command_id },
                                            now)?;
        let all_completed = chain.fold().all_approved();
        Ok(Self::applied(request, Some(stage), all_completed, side_effect, entry))
    }

    fn reject_locked(&self,
                     tx: &mut dyn WorkflowTx,
                     mut request: WorkflowRequest,
                     reason: Option<&str>,
                     actor: &Actor,
                     command_id: Option<Uuid>,
                     now: DateTime<Utc>)
                     -> Result<Applied> {
        let mut chain = Self::chain_of(tx, &request)?;
        let pending = chain.as_ref().and_then(|c| c.pending_stage()).map(|s| s.stage_name.clone());
        ensure_allowed(actor,
                       request.kind,
                       GuardedAction::Reject { current: request.status, pending_stage: pending.as_deref() })?;

        let mut stage = None;
        if let (Some(c), Some(name)) = (chain.as_mut(), pending.as_deref()) {
            let decided = c.apply_decision(name, StageDecision::Reject, actor.id, reason.map(str::to_string), now)?;
            tx.update_stage(&decided)?;
            stage = Some(decided);
        }
        let previous = request.status;
        request.status = request.kind.rejected_status();
        request.updated_at = now;
        tx.update_request(&request)?;
        let entry = HistoryRecorder::record(tx,
                                            &request,
                                            Transition { action: HistoryAction::Rejection,
                                                         old_status: Some(previous),
                                                         new_status: request.status,
                                                         actor_id: actor.id,
                                                         metadata: json!({ "reason": reason,
                                                                           "stage": stage.as_ref().map(|s| s.stage_name.clone()) }),
                                                         command_id },
                                            now)?;
        Ok(Self::applied(request, stage, false, None, entry))
    }

    fn dispose_locked(&self,
                      tx: &mut dyn WorkflowTx,
                      mut request: WorkflowRequest,
                      actor: &Actor,
                      command_id: Option<Uuid>,
                      now: DateTime<Utc>)
                      -> Result<Applied> {
        ensure_allowed(actor, request.kind, GuardedAction::Dispose)?;
        let previous = request.status;
        request.status = WorkflowStatus::Scrapping(ScrappingStatus::Scrapped);
        request.updated_at = now;
        tx.update_request(&request)?;
        let side_effect = SideEffectApplier::apply(tx, &request, previous)?;
        let entry = HistoryRecorder::record(tx,
                                            &request,
                                            Transition { action: HistoryAction::Completion,
                                                         old_status: Some(previous),
                                                         new_status: request.status,
                                                         actor_id: actor.id,
                                                         metadata: json!({ "side_effect": side_effect }),
                                                         command_id },
                                            now)?;
        Ok(Self::applied(request, None, true, side_effect, entry))
    }

    // --- utilidades ---

    fn lock_existing(tx: &mut dyn WorkflowTx, kind: WorkflowKind, id: &Uuid) -> Result<WorkflowRequest> {
        tx.lock_request(kind, id)?
          .ok_or_else(|| FlowError::NotFound(format!("workflow {} {}", kind, id)))
    }

    fn ensure_open(request: &WorkflowRequest) -> Result<()> {
        if request.is_terminal() {
            return Err(FlowError::StateConflict(format!("el workflow {} {} está en estado terminal '{}'",
                                                        request.kind,
                                                        request.id,
                                                        request.status)));
        }
        Ok(())
    }

    fn chain_of(tx: &mut dyn WorkflowTx, request: &WorkflowRequest) -> Result<Option<ApprovalChain>> {
        if !request.kind.is_staged() {
            return Ok(None);
        }
        Ok(Some(ApprovalChain::new(request.kind, tx.lock_stages(request.kind, &request.id)?)))
    }

    /// Si `command_id` ya fue aplicado a este workflow, devuelve el estado
    /// actual sin escribir nada.
    fn replayed(tx: &mut dyn WorkflowTx, request: &WorkflowRequest, command_id: Option<Uuid>) -> Result<Option<Applied>> {
        let cmd = match command_id {
            Some(c) => c,
            None => return Ok(None),
        };
        if HistoryRecorder::find_command(tx, request.kind, &request.id, &cmd)?.is_none() {
            return Ok(None);
        }
        debug!("comando {} ya aplicado a {} {}", cmd, request.kind, request.id);
        let all_completed = match Self::chain_of(tx, request)? {
            Some(c) => c.fold().all_approved(),
            None => request.status.is_terminal_success(),
        };
        Ok(Some(Applied { outcome: WorkflowOutcome { request: request.clone(),
                                                     stage: None,
                                                     all_completed,
                                                     replayed: true,
                                                     noop: false,
                                                     side_effect: None },
                          event: None }))
    }

    fn applied(request: WorkflowRequest,
               stage: Option<ApprovalStage>,
               all_completed: bool,
               side_effect: Option<SideEffect>,
               entry: HistoryEntry)
               -> Applied {
        let event = WorkflowEvent { mold_id: request.mold_id, entry };
        Applied { outcome: WorkflowOutcome { request,
                                             stage,
                                             all_completed,
                                             replayed: false,
                                             noop: false,
                                             side_effect },
                  event: Some(event) }
    }
}
