// Archivo: service.rs
// Propósito: `WorkflowService`, la fachada que abre la unidad de trabajo,
// resuelve el rol del actor, delega en `WorkflowEngine` y notifica tras
// confirmar. Es el único punto donde existen límites de transacción.
use crate::authorization::{Actor, Authorizer};
use crate::domain::{ChecklistCapture, ChecklistCategories, WorkflowFilter, WorkflowOutcome, WorkflowRequest, WorkflowView};
use crate::engine::{Applied, NewWorkflow, WorkflowEngine};
use crate::errors::{FlowError, Result};
use crate::repository::{NotificationSink, WorkflowStore, WorkflowTx};
use crate::status::{StageDecision, WorkflowKind, WorkflowStatus};
use chrono::Utc;
use log::{error, info, warn};
use std::sync::Arc;
use uuid::Uuid;

/// Fachada de operaciones sobre workflows.
///
/// Las mutaciones siguen siempre el mismo camino: rol del actor (fuera de la
/// transacción) -> unidad de trabajo -> bloqueo de fila -> validación ->
/// mutación -> efectos -> historial -> commit. Cualquier error revierte todo.
pub struct WorkflowService<S> where S: WorkflowStore
{
    store: Arc<S>,
    engine: WorkflowEngine,
    authorizer: Arc<dyn Authorizer>,
    notifier: Arc<dyn NotificationSink>,
}

impl<S> Clone for WorkflowService<S> where S: WorkflowStore
{
    fn clone(&self) -> Self {
        Self { store: self.store.clone(),
               engine: self.engine.clone(),
               authorizer: self.authorizer.clone(),
               notifier: self.notifier.clone() }
    }
}

impl<S> WorkflowService<S> where S: WorkflowStore
{
    pub fn new(store: Arc<S>,
               engine: WorkflowEngine,
               authorizer: Arc<dyn Authorizer>,
               notifier: Arc<dyn NotificationSink>)
               -> Self {
        Self { store, engine, authorizer, notifier }
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    /// Crea un workflow en su estado inicial con sus etapas.
    pub fn create_workflow(&self, new: NewWorkflow, actor_id: Uuid) -> Result<WorkflowRequest> {
        let actor = self.resolve_actor(actor_id)?;
        let kind = new.details.kind();
        let outcome = self.run(kind, "create", |engine, tx| engine.create(tx, &new, &actor, Utc::now()))?;
        Ok(outcome.request)
    }

    /// Cambia el estado a `target` (texto interpretado según `kind`).
    pub fn transition_status(&self,
                             kind: WorkflowKind,
                             id: Uuid,
                             target: &str,
                             actor_id: Uuid,
                             command_id: Option<Uuid>)
                             -> Result<WorkflowOutcome> {
        self.transition_status_with_reason(kind, id, target, None, actor_id, command_id)
    }

    /// Como `transition_status`; `reason` es obligatorio cuando `target` es
    /// `rejected`.
    pub fn transition_status_with_reason(&self,
                                         kind: WorkflowKind,
                                         id: Uuid,
                                         target: &str,
                                         reason: Option<&str>,
                                         actor_id: Uuid,
                                         command_id: Option<Uuid>)
                                         -> Result<WorkflowOutcome> {
        let target = WorkflowStatus::parse(kind, target)?;
        let actor = self.resolve_actor(actor_id)?;
        self.run(kind, "transition", |engine, tx| {
                engine.transition(tx, kind, &id, target, reason, &actor, command_id, Utc::now())
            })
    }

    /// Aprueba o rechaza la etapa `stage_name`.
    pub fn decide_stage(&self,
                        kind: WorkflowKind,
                        id: Uuid,
                        stage_name: &str,
                        decision: StageDecision,
                        comments: Option<String>,
                        actor_id: Uuid,
                        command_id: Option<Uuid>)
                        -> Result<WorkflowOutcome> {
        let actor = self.resolve_actor(actor_id)?;
        self.run(kind, "decide", |engine, tx| {
                engine.decide(tx, kind, &id, stage_name, decision, comments, &actor, command_id, Utc::now())
            })
    }

    /// Rechazo de escape desde cualquier estado no terminal.
    pub fn reject(&self,
                  kind: WorkflowKind,
                  id: Uuid,
                  reason: &str,
                  actor_id: Uuid,
                  command_id: Option<Uuid>)
                  -> Result<WorkflowOutcome> {
        let actor = self.resolve_actor(actor_id)?;
        self.run(kind, "reject", |engine, tx| engine.reject(tx, kind, &id, reason, &actor, command_id, Utc::now()))
    }

    pub fn capture_checklist(&self,
                             kind: WorkflowKind,
                             id: Uuid,
                             stage_key: &str,
                             categories: ChecklistCategories,
                             actor_id: Uuid)
                             -> Result<ChecklistCapture> {
        let actor = self.resolve_actor(actor_id)?;
        let res = self.store.transaction(|tx| {
                                  self.engine
                                      .capture_checklist(tx, kind, &id, stage_key, categories, &actor, Utc::now())
                              });
        match &res {
            Ok(c) => info!("checklist '{}' guardado en {} {}", c.stage_key, kind, id),
            Err(e) => Self::log_failure(kind, "checklist", e),
        }
        res
    }

    pub fn get_workflow(&self, kind: WorkflowKind, id: Uuid) -> Result<WorkflowView> {
        self.store.transaction(|tx| self.engine.view(tx, kind, &id))
    }

    pub fn list_workflows(&self, kind: WorkflowKind, filter: &WorkflowFilter) -> Result<Vec<WorkflowRequest>> {
        self.store.transaction(|tx| self.engine.list(tx, kind, filter))
    }

    fn resolve_actor(&self, actor_id: Uuid) -> Result<Actor> {
        match self.authorizer.actor_role(&actor_id)? {
            Some(role) => Ok(Actor { id: actor_id, role }),
            None => {
                warn!("actor desconocido {}", actor_id);
                Err(FlowError::Unauthorized(format!("actor desconocido: {}", actor_id)))
            }
        }
    }

    /// Ejecuta una mutación en una unidad de trabajo y notifica después del
    /// commit.
    fn run<F>(&self, kind: WorkflowKind, op: &str, f: F) -> Result<WorkflowOutcome>
        where F: FnOnce(&WorkflowEngine, &mut dyn WorkflowTx) -> Result<Applied>
    {
        let engine = &self.engine;
        let res = self.store.transaction(|tx| f(engine, tx));
        match res {
            Ok(applied) => {
                let o = &applied.outcome;
                if o.replayed {
                    info!("{} {} {}: comando repetido, sin cambios", op, kind, o.request.id);
                } else if o.noop {
                    info!("{} {} {}: mismo estado '{}', sin cambios", op, kind, o.request.id, o.request.status);
                } else {
                    info!("{} {} {} -> '{}'", op, kind, o.request.id, o.request.status);
                }
                if let Some(event) = &applied.event {
                    self.notifier.notify(event);
                }
                Ok(applied.outcome)
            }
            Err(e) => {
                Self::log_failure(kind, op, &e);
                Err(e)
            }
        }
    }

    fn log_failure(kind: WorkflowKind, op: &str, e: &FlowError) {
        match e {
            FlowError::Storage(_) => error!("{} {} falló: {}", op, kind, e),
            _ => warn!("{} {} rechazado: {}", op, kind, e),
        }
    }
}
