// Archivo: stubs.rs
// Propósito: implementaciones en memoria para pruebas y wiring rápido.
//
// Incluye un store transaccional en memoria (`InMemoryWorkflowStore`), un
// autorizador estático y sinks de notificación. No son durables.
use crate::authorization::{Authorizer, Role};
use crate::domain::{ApprovalStage, ChecklistCapture, HistoryEntry, WorkflowEvent, WorkflowFilter, WorkflowRequest};
use crate::errors::{FlowError, Result};
use crate::repository::{NotificationSink, WorkflowStore, WorkflowTx};
use crate::status::WorkflowKind;
use log::info;
use mold_domain::{DomainError, Mold, MoldRegistry, MoldRepository, PlantMold};
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use uuid::Uuid;

type Key = (WorkflowKind, Uuid);

/// Estado completo del store. Se clona al abrir una transacción y sólo se
/// reemplaza al confirmar.
#[derive(Debug, Clone, Default)]
pub struct MemoryState {
    molds: MoldRegistry,
    requests: HashMap<Key, WorkflowRequest>,
    stages: HashMap<Key, Vec<ApprovalStage>>,
    history: HashMap<Key, Vec<HistoryEntry>>,
    checklists: HashMap<Key, BTreeMap<String, ChecklistCapture>>,
}

/// Store en memoria. El mutex se mantiene tomado durante toda la unidad de
/// trabajo, lo que equivale a un bloqueo de todas las filas.
#[derive(Debug, Default)]
pub struct InMemoryWorkflowStore {
    state: Mutex<MemoryState>,
    fail_history: AtomicBool,
}

impl InMemoryWorkflowStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store con el registro de moldes ya cargado.
    pub fn with_molds(molds: MoldRegistry) -> Self {
        Self { state: Mutex::new(MemoryState { molds, ..Default::default() }),
               fail_history: AtomicBool::new(false) }
    }

    /// Da de alta un molde fuera de cualquier workflow.
    pub fn seed_mold(&self, mold: &Mold) -> Result<()> {
        self.transaction(|tx| Ok(tx.insert_mold(mold)?))
    }

    pub fn seed_plant_mirror(&self, mirror: &PlantMold) -> Result<()> {
        self.transaction(|tx| Ok(tx.insert_plant_mirror(mirror)?))
    }

    pub fn mold(&self, id: &Uuid) -> Result<Option<Mold>> {
        self.transaction(|tx| Ok(tx.get_mold(id)?))
    }

    pub fn plant_mirrors(&self, mold_id: &Uuid) -> Result<Vec<PlantMold>> {
        self.transaction(|tx| Ok(tx.plant_mirrors(mold_id)?))
    }

    /// Hace fallar toda escritura de historial mientras esté activo.
    /// Sirve para comprobar que una transacción fallida no deja rastro.
    pub fn fail_history_appends(&self, fail: bool) {
        self.fail_history.store(fail, Ordering::SeqCst);
    }
}

impl WorkflowStore for InMemoryWorkflowStore {
    fn transaction<T, F>(&self, f: F) -> Result<T>
        where F: FnOnce(&mut dyn WorkflowTx) -> Result<T>
    {
        let mut guard = self.state.lock().unwrap_or_else(|e| e.into_inner());
        let mut tx = InMemoryTx { state: guard.clone(),
                                  fail_history: self.fail_history.load(Ordering::SeqCst) };
        let out = f(&mut tx)?;
        *guard = tx.state;
        Ok(out)
    }
}

/// Manejador de una transacción en memoria.
pub struct InMemoryTx {
    state: MemoryState,
    fail_history: bool,
}

impl MoldRepository for InMemoryTx {
    fn insert_mold(&mut self, mold: &Mold) -> std::result::Result<(), DomainError> {
        self.state.molds.insert_mold(mold)
    }

    fn get_mold(&mut self, id: &Uuid) -> std::result::Result<Option<Mold>, DomainError> {
        self.state.molds.get_mold(id)
    }

    fn lock_mold(&mut self, id: &Uuid) -> std::result::Result<Option<Mold>, DomainError> {
        self.state.molds.lock_mold(id)
    }

    fn update_mold(&mut self, mold: &Mold) -> std::result::Result<(), DomainError> {
        self.state.molds.update_mold(mold)
    }

    fn insert_plant_mirror(&mut self, mirror: &PlantMold) -> std::result::Result<(), DomainError> {
        self.state.molds.insert_plant_mirror(mirror)
    }

    fn plant_mirrors(&mut self, mold_id: &Uuid) -> std::result::Result<Vec<PlantMold>, DomainError> {
        self.state.molds.plant_mirrors(mold_id)
    }

    fn relocate_plant_mirrors(&mut self, mold_id: &Uuid, company_id: &Uuid) -> std::result::Result<usize, DomainError> {
        self.state.molds.relocate_plant_mirrors(mold_id, company_id)
    }
}

impl WorkflowTx for InMemoryTx {
    fn insert_request(&mut self, request: &WorkflowRequest) -> Result<()> {
        let key = (request.kind, request.id);
        if self.state.requests.contains_key(&key) {
            return Err(FlowError::Validation(format!("el workflow {} ya existe", request.id)));
        }
        self.state.requests.insert(key, request.clone());
        Ok(())
    }

    fn find_request(&mut self, kind: WorkflowKind, id: &Uuid) -> Result<Option<WorkflowRequest>> {
        Ok(self.state.requests.get(&(kind, *id)).cloned())
    }

    fn lock_request(&mut self, kind: WorkflowKind, id: &Uuid) -> Result<Option<WorkflowRequest>> {
        self.find_request(kind, id)
    }

    fn update_request(&mut self, request: &WorkflowRequest) -> Result<()> {
        match self.state.requests.get_mut(&(request.kind, request.id)) {
            Some(slot) => {
                *slot = request.clone();
                Ok(())
            }
            None => Err(FlowError::NotFound(format!("workflow {} {}", request.kind, request.id))),
        }
    }

    fn list_requests(&mut self, kind: WorkflowKind, filter: &WorkflowFilter) -> Result<Vec<WorkflowRequest>> {
        let mut out: Vec<WorkflowRequest> =
            self.state
                .requests
                .values()
                .filter(|r| r.kind == kind)
                .filter(|r| filter.status.map_or(true, |s| r.status == s))
                .filter(|r| filter.mold_id.map_or(true, |m| r.mold_id == m))
                .cloned()
                .collect();
        out.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        Ok(out)
    }

    fn insert_stages(&mut self, stages: &[ApprovalStage]) -> Result<()> {
        for s in stages {
            let list = self.state.stages.entry((s.workflow_kind, s.workflow_id)).or_default();
            if list.iter().any(|x| x.stage_order == s.stage_order) {
                return Err(FlowError::Validation(format!("etapa {} duplicada", s.stage_order)));
            }
            list.push(s.clone());
            list.sort_by_key(|x| x.stage_order);
        }
        Ok(())
    }

    fn load_stages(&mut self, kind: WorkflowKind, workflow_id: &Uuid) -> Result<Vec<ApprovalStage>> {
        Ok(self.state.stages.get(&(kind, *workflow_id)).cloned().unwrap_or_default())
    }

    fn lock_stages(&mut self, kind: WorkflowKind, workflow_id: &Uuid) -> Result<Vec<ApprovalStage>> {
        self.load_stages(kind, workflow_id)
    }

    fn update_stage(&mut self, stage: &ApprovalStage) -> Result<()> {
        let slot = self.state
                       .stages
                       .get_mut(&(stage.workflow_kind, stage.workflow_id))
                       .and_then(|list| list.iter_mut().find(|s| s.stage_order == stage.stage_order))
                       .ok_or_else(|| FlowError::NotFound(format!("etapa '{}'", stage.stage_name)))?;
        *slot = stage.clone();
        Ok(())
    }

    fn append_history(&mut self, entry: &HistoryEntry) -> Result<()> {
        if self.fail_history {
            return Err(FlowError::Storage("escritura de historial deshabilitada".into()));
        }
        self.state
            .history
            .entry((entry.workflow_kind, entry.workflow_id))
            .or_default()
            .push(entry.clone());
        Ok(())
    }

    fn load_history(&mut self, kind: WorkflowKind, workflow_id: &Uuid) -> Result<Vec<HistoryEntry>> {
        let mut list = self.state.history.get(&(kind, *workflow_id)).cloned().unwrap_or_default();
        list.sort_by(|a, b| a.occurred_at.cmp(&b.occurred_at).then(a.sequence.cmp(&b.sequence)));
        Ok(list)
    }

    fn save_checklist(&mut self, capture: &ChecklistCapture) -> Result<()> {
        self.state
            .checklists
            .entry((capture.workflow_kind, capture.workflow_id))
            .or_default()
            .insert(capture.stage_key.clone(), capture.clone());
        Ok(())
    }

    fn load_checklists(&mut self, kind: WorkflowKind, workflow_id: &Uuid) -> Result<Vec<ChecklistCapture>> {
        Ok(self.state
               .checklists
               .get(&(kind, *workflow_id))
               .map(|m| m.values().cloned().collect())
               .unwrap_or_default())
    }
}

/// Autorizador con una tabla fija actor -> rol.
#[derive(Debug, Clone, Default)]
pub struct StaticAuthorizer {
    roles: HashMap<Uuid, Role>,
}

impl StaticAuthorizer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, actor_id: Uuid, role: Role) -> Self {
        self.roles.insert(actor_id, role);
        self
    }

    pub fn grant(&mut self, actor_id: Uuid, role: Role) {
        self.roles.insert(actor_id, role);
    }

    /// Interpreta `uuid=rol,uuid=rol`. Una cadena vacía da un autorizador
    /// vacío.
    pub fn parse(spec: &str) -> Result<Self> {
        let mut out = Self::new();
        for pair in spec.split(',').map(str::trim).filter(|p| !p.is_empty()) {
            let (id, role) = pair.split_once('=')
                                 .ok_or_else(|| FlowError::Validation(format!("entrada de rol inválida: {}", pair)))?;
            let id = Uuid::parse_str(id.trim()).map_err(|e| FlowError::Validation(format!("actor '{}': {}", id, e)))?;
            out.grant(id, role.parse()?);
        }
        Ok(out)
    }

    pub fn len(&self) -> usize {
        self.roles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.roles.is_empty()
    }
}

impl Authorizer for StaticAuthorizer {
    fn actor_role(&self, actor_id: &Uuid) -> Result<Option<Role>> {
        Ok(self.roles.get(actor_id).copied())
    }
}

/// Sink que sólo escribe en el log.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogNotificationSink;

impl NotificationSink for LogNotificationSink {
    fn notify(&self, event: &WorkflowEvent) {
        info!("evento {} {} #{}: {} (molde {})",
              event.entry.workflow_kind,
              event.entry.workflow_id,
              event.entry.sequence,
              event.entry.action_type.as_str(),
              event.mold_id);
    }
}

/// Sink que guarda los eventos recibidos, para pruebas.
#[derive(Debug, Default)]
pub struct RecordingNotificationSink {
    events: Mutex<Vec<WorkflowEvent>>,
}

impl RecordingNotificationSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<WorkflowEvent> {
        self.events.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }
}

impl NotificationSink for RecordingNotificationSink {
    fn notify(&self, event: &WorkflowEvent) {
        self.events.lock().unwrap_or_else(|e| e.into_inner()).push(event.clone());
    }
}
