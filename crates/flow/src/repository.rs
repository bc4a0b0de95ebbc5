// Archivo: repository.rs
// Propósito: contratos de persistencia del motor. `WorkflowStore` abre una
// unidad de trabajo; `WorkflowTx` es el manejador acotado a esa transacción
// que se pasa por motor, cadena de aprobación, efectos e historial.
use crate::domain::{ApprovalStage, ChecklistCapture, HistoryEntry, WorkflowEvent, WorkflowFilter, WorkflowRequest};
use crate::errors::Result;
use crate::status::WorkflowKind;
use mold_domain::MoldRepository;
use uuid::Uuid;

/// Operaciones disponibles dentro de una transacción.
///
/// Hereda `MoldRepository`: los efectos sobre el molde se escriben con el
/// mismo manejador, en la misma transacción que el historial.
pub trait WorkflowTx: MoldRepository {
    /// Inserta la solicitud. Falla con `Validation` si el id ya existe.
    fn insert_request(&mut self, request: &WorkflowRequest) -> Result<()>;

    /// Lectura simple (sin bloqueo).
    fn find_request(&mut self, kind: WorkflowKind, id: &Uuid) -> Result<Option<WorkflowRequest>>;

    /// Lectura con bloqueo de fila. Serializa decisiones concurrentes sobre
    /// el mismo workflow.
    fn lock_request(&mut self, kind: WorkflowKind, id: &Uuid) -> Result<Option<WorkflowRequest>>;

    /// Sobrescribe estado y `updated_at`.
    fn update_request(&mut self, request: &WorkflowRequest) -> Result<()>;

    fn list_requests(&mut self, kind: WorkflowKind, filter: &WorkflowFilter) -> Result<Vec<WorkflowRequest>>;

    fn insert_stages(&mut self, stages: &[ApprovalStage]) -> Result<()>;

    /// Etapas ordenadas por `stage_order`.
    fn load_stages(&mut self, kind: WorkflowKind, workflow_id: &Uuid) -> Result<Vec<ApprovalStage>>;

    /// Etapas bloqueadas para escritura.
    fn lock_stages(&mut self, kind: WorkflowKind, workflow_id: &Uuid) -> Result<Vec<ApprovalStage>>;

    fn update_stage(&mut self, stage: &ApprovalStage) -> Result<()>;

    /// Append-only; no existe operación de actualización ni borrado.
    fn append_history(&mut self, entry: &HistoryEntry) -> Result<()>;

    /// Historial ordenado por `(occurred_at, sequence)`.
    fn load_history(&mut self, kind: WorkflowKind, workflow_id: &Uuid) -> Result<Vec<HistoryEntry>>;

    /// Inserta o reemplaza la captura `(kind, workflow_id, stage_key)`.
    fn save_checklist(&mut self, capture: &ChecklistCapture) -> Result<()>;

    fn load_checklists(&mut self, kind: WorkflowKind, workflow_id: &Uuid) -> Result<Vec<ChecklistCapture>>;
}

/// Fábrica de unidades de trabajo.
///
/// `transaction` confirma sólo si el cierre devuelve `Ok`; cualquier `Err`
/// revierte todas las escrituras hechas a través del manejador.
pub trait WorkflowStore: Send + Sync {
    fn transaction<T, F>(&self, f: F) -> Result<T>
        where F: FnOnce(&mut dyn WorkflowTx) -> Result<T>;
}

/// Destino de eventos tras confirmar. No debe bloquear ni fallar.
pub trait NotificationSink: Send + Sync {
    fn notify(&self, event: &WorkflowEvent);
}
