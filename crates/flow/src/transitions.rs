// Archivo: transitions.rs
// Propósito: tabla pura de transiciones legales (estado actual -> estado
// pedido) por tipo de workflow. Sin efectos laterales; la consultan el motor
// y las pruebas.
use crate::status::{RepairStatus, ScrappingStatus, TransferStatus, WorkflowKind, WorkflowStatus};

/// `true` si `from -> to` es legal para `kind`.
///
/// Los estados de otro tipo nunca son legales. Las transiciones al mismo
/// estado son legales (no-op) en todo estado no terminal; aceptarlas o no
/// lo decide `SameStatePolicy`.
pub fn is_legal(kind: WorkflowKind, from: WorkflowStatus, to: WorkflowStatus) -> bool {
    if from.kind() != kind || to.kind() != kind {
        return false;
    }
    match (from, to) {
        (WorkflowStatus::Repair(f), WorkflowStatus::Repair(t)) => repair_legal(f, t),
        (WorkflowStatus::Transfer(f), WorkflowStatus::Transfer(t)) => transfer_legal(f, t),
        (WorkflowStatus::Scrapping(f), WorkflowStatus::Scrapping(t)) => scrapping_legal(f, t),
        _ => false,
    }
}

/// Estados alcanzables desde `from` (incluye el propio si no es terminal).
pub fn legal_targets(from: WorkflowStatus) -> Vec<WorkflowStatus> {
    let kind = from.kind();
    WorkflowStatus::all(kind).into_iter().filter(|to| is_legal(kind, from, *to)).collect()
}

pub fn repair_legal(from: RepairStatus, to: RepairStatus) -> bool {
    use RepairStatus::*;
    if from.is_terminal() {
        return false;
    }
    if from == to {
        return true;
    }
    matches!((from, to),
             (Requested, Accepted)
             | (Requested, Rejected)
             | (Accepted, InProgress)
             | (Accepted, Rejected)
             | (InProgress, Done)
             | (InProgress, Rejected))
}

/// El estado de transferencia se deriva de las etapas; la tabla describe
/// las derivaciones posibles.
pub fn transfer_legal(from: TransferStatus, to: TransferStatus) -> bool {
    use TransferStatus::*;
    if from.is_terminal() {
        return false;
    }
    if from == to {
        return true;
    }
    matches!((from, to),
             (Requested, InProgress)
             | (Requested, Completed)
             | (Requested, Rejected)
             | (InProgress, Completed)
             | (InProgress, Rejected))
}

pub fn scrapping_legal(from: ScrappingStatus, to: ScrappingStatus) -> bool {
    use ScrappingStatus::*;
    if from.is_terminal() {
        return false;
    }
    if from == to {
        return true;
    }
    matches!((from, to),
             (Requested, FirstApproved)
             | (Requested, Rejected)
             | (FirstApproved, Approved)
             | (FirstApproved, Rejected)
             | (Approved, Scrapped))
}
