// Ejemplo: ciclo de vida de una reparación sobre el store en memoria.
use flow::stubs::{InMemoryWorkflowStore, LogNotificationSink, StaticAuthorizer};
use flow::{NewWorkflow, RepairDetails, RepairPriority, Role, WorkflowConfig, WorkflowDetails, WorkflowEngine,
           WorkflowKind, WorkflowService};
use mold_domain::Mold;
use std::sync::Arc;
use uuid::Uuid;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let store = Arc::new(InMemoryWorkflowStore::new());
    let mold = Mold::new("M-001", Uuid::new_v4(), 42_000)?;
    store.seed_mold(&mold)?;

    let maker = Uuid::new_v4();
    let service = WorkflowService::new(store.clone(),
                                       WorkflowEngine::new(WorkflowConfig::from_env()?),
                                       Arc::new(StaticAuthorizer::new().with(maker, Role::Maker)),
                                       Arc::new(LogNotificationSink));

    let details = RepairDetails { priority: RepairPriority::Urgent,
                                  title: "Ejector pin broken".into(),
                                  description: String::new(),
                                  checklist_instance_id: None };
    let req = service.create_workflow(NewWorkflow { mold_id: mold.id(), details: WorkflowDetails::Repair(details) },
                                      maker)?;
    for target in ["accepted", "in_progress", "done"] {
        let out = service.transition_status(WorkflowKind::Repair, req.id, target, maker, None)?;
        println!("{} -> {} ({})", req.id, out.request.status, out.request.status.label());
    }

    let view = service.get_workflow(WorkflowKind::Repair, req.id)?;
    for h in &view.history {
        println!("#{} {} {:?} -> {}", h.sequence, h.action_type.as_str(), h.old_status.map(|s| s.as_str()), h.new_status);
    }
    Ok(())
}
