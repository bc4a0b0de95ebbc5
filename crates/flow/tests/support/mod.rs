#![allow(dead_code)]

use flow::stubs::{InMemoryWorkflowStore, RecordingNotificationSink, StaticAuthorizer};
use flow::{NewWorkflow, RepairDetails, RepairPriority, Role, SameStatePolicy, ScrappingDetails, TransferDetails,
           WorkflowConfig, WorkflowDetails, WorkflowEngine, WorkflowService};
use mold_domain::{Mold, PlantMold};
use std::sync::Arc;
use uuid::Uuid;

/// Un actor por rol, más las empresas y el molde que usan los escenarios.
pub struct Fixture {
  pub store: Arc<InMemoryWorkflowStore>,
  pub sink: Arc<RecordingNotificationSink>,
  pub service: WorkflowService<InMemoryWorkflowStore>,
  pub hq: Uuid,
  pub plant: Uuid,
  pub mold_id: Uuid,
  pub plant_manager: Uuid,
  pub developer: Uuid,
  pub maker: Uuid,
  pub admin: Uuid,
  pub disposal: Uuid,
  pub stranger: Uuid,
}

impl Fixture {
  pub fn new() -> Self {
    Self::with_policy(SameStatePolicy::AllowNoop)
  }

  pub fn with_policy(policy: SameStatePolicy) -> Self {
    let store = Arc::new(InMemoryWorkflowStore::new());
    let sink = Arc::new(RecordingNotificationSink::new());
    let hq = Uuid::new_v4();
    let plant = Uuid::new_v4();
    let mold = Mold::new("M-100", hq, 15_000).expect("valid mold");
    store.seed_mold(&mold).expect("seed mold");
    store.seed_plant_mirror(&PlantMold::new(mold.id(), hq)).expect("seed mirror");

    let (plant_manager, developer, maker, admin, disposal) =
      (Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4());
    let auth = StaticAuthorizer::new().with(plant_manager, Role::PlantManager)
                                      .with(developer, Role::MoldDeveloper)
                                      .with(maker, Role::Maker)
                                      .with(admin, Role::SystemAdmin)
                                      .with(disposal, Role::DisposalOperator);
    let engine = WorkflowEngine::new(WorkflowConfig { same_state_policy: policy });
    let service = WorkflowService::new(store.clone(), engine, Arc::new(auth), sink.clone());
    Fixture { store,
              sink,
              service,
              hq,
              plant,
              mold_id: mold.id(),
              plant_manager,
              developer,
              maker,
              admin,
              disposal,
              stranger: Uuid::new_v4() }
  }

  pub fn repair(&self) -> NewWorkflow {
    NewWorkflow { mold_id: self.mold_id,
                  details: WorkflowDetails::Repair(RepairDetails { priority: RepairPriority::High,
                                                                   title: "Cavity crack".into(),
                                                                   description: "Crack on cavity 2".into(),
                                                                   checklist_instance_id: None }) }
  }

  pub fn transfer(&self) -> NewWorkflow {
    NewWorkflow { mold_id: self.mold_id,
                  details: WorkflowDetails::Transfer(TransferDetails { from_company_id: self.hq,
                                                                       to_company_id: self.plant,
                                                                       developer_id: self.developer }) }
  }

  pub fn scrapping(&self) -> NewWorkflow {
    NewWorkflow { mold_id: self.mold_id,
                  details: WorkflowDetails::Scrapping(ScrappingDetails { reason: "End of life".into(),
                                                                         current_shots: 15_000,
                                                                         estimated_scrap_value: Some(120.0) }) }
  }
}
