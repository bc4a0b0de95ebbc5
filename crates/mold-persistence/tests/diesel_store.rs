#![cfg(not(feature = "pg"))]

use flow::stubs::{RecordingNotificationSink, StaticAuthorizer};
use flow::{FlowError, HistoryAction, InspectionValue, NewWorkflow, RepairDetails, RepairPriority, Role, SideEffect,
           ScrappingDetails, StageDecision, StageStatus, TransferDetails, TransferStatus, WorkflowConfig, WorkflowDetails,
           WorkflowEngine, WorkflowFilter, WorkflowKind, WorkflowService, WorkflowStatus, WorkflowStore};
use mold_domain::{Mold, MoldRepository, MoldStatus, PlantMold};
use mold_persistence::{DbConfig, DieselWorkflowStore};
use std::collections::BTreeMap;
use std::sync::Arc;
use tempfile::TempDir;
use uuid::Uuid;

struct Db {
  _dir: TempDir,
  store: Arc<DieselWorkflowStore>,
  service: WorkflowService<DieselWorkflowStore>,
  hq: Uuid,
  plant: Uuid,
  mold_id: Uuid,
  manager: Uuid,
  developer: Uuid,
  maker: Uuid,
  admin: Uuid,
  disposal: Uuid,
}

fn setup() -> Db {
  let dir = tempfile::tempdir().expect("tempdir");
  let url = dir.path().join("moldflow.db").to_string_lossy().into_owned();
  let store = Arc::new(DieselWorkflowStore::new(&DbConfig::new(url)).expect("store"));

  let (hq, plant) = (Uuid::new_v4(), Uuid::new_v4());
  let mold = Mold::new("M-200", hq, 42_000).expect("mold");
  store.transaction(|tx| {
         tx.insert_mold(&mold)?;
         tx.insert_plant_mirror(&PlantMold::new(mold.id(), hq))?;
         Ok(())
       })
       .expect("seed");

  let (manager, developer, maker) = (Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4());
  let (admin, disposal) = (Uuid::new_v4(), Uuid::new_v4());
  let auth = StaticAuthorizer::new().with(manager, Role::PlantManager)
                                    .with(developer, Role::MoldDeveloper)
                                    .with(maker, Role::Maker)
                                    .with(admin, Role::SystemAdmin)
                                    .with(disposal, Role::DisposalOperator);
  let service = WorkflowService::new(store.clone(),
                                     WorkflowEngine::new(WorkflowConfig::default()),
                                     Arc::new(auth),
                                     Arc::new(RecordingNotificationSink::new()));
  Db { _dir: dir,
       store,
       service,
       hq,
       plant,
       mold_id: mold.id(),
       manager,
       developer,
       maker,
       admin,
       disposal }
}

impl Db {
  fn transfer(&self) -> NewWorkflow {
    NewWorkflow { mold_id: self.mold_id,
                  details: WorkflowDetails::Transfer(TransferDetails { from_company_id: self.hq,
                                                                       to_company_id: self.plant,
                                                                       developer_id: self.developer }) }
  }

  fn repair(&self) -> NewWorkflow {
    NewWorkflow { mold_id: self.mold_id,
                  details: WorkflowDetails::Repair(RepairDetails { priority: RepairPriority::Urgent,
                                                                   title: "Ejector pin broken".into(),
                                                                   description: String::new(),
                                                                   checklist_instance_id: Some(Uuid::new_v4()) }) }
  }

  fn scrapping(&self) -> NewWorkflow {
    NewWorkflow { mold_id: self.mold_id,
                  details: WorkflowDetails::Scrapping(ScrappingDetails { reason: "Cavity worn out".into(),
                                                                         current_shots: 42_000,
                                                                         estimated_scrap_value: None }) }
  }

  fn mold(&self) -> Mold {
    self.store
        .transaction(|tx| Ok(tx.get_mold(&self.mold_id)?))
        .expect("read mold")
        .expect("mold exists")
  }
}

#[test]
fn transfer_lifecycle_persists_stages_history_and_relocation() {
  let db = setup();
  let req = db.service.create_workflow(db.transfer(), db.manager).expect("create");

  let steps = [("plant_approval", db.manager), ("developer_approval", db.developer), ("receiver_approval", db.manager)];
  let mut last = None;
  for (stage, actor) in steps {
    last = Some(db.service
                  .decide_stage(WorkflowKind::Transfer, req.id, stage, StageDecision::Approve, None, actor, None)
                  .expect(stage));
  }
  let out = last.expect("outcome");
  assert!(out.all_completed);
  assert_eq!(out.request.status, WorkflowStatus::Transfer(TransferStatus::Completed));
  match out.side_effect {
    Some(SideEffect::MoldRelocated { to_company_id, mirrors_updated, .. }) => {
      assert_eq!(to_company_id, db.plant);
      assert_eq!(mirrors_updated, 1);
    }
    other => panic!("expected relocation, got: {:?}", other),
  }

  let mold = db.mold();
  assert_eq!(mold.current_location_company_id(), db.plant);
  assert_eq!(mold.status(), MoldStatus::Production);
  let mirrors = db.store.transaction(|tx| Ok(tx.plant_mirrors(&db.mold_id)?)).expect("mirrors");
  assert!(mirrors.iter().all(|m| m.company_id == db.plant));

  let view = db.service.get_workflow(WorkflowKind::Transfer, req.id).expect("view");
  assert!(view.stages.iter().all(|s| s.stage_status == StageStatus::Approved && s.decided_at.is_some()));
  assert_eq!(view.stages.iter().map(|s| s.stage_order).collect::<Vec<_>>(), vec![1, 2, 3]);
  let seqs: Vec<_> = view.history.iter().map(|h| h.sequence).collect();
  assert_eq!(seqs, vec![1, 2, 3, 4]);
  assert_eq!(view.history[0].action_type, HistoryAction::Created);
  assert_eq!(view.history[0].old_status, None);
  assert_eq!(view.history[3].new_status, WorkflowStatus::Transfer(TransferStatus::Completed));
}

#[test]
fn repair_round_trips_details_and_filters_by_status() {
  let db = setup();
  let a = db.service.create_workflow(db.repair(), db.maker).expect("a");
  let b = db.service.create_workflow(db.repair(), db.maker).expect("b");
  db.service.transition_status(WorkflowKind::Repair, b.id, "accepted", db.maker, None).expect("accept");

  let stored = db.service.get_workflow(WorkflowKind::Repair, a.id).expect("view").request;
  assert_eq!(stored.details, a.details);
  assert_eq!(stored.requested_by, db.maker);

  let accepted = db.service
                   .list_workflows(WorkflowKind::Repair,
                                   &WorkflowFilter { status: Some(WorkflowStatus::parse(WorkflowKind::Repair,
                                                                                        "accepted")
                                                                                 .unwrap()),
                                                     ..Default::default() })
                   .expect("list");
  assert_eq!(accepted.iter().map(|r| r.id).collect::<Vec<_>>(), vec![b.id]);

  let by_company = db.service
                     .list_workflows(WorkflowKind::Repair,
                                     &WorkflowFilter { company_id: Some(db.hq), ..Default::default() })
                     .expect("list");
  assert_eq!(by_company.len(), 2);
}

#[test]
fn failed_unit_of_work_leaves_no_rows() {
  let db = setup();
  let ghost = Mold::new("M-GHOST", db.hq, 0).expect("mold");
  let res: Result<(), FlowError> = db.store.transaction(|tx| {
                                             tx.insert_mold(&ghost)?;
                                             Err(FlowError::Storage("forced".into()))
                                           });
  assert!(matches!(res, Err(FlowError::Storage(_))));
  let found = db.store.transaction(|tx| Ok(tx.get_mold(&ghost.id())?)).expect("read");
  assert!(found.is_none());
}

#[test]
fn replayed_command_does_not_append_history() {
  let db = setup();
  let req = db.service.create_workflow(db.repair(), db.maker).expect("create");
  let cmd = Uuid::new_v4();
  let first = db.service
                .transition_status(WorkflowKind::Repair, req.id, "accepted", db.maker, Some(cmd))
                .expect("first");
  assert!(!first.replayed);
  let again = db.service
                .transition_status(WorkflowKind::Repair, req.id, "accepted", db.maker, Some(cmd))
                .expect("again");
  assert!(again.replayed);
  let view = db.service.get_workflow(WorkflowKind::Repair, req.id).expect("view");
  assert_eq!(view.history.len(), 2);
  assert_eq!(view.history[1].command_id, Some(cmd));
}

#[test]
fn checklist_capture_is_replaced_per_stage_key() {
  let db = setup();
  let req = db.service.create_workflow(db.transfer(), db.manager).expect("create");
  let mut categories = BTreeMap::new();
  categories.insert("man".to_string(),
                    BTreeMap::from([("operator_trained".to_string(), InspectionValue::Flag(true))]));
  db.service
    .capture_checklist(WorkflowKind::Transfer, req.id, "4m", categories.clone(), db.manager)
    .expect("first capture");
  categories.insert("machine".to_string(),
                    BTreeMap::from([("press".to_string(), InspectionValue::Text("450t".into()))]));
  db.service
    .capture_checklist(WorkflowKind::Transfer, req.id, "4m", categories.clone(), db.developer)
    .expect("second capture");

  let view = db.service.get_workflow(WorkflowKind::Transfer, req.id).expect("view");
  assert_eq!(view.checklists.len(), 1);
  assert_eq!(view.checklists[0].categories, categories);
  assert_eq!(view.checklists[0].captured_by, db.developer);
}

#[test]
fn concurrent_stage_decisions_serialize_on_the_write_lock() {
  let db = setup();
  let req = db.service.create_workflow(db.transfer(), db.manager).expect("create");
  let handles: Vec<_> = (0..4).map(|_| {
                                let service = db.service.clone();
                                let actor = db.manager;
                                std::thread::spawn(move || {
                                  service.decide_stage(WorkflowKind::Transfer,
                                                       req.id,
                                                       "plant_approval",
                                                       StageDecision::Approve,
                                                       None,
                                                       actor,
                                                       None)
                                })
                              })
                              .collect();
  let results: Vec<_> = handles.into_iter().map(|h| h.join().expect("thread")).collect();
  assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
  assert!(results.iter()
                 .filter_map(|r| r.as_ref().err())
                 .all(|e| matches!(e, FlowError::StateConflict(_))));
  let view = db.service.get_workflow(WorkflowKind::Transfer, req.id).expect("view");
  assert_eq!(view.history.len(), 2);
}

#[test]
fn racing_transfer_and_scrapping_leave_a_consistent_mold() {
  let db = setup();
  let transfer = db.service.create_workflow(db.transfer(), db.manager).expect("create transfer");
  for (stage, actor) in [("plant_approval", db.manager), ("developer_approval", db.developer)] {
    db.service
      .decide_stage(WorkflowKind::Transfer, transfer.id, stage, StageDecision::Approve, None, actor, None)
      .expect(stage);
  }
  let scrap = db.service.create_workflow(db.scrapping(), db.developer).expect("create scrapping");
  db.service
    .transition_status(WorkflowKind::Scrapping, scrap.id, "first_approved", db.developer, None)
    .expect("first approval");
  db.service.transition_status(WorkflowKind::Scrapping, scrap.id, "approved", db.admin, None).expect("second approval");

  let barrier = Arc::new(std::sync::Barrier::new(2));
  let receiver = {
    let (service, barrier, actor) = (db.service.clone(), barrier.clone(), db.manager);
    std::thread::spawn(move || {
      barrier.wait();
      service.decide_stage(WorkflowKind::Transfer, transfer.id, "receiver_approval", StageDecision::Approve, None, actor, None)
    })
  };
  let disposal = {
    let (service, barrier, actor) = (db.service.clone(), barrier.clone(), db.disposal);
    std::thread::spawn(move || {
      barrier.wait();
      service.transition_status(WorkflowKind::Scrapping, scrap.id, "scrapped", actor, None)
    })
  };
  let transfer_result = receiver.join().expect("receiver thread");
  disposal.join().expect("disposal thread").expect("disposal never conflicts");

  let mold = db.mold();
  assert_eq!(mold.status(), MoldStatus::Scrapped);
  let view = db.service.get_workflow(WorkflowKind::Transfer, transfer.id).expect("view");
  match transfer_result {
    // la transferencia ganó: el molde se desechó ya reubicado
    Ok(out) => {
      assert_eq!(out.request.status, WorkflowStatus::Transfer(TransferStatus::Completed));
      assert_eq!(mold.current_location_company_id(), db.plant);
      assert_eq!(view.history.len(), 4);
    }
    // el desecho ganó: la transferencia queda intacta
    Err(FlowError::StateConflict(_)) => {
      assert_eq!(view.request.status, WorkflowStatus::Transfer(TransferStatus::InProgress));
      assert_eq!(view.stages[2].stage_status, StageStatus::Pending);
      assert_eq!(view.history.len(), 3);
      assert_eq!(mold.current_location_company_id(), db.hq);
    }
    Err(other) => panic!("expected completion or conflict, got: {:?}", other),
  }
}

#[test]
fn postgres_url_is_refused_without_the_pg_feature() {
  match DieselWorkflowStore::new(&DbConfig::new("postgres://user@localhost/moldflow")) {
    Err(FlowError::Validation(_)) => {}
    Err(other) => panic!("expected validation error, got: {:?}", other),
    Ok(_) => panic!("expected validation error"),
  }
}
