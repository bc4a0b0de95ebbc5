mod support;

use flow::stubs::StaticAuthorizer;
use flow::{Authorizer, FlowError, InspectionValue, NewWorkflow, RepairStatus, Role, StageDecision, TransferDetails,
           WorkflowDetails, WorkflowFilter, WorkflowKind, WorkflowStatus};
use support::Fixture;
use uuid::Uuid;

#[test]
fn roles_gate_each_stage() {
  let fx = Fixture::new();
  let req = fx.service.create_workflow(fx.scrapping(), fx.developer).unwrap();

  // el maker no da la primera aprobación; un actor desconocido se rechaza de entrada
  assert!(matches!(fx.service.decide_stage(WorkflowKind::Scrapping, req.id, "first_approval", StageDecision::Approve, None, fx.maker, None),
                   Err(FlowError::Unauthorized(_))));
  assert!(matches!(fx.service.transition_status(WorkflowKind::Scrapping, req.id, "first_approved", fx.stranger, None),
                   Err(FlowError::Unauthorized(_))));
  assert!(matches!(fx.service.create_workflow(fx.repair(), fx.stranger), Err(FlowError::Unauthorized(_))));

  fx.service.transition_status(WorkflowKind::Scrapping, req.id, "first_approved", fx.developer, None).unwrap();
  // sólo el administrador del sistema da la segunda aprobación
  assert!(matches!(fx.service.transition_status(WorkflowKind::Scrapping, req.id, "approved", fx.developer, None),
                   Err(FlowError::Unauthorized(_))));
  fx.service.transition_status(WorkflowKind::Scrapping, req.id, "approved", fx.admin, None).unwrap();
  assert!(matches!(fx.service.transition_status(WorkflowKind::Scrapping, req.id, "scrapped", fx.plant_manager, None),
                   Err(FlowError::Unauthorized(_))));
}

#[test]
fn system_admin_may_act_on_any_gate() {
  let fx = Fixture::new();
  let req = fx.service.create_workflow(fx.repair(), fx.maker).unwrap();
  let out = fx.service.transition_status(WorkflowKind::Repair, req.id, "accepted", fx.admin, None).unwrap();
  assert_eq!(out.request.status, WorkflowStatus::Repair(RepairStatus::Accepted));
  // el gerente de planta puede rechazar una reparación pero no avanzarla
  assert!(matches!(fx.service.transition_status(WorkflowKind::Repair, req.id, "in_progress", fx.plant_manager, None),
                   Err(FlowError::Unauthorized(_))));
  fx.service
    .transition_status_with_reason(WorkflowKind::Repair, req.id, "rejected", Some("no vale la pena"), fx.plant_manager, None)
    .unwrap();
}

#[test]
fn static_authorizer_parses_role_table() {
  let a = Uuid::new_v4();
  let b = Uuid::new_v4();
  let auth = StaticAuthorizer::parse(&format!("{}=maker, {}=system_admin,", a, b)).expect("parse");
  assert_eq!(auth.len(), 2);
  assert_eq!(auth.actor_role(&a).unwrap(), Some(Role::Maker));
  assert_eq!(auth.actor_role(&b).unwrap(), Some(Role::SystemAdmin));
  assert_eq!(auth.actor_role(&Uuid::new_v4()).unwrap(), None);
  assert!(StaticAuthorizer::parse("not-a-uuid=maker").is_err());
  assert!(StaticAuthorizer::parse(&format!("{}=janitor", a)).is_err());
  assert!(StaticAuthorizer::parse("").unwrap().is_empty());
}

#[test]
fn creation_validates_mold_and_payload() {
  let fx = Fixture::new();
  let mut missing = fx.repair();
  missing.mold_id = Uuid::new_v4();
  assert!(matches!(fx.service.create_workflow(missing, fx.maker), Err(FlowError::NotFound(_))));

  let same_company = NewWorkflow { mold_id: fx.mold_id,
                                   details: WorkflowDetails::Transfer(TransferDetails { from_company_id: fx.hq,
                                                                                        to_company_id: fx.hq,
                                                                                        developer_id: fx.developer }) };
  assert!(matches!(fx.service.create_workflow(same_company, fx.plant_manager), Err(FlowError::Validation(_))));

  let wrong_origin = NewWorkflow { mold_id: fx.mold_id,
                                   details: WorkflowDetails::Transfer(TransferDetails { from_company_id: fx.plant,
                                                                                        to_company_id: fx.hq,
                                                                                        developer_id: fx.developer }) };
  assert!(matches!(fx.service.create_workflow(wrong_origin, fx.plant_manager), Err(FlowError::StateConflict(_))));

  let mut blank = fx.repair();
  if let WorkflowDetails::Repair(r) = &mut blank.details {
    r.title = "  ".into();
  }
  assert!(matches!(fx.service.create_workflow(blank, fx.maker), Err(FlowError::Validation(_))));
  assert!(fx.service.list_workflows(WorkflowKind::Repair, &WorkflowFilter::default()).unwrap().is_empty());
}

#[test]
fn listing_filters_by_status_company_and_mold() {
  let fx = Fixture::new();
  let transfer = fx.service.create_workflow(fx.transfer(), fx.plant_manager).unwrap();
  let r1 = fx.service.create_workflow(fx.repair(), fx.maker).unwrap();
  let r2 = fx.service.create_workflow(fx.repair(), fx.maker).unwrap();
  fx.service.transition_status(WorkflowKind::Repair, r2.id, "accepted", fx.maker, None).unwrap();

  let all = fx.service.list_workflows(WorkflowKind::Repair, &WorkflowFilter::default()).unwrap();
  assert_eq!(all.len(), 2);
  assert!(all.iter().any(|r| r.id == r1.id));
  let accepted = WorkflowFilter { status: Some(WorkflowStatus::Repair(RepairStatus::Accepted)), ..Default::default() };
  let ids: Vec<_> = fx.service.list_workflows(WorkflowKind::Repair, &accepted).unwrap().into_iter().map(|r| r.id).collect();
  assert_eq!(ids, vec![r2.id]);

  let at_hq = WorkflowFilter { company_id: Some(fx.hq), ..Default::default() };
  assert_eq!(fx.service.list_workflows(WorkflowKind::Repair, &at_hq).unwrap().len(), 2);
  let at_plant = WorkflowFilter { company_id: Some(fx.plant), ..Default::default() };
  assert!(fx.service.list_workflows(WorkflowKind::Repair, &at_plant).unwrap().is_empty());
  // las transferencias coinciden por cualquiera de sus extremos
  let transfers = fx.service.list_workflows(WorkflowKind::Transfer, &at_plant).unwrap();
  assert_eq!(transfers.iter().map(|r| r.id).collect::<Vec<_>>(), vec![transfer.id]);

  let other_mold = WorkflowFilter { mold_id: Some(Uuid::new_v4()), ..Default::default() };
  assert!(fx.service.list_workflows(WorkflowKind::Repair, &other_mold).unwrap().is_empty());
}

#[test]
fn checklists_are_stored_per_stage_key() {
  let fx = Fixture::new();
  let req = fx.service.create_workflow(fx.transfer(), fx.plant_manager).unwrap();

  let mut four_m = flow::ChecklistCategories::new();
  four_m.entry("man".into()).or_default().insert("operator_trained".into(), InspectionValue::Flag(true));
  four_m.entry("method".into()).or_default().insert("notes".into(), InspectionValue::Text("SOP v3".into()));
  let capture = fx.service
                  .capture_checklist(WorkflowKind::Transfer, req.id, "4m", four_m.clone(), fx.plant_manager)
                  .expect("capture 4m");
  assert_eq!(capture.captured_by, fx.plant_manager);

  let mut bad = flow::ChecklistCategories::new();
  bad.entry("money".into()).or_default().insert("budget".into(), InspectionValue::Flag(false));
  assert!(matches!(fx.service.capture_checklist(WorkflowKind::Transfer, req.id, "4m", bad, fx.plant_manager),
                   Err(FlowError::Validation(_))));
  assert!(matches!(fx.service.capture_checklist(WorkflowKind::Transfer, req.id, "condition", four_m.clone(), fx.plant_manager),
                   Err(FlowError::Validation(_))));

  let view = fx.service.get_workflow(WorkflowKind::Transfer, req.id).unwrap();
  assert_eq!(view.checklists.len(), 1);
  assert_eq!(view.checklists[0].categories, four_m);
  // los checklists son sólo evidencia: no generan historial
  assert_eq!(view.history.len(), 1);
}
