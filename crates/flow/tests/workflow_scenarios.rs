mod support;

use flow::{FlowError, HistoryAction, RepairStatus, SameStatePolicy, ScrappingStatus, SideEffect, StageDecision,
           StageStatus, TransferStatus, WorkflowKind, WorkflowStatus};
use mold_domain::MoldStatus;
use support::Fixture;

#[test]
fn repair_happy_path() {
  let fx = Fixture::new();
  let req = fx.service.create_workflow(fx.repair(), fx.plant_manager).expect("create repair");
  assert_eq!(req.status, WorkflowStatus::Repair(RepairStatus::Requested));

  for (target, expected) in [("accepted", RepairStatus::Accepted),
                             ("in_progress", RepairStatus::InProgress),
                             ("done", RepairStatus::Done)]
  {
    let out = fx.service
                .transition_status(WorkflowKind::Repair, req.id, target, fx.maker, None)
                .expect(target);
    assert_eq!(out.request.status, WorkflowStatus::Repair(expected));
    assert!(out.side_effect.is_none());
  }

  let view = fx.service.get_workflow(WorkflowKind::Repair, req.id).expect("view");
  assert_eq!(view.request.status, WorkflowStatus::Repair(RepairStatus::Done));
  assert!(view.stages.is_empty());
  let actions: Vec<_> = view.history.iter().map(|h| h.action_type).collect();
  assert_eq!(actions,
             vec![HistoryAction::Created, HistoryAction::Approval, HistoryAction::StatusChange, HistoryAction::Completion]);
  let seqs: Vec<_> = view.history.iter().map(|h| h.sequence).collect();
  assert_eq!(seqs, vec![1, 2, 3, 4]);
  assert!(view.history.iter().skip(1).all(|h| h.old_status != Some(h.new_status)));
  // la reparación nunca modifica el molde
  assert_eq!(fx.store.mold(&fx.mold_id).unwrap().unwrap().status(), MoldStatus::Production);
  assert_eq!(fx.sink.events().len(), 4);
}

#[test]
fn repair_illegal_jump_keeps_status() {
  let fx = Fixture::new();
  let req = fx.service.create_workflow(fx.repair(), fx.maker).unwrap();
  match fx.service.transition_status(WorkflowKind::Repair, req.id, "done", fx.maker, None) {
    Err(FlowError::StateConflict(_)) => {}
    other => panic!("expected conflict, got: {:?}", other),
  }
  let view = fx.service.get_workflow(WorkflowKind::Repair, req.id).unwrap();
  assert_eq!(view.request.status, WorkflowStatus::Repair(RepairStatus::Requested));
  assert_eq!(view.history.len(), 1);

  // estados desconocidos o de otro tipo son errores de validación
  assert!(matches!(fx.service.transition_status(WorkflowKind::Repair, req.id, "melted", fx.maker, None),
                   Err(FlowError::Validation(_))));
  assert!(matches!(fx.service.transition_status(WorkflowKind::Repair, req.id, "first_approved", fx.maker, None),
                   Err(FlowError::Validation(_))));
}

#[test]
fn transfer_out_of_order_then_in_order_relocates_mold() {
  let fx = Fixture::new();
  let req = fx.service.create_workflow(fx.transfer(), fx.plant_manager).unwrap();
  let view = fx.service.get_workflow(WorkflowKind::Transfer, req.id).unwrap();
  assert_eq!(view.stages.len(), 3);
  assert!(view.stages.iter().all(|s| s.stage_status == StageStatus::Pending));

  match fx.service.decide_stage(WorkflowKind::Transfer,
                                req.id,
                                "developer_approval",
                                StageDecision::Approve,
                                None,
                                fx.developer,
                                None)
  {
    Err(FlowError::StateConflict(_)) => {}
    other => panic!("expected sequencing conflict, got: {:?}", other),
  }
  let view = fx.service.get_workflow(WorkflowKind::Transfer, req.id).unwrap();
  assert_eq!(view.stages[1].stage_status, StageStatus::Pending);

  let steps = [("plant_approval", fx.plant_manager), ("developer_approval", fx.developer), ("receiver_approval", fx.plant_manager)];
  let mut last = None;
  for (stage, actor) in steps {
    let out = fx.service
                .decide_stage(WorkflowKind::Transfer, req.id, stage, StageDecision::Approve, Some("ok".into()), actor, None)
                .expect(stage);
    last = Some(out);
  }
  let out = last.unwrap();
  assert!(out.all_completed);
  assert_eq!(out.request.status, WorkflowStatus::Transfer(TransferStatus::Completed));
  match out.side_effect {
    Some(SideEffect::MoldRelocated { to_company_id, mirrors_updated, .. }) => {
      assert_eq!(to_company_id, fx.plant);
      assert_eq!(mirrors_updated, 1);
    }
    other => panic!("expected relocation, got: {:?}", other),
  }

  let mold = fx.store.mold(&fx.mold_id).unwrap().unwrap();
  assert_eq!(mold.current_location_company_id(), fx.plant);
  assert!(fx.store.plant_mirrors(&fx.mold_id).unwrap().iter().all(|m| m.company_id == fx.plant));

  let history = fx.service.get_workflow(WorkflowKind::Transfer, req.id).unwrap().history;
  assert_eq!(history.len(), 4);
  assert_eq!(history[1].new_status, WorkflowStatus::Transfer(TransferStatus::InProgress));
  assert_eq!(history[3].action_type, HistoryAction::Completion);
}

#[test]
fn scrapping_requires_first_approval_before_second() {
  let fx = Fixture::new();
  let req = fx.service.create_workflow(fx.scrapping(), fx.developer).unwrap();

  match fx.service.transition_status(WorkflowKind::Scrapping, req.id, "approved", fx.admin, None) {
    Err(FlowError::StateConflict(_)) => {}
    other => panic!("expected conflict on second approval, got: {:?}", other),
  }
  match fx.service.decide_stage(WorkflowKind::Scrapping, req.id, "second_approval", StageDecision::Approve, None, fx.admin, None) {
    Err(FlowError::StateConflict(_)) => {}
    other => panic!("expected conflict on second stage, got: {:?}", other),
  }

  let out = fx.service
              .transition_status(WorkflowKind::Scrapping, req.id, "first_approved", fx.developer, None)
              .unwrap();
  assert_eq!(out.request.status, WorkflowStatus::Scrapping(ScrappingStatus::FirstApproved));
  let out = fx.service.transition_status(WorkflowKind::Scrapping, req.id, "approved", fx.admin, None).unwrap();
  assert_eq!(out.request.status, WorkflowStatus::Scrapping(ScrappingStatus::Approved));
  assert!(out.side_effect.is_none());
  assert_eq!(fx.store.mold(&fx.mold_id).unwrap().unwrap().status(), MoldStatus::Production);

  let out = fx.service.transition_status(WorkflowKind::Scrapping, req.id, "scrapped", fx.disposal, None).unwrap();
  assert_eq!(out.request.status, WorkflowStatus::Scrapping(ScrappingStatus::Scrapped));
  assert_eq!(out.side_effect, Some(SideEffect::MoldScrapped { mold_id: fx.mold_id }));
  assert_eq!(fx.store.mold(&fx.mold_id).unwrap().unwrap().status(), MoldStatus::Scrapped);

  let history = fx.service.get_workflow(WorkflowKind::Scrapping, req.id).unwrap().history;
  let actions: Vec<_> = history.iter().map(|h| h.action_type).collect();
  assert_eq!(actions,
             vec![HistoryAction::Created, HistoryAction::Approval, HistoryAction::Approval, HistoryAction::Completion]);

  // un molde desechado no admite workflows nuevos
  assert!(matches!(fx.service.create_workflow(fx.repair(), fx.maker), Err(FlowError::StateConflict(_))));
}

#[test]
fn terminal_workflows_are_immutable() {
  let fx = Fixture::new();
  let req = fx.service.create_workflow(fx.repair(), fx.maker).unwrap();
  fx.service.reject(WorkflowKind::Repair, req.id, "not repairable", fx.maker, None).unwrap();

  for target in ["accepted", "rejected", "requested"] {
    assert!(matches!(fx.service.transition_status(WorkflowKind::Repair, req.id, target, fx.maker, None),
                     Err(FlowError::StateConflict(_))),
            "target {}",
            target);
  }
  assert!(matches!(fx.service.reject(WorkflowKind::Repair, req.id, "again", fx.maker, None),
                   Err(FlowError::StateConflict(_))));
  let mut cats = flow::ChecklistCategories::new();
  cats.entry("core".into()).or_default().insert("wear".into(), flow::InspectionValue::Flag(true));
  assert!(matches!(fx.service.capture_checklist(WorkflowKind::Repair, req.id, "repair", cats, fx.maker),
                   Err(FlowError::StateConflict(_))));
  assert_eq!(fx.service.get_workflow(WorkflowKind::Repair, req.id).unwrap().history.len(), 2);
}

#[test]
fn same_state_policy_controls_noop() {
  let fx = Fixture::new();
  let req = fx.service.create_workflow(fx.repair(), fx.maker).unwrap();
  fx.service.transition_status(WorkflowKind::Repair, req.id, "accepted", fx.maker, None).unwrap();
  let out = fx.service.transition_status(WorkflowKind::Repair, req.id, "accepted", fx.maker, None).unwrap();
  assert!(out.noop);
  assert_eq!(out.request.status, WorkflowStatus::Repair(RepairStatus::Accepted));
  assert_eq!(fx.service.get_workflow(WorkflowKind::Repair, req.id).unwrap().history.len(), 2);

  let strict = Fixture::with_policy(SameStatePolicy::Reject);
  let req = strict.service.create_workflow(strict.repair(), strict.maker).unwrap();
  assert!(matches!(strict.service.transition_status(WorkflowKind::Repair, req.id, "requested", strict.maker, None),
                   Err(FlowError::Validation(_))));
}

#[test]
fn reject_is_an_escape_hatch_for_staged_workflows() {
  let fx = Fixture::new();
  let req = fx.service.create_workflow(fx.transfer(), fx.plant_manager).unwrap();
  fx.service
    .decide_stage(WorkflowKind::Transfer, req.id, "plant_approval", StageDecision::Approve, None, fx.plant_manager, None)
    .unwrap();

  assert!(matches!(fx.service.reject(WorkflowKind::Transfer, req.id, "  ", fx.developer, None),
                   Err(FlowError::Validation(_))));
  let out = fx.service.reject(WorkflowKind::Transfer, req.id, "mold needed at HQ", fx.developer, None).unwrap();
  assert_eq!(out.request.status, WorkflowStatus::Transfer(TransferStatus::Rejected));
  let stage = out.stage.expect("pending stage was rejected");
  assert_eq!(stage.stage_name, "developer_approval");
  assert_eq!(stage.stage_status, StageStatus::Rejected);
  assert_eq!(stage.comments.as_deref(), Some("mold needed at HQ"));
  assert_eq!(fx.store.mold(&fx.mold_id).unwrap().unwrap().current_location_company_id(), fx.hq);

  // el desecho aún se puede rechazar tras ambas aprobaciones
  let req = fx.service.create_workflow(fx.scrapping(), fx.developer).unwrap();
  fx.service.transition_status(WorkflowKind::Scrapping, req.id, "first_approved", fx.developer, None).unwrap();
  fx.service.transition_status(WorkflowKind::Scrapping, req.id, "approved", fx.admin, None).unwrap();
  let out = fx.service.reject(WorkflowKind::Scrapping, req.id, "buyer found", fx.disposal, None).unwrap();
  assert_eq!(out.request.status, WorkflowStatus::Scrapping(ScrappingStatus::Rejected));
  assert!(out.stage.is_none());
  assert_eq!(fx.store.mold(&fx.mold_id).unwrap().unwrap().status(), MoldStatus::Production);
}

#[test]
fn stage_reject_requires_reason_and_rejects_workflow() {
  let fx = Fixture::new();
  let req = fx.service.create_workflow(fx.transfer(), fx.plant_manager).unwrap();
  assert!(matches!(fx.service.decide_stage(WorkflowKind::Transfer,
                                           req.id,
                                           "plant_approval",
                                           StageDecision::Reject,
                                           None,
                                           fx.plant_manager,
                                           None),
                   Err(FlowError::Validation(_))));
  let out = fx.service
              .decide_stage(WorkflowKind::Transfer,
                            req.id,
                            "plant_approval",
                            StageDecision::Reject,
                            Some("line still running".into()),
                            fx.plant_manager,
                            None)
              .unwrap();
  assert_eq!(out.request.status, WorkflowStatus::Transfer(TransferStatus::Rejected));
  assert!(!out.all_completed);
  let history = fx.service.get_workflow(WorkflowKind::Transfer, req.id).unwrap().history;
  assert_eq!(history.last().unwrap().action_type, HistoryAction::Rejection);
}

#[test]
fn status_route_rejection_requires_reason() {
  let fx = Fixture::new();
  let req = fx.service.create_workflow(fx.transfer(), fx.plant_manager).unwrap();

  for reason in [None, Some(""), Some("   ")] {
    match fx.service.transition_status_with_reason(WorkflowKind::Transfer, req.id, "rejected", reason, fx.plant_manager, None) {
      Err(FlowError::Validation(_)) => {}
      other => panic!("expected validation error for {:?}, got: {:?}", reason, other),
    }
  }
  let view = fx.service.get_workflow(WorkflowKind::Transfer, req.id).unwrap();
  assert_eq!(view.request.status, WorkflowStatus::Transfer(TransferStatus::Requested));
  assert_eq!(view.stages[0].stage_status, StageStatus::Pending);
  assert_eq!(view.history.len(), 1);
  assert_eq!(fx.sink.events().len(), 1);

  let out = fx.service
              .transition_status_with_reason(WorkflowKind::Transfer,
                                             req.id,
                                             "rejected",
                                             Some("  molde reservado  "),
                                             fx.plant_manager,
                                             None)
              .unwrap();
  assert_eq!(out.request.status, WorkflowStatus::Transfer(TransferStatus::Rejected));
  let stage = out.stage.expect("pending stage was rejected");
  assert_eq!(stage.stage_name, "plant_approval");
  assert_eq!(stage.comments.as_deref(), Some("molde reservado"));
  let last = fx.service.get_workflow(WorkflowKind::Transfer, req.id).unwrap().history.pop().unwrap();
  assert_eq!(last.action_type, HistoryAction::Rejection);
  assert_eq!(last.metadata["reason"], "molde reservado");

  // la reparación también exige motivo por la ruta de estado
  let repair = fx.service.create_workflow(fx.repair(), fx.maker).unwrap();
  assert!(matches!(fx.service.transition_status(WorkflowKind::Repair, repair.id, "rejected", fx.maker, None),
                   Err(FlowError::Validation(_))));
  let out = fx.service
              .transition_status_with_reason(WorkflowKind::Repair, repair.id, "rejected", Some("pieza obsoleta"), fx.maker, None)
              .unwrap();
  assert_eq!(out.request.status, WorkflowStatus::Repair(RepairStatus::Rejected));
  let last = fx.service.get_workflow(WorkflowKind::Repair, repair.id).unwrap().history.pop().unwrap();
  assert_eq!(last.metadata["reason"], "pieza obsoleta");
}

#[test]
fn approved_scrapping_can_be_rejected_through_status_route() {
  let fx = Fixture::new();
  let req = fx.service.create_workflow(fx.scrapping(), fx.developer).unwrap();
  fx.service.transition_status(WorkflowKind::Scrapping, req.id, "first_approved", fx.developer, None).unwrap();
  fx.service.transition_status(WorkflowKind::Scrapping, req.id, "approved", fx.admin, None).unwrap();

  let out = fx.service
              .transition_status_with_reason(WorkflowKind::Scrapping,
                                             req.id,
                                             "rejected",
                                             Some("comprador encontrado"),
                                             fx.disposal,
                                             None)
              .unwrap();
  assert_eq!(out.request.status, WorkflowStatus::Scrapping(ScrappingStatus::Rejected));
  assert!(out.stage.is_none());
  assert_eq!(fx.store.mold(&fx.mold_id).unwrap().unwrap().status(), MoldStatus::Production);
  let history = fx.service.get_workflow(WorkflowKind::Scrapping, req.id).unwrap().history;
  assert_eq!(history.len(), 4);
  assert_eq!(history[3].old_status, Some(WorkflowStatus::Scrapping(ScrappingStatus::Approved)));
  assert_eq!(history[3].metadata["reason"], "comprador encontrado");
}
