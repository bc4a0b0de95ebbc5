// Esquema Diesel compartido por SQLite y Postgres.
// Ids como texto (UUID), marcas de tiempo en milisegundos epoch.
use diesel::allow_tables_to_appear_in_same_query;

diesel::table! {
    molds (id) {
        id -> Text,
        mold_code -> Text,
        status -> Text,
        current_location_company_id -> Text,
        current_shots -> BigInt,
        updated_at_ts -> BigInt,
    }
}

diesel::table! {
    plant_molds (id) {
        id -> Text,
        mold_id -> Text,
        company_id -> Text,
        updated_at_ts -> BigInt,
    }
}

diesel::table! {
    transfer_requests (id) {
        id -> Text,
        mold_id -> Text,
        status -> Text,
        requested_by -> Text,
        from_company_id -> Text,
        to_company_id -> Text,
        developer_id -> Text,
        created_at_ts -> BigInt,
        updated_at_ts -> BigInt,
    }
}

diesel::table! {
    repair_requests (id) {
        id -> Text,
        mold_id -> Text,
        status -> Text,
        requested_by -> Text,
        priority -> Text,
        title -> Text,
        description -> Text,
        checklist_instance_id -> Nullable<Text>,
        created_at_ts -> BigInt,
        updated_at_ts -> BigInt,
    }
}

diesel::table! {
    scrapping_requests (id) {
        id -> Text,
        mold_id -> Text,
        status -> Text,
        requested_by -> Text,
        reason -> Text,
        current_shots -> BigInt,
        estimated_scrap_value -> Nullable<Double>,
        created_at_ts -> BigInt,
        updated_at_ts -> BigInt,
    }
}

diesel::table! {
    approval_stages (workflow_kind, workflow_id, stage_order) {
        workflow_kind -> Text,
        workflow_id -> Text,
        stage_order -> Integer,
        stage_name -> Text,
        stage_status -> Text,
        approver_id -> Nullable<Text>,
        decided_at_ts -> Nullable<BigInt>,
        comments -> Nullable<Text>,
    }
}

diesel::table! {
    workflow_history (id) {
        id -> Text,
        workflow_kind -> Text,
        workflow_id -> Text,
        sequence -> BigInt,
        action_type -> Text,
        old_status -> Nullable<Text>,
        new_status -> Text,
        actor_id -> Text,
        occurred_at_ts -> BigInt,
        metadata -> Text,
        command_id -> Nullable<Text>,
    }
}

diesel::table! {
    checklist_captures (workflow_kind, workflow_id, stage_key) {
        workflow_kind -> Text,
        workflow_id -> Text,
        stage_key -> Text,
        categories -> Text,
        captured_by -> Text,
        captured_at_ts -> BigInt,
    }
}

allow_tables_to_appear_in_same_query!(molds,
                                      plant_molds,
                                      transfer_requests,
                                      repair_requests,
                                      scrapping_requests,
                                      approval_stages,
                                      workflow_history,
                                      checklist_captures);
