// Diesel schema for the workflow engine's durable tables.
use diesel::allow_tables_to_appear_in_same_query;

diesel::table! {
    workflows (id) {
        id -> Text,
        user_name -> Text,
        module -> Text,
        module_class -> Text,
        script_path -> Text,
        script_fingerprint -> Nullable<Text>,
        status -> Text,
        ctime_ts -> BigInt,
        report -> Text,
        parent_step_id -> Nullable<Text>,
    }
}

diesel::table! {
    steps (id) {
        id -> Text,
        workflow_id -> Text,
        name -> Text,
        user_name -> Text,
        status -> Text,
        next_call -> Text,
    }
}

diesel::table! {
    step_calculations (id) {
        id -> Text,
        step_id -> Text,
        calc_id -> Text,
        seq -> BigInt,
    }
}

diesel::table! {
    step_sub_workflows (id) {
        id -> Text,
        step_id -> Text,
        workflow_id -> Text,
        seq -> BigInt,
    }
}

diesel::table! {
    workflow_bags (id) {
        id -> Text,
        workflow_id -> Text,
        kind -> Text,
        bag_key -> Text,
        bag_value -> Text,
    }
}

allow_tables_to_appear_in_same_query!(workflows, steps, step_calculations, step_sub_workflows, workflow_bags);
