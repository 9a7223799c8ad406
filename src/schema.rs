// agentboard schema - project board tables for Diesel ORM
//
// Kept in sync by hand with the SQL in `db::MIGRATIONS`.

diesel::table! {
    _migrations (id) {
        id -> Integer,
        name -> Text,
        applied_at -> Text,
    }
}

diesel::table! {
    projects (id) {
        id -> Integer,
        name -> Text,
        description -> Nullable<Text>,
        created_at -> Text,
    }
}

diesel::table! {
    milestones (id) {
        id -> Integer,
        project_id -> Integer,
        name -> Text,
        status -> Text,
        priority -> Integer,
        owner -> Nullable<Text>,
        description -> Nullable<Text>,
        start_date -> Nullable<Text>,
        end_date -> Nullable<Text>,
        created_at -> Text,
    }
}

diesel::table! {
    milestone_dependencies (milestone_id, depends_on_milestone_id) {
        milestone_id -> Integer,
        depends_on_milestone_id -> Integer,
    }
}

diesel::table! {
    tasks (id) {
        id -> Integer,
        milestone_id -> Integer,
        title -> Text,
        status -> Text,
        assignee -> Nullable<Text>,
        created_at -> Text,
        completed_at -> Nullable<Text>,
    }
}

diesel::table! {
    dialogue_entries (id) {
        id -> Integer,
        milestone_id -> Integer,
        author -> Text,
        entry_type -> Text,
        content -> Text,
        created_at -> Text,
    }
}

diesel::joinable!(milestones -> projects (project_id));
diesel::joinable!(tasks -> milestones (milestone_id));
diesel::joinable!(dialogue_entries -> milestones (milestone_id));

diesel::allow_tables_to_appear_in_same_query!(
    projects,
    milestones,
    milestone_dependencies,
    tasks,
    dialogue_entries,
);
