pub mod admin_auth;
pub mod plan_mapping;
pub mod retry;
