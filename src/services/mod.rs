pub mod entitlements;
pub mod stripe;
pub mod user_store;
