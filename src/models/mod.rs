pub mod audit;
pub mod entitlement;
pub mod plan;
pub mod user;
