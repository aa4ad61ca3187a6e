use async_trait::async_trait;
use serde_json::Value;
use uuid::Uuid;

use crate::models::user::StoreUser;

#[derive(Debug, thiserror::Error)]
pub enum UserStoreError {
    #[error("identity store request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("identity store responded with status {status}: {message}")]
    Api { status: u16, message: String },
    #[error("identity store returned an invalid response: {0}")]
    InvalidResponse(String),
    #[error("identity store unavailable: {0}")]
    Unavailable(String),
}

/// Identity store holding the entitlement metadata the mobile app reads.
#[async_trait]
pub trait UserStore: Send + Sync {
    async fn list_users(&self) -> Result<Vec<StoreUser>, UserStoreError>;

    /// Exact, case-sensitive email match.
    async fn find_by_email(&self, email: &str) -> Result<Option<StoreUser>, UserStoreError>;

    /// Creates a confirmed identity carrying `metadata`.
    async fn create_user(&self, email: &str, metadata: Value)
        -> Result<StoreUser, UserStoreError>;

    /// Replaces the identity's metadata. Callers merge before calling.
    async fn update_user_metadata(
        &self,
        user_id: Uuid,
        metadata: Value,
    ) -> Result<StoreUser, UserStoreError>;
}

mod mock;
mod supabase;

#[allow(unused_imports)]
pub use mock::MockUserStore;
pub use supabase::SupabaseUserStore;
