use async_trait::async_trait;
use serde_json::Value;
use std::sync::Mutex;
use uuid::Uuid;

use super::{UserStore, UserStoreError};
use crate::models::user::StoreUser;

/// In-memory identity store recording every write.
#[derive(Default)]
pub struct MockUserStore {
    pub users: Mutex<Vec<StoreUser>>,
    pub created: Mutex<Vec<(String, Value)>>,
    pub updates: Mutex<Vec<(Uuid, Value)>>,
    pub lookups: Mutex<usize>,
    /// Number of upcoming calls (any operation) that fail before succeeding.
    pub fail_next: Mutex<usize>,
    pub always_fail: bool,
}

impl MockUserStore {
    pub fn with_user(self, email: &str, metadata: Value) -> Self {
        self.users.lock().unwrap().push(StoreUser {
            id: Uuid::new_v4(),
            email: Some(email.to_string()),
            user_metadata: metadata,
            email_confirmed_at: Some("2024-01-01T00:00:00Z".into()),
            created_at: Some("2024-01-01T00:00:00Z".into()),
        });
        self
    }

    pub fn failing_times(self, times: usize) -> Self {
        *self.fail_next.lock().unwrap() = times;
        self
    }

    pub fn user(&self, email: &str) -> Option<StoreUser> {
        self.users
            .lock()
            .unwrap()
            .iter()
            .find(|u| u.has_email(email))
            .cloned()
    }

    fn check_failure(&self) -> Result<(), UserStoreError> {
        if self.always_fail {
            return Err(UserStoreError::Unavailable("mock store down".into()));
        }
        let mut remaining = self.fail_next.lock().unwrap();
        if *remaining > 0 {
            *remaining -= 1;
            return Err(UserStoreError::Unavailable("mock transient failure".into()));
        }
        Ok(())
    }
}

#[async_trait]
impl UserStore for MockUserStore {
    async fn list_users(&self) -> Result<Vec<StoreUser>, UserStoreError> {
        self.check_failure()?;
        Ok(self.users.lock().unwrap().clone())
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<StoreUser>, UserStoreError> {
        self.check_failure()?;
        *self.lookups.lock().unwrap() += 1;
        Ok(self.user(email))
    }

    async fn create_user(
        &self,
        email: &str,
        metadata: Value,
    ) -> Result<StoreUser, UserStoreError> {
        self.check_failure()?;
        self.created
            .lock()
            .unwrap()
            .push((email.to_string(), metadata.clone()));
        let user = StoreUser {
            id: Uuid::new_v4(),
            email: Some(email.to_string()),
            user_metadata: metadata,
            email_confirmed_at: Some("2024-01-01T00:00:00Z".into()),
            created_at: Some("2024-01-01T00:00:00Z".into()),
        };
        self.users.lock().unwrap().push(user.clone());
        Ok(user)
    }

    async fn update_user_metadata(
        &self,
        user_id: Uuid,
        metadata: Value,
    ) -> Result<StoreUser, UserStoreError> {
        self.check_failure()?;
        self.updates
            .lock()
            .unwrap()
            .push((user_id, metadata.clone()));
        let mut users = self.users.lock().unwrap();
        let user = users
            .iter_mut()
            .find(|u| u.id == user_id)
            .ok_or_else(|| UserStoreError::Api {
                status: 404,
                message: "User not found".into(),
            })?;
        user.user_metadata = metadata;
        Ok(user.clone())
    }
}
