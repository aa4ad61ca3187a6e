use async_trait::async_trait;
use reqwest::{Client, Method, RequestBuilder};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use uuid::Uuid;

use super::{UserStore, UserStoreError};
use crate::config::SupabaseSettings;
use crate::models::user::StoreUser;

const ADMIN_USERS_PATH: &str = "/auth/v1/admin/users";
const DEFAULT_PAGE_SIZE: usize = 1000;
// Upper bound on listing pages so a misbehaving API cannot loop forever.
const MAX_PAGES: usize = 500;

#[derive(Debug, Deserialize)]
struct ListUsersResponse {
    #[serde(default)]
    users: Vec<StoreUser>,
}

#[derive(Debug, Deserialize)]
struct AuthErrorBody {
    msg: Option<String>,
    message: Option<String>,
    error_description: Option<String>,
}

/// Supabase Auth admin API adapter, authenticated with the service-role key.
///
/// The admin API offers no lookup by email, so `find_by_email` walks the
/// paginated user listing and stops at the first exact match.
pub struct SupabaseUserStore {
    client: Client,
    base_url: String,
    service_role_key: String,
    page_size: usize,
}

impl SupabaseUserStore {
    pub fn new(
        client: Client,
        base_url: impl Into<String>,
        service_role_key: impl Into<String>,
    ) -> Self {
        Self {
            client,
            base_url: base_url.into(),
            service_role_key: service_role_key.into(),
            page_size: DEFAULT_PAGE_SIZE,
        }
    }

    pub fn from_settings(client: Client, settings: &SupabaseSettings) -> Self {
        Self::new(client, settings.url.clone(), settings.service_role_key.clone())
    }

    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    fn build_request(&self, method: Method, path: &str) -> RequestBuilder {
        let url = format!(
            "{}/{}",
            self.base_url.trim_end_matches('/'),
            path.trim_start_matches('/')
        );
        self.client
            .request(method, url)
            .header("apikey", &self.service_role_key)
            .bearer_auth(&self.service_role_key)
            .header(reqwest::header::ACCEPT, "application/json")
    }

    async fn list_page(&self, page: usize) -> Result<Vec<StoreUser>, UserStoreError> {
        let request = self
            .build_request(Method::GET, ADMIN_USERS_PATH)
            .query(&[("page", page), ("per_page", self.page_size)]);
        let body: ListUsersResponse = send_request(request).await?;
        Ok(body.users)
    }

    /// Walks pages until `visit` returns true or a short page ends the listing.
    async fn scan<F>(&self, mut visit: F) -> Result<(), UserStoreError>
    where
        F: FnMut(Vec<StoreUser>) -> bool,
    {
        for page in 1..=MAX_PAGES {
            let users = self.list_page(page).await?;
            let last_page = users.len() < self.page_size;
            if visit(users) || last_page {
                return Ok(());
            }
        }
        tracing::warn!(max_pages = MAX_PAGES, "user listing truncated at page limit");
        Ok(())
    }
}

async fn send_request<T: DeserializeOwned>(request: RequestBuilder) -> Result<T, UserStoreError> {
    let response = request.send().await?;
    let status = response.status();
    let body = response.text().await.unwrap_or_default();

    if !status.is_success() {
        let message = serde_json::from_str::<AuthErrorBody>(&body)
            .ok()
            .and_then(|err| err.msg.or(err.message).or(err.error_description))
            .map(|msg| msg.trim().to_string())
            .filter(|msg| !msg.is_empty())
            .or_else(|| {
                let trimmed = body.trim();
                (!trimmed.is_empty()).then(|| trimmed.to_string())
            })
            .unwrap_or_else(|| "identity store request failed".to_string());
        return Err(UserStoreError::Api {
            status: status.as_u16(),
            message,
        });
    }

    serde_json::from_str::<T>(&body).map_err(|err| UserStoreError::InvalidResponse(err.to_string()))
}

#[async_trait]
impl UserStore for SupabaseUserStore {
    async fn list_users(&self) -> Result<Vec<StoreUser>, UserStoreError> {
        let mut all = Vec::new();
        self.scan(|users| {
            all.extend(users);
            false
        })
        .await?;
        Ok(all)
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<StoreUser>, UserStoreError> {
        let mut found = None;
        self.scan(|users| {
            found = users.into_iter().find(|u| u.has_email(email));
            found.is_some()
        })
        .await?;
        Ok(found)
    }

    async fn create_user(
        &self,
        email: &str,
        metadata: Value,
    ) -> Result<StoreUser, UserStoreError> {
        let request = self
            .build_request(Method::POST, ADMIN_USERS_PATH)
            .json(&json!({
                "email": email,
                "email_confirm": true,
                "user_metadata": metadata,
            }));
        send_request(request).await
    }

    async fn update_user_metadata(
        &self,
        user_id: Uuid,
        metadata: Value,
    ) -> Result<StoreUser, UserStoreError> {
        let path = format!("{}/{}", ADMIN_USERS_PATH, user_id);
        let request = self
            .build_request(Method::PUT, &path)
            .json(&json!({ "user_metadata": metadata }));
        send_request(request).await
    }
}
