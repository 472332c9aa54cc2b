//! Backend user lookup
//!
//! The backend exposes a PostgREST-style `user_profiles` table:
//! `GET {base}/rest/v1/user_profiles?username=eq.<name>&select=*`, keyed by
//! an anon API key sent both as `apikey` and as a bearer token.

use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::account::LocalStore;
use crate::error::DirectoryError;
use crate::types::{UserProfile, GUEST_USER_ID};

/// Source of user profiles
#[async_trait]
pub trait UserDirectory: Send + Sync {
    async fn find_by_username(&self, username: &str) -> Result<UserProfile, DirectoryError>;
}

/// HTTP directory client
#[derive(Clone)]
pub struct RestUserDirectory {
    http_client: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl RestUserDirectory {
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>, timeout: Duration) -> Result<Self, DirectoryError> {
        let http_client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self::with_http_client(base_url, api_key, http_client))
    }

    pub fn with_http_client(
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        http_client: reqwest::Client,
    ) -> Self {
        Self {
            http_client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
        }
    }

    fn profiles_url(&self) -> String {
        format!("{}/rest/v1/user_profiles", self.base_url)
    }

    /// Pick the profile out of a response body
    ///
    /// The endpoint answers with an array of rows (first one wins) or, behind
    /// some proxies, a single object.
    pub fn parse_profile_payload(username: &str, payload: &Value) -> Result<UserProfile, DirectoryError> {
        let row = match payload {
            Value::Array(rows) => rows
                .first()
                .ok_or_else(|| DirectoryError::NotFound(username.to_string()))?,
            Value::Object(_) => payload,
            other => {
                return Err(DirectoryError::Body(format!(
                    "expected array or object, got {}",
                    other
                )))
            }
        };
        serde_json::from_value(row.clone()).map_err(|e| DirectoryError::Body(e.to_string()))
    }
}

impl std::fmt::Debug for RestUserDirectory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RestUserDirectory")
            .field("base_url", &self.base_url)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl UserDirectory for RestUserDirectory {
    async fn find_by_username(&self, username: &str) -> Result<UserProfile, DirectoryError> {
        debug!(username, "looking up user profile");
        let filter = format!("eq.{}", username);
        let resp = self
            .http_client
            .get(self.profiles_url())
            .query(&[("username", filter.as_str()), ("select", "*")])
            .header("apikey", &self.api_key)
            .bearer_auth(&self.api_key)
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            return Err(DirectoryError::Status(status.as_u16()));
        }

        let payload: Value = resp.json().await?;
        Self::parse_profile_payload(username, &payload)
    }
}

/// In-memory directory for offline play
#[derive(Debug, Clone, Default)]
pub struct StaticUserDirectory {
    profiles: HashMap<String, UserProfile>,
}

impl StaticUserDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_profile(mut self, username: impl Into<String>, profile: UserProfile) -> Self {
        self.profiles.insert(username.into(), profile);
        self
    }
}

#[async_trait]
impl UserDirectory for StaticUserDirectory {
    async fn find_by_username(&self, username: &str) -> Result<UserProfile, DirectoryError> {
        self.profiles
            .get(username)
            .cloned()
            .ok_or_else(|| DirectoryError::NotFound(username.to_string()))
    }
}

/// Id to tag games with
///
/// Empty or `guest` reuses the last saved id. A named user is looked up and
/// remembered. Lookup failures fall back to the guest id.
pub async fn resolve_user_id(directory: &dyn UserDirectory, store: Option<&LocalStore>, username: &str) -> String {
    let username = username.trim();
    if username.is_empty() || username.eq_ignore_ascii_case(GUEST_USER_ID) {
        let saved = store.and_then(|s| match s.load_last_user_id() {
            Ok(id) => id,
            Err(e) => {
                warn!("could not read saved user id: {}", e);
                None
            }
        });
        return saved.unwrap_or_else(|| GUEST_USER_ID.to_string());
    }

    match directory.find_by_username(username).await {
        Ok(profile) => {
            let id = if profile.id.is_empty() { profile.user_id } else { profile.id };
            if id.is_empty() {
                warn!(username, "profile has no id, playing as guest");
                return GUEST_USER_ID.to_string();
            }
            info!(username, user_id = %id, "user resolved");
            if let Some(store) = store {
                if let Err(e) = store.save_user_id(&id) {
                    warn!("could not save user id: {}", e);
                }
            }
            id
        }
        Err(e) => {
            warn!(username, "user lookup failed, playing as guest: {}", e);
            GUEST_USER_ID.to_string()
        }
    }
}
