use std::collections::HashMap;
use std::path::Path;

use async_trait::async_trait;
use reqwest::Method;
use serde_json::json;
use tokio::sync::RwLock;
use tracing::{debug, info};

use shared_config::AppConfig;
use shared_database::{rest_path, DatabaseError, Prefer, SupabaseClient};
use shared_models::auth::UserRole;

use crate::models::{UserError, UserProfile};

const PROFILES_TABLE: &str = "profiles";

/// Lookup and persistence of user profiles.
#[async_trait]
pub trait UserDirectory: Send + Sync {
    async fn get(&self, username: &str) -> Result<Option<UserProfile>, UserError>;

    async fn upsert(&self, profile: UserProfile) -> Result<UserProfile, UserError>;

    async fn list_by_role(&self, role: UserRole) -> Result<Vec<UserProfile>, UserError>;
}

// ==============================================================================
// IN-MEMORY DIRECTORY
// ==============================================================================

#[derive(Debug, Default)]
pub struct InMemoryUserDirectory {
    profiles: RwLock<HashMap<String, UserProfile>>,
}

impl InMemoryUserDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_profiles(profiles: Vec<UserProfile>) -> Self {
        let map = profiles
            .into_iter()
            .map(|profile| (profile.username.clone(), profile))
            .collect();
        Self {
            profiles: RwLock::new(map),
        }
    }

    /// Loads a JSON array of profiles, used to seed local environments.
    pub fn from_seed_file(path: impl AsRef<Path>) -> Result<Self, UserError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|e| {
            UserError::DatabaseError(format!("Failed to read seed file {}: {}", path.display(), e))
        })?;
        let profiles: Vec<UserProfile> = serde_json::from_str(&raw).map_err(|e| {
            UserError::DatabaseError(format!("Invalid seed file {}: {}", path.display(), e))
        })?;
        info!("Seeded {} user profiles from {}", profiles.len(), path.display());
        Ok(Self::with_profiles(profiles))
    }
}

#[async_trait]
impl UserDirectory for InMemoryUserDirectory {
    async fn get(&self, username: &str) -> Result<Option<UserProfile>, UserError> {
        Ok(self.profiles.read().await.get(username).cloned())
    }

    async fn upsert(&self, profile: UserProfile) -> Result<UserProfile, UserError> {
        let mut profiles = self.profiles.write().await;
        profiles.insert(profile.username.clone(), profile.clone());
        Ok(profile)
    }

    async fn list_by_role(&self, role: UserRole) -> Result<Vec<UserProfile>, UserError> {
        let profiles = self.profiles.read().await;
        let mut matching: Vec<UserProfile> = profiles
            .values()
            .filter(|profile| profile.role == role)
            .cloned()
            .collect();
        matching.sort_by(|a, b| a.username.cmp(&b.username));
        Ok(matching)
    }
}

// ==============================================================================
// SUPABASE DIRECTORY
// ==============================================================================

pub struct SupabaseUserDirectory {
    supabase: SupabaseClient,
}

impl SupabaseUserDirectory {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            supabase: SupabaseClient::new(config),
        }
    }
}

fn map_db_error(error: DatabaseError) -> UserError {
    UserError::DatabaseError(error.to_string())
}

#[async_trait]
impl UserDirectory for SupabaseUserDirectory {
    async fn get(&self, username: &str) -> Result<Option<UserProfile>, UserError> {
        let path = rest_path(PROFILES_TABLE, &[("username", format!("eq.{}", username))]);
        let rows: Vec<UserProfile> = self
            .supabase
            .request(Method::GET, &path, None, None)
            .await
            .map_err(map_db_error)?;
        Ok(rows.into_iter().next())
    }

    async fn upsert(&self, profile: UserProfile) -> Result<UserProfile, UserError> {
        debug!("Upserting profile for {}", profile.username);
        let path = rest_path(PROFILES_TABLE, &[("on_conflict", "username".to_string())]);
        let body = json!(profile);
        let rows: Vec<UserProfile> = self
            .supabase
            .request(Method::POST, &path, Some(body), Some(Prefer::Upsert))
            .await
            .map_err(map_db_error)?;
        rows.into_iter()
            .next()
            .ok_or_else(|| UserError::DatabaseError("Upsert returned no rows".to_string()))
    }

    async fn list_by_role(&self, role: UserRole) -> Result<Vec<UserProfile>, UserError> {
        let path = rest_path(
            PROFILES_TABLE,
            &[("role", format!("eq.{}", role)), ("order", "username.asc".to_string())],
        );
        self.supabase
            .request(Method::GET, &path, None, None)
            .await
            .map_err(map_db_error)
    }
}
