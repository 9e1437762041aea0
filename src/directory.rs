use async_trait::async_trait;
use dashmap::DashMap;

use crate::model::UserId;

/// Shown when a display name cannot be resolved.
pub const UNKNOWN_USER: &str = "Unknown user";

#[derive(Debug)]
pub enum DirectoryError {
    UnknownUser(UserId),
    Unavailable(String),
}

impl std::fmt::Display for DirectoryError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DirectoryError::UnknownUser(id) => write!(f, "unknown user: {id}"),
            DirectoryError::Unavailable(e) => write!(f, "directory unavailable: {e}"),
        }
    }
}

impl std::error::Error for DirectoryError {}

/// Resolves user ids to display names for presentation.
#[async_trait]
pub trait UserDirectory: Send + Sync {
    async fn resolve_display_name(&self, user_id: UserId) -> Result<String, DirectoryError>;
}

#[derive(Debug, Default)]
pub struct StaticDirectory {
    names: DashMap<UserId, String>,
}

impl StaticDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, user_id: UserId, name: impl Into<String>) {
        self.names.insert(user_id, name.into());
    }
}

#[async_trait]
impl UserDirectory for StaticDirectory {
    async fn resolve_display_name(&self, user_id: UserId) -> Result<String, DirectoryError> {
        self.names
            .get(&user_id)
            .map(|e| e.value().clone())
            .ok_or(DirectoryError::UnknownUser(user_id))
    }
}
