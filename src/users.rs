use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use std::sync::RwLock;

use crate::errors::{LedgerError, Result};
use crate::model::User;
use crate::store::StoreError;
use crate::types::UserId;

/// lookup capability provided by the user-management collaborator
pub trait UserDirectory: Send + Sync {
    fn get_user(&self, id: UserId) -> std::result::Result<Option<User>, StoreError>;
}

/// in-memory user directory for tests and demos
#[derive(Debug, Default)]
pub struct MemoryUserDirectory {
    users: RwLock<BTreeMap<UserId, User>>,
}

impl MemoryUserDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// register a user with a unique email
    pub fn register(&self, email: &str, name: &str, created_at: DateTime<Utc>) -> Result<User> {
        if email.trim().is_empty() || name.trim().is_empty() {
            return Err(LedgerError::Validation {
                message: "name and email are required".to_string(),
            });
        }

        let mut users = self.users.write().map_err(|_| StoreError::Backend {
            message: "user directory lock poisoned".to_string(),
        })?;
        if users.values().any(|u| u.email.eq_ignore_ascii_case(email)) {
            return Err(LedgerError::Validation {
                message: format!("email {} is already registered", email),
            });
        }

        let id = users.keys().next_back().map_or(1, |last| last + 1);
        let user = User {
            id,
            email: email.to_string(),
            name: name.to_string(),
            created_at,
        };
        users.insert(id, user.clone());
        Ok(user)
    }
}

impl UserDirectory for MemoryUserDirectory {
    fn get_user(&self, id: UserId) -> std::result::Result<Option<User>, StoreError> {
        let users = self.users.read().map_err(|_| StoreError::Backend {
            message: "user directory lock poisoned".to_string(),
        })?;
        Ok(users.get(&id).cloned())
    }
}
