//! User manager: create and read user details.

use std::sync::Arc;

use tracing::info;

use super::types::UserDetails;
use crate::error::ManagerError;
use crate::store::{Filter, RecordId, Store};
use crate::validation::ValidationError;

/// Owns the `users` collection. No reconciliation loop.
pub struct UserManager {
    store: Arc<dyn Store<UserDetails>>,
}

impl UserManager {
    pub fn new(store: Arc<dyn Store<UserDetails>>) -> Self {
        Self { store }
    }

    /// Validate and persist a new user.
    ///
    /// Fails with `Validation` for malformed details or an already taken
    /// username; nothing is persisted in either case.
    pub async fn create_user(&self, details: UserDetails) -> Result<RecordId, ManagerError> {
        let existing = self.store.list(&Filter::all()).await?;
        if existing.iter().any(|u| u.username == details.username) {
            return Err(ValidationError::new(format!(
                "username '{}' is taken",
                details.username
            ))
            .into());
        }

        let username = details.username.clone();
        let id = self.store.insert(details).await?;
        info!(user_id = %id, username = %username, "User created");
        Ok(id)
    }

    pub async fn list_user_details(&self) -> Result<Vec<UserDetails>, ManagerError> {
        Ok(self.store.list(&Filter::all()).await?)
    }

    pub async fn get_user_details(&self, id: &RecordId) -> Result<Option<UserDetails>, ManagerError> {
        Ok(self.store.get(id).await?)
    }
}
