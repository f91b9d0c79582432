//! User account records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::store::{Record, RecordId};
use crate::validation::{self, Validate, ValidationError};

/// Stored account details.
///
/// The password arrives already hashed; nothing here derives or checks it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserDetails {
    /// Store-assigned id
    #[serde(default)]
    pub id: RecordId,
    pub username: String,
    pub email: String,
    pub password_hash: String,
    #[serde(default = "Utc::now")]
    pub created_timestamp: DateTime<Utc>,
}

impl UserDetails {
    #[must_use]
    pub fn new(
        username: impl Into<String>,
        email: impl Into<String>,
        password_hash: impl Into<String>,
    ) -> Self {
        Self {
            id: RecordId::default(),
            username: username.into(),
            email: email.into(),
            password_hash: password_hash.into(),
            created_timestamp: Utc::now(),
        }
    }
}

impl Validate for UserDetails {
    fn validate(&self) -> Result<(), ValidationError> {
        validation::non_empty("username", &self.username)?;
        validation::non_empty("email", &self.email)?;
        validation::non_empty("passwordHash", &self.password_hash)?;
        match self.email.split_once('@') {
            Some((local, domain)) if !local.is_empty() && !domain.is_empty() => Ok(()),
            _ => Err(ValidationError::new(format!(
                "email '{}' is not an address",
                self.email
            ))),
        }
    }
}

/// Partial update to `UserDetails`. The username is fixed at creation.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct UserPatch {
    pub email: Option<String>,
    pub password_hash: Option<String>,
}

impl Record for UserDetails {
    const COLLECTION: &'static str = "users";
    /// Users have no lifecycle
    type Status = ();
    type Patch = UserPatch;

    fn id(&self) -> &RecordId {
        &self.id
    }

    fn assign_id(&mut self, id: RecordId) {
        self.id = id;
    }

    fn status(&self) {}

    fn is_closed(&self) -> bool {
        false
    }

    fn apply(&mut self, patch: UserPatch) -> Result<(), ValidationError> {
        if let Some(email) = patch.email {
            self.email = email;
        }
        if let Some(password_hash) = patch.password_hash {
            self.password_hash = password_hash;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validation() {
        assert!(UserDetails::new("user1", "test@email.com", "h").validate().is_ok());
        assert!(UserDetails::new(" ", "test@email.com", "h").validate().is_err());
        assert!(UserDetails::new("user1", "test.email.com", "h").validate().is_err());
        assert!(UserDetails::new("user1", "@email.com", "h").validate().is_err());
        assert!(UserDetails::new("user1", "test@email.com", "").validate().is_err());
    }

    #[test]
    fn test_parse_without_id_or_timestamp() {
        let user: UserDetails = serde_json::from_str(
            r#"{"username": "user1", "email": "test@email.com", "passwordHash": "notreallyahash"}"#,
        )
        .unwrap();
        assert!(!user.id.is_assigned());
        assert_eq!(user.password_hash, "notreallyahash");
        assert!(user.validate().is_ok());
    }

    #[test]
    fn test_patch_keeps_username() {
        let mut user = UserDetails::new("user1", "old@email.com", "h1");
        user.apply(UserPatch {
            email: Some("new@email.com".to_string()),
            ..Default::default()
        })
        .unwrap();
        assert_eq!(user.username, "user1");
        assert_eq!(user.email, "new@email.com");
        assert_eq!(user.password_hash, "h1");
    }
}
