//! Record Store
//!
//! Validated CRUD and filtered listing over persisted records.
//!
//! # Architecture
//!
//! - `Record` - A persisted lifecycle record (managed order / managed position)
//! - `Store` - Per-collection CRUD contract consumed by the managers
//! - `MemoryStore` - In-process store, insertion ordered
//! - `JsonFileStore` - `MemoryStore` persisted to a JSON file after every write
//!
//! Every mutation goes through [`Record::apply`], which is where status
//! transitions are checked. Writers never replace a record wholesale.

mod file;
mod memory;

pub use file::JsonFileStore;
pub use memory::MemoryStore;

use std::fmt::Debug;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::validation::{Validate, ValidationError};

/// Store-assigned record identity.
///
/// Assigned once on insert and never reassigned.
///
/// # Example
///
/// ```
/// use orderkeeper::store::RecordId;
///
/// let id = RecordId::new("5c1f0a");
/// assert_eq!(id.as_str(), "5c1f0a");
/// assert!(!RecordId::default().is_assigned());
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RecordId(String);

impl RecordId {
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Generate a fresh unique id.
    #[must_use]
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().simple().to_string())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// False for the placeholder carried by a record that was never inserted.
    #[must_use]
    pub fn is_assigned(&self) -> bool {
        !self.0.is_empty()
    }
}

impl std::fmt::Display for RecordId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for RecordId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for RecordId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl AsRef<str> for RecordId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Errors returned by store operations.
#[derive(Error, Debug)]
pub enum StoreError {
    /// Record failed schema or transition validation; nothing was written.
    #[error("Validation failed: {0}")]
    Validation(#[from] ValidationError),

    /// No record with this id in the collection
    #[error("Cannot modify non-existent {collection} record with id {id}")]
    NotFound {
        collection: &'static str,
        id: RecordId,
    },

    /// I/O error from a persistent backend
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error from a persistent backend
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Backend is temporarily unable to serve the request
    #[error("Store unavailable: {0}")]
    Unavailable(String),
}

/// A persisted lifecycle record.
pub trait Record:
    Clone + Debug + Send + Sync + Serialize + DeserializeOwned + Validate + 'static
{
    /// Logical collection name (also the file stem for `JsonFileStore`).
    const COLLECTION: &'static str;

    /// Lifecycle status enumeration.
    type Status: Copy + PartialEq + Debug + Send + Sync;

    /// Partial update applied through [`Record::apply`].
    type Patch: Clone + Debug + Send + Sync;

    fn id(&self) -> &RecordId;

    /// Called by the store exactly once, on insert.
    fn assign_id(&mut self, id: RecordId);

    fn status(&self) -> Self::Status;

    fn is_closed(&self) -> bool;

    /// Apply a partial update, rejecting illegal transitions.
    ///
    /// On error the record may be partially modified; stores apply patches
    /// to a copy and only keep it when this returns Ok and the result validates.
    fn apply(&mut self, patch: Self::Patch) -> Result<(), ValidationError>;
}

/// Comparison against a field value.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Match<T> {
    Eq(T),
    Ne(T),
}

impl<T: PartialEq> Match<T> {
    fn matches(&self, value: &T) -> bool {
        match self {
            Match::Eq(expected) => value == expected,
            Match::Ne(excluded) => value != excluded,
        }
    }
}

/// Filter for [`Store::list`].
///
/// An empty filter matches every record.
///
/// ```ignore
/// let pending = Filter::open().status(Match::Eq(OrderStatus::Uninitialized));
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct Filter<S> {
    status: Option<Match<S>>,
    closed: Option<Match<bool>>,
}

impl<S> Default for Filter<S> {
    fn default() -> Self {
        Self {
            status: None,
            closed: None,
        }
    }
}

impl<S: Copy + PartialEq> Filter<S> {
    /// Match every record.
    pub fn all() -> Self {
        Self::default()
    }

    /// Match records with `closed = false`.
    pub fn open() -> Self {
        Self::default().closed(Match::Eq(false))
    }

    #[must_use]
    pub fn status(mut self, m: Match<S>) -> Self {
        self.status = Some(m);
        self
    }

    #[must_use]
    pub fn closed(mut self, m: Match<bool>) -> Self {
        self.closed = Some(m);
        self
    }

    pub fn matches<R: Record<Status = S>>(&self, record: &R) -> bool {
        if let Some(m) = &self.status {
            if !m.matches(&record.status()) {
                return false;
            }
        }
        if let Some(m) = &self.closed {
            if !m.matches(&record.is_closed()) {
                return false;
            }
        }
        true
    }
}

/// Per-collection CRUD contract.
///
/// Implementations validate on insert and update and never persist a record
/// that fails validation.
#[async_trait]
pub trait Store<R: Record>: Send + Sync {
    /// Validate and insert a new record, returning its assigned id.
    async fn insert(&self, record: R) -> Result<RecordId, StoreError>;

    async fn get(&self, id: &RecordId) -> Result<Option<R>, StoreError>;

    /// Apply a patch to an existing record and return the updated record.
    ///
    /// Fails with `NotFound` if the id is absent.
    async fn update(&self, id: &RecordId, patch: R::Patch) -> Result<R, StoreError>;

    /// Fails with `NotFound` if the id is absent.
    async fn delete(&self, id: &RecordId) -> Result<(), StoreError>;

    /// Records matching the filter, in insertion order.
    async fn list(&self, filter: &Filter<R::Status>) -> Result<Vec<R>, StoreError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_id_newtype() {
        let id = RecordId::new("abc-123");
        assert_eq!(id.as_str(), "abc-123");
        assert_eq!(id.to_string(), "abc-123");
        assert!(id.is_assigned());

        let id2: RecordId = "xyz".into();
        assert_eq!(id2.as_str(), "xyz");

        assert_eq!(serde_json::to_string(&id).unwrap(), "\"abc-123\"");
    }

    #[test]
    fn test_generated_ids_are_unique() {
        let a = RecordId::generate();
        let b = RecordId::generate();
        assert_ne!(a, b);
        assert_eq!(a.as_str().len(), 32);
    }

    #[test]
    fn test_match() {
        assert!(Match::Eq(3).matches(&3));
        assert!(!Match::Eq(3).matches(&4));
        assert!(Match::Ne(3).matches(&4));
        assert!(!Match::Ne(3).matches(&3));
    }
}
