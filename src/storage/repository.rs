//! Repository Pattern for Document Storage
//!
//! Business logic talks to a [`Store`](super::Store), which serializes typed
//! documents and hands them to a [`DocumentRepository`] backend:
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │        Services (progress, enrollment, sync, catalog)       │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                 Store (typed documents)                     │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │             DocumentRepository (raw JSON bodies)            │
//! └─────────────────────────────────────────────────────────────┘
//!                   │                          │
//!                   ▼                          ▼
//!         ┌─────────────────┐        ┌─────────────────┐
//!         │     SQLite      │        │      Mock       │
//!         └─────────────────┘        └─────────────────┘
//! ```
//!
//! Every document lives in a collection and is addressed by id. A document
//! may also carry a unique key (enforced by the backend) and a group key
//! (indexed, not unique) used for lookups such as "progress of a course".

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fmt;
use thiserror::Error;

// ============================================================================
// Errors
// ============================================================================

/// Errors surfaced by storage backends
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum StorageError {
    #[error("{collection} '{id}' not found")]
    NotFound { collection: &'static str, id: String },

    #[error("{collection} with key '{key}' already exists")]
    Conflict { collection: &'static str, key: String },

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("storage lock poisoned: {0}")]
    LockPoisoned(String),
}

impl StorageError {
    pub fn not_found(collection: &'static str, id: impl fmt::Display) -> Self {
        Self::NotFound {
            collection,
            id: id.to_string(),
        }
    }

    pub fn conflict(collection: &'static str, key: impl Into<String>) -> Self {
        Self::Conflict {
            collection,
            key: key.into(),
        }
    }

    /// Check if this is a not-found error
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    /// Check if this is a duplicate-key error
    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::Conflict { .. })
    }
}

/// Result type for storage operations
pub type StorageResult<T> = std::result::Result<T, StorageError>;

// ============================================================================
// Documents
// ============================================================================

/// A typed record kept in a collection
pub trait Document: Serialize + DeserializeOwned + Send + Sync {
    /// Collection (table) name
    const COLLECTION: &'static str;

    /// Identifier type
    type Id: fmt::Display;

    /// Identifier of this document
    fn id(&self) -> Self::Id;

    /// Natural key that must be unique within the collection
    fn unique_key(&self) -> Option<String> {
        None
    }

    /// Secondary, non-unique lookup key
    fn group_key(&self) -> Option<String> {
        None
    }
}

/// A serialized document as handed to a backend
#[derive(Debug, Clone)]
pub struct RawDocument {
    pub collection: &'static str,
    pub id: String,
    pub unique_key: Option<String>,
    pub group_key: Option<String>,
    pub body: String,
}

impl RawDocument {
    /// Serialize a typed document
    pub fn from_document<D: Document>(doc: &D) -> StorageResult<Self> {
        Ok(Self {
            collection: D::COLLECTION,
            id: doc.id().to_string(),
            unique_key: doc.unique_key(),
            group_key: doc.group_key(),
            body: serde_json::to_string(doc)?,
        })
    }
}

/// One write inside a multi-document transaction
#[derive(Debug, Clone)]
pub enum DocumentWrite {
    /// Replace an existing document; fails with `NotFound` if it is missing
    Update(RawDocument),
    /// Delete a document if present
    Delete { collection: &'static str, id: String },
}

impl DocumentWrite {
    pub fn update<D: Document>(doc: &D) -> StorageResult<Self> {
        Ok(Self::Update(RawDocument::from_document(doc)?))
    }

    pub fn delete<D: Document>(id: impl fmt::Display) -> Self {
        Self::Delete {
            collection: D::COLLECTION,
            id: id.to_string(),
        }
    }
}

// ============================================================================
// Repository Trait
// ============================================================================

/// Backend contract for document storage.
///
/// Each single-document call succeeds or fails atomically. [`apply`] runs a
/// list of writes as one transaction: either all are visible afterwards or
/// none are.
///
/// [`apply`]: DocumentRepository::apply
pub trait DocumentRepository: Send + Sync {
    /// Insert a new document. Fails with `Conflict` on a duplicate id or unique key.
    fn insert(&self, doc: RawDocument) -> StorageResult<()>;

    /// Replace an existing document. Fails with `NotFound` if missing.
    fn update(&self, doc: RawDocument) -> StorageResult<()>;

    /// Fetch a document body by id
    fn get(&self, collection: &'static str, id: &str) -> StorageResult<Option<String>>;

    /// Fetch a document body by unique key
    fn find_unique(&self, collection: &'static str, key: &str) -> StorageResult<Option<String>>;

    /// Fetch all document bodies sharing a group key, in insertion order
    fn find_group(&self, collection: &'static str, key: &str) -> StorageResult<Vec<String>>;

    /// Fetch every document body of a collection, in insertion order
    fn list(&self, collection: &'static str) -> StorageResult<Vec<String>>;

    /// Delete a document; returns true if it existed
    fn delete(&self, collection: &'static str, id: &str) -> StorageResult<bool>;

    /// Apply several writes atomically
    fn apply(&self, writes: Vec<DocumentWrite>) -> StorageResult<()>;

    /// Try to take a named lease until `expires_at`.
    ///
    /// Granted when no lease exists, the current one expired, or `holder`
    /// already holds it (renewal).
    fn try_acquire_lease(
        &self,
        name: &str,
        holder: &str,
        expires_at: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> StorageResult<bool>;

    /// Release a lease held by `holder`; returns true if it was released
    fn release_lease(&self, name: &str, holder: &str) -> StorageResult<bool>;
}
