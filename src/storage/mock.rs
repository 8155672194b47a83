//! In-memory implementation of [`DocumentRepository`]
//!
//! Useful for testing without database dependencies, and for `--in-memory`
//! runs of the server.

use std::collections::HashMap;
use std::sync::RwLock;

use chrono::{DateTime, Utc};

use super::repository::{
    DocumentRepository, DocumentWrite, RawDocument, StorageError, StorageResult,
};

#[derive(Debug, Clone)]
struct StoredDocument {
    seq: u64,
    unique_key: Option<String>,
    group_key: Option<String>,
    body: String,
}

#[derive(Debug, Clone, Default)]
struct Collections {
    next_seq: u64,
    docs: HashMap<&'static str, HashMap<String, StoredDocument>>,
}

impl Collections {
    fn unique_taken(&self, doc: &RawDocument) -> bool {
        let Some(key) = doc.unique_key.as_deref() else {
            return false;
        };
        self.docs.get(doc.collection).is_some_and(|c| {
            c.iter()
                .any(|(id, d)| id != &doc.id && d.unique_key.as_deref() == Some(key))
        })
    }

    fn insert(&mut self, doc: RawDocument) -> StorageResult<()> {
        let exists = self
            .docs
            .get(doc.collection)
            .is_some_and(|c| c.contains_key(&doc.id));
        if exists || self.unique_taken(&doc) {
            let key = doc.unique_key.clone().unwrap_or_else(|| doc.id.clone());
            return Err(StorageError::conflict(doc.collection, key));
        }

        self.next_seq += 1;
        let stored = StoredDocument {
            seq: self.next_seq,
            unique_key: doc.unique_key,
            group_key: doc.group_key,
            body: doc.body,
        };
        self.docs
            .entry(doc.collection)
            .or_default()
            .insert(doc.id, stored);
        Ok(())
    }

    fn update(&mut self, doc: RawDocument) -> StorageResult<()> {
        if self.unique_taken(&doc) {
            let key = doc.unique_key.clone().unwrap_or_default();
            return Err(StorageError::conflict(doc.collection, key));
        }

        let stored = self
            .docs
            .get_mut(doc.collection)
            .and_then(|c| c.get_mut(&doc.id))
            .ok_or_else(|| StorageError::not_found(doc.collection, &doc.id))?;

        stored.unique_key = doc.unique_key;
        stored.group_key = doc.group_key;
        stored.body = doc.body;
        Ok(())
    }

    fn delete(&mut self, collection: &str, id: &str) -> bool {
        self.docs
            .get_mut(collection)
            .is_some_and(|c| c.remove(id).is_some())
    }

    fn ordered(&self, collection: &str, pred: impl Fn(&StoredDocument) -> bool) -> Vec<String> {
        let mut found: Vec<&StoredDocument> = self
            .docs
            .get(collection)
            .map(|c| c.values().filter(|d| pred(d)).collect())
            .unwrap_or_default();
        found.sort_by_key(|d| d.seq);
        found.into_iter().map(|d| d.body.clone()).collect()
    }
}

/// In-memory mock document repository
#[derive(Default)]
pub struct MockDocumentRepository {
    collections: RwLock<Collections>,
    leases: RwLock<HashMap<String, (String, DateTime<Utc>)>>,
}

impl MockDocumentRepository {
    /// Create a new mock repository
    pub fn new() -> Self {
        Self::default()
    }

    /// Total number of stored documents across collections
    pub fn len(&self) -> usize {
        self.collections
            .read()
            .map(|c| c.docs.values().map(HashMap::len).sum())
            .unwrap_or(0)
    }

    /// Check if empty
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn poisoned<E: std::fmt::Display>(e: E) -> StorageError {
    StorageError::LockPoisoned(e.to_string())
}

impl DocumentRepository for MockDocumentRepository {
    fn insert(&self, doc: RawDocument) -> StorageResult<()> {
        self.collections.write().map_err(poisoned)?.insert(doc)
    }

    fn update(&self, doc: RawDocument) -> StorageResult<()> {
        self.collections.write().map_err(poisoned)?.update(doc)
    }

    fn get(&self, collection: &'static str, id: &str) -> StorageResult<Option<String>> {
        let collections = self.collections.read().map_err(poisoned)?;
        Ok(collections
            .docs
            .get(collection)
            .and_then(|c| c.get(id))
            .map(|d| d.body.clone()))
    }

    fn find_unique(&self, collection: &'static str, key: &str) -> StorageResult<Option<String>> {
        let collections = self.collections.read().map_err(poisoned)?;
        Ok(collections
            .ordered(collection, |d| d.unique_key.as_deref() == Some(key))
            .into_iter()
            .next())
    }

    fn find_group(&self, collection: &'static str, key: &str) -> StorageResult<Vec<String>> {
        let collections = self.collections.read().map_err(poisoned)?;
        Ok(collections.ordered(collection, |d| d.group_key.as_deref() == Some(key)))
    }

    fn list(&self, collection: &'static str) -> StorageResult<Vec<String>> {
        let collections = self.collections.read().map_err(poisoned)?;
        Ok(collections.ordered(collection, |_| true))
    }

    fn delete(&self, collection: &'static str, id: &str) -> StorageResult<bool> {
        Ok(self
            .collections
            .write()
            .map_err(poisoned)?
            .delete(collection, id))
    }

    fn apply(&self, writes: Vec<DocumentWrite>) -> StorageResult<()> {
        let mut collections = self.collections.write().map_err(poisoned)?;

        // Stage on a copy so a failing write leaves nothing behind
        let mut staged = collections.clone();
        for write in writes {
            match write {
                DocumentWrite::Update(doc) => staged.update(doc)?,
                DocumentWrite::Delete { collection, id } => {
                    staged.delete(collection, &id);
                }
            }
        }

        *collections = staged;
        Ok(())
    }

    fn try_acquire_lease(
        &self,
        name: &str,
        holder: &str,
        expires_at: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> StorageResult<bool> {
        let mut leases = self.leases.write().map_err(poisoned)?;
        let granted = match leases.get(name) {
            Some((current, until)) => current == holder || *until <= now,
            None => true,
        };
        if granted {
            leases.insert(name.to_string(), (holder.to_string(), expires_at));
        }
        Ok(granted)
    }

    fn release_lease(&self, name: &str, holder: &str) -> StorageResult<bool> {
        let mut leases = self.leases.write().map_err(poisoned)?;
        match leases.get(name) {
            Some((current, _)) if current == holder => {
                leases.remove(name);
                Ok(true)
            }
            _ => Ok(false),
        }
    }
}
