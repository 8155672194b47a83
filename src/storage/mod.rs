//! Persistent document store
//!
//! [`Store`] is the typed entry point used by every service. It wraps a
//! [`DocumentRepository`] backend (SQLite or in-memory) and knows the natural
//! keys of each record kind:
//!
//! | Kind     | Unique key            | Group key |
//! |----------|-----------------------|-----------|
//! | User     | email (lowercase)     | phone (digits only) |
//! | Course   | code                  |           |
//! | Batch    |                       | course id |
//! | Progress | `student:course`      | course id |

pub mod mock;
pub mod repository;
pub mod sqlite;

use std::fmt::Display;
use std::path::Path;
use std::sync::Arc;

use chrono::{Duration, Utc};

use crate::models::{
    normalize_email, Batch, BatchId, Course, CourseId, Progress, ProgressId, User, UserId,
};
use crate::utils::normalize_phone;

pub use mock::MockDocumentRepository;
pub use repository::{
    Document, DocumentRepository, DocumentWrite, RawDocument, StorageError, StorageResult,
};
pub use sqlite::SqliteDocumentRepository;

// ============================================================================
// Document Impls
// ============================================================================

impl Document for User {
    const COLLECTION: &'static str = "users";
    type Id = UserId;

    fn id(&self) -> UserId {
        self.id
    }

    fn unique_key(&self) -> Option<String> {
        Some(normalize_email(&self.email))
    }

    fn group_key(&self) -> Option<String> {
        self.phone
            .as_deref()
            .map(normalize_phone)
            .filter(|p| !p.is_empty())
    }
}

impl Document for Course {
    const COLLECTION: &'static str = "courses";
    type Id = CourseId;

    fn id(&self) -> CourseId {
        self.id
    }

    fn unique_key(&self) -> Option<String> {
        Some(self.code.clone())
    }
}

impl Document for Batch {
    const COLLECTION: &'static str = "batches";
    type Id = BatchId;

    fn id(&self) -> BatchId {
        self.id
    }

    fn group_key(&self) -> Option<String> {
        Some(self.course.to_string())
    }
}

impl Document for Progress {
    const COLLECTION: &'static str = "progress";
    type Id = ProgressId;

    fn id(&self) -> ProgressId {
        self.id
    }

    fn unique_key(&self) -> Option<String> {
        Some(progress_key(self.student, self.course))
    }

    fn group_key(&self) -> Option<String> {
        Some(self.course.to_string())
    }
}

fn progress_key(student: UserId, course: CourseId) -> String {
    format!("{student}:{course}")
}

// ============================================================================
// Store
// ============================================================================

/// Typed access to the document repository
#[derive(Clone)]
pub struct Store {
    repo: Arc<dyn DocumentRepository>,
}

impl std::fmt::Debug for Store {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Store").finish_non_exhaustive()
    }
}

impl Store {
    /// Wrap an existing backend
    pub fn new(repo: Arc<dyn DocumentRepository>) -> Self {
        Self { repo }
    }

    /// Open a SQLite database file
    pub fn sqlite(path: impl AsRef<Path>) -> StorageResult<Self> {
        Ok(Self::new(Arc::new(SqliteDocumentRepository::new(path)?)))
    }

    /// In-memory SQLite database
    pub fn sqlite_in_memory() -> StorageResult<Self> {
        Ok(Self::new(Arc::new(SqliteDocumentRepository::in_memory()?)))
    }

    /// Mock backend without any database
    pub fn in_memory() -> Self {
        Self::new(Arc::new(MockDocumentRepository::new()))
    }

    fn decode<D: Document>(body: &str) -> StorageResult<D> {
        Ok(serde_json::from_str(body)?)
    }

    // ------------------------------------------------------------------------
    // Generic operations
    // ------------------------------------------------------------------------

    pub fn insert<D: Document>(&self, doc: &D) -> StorageResult<()> {
        self.repo.insert(RawDocument::from_document(doc)?)
    }

    pub fn update<D: Document>(&self, doc: &D) -> StorageResult<()> {
        self.repo.update(RawDocument::from_document(doc)?)
    }

    pub fn get<D: Document>(&self, id: impl Display) -> StorageResult<Option<D>> {
        self.repo
            .get(D::COLLECTION, &id.to_string())?
            .map(|body| Self::decode(&body))
            .transpose()
    }

    /// Like [`get`](Self::get) but a missing document is `NotFound`
    pub fn require<D: Document>(&self, id: impl Display) -> StorageResult<D> {
        let id = id.to_string();
        self.get(&id)?
            .ok_or_else(|| StorageError::not_found(D::COLLECTION, id))
    }

    pub fn find_unique<D: Document>(&self, key: &str) -> StorageResult<Option<D>> {
        self.repo
            .find_unique(D::COLLECTION, key)?
            .map(|body| Self::decode(&body))
            .transpose()
    }

    pub fn find_group<D: Document>(&self, key: &str) -> StorageResult<Vec<D>> {
        self.repo
            .find_group(D::COLLECTION, key)?
            .iter()
            .map(|body| Self::decode(body))
            .collect()
    }

    pub fn list<D: Document>(&self) -> StorageResult<Vec<D>> {
        self.repo
            .list(D::COLLECTION)?
            .iter()
            .map(|body| Self::decode(body))
            .collect()
    }

    pub fn delete<D: Document>(&self, id: impl Display) -> StorageResult<bool> {
        self.repo.delete(D::COLLECTION, &id.to_string())
    }

    /// Run several writes as one transaction
    pub fn apply(&self, writes: Vec<DocumentWrite>) -> StorageResult<()> {
        if writes.is_empty() {
            return Ok(());
        }
        self.repo.apply(writes)
    }

    // ------------------------------------------------------------------------
    // Natural-key lookups
    // ------------------------------------------------------------------------

    pub fn user_by_email(&self, email: &str) -> StorageResult<Option<User>> {
        self.find_unique(&normalize_email(email))
    }

    pub fn user_by_phone(&self, phone: &str) -> StorageResult<Option<User>> {
        let phone = normalize_phone(phone);
        if phone.is_empty() {
            return Ok(None);
        }
        Ok(self.find_group::<User>(&phone)?.into_iter().next())
    }

    pub fn course_by_code(&self, code: &str) -> StorageResult<Option<Course>> {
        self.find_unique(code)
    }

    pub fn progress_for(&self, student: UserId, course: CourseId) -> StorageResult<Option<Progress>> {
        self.find_unique(&progress_key(student, course))
    }

    pub fn progress_for_course(&self, course: CourseId) -> StorageResult<Vec<Progress>> {
        self.find_group(&course.to_string())
    }

    pub fn batches_for_course(&self, course: CourseId) -> StorageResult<Vec<Batch>> {
        self.find_group(&course.to_string())
    }

    // ------------------------------------------------------------------------
    // Leases
    // ------------------------------------------------------------------------

    /// Try to take the named lease for `ttl`
    pub fn try_acquire_lease(&self, name: &str, holder: &str, ttl: Duration) -> StorageResult<bool> {
        let now = Utc::now();
        self.repo.try_acquire_lease(name, holder, now + ttl, now)
    }

    pub fn release_lease(&self, name: &str, holder: &str) -> StorageResult<bool> {
        self.repo.release_lease(name, holder)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Role;

    fn create_test_stores() -> Vec<(&'static str, Store)> {
        vec![
            ("sqlite", Store::sqlite_in_memory().unwrap()),
            ("mock", Store::in_memory()),
        ]
    }

    #[test]
    fn test_insert_and_get() {
        for (name, store) in create_test_stores() {
            let user = User::new("Ada", "Ada@Example.com", Role::Student);
            store.insert(&user).unwrap();

            let loaded: User = store.require(user.id).unwrap();
            assert_eq!(loaded, user, "[{name}]");

            let by_email = store.user_by_email("ADA@example.com").unwrap();
            assert_eq!(by_email.map(|u| u.id), Some(user.id), "[{name}]");
        }
    }

    #[test]
    fn test_missing_document() {
        for (name, store) in create_test_stores() {
            assert!(store.get::<Course>(CourseId::new()).unwrap().is_none(), "[{name}]");

            let err = store.require::<Course>(CourseId::new()).unwrap_err();
            assert!(err.is_not_found(), "[{name}]");

            let err = store.update(&Course::new("X1", "Missing")).unwrap_err();
            assert!(err.is_not_found(), "[{name}]");
        }
    }

    #[test]
    fn test_duplicate_unique_key() {
        for (name, store) in create_test_stores() {
            store.insert(&Course::new("CS101", "Intro")).unwrap();
            let err = store.insert(&Course::new("CS101", "Copy")).unwrap_err();
            assert!(err.is_conflict(), "[{name}]");

            store
                .insert(&User::new("A", "same@example.com", Role::Student))
                .unwrap();
            let err = store
                .insert(&User::new("B", "SAME@example.com", Role::Instructor))
                .unwrap_err();
            assert!(err.is_conflict(), "[{name}]");

            let student = UserId::new();
            let course = CourseId::new();
            store.insert(&Progress::new(student, course)).unwrap();
            let err = store.insert(&Progress::new(student, course)).unwrap_err();
            assert!(err.is_conflict(), "[{name}]");
        }
    }

    #[test]
    fn test_group_lookups_preserve_insertion_order() {
        for (name, store) in create_test_stores() {
            let course = Course::new("CS101", "Intro");
            store.insert(&course).unwrap();

            let a = Progress::new(UserId::new(), course.id);
            let b = Progress::new(UserId::new(), course.id);
            let other = Progress::new(UserId::new(), CourseId::new());
            store.insert(&a).unwrap();
            store.insert(&b).unwrap();
            store.insert(&other).unwrap();

            let found = store.progress_for_course(course.id).unwrap();
            let ids: Vec<_> = found.iter().map(|p| p.id).collect();
            assert_eq!(ids, vec![a.id, b.id], "[{name}]");

            let one = store.progress_for(b.student, course.id).unwrap();
            assert_eq!(one.map(|p| p.id), Some(b.id), "[{name}]");
        }
    }

    #[test]
    fn test_user_by_phone() {
        for (name, store) in create_test_stores() {
            let user = User::new("Lee", "lee@example.com", Role::Student).with_phone("010-1234");
            store.insert(&user).unwrap();

            let found = store.user_by_phone("0101234").unwrap();
            assert_eq!(found.map(|u| u.id), Some(user.id), "[{name}]");
            assert!(store.user_by_phone("").unwrap().is_none(), "[{name}]");
        }
    }

    #[test]
    fn test_apply_is_atomic() {
        for (name, store) in create_test_stores() {
            let mut course = Course::new("CS101", "Intro");
            store.insert(&course).unwrap();

            course.title = "Renamed".to_string();
            let ghost = User::new("Ghost", "ghost@example.com", Role::Student);

            let result = store.apply(vec![
                DocumentWrite::update(&course).unwrap(),
                DocumentWrite::update(&ghost).unwrap(),
            ]);
            assert!(result.unwrap_err().is_not_found(), "[{name}]");

            let stored: Course = store.require(course.id).unwrap();
            assert_eq!(stored.title, "Intro", "[{name}]");
        }
    }

    #[test]
    fn test_apply_update_and_delete() {
        for (name, store) in create_test_stores() {
            let mut course = Course::new("CS101", "Intro");
            let progress = Progress::new(UserId::new(), course.id);
            store.insert(&course).unwrap();
            store.insert(&progress).unwrap();

            course.title = "Renamed".to_string();
            store
                .apply(vec![
                    DocumentWrite::update(&course).unwrap(),
                    DocumentWrite::delete::<Progress>(progress.id),
                ])
                .unwrap();

            let stored: Course = store.require(course.id).unwrap();
            assert_eq!(stored.title, "Renamed", "[{name}]");
            assert!(store.get::<Progress>(progress.id).unwrap().is_none(), "[{name}]");
        }
    }

    #[test]
    fn test_lease_exclusion() {
        for (name, store) in create_test_stores() {
            let ttl = Duration::seconds(60);
            assert!(store.try_acquire_lease("sync", "a", ttl).unwrap(), "[{name}]");
            assert!(!store.try_acquire_lease("sync", "b", ttl).unwrap(), "[{name}]");
            // Renewal by the same holder
            assert!(store.try_acquire_lease("sync", "a", ttl).unwrap(), "[{name}]");

            assert!(!store.release_lease("sync", "b").unwrap(), "[{name}]");
            assert!(store.release_lease("sync", "a").unwrap(), "[{name}]");
            assert!(store.try_acquire_lease("sync", "b", ttl).unwrap(), "[{name}]");
        }
    }

    #[test]
    fn test_expired_lease_is_taken_over() {
        for (name, store) in create_test_stores() {
            assert!(store
                .try_acquire_lease("sync", "a", Duration::seconds(-1))
                .unwrap());
            assert!(
                store.try_acquire_lease("sync", "b", Duration::seconds(60)).unwrap(),
                "[{name}]"
            );
        }
    }
}
