//! Application services
//!
//! [`Services`] wires every domain service to one [`Store`] and one set of
//! course locks. The API server, the CLI commands and the sync job all go
//! through it.

pub mod batches;
pub mod courses;
pub mod users;

use std::sync::Arc;

use crate::enrollment::EnrollmentRegistry;
use crate::progress::{ProgressTracker, Reconciler};
use crate::storage::Store;
use crate::utils::KeyedLocks;

pub use batches::{BatchService, BatchUpdate, NewBatch};
pub use courses::{CourseService, CourseUpdate, NewCourse};
pub use users::{NewUser, UserService, UserUpdate};

/// All domain services sharing one store
#[derive(Clone)]
pub struct Services {
    pub store: Store,
    pub users: UserService,
    pub courses: CourseService,
    pub batches: BatchService,
    pub enrollment: EnrollmentRegistry,
    pub reconciler: Reconciler,
    pub progress: ProgressTracker,
}

impl Services {
    pub fn new(store: Store) -> Self {
        let course_locks = Arc::new(KeyedLocks::new());
        let reconciler = Reconciler::new(store.clone(), Arc::clone(&course_locks));

        Self {
            users: UserService::new(store.clone(), Arc::clone(&course_locks)),
            courses: CourseService::new(store.clone(), Arc::clone(&course_locks)),
            batches: BatchService::new(store.clone(), Arc::clone(&course_locks)),
            enrollment: EnrollmentRegistry::new(store.clone(), Arc::clone(&course_locks)),
            progress: ProgressTracker::new(store.clone(), reconciler.clone(), course_locks),
            reconciler,
            store,
        }
    }
}
