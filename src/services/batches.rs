//! Batches (scheduled cohorts within a course)

use std::sync::Arc;

use chrono::Utc;
use serde::Deserialize;
use tracing::info;

use crate::error::{Error, Result};
use crate::models::{
    Batch, BatchFilter, BatchId, Course, CourseId, Role, User, UserId, WeeklySchedule,
};
use crate::storage::{DocumentWrite, Store};
use crate::utils::{require_non_empty, KeyedLocks};

/// Fields accepted when creating a batch
#[derive(Debug, Clone, Deserialize)]
pub struct NewBatch {
    pub name: String,
    pub course: CourseId,
    pub instructors: Vec<UserId>,
    pub schedule: WeeklySchedule,
}

/// Partial batch update; absent fields are left unchanged
#[derive(Debug, Clone, Default, Deserialize)]
pub struct BatchUpdate {
    pub name: Option<String>,
    pub instructors: Option<Vec<UserId>>,
    pub schedule: Option<WeeklySchedule>,
}

#[derive(Clone)]
pub struct BatchService {
    store: Store,
    course_locks: Arc<KeyedLocks<CourseId>>,
}

impl BatchService {
    pub fn new(store: Store, course_locks: Arc<KeyedLocks<CourseId>>) -> Self {
        Self {
            store,
            course_locks,
        }
    }

    fn check_instructors(&self, ids: &[UserId]) -> Result<()> {
        if ids.is_empty() {
            return Err(Error::validation("a batch needs at least one instructor"));
        }
        for id in ids {
            let user: User = self.store.require(id)?;
            if user.role == Role::Student {
                return Err(Error::validation(format!(
                    "user {} is a student and cannot teach a batch",
                    user.email
                )));
            }
        }
        Ok(())
    }

    pub fn create(&self, new: NewBatch) -> Result<Batch> {
        require_non_empty("name", &new.name)?;
        new.schedule.validate().map_err(Error::Validation)?;
        self.check_instructors(&new.instructors)?;
        self.store.require::<Course>(new.course)?;

        let batch = Batch::new(new.name.trim(), new.course, new.instructors, new.schedule);
        self.store.insert(&batch)?;
        info!(batch = %batch.id, course = %batch.course, "Batch created");
        Ok(batch)
    }

    pub fn get(&self, id: BatchId) -> Result<Batch> {
        Ok(self.store.require(id)?)
    }

    pub fn list(&self, filter: &BatchFilter) -> Result<Vec<Batch>> {
        let batches: Vec<Batch> = match filter.course {
            Some(course) => self.store.batches_for_course(course)?,
            None => self.store.list()?,
        };
        Ok(batches.into_iter().filter(|b| filter.matches(b)).collect())
    }

    pub fn update(&self, id: BatchId, update: BatchUpdate) -> Result<Batch> {
        let mut batch: Batch = self.store.require(id)?;

        if let Some(name) = update.name {
            require_non_empty("name", &name)?;
            batch.name = name.trim().to_string();
        }
        if let Some(instructors) = update.instructors {
            self.check_instructors(&instructors)?;
            batch.instructors = instructors;
        }
        if let Some(schedule) = update.schedule {
            schedule.validate().map_err(Error::Validation)?;
            batch.schedule = schedule;
        }

        batch.updated_at = Utc::now();
        self.store.update(&batch)?;
        Ok(batch)
    }

    /// Delete a batch and clear it from the enrollments that reference it
    pub async fn delete(&self, id: BatchId) -> Result<()> {
        let batch: Batch = self.store.require(id)?;
        let _guard = self.course_locks.lock(batch.course).await;

        let mut writes = Vec::new();
        if let Some(mut course) = self.store.get::<Course>(batch.course)? {
            let mut cleared = 0;
            for enrollment in &mut course.enrolled_students {
                if enrollment.batch == Some(id) {
                    enrollment.batch = None;
                    cleared += 1;
                }
            }
            if cleared > 0 {
                course.updated_at = Utc::now();
                writes.push(DocumentWrite::update(&course)?);
            }
        }
        writes.push(DocumentWrite::delete::<Batch>(id));

        self.store.apply(writes)?;
        info!(batch = %id, "Batch deleted");
        Ok(())
    }
}
