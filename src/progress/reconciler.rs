//! Completion reconciliation
//!
//! Recomputes the `completed` flag of every enrollment in a course from the
//! stored progress records. A student counts as complete when their progress
//! record has at least one entry and every entry is completed. The number of
//! entries is not compared with the number of sections in the course, so a
//! single completed section is enough when it is the only one recorded.

use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;
use tracing::{debug, info, instrument};

use crate::error::Result;
use crate::metrics;
use crate::models::{is_course_complete, Course, CourseId};
use crate::storage::Store;
use crate::utils::KeyedLocks;

/// Outcome of reconciling one course
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReconcileReport {
    pub course: CourseId,
    /// Enrollments evaluated
    pub evaluated: usize,
    /// Enrollments complete after reconciliation
    pub completed: usize,
    /// Enrollments whose flag flipped
    pub changed: usize,
}

/// Keeps `Enrollment::completed` in line with progress records
#[derive(Clone)]
pub struct Reconciler {
    store: Store,
    course_locks: Arc<KeyedLocks<CourseId>>,
}

impl Reconciler {
    pub fn new(store: Store, course_locks: Arc<KeyedLocks<CourseId>>) -> Self {
        Self {
            store,
            course_locks,
        }
    }

    /// Reconcile every enrollment of a course
    pub async fn reconcile(&self, course: CourseId) -> Result<ReconcileReport> {
        let _guard = self.course_locks.lock(course).await;
        self.reconcile_locked(course)
    }

    /// Reconcile while the caller already holds the course lock
    #[instrument(skip(self), fields(course = %course_id))]
    pub(crate) fn reconcile_locked(&self, course_id: CourseId) -> Result<ReconcileReport> {
        let mut course: Course = self.store.require(course_id)?;

        let mut completed = 0;
        let mut changed = 0;
        for enrollment in &mut course.enrolled_students {
            let progress = self.store.progress_for(enrollment.student, course_id)?;
            let is_complete = is_course_complete(progress.as_ref());

            if enrollment.completed != is_complete {
                debug!(
                    student = %enrollment.student,
                    completed = is_complete,
                    "Completion flag changed"
                );
                enrollment.completed = is_complete;
                changed += 1;
            }
            if is_complete {
                completed += 1;
            }
        }

        if changed > 0 {
            course.updated_at = Utc::now();
            self.store.update(&course)?;
        }

        metrics::record_reconciliation(changed);

        let report = ReconcileReport {
            course: course_id,
            evaluated: course.enrolled_students.len(),
            completed,
            changed,
        };
        info!(
            evaluated = report.evaluated,
            completed = report.completed,
            changed = report.changed,
            "Course reconciled"
        );
        Ok(report)
    }

    /// Reconcile every course in the store
    pub async fn reconcile_all(&self) -> Result<Vec<ReconcileReport>> {
        let courses: Vec<Course> = self.store.list()?;
        let mut reports = Vec::with_capacity(courses.len());
        for course in courses {
            reports.push(self.reconcile(course.id).await?);
        }
        Ok(reports)
    }
}
