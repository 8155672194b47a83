//! Enrollment registry
//!
//! Keeps the three sides of a student/course relationship in step: the
//! [`Enrollment`] embedded in the course, the course id in the user's
//! `enrolled_courses`, and the student id in a batch roster. Every operation
//! writes all touched documents in one store transaction while holding the
//! course lock, so concurrent calls for the same course cannot interleave.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Deserialize;
use tracing::{info, instrument};

use crate::error::{Error, Result};
use crate::models::{
    is_course_complete, Batch, BatchId, Course, CourseId, Enrollment, PaymentStatus, Progress,
    Role, User, UserId,
};
use crate::storage::{DocumentWrite, Store};
use crate::utils::KeyedLocks;

/// Partial update of an enrollment's payment; absent fields are left unchanged
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PaymentUpdate {
    pub status: Option<PaymentStatus>,
    pub amount: Option<f64>,
    pub currency: Option<String>,
    pub reference: Option<String>,
    pub paid_at: Option<DateTime<Utc>>,
}

impl PaymentUpdate {
    fn validate(&self) -> Result<()> {
        if let Some(amount) = self.amount {
            if !amount.is_finite() || amount < 0.0 {
                return Err(Error::validation("amount must be a non-negative number"));
            }
        }
        if self.currency.as_deref().is_some_and(|c| c.trim().is_empty()) {
            return Err(Error::validation("currency cannot be empty"));
        }
        Ok(())
    }
}

/// Creates and removes student/course relationships
#[derive(Clone)]
pub struct EnrollmentRegistry {
    store: Store,
    course_locks: Arc<KeyedLocks<CourseId>>,
}

impl EnrollmentRegistry {
    pub fn new(store: Store, course_locks: Arc<KeyedLocks<CourseId>>) -> Self {
        Self {
            store,
            course_locks,
        }
    }

    /// Enroll a student in a course, optionally into one of its batches.
    ///
    /// Repeating the call is a no-op. If the student is already enrolled
    /// without a batch and a batch is given, the enrollment picks it up.
    #[instrument(skip(self), fields(student = %student, course = %course_id))]
    pub async fn enroll(
        &self,
        student: UserId,
        course_id: CourseId,
        batch_id: Option<BatchId>,
    ) -> Result<Enrollment> {
        let _guard = self.course_locks.lock(course_id).await;

        let mut user: User = self.store.require(student)?;
        if user.role != Role::Student {
            return Err(Error::validation(format!(
                "user {} has role {}, only students can enroll",
                user.email, user.role
            )));
        }
        let mut course: Course = self.store.require(course_id)?;
        let mut batch = match batch_id {
            Some(id) => {
                let batch: Batch = self.store.require(id)?;
                if batch.course != course_id {
                    return Err(Error::validation(format!(
                        "batch {} does not belong to course {}",
                        batch.name, course.code
                    )));
                }
                Some(batch)
            }
            None => None,
        };

        let now = Utc::now();
        let mut writes = Vec::new();
        let was_enrolled = course.is_enrolled(student);

        let course_changed = match course.enrollment_mut(student) {
            Some(existing) => {
                if existing.batch.is_none() && batch_id.is_some() {
                    existing.batch = batch_id;
                    true
                } else {
                    false
                }
            }
            None => course.add_enrollment(student, batch_id, now),
        };
        if !was_enrolled {
            // Progress can be recorded before the student enrolls
            let progress = self.store.progress_for(student, course_id)?;
            if let Some(entry) = course.enrollment_mut(student) {
                entry.completed = is_course_complete(progress.as_ref());
            }
        }
        if course_changed {
            course.updated_at = now;
            writes.push(DocumentWrite::update(&course)?);
        }

        if user.add_enrolled_course(course_id) {
            user.updated_at = now;
            writes.push(DocumentWrite::update(&user)?);
        }

        if let Some(batch) = batch.as_mut() {
            if batch.add_student(student) {
                batch.updated_at = now;
                writes.push(DocumentWrite::update(&*batch)?);
            }
        }

        let changed = writes.len();
        self.store.apply(writes)?;
        if changed > 0 {
            info!(documents = changed, "Student enrolled");
        }

        course
            .enrollment(student)
            .cloned()
            .ok_or_else(|| Error::other("enrollment missing after write"))
    }

    /// Remove a student from a course, its batches and its progress
    #[instrument(skip(self), fields(student = %student, course = %course_id))]
    pub async fn unenroll(&self, student: UserId, course_id: CourseId) -> Result<Enrollment> {
        let _guard = self.course_locks.lock(course_id).await;

        let mut course: Course = self.store.require(course_id)?;
        let removed = course
            .remove_enrollment(student)
            .ok_or_else(|| Error::not_found("enrollment", format!("{student}:{}", course.code)))?;

        let now = Utc::now();
        course.updated_at = now;
        let mut writes = vec![DocumentWrite::update(&course)?];

        if let Some(mut user) = self.store.get::<User>(student)? {
            if user.remove_enrolled_course(course_id) {
                user.updated_at = now;
                writes.push(DocumentWrite::update(&user)?);
            }
        }

        for mut batch in self.store.batches_for_course(course_id)? {
            if batch.remove_student(student) {
                batch.updated_at = now;
                writes.push(DocumentWrite::update(&batch)?);
            }
        }

        if let Some(progress) = self.store.progress_for(student, course_id)? {
            writes.push(DocumentWrite::delete::<Progress>(progress.id));
        }

        self.store.apply(writes)?;
        info!("Student unenrolled");
        Ok(removed)
    }

    /// Update the payment sub-fields of an enrollment
    #[instrument(skip(self, update), fields(student = %student, course = %course_id))]
    pub async fn record_payment(
        &self,
        student: UserId,
        course_id: CourseId,
        update: PaymentUpdate,
    ) -> Result<Enrollment> {
        update.validate()?;
        let _guard = self.course_locks.lock(course_id).await;

        let mut course: Course = self.store.require(course_id)?;
        let code = course.code.clone();
        let enrollment = course
            .enrollment_mut(student)
            .ok_or_else(|| Error::not_found("enrollment", format!("{student}:{code}")))?;

        let now = Utc::now();
        let payment = &mut enrollment.payment;
        if let Some(status) = update.status {
            payment.status = status;
        }
        if update.amount.is_some() {
            payment.amount = update.amount;
        }
        if let Some(currency) = update.currency {
            payment.currency = Some(currency.trim().to_ascii_uppercase());
        }
        if update.reference.is_some() {
            payment.reference = update.reference;
        }
        if update.paid_at.is_some() {
            payment.paid_at = update.paid_at;
        } else if payment.status == PaymentStatus::Paid && payment.paid_at.is_none() {
            payment.paid_at = Some(now);
        }

        let enrollment = enrollment.clone();
        course.updated_at = now;
        self.store.update(&course)?;

        info!(status = ?enrollment.payment.status, "Payment recorded");
        Ok(enrollment)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::WeeklySchedule;
    use chrono::{NaiveDate, NaiveTime, Weekday};

    fn schedule() -> WeeklySchedule {
        WeeklySchedule {
            days: vec![Weekday::Mon, Weekday::Wed],
            start_time: NaiveTime::from_hms_opt(18, 0, 0).unwrap(),
            end_time: NaiveTime::from_hms_opt(20, 0, 0).unwrap(),
            start_date: NaiveDate::from_ymd_opt(2026, 1, 5).unwrap(),
            end_date: None,
            timezone: "UTC".to_string(),
        }
    }

    fn setup() -> (Store, EnrollmentRegistry, User, Course) {
        let store = Store::in_memory();
        let registry = EnrollmentRegistry::new(store.clone(), Arc::new(KeyedLocks::new()));

        let student = User::new("Ada", "ada@example.com", Role::Student);
        store.insert(&student).unwrap();
        let course = Course::new("CS101", "Intro");
        store.insert(&course).unwrap();

        (store, registry, student, course)
    }

    #[tokio::test]
    async fn test_enroll_with_batch_updates_all_sides() {
        let (store, registry, student, course) = setup();
        let batch = Batch::new("Evening", course.id, vec![UserId::new()], schedule());
        store.insert(&batch).unwrap();

        let enrollment = registry
            .enroll(student.id, course.id, Some(batch.id))
            .await
            .unwrap();
        assert_eq!(enrollment.batch, Some(batch.id));
        assert!(!enrollment.completed);

        let user: User = store.require(student.id).unwrap();
        assert_eq!(user.enrolled_courses, vec![course.id]);
        let batch: Batch = store.require(batch.id).unwrap();
        assert_eq!(batch.students, vec![student.id]);
    }

    #[tokio::test]
    async fn test_enroll_sets_missing_batch() {
        let (store, registry, student, course) = setup();
        let batch = Batch::new("Morning", course.id, vec![UserId::new()], schedule());
        store.insert(&batch).unwrap();

        registry.enroll(student.id, course.id, None).await.unwrap();
        let enrollment = registry
            .enroll(student.id, course.id, Some(batch.id))
            .await
            .unwrap();

        assert_eq!(enrollment.batch, Some(batch.id));
        let stored: Course = store.require(course.id).unwrap();
        assert_eq!(stored.enrolled_students.len(), 1);
    }

    #[tokio::test]
    async fn test_enroll_rejects_non_students_and_foreign_batches() {
        let (store, registry, student, course) = setup();

        let instructor = User::new("Grace", "grace@example.com", Role::Instructor);
        store.insert(&instructor).unwrap();
        let err = registry.enroll(instructor.id, course.id, None).await.unwrap_err();
        assert!(matches!(err, Error::Validation(_)));

        let other = Course::new("CS102", "Other");
        store.insert(&other).unwrap();
        let foreign = Batch::new("Other batch", other.id, vec![UserId::new()], schedule());
        store.insert(&foreign).unwrap();

        let err = registry
            .enroll(student.id, course.id, Some(foreign.id))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
        let stored: Course = store.require(course.id).unwrap();
        assert!(stored.enrolled_students.is_empty());
    }

    #[tokio::test]
    async fn test_unenroll_removes_everything() {
        let (store, registry, student, course) = setup();
        let batch = Batch::new("Evening", course.id, vec![UserId::new()], schedule());
        store.insert(&batch).unwrap();
        registry
            .enroll(student.id, course.id, Some(batch.id))
            .await
            .unwrap();
        store.insert(&Progress::new(student.id, course.id)).unwrap();

        registry.unenroll(student.id, course.id).await.unwrap();

        let stored: Course = store.require(course.id).unwrap();
        assert!(!stored.is_enrolled(student.id));
        let user: User = store.require(student.id).unwrap();
        assert!(user.enrolled_courses.is_empty());
        let batch: Batch = store.require(batch.id).unwrap();
        assert!(batch.students.is_empty());
        assert!(store.progress_for(student.id, course.id).unwrap().is_none());

        let err = registry.unenroll(student.id, course.id).await.unwrap_err();
        assert!(matches!(err, Error::NotFound { kind: "enrollment", .. }));
    }

    #[tokio::test]
    async fn test_record_payment() {
        let (_store, registry, student, course) = setup();
        registry.enroll(student.id, course.id, None).await.unwrap();

        let enrollment = registry
            .record_payment(
                student.id,
                course.id,
                PaymentUpdate {
                    status: Some(PaymentStatus::Paid),
                    amount: Some(120.0),
                    currency: Some("usd".to_string()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        assert_eq!(enrollment.payment.status, PaymentStatus::Paid);
        assert_eq!(enrollment.payment.currency.as_deref(), Some("USD"));
        assert!(enrollment.payment.paid_at.is_some());

        let err = registry
            .record_payment(
                student.id,
                course.id,
                PaymentUpdate {
                    amount: Some(-1.0),
                    ..Default::default()
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
    }
}
