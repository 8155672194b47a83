//! Section completion tracking
//!
//! Records which sections of a course a student has completed. Positional
//! input `(module_index, section_index)` is resolved against the course's
//! current layout to a stable [`SectionId`], so later edits to the layout do
//! not shift existing entries onto other sections.

use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;
use tracing::{debug, instrument};

use crate::error::{Error, Result};
use crate::metrics;
use crate::models::{Course, CourseId, Progress, SectionId, User, UserId};
use crate::storage::Store;
use crate::utils::KeyedLocks;

use super::reconciler::Reconciler;

/// Per-student line of a course report
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StudentProgress {
    pub student: UserId,
    /// Completed entries that still map to a section of the course
    pub completed_sections: usize,
    pub total_sections: usize,
    /// `completed_sections / total_sections * 100`, zero for an empty course
    pub percentage: f64,
    /// Completion flag as maintained by the reconciler
    pub completed: bool,
}

/// Progress overview of every enrolled student
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CourseReport {
    pub course: CourseId,
    pub total_sections: usize,
    pub students: Vec<StudentProgress>,
}

/// Reads and writes progress records
#[derive(Clone)]
pub struct ProgressTracker {
    store: Store,
    reconciler: Reconciler,
    course_locks: Arc<KeyedLocks<CourseId>>,
}

impl ProgressTracker {
    /// `course_locks` must be the set shared with enrollment and course
    /// services, so progress writes cannot interleave with the deletes they run
    pub fn new(
        store: Store,
        reconciler: Reconciler,
        course_locks: Arc<KeyedLocks<CourseId>>,
    ) -> Self {
        Self {
            store,
            reconciler,
            course_locks,
        }
    }

    /// Mark the section at a position as completed or not
    pub async fn set_section_completion(
        &self,
        student: UserId,
        course: CourseId,
        module_index: usize,
        section_index: usize,
        is_completed: bool,
    ) -> Result<Progress> {
        let section = SectionRef::Position(module_index, section_index);
        self.set_completion(student, course, section, is_completed)
            .await
    }

    /// Mark a section, addressed by its stable id, as completed or not
    pub async fn set_section_completion_by_id(
        &self,
        student: UserId,
        course: CourseId,
        section: SectionId,
        is_completed: bool,
    ) -> Result<Progress> {
        self.set_completion(student, course, SectionRef::Id(section), is_completed)
            .await
    }

    #[instrument(skip(self), fields(student = %student, course = %course_id))]
    async fn set_completion(
        &self,
        student: UserId,
        course_id: CourseId,
        section: SectionRef,
        is_completed: bool,
    ) -> Result<Progress> {
        let _guard = self.course_locks.lock(course_id).await;

        self.store.require::<User>(student)?;
        let course: Course = self.store.require(course_id)?;
        let (section_id, position) = section.resolve(&course)?;

        let now = Utc::now();
        let progress = match self.store.progress_for(student, course_id)? {
            Some(mut progress) => {
                if progress.set_section(section_id, position, is_completed, now) {
                    self.store.update(&progress)?;
                }
                progress
            }
            None => {
                let mut progress = Progress::new(student, course_id);
                progress.set_section(section_id, position, is_completed, now);
                self.store.insert(&progress)?;
                progress
            }
        };

        metrics::record_section_update(is_completed);
        debug!(entries = progress.sections.len(), "Progress saved");

        self.reconciler.reconcile_locked(course_id)?;
        Ok(progress)
    }

    /// Progress record of a student in a course
    pub fn get_progress(&self, student: UserId, course: CourseId) -> Result<Progress> {
        self.store
            .progress_for(student, course)?
            .ok_or_else(|| Error::not_found("progress", format!("{student}:{course}")))
    }

    /// All progress records of a course
    pub fn list_course_progress(&self, course: CourseId) -> Result<Vec<Progress>> {
        self.store.require::<Course>(course)?;
        Ok(self.store.progress_for_course(course)?)
    }

    /// Percentage of sections completed by each enrolled student
    pub fn course_report(&self, course_id: CourseId) -> Result<CourseReport> {
        let course: Course = self.store.require(course_id)?;
        let section_ids = course.section_ids();
        let total_sections = section_ids.len();

        let mut students = Vec::with_capacity(course.enrolled_students.len());
        for enrollment in &course.enrolled_students {
            let completed_sections = self
                .store
                .progress_for(enrollment.student, course_id)?
                .map(|p| {
                    p.sections
                        .iter()
                        .filter(|e| e.is_completed && section_ids.contains(&e.section_id))
                        .count()
                })
                .unwrap_or(0);

            let percentage = if total_sections == 0 {
                0.0
            } else {
                completed_sections as f64 * 100.0 / total_sections as f64
            };

            students.push(StudentProgress {
                student: enrollment.student,
                completed_sections,
                total_sections,
                percentage,
                completed: enrollment.completed,
            });
        }

        Ok(CourseReport {
            course: course_id,
            total_sections,
            students,
        })
    }
}

#[derive(Debug, Clone, Copy)]
enum SectionRef {
    Position(usize, usize),
    Id(SectionId),
}

impl SectionRef {
    fn resolve(self, course: &Course) -> Result<(SectionId, (usize, usize))> {
        match self {
            SectionRef::Position(m, s) => course
                .section_at(m, s)
                .map(|id| (id, (m, s)))
                .ok_or_else(|| {
                    Error::validation(format!(
                        "course {} has no section at module {m}, section {s}",
                        course.code
                    ))
                }),
            SectionRef::Id(id) => course
                .position_of(id)
                .map(|pos| (id, pos))
                .ok_or_else(|| {
                    Error::validation(format!("section {id} is not part of course {}", course.code))
                }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{build_layout, ModuleDraft, Role};
    use std::collections::HashSet;

    struct Fixture {
        store: Store,
        tracker: ProgressTracker,
        student: UserId,
        course: Course,
    }

    fn fixture(layout: Vec<ModuleDraft>) -> Fixture {
        let store = Store::in_memory();
        let locks = Arc::new(KeyedLocks::new());
        let reconciler = Reconciler::new(store.clone(), Arc::clone(&locks));
        let tracker = ProgressTracker::new(store.clone(), reconciler, locks);

        let student = User::new("Ada", "ada@example.com", Role::Student);
        store.insert(&student).unwrap();

        let mut course = Course::new("CS101", "Intro");
        course.modules = build_layout(layout, &HashSet::new()).unwrap();
        course.add_enrollment(student.id, None, Utc::now());
        store.insert(&course).unwrap();

        Fixture {
            store,
            tracker,
            student: student.id,
            course,
        }
    }

    #[tokio::test]
    async fn test_first_call_creates_record() {
        let f = fixture(vec![ModuleDraft::titled("M", &["A", "B"])]);

        let progress = f
            .tracker
            .set_section_completion(f.student, f.course.id, 0, 1, true)
            .await
            .unwrap();

        assert_eq!(progress.sections.len(), 1);
        assert_eq!(progress.sections[0].section_id, f.course.modules[0].sections[1].id);
        assert!(progress.sections[0].completion_time.is_some());
        assert_eq!(f.tracker.get_progress(f.student, f.course.id).unwrap(), progress);
    }

    #[tokio::test]
    async fn test_out_of_range_position_is_rejected() {
        let f = fixture(vec![ModuleDraft::titled("M", &["A"])]);

        let err = f
            .tracker
            .set_section_completion(f.student, f.course.id, 0, 5, true)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
        assert!(f.store.progress_for(f.student, f.course.id).unwrap().is_none());
    }

    #[tokio::test]
    async fn test_unknown_student_or_course() {
        let f = fixture(vec![ModuleDraft::titled("M", &["A"])]);

        let err = f
            .tracker
            .set_section_completion(UserId::new(), f.course.id, 0, 0, true)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::NotFound { kind: "user", .. }));

        let err = f
            .tracker
            .set_section_completion(f.student, CourseId::new(), 0, 0, true)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::NotFound { kind: "course", .. }));
    }

    #[tokio::test]
    async fn test_entries_follow_section_identity() {
        let mut f = fixture(vec![ModuleDraft::titled("M", &["A", "B"])]);
        let section_b = f.course.modules[0].sections[1].id;

        f.tracker
            .set_section_completion(f.student, f.course.id, 0, 1, true)
            .await
            .unwrap();

        // Move B to the front; the entry still refers to B
        f.course.modules[0].sections.swap(0, 1);
        f.store.update(&f.course).unwrap();

        let progress = f
            .tracker
            .set_section_completion_by_id(f.student, f.course.id, section_b, true)
            .await
            .unwrap();
        assert_eq!(progress.sections.len(), 1);
        assert_eq!(progress.sections[0].section_index, 0);
    }

    #[tokio::test]
    async fn test_course_report() {
        let f = fixture(vec![
            ModuleDraft::titled("M1", &["A", "B"]),
            ModuleDraft::titled("M2", &["C", "D"]),
        ]);

        f.tracker
            .set_section_completion(f.student, f.course.id, 1, 0, true)
            .await
            .unwrap();

        let report = f.tracker.course_report(f.course.id).unwrap();
        assert_eq!(report.total_sections, 4);
        assert_eq!(report.students.len(), 1);

        let line = &report.students[0];
        assert_eq!(line.completed_sections, 1);
        assert!((line.percentage - 25.0).abs() < f64::EPSILON);
        // Only one entry recorded, and it is complete
        assert!(line.completed);
    }
}
