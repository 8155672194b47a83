//! Course catalog

use std::collections::HashSet;
use std::sync::Arc;

use chrono::Utc;
use serde::Deserialize;
use tracing::info;

use crate::error::{Error, Result};
use crate::models::{
    build_layout, Batch, Course, CourseFilter, CourseId, ModuleDraft, Progress, Role, User, UserId,
};
use crate::storage::{DocumentWrite, Store};
use crate::utils::{require_non_empty, KeyedLocks};

/// Fields accepted when creating a course
#[derive(Debug, Clone, Deserialize)]
pub struct NewCourse {
    pub code: String,
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub instructors: Vec<UserId>,
    #[serde(default)]
    pub modules: Vec<ModuleDraft>,
}

/// Partial course update; `modules` replaces the whole layout when present
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CourseUpdate {
    pub code: Option<String>,
    pub title: Option<String>,
    pub description: Option<String>,
    pub instructors: Option<Vec<UserId>>,
    pub modules: Option<Vec<ModuleDraft>>,
}

#[derive(Clone)]
pub struct CourseService {
    store: Store,
    course_locks: Arc<KeyedLocks<CourseId>>,
}

impl CourseService {
    pub fn new(store: Store, course_locks: Arc<KeyedLocks<CourseId>>) -> Self {
        Self {
            store,
            course_locks,
        }
    }

    /// Every id must be an existing admin or instructor
    fn check_instructors(&self, ids: &[UserId]) -> Result<()> {
        for id in ids {
            let user: User = self.store.require(id)?;
            if user.role == Role::Student {
                return Err(Error::validation(format!(
                    "user {} is a student and cannot teach a course",
                    user.email
                )));
            }
        }
        Ok(())
    }

    pub fn create(&self, new: NewCourse) -> Result<Course> {
        require_non_empty("code", &new.code)?;
        require_non_empty("title", &new.title)?;
        self.check_instructors(&new.instructors)?;

        let mut course = Course::new(new.code.trim(), new.title.trim());
        course.description = new.description;
        course.instructors = dedup(new.instructors);
        course.modules = build_layout(new.modules, &HashSet::new())
            .map_err(|e| Error::validation(e.to_string()))?;

        self.store.insert(&course)?;
        info!(
            course = %course.id,
            code = %course.code,
            sections = course.section_count(),
            "Course created"
        );
        Ok(course)
    }

    pub fn get(&self, id: CourseId) -> Result<Course> {
        Ok(self.store.require(id)?)
    }

    pub fn list(&self, filter: &CourseFilter) -> Result<Vec<Course>> {
        let courses: Vec<Course> = self.store.list()?;
        Ok(courses.into_iter().filter(|c| filter.matches(c)).collect())
    }

    /// Update course fields. Sections resubmitted with their id keep it, so
    /// existing progress entries stay attached to them.
    pub async fn update(&self, id: CourseId, update: CourseUpdate) -> Result<Course> {
        let _guard = self.course_locks.lock(id).await;
        let mut course: Course = self.store.require(id)?;

        if let Some(code) = update.code {
            require_non_empty("code", &code)?;
            course.code = code.trim().to_string();
        }
        if let Some(title) = update.title {
            require_non_empty("title", &title)?;
            course.title = title.trim().to_string();
        }
        if update.description.is_some() {
            course.description = update.description;
        }
        if let Some(instructors) = update.instructors {
            self.check_instructors(&instructors)?;
            course.instructors = dedup(instructors);
        }
        if let Some(modules) = update.modules {
            course.modules = build_layout(modules, &course.section_ids())
                .map_err(|e| Error::validation(e.to_string()))?;
        }

        course.updated_at = Utc::now();
        self.store.update(&course)?;
        Ok(course)
    }

    /// Delete a course with its progress records and batches, and drop it
    /// from every user's enrolled list
    pub async fn delete(&self, id: CourseId) -> Result<()> {
        let _guard = self.course_locks.lock(id).await;
        let course: Course = self.store.require(id)?;

        let now = Utc::now();
        let mut writes = Vec::new();

        for mut user in self.store.list::<User>()? {
            if user.remove_enrolled_course(id) {
                user.updated_at = now;
                writes.push(DocumentWrite::update(&user)?);
            }
        }
        let progress = self.store.progress_for_course(id)?;
        for record in &progress {
            writes.push(DocumentWrite::delete::<Progress>(record.id));
        }
        let batches = self.store.batches_for_course(id)?;
        for batch in &batches {
            writes.push(DocumentWrite::delete::<Batch>(batch.id));
        }
        writes.push(DocumentWrite::delete::<Course>(id));

        self.store.apply(writes)?;
        info!(
            course = %id,
            code = %course.code,
            progress = progress.len(),
            batches = batches.len(),
            "Course deleted"
        );
        Ok(())
    }
}

fn dedup(ids: Vec<UserId>) -> Vec<UserId> {
    let mut seen = HashSet::new();
    ids.into_iter().filter(|id| seen.insert(*id)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::SectionDraft;

    fn service() -> (Store, CourseService) {
        let store = Store::in_memory();
        (store.clone(), CourseService::new(store, Arc::new(KeyedLocks::new())))
    }

    fn new_course(code: &str) -> NewCourse {
        NewCourse {
            code: code.to_string(),
            title: "Intro".to_string(),
            description: None,
            instructors: Vec::new(),
            modules: vec![ModuleDraft::titled("Basics", &["A", "B"])],
        }
    }

    #[test]
    fn test_create_assigns_section_ids() {
        let (_store, courses) = service();
        let course = courses.create(new_course("CS101")).unwrap();

        assert_eq!(course.section_count(), 2);
        assert_ne!(course.modules[0].sections[0].id, course.modules[0].sections[1].id);

        let err = courses.create(new_course("CS101")).unwrap_err();
        assert!(matches!(err, Error::Conflict(_)));
    }

    #[test]
    fn test_create_rejects_student_instructor() {
        let (store, courses) = service();
        let student = User::new("Ada", "ada@example.com", Role::Student);
        store.insert(&student).unwrap();

        let mut new = new_course("CS101");
        new.instructors = vec![student.id];
        assert!(matches!(courses.create(new).unwrap_err(), Error::Validation(_)));
    }

    #[tokio::test]
    async fn test_update_keeps_resubmitted_section_ids() {
        let (_store, courses) = service();
        let course = courses.create(new_course("CS101")).unwrap();
        let kept = course.modules[0].sections[1].id;

        let updated = courses
            .update(
                course.id,
                CourseUpdate {
                    modules: Some(vec![ModuleDraft {
                        title: "Basics".to_string(),
                        sections: vec![
                            SectionDraft {
                                id: Some(kept),
                                title: "B".to_string(),
                                content: None,
                            },
                            SectionDraft {
                                id: None,
                                title: "C".to_string(),
                                content: None,
                            },
                        ],
                    }]),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        assert_eq!(updated.position_of(kept), Some((0, 0)));
        assert_eq!(updated.section_count(), 2);
    }

    #[tokio::test]
    async fn test_delete_cascades() {
        let (store, courses) = service();
        let course = courses.create(new_course("CS101")).unwrap();

        let mut student = User::new("Ada", "ada@example.com", Role::Student);
        student.add_enrolled_course(course.id);
        store.insert(&student).unwrap();
        store.insert(&Progress::new(student.id, course.id)).unwrap();

        courses.delete(course.id).await.unwrap();

        assert!(store.get::<Course>(course.id).unwrap().is_none());
        assert!(store.progress_for_course(course.id).unwrap().is_empty());
        let student: User = store.require(student.id).unwrap();
        assert!(student.enrolled_courses.is_empty());
    }
}
