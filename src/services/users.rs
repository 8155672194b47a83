//! User accounts

use std::sync::Arc;

use chrono::Utc;
use serde::Deserialize;
use tracing::info;

use crate::error::{Error, Result};
use crate::models::{normalize_email, Course, CourseId, Progress, Role, User, UserFilter, UserId};
use crate::storage::{DocumentWrite, Store};
use crate::utils::{is_valid_email, require_non_empty, KeyedLocks};

/// Fields accepted when creating a user
#[derive(Debug, Clone, Deserialize)]
pub struct NewUser {
    pub name: String,
    pub email: String,
    #[serde(default)]
    pub phone: Option<String>,
    pub role: Role,
    #[serde(default)]
    pub external_id: Option<String>,
}

/// Partial user update; absent fields are left unchanged
#[derive(Debug, Clone, Default, Deserialize)]
pub struct UserUpdate {
    pub name: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub role: Option<Role>,
}

fn validate_email(email: &str) -> Result<()> {
    if !is_valid_email(email) {
        return Err(Error::validation(format!("invalid email address '{email}'")));
    }
    Ok(())
}

#[derive(Clone)]
pub struct UserService {
    store: Store,
    course_locks: Arc<KeyedLocks<CourseId>>,
}

impl UserService {
    pub fn new(store: Store, course_locks: Arc<KeyedLocks<CourseId>>) -> Self {
        Self {
            store,
            course_locks,
        }
    }

    pub fn create(&self, new: NewUser) -> Result<User> {
        require_non_empty("name", &new.name)?;
        validate_email(&new.email)?;

        let mut user = User::new(new.name.trim(), &new.email, new.role);
        user.phone = new.phone.filter(|p| !p.trim().is_empty());
        user.external_id = new.external_id;

        self.store.insert(&user)?;
        info!(user = %user.id, role = %user.role, "User created");
        Ok(user)
    }

    pub fn get(&self, id: UserId) -> Result<User> {
        Ok(self.store.require(id)?)
    }

    pub fn list(&self, filter: &UserFilter) -> Result<Vec<User>> {
        let users: Vec<User> = self.store.list()?;
        Ok(users.into_iter().filter(|u| filter.matches(u)).collect())
    }

    pub fn update(&self, id: UserId, update: UserUpdate) -> Result<User> {
        let mut user: User = self.store.require(id)?;

        if let Some(name) = update.name {
            require_non_empty("name", &name)?;
            user.name = name.trim().to_string();
        }
        if let Some(email) = update.email {
            validate_email(&email)?;
            user.email = normalize_email(&email);
        }
        if let Some(phone) = update.phone {
            user.phone = Some(phone).filter(|p| !p.trim().is_empty());
        }
        if let Some(role) = update.role {
            if role != user.role && !user.enrolled_courses.is_empty() && role != Role::Student {
                return Err(Error::validation(
                    "cannot change the role of a user with active enrollments",
                ));
            }
            user.role = role;
        }

        user.updated_at = Utc::now();
        self.store.update(&user)?;
        Ok(user)
    }

    /// Delete a user along with their enrollments, batch seats, progress and
    /// instructor assignments
    pub async fn delete(&self, id: UserId) -> Result<()> {
        let user: User = self.store.require(id)?;

        let mut course_ids: Vec<CourseId> = self
            .store
            .list::<Course>()?
            .into_iter()
            .filter(|c| c.is_enrolled(id) || c.instructors.contains(&id))
            .map(|c| c.id)
            .collect();
        course_ids.sort();

        // Fixed lock order keeps concurrent deletes from deadlocking
        let mut guards = Vec::with_capacity(course_ids.len());
        for course in &course_ids {
            guards.push(self.course_locks.lock(*course).await);
        }

        let now = Utc::now();
        let mut writes = Vec::new();
        for course_id in &course_ids {
            let Some(mut course) = self.store.get::<Course>(course_id)? else {
                continue;
            };
            course.remove_enrollment(id);
            course.instructors.retain(|i| *i != id);
            course.updated_at = now;
            writes.push(DocumentWrite::update(&course)?);

            for mut batch in self.store.batches_for_course(*course_id)? {
                let had_student = batch.remove_student(id);
                let before = batch.instructors.len();
                batch.instructors.retain(|i| *i != id);
                if had_student || before != batch.instructors.len() {
                    batch.updated_at = now;
                    writes.push(DocumentWrite::update(&batch)?);
                }
            }

            if let Some(progress) = self.store.progress_for(id, *course_id)? {
                writes.push(DocumentWrite::delete::<Progress>(progress.id));
            }
        }
        writes.push(DocumentWrite::delete::<User>(id));

        self.store.apply(writes)?;
        info!(user = %id, email = %user.email, courses = course_ids.len(), "User deleted");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn service() -> (Store, UserService) {
        let store = Store::in_memory();
        (store.clone(), UserService::new(store, Arc::new(KeyedLocks::new())))
    }

    fn new_user(email: &str) -> NewUser {
        NewUser {
            name: "Ada".to_string(),
            email: email.to_string(),
            phone: None,
            role: Role::Student,
            external_id: None,
        }
    }

    #[test]
    fn test_create_validates_and_dedups() {
        let (_store, users) = service();

        let user = users.create(new_user("Ada@Example.com")).unwrap();
        assert_eq!(user.email, "ada@example.com");

        let err = users.create(new_user("ada@example.com")).unwrap_err();
        assert!(matches!(err, Error::Conflict(_)));

        let err = users.create(new_user("not-an-email")).unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
    }

    #[test]
    fn test_update_and_filter() {
        let (_store, users) = service();
        let user = users.create(new_user("ada@example.com")).unwrap();

        let updated = users
            .update(
                user.id,
                UserUpdate {
                    name: Some("Ada L.".to_string()),
                    role: Some(Role::Instructor),
                    ..Default::default()
                },
            )
            .unwrap();
        assert_eq!(updated.name, "Ada L.");

        let instructors = users
            .list(&UserFilter {
                role: Some(Role::Instructor),
            })
            .unwrap();
        assert_eq!(instructors.len(), 1);
    }

    #[tokio::test]
    async fn test_delete_cascades() {
        let (store, users) = service();
        let user = users.create(new_user("ada@example.com")).unwrap();

        let mut course = Course::new("CS101", "Intro");
        course.add_enrollment(user.id, None, Utc::now());
        store.insert(&course).unwrap();
        store.insert(&Progress::new(user.id, course.id)).unwrap();

        users.delete(user.id).await.unwrap();

        assert!(store.get::<User>(user.id).unwrap().is_none());
        let course: Course = store.require(course.id).unwrap();
        assert!(course.enrolled_students.is_empty());
        assert!(store.progress_for(user.id, course.id).unwrap().is_none());
    }
}
