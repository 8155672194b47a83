//! Users and roles

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::ids::{CourseId, UserId};

/// Role of a user; gates which API operations are allowed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Admin,
    Instructor,
    Student,
}

impl Role {
    /// Convert to string representation
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Admin => "admin",
            Role::Instructor => "instructor",
            Role::Student => "student",
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "admin" => Ok(Role::Admin),
            "instructor" | "trainer" => Ok(Role::Instructor),
            "student" => Ok(Role::Student),
            other => Err(format!("unknown role '{other}'")),
        }
    }
}

/// A stored user document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
    pub name: String,
    /// Always stored lowercase
    pub email: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    pub role: Role,
    #[serde(default)]
    pub enrolled_courses: Vec<CourseId>,
    /// Identifier in the external CRM, when the user was imported
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub external_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl User {
    /// Create a new user; the email is normalized to lowercase
    pub fn new(name: impl Into<String>, email: impl AsRef<str>, role: Role) -> Self {
        let now = Utc::now();
        Self {
            id: UserId::new(),
            name: name.into(),
            email: normalize_email(email.as_ref()),
            phone: None,
            role,
            enrolled_courses: Vec::new(),
            external_id: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Set the phone number
    pub fn with_phone(mut self, phone: impl Into<String>) -> Self {
        self.phone = Some(phone.into());
        self
    }

    /// Check whether the user is enrolled in the course
    pub fn is_enrolled_in(&self, course: CourseId) -> bool {
        self.enrolled_courses.contains(&course)
    }

    /// Add a course to the enrolled list; returns true if it was missing
    pub fn add_enrolled_course(&mut self, course: CourseId) -> bool {
        if self.is_enrolled_in(course) {
            return false;
        }
        self.enrolled_courses.push(course);
        true
    }

    /// Remove a course from the enrolled list; returns true if it was present
    pub fn remove_enrolled_course(&mut self, course: CourseId) -> bool {
        let before = self.enrolled_courses.len();
        self.enrolled_courses.retain(|c| *c != course);
        before != self.enrolled_courses.len()
    }
}

/// Normalize an email address for storage and lookup
pub fn normalize_email(email: &str) -> String {
    email.trim().to_ascii_lowercase()
}

/// Filter for listing users
#[derive(Debug, Clone, Default, Deserialize)]
pub struct UserFilter {
    pub role: Option<Role>,
}

impl UserFilter {
    /// Check whether a user matches the filter
    pub fn matches(&self, user: &User) -> bool {
        self.role.map_or(true, |role| user.role == role)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_email_normalized() {
        let user = User::new("Ada", "  Ada@Example.COM ", Role::Student);
        assert_eq!(user.email, "ada@example.com");
    }

    #[test]
    fn test_role_parse_accepts_trainer_alias() {
        assert_eq!("Trainer".parse::<Role>().unwrap(), Role::Instructor);
        assert!("mentor".parse::<Role>().is_err());
    }

    #[test]
    fn test_enrolled_courses_dedup() {
        let mut user = User::new("Ada", "ada@example.com", Role::Student);
        let course = CourseId::new();
        assert!(user.add_enrolled_course(course));
        assert!(!user.add_enrolled_course(course));
        assert_eq!(user.enrolled_courses.len(), 1);
        assert!(user.remove_enrolled_course(course));
        assert!(!user.remove_enrolled_course(course));
    }

    #[test]
    fn test_filter_by_role() {
        let filter = UserFilter {
            role: Some(Role::Instructor),
        };
        assert!(!filter.matches(&User::new("a", "a@x.io", Role::Student)));
        assert!(filter.matches(&User::new("b", "b@x.io", Role::Instructor)));
        assert!(UserFilter::default().matches(&User::new("c", "c@x.io", Role::Admin)));
    }
}
