//! Loosely typed CRM records
//!
//! CRM payloads are not versioned and field names differ between record
//! kinds and deployments, so each field is looked up through a list of
//! aliases. Strings are trimmed; numbers are accepted where an identifier is
//! expected.

use serde_json::{Map, Value};
use thiserror::Error;

use crate::utils::{normalize_phone, normalize_whitespace};

const COURSE_CODE: &[&str] = &["course_id", "courseId", "code", "course_code", "courseCode", "id"];
const COURSE_TITLE: &[&str] = &["title", "name", "course_name", "courseName"];
const COURSE_DESCRIPTION: &[&str] = &["description", "summary", "details"];

const PERSON_NAME: &[&str] = &["name", "full_name", "fullName", "trainer_name", "lead_name"];
const PERSON_FIRST_NAME: &[&str] = &["first_name", "firstName"];
const PERSON_LAST_NAME: &[&str] = &["last_name", "lastName"];
const PERSON_EMAIL: &[&str] = &["email", "email_id", "emailId", "mail"];
const PERSON_PHONE: &[&str] = &["phone", "phone_number", "phoneNumber", "mobile", "contact"];
const PERSON_EXTERNAL_ID: &[&str] = &["id", "_id", "trainer_id", "trainerId", "lead_id", "leadId"];

const LEAD_COURSE: &[&str] = &["course_id", "courseId", "course_code", "courseCode", "course"];

/// Why a record was skipped
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RecordError {
    #[error("record is not a JSON object")]
    NotAnObject,

    #[error("missing {0}")]
    Missing(&'static str),
}

/// First non-empty value among `aliases`, as a trimmed string
fn field(obj: &Map<String, Value>, aliases: &[&str]) -> Option<String> {
    aliases.iter().find_map(|key| match obj.get(*key)? {
        Value::String(s) => Some(s.trim().to_string()).filter(|s| !s.is_empty()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    })
}

fn as_object(value: &Value) -> Result<&Map<String, Value>, RecordError> {
    value.as_object().ok_or(RecordError::NotAnObject)
}

// ============================================================================
// Courses
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
pub struct CrmCourse {
    pub code: String,
    pub title: String,
    pub description: Option<String>,
}

impl CrmCourse {
    pub fn from_value(value: &Value) -> Result<Self, RecordError> {
        let obj = as_object(value)?;
        let code = field(obj, COURSE_CODE).ok_or(RecordError::Missing("course code"))?;
        let title = field(obj, COURSE_TITLE)
            .map(|t| normalize_whitespace(&t))
            .unwrap_or_else(|| code.clone());

        Ok(Self {
            code,
            title,
            description: field(obj, COURSE_DESCRIPTION),
        })
    }
}

// ============================================================================
// People (trainers and leads)
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
pub struct CrmPerson {
    pub name: String,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub external_id: Option<String>,
}

impl CrmPerson {
    pub fn from_value(value: &Value) -> Result<Self, RecordError> {
        let obj = as_object(value)?;

        let email = field(obj, PERSON_EMAIL);
        let phone = field(obj, PERSON_PHONE)
            .map(|p| normalize_phone(&p))
            .filter(|p| !p.is_empty());
        if email.is_none() && phone.is_none() {
            return Err(RecordError::Missing("email and phone"));
        }

        let name = field(obj, PERSON_NAME)
            .or_else(|| {
                let parts: Vec<String> = [field(obj, PERSON_FIRST_NAME), field(obj, PERSON_LAST_NAME)]
                    .into_iter()
                    .flatten()
                    .collect();
                (!parts.is_empty()).then(|| parts.join(" "))
            })
            .map(|n| normalize_whitespace(&n))
            .or_else(|| email.clone())
            .or_else(|| phone.clone())
            .unwrap_or_default();

        Ok(Self {
            name,
            email,
            phone,
            external_id: field(obj, PERSON_EXTERNAL_ID),
        })
    }

    /// Email to store for this person.
    ///
    /// Users are keyed by email, so a phone-only record gets a placeholder
    /// address under the reserved `.invalid` domain.
    pub fn storage_email(&self) -> String {
        match (&self.email, &self.phone) {
            (Some(email), _) => email.clone(),
            (None, Some(phone)) => format!("phone-{}@crm.invalid", phone.trim_start_matches('+')),
            (None, None) => String::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CrmLead {
    pub person: CrmPerson,
    /// Code of the course the lead is interested in
    pub course_code: Option<String>,
}

impl CrmLead {
    pub fn from_value(value: &Value) -> Result<Self, RecordError> {
        let person = CrmPerson::from_value(value)?;
        let course_code = as_object(value).ok().and_then(|obj| field(obj, LEAD_COURSE));
        Ok(Self {
            person,
            course_code,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_course_aliases() {
        let course = CrmCourse::from_value(&json!({"courseId": " CS101 ", "name": "Intro  to CS"}))
            .unwrap();
        assert_eq!(course.code, "CS101");
        assert_eq!(course.title, "Intro to CS");

        // Numeric id, no title
        let course = CrmCourse::from_value(&json!({"id": 42})).unwrap();
        assert_eq!(course.code, "42");
        assert_eq!(course.title, "42");

        let err = CrmCourse::from_value(&json!({"title": "No code"})).unwrap_err();
        assert_eq!(err, RecordError::Missing("course code"));

        let err = CrmCourse::from_value(&json!("CS101")).unwrap_err();
        assert_eq!(err, RecordError::NotAnObject);
    }

    #[test]
    fn test_person_requires_contact() {
        let err = CrmPerson::from_value(&json!({"name": "Nobody"})).unwrap_err();
        assert_eq!(err, RecordError::Missing("email and phone"));

        let err = CrmPerson::from_value(&json!({"name": "Blank", "email": "  "})).unwrap_err();
        assert_eq!(err, RecordError::Missing("email and phone"));
    }

    #[test]
    fn test_person_name_fallbacks() {
        let person = CrmPerson::from_value(&json!({
            "first_name": "Grace",
            "lastName": "Hopper",
            "mobile": "010-555-0100"
        }))
        .unwrap();
        assert_eq!(person.name, "Grace Hopper");
        assert_eq!(person.phone.as_deref(), Some("0105550100"));
        assert_eq!(person.storage_email(), "phone-0105550100@crm.invalid");

        let person = CrmPerson::from_value(&json!({"email": "x@example.com"})).unwrap();
        assert_eq!(person.name, "x@example.com");
        assert_eq!(person.storage_email(), "x@example.com");
    }

    #[test]
    fn test_lead_course() {
        let lead = CrmLead::from_value(&json!({
            "lead_id": 7,
            "email": "lead@example.com",
            "course_code": "CS101"
        }))
        .unwrap();
        assert_eq!(lead.course_code.as_deref(), Some("CS101"));
        assert_eq!(lead.person.external_id.as_deref(), Some("7"));
    }
}
