//! Batches: scheduled cohorts of students under a course

use chrono::{DateTime, NaiveDate, NaiveTime, Utc, Weekday};
use serde::{Deserialize, Serialize};

use super::ids::{BatchId, CourseId, UserId};

/// Weekly recurrence of batch sessions
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeeklySchedule {
    /// Days of the week the batch meets
    pub days: Vec<Weekday>,
    pub start_time: NaiveTime,
    pub end_time: NaiveTime,
    pub start_date: NaiveDate,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_date: Option<NaiveDate>,
    #[serde(default = "default_timezone")]
    pub timezone: String,
}

fn default_timezone() -> String {
    "UTC".to_string()
}

impl WeeklySchedule {
    /// Check the schedule for internal consistency
    pub fn validate(&self) -> Result<(), String> {
        if self.days.is_empty() {
            return Err("schedule must include at least one weekday".to_string());
        }
        if self.end_time <= self.start_time {
            return Err(format!(
                "end_time {} must be after start_time {}",
                self.end_time, self.start_time
            ));
        }
        if let Some(end) = self.end_date {
            if end < self.start_date {
                return Err(format!(
                    "end_date {end} must not be before start_date {}",
                    self.start_date
                ));
            }
        }
        if self.timezone.trim().is_empty() {
            return Err("timezone cannot be empty".to_string());
        }
        Ok(())
    }

    /// Check whether a session happens on the given date
    pub fn meets_on(&self, date: NaiveDate) -> bool {
        use chrono::Datelike;

        date >= self.start_date
            && self.end_date.map_or(true, |end| date <= end)
            && self.days.contains(&date.weekday())
    }
}

/// A stored batch document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Batch {
    pub id: BatchId,
    pub name: String,
    pub course: CourseId,
    #[serde(default)]
    pub students: Vec<UserId>,
    pub instructors: Vec<UserId>,
    pub schedule: WeeklySchedule,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Batch {
    pub fn new(
        name: impl Into<String>,
        course: CourseId,
        instructors: Vec<UserId>,
        schedule: WeeklySchedule,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: BatchId::new(),
            name: name.into(),
            course,
            students: Vec::new(),
            instructors,
            schedule,
            created_at: now,
            updated_at: now,
        }
    }

    /// Add a student; returns true if the student was missing
    pub fn add_student(&mut self, student: UserId) -> bool {
        if self.students.contains(&student) {
            return false;
        }
        self.students.push(student);
        true
    }

    /// Remove a student; returns true if the student was present
    pub fn remove_student(&mut self, student: UserId) -> bool {
        let before = self.students.len();
        self.students.retain(|s| *s != student);
        before != self.students.len()
    }
}

/// Filter for listing batches
#[derive(Debug, Clone, Default, Deserialize)]
pub struct BatchFilter {
    pub course: Option<CourseId>,
    pub student: Option<UserId>,
    pub instructor: Option<UserId>,
}

impl BatchFilter {
    /// Batches of a single course
    pub fn for_course(course: CourseId) -> Self {
        Self {
            course: Some(course),
            ..Default::default()
        }
    }

    /// Check whether a batch matches the filter
    pub fn matches(&self, batch: &Batch) -> bool {
        self.course.map_or(true, |c| batch.course == c)
            && self.student.map_or(true, |s| batch.students.contains(&s))
            && self.instructor.map_or(true, |i| batch.instructors.contains(&i))
    }
}
