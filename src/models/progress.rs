//! Per-student, per-course section completion

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::ids::{CourseId, ProgressId, SectionId, UserId};

/// Completion state of one section
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SectionProgress {
    pub section_id: SectionId,
    /// Position of the section when this entry was last written
    pub module_index: usize,
    pub section_index: usize,
    pub is_completed: bool,
    #[serde(default)]
    pub completion_time: Option<DateTime<Utc>>,
}

/// A stored progress document; at most one per (student, course)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Progress {
    pub id: ProgressId,
    pub student: UserId,
    pub course: CourseId,
    #[serde(default)]
    pub sections: Vec<SectionProgress>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Progress {
    /// Create an empty progress record
    pub fn new(student: UserId, course: CourseId) -> Self {
        let now = Utc::now();
        Self {
            id: ProgressId::new(),
            student,
            course,
            sections: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Entry for a section
    pub fn entry(&self, section: SectionId) -> Option<&SectionProgress> {
        self.sections.iter().find(|e| e.section_id == section)
    }

    /// Set the completion state of a section.
    ///
    /// An existing entry is overwritten in place; the completion time is set on
    /// the transition to completed and cleared on the transition back. A new
    /// entry is appended otherwise. Returns true if anything changed; an
    /// unchanged call leaves the record (including `updated_at`) untouched.
    pub fn set_section(
        &mut self,
        section: SectionId,
        position: (usize, usize),
        is_completed: bool,
        now: DateTime<Utc>,
    ) -> bool {
        let (module_index, section_index) = position;

        let changed = match self.sections.iter_mut().find(|e| e.section_id == section) {
            Some(entry) => {
                let before = entry.clone();
                entry.module_index = module_index;
                entry.section_index = section_index;
                if is_completed {
                    if !entry.is_completed || entry.completion_time.is_none() {
                        entry.completion_time = Some(now);
                    }
                } else {
                    entry.completion_time = None;
                }
                entry.is_completed = is_completed;
                *entry != before
            }
            None => {
                self.sections.push(SectionProgress {
                    section_id: section,
                    module_index,
                    section_index,
                    is_completed,
                    completion_time: is_completed.then_some(now),
                });
                true
            }
        };

        if changed {
            self.updated_at = now;
        }
        changed
    }

    /// Number of completed entries
    pub fn completed_count(&self) -> usize {
        self.sections.iter().filter(|e| e.is_completed).count()
    }

    /// True when at least one entry exists and every entry is completed.
    ///
    /// Entries are not compared against the course's section count.
    pub fn all_recorded_complete(&self) -> bool {
        !self.sections.is_empty() && self.sections.iter().all(|e| e.is_completed)
    }
}

/// Completion derived from an optional progress record
pub fn is_course_complete(progress: Option<&Progress>) -> bool {
    progress.is_some_and(Progress::all_recorded_complete)
}
