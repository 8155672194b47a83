//! Courses, their module/section layout and embedded enrollments

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::ids::{BatchId, CourseId, SectionId, UserId};

// ============================================================================
// Layout
// ============================================================================

/// Smallest unit of course content
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Section {
    pub id: SectionId,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
}

/// Ordered group of sections
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Module {
    pub title: String,
    #[serde(default)]
    pub sections: Vec<Section>,
}

/// Section as submitted by an author; `id` is present when editing an existing section
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SectionDraft {
    #[serde(default)]
    pub id: Option<SectionId>,
    pub title: String,
    #[serde(default)]
    pub content: Option<String>,
}

/// Module as submitted by an author
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ModuleDraft {
    pub title: String,
    #[serde(default)]
    pub sections: Vec<SectionDraft>,
}

impl ModuleDraft {
    /// Module whose sections have the given titles and no content
    pub fn titled(title: impl Into<String>, sections: &[&str]) -> Self {
        Self {
            title: title.into(),
            sections: sections
                .iter()
                .map(|t| SectionDraft {
                    id: None,
                    title: (*t).to_string(),
                    content: None,
                })
                .collect(),
        }
    }
}

/// Reasons a submitted layout is rejected
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LayoutError {
    #[error("module {0} has an empty title")]
    EmptyModuleTitle(usize),

    #[error("section {section} of module {module} has an empty title")]
    EmptySectionTitle { module: usize, section: usize },

    #[error("section id {0} does not belong to this course")]
    UnknownSection(SectionId),

    #[error("section id {0} appears more than once")]
    DuplicateSection(SectionId),
}

/// Build a module layout from drafts.
///
/// Sections resubmitted with an id keep it; the id must be one of `known`.
/// Sections without an id get a fresh one.
pub fn build_layout(
    drafts: Vec<ModuleDraft>,
    known: &HashSet<SectionId>,
) -> Result<Vec<Module>, LayoutError> {
    let mut seen = HashSet::new();
    let mut modules = Vec::with_capacity(drafts.len());

    for (m, draft) in drafts.into_iter().enumerate() {
        if draft.title.trim().is_empty() {
            return Err(LayoutError::EmptyModuleTitle(m));
        }

        let mut sections = Vec::with_capacity(draft.sections.len());
        for (s, section) in draft.sections.into_iter().enumerate() {
            if section.title.trim().is_empty() {
                return Err(LayoutError::EmptySectionTitle { module: m, section: s });
            }
            let id = match section.id {
                Some(id) if !known.contains(&id) => return Err(LayoutError::UnknownSection(id)),
                Some(id) => id,
                None => SectionId::new(),
            };
            if !seen.insert(id) {
                return Err(LayoutError::DuplicateSection(id));
            }
            sections.push(Section {
                id,
                title: section.title.trim().to_string(),
                content: section.content,
            });
        }

        modules.push(Module {
            title: draft.title.trim().to_string(),
            sections,
        });
    }

    Ok(modules)
}

// ============================================================================
// Enrollment
// ============================================================================

/// Payment state of an enrollment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PaymentStatus {
    #[default]
    Pending,
    Paid,
    Refunded,
    Waived,
}

/// Payment sub-fields of an enrollment
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Payment {
    #[serde(default)]
    pub status: PaymentStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub amount: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub currency: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reference: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub paid_at: Option<DateTime<Utc>>,
}

/// A student's membership in a course
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Enrollment {
    pub student: UserId,
    pub enrolled_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub batch: Option<BatchId>,
    /// Derived flag, written only by the completion reconciler
    #[serde(default)]
    pub completed: bool,
    #[serde(default)]
    pub payment: Payment,
}

impl Enrollment {
    pub fn new(student: UserId, batch: Option<BatchId>, at: DateTime<Utc>) -> Self {
        Self {
            student,
            enrolled_at: at,
            batch,
            completed: false,
            payment: Payment::default(),
        }
    }
}

// ============================================================================
// Course
// ============================================================================

/// A stored course document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Course {
    pub id: CourseId,
    /// External course identifier; unique
    pub code: String,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default)]
    pub instructors: Vec<UserId>,
    #[serde(default)]
    pub modules: Vec<Module>,
    #[serde(default)]
    pub enrolled_students: Vec<Enrollment>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Course {
    /// Create an empty course
    pub fn new(code: impl Into<String>, title: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: CourseId::new(),
            code: code.into(),
            title: title.into(),
            description: None,
            instructors: Vec::new(),
            modules: Vec::new(),
            enrolled_students: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Total number of sections across all modules
    pub fn section_count(&self) -> usize {
        self.modules.iter().map(|m| m.sections.len()).sum()
    }

    /// All section ids currently in the layout
    pub fn section_ids(&self) -> HashSet<SectionId> {
        self.modules
            .iter()
            .flat_map(|m| m.sections.iter().map(|s| s.id))
            .collect()
    }

    /// Resolve a zero-based (module, section) position to its section id
    pub fn section_at(&self, module_index: usize, section_index: usize) -> Option<SectionId> {
        self.modules
            .get(module_index)
            .and_then(|m| m.sections.get(section_index))
            .map(|s| s.id)
    }

    /// Current position of a section, if it is still part of the layout
    pub fn position_of(&self, section: SectionId) -> Option<(usize, usize)> {
        self.modules.iter().enumerate().find_map(|(m, module)| {
            module
                .sections
                .iter()
                .position(|s| s.id == section)
                .map(|s| (m, s))
        })
    }

    /// Enrollment entry of a student
    pub fn enrollment(&self, student: UserId) -> Option<&Enrollment> {
        self.enrolled_students.iter().find(|e| e.student == student)
    }

    /// Mutable enrollment entry of a student
    pub fn enrollment_mut(&mut self, student: UserId) -> Option<&mut Enrollment> {
        self.enrolled_students.iter_mut().find(|e| e.student == student)
    }

    /// Check whether a student is enrolled
    pub fn is_enrolled(&self, student: UserId) -> bool {
        self.enrollment(student).is_some()
    }

    /// Append an enrollment unless the student already has one; returns true if appended
    pub fn add_enrollment(
        &mut self,
        student: UserId,
        batch: Option<BatchId>,
        at: DateTime<Utc>,
    ) -> bool {
        if self.is_enrolled(student) {
            return false;
        }
        self.enrolled_students.push(Enrollment::new(student, batch, at));
        true
    }

    /// Remove a student's enrollment; returns the removed entry
    pub fn remove_enrollment(&mut self, student: UserId) -> Option<Enrollment> {
        let idx = self
            .enrolled_students
            .iter()
            .position(|e| e.student == student)?;
        Some(self.enrolled_students.remove(idx))
    }
}

/// Filter for listing courses
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CourseFilter {
    pub instructor: Option<UserId>,
    pub student: Option<UserId>,
}

impl CourseFilter {
    /// Check whether a course matches the filter
    pub fn matches(&self, course: &Course) -> bool {
        self.instructor
            .map_or(true, |i| course.instructors.contains(&i))
            && self.student.map_or(true, |s| course.is_enrolled(s))
    }
}
