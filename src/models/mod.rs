//! Core data structures and types
//!
//! Documents persisted by the store: users, courses (with embedded
//! enrollments and their module/section layout), batches and progress.

mod batch;
mod course;
mod ids;
mod progress;
mod user;

pub use batch::{Batch, BatchFilter, WeeklySchedule};
pub use course::{
    build_layout, Course, CourseFilter, Enrollment, LayoutError, Module, ModuleDraft, Payment,
    PaymentStatus, Section, SectionDraft,
};
pub use ids::{BatchId, CourseId, ParseIdError, ProgressId, SectionId, UserId};
pub use progress::{is_course_complete, Progress, SectionProgress};
pub use user::{normalize_email, Role, User, UserFilter};
