//! Progress tracking and completion reconciliation

pub mod reconciler;
pub mod tracker;

pub use reconciler::{ReconcileReport, Reconciler};
pub use tracker::{CourseReport, ProgressTracker, StudentProgress};
