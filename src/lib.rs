//! edutrack - learning-management backend
//!
//! Courses with module/section layouts, student enrollments, batches,
//! per-section progress with completion reconciliation, and a one-way
//! import from an external CRM, served over a REST API.
//!
//! # Architecture
//!
//! The library is organized into several modules:
//!
//! - [`config`] - Configuration management and settings
//! - [`models`] - Core documents: users, courses, batches, progress
//! - [`storage`] - Document repository (SQLite and in-memory) behind [`storage::Store`]
//! - [`services`] - User, course and batch services sharing one store
//! - [`enrollment`] - Enrollment registry and payments
//! - [`progress`] - Section progress tracking and completion reconciliation
//! - [`sync`] - CRM client, record import and sync triggering
//! - [`api`] - REST API server
//! - [`metrics`] - Prometheus metrics
//! - [`utils`] - Common utilities and helpers
//!
//! # Example
//!
//! ```no_run
//! use edutrack::services::Services;
//! use edutrack::storage::Store;
//!
//! #[tokio::main]
//! async fn main() -> edutrack::Result<()> {
//!     let services = Services::new(Store::sqlite("data/edutrack.db")?);
//!     let reports = services.reconciler.reconcile_all().await?;
//!     println!("reconciled {} courses", reports.len());
//!     Ok(())
//! }
//! ```

pub mod api;
pub mod config;
pub mod enrollment;
pub mod error;
pub mod metrics;
pub mod models;
pub mod progress;
pub mod services;
pub mod storage;
pub mod sync;
pub mod utils;

/// Re-export commonly used types
pub mod prelude {
    pub use crate::config::Config;
    pub use crate::error::{EdutrackErrorTrait, Error, ErrorCategory, Result};
    pub use crate::models::{
        Batch, BatchId, Course, CourseId, Enrollment, Progress, Role, SectionId, User, UserId,
    };
    pub use crate::services::Services;
    pub use crate::storage::Store;
}

// Direct re-exports for convenience
pub use error::{Error, Result};
