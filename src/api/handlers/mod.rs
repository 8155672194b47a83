//! Route handlers, one module per resource

pub mod batches;
pub mod courses;
pub mod progress;
pub mod system;
pub mod users;

use serde::Serialize;

/// Body returned by DELETE routes
#[derive(Debug, Serialize)]
pub struct Deleted {
    pub id: String,
    pub deleted: bool,
}

impl Deleted {
    pub fn new(id: impl ToString) -> Self {
        Self {
            id: id.to_string(),
            deleted: true,
        }
    }
}
