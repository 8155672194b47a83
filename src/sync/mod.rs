//! External CRM synchronization
//!
//! - [`client`]: HTTP access to the CRM record endpoints
//! - [`records`]: alias-tolerant parsing of CRM records
//! - [`job`]: the lease-guarded import run
//! - [`trigger`]: interval and on-demand triggering

pub mod client;
pub mod error;
pub mod job;
pub mod records;
pub mod trigger;

pub use client::{CrmClient, CrmClientConfig};
pub use error::SyncError;
pub use job::{KindReport, RecordIssue, SyncJob, SyncOutcome, SyncReport, SYNC_LEASE};
pub use trigger::{SyncEvent, SyncTrigger, TriggerSource, TriggerStatus};
