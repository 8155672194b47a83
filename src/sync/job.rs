//! One-way CRM import
//!
//! Pulls courses, trainers and leads and creates the local records that do
//! not exist yet. Existing users and courses are never modified; the only
//! relationship written is the enrollment of a lead into the course it names.
//! Runs are guarded by a store lease, so overlapping triggers (from this or
//! another process sharing the database) become no-ops.

use std::time::Instant;

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use serde_json::Value;
use tracing::{info, info_span, warn, Instrument};
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::metrics;
use crate::models::{Role, User};
use crate::services::{NewCourse, NewUser, Services};

use super::client::CrmClient;
use super::records::{CrmCourse, CrmLead, CrmPerson};

/// Lease name shared by every sync runner
pub const SYNC_LEASE: &str = "crm-sync";

/// Counters for one record kind
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct KindReport {
    /// Records returned by the CRM
    pub fetched: usize,
    /// Local records created
    pub created: usize,
    /// Records that matched an existing local record
    pub existing: usize,
    /// Records rejected as invalid or failing to import
    pub skipped: usize,
}

/// A record that could not be imported
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RecordIssue {
    pub kind: &'static str,
    /// Position in the fetched list
    pub index: usize,
    pub reason: String,
}

/// Result of a completed sync run
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SyncReport {
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub courses: KindReport,
    pub instructors: KindReport,
    pub students: KindReport,
    /// `created` counts new enrollments of leads into their course
    pub enrollments: KindReport,
    pub errors: Vec<RecordIssue>,
}

impl SyncReport {
    fn new(started_at: DateTime<Utc>) -> Self {
        Self {
            started_at,
            finished_at: started_at,
            courses: KindReport::default(),
            instructors: KindReport::default(),
            students: KindReport::default(),
            enrollments: KindReport::default(),
            errors: Vec::new(),
        }
    }

    fn issue(&mut self, kind: &'static str, index: usize, reason: impl ToString) {
        let reason = reason.to_string();
        warn!(kind, index, reason = %reason, "CRM record skipped");
        self.errors.push(RecordIssue {
            kind,
            index,
            reason,
        });
    }

    /// Total records created across kinds
    pub fn total_created(&self) -> usize {
        self.courses.created + self.instructors.created + self.students.created
    }
}

/// Outcome of a sync trigger
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum SyncOutcome {
    Completed(SyncReport),
    /// Another run held the lease
    Skipped,
}

/// Whether a person lookup created a user
enum Resolved {
    Created(User),
    Existing(User),
}

pub struct SyncJob {
    services: Services,
    client: CrmClient,
    lease_ttl: Duration,
}

impl SyncJob {
    pub fn new(services: Services, client: CrmClient, lease_ttl: Duration) -> Self {
        Self {
            services,
            client,
            lease_ttl,
        }
    }

    /// Run once unless another run holds the lease
    ///
    /// Every run takes the lease under its own holder token, so two runs of
    /// the same job exclude each other just like runs in other processes.
    pub async fn run(&self) -> Result<SyncOutcome> {
        let store = &self.services.store;
        let holder = format!("sync-{}", Uuid::new_v4());
        if !store.try_acquire_lease(SYNC_LEASE, &holder, self.lease_ttl)? {
            info!("CRM sync already running elsewhere, skipping");
            metrics::record_sync_run("skipped", None);
            return Ok(SyncOutcome::Skipped);
        }

        let timer = Instant::now();
        let span = info_span!("crm_sync", holder = %holder);
        let result = self.run_locked().instrument(span).await;

        if let Err(e) = store.release_lease(SYNC_LEASE, &holder) {
            warn!(error = %e, "Failed to release sync lease");
        }

        match result {
            Ok(report) => {
                metrics::record_sync_run("completed", Some(timer.elapsed().as_secs_f64()));
                info!(
                    created = report.total_created(),
                    enrollments = report.enrollments.created,
                    errors = report.errors.len(),
                    "CRM sync completed"
                );
                Ok(SyncOutcome::Completed(report))
            }
            Err(e) => {
                metrics::record_sync_run("failed", None);
                warn!(error = %e, "CRM sync failed");
                Err(e)
            }
        }
    }

    async fn run_locked(&self) -> Result<SyncReport> {
        let mut report = SyncReport::new(Utc::now());

        // Fetch everything first so a failing endpoint leaves no partial import
        let courses = self.client.fetch_courses().await?;
        let trainers = self.client.fetch_trainers().await?;
        let leads = self.client.fetch_leads().await?;

        self.import_courses(&courses, &mut report);
        self.import_trainers(&trainers, &mut report);
        self.import_leads(&leads, &mut report).await;

        for (kind, counts) in [
            ("courses", &report.courses),
            ("instructors", &report.instructors),
            ("students", &report.students),
            ("enrollments", &report.enrollments),
        ] {
            metrics::record_sync_records(kind, counts.created, counts.skipped);
        }

        report.finished_at = Utc::now();
        Ok(report)
    }

    fn import_courses(&self, records: &[Value], report: &mut SyncReport) {
        report.courses.fetched = records.len();

        for (index, value) in records.iter().enumerate() {
            let record = match CrmCourse::from_value(value) {
                Ok(record) => record,
                Err(e) => {
                    report.courses.skipped += 1;
                    report.issue("course", index, e);
                    continue;
                }
            };

            match self.create_course(record) {
                Ok(true) => report.courses.created += 1,
                Ok(false) => report.courses.existing += 1,
                Err(e) => {
                    report.courses.skipped += 1;
                    report.issue("course", index, e);
                }
            }
        }
    }

    fn create_course(&self, record: CrmCourse) -> Result<bool> {
        if self.services.store.course_by_code(&record.code)?.is_some() {
            return Ok(false);
        }

        let created = self.services.courses.create(NewCourse {
            code: record.code,
            title: record.title,
            description: record.description,
            instructors: Vec::new(),
            modules: Vec::new(),
        });
        match created {
            Ok(_) => Ok(true),
            // Created concurrently by another writer
            Err(Error::Conflict(_)) => Ok(false),
            Err(e) => Err(e),
        }
    }

    fn import_trainers(&self, records: &[Value], report: &mut SyncReport) {
        report.instructors.fetched = records.len();

        for (index, value) in records.iter().enumerate() {
            let person = match CrmPerson::from_value(value) {
                Ok(person) => person,
                Err(e) => {
                    report.instructors.skipped += 1;
                    report.issue("instructor", index, e);
                    continue;
                }
            };

            match self.resolve_person(person, Role::Instructor) {
                Ok(Resolved::Created(_)) => report.instructors.created += 1,
                Ok(Resolved::Existing(_)) => report.instructors.existing += 1,
                Err(e) => {
                    report.instructors.skipped += 1;
                    report.issue("instructor", index, e);
                }
            }
        }
    }

    async fn import_leads(&self, records: &[Value], report: &mut SyncReport) {
        report.students.fetched = records.len();

        for (index, value) in records.iter().enumerate() {
            let lead = match CrmLead::from_value(value) {
                Ok(lead) => lead,
                Err(e) => {
                    report.students.skipped += 1;
                    report.issue("student", index, e);
                    continue;
                }
            };

            let user = match self.resolve_person(lead.person, Role::Student) {
                Ok(Resolved::Created(user)) => {
                    report.students.created += 1;
                    user
                }
                Ok(Resolved::Existing(user)) => {
                    report.students.existing += 1;
                    user
                }
                Err(e) => {
                    report.students.skipped += 1;
                    report.issue("student", index, e);
                    continue;
                }
            };

            if let Some(code) = lead.course_code {
                match self.enroll_lead(&user, &code).await {
                    Ok(Some(true)) => report.enrollments.created += 1,
                    Ok(Some(false)) => report.enrollments.existing += 1,
                    Ok(None) => {}
                    Err(e) => {
                        report.enrollments.skipped += 1;
                        report.issue("enrollment", index, e);
                    }
                }
            }
        }
    }

    /// Find a user by email, then phone; create one with `role` if neither matches
    fn resolve_person(&self, person: CrmPerson, role: Role) -> Result<Resolved> {
        let store = &self.services.store;

        if let Some(email) = &person.email {
            if let Some(user) = store.user_by_email(email)? {
                return Ok(Resolved::Existing(user));
            }
        }
        if let Some(phone) = &person.phone {
            if let Some(user) = store.user_by_phone(phone)? {
                return Ok(Resolved::Existing(user));
            }
        }

        let email = person.storage_email();
        let created = self.services.users.create(NewUser {
            name: person.name,
            email: email.clone(),
            phone: person.phone,
            role,
            external_id: person.external_id,
        });
        match created {
            Ok(user) => Ok(Resolved::Created(user)),
            Err(Error::Conflict(_)) => store
                .user_by_email(&email)?
                .map(Resolved::Existing)
                .ok_or_else(|| Error::conflict(format!("user '{email}' already exists"))),
            Err(e) => Err(e),
        }
    }

    /// Enroll a student lead into the named course.
    ///
    /// Returns `None` when the course is unknown locally or the user is not a
    /// student, otherwise whether a new enrollment was created.
    async fn enroll_lead(&self, user: &User, code: &str) -> Result<Option<bool>> {
        let Some(course) = self.services.store.course_by_code(code)? else {
            return Ok(None);
        };
        if user.role != Role::Student {
            return Ok(None);
        }

        let already = course.is_enrolled(user.id);
        self.services.enrollment.enroll(user.id, course.id, None).await?;
        Ok(Some(!already))
    }
}

impl std::fmt::Debug for SyncJob {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncJob")
            .field("lease_ttl", &self.lease_ttl)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Course;
    use crate::storage::Store;
    use crate::sync::client::CrmClientConfig;

    fn job(services: &Services) -> SyncJob {
        // Never contacted by these tests
        let client = CrmClient::new(CrmClientConfig::new("http://127.0.0.1:9")).unwrap();
        SyncJob::new(services.clone(), client, Duration::seconds(60))
    }

    #[test]
    fn test_import_courses_dedups_by_code() {
        let services = Services::new(Store::in_memory());
        services.store.insert(&Course::new("CS101", "Existing")).unwrap();
        let job = job(&services);

        let mut report = SyncReport::new(Utc::now());
        let records = vec![
            serde_json::json!({"code": "CS101", "title": "Dup"}),
            serde_json::json!({"course_id": "CS102", "name": "New"}),
            serde_json::json!({"title": "no code"}),
        ];
        job.import_courses(&records, &mut report);

        assert_eq!(report.courses.created, 1);
        assert_eq!(report.courses.existing, 1);
        assert_eq!(report.courses.skipped, 1);
        assert_eq!(report.errors.len(), 1);

        let stored = services.store.course_by_code("CS101").unwrap().unwrap();
        assert_eq!(stored.title, "Existing");
    }

    #[test]
    fn test_resolve_person_falls_back_to_phone() {
        let services = Services::new(Store::in_memory());
        let existing = User::new("Lee", "lee@example.com", Role::Instructor).with_phone("010-1234");
        services.store.insert(&existing).unwrap();
        let job = job(&services);

        let person = CrmPerson {
            name: "Lee".to_string(),
            email: None,
            phone: Some("0101234".to_string()),
            external_id: None,
        };
        match job.resolve_person(person, Role::Instructor).unwrap() {
            Resolved::Existing(user) => assert_eq!(user.id, existing.id),
            Resolved::Created(_) => panic!("expected phone match"),
        }
    }

    #[tokio::test]
    async fn test_run_skips_when_lease_held() {
        let services = Services::new(Store::in_memory());
        services
            .store
            .try_acquire_lease(SYNC_LEASE, "someone-else", Duration::seconds(60))
            .unwrap();

        let outcome = job(&services).run().await.unwrap();
        assert_eq!(outcome, SyncOutcome::Skipped);
    }
}
