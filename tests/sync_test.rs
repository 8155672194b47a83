//! CRM sync against a mock CRM server

mod common;

use std::time::Duration;

use common::{create_course, mock_services, sqlite_services};
use edutrack::error::Error;
use edutrack::models::{Course, Role, User, UserFilter};
use edutrack::services::Services;
use edutrack::sync::{CrmClient, CrmClientConfig, SyncJob, SyncOutcome, SyncReport};
use edutrack::utils::retry::RetryConfig;
use serde_json::{json, Value};
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

async fn mount(server: &MockServer, endpoint: &str, body: Value) {
    Mock::given(method("GET"))
        .and(path(format!("/api/{endpoint}")))
        .respond_with(ResponseTemplate::new(200).set_body_json(body))
        .mount(server)
        .await;
}

fn job(server: &MockServer, services: &Services) -> SyncJob {
    let config = CrmClientConfig::new(format!("{}/api", server.uri()))
        .with_api_key("crm-key")
        .with_timeout(Duration::from_secs(5))
        .with_retry(RetryConfig::with_delays(1, 10, 20));
    let client = CrmClient::new(config).unwrap();
    SyncJob::new(services.clone(), client, chrono::Duration::seconds(60))
}

fn completed(outcome: SyncOutcome) -> SyncReport {
    match outcome {
        SyncOutcome::Completed(report) => report,
        SyncOutcome::Skipped => panic!("sync unexpectedly skipped"),
    }
}

async fn standard_crm() -> MockServer {
    let server = MockServer::start().await;
    mount(
        &server,
        "courses",
        json!([
            {"course_id": "CS101", "name": "Intro to CS"},
            {"code": "MA201", "title": "Linear Algebra"},
            {"title": "missing code"}
        ]),
    )
    .await;
    mount(
        &server,
        "trainers",
        json!({"data": [
            {"trainer_name": "Grace Hopper", "email": "grace@example.com"},
            {"name": "Phone Only", "phone": "+1 555 0100"}
        ]}),
    )
    .await;
    mount(
        &server,
        "leads",
        json!({"results": [
            {"lead_name": "Alan", "email": "alan@example.com", "course_id": "CS101"},
            {"firstName": "Barbara", "lastName": "Liskov", "email": "barbara@example.com"},
            {"name": "No contact"}
        ]}),
    )
    .await;
    server
}

#[tokio::test]
async fn test_sync_imports_and_is_idempotent() {
    for services in [sqlite_services(), mock_services()] {
        let server = standard_crm().await;
        let job = job(&server, &services);

        let first = completed(job.run().await.unwrap());
        assert_eq!(first.courses.created, 2);
        assert_eq!(first.courses.skipped, 1);
        assert_eq!(first.instructors.created, 2);
        assert_eq!(first.students.created, 2);
        assert_eq!(first.students.skipped, 1);
        assert_eq!(first.enrollments.created, 1);
        assert_eq!(first.errors.len(), 2);

        let second = completed(job.run().await.unwrap());
        assert_eq!(second.total_created(), 0);
        assert_eq!(second.courses.existing, 2);
        assert_eq!(second.instructors.existing, 2);
        assert_eq!(second.students.existing, 2);
        assert_eq!(second.enrollments.created, 0);
        assert_eq!(second.enrollments.existing, 1);

        let users = services.users.list(&UserFilter::default()).unwrap();
        assert_eq!(users.len(), 4);
        let courses: Vec<Course> = services.store.list().unwrap();
        assert_eq!(courses.len(), 2);

        let cs101 = services.store.course_by_code("CS101").unwrap().unwrap();
        let alan: User = services.store.user_by_email("alan@example.com").unwrap().unwrap();
        assert!(cs101.is_enrolled(alan.id));
        assert!(alan.is_enrolled_in(cs101.id));
        assert_eq!(alan.role, Role::Student);

        let phone_only = services.store.user_by_phone("+15550100").unwrap().unwrap();
        assert_eq!(phone_only.role, Role::Instructor);
    }
}

#[tokio::test]
async fn test_sync_never_modifies_existing_records() {
    let services = mock_services();
    let existing = create_course(&services, "CS101", &[1]);
    let server = standard_crm().await;

    completed(job(&server, &services).run().await.unwrap());

    let stored = services.courses.get(existing.id).unwrap();
    assert_eq!(stored.title, existing.title);
    assert_eq!(stored.modules, existing.modules);
}

#[tokio::test]
async fn test_fetch_failure_aborts_without_writes() {
    let services = mock_services();
    let server = MockServer::start().await;
    mount(&server, "courses", json!([{"code": "CS101"}])).await;
    mount(&server, "trainers", json!([])).await;
    Mock::given(method("GET"))
        .and(path("/api/leads"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;

    let err = job(&server, &services).run().await.unwrap_err();
    assert!(matches!(err, Error::Sync(_)));

    let courses: Vec<Course> = services.store.list().unwrap();
    assert!(courses.is_empty());

    // The lease is released after a failed run
    assert!(services
        .store
        .try_acquire_lease(edutrack::sync::SYNC_LEASE, "other-node", chrono::Duration::seconds(5))
        .unwrap());
}

#[tokio::test]
async fn test_overlapping_runs_of_one_job_are_excluded() {
    let services = mock_services();
    let server = MockServer::start().await;
    for endpoint in ["courses", "trainers", "leads"] {
        Mock::given(method("GET"))
            .and(path(format!("/api/{endpoint}")))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!([]))
                    .set_delay(Duration::from_millis(300)),
            )
            .mount(&server)
            .await;
    }

    let job = job(&server, &services);
    let (a, b) = tokio::join!(job.run(), job.run());
    let outcomes = [a.unwrap(), b.unwrap()];

    let skipped = outcomes
        .iter()
        .filter(|o| matches!(o, SyncOutcome::Skipped))
        .count();
    assert_eq!(skipped, 1);

    // Lease is free again once the winning run finishes
    assert!(matches!(job.run().await.unwrap(), SyncOutcome::Completed(_)));
}

#[tokio::test]
async fn test_client_sends_api_key_and_rejects_bad_payload() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/courses"))
        .and(header("authorization", "Bearer crm-key"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"items": [{"code": "X"}]})))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/trainers"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"count": 0})))
        .mount(&server)
        .await;

    let config = CrmClientConfig::new(format!("{}/api", server.uri())).with_api_key("crm-key");
    let client = CrmClient::new(config).unwrap();

    let courses = client.fetch_courses().await.unwrap();
    assert_eq!(courses.len(), 1);
    assert!(client.fetch_trainers().await.is_err());
}

#[tokio::test]
async fn test_not_found_is_not_retried() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/courses"))
        .respond_with(ResponseTemplate::new(404))
        .expect(1)
        .mount(&server)
        .await;

    let config = CrmClientConfig::new(format!("{}/api", server.uri()))
        .with_retry(RetryConfig::with_delays(3, 10, 20));
    let client = CrmClient::new(config).unwrap();
    assert!(client.fetch_courses().await.is_err());
}
