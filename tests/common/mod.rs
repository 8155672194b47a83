//! Common test utilities

#![allow(dead_code)]

use chrono::{NaiveDate, NaiveTime, Weekday};
use edutrack::models::{Course, ModuleDraft, Role, User, WeeklySchedule};
use edutrack::services::{NewCourse, NewUser, Services};
use edutrack::storage::Store;

/// Services over a fresh SQLite in-memory database
pub fn sqlite_services() -> Services {
    Services::new(Store::sqlite_in_memory().unwrap())
}

/// Services over the in-memory mock repository
pub fn mock_services() -> Services {
    Services::new(Store::in_memory())
}

/// One set of services per storage backend
pub fn all_backends() -> Vec<(&'static str, Services)> {
    vec![("sqlite", sqlite_services()), ("mock", mock_services())]
}

pub fn create_user(services: &Services, name: &str, role: Role) -> User {
    services
        .users
        .create(NewUser {
            name: name.to_string(),
            email: format!("{}@example.com", name.to_lowercase()),
            phone: None,
            role,
            external_id: None,
        })
        .unwrap()
}

pub fn create_student(services: &Services, name: &str) -> User {
    create_user(services, name, Role::Student)
}

/// Course with one module per entry of `modules`, each holding that many sections
pub fn create_course(services: &Services, code: &str, modules: &[usize]) -> Course {
    let modules = modules
        .iter()
        .enumerate()
        .map(|(m, count)| {
            let titles: Vec<String> = (0..*count).map(|s| format!("Section {m}.{s}")).collect();
            let titles: Vec<&str> = titles.iter().map(String::as_str).collect();
            ModuleDraft::titled(format!("Module {m}"), &titles)
        })
        .collect();

    services
        .courses
        .create(NewCourse {
            code: code.to_string(),
            title: format!("{code} course"),
            description: None,
            instructors: Vec::new(),
            modules,
        })
        .unwrap()
}

pub fn weekly_schedule() -> WeeklySchedule {
    WeeklySchedule {
        days: vec![Weekday::Mon, Weekday::Wed],
        start_time: NaiveTime::from_hms_opt(18, 0, 0).unwrap(),
        end_time: NaiveTime::from_hms_opt(20, 0, 0).unwrap(),
        start_date: NaiveDate::from_ymd_opt(2026, 1, 5).unwrap(),
        end_date: None,
        timezone: "UTC".to_string(),
    }
}
