use anyhow::{Context, Result};

use edutrack::config::Config;
use edutrack::models::CourseId;

use super::open_services;

/// Recompute completion flags for one course or all of them
pub async fn reconcile(config: Config, course: Option<String>) -> Result<()> {
    let services = open_services(&config)?;

    let reports = match course {
        Some(raw) => {
            let id: CourseId = raw.parse().context("Invalid course id")?;
            vec![services.reconciler.reconcile(id).await?]
        }
        None => services.reconciler.reconcile_all().await?,
    };

    for report in &reports {
        println!(
            "{}: {} evaluated, {} complete, {} changed",
            report.course, report.evaluated, report.completed, report.changed
        );
    }
    println!("Reconciled {} course(s).", reports.len());
    Ok(())
}
