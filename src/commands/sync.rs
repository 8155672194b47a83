use anyhow::{Context, Result};

use edutrack::api::server::build_sync_trigger;
use edutrack::config::Config;
use edutrack::sync::SyncOutcome;

use super::open_services;

/// Run one CRM sync and print the report
pub async fn sync(config: Config) -> Result<()> {
    let services = open_services(&config)?;
    let trigger = build_sync_trigger(&config, services).context("Failed to set up CRM sync")?;

    println!("Syncing from {}", config.sync.base_url);
    match trigger.trigger_now().await? {
        SyncOutcome::Skipped => {
            println!("Another sync run holds the lease; nothing done.");
        }
        SyncOutcome::Completed(report) => {
            println!(
                "{:<12} {:>8} {:>8} {:>8} {:>8}",
                "kind", "fetched", "created", "existing", "skipped"
            );
            for (kind, counts) in [
                ("courses", &report.courses),
                ("instructors", &report.instructors),
                ("students", &report.students),
                ("enrollments", &report.enrollments),
            ] {
                println!(
                    "{:<12} {:>8} {:>8} {:>8} {:>8}",
                    kind, counts.fetched, counts.created, counts.existing, counts.skipped
                );
            }
            for issue in &report.errors {
                println!("  {} #{}: {}", issue.kind, issue.index, issue.reason);
            }
        }
    }
    Ok(())
}
