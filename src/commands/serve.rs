use anyhow::{Context, Result};

use edutrack::api::ApiServer;
use edutrack::config::Config;

/// Start the API server
pub async fn serve(config: Config) -> Result<()> {
    let server = ApiServer::new(config).context("Failed to create API server")?;
    let info = server.info();

    println!("{}", info.display());
    println!();
    println!("API Endpoints:");
    println!("  GET        /api/health                             - Health check");
    println!("  GET        /metrics                                - Prometheus metrics");
    println!("  GET/POST   /api/users                              - List/create users");
    println!("  GET/PUT/DELETE /api/users/{{id}}                     - Manage a user");
    println!("  GET/POST   /api/courses                            - List/create courses");
    println!("  GET/PUT/DELETE /api/courses/{{id}}                   - Manage a course");
    println!("  POST       /api/courses/{{id}}/enroll                - Enroll a student");
    println!("  DELETE     /api/courses/{{id}}/enroll/{{student_id}}   - Unenroll a student");
    println!("  PUT        /api/courses/{{id}}/payments/{{student_id}} - Record a payment");
    println!("  POST       /api/courses/{{id}}/reconcile             - Reconcile completion");
    println!("  GET        /api/courses/{{id}}/report                - Progress report");
    println!("  GET/POST   /api/batches                            - List/create batches");
    println!("  GET/PUT/DELETE /api/batches/{{id}}                   - Manage a batch");
    println!("  GET/PUT    /api/progress/{{course_id}}               - Section progress");
    println!("  GET/POST   /api/sync                               - Sync status / run now");
    println!();
    println!("Listening on http://{}", info.bind_address);
    println!("Press Ctrl+C to stop.\n");

    server
        .start_with_shutdown(async {
            match tokio::signal::ctrl_c().await {
                Ok(()) => {
                    tracing::info!("Shutdown signal received");
                }
                Err(e) => {
                    tracing::error!("Failed to wait for Ctrl+C: {}", e);
                }
            }
        })
        .await?;

    println!("API server stopped.");
    Ok(())
}
