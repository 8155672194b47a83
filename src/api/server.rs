//! REST API server
//!
//! Builds the router over the shared [`Services`], runs the periodic CRM
//! sync in the background and serves until shut down.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use axum::{
    extract::{MatchedPath, Request},
    middleware::{self, Next},
    response::Response,
    routing::{get, post, put},
    Router,
};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::config::Config;
use crate::error::{Error, Result};
use crate::metrics;
use crate::services::Services;
use crate::storage::Store;
use crate::sync::{CrmClient, CrmClientConfig, SyncJob, SyncTrigger};

use super::auth::{AuthResolver, StaticTokenResolver};
use super::handlers::{batches, courses, progress, system, users};

// ============================================================================
// App State
// ============================================================================

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    /// Domain services
    pub services: Services,

    /// Bearer token resolution
    pub auth: Arc<dyn AuthResolver>,

    /// CRM sync trigger, when sync is enabled
    pub sync: Option<Arc<SyncTrigger>>,

    /// Server start time
    pub start_time: Instant,

    /// Configuration
    pub config: Config,
}

impl AppState {
    /// Build state for `config` over an existing set of services
    pub fn new(config: Config, services: Services) -> Result<Self> {
        let auth = Arc::new(StaticTokenResolver::new(&config.auth, services.store.clone())?);
        let sync = if config.sync.enabled {
            Some(Arc::new(build_sync_trigger(&config, services.clone())?))
        } else {
            None
        };

        Ok(Self {
            services,
            auth,
            sync,
            start_time: Instant::now(),
            config,
        })
    }
}

/// Sync job and trigger for the configured CRM
pub fn build_sync_trigger(config: &Config, services: Services) -> Result<SyncTrigger> {
    let mut client_config = CrmClientConfig::new(config.sync.base_url.clone())
        .with_timeout(config.request_timeout())
        .with_retry(config.retry());
    if let Some(key) = &config.sync.api_key {
        client_config = client_config.with_api_key(key.clone());
    }

    let client = CrmClient::new(client_config)?;
    let job = SyncJob::new(services, client, config.lease_ttl());
    Ok(SyncTrigger::new(Arc::new(job), config.sync_interval()))
}

// ============================================================================
// Routes
// ============================================================================

/// Create the API router
pub fn create_router(state: AppState) -> Router {
    Router::new()
        // Health endpoints
        .route("/api/health", get(system::health_check))
        .route("/metrics", get(system::metrics_handler))
        // Users
        .route("/api/users", get(users::list_users).post(users::create_user))
        .route(
            "/api/users/{id}",
            get(users::get_user)
                .put(users::update_user)
                .delete(users::delete_user),
        )
        // Courses
        .route("/api/courses", get(courses::list_courses).post(courses::create_course))
        .route(
            "/api/courses/{id}",
            get(courses::get_course)
                .put(courses::update_course)
                .delete(courses::delete_course),
        )
        .route("/api/courses/{id}/enroll", post(courses::enroll))
        .route(
            "/api/courses/{id}/enroll/{student_id}",
            axum::routing::delete(courses::unenroll),
        )
        .route(
            "/api/courses/{id}/payments/{student_id}",
            put(courses::record_payment),
        )
        .route("/api/courses/{id}/reconcile", post(courses::reconcile))
        .route("/api/courses/{id}/report", get(courses::course_report))
        // Batches
        .route("/api/batches", get(batches::list_batches).post(batches::create_batch))
        .route(
            "/api/batches/{id}",
            get(batches::get_batch)
                .put(batches::update_batch)
                .delete(batches::delete_batch),
        )
        // Progress
        .route(
            "/api/progress/{course_id}",
            get(progress::get_progress).put(progress::set_section_completion),
        )
        // Sync
        .route("/api/sync", get(system::sync_status).post(system::trigger_sync))
        .route_layer(middleware::from_fn(track_metrics))
        .with_state(state)
}

/// Record request count and latency by matched route
async fn track_metrics(req: Request, next: Next) -> Response {
    let route = req
        .extensions()
        .get::<MatchedPath>()
        .map(|p| p.as_str().to_owned())
        .unwrap_or_else(|| "unmatched".to_string());

    let start = Instant::now();
    let response = next.run(req).await;
    metrics::record_api_request(&route, response.status().as_u16(), start.elapsed().as_secs_f64());
    response
}

// ============================================================================
// API Server
// ============================================================================

/// Main API server
pub struct ApiServer {
    config: Config,
    state: AppState,
}

impl ApiServer {
    /// Open the configured database and build the server
    pub fn new(config: Config) -> Result<Self> {
        config.validate()?;
        let store = Store::sqlite(&config.database.sqlite_path)?;

        Self::with_services(config, Services::new(store))
    }

    /// Build the server over existing services
    pub fn with_services(config: Config, services: Services) -> Result<Self> {
        let state = AppState::new(config.clone(), services)?;
        Ok(Self { config, state })
    }

    /// Get the application state
    pub fn state(&self) -> AppState {
        self.state.clone()
    }

    /// Build the router with all routes
    pub fn build_router(&self) -> Router {
        let mut router = create_router(self.state.clone());

        // Add CORS layer if enabled
        if self.config.server.enable_cors {
            router = router.layer(
                CorsLayer::new()
                    .allow_origin(Any)
                    .allow_methods(Any)
                    .allow_headers(Any),
            );
        }

        // Add tracing layer if enabled
        if self.config.server.enable_request_logging {
            router = router.layer(TraceLayer::new_for_http());
        }

        router
    }

    /// Start with graceful shutdown
    pub async fn start_with_shutdown(
        &self,
        shutdown_signal: impl std::future::Future<Output = ()> + Send + 'static,
    ) -> Result<()> {
        let router = self.build_router();
        let addr = self.config.server.bind_address;

        tracing::info!(%addr, "Starting API server");

        self.start_background_tasks();

        let listener = tokio::net::TcpListener::bind(addr)
            .await
            .map_err(|e| Error::with_source(format!("Failed to bind {addr}"), e))?;

        let served = axum::serve(listener, router)
            .with_graceful_shutdown(shutdown_signal)
            .await;

        if let Some(trigger) = &self.state.sync {
            trigger.stop();
        }
        served.map_err(|e| Error::with_source("API server error", e))?;

        tracing::info!("API server shutdown complete");
        Ok(())
    }

    /// Start background tasks
    fn start_background_tasks(&self) {
        if let Some(trigger) = &self.state.sync {
            let trigger = Arc::clone(trigger);
            tokio::spawn(async move { trigger.start().await });
            tracing::info!("Background CRM sync started");
        }
    }

    /// Get server info
    pub fn info(&self) -> ServerInfo {
        ServerInfo {
            bind_address: self.config.server.bind_address,
            sqlite_path: self.config.database.sqlite_path.display().to_string(),
            cors_enabled: self.config.server.enable_cors,
            request_logging_enabled: self.config.server.enable_request_logging,
            auth_enabled: self.config.auth.enabled,
            sync_interval_secs: self.state.sync.as_ref().map(|_| self.config.sync.interval_secs),
        }
    }
}

/// Server information
#[derive(Debug, Clone)]
pub struct ServerInfo {
    pub bind_address: SocketAddr,
    pub sqlite_path: String,
    pub cors_enabled: bool,
    pub request_logging_enabled: bool,
    pub auth_enabled: bool,
    /// `None` when sync is disabled
    pub sync_interval_secs: Option<u64>,
}

impl ServerInfo {
    /// Format as display string
    pub fn display(&self) -> String {
        let enabled = |on: bool| if on { "enabled" } else { "disabled" };
        format!(
            "edutrack API Server\n\
             {:-<40}\n\
             Bind Address: {}\n\
             Database: {}\n\
             CORS: {}\n\
             Request Logging: {}\n\
             Auth: {}\n\
             CRM Sync: {}",
            "",
            self.bind_address,
            self.sqlite_path,
            enabled(self.cors_enabled),
            enabled(self.request_logging_enabled),
            enabled(self.auth_enabled),
            self.sync_interval_secs
                .map(|s| format!("every {s}s"))
                .unwrap_or_else(|| "disabled".to_string()),
        )
    }
}

// ============================================================================
// Tests
// ============================================================================
