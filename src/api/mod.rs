//! REST API
//!
//! - [`server`]: application state, router and server lifecycle
//! - [`auth`]: bearer-token identities and role checks
//! - [`response`]: the `{success, data?, error?}` envelope and error mapping
//! - [`handlers`]: route handlers per resource

pub mod auth;
pub mod handlers;
pub mod response;
pub mod server;

pub use auth::{AuthResolver, Identity, StaticTokenResolver};
pub use response::{ApiResponse, ApiResult};
pub use server::{create_router, ApiServer, AppState, ServerInfo};
