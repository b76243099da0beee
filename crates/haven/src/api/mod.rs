//! HTTP API module.
//!
//! Chat relay, session analytics intake and health endpoints.

mod error;
mod handlers;
mod routes;
mod state;

pub use error::{ApiError, ApiResult, ErrorResponse};
pub use handlers::{HealthResponse, SessionAnalyticsRequest};
pub use routes::create_router;
pub use state::AppState;
