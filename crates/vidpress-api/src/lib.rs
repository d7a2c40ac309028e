//! HTTP intake, admin and content surface.

pub mod config;
pub mod content;
pub mod error;
pub mod handlers;
pub mod middleware;
pub mod range;
pub mod routes;
pub mod state;

pub use config::ApiConfig;
pub use error::{ApiError, ApiResult};
pub use routes::create_router;
pub use state::AppState;
