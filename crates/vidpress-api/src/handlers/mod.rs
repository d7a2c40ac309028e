//! Request handlers.

pub mod admin;
pub mod compress;
pub mod health;
pub mod status;

pub use admin::{admin_jobs, admin_webhook};
pub use compress::compress;
pub use health::health;
pub use status::status;
