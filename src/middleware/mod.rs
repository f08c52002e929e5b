// Middleware modules
pub mod auth;
pub mod logging;

pub use auth::api_key_middleware;
pub use logging::logging_middleware;
