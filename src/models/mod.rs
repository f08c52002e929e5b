// Request/Response models
pub mod ai;
pub mod common;
pub mod usage;
