// Service modules
pub mod ai_service;
pub mod credentials;
pub mod quota_service;
pub mod usage_store;

pub use ai_service::AIService;
pub use credentials::TokenProvider;
pub use quota_service::QuotaService;
pub use usage_store::UsageStore;
