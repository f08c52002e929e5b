use serde::Deserialize;
use std::env;

use crate::models::usage::{FREE_BASE_PER_MONTH, REWARD_MAX_PER_MONTH};

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    #[serde(default)]
    pub auth: AuthConfig,
    pub vertex: VertexConfig,
    pub credentials: CredentialsConfig,
    pub store: StoreConfig,
    #[serde(default)]
    pub quota: QuotaConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Extract requests carry base64 images, well above axum's 2MB default
    pub max_body_bytes: usize,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct AuthConfig {
    /// Shared secret expected in `x-api-key`. Unset or empty disables the check.
    #[serde(default)]
    pub backend_api_key: Option<String>,
}

impl AuthConfig {
    pub fn required_api_key(&self) -> Option<&str> {
        self.backend_api_key
            .as_deref()
            .filter(|key| !key.is_empty())
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct VertexConfig {
    #[serde(default)]
    pub project_id: String,
    pub location: String,
    pub model: String,
    /// Base URL override; defaults to the regional aiplatform host
    #[serde(default)]
    pub endpoint: Option<String>,
    pub request_timeout_secs: u64,
    pub max_output_tokens: u32,
    pub temperature: f32,
}

impl VertexConfig {
    pub fn base_url(&self) -> String {
        match &self.endpoint {
            Some(endpoint) => endpoint.trim_end_matches('/').to_string(),
            None => format!("https://{}-aiplatform.googleapis.com", self.location),
        }
    }

    pub fn generate_content_url(&self) -> String {
        format!(
            "{}/v1/projects/{}/locations/{}/publishers/google/models/{}:generateContent",
            self.base_url(),
            self.project_id,
            self.location,
            self.model
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CredentialSource {
    Auto,
    Metadata,
    ServiceAccount,
    Static,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CredentialsConfig {
    pub source: CredentialSource,
    #[serde(default)]
    pub service_account_key_path: Option<String>,
    pub metadata_url: String,
    #[serde(default)]
    pub static_token: Option<String>,
}

impl CredentialsConfig {
    /// Resolve `auto` to a concrete source
    pub fn effective_source(&self) -> CredentialSource {
        match self.source {
            CredentialSource::Auto if self.service_account_key_path.is_some() => {
                CredentialSource::ServiceAccount
            }
            CredentialSource::Auto => CredentialSource::Metadata,
            other => other,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    Firestore,
    Redis,
    Memory,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StoreConfig {
    pub backend: StoreBackend,
    pub collection: String,
    #[serde(default)]
    pub redis_url: Option<String>,
    pub firestore_endpoint: String,
    pub firestore_database: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct QuotaConfig {
    pub free_base_per_month: u32,
    pub reward_max_per_month: u32,
}

impl Default for QuotaConfig {
    fn default() -> Self {
        Self {
            free_base_per_month: FREE_BASE_PER_MONTH,
            reward_max_per_month: REWARD_MAX_PER_MONTH,
        }
    }
}

impl Config {
    pub fn load() -> Result<Self, config::ConfigError> {
        // Load .env file if it exists (for environment variable overrides)
        dotenvy::dotenv().ok();

        let config = Self::defaults()?
            // config.yml is optional; Cloud Run deployments configure through env only
            .add_source(config::File::with_name("config").required(false))
            .add_source(
                config::Environment::with_prefix("PICSCHE")
                    .separator("__")
                    .try_parsing(true),
            )
            // Variables the deployment already sets keep working
            .set_override_option("vertex.project_id", env::var("GOOGLE_CLOUD_PROJECT").ok())?
            .set_override_option("vertex.location", env::var("VERTEX_LOCATION").ok())?
            .set_override_option("vertex.model", env::var("VERTEX_MODEL").ok())?
            .set_override_option(
                "auth.backend_api_key",
                env::var("PICSCHE_BACKEND_API_KEY").ok(),
            )?
            .set_override_option("server.port", env::var("PORT").ok())?
            .set_override_option(
                "credentials.service_account_key_path",
                env::var("GOOGLE_APPLICATION_CREDENTIALS").ok(),
            )?
            .build()?;

        config.try_deserialize()
    }

    fn defaults() -> Result<config::ConfigBuilder<config::builder::DefaultState>, config::ConfigError>
    {
        config::Config::builder()
            .set_default("server.host", "0.0.0.0")?
            .set_default("server.port", 8080)?
            .set_default("server.max_body_bytes", 20 * 1024 * 1024)?
            .set_default("vertex.location", "us-central1")?
            .set_default("vertex.model", "gemini-2.0-flash")?
            .set_default("vertex.request_timeout_secs", 120)?
            .set_default("vertex.max_output_tokens", 16384)?
            .set_default("vertex.temperature", 0.0)?
            .set_default("credentials.source", "auto")?
            .set_default(
                "credentials.metadata_url",
                "http://metadata.google.internal/computeMetadata/v1",
            )?
            .set_default("store.backend", "firestore")?
            .set_default("store.collection", "free_usage")?
            .set_default("store.firestore_endpoint", "https://firestore.googleapis.com")?
            .set_default("store.firestore_database", "(default)")?
            .set_default("quota.free_base_per_month", i64::from(FREE_BASE_PER_MONTH))?
            .set_default(
                "quota.reward_max_per_month",
                i64::from(REWARD_MAX_PER_MONTH),
            )
    }
}
