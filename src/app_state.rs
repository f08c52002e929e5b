use crate::{
    config::Config,
    services::{credentials, usage_store, AIService, QuotaService, TokenProvider, UsageStore},
};
use std::{sync::Arc, time::Duration};

#[derive(Clone)]
pub struct AppState {
    pub quota_service: Arc<QuotaService>,
    pub ai_service: Arc<AIService>,
    pub config: Arc<Config>,
}

impl AppState {
    pub async fn new(config: Config) -> Result<Self, anyhow::Error> {
        // Shared by the credential provider and the Firestore store
        let http_client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .build()?;

        let tokens = credentials::from_config(&config.credentials, http_client.clone())?;
        let store = usage_store::from_config(
            &config.store,
            &config.vertex.project_id,
            http_client,
            tokens.clone(),
        )?;

        tracing::info!(
            backend = ?config.store.backend,
            credentials = ?config.credentials.effective_source(),
            "Initialized usage store and credential provider"
        );

        Self::from_parts(config, store, tokens)
    }

    /// Assemble state from explicit collaborators (tests swap in fakes here)
    pub fn from_parts(
        config: Config,
        store: Arc<dyn UsageStore>,
        tokens: Arc<dyn TokenProvider>,
    ) -> Result<Self, anyhow::Error> {
        let quota_service = Arc::new(QuotaService::new(store, &config.quota));
        Self::with_quota_service(config, quota_service, tokens)
    }

    pub fn with_quota_service(
        config: Config,
        quota_service: Arc<QuotaService>,
        tokens: Arc<dyn TokenProvider>,
    ) -> Result<Self, anyhow::Error> {
        let ai_service = Arc::new(AIService::new(&config.vertex, tokens)?);

        Ok(Self {
            quota_service,
            ai_service,
            config: Arc::new(config),
        })
    }
}
