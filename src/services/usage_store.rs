//! Keyed document storage for usage records.
//!
//! All backends have whole-document overwrite semantics: `set` replaces the
//! stored record and creates it when absent. There is no compare-and-swap, so
//! concurrent read-modify-write cycles on one key are last-write-wins.

use async_trait::async_trait;
use redis::AsyncCommands;
use serde_json::{json, Value};
use std::{collections::HashMap, sync::Arc, time::Duration};
use tokio::sync::RwLock;
use tracing::{debug, instrument};

use crate::{
    config::{StoreBackend, StoreConfig},
    models::usage::UsageRecord,
    services::credentials::{CredentialError, TokenProvider},
};

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("Firestore request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Firestore returned {status}: {body}")]
    Firestore { status: u16, body: String },

    #[error("Malformed usage document: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Firestore credentials: {0}")]
    Credentials(#[from] CredentialError),

    #[error("Store misconfigured: {0}")]
    Misconfigured(String),

    #[error("Invalid document id: {0:?}")]
    InvalidDocumentId(String),
}

#[async_trait]
pub trait UsageStore: Send + Sync {
    async fn get(&self, user_id: &str) -> Result<Option<UsageRecord>, StoreError>;

    async fn set(&self, user_id: &str, record: &UsageRecord) -> Result<(), StoreError>;
}

/// Build the backend selected by configuration
pub fn from_config(
    config: &StoreConfig,
    project_id: &str,
    http_client: reqwest::Client,
    tokens: Arc<dyn TokenProvider>,
) -> Result<Arc<dyn UsageStore>, StoreError> {
    let store: Arc<dyn UsageStore> = match config.backend {
        StoreBackend::Firestore => {
            if project_id.is_empty() {
                return Err(StoreError::Misconfigured(
                    "firestore backend requires vertex.project_id".to_string(),
                ));
            }
            Arc::new(FirestoreUsageStore::new(
                http_client,
                tokens,
                &config.firestore_endpoint,
                project_id,
                &config.firestore_database,
                &config.collection,
            ))
        }
        StoreBackend::Redis => {
            let url = config.redis_url.as_deref().ok_or_else(|| {
                StoreError::Misconfigured("redis backend requires store.redis_url".to_string())
            })?;
            Arc::new(RedisUsageStore::new(
                redis::Client::open(url)?,
                &config.collection,
            ))
        }
        StoreBackend::Memory => Arc::new(InMemoryUsageStore::new()),
    };

    Ok(store)
}

/// Process-local store for tests and local runs
#[derive(Clone, Default)]
pub struct InMemoryUsageStore {
    records: Arc<RwLock<HashMap<String, UsageRecord>>>,
}

impl InMemoryUsageStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl UsageStore for InMemoryUsageStore {
    async fn get(&self, user_id: &str) -> Result<Option<UsageRecord>, StoreError> {
        Ok(self.records.read().await.get(user_id).cloned())
    }

    async fn set(&self, user_id: &str, record: &UsageRecord) -> Result<(), StoreError> {
        self.records
            .write()
            .await
            .insert(user_id.to_string(), record.clone());
        Ok(())
    }
}

/// JSON documents under `{collection}:{user_id}`
pub struct RedisUsageStore {
    client: redis::Client,
    collection: String,
}

impl RedisUsageStore {
    pub fn new(client: redis::Client, collection: &str) -> Self {
        Self {
            client,
            collection: collection.to_string(),
        }
    }

    fn key(&self, user_id: &str) -> String {
        format!("{}:{}", self.collection, user_id)
    }
}

#[async_trait]
impl UsageStore for RedisUsageStore {
    #[instrument(skip(self))]
    async fn get(&self, user_id: &str) -> Result<Option<UsageRecord>, StoreError> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        let raw: Option<String> = conn.get(self.key(user_id)).await?;

        raw.map(|doc| serde_json::from_str(&doc))
            .transpose()
            .map_err(StoreError::from)
    }

    #[instrument(skip(self))]
    async fn set(&self, user_id: &str, record: &UsageRecord) -> Result<(), StoreError> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        let doc = serde_json::to_string(record)?;
        let _: () = conn.set(self.key(user_id), doc).await?;
        Ok(())
    }
}

/// Firestore documents through the REST API
pub struct FirestoreUsageStore {
    http_client: reqwest::Client,
    tokens: Arc<dyn TokenProvider>,
    collection_url: String,
}

impl FirestoreUsageStore {
    pub fn new(
        http_client: reqwest::Client,
        tokens: Arc<dyn TokenProvider>,
        endpoint: &str,
        project_id: &str,
        database: &str,
        collection: &str,
    ) -> Self {
        Self {
            http_client,
            tokens,
            collection_url: format!(
                "{}/v1/projects/{}/databases/{}/documents/{}",
                endpoint.trim_end_matches('/'),
                project_id,
                database,
                collection
            ),
        }
    }

    fn document_url(&self, user_id: &str) -> Result<reqwest::Url, StoreError> {
        // URL path normalization would turn these into the collection or its parent
        if user_id == "." || user_id == ".." {
            return Err(StoreError::InvalidDocumentId(user_id.to_string()));
        }
        let mut url = reqwest::Url::parse(&self.collection_url)
            .map_err(|e| StoreError::Misconfigured(format!("invalid Firestore URL: {}", e)))?;
        // Pushed as a segment so the id is percent-encoded
        url.path_segments_mut()
            .map_err(|_| StoreError::Misconfigured("Firestore URL cannot be a base".to_string()))?
            .push(user_id);
        Ok(url)
    }
}

#[async_trait]
impl UsageStore for FirestoreUsageStore {
    #[instrument(skip(self))]
    async fn get(&self, user_id: &str) -> Result<Option<UsageRecord>, StoreError> {
        let url = self.document_url(user_id)?;
        let token = self.tokens.access_token().await?;
        let response = self
            .http_client
            .get(url)
            .bearer_auth(&token.access_token)
            .timeout(Duration::from_secs(30))
            .send()
            .await?;

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            debug!("No usage document for {}", user_id);
            return Ok(None);
        }
        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(StoreError::Firestore { status, body });
        }

        let document: Value = response.json().await?;
        Ok(Some(decode_document(&document)))
    }

    #[instrument(skip(self))]
    async fn set(&self, user_id: &str, record: &UsageRecord) -> Result<(), StoreError> {
        let url = self.document_url(user_id)?;
        let token = self.tokens.access_token().await?;
        // PATCH without an update mask replaces every field
        let response = self
            .http_client
            .patch(url)
            .bearer_auth(&token.access_token)
            .json(&encode_document(record))
            .timeout(Duration::from_secs(30))
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(StoreError::Firestore { status, body });
        }

        Ok(())
    }
}

/// Firestore REST encoding: int64 values travel as decimal strings
pub fn encode_document(record: &UsageRecord) -> Value {
    json!({
        "fields": {
            "usage_count": { "integerValue": record.usage_count.to_string() },
            "reward_grants": { "integerValue": record.reward_grants.to_string() },
            "month": { "stringValue": record.month },
        }
    })
}

pub fn decode_document(document: &Value) -> UsageRecord {
    let fields = &document["fields"];

    UsageRecord {
        usage_count: integer_field(fields, "usage_count"),
        reward_grants: integer_field(fields, "reward_grants"),
        month: fields["month"]["stringValue"]
            .as_str()
            .unwrap_or_default()
            .to_string(),
    }
}

fn integer_field(fields: &Value, name: &str) -> u32 {
    let value = &fields[name];
    let parsed = match &value["integerValue"] {
        Value::String(s) => s.parse::<i64>().ok(),
        Value::Number(n) => n.as_i64(),
        _ => value["doubleValue"].as_f64().map(|f| f as i64),
    };

    parsed
        .and_then(|n| u32::try_from(n).ok())
        .unwrap_or_default()
}
