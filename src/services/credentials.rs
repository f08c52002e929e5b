//! Google access tokens for Vertex AI and Firestore.
//!
//! Every call to [`TokenProvider::access_token`] fetches a new token; nothing
//! is cached between requests.

use async_trait::async_trait;
use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use serde::{Deserialize, Serialize};
use std::{path::Path, sync::Arc, time::Duration};
use time::OffsetDateTime;
use tracing::{debug, instrument};

use crate::config::{CredentialSource, CredentialsConfig};

pub const CLOUD_PLATFORM_SCOPE: &str = "https://www.googleapis.com/auth/cloud-platform";

const JWT_BEARER_GRANT: &str = "urn:ietf:params:oauth:grant-type:jwt-bearer";
const ASSERTION_LIFETIME_SECS: i64 = 3600;

#[derive(Debug, thiserror::Error)]
pub enum CredentialError {
    #[error("token request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("token endpoint returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("failed to read service account key {path}: {source}")]
    KeyFile {
        path: String,
        source: std::io::Error,
    },

    #[error("invalid service account key: {0}")]
    InvalidKey(#[from] serde_json::Error),

    #[error("failed to sign assertion: {0}")]
    Signing(#[from] jsonwebtoken::errors::Error),

    #[error("credentials misconfigured: {0}")]
    Misconfigured(String),
}

/// Short-lived bearer credential
#[derive(Clone, Deserialize)]
pub struct AccessToken {
    pub access_token: String,
    #[serde(default)]
    pub expires_in: Option<u64>,
}

impl std::fmt::Debug for AccessToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AccessToken")
            .field("access_token", &"<redacted>")
            .field("expires_in", &self.expires_in)
            .finish()
    }
}

#[async_trait]
pub trait TokenProvider: Send + Sync {
    async fn access_token(&self) -> Result<AccessToken, CredentialError>;
}

/// Build the provider selected by configuration
pub fn from_config(
    config: &CredentialsConfig,
    http_client: reqwest::Client,
) -> Result<Arc<dyn TokenProvider>, CredentialError> {
    let provider: Arc<dyn TokenProvider> = match config.effective_source() {
        CredentialSource::Metadata | CredentialSource::Auto => Arc::new(
            MetadataServerTokenProvider::new(http_client, &config.metadata_url),
        ),
        CredentialSource::ServiceAccount => {
            let path = config.service_account_key_path.as_deref().ok_or_else(|| {
                CredentialError::Misconfigured(
                    "service_account source requires service_account_key_path".to_string(),
                )
            })?;
            Arc::new(ServiceAccountTokenProvider::from_file(http_client, path)?)
        }
        CredentialSource::Static => {
            let token = config.static_token.clone().ok_or_else(|| {
                CredentialError::Misconfigured("static source requires static_token".to_string())
            })?;
            Arc::new(StaticTokenProvider::new(token))
        }
    };

    Ok(provider)
}

/// Tokens from the GCE / Cloud Run metadata server
pub struct MetadataServerTokenProvider {
    http_client: reqwest::Client,
    token_url: String,
}

impl MetadataServerTokenProvider {
    pub fn new(http_client: reqwest::Client, metadata_url: &str) -> Self {
        Self {
            http_client,
            token_url: format!(
                "{}/instance/service-accounts/default/token",
                metadata_url.trim_end_matches('/')
            ),
        }
    }
}

#[async_trait]
impl TokenProvider for MetadataServerTokenProvider {
    #[instrument(skip(self))]
    async fn access_token(&self) -> Result<AccessToken, CredentialError> {
        let response = self
            .http_client
            .get(&self.token_url)
            .header("Metadata-Flavor", "Google")
            .query(&[("scopes", CLOUD_PLATFORM_SCOPE)])
            .timeout(Duration::from_secs(10))
            .send()
            .await?;

        let token = parse_token_response(response).await?;
        debug!("Fetched access token from metadata server");
        Ok(token)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServiceAccountKey {
    pub client_email: String,
    pub private_key: String,
    #[serde(default = "default_token_uri")]
    pub token_uri: String,
}

fn default_token_uri() -> String {
    "https://oauth2.googleapis.com/token".to_string()
}

#[derive(Debug, Serialize)]
struct AssertionClaims<'a> {
    iss: &'a str,
    scope: &'a str,
    aud: &'a str,
    iat: i64,
    exp: i64,
}

/// Tokens minted from a service account key via the JWT bearer grant
pub struct ServiceAccountTokenProvider {
    http_client: reqwest::Client,
    key: ServiceAccountKey,
    encoding_key: EncodingKey,
}

impl ServiceAccountTokenProvider {
    pub fn new(
        http_client: reqwest::Client,
        key: ServiceAccountKey,
    ) -> Result<Self, CredentialError> {
        let encoding_key = EncodingKey::from_rsa_pem(key.private_key.as_bytes())?;
        Ok(Self {
            http_client,
            key,
            encoding_key,
        })
    }

    pub fn from_file(
        http_client: reqwest::Client,
        path: impl AsRef<Path>,
    ) -> Result<Self, CredentialError> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|source| CredentialError::KeyFile {
            path: path.display().to_string(),
            source,
        })?;
        let key: ServiceAccountKey = serde_json::from_str(&contents)?;
        Self::new(http_client, key)
    }

    fn signed_assertion(&self) -> Result<String, CredentialError> {
        let iat = OffsetDateTime::now_utc().unix_timestamp();
        let claims = AssertionClaims {
            iss: &self.key.client_email,
            scope: CLOUD_PLATFORM_SCOPE,
            aud: &self.key.token_uri,
            iat,
            exp: iat + ASSERTION_LIFETIME_SECS,
        };

        Ok(encode(
            &Header::new(Algorithm::RS256),
            &claims,
            &self.encoding_key,
        )?)
    }
}

#[async_trait]
impl TokenProvider for ServiceAccountTokenProvider {
    #[instrument(skip(self), fields(client_email = %self.key.client_email))]
    async fn access_token(&self) -> Result<AccessToken, CredentialError> {
        let assertion = self.signed_assertion()?;

        let response = self
            .http_client
            .post(&self.key.token_uri)
            .form(&[("grant_type", JWT_BEARER_GRANT), ("assertion", assertion.as_str())])
            .timeout(Duration::from_secs(10))
            .send()
            .await?;

        let token = parse_token_response(response).await?;
        debug!("Exchanged service account assertion for access token");
        Ok(token)
    }
}

/// Fixed token, for local development and tests
pub struct StaticTokenProvider {
    token: String,
}

impl StaticTokenProvider {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
        }
    }
}

#[async_trait]
impl TokenProvider for StaticTokenProvider {
    async fn access_token(&self) -> Result<AccessToken, CredentialError> {
        Ok(AccessToken {
            access_token: self.token.clone(),
            expires_in: None,
        })
    }
}

async fn parse_token_response(response: reqwest::Response) -> Result<AccessToken, CredentialError> {
    if !response.status().is_success() {
        let status = response.status().as_u16();
        let body = response.text().await.unwrap_or_default();
        return Err(CredentialError::Status { status, body });
    }

    Ok(response.json::<AccessToken>().await?)
}
