//! Bearer token verification against the Stytch identity provider
//!
//! Tokens are checked with OAuth 2.0 token introspection (RFC 7662). Every way a
//! check can fail collapses into a single [`VerificationError`].

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

use crate::config::Config;

const INTROSPECTION_TIMEOUT: Duration = Duration::from_secs(10);

/// Claims describing the principal behind a verified token.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IdentityClaims {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sub: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_id: Option<String>,
    /// Everything else the provider returned (`iss`, `aud`, `exp`, custom claims, ...).
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl IdentityClaims {
    pub fn for_subject(sub: impl Into<String>) -> Self {
        Self {
            sub: Some(sub.into()),
            ..Self::default()
        }
    }
}

#[derive(Debug, Error)]
#[error("token verification failed: {reason}")]
pub struct VerificationError {
    reason: String,
}

impl VerificationError {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

impl From<reqwest::Error> for VerificationError {
    fn from(err: reqwest::Error) -> Self {
        Self::new(err.to_string())
    }
}

#[async_trait]
pub trait TokenVerifier: Send + Sync {
    async fn verify(&self, token: &str) -> Result<IdentityClaims, VerificationError>;
}

#[derive(Debug, Deserialize)]
struct IntrospectionResponse {
    active: bool,
    #[serde(flatten)]
    claims: IdentityClaims,
}

/// Process-wide introspection client. Holds no per-request state.
#[derive(Debug, Clone)]
pub struct IntrospectionClient {
    http: reqwest::Client,
    endpoint: String,
    project_id: String,
    secret: String,
}

impl IntrospectionClient {
    pub fn new(
        endpoint: impl Into<String>,
        project_id: impl Into<String>,
        secret: impl Into<String>,
    ) -> Result<Self, reqwest::Error> {
        let http = reqwest::Client::builder()
            .timeout(INTROSPECTION_TIMEOUT)
            .build()?;

        Ok(Self {
            http,
            endpoint: endpoint.into(),
            project_id: project_id.into(),
            secret: secret.into(),
        })
    }

    pub fn from_config(config: &Config) -> Result<Self, reqwest::Error> {
        Self::new(
            config.introspection_endpoint(),
            config.stytch_project_id.clone(),
            config.stytch_secret.clone(),
        )
    }
}

#[async_trait]
impl TokenVerifier for IntrospectionClient {
    async fn verify(&self, token: &str) -> Result<IdentityClaims, VerificationError> {
        if self.endpoint.is_empty() {
            return Err(VerificationError::new("identity provider is not configured"));
        }

        let response = self
            .http
            .post(&self.endpoint)
            .basic_auth(&self.project_id, Some(&self.secret))
            .form(&[("token", token), ("token_type_hint", "access_token")])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(VerificationError::new(format!(
                "introspection endpoint answered {status}"
            )));
        }

        let introspection: IntrospectionResponse = response.json().await?;
        if !introspection.active {
            return Err(VerificationError::new("token is not active"));
        }

        Ok(introspection.claims)
    }
}
