//! OAuth 2.0 Authorization Server Metadata (RFC 8414) served to MCP clients.

use serde::Serialize;

use crate::config::Config;

pub const WELL_KNOWN_PATH: &str = "/.well-known/oauth-authorization-server";

/// Every field is always serialized; unset configuration renders as `""`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AuthorizationServerMetadata {
    pub issuer: String,
    pub authorization_endpoint: String,
    pub token_endpoint: String,
    pub registration_endpoint: String,
    pub scopes_supported: Vec<&'static str>,
    pub response_types_supported: Vec<&'static str>,
    pub response_modes_supported: Vec<&'static str>,
    pub grant_types_supported: Vec<&'static str>,
    pub token_endpoint_auth_methods_supported: Vec<&'static str>,
    pub code_challenge_methods_supported: Vec<&'static str>,
}

impl AuthorizationServerMetadata {
    pub fn from_config(config: &Config) -> Self {
        Self {
            issuer: config.stytch_project_id.clone(),
            authorization_endpoint: config.authorization_endpoint.clone(),
            token_endpoint: config.project_url("oauth2/token"),
            registration_endpoint: config.project_url("oauth2/register"),
            scopes_supported: vec!["openid", "profile", "email", "offline_access"],
            response_types_supported: vec!["code"],
            response_modes_supported: vec!["query"],
            grant_types_supported: vec!["authorization_code", "refresh_token"],
            token_endpoint_auth_methods_supported: vec!["none"],
            code_challenge_methods_supported: vec!["S256"],
        }
    }
}
