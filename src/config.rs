use std::{env, net::SocketAddr};

use thiserror::Error;

pub const DEFAULT_STYTCH_API_BASE: &str = "https://test.stytch.com";
pub const DEFAULT_AUTHORIZATION_ENDPOINT: &str = "http://localhost:3001/oauth/authorize";
pub const DEFAULT_BIND_PORT: u16 = 3005;

#[derive(Debug, Clone)]
pub struct Config {
    pub stytch_project_id: String,
    pub stytch_secret: String,
    pub stytch_api_base: String,
    pub introspection_url: Option<String>,
    pub authorization_endpoint: String,
    pub bind_addr: String,
    pub bind_port: u16,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("BIND_PORT must be a valid u16")]
    InvalidPort,
    #[error("invalid bind address or port")]
    InvalidSocket,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Builds the config from an arbitrary variable source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let non_empty = |key: &str| {
            lookup(key)
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
        };

        let bind_port = non_empty("BIND_PORT")
            .map(|value| value.parse::<u16>().map_err(|_| ConfigError::InvalidPort))
            .transpose()?
            .unwrap_or(DEFAULT_BIND_PORT);

        let config = Self {
            stytch_project_id: non_empty("STYTCH_PROJECT_ID").unwrap_or_default(),
            stytch_secret: non_empty("STYTCH_SECRET").unwrap_or_default(),
            stytch_api_base: non_empty("STYTCH_API_BASE")
                .map(|base| base.trim_end_matches('/').to_string())
                .unwrap_or_else(|| DEFAULT_STYTCH_API_BASE.to_string()),
            introspection_url: non_empty("STYTCH_INTROSPECTION_URL"),
            authorization_endpoint: non_empty("OAUTH_AUTHORIZATION_ENDPOINT")
                .unwrap_or_else(|| DEFAULT_AUTHORIZATION_ENDPOINT.to_string()),
            bind_addr: non_empty("BIND_ADDR").unwrap_or_else(|| "127.0.0.1".to_string()),
            bind_port,
        };

        let _ = config.bind_socket()?;
        Ok(config)
    }

    pub fn bind_socket(&self) -> Result<SocketAddr, ConfigError> {
        format!("{}:{}", self.bind_addr, self.bind_port)
            .parse::<SocketAddr>()
            .map_err(|_| ConfigError::InvalidSocket)
    }

    pub fn has_project(&self) -> bool {
        !self.stytch_project_id.is_empty()
    }

    /// Empty when no project is configured.
    pub fn project_url(&self, suffix: &str) -> String {
        if !self.has_project() {
            return String::new();
        }
        format!(
            "{}/v1/public/{}/{}",
            self.stytch_api_base, self.stytch_project_id, suffix
        )
    }

    pub fn introspection_endpoint(&self) -> String {
        self.introspection_url
            .clone()
            .unwrap_or_else(|| self.project_url("oauth2/introspect"))
    }
}
