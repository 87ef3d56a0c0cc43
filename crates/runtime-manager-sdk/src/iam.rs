use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, info};
use url::Url;

use crate::{parse_base_url, reason_phrase};

pub const DEFAULT_IAM_BASE_URL: &str = "https://auth.stackspot.com";

/// Client-credentials triple used to mint bearer tokens.
#[derive(Clone)]
pub struct Credentials {
    client_id: String,
    client_secret: String,
    realm: String,
}

impl Credentials {
    pub fn new(
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
        realm: impl Into<String>,
    ) -> Self {
        Self {
            client_id: client_id.into(),
            client_secret: client_secret.into(),
            realm: realm.into(),
        }
    }

}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("client_id", &self.client_id)
            .field("client_secret", &"***")
            .field("realm", &self.realm)
            .finish()
    }
}

/// Opaque bearer token. Expiry is unknown to the client; a 403 from the
/// runtime manager is the only signal that it needs replacing.
#[derive(Clone, PartialEq, Eq)]
pub struct AccessToken(String);

impl AccessToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    pub fn secret(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for AccessToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("AccessToken(***)")
    }
}

#[derive(Debug, Error)]
pub enum IamError {
    #[error("invalid IAM base url: {0}")]
    InvalidBaseUrl(String),
    #[error("config error: {0}")]
    Config(String),
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("authentication rejected: status={status} reason={reason} body={body}")]
    Rejected {
        status: StatusCode,
        reason: String,
        body: String,
    },
    #[error("access token not found in the response: {body}")]
    MissingToken { body: String },
}

/// Anything able to hand out a fresh bearer token.
#[async_trait]
pub trait TokenSource: Send + Sync {
    async fn acquire_token(&self) -> Result<AccessToken, IamError>;
}

#[derive(Debug, Clone)]
pub struct IamClient {
    client: Client,
    base_url: Url,
    credentials: Credentials,
}

impl IamClient {
    pub fn new(base_url: &str, credentials: Credentials) -> Result<Self, IamError> {
        for (name, value) in [
            ("client id", credentials.client_id.as_str()),
            ("client secret", credentials.client_secret.as_str()),
            ("realm", credentials.realm.as_str()),
        ] {
            if value.trim().is_empty() {
                return Err(IamError::Config(format!("{name} must not be empty")));
            }
        }
        let base_url = parse_base_url(base_url).map_err(IamError::InvalidBaseUrl)?;
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|err| IamError::Config(err.to_string()))?;
        Ok(Self {
            client,
            base_url,
            credentials,
        })
    }

    pub fn token_url(&self) -> Result<Url, IamError> {
        let path = format!("{}/oidc/oauth/token", self.credentials.realm);
        self.base_url
            .join(&path)
            .map_err(|err| IamError::Config(format!("invalid token path '{path}': {err}")))
    }

    /// Client-credentials exchange. Only an exact 200 carrying `access_token`
    /// counts as success; there is no retry here.
    pub async fn fetch_token(&self) -> Result<AccessToken, IamError> {
        let url = self.token_url()?;
        let form = [
            ("client_id", self.credentials.client_id.as_str()),
            ("grant_type", "client_credentials"),
            ("client_secret", self.credentials.client_secret.as_str()),
        ];

        info!(realm = %self.credentials.realm, "authenticating");
        let response = self.client.post(url).form(&form).send().await?;
        let status = response.status();
        if status != StatusCode::OK {
            return Err(IamError::Rejected {
                status,
                reason: reason_phrase(status),
                body: response.text().await.unwrap_or_default(),
            });
        }
        let body = response.text().await?;

        let token = serde_json::from_str::<Value>(&body)
            .ok()
            .and_then(|value| {
                value
                    .get("access_token")
                    .and_then(Value::as_str)
                    .map(str::to_owned)
            })
            .ok_or(IamError::MissingToken { body })?;

        debug!("access token issued");
        info!("successfully authenticated");
        Ok(AccessToken::new(token))
    }
}

#[async_trait]
impl TokenSource for IamClient {
    async fn acquire_token(&self) -> Result<AccessToken, IamError> {
        self.fetch_token().await
    }
}
