//! Google credentials and OAuth2 access tokens
//!
//! Two credential kinds are supported: service account keys (JWT bearer
//! grant) and authorized user credentials (refresh token grant).

use chrono::Utc;
use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::Mutex;

const COMPUTE_SCOPE: &str = "https://www.googleapis.com/auth/compute";
const DEFAULT_TOKEN_URL: &str = "https://oauth2.googleapis.com/token";
const JWT_BEARER_GRANT: &str = "urn:ietf:params:oauth:grant-type:jwt-bearer";

/// Tokens are refreshed this many seconds before they expire
const EXPIRY_MARGIN_SECS: i64 = 60;

#[derive(Debug, Error)]
pub enum CredentialError {
    #[error("invalid credential JSON: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("unsupported credential type '{0}'")]
    UnsupportedType(String),

    #[error("credential is missing '{0}'")]
    MissingField(&'static str),

    #[error("invalid private key: {0}")]
    Key(#[from] jsonwebtoken::errors::Error),

    #[error("token exchange failed: {0}")]
    Token(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CredentialKind {
    ServiceAccount,
    AuthorizedUser,
}

/// A parsed credential file
#[derive(Clone, Deserialize)]
pub struct Credential {
    #[serde(rename = "type")]
    pub kind_name: String,

    #[serde(default)]
    pub client_email: String,
    #[serde(default)]
    pub private_key_id: String,
    #[serde(default)]
    pub private_key: String,
    #[serde(default, rename = "token_uri")]
    pub token_url: String,
    #[serde(default)]
    pub project_id: String,

    #[serde(default)]
    pub client_secret: String,
    #[serde(default)]
    pub client_id: String,
    #[serde(default)]
    pub refresh_token: String,
}

impl std::fmt::Debug for Credential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credential")
            .field("type", &self.kind_name)
            .field("client_email", &self.client_email)
            .field("project_id", &self.project_id)
            .finish_non_exhaustive()
    }
}

impl Credential {
    /// Parse and validate credential JSON
    pub fn from_json(data: &str) -> Result<Self, CredentialError> {
        let credential: Credential = serde_json::from_str(data)?;

        match credential.kind()? {
            CredentialKind::ServiceAccount => {
                if credential.client_email.is_empty() {
                    return Err(CredentialError::MissingField("client_email"));
                }
                if credential.private_key.is_empty() {
                    return Err(CredentialError::MissingField("private_key"));
                }
            }
            CredentialKind::AuthorizedUser => {
                if credential.refresh_token.is_empty() {
                    return Err(CredentialError::MissingField("refresh_token"));
                }
                if credential.client_id.is_empty() {
                    return Err(CredentialError::MissingField("client_id"));
                }
            }
        }

        Ok(credential)
    }

    pub fn kind(&self) -> Result<CredentialKind, CredentialError> {
        match self.kind_name.as_str() {
            "service_account" => Ok(CredentialKind::ServiceAccount),
            "authorized_user" => Ok(CredentialKind::AuthorizedUser),
            other => Err(CredentialError::UnsupportedType(other.to_string())),
        }
    }

    /// Owning project, if the credential names one
    pub fn project_id(&self) -> Option<&str> {
        if self.project_id.is_empty() {
            None
        } else {
            Some(&self.project_id)
        }
    }

    fn token_url(&self) -> &str {
        if self.token_url.is_empty() {
            DEFAULT_TOKEN_URL
        } else {
            &self.token_url
        }
    }
}

#[derive(Debug, Serialize)]
struct JwtClaims<'a> {
    iss: &'a str,
    scope: &'a str,
    aud: &'a str,
    iat: i64,
    exp: i64,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    expires_in: i64,
}

#[derive(Debug, Clone)]
struct CachedToken {
    access_token: String,
    expires_at: i64,
}

/// Hands out access tokens for a credential, refreshing them before expiry
pub struct TokenSource {
    credential: Credential,
    http: reqwest::Client,
    cached: Mutex<Option<CachedToken>>,
}

impl TokenSource {
    pub fn new(credential: Credential, http: reqwest::Client) -> Self {
        Self {
            credential,
            http,
            cached: Mutex::new(None),
        }
    }

    pub async fn access_token(&self) -> Result<String, CredentialError> {
        let mut cached = self.cached.lock().await;
        let now = Utc::now().timestamp();

        if let Some(token) = cached.as_ref() {
            if token.expires_at - EXPIRY_MARGIN_SECS > now {
                return Ok(token.access_token.clone());
            }
        }

        let response = self.fetch_token(now).await?;
        let token = CachedToken {
            access_token: response.access_token,
            expires_at: now + response.expires_in.max(0),
        };
        *cached = Some(token.clone());

        Ok(token.access_token)
    }

    async fn fetch_token(&self, now: i64) -> Result<TokenResponse, CredentialError> {
        let c = &self.credential;
        let request = match c.kind()? {
            CredentialKind::ServiceAccount => {
                let assertion = signed_assertion(c, now)?;
                self.http
                    .post(c.token_url())
                    .form(&[("grant_type", JWT_BEARER_GRANT), ("assertion", assertion.as_str())])
            }
            CredentialKind::AuthorizedUser => self.http.post(c.token_url()).form(&[
                ("grant_type", "refresh_token"),
                ("client_id", c.client_id.as_str()),
                ("client_secret", c.client_secret.as_str()),
                ("refresh_token", c.refresh_token.as_str()),
            ]),
        };

        let response = request
            .send()
            .await
            .map_err(|e| CredentialError::Token(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(CredentialError::Token(format!("{}: {}", status, body.trim())));
        }

        response
            .json::<TokenResponse>()
            .await
            .map_err(|e| CredentialError::Token(e.to_string()))
    }
}

/// RS256-signed JWT asserting the service account identity for the compute scope
fn signed_assertion(credential: &Credential, now: i64) -> Result<String, CredentialError> {
    let mut header = Header::new(Algorithm::RS256);
    if !credential.private_key_id.is_empty() {
        header.kid = Some(credential.private_key_id.clone());
    }

    let claims = JwtClaims {
        iss: &credential.client_email,
        scope: COMPUTE_SCOPE,
        aud: credential.token_url(),
        iat: now,
        exp: now + 3600,
    };

    let key = EncodingKey::from_rsa_pem(credential.private_key.as_bytes())?;
    Ok(encode(&header, &claims, &key)?)
}
