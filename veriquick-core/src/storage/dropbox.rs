//! Dropbox HTTP API backend.
//!
//! Uploads go to `files/upload` in overwrite mode, so retrying after a
//! credential refresh is idempotent. Shared links come from
//! `sharing/create_shared_link_with_settings`; an existing link is reused.
//! A 401 from any call surfaces as `AuthExpired`.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::header::CONTENT_TYPE;
use reqwest::{Client, Response, StatusCode};
use serde::Deserialize;
use tracing::{debug, info, instrument, warn};

use super::{CredentialStore, DocumentStore};
use crate::error::{Result, VeriquickError};

const DEFAULT_CONTENT_URL: &str = "https://content.dropboxapi.com/2";
const DEFAULT_API_URL: &str = "https://api.dropboxapi.com/2";
const DEFAULT_TOKEN_URL: &str = "https://api.dropboxapi.com/oauth2/token";

/// Default timeout for API requests.
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Configuration for the Dropbox backend.
#[derive(Clone)]
pub struct DropboxConfig {
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub app_key: Option<String>,
    pub app_secret: Option<String>,
    /// Content endpoint base (uploads)
    pub content_url: String,
    /// RPC endpoint base (sharing)
    pub api_url: String,
    /// OAuth token endpoint
    pub token_url: String,
    /// Folder uploads are placed in; empty for the app root
    pub root: String,
    pub timeout: Duration,
    /// Reject plain-HTTP endpoints (disable only for local test servers)
    pub https_only: bool,
}

impl std::fmt::Debug for DropboxConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DropboxConfig")
            .field("content_url", &self.content_url)
            .field("api_url", &self.api_url)
            .field("token_url", &self.token_url)
            .field("root", &self.root)
            .field("timeout", &self.timeout)
            .field("can_refresh", &self.refresh_token.is_some())
            .finish_non_exhaustive()
    }
}

impl DropboxConfig {
    pub fn new(access_token: impl Into<String>) -> Self {
        Self {
            access_token: access_token.into(),
            refresh_token: None,
            app_key: None,
            app_secret: None,
            content_url: DEFAULT_CONTENT_URL.to_string(),
            api_url: DEFAULT_API_URL.to_string(),
            token_url: DEFAULT_TOKEN_URL.to_string(),
            root: String::new(),
            timeout: DEFAULT_TIMEOUT,
            https_only: true,
        }
    }

    /// Load from `DROPBOX_*` environment variables.
    ///
    /// `DROPBOX_ACCESS_TOKEN` is required; the refresh token, app key and
    /// app secret enable credential refresh.
    pub fn from_env() -> Result<Self> {
        let access_token = std::env::var("DROPBOX_ACCESS_TOKEN")
            .ok()
            .filter(|t| !t.is_empty())
            .ok_or_else(|| {
                VeriquickError::Storage("DROPBOX_ACCESS_TOKEN is not set".into())
            })?;

        let mut config = Self::new(access_token);
        config.refresh_token = std::env::var("DROPBOX_REFRESH_TOKEN").ok();
        config.app_key = std::env::var("DROPBOX_APP_KEY").ok();
        config.app_secret = std::env::var("DROPBOX_APP_SECRET").ok();
        if let Ok(url) = std::env::var("DROPBOX_CONTENT_URL") {
            config.content_url = url;
        }
        if let Ok(url) = std::env::var("DROPBOX_API_URL") {
            config.api_url = url;
        }
        if let Ok(url) = std::env::var("DROPBOX_TOKEN_URL") {
            config.token_url = url;
        }
        if let Ok(root) = std::env::var("DROPBOX_ROOT") {
            config.root = root;
        }
        if let Some(secs) = std::env::var("DROPBOX_TIMEOUT_SECS")
            .ok()
            .and_then(|v| v.parse().ok())
        {
            config.timeout = Duration::from_secs(secs);
        }
        Ok(config)
    }
}

#[derive(Debug, Deserialize)]
struct SharedLinkMetadata {
    url: String,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    expires_in: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct ApiErrorBody {
    #[serde(default)]
    error_summary: Option<String>,
    #[serde(default)]
    error: Option<ApiErrorDetail>,
}

#[derive(Debug, Deserialize)]
struct ApiErrorDetail {
    #[serde(rename = ".tag", default)]
    tag: Option<String>,
    #[serde(default)]
    shared_link_already_exists: Option<ExistingLink>,
}

#[derive(Debug, Deserialize)]
struct ExistingLink {
    #[serde(default)]
    metadata: Option<SharedLinkMetadata>,
}

impl ApiErrorBody {
    fn parse(body: &str) -> Self {
        serde_json::from_str(body).unwrap_or_default()
    }

    fn summary(&self, raw: &str) -> String {
        self.error_summary
            .clone()
            .unwrap_or_else(|| raw.chars().take(200).collect())
    }

    fn existing_link(self) -> Option<String> {
        let detail = self.error?;
        if detail.tag.as_deref() != Some("shared_link_already_exists") {
            return None;
        }
        detail.shared_link_already_exists?.metadata.map(|m| m.url)
    }
}

/// Dropbox-backed [`DocumentStore`].
pub struct DropboxStore {
    client: Client,
    config: DropboxConfig,
    credentials: CredentialStore,
}

impl DropboxStore {
    /// Create a client; credentials come from the config.
    #[instrument(level = "debug", skip_all, fields(
        api_url = %config.api_url,
        timeout_ms = config.timeout.as_millis() as u64
    ))]
    pub fn new(config: DropboxConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.timeout)
            .https_only(config.https_only)
            .build()
            .map_err(|e| {
                warn!(error = %e, "Failed to create HTTP client");
                VeriquickError::Storage(format!("Failed to create HTTP client: {e}"))
            })?;

        let credentials =
            CredentialStore::new(config.access_token.clone(), config.refresh_token.clone());

        info!("Dropbox client created");
        Ok(Self {
            client,
            config,
            credentials,
        })
    }

    pub fn root(&self) -> &str {
        &self.config.root
    }

    fn token(&self) -> String {
        self.credentials.current().access_token
    }

    /// Pass successful responses through, map failures to errors.
    async fn check(response: Response, operation: &str) -> Result<Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let raw = response.text().await.unwrap_or_default();
        let summary = ApiErrorBody::parse(&raw).summary(&raw);
        if status == StatusCode::UNAUTHORIZED {
            return Err(VeriquickError::AuthExpired(summary));
        }
        warn!(operation, status = %status, summary = %summary, "Dropbox request failed");
        Err(VeriquickError::Storage(format!(
            "Dropbox {operation} returned {status}: {summary}"
        )))
    }
}

#[async_trait]
impl DocumentStore for DropboxStore {
    #[instrument(level = "debug", skip(self, bytes), fields(bytes = bytes.len()))]
    async fn upload(&self, bytes: &[u8], path: &str) -> Result<()> {
        let start = Instant::now();
        let arg = serde_json::json!({
            "path": path,
            "mode": "overwrite",
            "autorename": false,
            "mute": true,
        });

        let response = self
            .client
            .post(format!("{}/files/upload", self.config.content_url))
            .bearer_auth(self.token())
            .header("Dropbox-API-Arg", header_safe_json(&arg.to_string()))
            .header(CONTENT_TYPE, "application/octet-stream")
            .body(bytes.to_vec())
            .send()
            .await?;

        Self::check(response, "upload").await?;
        debug!(
            latency_ms = start.elapsed().as_millis() as u64,
            "Upload completed"
        );
        Ok(())
    }

    #[instrument(level = "debug", skip(self))]
    async fn create_shared_link(&self, path: &str) -> Result<String> {
        let response = self
            .client
            .post(format!(
                "{}/sharing/create_shared_link_with_settings",
                self.config.api_url
            ))
            .bearer_auth(self.token())
            .json(&serde_json::json!({ "path": path }))
            .send()
            .await?;

        if response.status() == StatusCode::CONFLICT {
            let raw = response.text().await.unwrap_or_default();
            let body = ApiErrorBody::parse(&raw);
            let summary = body.summary(&raw);
            return match body.existing_link() {
                Some(url) => {
                    debug!("Reusing existing shared link");
                    Ok(url)
                }
                None => Err(VeriquickError::Storage(format!(
                    "Dropbox create_shared_link conflict: {summary}"
                ))),
            };
        }

        let response = Self::check(response, "create_shared_link").await?;
        let link: SharedLinkMetadata = response.json().await.map_err(|e| {
            VeriquickError::Storage(format!("Failed to parse shared link response: {e}"))
        })?;
        Ok(link.url)
    }

    #[instrument(level = "debug", skip(self))]
    async fn revoke(&self, url: &str) -> Result<()> {
        let response = self
            .client
            .post(format!("{}/sharing/revoke_shared_link", self.config.api_url))
            .bearer_auth(self.token())
            .json(&serde_json::json!({ "url": url }))
            .send()
            .await?;
        Self::check(response, "revoke_shared_link").await?;
        Ok(())
    }

    #[instrument(level = "debug", skip_all)]
    async fn refresh_credential(&self, refresh_token: &str) -> Result<String> {
        let mut form = vec![
            ("grant_type", "refresh_token"),
            ("refresh_token", refresh_token),
        ];
        if let Some(key) = self.config.app_key.as_deref() {
            form.push(("client_id", key));
        }
        if let Some(secret) = self.config.app_secret.as_deref() {
            form.push(("client_secret", secret));
        }

        let response = self
            .client
            .post(&self.config.token_url)
            .form(&form)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let raw = response.text().await.unwrap_or_default();
            return Err(VeriquickError::RefreshFailed(format!(
                "token endpoint returned {status}: {}",
                raw.chars().take(200).collect::<String>()
            )));
        }

        let token: TokenResponse = response.json().await.map_err(|e| {
            VeriquickError::RefreshFailed(format!("Failed to parse token response: {e}"))
        })?;
        debug!(expires_in = token.expires_in, "Obtained new access token");
        Ok(token.access_token)
    }

    fn credentials(&self) -> &CredentialStore {
        &self.credentials
    }

    fn backend_name(&self) -> &'static str {
        "dropbox"
    }
}

/// HTTP headers must be ASCII; escape everything else as JSON `\uXXXX`.
fn header_safe_json(json: &str) -> String {
    let mut out = String::with_capacity(json.len());
    for c in json.chars() {
        if c.is_ascii() {
            out.push(c);
        } else {
            let mut units = [0u16; 2];
            for unit in c.encode_utf16(&mut units) {
                out.push_str(&format!("\\u{unit:04x}"));
            }
        }
    }
    out
}
