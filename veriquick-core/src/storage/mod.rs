//! Storage backends that turn uploaded bytes into shareable links.
//!
//! The pipeline only needs "given bytes and a name, return a durable URL".
//! Backends implement [`DocumentStore`]; authorization failures surface as
//! [`VeriquickError::AuthExpired`] and [`store_document`] handles them with
//! exactly one credential refresh followed by one retry.
//!
//! - **Dropbox** - HTTP API backend (`network` feature)
//! - **Memory** - in-process backend for tests and offline runs

mod credential;
#[cfg(feature = "network")]
mod dropbox;
mod memory;

pub use credential::{Credential, CredentialStore};
#[cfg(feature = "network")]
pub use dropbox::{DropboxConfig, DropboxStore};
pub use memory::MemoryStore;

use async_trait::async_trait;
use tracing::{debug, info, instrument, warn};

use crate::error::{Result, VeriquickError};

/// A cloud object store with shareable links.
///
/// Implementations read their access token from the injected
/// [`CredentialStore`] on every call.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Store `bytes` at `path`, replacing any existing object.
    async fn upload(&self, bytes: &[u8], path: &str) -> Result<()>;

    /// Create (or fetch the existing) public link for `path`.
    async fn create_shared_link(&self, path: &str) -> Result<String>;

    /// Revoke a link created by [`DocumentStore::create_shared_link`].
    async fn revoke(&self, url: &str) -> Result<()>;

    /// Exchange a refresh token for a new access token.
    async fn refresh_credential(&self, refresh_token: &str) -> Result<String>;

    /// The credential holder this backend authenticates with.
    fn credentials(&self) -> &CredentialStore;

    /// Short backend name for logs and health output.
    fn backend_name(&self) -> &'static str;
}

/// Build the storage path for an uploaded file name.
///
/// Directory components are dropped so a client cannot write outside
/// `root`.
pub fn storage_path(root: &str, filename: &str) -> String {
    let name = filename
        .rsplit(['/', '\\'])
        .next()
        .filter(|n| !n.is_empty() && *n != "." && *n != "..")
        .unwrap_or("upload.bin");
    format!("{}/{}", root.trim_end_matches('/'), name)
}

/// Upload `bytes` and return the shared link.
///
/// On `AuthExpired` the credential is refreshed once and the whole
/// upload-then-link sequence retried once. Any failure, including a second
/// `AuthExpired`, becomes `UploadFailure`.
#[instrument(level = "debug", skip(store, bytes), fields(backend = store.backend_name(), bytes = bytes.len()))]
pub async fn store_document(
    store: &dyn DocumentStore,
    bytes: &[u8],
    path: &str,
) -> Result<String> {
    const MAX_ATTEMPTS: u32 = 2;

    let mut attempt = 1;
    loop {
        let observed = store.credentials().current().generation;

        let outcome = match store.upload(bytes, path).await {
            Ok(()) => store.create_shared_link(path).await,
            Err(e) => Err(e),
        };

        match outcome {
            Ok(url) => {
                info!(path, attempt, "Stored document");
                return Ok(url);
            }
            Err(VeriquickError::AuthExpired(reason)) if attempt < MAX_ATTEMPTS => {
                warn!(path, reason = %reason, "Authorization expired, refreshing credential");
                store
                    .credentials()
                    .refresh_if_current(observed, |refresh_token| async move {
                        store.refresh_credential(&refresh_token).await
                    })
                    .await
                    .map_err(|e| upload_failure(path, e))?;
                attempt += 1;
                debug!(path, attempt, "Retrying upload with refreshed credential");
            }
            Err(e) => return Err(upload_failure(path, e)),
        }
    }
}

fn upload_failure(path: &str, err: VeriquickError) -> VeriquickError {
    match err {
        VeriquickError::UploadFailure { .. } => err,
        other => VeriquickError::UploadFailure {
            file: path.to_string(),
            reason: other.to_string(),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn storage_path_strips_directories() {
        assert_eq!(storage_path("", "aadhaar.pdf"), "/aadhaar.pdf");
        assert_eq!(storage_path("/intake/", "../../etc/passwd"), "/intake/passwd");
        assert_eq!(storage_path("/intake", "C:\\docs\\pan.jpg"), "/intake/pan.jpg");
        assert_eq!(storage_path("", "dir/"), "/upload.bin");
    }

    #[tokio::test]
    async fn stores_and_links() {
        let store = MemoryStore::new();
        let url = store_document(&store, b"data", "/a.pdf").await.unwrap();
        assert_eq!(url, "memory:///a.pdf");
        assert_eq!(store.object("/a.pdf").as_deref(), Some(&b"data"[..]));
    }

    #[tokio::test]
    async fn expired_token_is_refreshed_and_retried_once() {
        let store = MemoryStore::new().expire_next_calls(1);
        let url = store_document(&store, b"data", "/a.pdf").await.unwrap();
        assert_eq!(url, "memory:///a.pdf");
        assert_eq!(store.refresh_count(), 1);
        assert_eq!(store.credentials().current().generation, 1);
    }

    #[tokio::test]
    async fn second_expiry_is_an_upload_failure() {
        let store = MemoryStore::new().expire_next_calls(2);
        let err = store_document(&store, b"data", "/a.pdf").await.unwrap_err();
        assert!(matches!(err, VeriquickError::UploadFailure { .. }));
        assert_eq!(store.refresh_count(), 1);
    }

    #[tokio::test]
    async fn failed_refresh_is_an_upload_failure() {
        let store = MemoryStore::new().expire_next_calls(1).fail_refresh();
        let err = store_document(&store, b"data", "/a.pdf").await.unwrap_err();
        assert!(matches!(err, VeriquickError::UploadFailure { .. }));
        assert_eq!(store.credentials().current().generation, 0);
    }

    #[tokio::test]
    async fn other_errors_are_not_retried() {
        let store = MemoryStore::new().fail_path("/a.pdf");
        let err = store_document(&store, b"data", "/a.pdf").await.unwrap_err();
        assert!(matches!(err, VeriquickError::UploadFailure { .. }));
        assert_eq!(store.refresh_count(), 0);
        assert_eq!(store.upload_count(), 1);
    }
}
