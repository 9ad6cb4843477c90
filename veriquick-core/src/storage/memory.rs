//! In-process storage backend.
//!
//! Keeps objects in a map and hands out `memory://` links. Failure knobs
//! let tests exercise the expiry and refresh paths without a network.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;

use super::{CredentialStore, DocumentStore};
use crate::error::{Result, VeriquickError};

const LINK_SCHEME: &str = "memory://";

#[derive(Debug, Default)]
struct MemoryState {
    objects: HashMap<String, Vec<u8>>,
    revoked: HashSet<String>,
}

/// Storage backend backed by a `HashMap`.
#[derive(Debug)]
pub struct MemoryStore {
    state: Mutex<MemoryState>,
    credentials: CredentialStore,
    expired_calls: AtomicUsize,
    refresh_fails: bool,
    failing_paths: HashSet<String>,
    uploads: AtomicUsize,
    refreshes: AtomicUsize,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(MemoryState::default()),
            credentials: CredentialStore::new("memory-token", Some("memory-refresh".into())),
            expired_calls: AtomicUsize::new(0),
            refresh_fails: false,
            failing_paths: HashSet::new(),
            uploads: AtomicUsize::new(0),
            refreshes: AtomicUsize::new(0),
        }
    }

    /// The next `n` uploads fail with `AuthExpired`.
    pub fn expire_next_calls(self, n: usize) -> Self {
        self.expired_calls.store(n, Ordering::SeqCst);
        self
    }

    /// Every credential refresh fails.
    pub fn fail_refresh(mut self) -> Self {
        self.refresh_fails = true;
        self
    }

    /// Uploads to `path` always fail with a storage error.
    pub fn fail_path(mut self, path: impl Into<String>) -> Self {
        self.failing_paths.insert(path.into());
        self
    }

    pub fn object(&self, path: &str) -> Option<Vec<u8>> {
        self.lock().objects.get(path).cloned()
    }

    pub fn len(&self) -> usize {
        self.lock().objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_revoked(&self, url: &str) -> bool {
        self.lock().revoked.contains(url)
    }

    pub fn upload_count(&self) -> usize {
        self.uploads.load(Ordering::SeqCst)
    }

    pub fn refresh_count(&self) -> usize {
        self.refreshes.load(Ordering::SeqCst)
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, MemoryState> {
        match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn take_expiry(&self) -> bool {
        self.expired_calls
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn upload(&self, bytes: &[u8], path: &str) -> Result<()> {
        self.uploads.fetch_add(1, Ordering::SeqCst);
        if self.take_expiry() {
            return Err(VeriquickError::AuthExpired("memory token expired".into()));
        }
        if self.failing_paths.contains(path) {
            return Err(VeriquickError::Storage(format!("write to {path} rejected")));
        }
        self.lock().objects.insert(path.to_string(), bytes.to_vec());
        Ok(())
    }

    async fn create_shared_link(&self, path: &str) -> Result<String> {
        let mut state = self.lock();
        if !state.objects.contains_key(path) {
            return Err(VeriquickError::Storage(format!("not found: {path}")));
        }
        let url = format!("{LINK_SCHEME}{path}");
        state.revoked.remove(&url);
        Ok(url)
    }

    async fn revoke(&self, url: &str) -> Result<()> {
        let mut state = self.lock();
        let path = url
            .strip_prefix(LINK_SCHEME)
            .ok_or_else(|| VeriquickError::Storage(format!("not a memory link: {url}")))?;
        if !state.objects.contains_key(path) {
            return Err(VeriquickError::Storage(format!("not found: {path}")));
        }
        state.revoked.insert(url.to_string());
        Ok(())
    }

    async fn refresh_credential(&self, refresh_token: &str) -> Result<String> {
        self.refreshes.fetch_add(1, Ordering::SeqCst);
        if self.refresh_fails {
            return Err(VeriquickError::RefreshFailed("refresh rejected".into()));
        }
        let generation = self.credentials.current().generation + 1;
        Ok(format!("{refresh_token}-{generation}"))
    }

    fn credentials(&self) -> &CredentialStore {
        &self.credentials
    }

    fn backend_name(&self) -> &'static str {
        "memory"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn revoke_marks_link() {
        let store = MemoryStore::new();
        store.upload(b"x", "/doc.pdf").await.unwrap();
        let url = store.create_shared_link("/doc.pdf").await.unwrap();
        store.revoke(&url).await.unwrap();
        assert!(store.is_revoked(&url));

        // Re-linking restores the link
        store.create_shared_link("/doc.pdf").await.unwrap();
        assert!(!store.is_revoked(&url));
    }

    #[tokio::test]
    async fn link_requires_uploaded_object() {
        let store = MemoryStore::new();
        assert!(store.create_shared_link("/missing").await.is_err());
        assert!(store.revoke("https://elsewhere/x").await.is_err());
    }

    #[tokio::test]
    async fn upload_overwrites() {
        let store = MemoryStore::new();
        store.upload(b"one", "/a").await.unwrap();
        store.upload(b"two", "/a").await.unwrap();
        assert_eq!(store.object("/a").as_deref(), Some(&b"two"[..]));
        assert_eq!(store.len(), 1);
    }
}
