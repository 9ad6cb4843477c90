//! Server configuration module
//!
//! Handles loading configuration from environment variables with sensible defaults.

use std::net::SocketAddr;
use std::str::FromStr;

use veriquick_core::{BarcodeOptions, EcLevel};

/// Which `DocumentStore` backs the intake endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageKind {
    /// In-process store (tests, demos)
    Memory,
    /// Dropbox, configured from DROPBOX_* variables
    Dropbox,
}

impl FromStr for StorageKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "memory" => Ok(Self::Memory),
            "dropbox" => Ok(Self::Dropbox),
            other => Err(format!("unknown storage backend '{other}'")),
        }
    }
}

/// Server configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct Config {
    /// Server port (default: 3000)
    pub port: u16,
    /// Server host (default: 127.0.0.1)
    pub host: [u8; 4],
    /// Allowed CORS origins, comma-separated (default: allow all in dev)
    pub allowed_origins: Option<Vec<String>>,
    /// Request body limit in MB (default: 50)
    pub body_limit_mb: usize,
    /// Maximum file size per upload in MB (default: 25)
    pub max_file_size_mb: usize,
    /// Request timeout in seconds (default: 60)
    pub timeout_secs: u64,
    /// Enable rate limiting (default: false for tests, true when loaded from env)
    pub rate_limit_enabled: bool,
    /// Rate limit: requests per second (default: 10)
    pub rate_limit_per_sec: u64,
    /// Rate limit: burst size (default: 20)
    pub rate_limit_burst: u32,
    /// QR rendering options (QR_EC_LEVEL, QR_MODULE_SIZE, QR_BORDER)
    pub barcode: BarcodeOptions,
    /// Storage backend (default: memory)
    pub storage: StorageKind,
    /// Folder inside the storage backend (default: root)
    pub storage_root: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: 3000,
            host: [127, 0, 0, 1],
            allowed_origins: None, // None = allow all (dev mode)
            body_limit_mb: 50,
            max_file_size_mb: 25,
            timeout_secs: 60,
            rate_limit_enabled: false, // Disabled by default (for tests)
            rate_limit_per_sec: 10,
            rate_limit_burst: 20,
            barcode: BarcodeOptions::default(),
            storage: StorageKind::Memory,
            storage_root: String::new(),
        }
    }
}

fn env_parse<T: FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|v| v.parse().ok())
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let host = std::env::var("HOST")
            .ok()
            .map(|h| {
                if h == "0.0.0.0" {
                    [0, 0, 0, 0]
                } else {
                    [127, 0, 0, 1]
                }
            })
            .unwrap_or(defaults.host);

        let allowed_origins = std::env::var("ALLOWED_ORIGINS").ok().map(|origins| {
            origins
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect()
        });

        // Rate limiting enabled by default in production, can be disabled with RATE_LIMIT_ENABLED=false
        let rate_limit_enabled = std::env::var("RATE_LIMIT_ENABLED")
            .map(|v| v.to_lowercase() != "false")
            .unwrap_or(true);

        let level = match std::env::var("QR_EC_LEVEL") {
            Ok(value) => value.parse::<EcLevel>().unwrap_or_else(|e| {
                tracing::warn!(error = %e, "Ignoring QR_EC_LEVEL");
                defaults.barcode.level
            }),
            Err(_) => defaults.barcode.level,
        };
        let barcode = BarcodeOptions {
            level,
            module_size: env_parse("QR_MODULE_SIZE")
                .filter(|m: &u32| *m > 0)
                .unwrap_or(defaults.barcode.module_size),
            border: env_parse("QR_BORDER").unwrap_or(defaults.barcode.border),
        };

        let storage = match std::env::var("STORAGE_BACKEND") {
            Ok(value) => value.parse().unwrap_or_else(|e: String| {
                tracing::warn!(error = %e, "Falling back to memory storage");
                StorageKind::Memory
            }),
            Err(_) => defaults.storage,
        };

        Self {
            port: env_parse("PORT").unwrap_or(defaults.port),
            host,
            allowed_origins,
            body_limit_mb: env_parse("BODY_LIMIT_MB").unwrap_or(defaults.body_limit_mb),
            max_file_size_mb: env_parse("MAX_FILE_SIZE_MB").unwrap_or(defaults.max_file_size_mb),
            timeout_secs: env_parse("REQUEST_TIMEOUT_SECS").unwrap_or(defaults.timeout_secs),
            rate_limit_enabled,
            rate_limit_per_sec: env_parse("RATE_LIMIT_PER_SEC")
                .unwrap_or(defaults.rate_limit_per_sec),
            rate_limit_burst: env_parse("RATE_LIMIT_BURST").unwrap_or(defaults.rate_limit_burst),
            barcode,
            storage,
            storage_root: std::env::var("STORAGE_ROOT").unwrap_or(defaults.storage_root),
        }
    }

    /// Get socket address from config
    pub fn socket_addr(&self) -> SocketAddr {
        SocketAddr::from((self.host, self.port))
    }

    /// Per-file upload limit in bytes
    pub fn max_file_size(&self) -> usize {
        self.max_file_size_mb * 1024 * 1024
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.port, 3000);
        assert_eq!(config.storage, StorageKind::Memory);
        assert_eq!(config.barcode.level, EcLevel::L);
        assert!(!config.rate_limit_enabled);
        assert_eq!(config.max_file_size(), 25 * 1024 * 1024);
    }

    #[test]
    fn test_storage_kind_parsing() {
        assert_eq!("memory".parse::<StorageKind>(), Ok(StorageKind::Memory));
        assert_eq!(" Dropbox ".parse::<StorageKind>(), Ok(StorageKind::Dropbox));
        assert!("s3".parse::<StorageKind>().is_err());
    }

    #[test]
    fn test_socket_addr() {
        let config = Config::default();
        assert_eq!(config.socket_addr().to_string(), "127.0.0.1:3000");
    }
}
