//! Application configuration.
//!
//! Defaults are compile-time constants; deployments override them through
//! environment variables (a `.env` file is loaded first when present) and
//! CLI flags override the environment.

use std::env;

use crate::error::{PipelineError, PipelineResult};

/// Rows per chunk when nothing else is configured.
///
/// Each chunk is uploaded row by row and then broadcast as one transaction.
pub const DEFAULT_CHUNK_SIZE: usize = 15;

/// HTTP server port.
pub const DEFAULT_PORT: u16 = 3000;

/// Directory where mapping presets are stored (relative to current dir).
pub const DEFAULT_REGISTRY_DIR: &str = ".fieldload/mappings";

/// Maximum accepted upload size for `/api/import` (in bytes).
pub const MAX_UPLOAD_SIZE: usize = 50 * 1024 * 1024;

/// Capacity of the status and log broadcast channels.
pub const EVENT_CHANNEL_CAPACITY: usize = 256;

pub const ENV_CHUNK_SIZE: &str = "FIELDLOAD_CHUNK_SIZE";
pub const ENV_UPLOAD_URL: &str = "FIELDLOAD_UPLOAD_URL";
pub const ENV_UPLOAD_TOKEN: &str = "FIELDLOAD_UPLOAD_TOKEN";
pub const ENV_BROADCAST_URL: &str = "FIELDLOAD_BROADCAST_URL";

/// Settings for one submission pipeline.
#[derive(Debug, Clone, PartialEq)]
pub struct SubmitConfig {
    /// Rows per chunk. At least 1; only [`SubmitConfig::new`] sets it.
    chunk_size: usize,
}

impl SubmitConfig {
    /// Build a config, rejecting a zero chunk size.
    pub fn new(chunk_size: usize) -> PipelineResult<Self> {
        if chunk_size == 0 {
            return Err(PipelineError::InvalidChunkSize(chunk_size));
        }
        Ok(Self { chunk_size })
    }

    /// Read `FIELDLOAD_CHUNK_SIZE`, falling back to [`DEFAULT_CHUNK_SIZE`]
    /// when unset or not a number.
    pub fn from_env() -> PipelineResult<Self> {
        let chunk_size = env::var(ENV_CHUNK_SIZE)
            .ok()
            .and_then(|v| v.trim().parse::<usize>().ok())
            .unwrap_or(DEFAULT_CHUNK_SIZE);
        Self::new(chunk_size)
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }
}

impl Default for SubmitConfig {
    fn default() -> Self {
        Self { chunk_size: DEFAULT_CHUNK_SIZE }
    }
}

/// Endpoints of the remote upload and broadcast services.
#[derive(Debug, Clone, Default)]
pub struct ServiceConfig {
    /// Record upload endpoint.
    pub upload_url: Option<String>,
    /// Bearer token sent with uploads.
    pub upload_token: Option<String>,
    /// Broadcast relay endpoint.
    pub broadcast_url: Option<String>,
}

impl ServiceConfig {
    /// Load endpoints from the environment (after reading `.env`).
    pub fn from_env() -> Self {
        let _ = dotenvy::dotenv();

        Self {
            upload_url: non_empty_var(ENV_UPLOAD_URL),
            upload_token: non_empty_var(ENV_UPLOAD_TOKEN),
            broadcast_url: non_empty_var(ENV_BROADCAST_URL),
        }
    }
}

fn non_empty_var(key: &str) -> Option<String> {
    env::var(key).ok().filter(|v| !v.trim().is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zero_chunk_size_rejected() {
        assert_eq!(SubmitConfig::new(0), Err(PipelineError::InvalidChunkSize(0)));
    }

    #[test]
    fn test_default_chunk_size() {
        assert_eq!(SubmitConfig::default().chunk_size(), DEFAULT_CHUNK_SIZE);
        assert_eq!(SubmitConfig::new(40).unwrap().chunk_size(), 40);
    }
}
