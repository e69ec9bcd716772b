//! Layered application configuration
//!
//! Defaults, then an optional `config.toml` in the configuration
//! directory, then `UPQ_`-prefixed environment variables. Concurrency is
//! validated at the boundary: out-of-range values are rejected, never
//! silently clamped.

use crate::model::error::ValidationError;
use crate::services::transfer_client::DEFAULT_CHUNK_SIZE;
use crate::utils::get_config_dir;
use color_eyre::eyre;
use serde::{Deserialize, Serialize};
use std::time::Duration;

pub const MIN_CONCURRENT_UPLOADS: usize = 1;
pub const MAX_CONCURRENT_UPLOADS: usize = 10;

/// Accept a concurrency limit or reject it with no state change
pub fn validate_concurrency(limit: usize) -> Result<(), ValidationError> {
    if (MIN_CONCURRENT_UPLOADS..=MAX_CONCURRENT_UPLOADS).contains(&limit) {
        Ok(())
    } else {
        Err(ValidationError::new(format!(
            "max concurrent uploads must be between {} and {}, got {}",
            MIN_CONCURRENT_UPLOADS, MAX_CONCURRENT_UPLOADS, limit
        )))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct UploadConfig {
    /// Storage endpoint base URL
    pub endpoint: String,
    /// Parallel transfer limit, 1-10 inclusive
    pub max_concurrent_uploads: usize,
    /// Maximum path depth for folder selections
    pub max_path_depth: usize,
    /// Chunk size in bytes for the resumable protocol
    pub chunk_size: u64,
    /// Per-request timeout for storage calls
    pub request_timeout_secs: u64,
}

impl Default for UploadConfig {
    fn default() -> Self {
        UploadConfig {
            endpoint: "https://localhost:3000/api".to_string(),
            max_concurrent_uploads: 3,
            max_path_depth: 3,
            chunk_size: DEFAULT_CHUNK_SIZE,
            request_timeout_secs: 30,
        }
    }
}

impl UploadConfig {
    /// Load configuration from defaults, the optional config file, and
    /// the environment, then validate it.
    pub fn load() -> eyre::Result<UploadConfig> {
        let config_file = get_config_dir().join("config.toml");
        let mut builder =
            config::Config::builder().add_source(config::Config::try_from(&UploadConfig::default())?);
        if config_file.is_file() {
            builder = builder.add_source(config::File::from(config_file));
        }
        let loaded: UploadConfig = builder
            .add_source(config::Environment::with_prefix("UPQ").try_parsing(true))
            .build()?
            .try_deserialize()?;
        loaded.validate()?;
        Ok(loaded)
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        validate_concurrency(self.max_concurrent_uploads)?;
        if self.endpoint.is_empty() {
            return Err(ValidationError::new("endpoint must not be empty"));
        }
        if self.chunk_size == 0 {
            return Err(ValidationError::new("chunk size must be positive"));
        }
        if self.max_path_depth == 0 {
            return Err(ValidationError::new("max path depth must be positive"));
        }
        Ok(())
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = UploadConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.max_concurrent_uploads, 3);
        assert_eq!(config.max_path_depth, 3);
        assert_eq!(config.chunk_size, 6 * 1024 * 1024);
    }

    #[test]
    fn test_validate_concurrency_bounds() {
        assert!(validate_concurrency(1).is_ok());
        assert!(validate_concurrency(10).is_ok());
        assert!(validate_concurrency(0).is_err());
        assert!(validate_concurrency(11).is_err());
        assert!(validate_concurrency(15).is_err());
    }

    #[test]
    fn test_out_of_range_config_is_rejected() {
        let config = UploadConfig {
            max_concurrent_uploads: 15,
            ..UploadConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_zero_chunk_size_is_rejected() {
        let config = UploadConfig {
            chunk_size: 0,
            ..UploadConfig::default()
        };
        assert!(config.validate().is_err());
    }
}
