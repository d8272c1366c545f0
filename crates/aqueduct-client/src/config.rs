use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::ClientError;

pub const ADDRESS_ENV: &str = "AQUEDUCT_ADDRESS";
pub const API_KEY_ENV: &str = "AQUEDUCT_API_KEY";
pub const RUNTIME_VERSION_ENV: &str = "AQUEDUCT_RUNTIME_VERSION";

const DEFAULT_TIMEOUT_SECS: u64 = 60;

fn default_timeout_secs() -> u64 {
  DEFAULT_TIMEOUT_SECS
}

/// Connection settings for the orchestration server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClientConfig {
  /// `host:port`, optionally with a scheme. `http` is assumed when absent.
  pub address: String,
  pub api_key: String,
  /// Language runtime the flows are authored against. Compared with the
  /// runtime the server reports at publish.
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub runtime_version: Option<String>,
  #[serde(default = "default_timeout_secs")]
  pub timeout_secs: u64,
}

impl ClientConfig {
  pub fn new(address: impl Into<String>, api_key: impl Into<String>) -> Self {
    Self {
      address: address.into(),
      api_key: api_key.into(),
      runtime_version: None,
      timeout_secs: DEFAULT_TIMEOUT_SECS,
    }
  }

  /// Load from `AQUEDUCT_ADDRESS`, `AQUEDUCT_API_KEY` and the optional
  /// `AQUEDUCT_RUNTIME_VERSION`.
  pub fn from_env() -> Result<Self, ClientError> {
    let address = std::env::var(ADDRESS_ENV)
      .map_err(|_| ClientError::config(format!("{} is not set", ADDRESS_ENV)))?;
    let api_key = std::env::var(API_KEY_ENV)
      .map_err(|_| ClientError::config(format!("{} is not set", API_KEY_ENV)))?;
    let mut config = Self::new(address, api_key);
    config.runtime_version = std::env::var(RUNTIME_VERSION_ENV).ok();
    config.validate()?;
    Ok(config)
  }

  /// Load from a JSON file.
  pub fn from_file(path: &Path) -> Result<Self, ClientError> {
    let content = std::fs::read_to_string(path)?;
    let config: ClientConfig = serde_json::from_str(&content)?;
    config.validate()?;
    Ok(config)
  }

  pub fn validate(&self) -> Result<(), ClientError> {
    if self.address.trim().is_empty() {
      return Err(ClientError::config("address must not be empty"));
    }
    if self.api_key.trim().is_empty() {
      return Err(ClientError::config("api_key must not be empty"));
    }
    if self.timeout_secs == 0 {
      return Err(ClientError::config("timeout_secs must be positive"));
    }
    Ok(())
  }

  /// The address with a scheme and without a trailing slash.
  pub fn base_url(&self) -> String {
    let address = self.address.trim().trim_end_matches('/');
    if address.starts_with("http://") || address.starts_with("https://") {
      address.to_string()
    } else {
      format!("http://{}", address)
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::io::Write;

  #[test]
  fn test_base_url() {
    assert_eq!(
      ClientConfig::new("localhost:8080", "key").base_url(),
      "http://localhost:8080"
    );
    assert_eq!(
      ClientConfig::new("https://aqueduct.example.com/", "key").base_url(),
      "https://aqueduct.example.com"
    );
  }

  #[test]
  fn test_from_file_defaults_timeout() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    write!(
      file,
      r#"{{"address": "localhost:8080", "api_key": "secret"}}"#
    )
    .unwrap();

    let config = ClientConfig::from_file(file.path()).unwrap();
    assert_eq!(config.api_key, "secret");
    assert_eq!(config.timeout_secs, 60);
    assert!(config.runtime_version.is_none());
  }

  #[test]
  fn test_validate_rejects_empty_fields() {
    assert!(ClientConfig::new("", "key").validate().is_err());
    assert!(ClientConfig::new("localhost:8080", " ").validate().is_err());

    let mut config = ClientConfig::new("localhost:8080", "key");
    config.timeout_secs = 0;
    assert!(matches!(
      config.validate(),
      Err(ClientError::Config { .. })
    ));
  }
}
