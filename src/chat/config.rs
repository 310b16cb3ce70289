//! Node configuration.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::chat::error::ChatError;
use crate::chat::transport::DEFAULT_MAX_RECORD_LEN;
use crate::crypto::{DEFAULT_PRIMALITY_ROUNDS, KEY_LENGTH_BITS};

/// Default listen address.
pub const DEFAULT_LISTEN_ADDR: &str = "127.0.0.1:8090";

/// Smallest prime size accepted for ring rounds.
pub const MIN_PRIME_BITS: u64 = 16;

/// Configuration for a chat node.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct NodeConfig {
    /// Address to accept peer links on, `host:port`.
    pub listen_addr: String,

    /// Prime size in bits for rounds this node initiates.
    pub prime_bits: u64,

    /// Miller-Rabin rounds when generating primes.
    pub primality_rounds: usize,

    /// Maximum accepted wire record length in bytes.
    pub max_record_len: usize,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            listen_addr: DEFAULT_LISTEN_ADDR.to_string(),
            prime_bits: KEY_LENGTH_BITS,
            primality_rounds: DEFAULT_PRIMALITY_ROUNDS,
            max_record_len: DEFAULT_MAX_RECORD_LEN,
        }
    }
}

impl NodeConfig {
    /// Create a config listening on `listen_addr` with default crypto settings.
    pub fn new(listen_addr: impl Into<String>) -> Self {
        Self {
            listen_addr: listen_addr.into(),
            ..Default::default()
        }
    }

    /// Override the prime size.
    pub fn with_prime_bits(mut self, prime_bits: u64) -> Self {
        self.prime_bits = prime_bits;
        self
    }

    /// Load configuration from a TOML file.
    pub fn load(path: &Path) -> Result<Self, ChatError> {
        let content = fs::read_to_string(path)
            .map_err(|e| ChatError::Config(format!("Failed to read {}: {}", path.display(), e)))?;
        let config: Self = toml::from_str(&content)
            .map_err(|e| ChatError::Config(format!("Failed to parse {}: {}", path.display(), e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Load the default config file if it exists, otherwise return defaults.
    pub fn load_or_default() -> Result<Self, ChatError> {
        match Self::default_path() {
            Some(path) if path.exists() => Self::load(&path),
            _ => Ok(Self::default()),
        }
    }

    /// `<config_dir>/ringchat/config.toml`
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir()
            .or_else(|| dirs::home_dir().map(|h| h.join(".config")))
            .map(|dir| dir.join("ringchat").join("config.toml"))
    }

    /// Reject settings the node cannot run with.
    pub fn validate(&self) -> Result<(), ChatError> {
        if self.prime_bits < MIN_PRIME_BITS {
            return Err(ChatError::Config(format!(
                "prime_bits must be at least {}, got {}",
                MIN_PRIME_BITS, self.prime_bits
            )));
        }
        if self.primality_rounds == 0 {
            return Err(ChatError::Config("primality_rounds must be positive".into()));
        }
        if self.max_record_len == 0 {
            return Err(ChatError::Config("max_record_len must be positive".into()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_config() {
        let config = NodeConfig::default();
        assert_eq!(config.listen_addr, DEFAULT_LISTEN_ADDR);
        assert_eq!(config.prime_bits, KEY_LENGTH_BITS);
        assert_eq!(config.primality_rounds, DEFAULT_PRIMALITY_ROUNDS);
        assert_eq!(config.max_record_len, DEFAULT_MAX_RECORD_LEN);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_builder_overrides() {
        let config = NodeConfig::new("0.0.0.0:9000").with_prime_bits(64);
        assert_eq!(config.listen_addr, "0.0.0.0:9000");
        assert_eq!(config.prime_bits, 64);
    }

    #[test]
    fn test_load_partial_file_keeps_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "listen_addr = \"127.0.0.1:9100\"").unwrap();
        writeln!(file, "prime_bits = 96").unwrap();

        let config = NodeConfig::load(file.path()).unwrap();
        assert_eq!(config.listen_addr, "127.0.0.1:9100");
        assert_eq!(config.prime_bits, 96);
        assert_eq!(config.primality_rounds, DEFAULT_PRIMALITY_ROUNDS);
    }

    #[test]
    fn test_load_rejects_tiny_primes() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "prime_bits = 8").unwrap();

        assert!(matches!(
            NodeConfig::load(file.path()),
            Err(ChatError::Config(_))
        ));
    }

    #[test]
    fn test_load_missing_file_fails() {
        let dir = tempfile::tempdir().unwrap();
        let result = NodeConfig::load(&dir.path().join("absent.toml"));
        assert!(matches!(result, Err(ChatError::Config(_))));
    }
}
