//! TOML configuration for a pool of random-payload producers.
//!
//! ```toml
//! mode = "synchronized"        # or "unsynchronized"
//! producers = ["one", "two", "three"]
//! max_sleep_ms = 1000
//! payload_bound = 100
//! seed = 42                    # optional; omit for OS entropy
//! rounds = 10
//! shutdown_timeout_ms = 1000
//! ```
//!
//! Every key is optional.

use std::collections::HashSet;
use std::path::Path;
use std::time::Duration;

use serde::Deserialize;

use crate::error::ConfigError;
use crate::generator::DEFAULT_PAYLOAD_BOUND;
use crate::pool::Mode;
use crate::producer::DEFAULT_MAX_SLEEP;

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PoolConfig {
	pub mode: Mode,
	/// One producer per label, in id order.
	pub producers: Vec<String>,
	pub max_sleep_ms: u64,
	/// Exclusive upper bound of generated payloads.
	pub payload_bound: i64,
	pub seed: Option<u64>,
	/// Rounds the synchronized demonstration runs before shutting down.
	pub rounds: usize,
	pub shutdown_timeout_ms: u64,
}

impl Default for PoolConfig {
	fn default() -> Self {
		Self {
			mode: Mode::default(),
			producers: ["one", "two", "three"].map(String::from).to_vec(),
			max_sleep_ms: DEFAULT_MAX_SLEEP.as_millis() as u64,
			payload_bound: DEFAULT_PAYLOAD_BOUND,
			seed: None,
			rounds: 10,
			shutdown_timeout_ms: 1000,
		}
	}
}

impl PoolConfig {
	/// Parses and validates a TOML document.
	pub fn from_toml_str(input: &str) -> Result<Self, ConfigError> {
		let config: Self = toml::from_str(input)?;
		config.validate()?;
		Ok(config)
	}

	/// Reads, parses and validates a TOML file.
	pub fn load(path: &Path) -> Result<Self, ConfigError> {
		let input = std::fs::read_to_string(path).map_err(|error| ConfigError::Io {
			path: path.to_path_buf(),
			error,
		})?;
		Self::from_toml_str(&input)
	}

	pub fn validate(&self) -> Result<(), ConfigError> {
		if self.producers.is_empty() {
			return Err(ConfigError::NoProducers);
		}
		let mut seen = HashSet::with_capacity(self.producers.len());
		if let Some(duplicate) = self.producers.iter().find(|label| !seen.insert(label.as_str())) {
			return Err(ConfigError::DuplicateLabel(duplicate.clone()));
		}
		if self.payload_bound <= 0 {
			return Err(ConfigError::InvalidPayloadBound(self.payload_bound));
		}
		Ok(())
	}

	pub fn max_sleep(&self) -> Duration {
		Duration::from_millis(self.max_sleep_ms)
	}

	pub fn shutdown_timeout(&self) -> Duration {
		Duration::from_millis(self.shutdown_timeout_ms)
	}
}

#[cfg(test)]
mod tests {
	use std::io::Write;

	use pretty_assertions::assert_eq;

	use super::*;

	#[test]
	fn empty_document_uses_defaults() {
		let config = PoolConfig::from_toml_str("").unwrap();
		assert_eq!(config, PoolConfig::default());
		assert_eq!(config.mode, Mode::Synchronized);
		assert_eq!(config.producers, vec!["one", "two", "three"]);
		assert_eq!(config.max_sleep(), Duration::from_secs(1));
	}

	#[test]
	fn parses_every_key() {
		const CONFIG: &str = r#"
mode = "unsynchronized"
producers = ["a", "b"]
max_sleep_ms = 0
payload_bound = 7
seed = 42
rounds = 3
shutdown_timeout_ms = 250
"#;
		let config = PoolConfig::from_toml_str(CONFIG).unwrap();
		assert_eq!(
			config,
			PoolConfig {
				mode: Mode::Unsynchronized,
				producers: vec!["a".into(), "b".into()],
				max_sleep_ms: 0,
				payload_bound: 7,
				seed: Some(42),
				rounds: 3,
				shutdown_timeout_ms: 250,
			}
		);
		assert_eq!(config.shutdown_timeout(), Duration::from_millis(250));
	}

	#[test]
	fn rejects_invalid_pools() {
		assert!(matches!(PoolConfig::from_toml_str("producers = []"), Err(ConfigError::NoProducers)));
		assert!(matches!(
			PoolConfig::from_toml_str(r#"producers = ["x", "y", "x"]"#),
			Err(ConfigError::DuplicateLabel(label)) if label == "x"
		));
		assert!(matches!(PoolConfig::from_toml_str("payload_bound = 0"), Err(ConfigError::InvalidPayloadBound(0))));
		assert!(matches!(PoolConfig::from_toml_str("mode = \"eventually\""), Err(ConfigError::Toml(_))));
		assert!(matches!(PoolConfig::from_toml_str("workers = 3"), Err(ConfigError::Toml(_))));
	}

	#[test]
	fn loads_from_file() {
		let mut file = tempfile::NamedTempFile::new().unwrap();
		writeln!(file, "rounds = 2").unwrap();
		let config = PoolConfig::load(file.path()).unwrap();
		assert_eq!(config.rounds, 2);

		let missing = PoolConfig::load(Path::new("/nonexistent/confluence.toml"));
		assert!(matches!(missing, Err(ConfigError::Io { .. })));
	}
}
