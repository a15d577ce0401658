//! Feed sizing and boundary configuration, loadable from TOML.
//!
//! ```toml
//! window_size = 25
//! page_size = 50
//! boundary = "fold"
//! ```

use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

const DEFAULT_SIZE: NonZeroUsize = NonZeroUsize::MIN.saturating_add(24);

/// What happens to records that leave the live window because newer ones arrived.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BoundaryPolicy {
	/// Records evicted from a full window move into the historical half, so
	/// nothing that was ever shown disappears when the window advances. A window
	/// that jumps past records never delivered starts a new generation that
	/// keeps everything shown and pages down from the new window first.
	#[default]
	Fold,
	/// Evicted records vanish until a later page read re-acquires them.
	Accept,
}

/// Sizing of one feed pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FeedConfig {
	/// Number of most-recent records kept current by the live subscription.
	pub window_size: NonZeroUsize,
	/// Maximum number of records fetched by one historical read.
	pub page_size: NonZeroUsize,
	/// Treatment of records evicted from the live window.
	pub boundary: BoundaryPolicy,
}

impl Default for FeedConfig {
	fn default() -> Self {
		Self {
			window_size: DEFAULT_SIZE,
			page_size: DEFAULT_SIZE,
			boundary: BoundaryPolicy::default(),
		}
	}
}

impl FeedConfig {
	/// Uses `size` for both the live window and historical pages.
	pub fn with_size(size: NonZeroUsize) -> Self {
		Self {
			window_size: size,
			page_size: size,
			..Self::default()
		}
	}

	#[must_use]
	pub fn boundary(mut self, boundary: BoundaryPolicy) -> Self {
		self.boundary = boundary;
		self
	}

	pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
		Ok(toml::from_str(text)?)
	}

	pub fn load(path: &Path) -> Result<Self, ConfigError> {
		let text = std::fs::read_to_string(path).map_err(|error| ConfigError::Io {
			path: path.to_path_buf(),
			error,
		})?;
		Self::from_toml_str(&text)
	}
}

/// Errors that can occur when loading feed configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
	/// Error reading a configuration file.
	#[error("I/O error reading {path}: {error}")]
	Io {
		/// Path to the file that failed to read.
		path: PathBuf,
		/// The underlying I/O error.
		error: std::io::Error,
	},

	/// Invalid TOML, unknown keys, or a zero size.
	#[error("invalid feed config: {0}")]
	Parse(#[from] toml::de::Error),
}

#[cfg(test)]
mod tests {
	use std::io::Write;

	use super::*;

	#[test]
	fn empty_document_yields_defaults() {
		assert_eq!(FeedConfig::from_toml_str("").unwrap(), FeedConfig::default());
	}

	#[test]
	fn partial_document_overrides_fields() {
		let config = FeedConfig::from_toml_str("page_size = 3\nboundary = \"accept\"\n").unwrap();
		assert_eq!(config.window_size.get(), 25);
		assert_eq!(config.page_size.get(), 3);
		assert_eq!(config.boundary, BoundaryPolicy::Accept);
	}

	#[test]
	fn zero_sizes_and_unknown_keys_are_rejected() {
		assert!(matches!(FeedConfig::from_toml_str("window_size = 0"), Err(ConfigError::Parse(_))));
		assert!(matches!(FeedConfig::from_toml_str("windowsize = 3"), Err(ConfigError::Parse(_))));
	}

	#[test]
	fn load_reads_file_and_reports_missing_path() {
		let mut file = tempfile::NamedTempFile::new().unwrap();
		writeln!(file, "window_size = 7").unwrap();
		assert_eq!(FeedConfig::load(file.path()).unwrap().window_size.get(), 7);

		let missing = file.path().with_extension("missing");
		assert!(matches!(FeedConfig::load(&missing), Err(ConfigError::Io { .. })));
	}
}
