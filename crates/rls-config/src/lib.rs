// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Configuration for the row-level security engine.
//!
//! This crate provides:
//! - Layered configuration from multiple sources (defaults, TOML file, environment)
//! - Type-safe configuration with validation
//! - Consistent environment variable naming (`RLS_*`)
//!
//! # Usage
//!
//! ```ignore
//! use rls_config::load_config;
//!
//! let config = load_config()?;
//! println!("Policies stored in {}", config.database.url);
//! ```

pub mod error;
pub mod layer;
pub mod sections;
pub mod sources;

pub use error::ConfigError;
pub use layer::RlsConfigLayer;
pub use sections::*;
pub use sources::{ConfigSource, DefaultsSource, EnvSource, Precedence, TomlSource};

use tracing::{debug, info};

/// Fully resolved engine configuration.
#[derive(Debug, Clone, Default)]
pub struct RlsConfig {
	pub database: DatabaseConfig,
	pub context: ContextConfig,
	pub audit: AuditConfig,
	pub evaluation: EvaluationConfig,
	pub logging: LoggingConfig,
}

/// Load configuration from all sources with standard precedence.
///
/// Precedence (highest to lowest):
/// 1. Environment variables (`RLS_*`)
/// 2. Config file (`/etc/rls/engine.toml`)
/// 3. Built-in defaults
pub fn load_config() -> Result<RlsConfig, ConfigError> {
	load_from_sources(vec![
		Box::new(DefaultsSource),
		Box::new(TomlSource::system()),
		Box::new(EnvSource),
	])
}

/// Load configuration from environment only (for testing or simple deployments).
pub fn load_config_from_env() -> Result<RlsConfig, ConfigError> {
	let mut merged = RlsConfigLayer::default();
	merged.merge(EnvSource.load()?);
	finalize(merged)
}

/// Load configuration with a custom config file path.
pub fn load_config_with_file(
	config_path: impl Into<std::path::PathBuf>,
) -> Result<RlsConfig, ConfigError> {
	load_from_sources(vec![
		Box::new(DefaultsSource),
		Box::new(TomlSource::new(config_path)),
		Box::new(EnvSource),
	])
}

fn load_from_sources(mut sources: Vec<Box<dyn ConfigSource>>) -> Result<RlsConfig, ConfigError> {
	sources.sort_by_key(|s| s.precedence());

	let mut merged = RlsConfigLayer::default();
	for source in sources {
		debug!(source = source.name(), "loading configuration source");
		let layer = source.load()?;
		merged.merge(layer);
	}

	finalize(merged)
}

/// Finalize configuration layer into resolved config.
pub fn finalize(layer: RlsConfigLayer) -> Result<RlsConfig, ConfigError> {
	let config = RlsConfig {
		database: layer.database.unwrap_or_default().finalize(),
		context: layer.context.unwrap_or_default().finalize(),
		audit: layer.audit.unwrap_or_default().finalize(),
		evaluation: layer.evaluation.unwrap_or_default().finalize(),
		logging: layer.logging.unwrap_or_default().finalize(),
	};

	validate_config(&config)?;

	info!(
		database = %config.database.url,
		context_ttl_secs = config.context.ttl_secs,
		audit_enabled = config.audit.enabled,
		store_timeout_ms = config.evaluation.store_timeout_ms,
		allowed_tables = config.evaluation.allowed_tables.len(),
		"RLS configuration loaded"
	);

	Ok(config)
}

/// Validate cross-field configuration rules.
fn validate_config(config: &RlsConfig) -> Result<(), ConfigError> {
	if config.context.ttl_secs == 0 {
		return Err(ConfigError::Validation(
			"context.ttl_secs must be greater than zero".to_string(),
		));
	}
	if config.evaluation.store_timeout_ms == 0 {
		return Err(ConfigError::Validation(
			"evaluation.store_timeout_ms must be greater than zero".to_string(),
		));
	}
	if let Some(bad) = config
		.evaluation
		.allowed_tables
		.iter()
		.find(|t| !is_plain_identifier(t))
	{
		return Err(ConfigError::Validation(format!(
			"evaluation.allowed_tables contains an invalid table name '{bad}'"
		)));
	}
	Ok(())
}

fn is_plain_identifier(name: &str) -> bool {
	let mut chars = name.chars();
	matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_')
		&& chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

#[cfg(test)]
mod tests {
	use super::*;
	use proptest::prelude::*;
	use std::io::Write;

	#[test]
	fn test_defaults_finalize() {
		let config = finalize(RlsConfigLayer::default()).unwrap();
		assert_eq!(config.database.url, "sqlite:./rls.db");
		assert_eq!(config.context.ttl_secs, 86_400);
		assert!(config.audit.enabled);
		assert_eq!(config.evaluation.store_timeout_ms, 5_000);
		assert!(config.evaluation.allowed_tables.is_empty());
		assert_eq!(config.logging.level, "info");
	}

	#[test]
	fn test_zero_ttl_rejected() {
		let layer = RlsConfigLayer {
			context: Some(ContextConfigLayer { ttl_secs: Some(0) }),
			..Default::default()
		};
		let err = finalize(layer).unwrap_err();
		assert!(err.to_string().contains("ttl_secs"));
	}

	#[test]
	fn test_zero_timeout_rejected() {
		let layer = RlsConfigLayer {
			evaluation: Some(EvaluationConfigLayer {
				store_timeout_ms: Some(0),
				allowed_tables: None,
			}),
			..Default::default()
		};
		assert!(finalize(layer).is_err());
	}

	#[test]
	fn test_invalid_table_rejected() {
		let layer = RlsConfigLayer {
			evaluation: Some(EvaluationConfigLayer {
				store_timeout_ms: None,
				allowed_tables: Some(vec!["projects; drop".to_string()]),
			}),
			..Default::default()
		};
		assert!(matches!(finalize(layer), Err(ConfigError::Validation(_))));
	}

	#[test]
	fn test_file_overrides_defaults() {
		let mut file = tempfile::NamedTempFile::new().unwrap();
		writeln!(file, "[audit]\nenabled = false\n[context]\nttl_secs = 120").unwrap();

		let mut merged = RlsConfigLayer::default();
		merged.merge(DefaultsSource.load().unwrap());
		merged.merge(TomlSource::new(file.path()).load().unwrap());
		let config = finalize(merged).unwrap();

		assert!(!config.audit.enabled);
		assert_eq!(config.context.ttl_secs, 120);
	}

	proptest! {
		#[test]
		fn test_positive_ttl_always_accepted(ttl in 1u64..10_000_000) {
			let layer = RlsConfigLayer {
				context: Some(ContextConfigLayer { ttl_secs: Some(ttl) }),
				..Default::default()
			};
			prop_assert_eq!(finalize(layer).unwrap().context.ttl_secs, ttl);
		}
	}
}
