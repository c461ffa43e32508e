// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Session context lifetime.

use std::time::Duration;

use serde::Deserialize;

const DEFAULT_TTL_SECS: u64 = 24 * 60 * 60;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContextConfig {
	pub ttl_secs: u64,
}

impl ContextConfig {
	pub fn ttl(&self) -> Duration {
		Duration::from_secs(self.ttl_secs)
	}
}

impl Default for ContextConfig {
	fn default() -> Self {
		Self {
			ttl_secs: DEFAULT_TTL_SECS,
		}
	}
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ContextConfigLayer {
	#[serde(default)]
	pub ttl_secs: Option<u64>,
}

impl ContextConfigLayer {
	pub fn merge(&mut self, other: ContextConfigLayer) {
		if other.ttl_secs.is_some() {
			self.ttl_secs = other.ttl_secs;
		}
	}

	pub fn finalize(self) -> ContextConfig {
		ContextConfig {
			ttl_secs: self.ttl_secs.unwrap_or(DEFAULT_TTL_SECS),
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_default_ttl_is_one_day() {
		let config = ContextConfigLayer::default().finalize();
		assert_eq!(config.ttl(), Duration::from_secs(86_400));
	}
}
