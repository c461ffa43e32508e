// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Policy evaluation limits.

use std::time::Duration;

use serde::Deserialize;

const DEFAULT_STORE_TIMEOUT_MS: u64 = 5_000;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EvaluationConfig {
	/// Deadline for each store call made while deciding access.
	pub store_timeout_ms: u64,
	/// Tables policies may read from. Empty admits any plain identifier.
	pub allowed_tables: Vec<String>,
}

impl EvaluationConfig {
	pub fn store_timeout(&self) -> Duration {
		Duration::from_millis(self.store_timeout_ms)
	}
}

impl Default for EvaluationConfig {
	fn default() -> Self {
		Self {
			store_timeout_ms: DEFAULT_STORE_TIMEOUT_MS,
			allowed_tables: Vec::new(),
		}
	}
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct EvaluationConfigLayer {
	#[serde(default)]
	pub store_timeout_ms: Option<u64>,
	#[serde(default)]
	pub allowed_tables: Option<Vec<String>>,
}

impl EvaluationConfigLayer {
	pub fn merge(&mut self, other: EvaluationConfigLayer) {
		if other.store_timeout_ms.is_some() {
			self.store_timeout_ms = other.store_timeout_ms;
		}
		if other.allowed_tables.is_some() {
			self.allowed_tables = other.allowed_tables;
		}
	}

	pub fn finalize(self) -> EvaluationConfig {
		EvaluationConfig {
			store_timeout_ms: self.store_timeout_ms.unwrap_or(DEFAULT_STORE_TIMEOUT_MS),
			allowed_tables: self.allowed_tables.unwrap_or_default(),
		}
	}
}
