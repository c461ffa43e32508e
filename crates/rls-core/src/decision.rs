// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use serde::{Deserialize, Serialize};

/// Outcome of an access check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Decision {
	pub granted: bool,
	pub reason: Option<String>,
}

impl Decision {
	pub fn allow() -> Self {
		Self {
			granted: true,
			reason: None,
		}
	}

	pub fn deny(reason: impl Into<String>) -> Self {
		Self {
			granted: false,
			reason: Some(reason.into()),
		}
	}

	pub fn is_granted(&self) -> bool {
		self.granted
	}

	/// Denial reason, or the empty string when granted.
	pub fn reason(&self) -> &str {
		self.reason.as_deref().unwrap_or("")
	}
}

impl From<Decision> for (bool, String) {
	fn from(d: Decision) -> Self {
		(d.granted, d.reason.unwrap_or_default())
	}
}
