// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Error types for the core policy model.

use thiserror::Error;

/// Errors raised while building or validating policy model values.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CoreError {
	/// Action string is not one of select/insert/update/delete/all
	#[error("unknown action: {0}")]
	UnknownAction(String),

	/// Entity type string is not recognised
	#[error("unknown entity type: {0}")]
	UnknownEntityType(String),

	/// Policy type string is not recognised
	#[error("unknown policy type: {0}")]
	UnknownPolicyType(String),

	/// Table or column name is not a plain SQL identifier
	#[error("unsafe identifier: {0:?}")]
	UnsafeIdentifier(String),

	/// Table is not present in the configured table registry
	#[error("table not allowed: {0}")]
	TableNotAllowed(String),

	/// Custom condition could not be parsed
	#[error("condition parse error at {position}: {message}")]
	ConditionParse { position: usize, message: String },

	/// Policy definition failed validation
	#[error("invalid policy: {0}")]
	InvalidPolicy(String),
}

/// Result type for core operations.
pub type Result<T> = std::result::Result<T, CoreError>;
