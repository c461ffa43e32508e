// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use std::future::Future;
use std::time::Duration;

use rls_core::{CoreError, UserId};
use rls_db::DbError;

#[derive(Debug, thiserror::Error)]
pub enum EngineError {
	#[error(transparent)]
	Db(#[from] DbError),

	#[error(transparent)]
	Core(#[from] CoreError),

	#[error("store call timed out after {0:?}")]
	Timeout(Duration),

	#[error("user not found: {0}")]
	UserNotFound(UserId),

	#[error("invalid configuration: {0}")]
	Config(String),
}

pub type Result<T> = std::result::Result<T, EngineError>;

/// Runs a store call under a deadline. An elapsed deadline is an error.
pub(crate) async fn with_timeout<T, E, F>(limit: Duration, call: F) -> Result<T>
where
	F: Future<Output = std::result::Result<T, E>>,
	E: Into<EngineError>,
{
	match tokio::time::timeout(limit, call).await {
		Ok(result) => result.map_err(Into::into),
		Err(_) => Err(EngineError::Timeout(limit)),
	}
}
