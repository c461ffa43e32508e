// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! SQL building blocks shared by the evaluator and the filter builder.
//!
//! Values never reach query text: they travel as [`SqlValue`] binds. Table and
//! column names cannot be bound, so they must pass [`validate_identifier`] and
//! are always emitted through [`quote_identifier`].

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::error::{CoreError, Result};
use crate::types::UserId;

/// A single bind value or scalar result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SqlValue {
	Null,
	Bool(bool),
	Integer(i64),
	Text(String),
}

impl SqlValue {
	/// Returns true if this scalar identifies the given user.
	///
	/// Owner columns may be stored as integers or as their decimal text.
	pub fn is_user(&self, user_id: UserId) -> bool {
		match self {
			SqlValue::Integer(v) => *v == user_id.get(),
			SqlValue::Text(s) => s.trim().parse::<i64>().ok() == Some(user_id.get()),
			SqlValue::Null | SqlValue::Bool(_) => false,
		}
	}

	/// SQL truthiness of a scalar result (NULL is false).
	pub fn is_truthy(&self) -> bool {
		match self {
			SqlValue::Null => false,
			SqlValue::Bool(b) => *b,
			SqlValue::Integer(v) => *v != 0,
			SqlValue::Text(s) => s.trim().parse::<f64>().map(|f| f != 0.0).unwrap_or(false),
		}
	}
}

impl From<i64> for SqlValue {
	fn from(v: i64) -> Self {
		SqlValue::Integer(v)
	}
}

impl From<UserId> for SqlValue {
	fn from(v: UserId) -> Self {
		SqlValue::Integer(v.get())
	}
}

impl From<&str> for SqlValue {
	fn from(v: &str) -> Self {
		SqlValue::Text(v.to_string())
	}
}

impl<T: Into<SqlValue>> From<Option<T>> for SqlValue {
	fn from(v: Option<T>) -> Self {
		v.map(Into::into).unwrap_or(SqlValue::Null)
	}
}

/// Returns true for `[A-Za-z_][A-Za-z0-9_]*` up to 63 characters.
pub fn is_safe_identifier(name: &str) -> bool {
	let mut chars = name.chars();
	let Some(first) = chars.next() else {
		return false;
	};
	name.len() <= 63
		&& (first.is_ascii_alphabetic() || first == '_')
		&& chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// Checks an identifier, returning it unchanged when safe.
pub fn validate_identifier(name: &str) -> Result<&str> {
	if is_safe_identifier(name) {
		Ok(name)
	} else {
		Err(CoreError::UnsafeIdentifier(name.to_string()))
	}
}

/// Double-quotes an identifier that already passed [`validate_identifier`].
pub fn quote_identifier(name: &str) -> Result<String> {
	validate_identifier(name).map(|n| format!("\"{n}\""))
}

/// Allow-list of tables the engine may read from when evaluating policies.
///
/// An empty registry admits any safe identifier.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TableRegistry {
	tables: BTreeSet<String>,
}

impl TableRegistry {
	pub fn new<I, S>(tables: I) -> Self
	where
		I: IntoIterator<Item = S>,
		S: Into<String>,
	{
		Self {
			tables: tables.into_iter().map(Into::into).collect(),
		}
	}

	pub fn is_empty(&self) -> bool {
		self.tables.is_empty()
	}

	/// Validates and quotes a table name against the registry.
	pub fn quote_table(&self, table: &str) -> Result<String> {
		let quoted = quote_identifier(table)?;
		if !self.tables.is_empty() && !self.tables.contains(table) {
			return Err(CoreError::TableNotAllowed(table.to_string()));
		}
		Ok(quoted)
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use proptest::prelude::*;

	#[test]
	fn test_rejects_injection_shaped_identifiers() {
		assert!(!is_safe_identifier(""));
		assert!(!is_safe_identifier("1users"));
		assert!(!is_safe_identifier("users; DROP TABLE users"));
		assert!(!is_safe_identifier("user_id FROM secrets --"));
		assert!(!is_safe_identifier("\"users\""));
		assert!(is_safe_identifier("user_id"));
		assert!(is_safe_identifier("_private"));
	}

	#[test]
	fn test_quote_identifier_wraps_in_double_quotes() {
		assert_eq!(quote_identifier("projects").unwrap(), "\"projects\"");
		assert!(quote_identifier("a.b").is_err());
	}

	#[test]
	fn test_empty_registry_allows_any_safe_table() {
		let registry = TableRegistry::default();
		assert_eq!(registry.quote_table("anything").unwrap(), "\"anything\"");
	}

	#[test]
	fn test_registry_rejects_unlisted_table() {
		let registry = TableRegistry::new(["projects"]);
		assert!(registry.quote_table("projects").is_ok());
		assert_eq!(
			registry.quote_table("secrets").unwrap_err(),
			CoreError::TableNotAllowed("secrets".to_string())
		);
	}

	#[test]
	fn test_owner_value_matches_integer_and_text() {
		let user = UserId::new(7);
		assert!(SqlValue::Integer(7).is_user(user));
		assert!(SqlValue::Text("7".to_string()).is_user(user));
		assert!(!SqlValue::Integer(8).is_user(user));
		assert!(!SqlValue::Null.is_user(user));
	}

	#[test]
	fn test_truthiness_follows_sql() {
		assert!(SqlValue::Integer(1).is_truthy());
		assert!(!SqlValue::Integer(0).is_truthy());
		assert!(!SqlValue::Null.is_truthy());
		assert!(SqlValue::Bool(true).is_truthy());
	}

	proptest! {
		#[test]
		fn test_generated_identifiers_are_safe(name in "[a-z_][a-z0-9_]{0,30}") {
			prop_assert!(is_safe_identifier(&name));
		}

		#[test]
		fn test_identifiers_with_spaces_are_unsafe(a in "[a-z]{1,10}", b in "[a-z]{1,10}") {
			let joined = format!("{a} {b}");
			prop_assert!(!is_safe_identifier(&joined));
		}
	}
}
