// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Abstract row query that policies narrow with predicates.

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::sql::{quote_identifier, SqlValue};

/// A predicate appended to a [`FilterQuery`]. All predicates are ANDed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Predicate {
	ColumnEquals { column: String, value: SqlValue },
	IdIn { ids: Vec<i64> },
	AlwaysFalse,
}

/// A row query over a single table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FilterQuery {
	pub table: String,
	pub columns: Vec<String>,
	pub predicates: Vec<Predicate>,
}

impl FilterQuery {
	/// `SELECT * FROM table` with no predicates.
	pub fn new(table: impl Into<String>) -> Self {
		Self {
			table: table.into(),
			columns: Vec::new(),
			predicates: Vec::new(),
		}
	}

	pub fn with_columns<I, S>(mut self, columns: I) -> Self
	where
		I: IntoIterator<Item = S>,
		S: Into<String>,
	{
		self.columns = columns.into_iter().map(Into::into).collect();
		self
	}

	pub fn push(&mut self, predicate: Predicate) {
		self.predicates.push(predicate);
	}

	pub fn filter(mut self, predicate: Predicate) -> Self {
		self.push(predicate);
		self
	}

	/// Returns the query with an always-false predicate appended.
	pub fn deny_all(self) -> Self {
		self.filter(Predicate::AlwaysFalse)
	}

	/// True when the predicates can match no row.
	pub fn matches_nothing(&self) -> bool {
		self.predicates.iter().any(|p| match p {
			Predicate::AlwaysFalse => true,
			Predicate::IdIn { ids } => ids.is_empty(),
			Predicate::ColumnEquals { .. } => false,
		})
	}

	/// Renders parameterised SQL and its binds.
	pub fn to_sql(&self) -> Result<(String, Vec<SqlValue>)> {
		let columns = if self.columns.is_empty() {
			"*".to_string()
		} else {
			self.columns
				.iter()
				.map(|c| quote_identifier(c))
				.collect::<Result<Vec<_>>>()?
				.join(", ")
		};
		let mut sql = format!("SELECT {columns} FROM {}", quote_identifier(&self.table)?);
		let mut params = Vec::new();
		let mut clauses = Vec::with_capacity(self.predicates.len());

		for predicate in &self.predicates {
			match predicate {
				Predicate::ColumnEquals { column, value } => {
					clauses.push(format!("{} = ?", quote_identifier(column)?));
					params.push(value.clone());
				}
				Predicate::IdIn { ids } if ids.is_empty() => clauses.push("1 = 0".to_string()),
				Predicate::IdIn { ids } => {
					let marks = vec!["?"; ids.len()].join(", ");
					clauses.push(format!("\"id\" IN ({marks})"));
					params.extend(ids.iter().copied().map(SqlValue::Integer));
				}
				Predicate::AlwaysFalse => clauses.push("1 = 0".to_string()),
			}
		}

		if !clauses.is_empty() {
			sql.push_str(" WHERE ");
			sql.push_str(&clauses.join(" AND "));
		}
		Ok((sql, params))
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_bare_query_has_no_where_clause() {
		let (sql, params) = FilterQuery::new("projects").to_sql().unwrap();
		assert_eq!(sql, "SELECT * FROM \"projects\"");
		assert!(params.is_empty());
	}

	#[test]
	fn test_predicates_are_anded_with_binds() {
		let query = FilterQuery::new("projects")
			.with_columns(["id", "name"])
			.filter(Predicate::ColumnEquals {
				column: "user_id".to_string(),
				value: SqlValue::Integer(7),
			})
			.filter(Predicate::IdIn { ids: vec![1, 2] });
		let (sql, params) = query.to_sql().unwrap();
		assert_eq!(
			sql,
			"SELECT \"id\", \"name\" FROM \"projects\" WHERE \"user_id\" = ? AND \"id\" IN (?, ?)"
		);
		assert_eq!(
			params,
			vec![SqlValue::Integer(7), SqlValue::Integer(1), SqlValue::Integer(2)]
		);
		assert!(!query.matches_nothing());
	}

	#[test]
	fn test_empty_id_list_matches_nothing() {
		let query = FilterQuery::new("projects").filter(Predicate::IdIn { ids: vec![] });
		assert!(query.matches_nothing());
		assert_eq!(query.to_sql().unwrap().0, "SELECT * FROM \"projects\" WHERE 1 = 0");
	}

	#[test]
	fn test_deny_all_matches_nothing() {
		assert!(FilterQuery::new("pages").deny_all().matches_nothing());
	}

	#[test]
	fn test_unsafe_column_is_rejected() {
		let query = FilterQuery::new("projects").filter(Predicate::ColumnEquals {
			column: "1=1 OR user_id".to_string(),
			value: SqlValue::Integer(1),
		});
		assert!(query.to_sql().is_err());
	}
}
