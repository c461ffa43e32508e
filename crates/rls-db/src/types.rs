// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Column encodings shared by the repositories.
//!
//! Timestamps are stored as RFC 3339 UTC text with fixed microsecond
//! precision so that lexical comparison in SQL matches chronological order.
//! Lists and objects are stored as JSON text.

use chrono::{DateTime, SecondsFormat, Utc};
use rls_core::SqlValue;
use serde::de::DeserializeOwned;
use serde::Serialize;
use sqlx::{
	query::Query,
	sqlite::{Sqlite, SqliteArguments, SqliteRow},
	Row, TypeInfo, ValueRef,
};

use crate::error::{DbError, Result};

pub(crate) fn format_ts(ts: DateTime<Utc>) -> String {
	ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub(crate) fn parse_ts(raw: &str) -> Result<DateTime<Utc>> {
	DateTime::parse_from_rfc3339(raw)
		.map(|dt| dt.with_timezone(&Utc))
		.map_err(|e| DbError::InvalidData(format!("bad timestamp {raw:?}: {e}")))
}

pub(crate) fn parse_opt_ts(raw: Option<String>) -> Result<Option<DateTime<Utc>>> {
	raw.as_deref().map(parse_ts).transpose()
}

pub(crate) fn to_json<T: Serialize>(value: &T) -> Result<String> {
	Ok(serde_json::to_string(value)?)
}

/// Decodes a nullable JSON column, treating NULL as the type's default.
pub(crate) fn from_json_or_default<T: DeserializeOwned + Default>(raw: Option<String>) -> Result<T> {
	match raw {
		Some(s) if !s.is_empty() => Ok(serde_json::from_str(&s)?),
		_ => Ok(T::default()),
	}
}

pub(crate) fn parse_enum<T>(raw: &str) -> Result<T>
where
	T: std::str::FromStr<Err = rls_core::CoreError>,
{
	Ok(raw.parse::<T>()?)
}

pub(crate) fn bind_value<'q>(
	query: Query<'q, Sqlite, SqliteArguments<'q>>,
	value: &SqlValue,
) -> Query<'q, Sqlite, SqliteArguments<'q>> {
	match value {
		SqlValue::Null => query.bind(None::<i64>),
		SqlValue::Bool(b) => query.bind(*b),
		SqlValue::Integer(i) => query.bind(*i),
		SqlValue::Text(s) => query.bind(s.clone()),
	}
}

/// Decodes the first column of a row whatever its storage class.
pub(crate) fn decode_scalar(row: &SqliteRow) -> Result<SqlValue> {
	let raw = row.try_get_raw(0)?;
	if raw.is_null() {
		return Ok(SqlValue::Null);
	}
	let type_name = raw.type_info().name().to_ascii_uppercase();
	let value = match type_name.as_str() {
		"INTEGER" | "BOOLEAN" | "INT" | "BIGINT" => SqlValue::Integer(row.try_get::<i64, _>(0)?),
		"REAL" | "NUMERIC" => SqlValue::Text(row.try_get::<f64, _>(0)?.to_string()),
		"TEXT" => SqlValue::Text(row.try_get::<String, _>(0)?),
		other => {
			return Err(DbError::InvalidData(format!(
				"unsupported scalar type {other}"
			)))
		}
	};
	Ok(value)
}
