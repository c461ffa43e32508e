// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Narrow reads against business tables used during policy evaluation.
//!
//! These are the only queries that touch caller-named tables. Table and
//! column names are validated and quoted; everything else is bound.

use async_trait::async_trait;
use rls_core::{sql::quote_identifier, CompiledCondition, OrgId, SqlValue, UserId};
use sqlx::sqlite::SqlitePool;

use crate::error::Result;
use crate::types::{bind_value, decode_scalar};

#[async_trait]
pub trait LookupStore: Send + Sync {
	/// `SELECT <column> FROM <table> WHERE id = ?`. `None` when the row is missing.
	async fn lookup_column(&self, table: &str, column: &str, entity_id: i64)
		-> Result<Option<SqlValue>>;

	/// Evaluates a compiled condition, against the row `entity_id` of `table`
	/// when a scope is given. `None` when the scoped row is missing.
	async fn evaluate_condition(
		&self,
		condition: &CompiledCondition,
		scope: Option<(&str, i64)>,
	) -> Result<Option<SqlValue>>;

	async fn is_active_org_member(&self, organization_id: OrgId, user_id: UserId) -> Result<bool>;
}

#[derive(Clone)]
pub struct LookupRepository {
	pool: SqlitePool,
}

impl LookupRepository {
	pub fn new(pool: SqlitePool) -> Self {
		Self { pool }
	}

	#[tracing::instrument(skip(self))]
	pub async fn lookup_column(
		&self,
		table: &str,
		column: &str,
		entity_id: i64,
	) -> Result<Option<SqlValue>> {
		let sql = format!(
			"SELECT {} FROM {} WHERE \"id\" = ?",
			quote_identifier(column)?,
			quote_identifier(table)?
		);
		let row = sqlx::query(&sql)
			.bind(entity_id)
			.fetch_optional(&self.pool)
			.await?;

		row.as_ref().map(decode_scalar).transpose()
	}

	#[tracing::instrument(skip(self, condition), fields(sql = %condition.sql))]
	pub async fn evaluate_condition(
		&self,
		condition: &CompiledCondition,
		scope: Option<(&str, i64)>,
	) -> Result<Option<SqlValue>> {
		let sql = match scope {
			Some((table, _)) => format!(
				"SELECT ({}) AS allowed FROM {} WHERE \"id\" = ?",
				condition.sql,
				quote_identifier(table)?
			),
			None => format!("SELECT ({}) AS allowed", condition.sql),
		};

		let mut query = sqlx::query(&sql);
		for param in &condition.params {
			query = bind_value(query, param);
		}
		if let Some((_, entity_id)) = scope {
			query = query.bind(entity_id);
		}

		let row = query.fetch_optional(&self.pool).await?;
		row.as_ref().map(decode_scalar).transpose()
	}

	#[tracing::instrument(skip(self))]
	pub async fn is_active_org_member(
		&self,
		organization_id: OrgId,
		user_id: UserId,
	) -> Result<bool> {
		let row = sqlx::query(
			"SELECT 1 FROM organization_members \
			 WHERE organization_id = ? AND user_id = ? AND is_active = 1 LIMIT 1",
		)
		.bind(organization_id.get())
		.bind(user_id.get())
		.fetch_optional(&self.pool)
		.await?;

		Ok(row.is_some())
	}
}

#[async_trait]
impl LookupStore for LookupRepository {
	async fn lookup_column(
		&self,
		table: &str,
		column: &str,
		entity_id: i64,
	) -> Result<Option<SqlValue>> {
		self.lookup_column(table, column, entity_id).await
	}

	async fn evaluate_condition(
		&self,
		condition: &CompiledCondition,
		scope: Option<(&str, i64)>,
	) -> Result<Option<SqlValue>> {
		self.evaluate_condition(condition, scope).await
	}

	async fn is_active_org_member(&self, organization_id: OrgId, user_id: UserId) -> Result<bool> {
		self.is_active_org_member(organization_id, user_id).await
	}
}
