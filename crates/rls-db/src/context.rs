// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Session context repository.
//!
//! A context row is valid while `expires_at` is NULL or in the future. Rows
//! are never revived: invalidation moves `expires_at` to the present.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rls_core::{AccessContext, ContextData, OrgId, UserId};
use sqlx::{
	sqlite::{SqlitePool, SqliteRow},
	Row,
};

use crate::error::Result;
use crate::types::{format_ts, from_json_or_default, parse_opt_ts, parse_ts, to_json};

#[async_trait]
pub trait ContextStore: Send + Sync {
	async fn insert_context(&self, context: &AccessContext) -> Result<()>;
	async fn find_valid_context(
		&self,
		session_id: &str,
		now: DateTime<Utc>,
	) -> Result<Option<AccessContext>>;
	async fn update_context(&self, context: &AccessContext, now: DateTime<Utc>) -> Result<bool>;
	async fn expire_context(&self, session_id: &str, now: DateTime<Utc>) -> Result<bool>;
	async fn purge_expired_contexts(&self, now: DateTime<Utc>) -> Result<u64>;
}

#[derive(Clone)]
pub struct ContextRepository {
	pool: SqlitePool,
}

impl ContextRepository {
	pub fn new(pool: SqlitePool) -> Self {
		Self { pool }
	}

	#[tracing::instrument(skip(self, context), fields(session_id = %context.session_id, user_id = %context.user_id))]
	pub async fn insert_context(&self, context: &AccessContext) -> Result<()> {
		sqlx::query(
			r#"
			INSERT INTO rls_contexts (
				session_id, user_id, organization_id, tenant_id, project_ids, roles,
				permissions, context_data, ip_address, user_agent, created_at, expires_at
			) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
			"#,
		)
		.bind(&context.session_id)
		.bind(context.user_id.get())
		.bind(context.organization_id.map(OrgId::get))
		.bind(&context.tenant_id)
		.bind(to_json(&context.accessible_resource_ids)?)
		.bind(to_json(&context.roles)?)
		.bind(to_json(&context.permissions)?)
		.bind(to_json(&context.context_data)?)
		.bind(&context.ip_address)
		.bind(&context.user_agent)
		.bind(format_ts(context.created_at))
		.bind(context.expires_at.map(format_ts))
		.execute(&self.pool)
		.await?;

		tracing::debug!("context persisted");
		Ok(())
	}

	#[tracing::instrument(skip(self))]
	pub async fn find_valid_context(
		&self,
		session_id: &str,
		now: DateTime<Utc>,
	) -> Result<Option<AccessContext>> {
		let row = sqlx::query(
			r#"
			SELECT session_id, user_id, organization_id, tenant_id, project_ids, roles,
			       permissions, context_data, ip_address, user_agent, created_at, expires_at
			FROM rls_contexts
			WHERE session_id = ? AND (expires_at IS NULL OR expires_at > ?)
			ORDER BY id DESC
			LIMIT 1
			"#,
		)
		.bind(session_id)
		.bind(format_ts(now))
		.fetch_optional(&self.pool)
		.await?;

		row.map(|r| context_from_row(&r)).transpose()
	}

	/// Overwrites the mutable fields of every valid row for the session.
	#[tracing::instrument(skip(self, context), fields(session_id = %context.session_id))]
	pub async fn update_context(&self, context: &AccessContext, now: DateTime<Utc>) -> Result<bool> {
		let result = sqlx::query(
			r#"
			UPDATE rls_contexts
			SET organization_id = ?, tenant_id = ?, project_ids = ?, roles = ?, permissions = ?,
			    context_data = ?, ip_address = ?, user_agent = ?, expires_at = ?
			WHERE session_id = ? AND (expires_at IS NULL OR expires_at > ?)
			"#,
		)
		.bind(context.organization_id.map(OrgId::get))
		.bind(&context.tenant_id)
		.bind(to_json(&context.accessible_resource_ids)?)
		.bind(to_json(&context.roles)?)
		.bind(to_json(&context.permissions)?)
		.bind(to_json(&context.context_data)?)
		.bind(&context.ip_address)
		.bind(&context.user_agent)
		.bind(context.expires_at.map(format_ts))
		.bind(&context.session_id)
		.bind(format_ts(now))
		.execute(&self.pool)
		.await?;

		Ok(result.rows_affected() > 0)
	}

	#[tracing::instrument(skip(self))]
	pub async fn expire_context(&self, session_id: &str, now: DateTime<Utc>) -> Result<bool> {
		let now = format_ts(now);
		let result = sqlx::query(
			r#"
			UPDATE rls_contexts
			SET expires_at = ?
			WHERE session_id = ? AND (expires_at IS NULL OR expires_at > ?)
			"#,
		)
		.bind(&now)
		.bind(session_id)
		.bind(&now)
		.execute(&self.pool)
		.await?;

		Ok(result.rows_affected() > 0)
	}

	#[tracing::instrument(skip(self))]
	pub async fn purge_expired_contexts(&self, now: DateTime<Utc>) -> Result<u64> {
		let result =
			sqlx::query("DELETE FROM rls_contexts WHERE expires_at IS NOT NULL AND expires_at <= ?")
				.bind(format_ts(now))
				.execute(&self.pool)
				.await?;

		let purged = result.rows_affected();
		tracing::debug!(purged, "expired contexts purged");
		Ok(purged)
	}
}

fn context_from_row(row: &SqliteRow) -> Result<AccessContext> {
	let created_at: String = row.get("created_at");
	let context_data: ContextData = from_json_or_default(row.get("context_data"))?;

	Ok(AccessContext {
		session_id: row.get("session_id"),
		user_id: UserId::new(row.get("user_id")),
		organization_id: row.get::<Option<i64>, _>("organization_id").map(OrgId::new),
		tenant_id: row.get("tenant_id"),
		roles: from_json_or_default(row.get("roles"))?,
		permissions: from_json_or_default(row.get("permissions"))?,
		accessible_resource_ids: from_json_or_default(row.get("project_ids"))?,
		context_data,
		ip_address: row.get("ip_address"),
		user_agent: row.get("user_agent"),
		created_at: parse_ts(&created_at)?,
		expires_at: parse_opt_ts(row.get("expires_at"))?,
	})
}

#[async_trait]
impl ContextStore for ContextRepository {
	async fn insert_context(&self, context: &AccessContext) -> Result<()> {
		self.insert_context(context).await
	}

	async fn find_valid_context(
		&self,
		session_id: &str,
		now: DateTime<Utc>,
	) -> Result<Option<AccessContext>> {
		self.find_valid_context(session_id, now).await
	}

	async fn update_context(&self, context: &AccessContext, now: DateTime<Utc>) -> Result<bool> {
		self.update_context(context, now).await
	}

	async fn expire_context(&self, session_id: &str, now: DateTime<Utc>) -> Result<bool> {
		self.expire_context(session_id, now).await
	}

	async fn purge_expired_contexts(&self, now: DateTime<Utc>) -> Result<u64> {
		self.purge_expired_contexts(now).await
	}
}
