// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Policy repository.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rls_core::{
	Action, EntityType, OrgId, Policy, PolicyColumns, PolicyDefinition, PolicyFilter, PolicyId,
	PolicyKind, UserId,
};
use sqlx::{
	sqlite::{SqlitePool, SqliteRow},
	Row,
};

use crate::error::{DbError, Result};
use crate::types::{format_ts, parse_enum, parse_opt_ts, parse_ts, to_json};

const POLICY_COLUMNS: &str = "id, name, description, entity_type, table_name, policy_type, action, \
	condition_column, custom_condition, required_roles, required_permissions, is_active, priority, \
	organization_id, created_by, created_at, updated_at";

#[async_trait]
pub trait PolicyStore: Send + Sync {
	async fn create_policy(&self, definition: &PolicyDefinition, now: DateTime<Utc>)
		-> Result<Policy>;
	async fn get_policy(&self, id: PolicyId) -> Result<Option<Policy>>;
	async fn list_policies(&self, filter: &PolicyFilter) -> Result<Vec<Policy>>;
	async fn update_policy(&self, policy: &Policy) -> Result<()>;
	async fn deactivate_policy(&self, id: PolicyId, now: DateTime<Utc>) -> Result<bool>;

	/// Active policies for an entity type and action, optionally narrowed to a
	/// table and to an organization (policies with no organization always
	/// qualify). Ordered by priority descending, then id ascending.
	async fn find_candidates(
		&self,
		entity_type: EntityType,
		action: Action,
		table_name: Option<&str>,
		organization_id: Option<OrgId>,
	) -> Result<Vec<Policy>>;
}

#[derive(Clone)]
pub struct PolicyRepository {
	pool: SqlitePool,
}

impl PolicyRepository {
	pub fn new(pool: SqlitePool) -> Self {
		Self { pool }
	}

	#[tracing::instrument(skip(self, definition), fields(name = %definition.name, entity_type = %definition.entity_type))]
	pub async fn create_policy(
		&self,
		definition: &PolicyDefinition,
		now: DateTime<Utc>,
	) -> Result<Policy> {
		definition.validate()?;
		let columns = definition.kind.to_columns();

		let result = sqlx::query(
			r#"
			INSERT INTO rls_policies (
				name, description, entity_type, table_name, policy_type, action,
				condition_column, custom_condition, required_roles, required_permissions,
				is_active, priority, organization_id, created_by, created_at, updated_at
			) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, NULL)
			"#,
		)
		.bind(&definition.name)
		.bind(&definition.description)
		.bind(definition.entity_type.as_str())
		.bind(&definition.table_name)
		.bind(&columns.policy_type)
		.bind(definition.action.as_str())
		.bind(&columns.condition_column)
		.bind(&columns.custom_condition)
		.bind(columns.required_roles.as_ref().map(to_json).transpose()?)
		.bind(columns.required_permissions.as_ref().map(to_json).transpose()?)
		.bind(definition.is_active)
		.bind(definition.priority)
		.bind(definition.organization_id.map(OrgId::get))
		.bind(definition.created_by.get())
		.bind(format_ts(now))
		.execute(&self.pool)
		.await?;

		let id = PolicyId::new(result.last_insert_rowid());
		tracing::debug!(policy_id = %id, "policy created");

		Ok(Policy {
			id,
			name: definition.name.clone(),
			description: definition.description.clone(),
			entity_type: definition.entity_type,
			table_name: definition.table_name.clone(),
			action: definition.action,
			kind: definition.kind.clone(),
			organization_id: definition.organization_id,
			priority: definition.priority,
			is_active: definition.is_active,
			created_by: definition.created_by,
			created_at: now,
			updated_at: None,
		})
	}

	#[tracing::instrument(skip(self), fields(policy_id = %id))]
	pub async fn get_policy(&self, id: PolicyId) -> Result<Option<Policy>> {
		let sql = format!("SELECT {POLICY_COLUMNS} FROM rls_policies WHERE id = ?");
		let row = sqlx::query(&sql)
			.bind(id.get())
			.fetch_optional(&self.pool)
			.await?;

		row.map(|r| policy_from_row(&r)).transpose()
	}

	#[tracing::instrument(skip(self))]
	pub async fn list_policies(&self, filter: &PolicyFilter) -> Result<Vec<Policy>> {
		let mut conditions = vec!["1=1"];
		if filter.entity_type.is_some() {
			conditions.push("entity_type = ?");
		}
		if filter.action.is_some() {
			conditions.push("action = ?");
		}
		if filter.is_active.is_some() {
			conditions.push("is_active = ?");
		}

		let sql = format!(
			"SELECT {POLICY_COLUMNS} FROM rls_policies WHERE {} \
			 ORDER BY priority DESC, created_at DESC, id DESC LIMIT ? OFFSET ?",
			conditions.join(" AND ")
		);
		let mut query = sqlx::query(&sql);
		if let Some(entity_type) = filter.entity_type {
			query = query.bind(entity_type.as_str());
		}
		if let Some(action) = filter.action {
			query = query.bind(action.as_str());
		}
		if let Some(active) = filter.is_active {
			query = query.bind(active);
		}
		query = query
			.bind(filter.effective_limit())
			.bind(filter.offset.max(0));

		let rows = query.fetch_all(&self.pool).await?;
		rows.iter().map(policy_from_row).collect()
	}

	#[tracing::instrument(skip(self, policy), fields(policy_id = %policy.id))]
	pub async fn update_policy(&self, policy: &Policy) -> Result<()> {
		let columns = policy.kind.to_columns();
		let result = sqlx::query(
			r#"
			UPDATE rls_policies
			SET name = ?, description = ?, policy_type = ?, action = ?, condition_column = ?,
			    custom_condition = ?, required_roles = ?, required_permissions = ?,
			    is_active = ?, priority = ?, updated_at = ?
			WHERE id = ?
			"#,
		)
		.bind(&policy.name)
		.bind(&policy.description)
		.bind(&columns.policy_type)
		.bind(policy.action.as_str())
		.bind(&columns.condition_column)
		.bind(&columns.custom_condition)
		.bind(columns.required_roles.as_ref().map(to_json).transpose()?)
		.bind(columns.required_permissions.as_ref().map(to_json).transpose()?)
		.bind(policy.is_active)
		.bind(policy.priority)
		.bind(policy.updated_at.map(format_ts))
		.bind(policy.id.get())
		.execute(&self.pool)
		.await?;

		if result.rows_affected() == 0 {
			return Err(DbError::NotFound(format!("policy {}", policy.id)));
		}
		Ok(())
	}

	#[tracing::instrument(skip(self), fields(policy_id = %id))]
	pub async fn deactivate_policy(&self, id: PolicyId, now: DateTime<Utc>) -> Result<bool> {
		let result = sqlx::query("UPDATE rls_policies SET is_active = 0, updated_at = ? WHERE id = ?")
			.bind(format_ts(now))
			.bind(id.get())
			.execute(&self.pool)
			.await?;

		Ok(result.rows_affected() > 0)
	}

	#[tracing::instrument(skip(self), fields(entity_type = %entity_type, action = %action))]
	pub async fn find_candidates(
		&self,
		entity_type: EntityType,
		action: Action,
		table_name: Option<&str>,
		organization_id: Option<OrgId>,
	) -> Result<Vec<Policy>> {
		let mut sql = format!(
			"SELECT {POLICY_COLUMNS} FROM rls_policies \
			 WHERE is_active = 1 AND entity_type = ? AND (action = ? OR action = 'all')"
		);
		if table_name.is_some() {
			sql.push_str(" AND table_name = ?");
		}
		if organization_id.is_some() {
			sql.push_str(" AND (organization_id = ? OR organization_id IS NULL)");
		}
		sql.push_str(" ORDER BY priority DESC, id ASC");

		let mut query = sqlx::query(&sql)
			.bind(entity_type.as_str())
			.bind(action.as_str());
		if let Some(table) = table_name {
			query = query.bind(table);
		}
		if let Some(org) = organization_id {
			query = query.bind(org.get());
		}

		let rows = query.fetch_all(&self.pool).await?;
		let policies = rows
			.iter()
			.map(policy_from_row)
			.collect::<Result<Vec<_>>>()?;

		tracing::debug!(count = policies.len(), "candidate policies loaded");
		Ok(policies)
	}
}

fn policy_from_row(row: &SqliteRow) -> Result<Policy> {
	let entity_type: String = row.get("entity_type");
	let action: String = row.get("action");
	let created_at: String = row.get("created_at");
	let roles: Option<String> = row.get("required_roles");
	let permissions: Option<String> = row.get("required_permissions");

	let kind = PolicyKind::from_columns(PolicyColumns {
		policy_type: row.get("policy_type"),
		condition_column: row.get("condition_column"),
		custom_condition: row.get("custom_condition"),
		required_roles: roles.map(|s| serde_json::from_str(&s)).transpose()?,
		required_permissions: permissions.map(|s| serde_json::from_str(&s)).transpose()?,
	});

	Ok(Policy {
		id: PolicyId::new(row.get("id")),
		name: row.get("name"),
		description: row.get("description"),
		entity_type: parse_enum(&entity_type)?,
		table_name: row.get("table_name"),
		action: parse_enum(&action)?,
		kind,
		organization_id: row.get::<Option<i64>, _>("organization_id").map(OrgId::new),
		priority: row.get("priority"),
		is_active: row.get("is_active"),
		created_by: UserId::new(row.get("created_by")),
		created_at: parse_ts(&created_at)?,
		updated_at: parse_opt_ts(row.get("updated_at"))?,
	})
}

#[async_trait]
impl PolicyStore for PolicyRepository {
	async fn create_policy(
		&self,
		definition: &PolicyDefinition,
		now: DateTime<Utc>,
	) -> Result<Policy> {
		self.create_policy(definition, now).await
	}

	async fn get_policy(&self, id: PolicyId) -> Result<Option<Policy>> {
		self.get_policy(id).await
	}

	async fn list_policies(&self, filter: &PolicyFilter) -> Result<Vec<Policy>> {
		self.list_policies(filter).await
	}

	async fn update_policy(&self, policy: &Policy) -> Result<()> {
		self.update_policy(policy).await
	}

	async fn deactivate_policy(&self, id: PolicyId, now: DateTime<Utc>) -> Result<bool> {
		self.deactivate_policy(id, now).await
	}

	async fn find_candidates(
		&self,
		entity_type: EntityType,
		action: Action,
		table_name: Option<&str>,
		organization_id: Option<OrgId>,
	) -> Result<Vec<Policy>> {
		self
			.find_candidates(entity_type, action, table_name, organization_id)
			.await
	}
}
