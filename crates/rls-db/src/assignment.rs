// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Rule assignment repository.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rls_core::{
	AssignmentId, NewRuleAssignment, PolicyId, RoleId, RuleAssignment, UserId,
};
use sqlx::{
	sqlite::{SqlitePool, SqliteRow},
	Row,
};

use crate::error::{DbError, Result};
use crate::types::{format_ts, parse_enum, parse_ts, to_json};

#[async_trait]
pub trait AssignmentStore: Send + Sync {
	async fn create_assignment(
		&self,
		assignment: &NewRuleAssignment,
		now: DateTime<Utc>,
	) -> Result<RuleAssignment>;
	async fn list_assignments(
		&self,
		policy_id: Option<PolicyId>,
		user_id: Option<UserId>,
	) -> Result<Vec<RuleAssignment>>;

	/// Returns true if an active assignment of the policy matches the user
	/// directly, globally (no user), or through one of `role_ids`.
	async fn has_matching_assignment(
		&self,
		policy_id: PolicyId,
		user_id: UserId,
		role_ids: &[RoleId],
	) -> Result<bool>;
}

#[derive(Clone)]
pub struct AssignmentRepository {
	pool: SqlitePool,
}

impl AssignmentRepository {
	pub fn new(pool: SqlitePool) -> Self {
		Self { pool }
	}

	#[tracing::instrument(skip(self, assignment), fields(policy_id = %assignment.policy_id))]
	pub async fn create_assignment(
		&self,
		assignment: &NewRuleAssignment,
		now: DateTime<Utc>,
	) -> Result<RuleAssignment> {
		let exists = sqlx::query("SELECT 1 FROM rls_policies WHERE id = ?")
			.bind(assignment.policy_id.get())
			.fetch_optional(&self.pool)
			.await?;
		if exists.is_none() {
			return Err(DbError::NotFound(format!("policy {}", assignment.policy_id)));
		}

		let result = sqlx::query(
			r#"
			INSERT INTO rls_rule_assignments (
				policy_id, entity_type, entity_id, user_id, role_id, is_active, conditions,
				created_by, created_at
			) VALUES (?, ?, ?, ?, ?, 1, ?, ?, ?)
			"#,
		)
		.bind(assignment.policy_id.get())
		.bind(assignment.entity_type.as_str())
		.bind(assignment.entity_id)
		.bind(assignment.user_id.map(UserId::get))
		.bind(assignment.role_id.map(RoleId::get))
		.bind(assignment.conditions.as_ref().map(to_json).transpose()?)
		.bind(assignment.created_by.get())
		.bind(format_ts(now))
		.execute(&self.pool)
		.await?;

		let id = AssignmentId::new(result.last_insert_rowid());
		tracing::debug!(assignment_id = %id, "rule assignment created");

		Ok(RuleAssignment {
			id,
			policy_id: assignment.policy_id,
			entity_type: assignment.entity_type,
			entity_id: assignment.entity_id,
			user_id: assignment.user_id,
			role_id: assignment.role_id,
			is_active: true,
			conditions: assignment.conditions.clone(),
			created_by: assignment.created_by,
			created_at: now,
		})
	}

	#[tracing::instrument(skip(self))]
	pub async fn list_assignments(
		&self,
		policy_id: Option<PolicyId>,
		user_id: Option<UserId>,
	) -> Result<Vec<RuleAssignment>> {
		let mut sql = String::from(
			"SELECT id, policy_id, entity_type, entity_id, user_id, role_id, is_active, conditions, \
			 created_by, created_at FROM rls_rule_assignments WHERE is_active = 1",
		);
		if policy_id.is_some() {
			sql.push_str(" AND policy_id = ?");
		}
		if user_id.is_some() {
			sql.push_str(" AND user_id = ?");
		}
		sql.push_str(" ORDER BY id ASC");

		let mut query = sqlx::query(&sql);
		if let Some(p) = policy_id {
			query = query.bind(p.get());
		}
		if let Some(u) = user_id {
			query = query.bind(u.get());
		}

		let rows = query.fetch_all(&self.pool).await?;
		rows.iter().map(assignment_from_row).collect()
	}

	#[tracing::instrument(skip(self, role_ids), fields(policy_id = %policy_id, user_id = %user_id))]
	pub async fn has_matching_assignment(
		&self,
		policy_id: PolicyId,
		user_id: UserId,
		role_ids: &[RoleId],
	) -> Result<bool> {
		let mut sql = String::from(
			"SELECT 1 FROM rls_rule_assignments \
			 WHERE policy_id = ? AND is_active = 1 AND (user_id = ? OR (user_id IS NULL AND role_id IS NULL)",
		);
		if !role_ids.is_empty() {
			let marks = vec!["?"; role_ids.len()].join(", ");
			sql.push_str(&format!(" OR role_id IN ({marks})"));
		}
		sql.push_str(") LIMIT 1");

		let mut query = sqlx::query(&sql).bind(policy_id.get()).bind(user_id.get());
		for role in role_ids {
			query = query.bind(role.get());
		}

		Ok(query.fetch_optional(&self.pool).await?.is_some())
	}
}

fn assignment_from_row(row: &SqliteRow) -> Result<RuleAssignment> {
	let entity_type: String = row.get("entity_type");
	let created_at: String = row.get("created_at");
	let conditions: Option<String> = row.get("conditions");

	Ok(RuleAssignment {
		id: AssignmentId::new(row.get("id")),
		policy_id: PolicyId::new(row.get("policy_id")),
		entity_type: parse_enum(&entity_type)?,
		entity_id: row.get("entity_id"),
		user_id: row.get::<Option<i64>, _>("user_id").map(UserId::new),
		role_id: row.get::<Option<i64>, _>("role_id").map(RoleId::new),
		is_active: row.get("is_active"),
		conditions: conditions.map(|s| serde_json::from_str(&s)).transpose()?,
		created_by: UserId::new(row.get("created_by")),
		created_at: parse_ts(&created_at)?,
	})
}

#[async_trait]
impl AssignmentStore for AssignmentRepository {
	async fn create_assignment(
		&self,
		assignment: &NewRuleAssignment,
		now: DateTime<Utc>,
	) -> Result<RuleAssignment> {
		self.create_assignment(assignment, now).await
	}

	async fn list_assignments(
		&self,
		policy_id: Option<PolicyId>,
		user_id: Option<UserId>,
	) -> Result<Vec<RuleAssignment>> {
		self.list_assignments(policy_id, user_id).await
	}

	async fn has_matching_assignment(
		&self,
		policy_id: PolicyId,
		user_id: UserId,
		role_ids: &[RoleId],
	) -> Result<bool> {
		self
			.has_matching_assignment(policy_id, user_id, role_ids)
			.await
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::policy::PolicyRepository;
	use crate::testing::create_migrated_test_pool;
	use rls_core::{Action, EntityType, PolicyDefinition, PolicyKind};

	async fn setup() -> (AssignmentRepository, PolicyId) {
		let pool = create_migrated_test_pool().await;
		let policy = PolicyRepository::new(pool.clone())
			.create_policy(
				&PolicyDefinition::new(
					"p",
					EntityType::Project,
					"projects",
					Action::All,
					PolicyKind::Public,
					UserId::new(1),
				),
				Utc::now(),
			)
			.await
			.unwrap();
		(AssignmentRepository::new(pool), policy.id)
	}

	fn new_assignment(
		policy_id: PolicyId,
		user: Option<i64>,
		role: Option<i64>,
	) -> NewRuleAssignment {
		NewRuleAssignment {
			policy_id,
			entity_type: EntityType::Project,
			entity_id: None,
			user_id: user.map(UserId::new),
			role_id: role.map(RoleId::new),
			conditions: None,
			created_by: UserId::new(1),
		}
	}

	#[tokio::test]
	async fn test_assignment_requires_policy() {
		let (repo, _) = setup().await;
		let err = repo
			.create_assignment(&new_assignment(PolicyId::new(404), None, None), Utc::now())
			.await
			.unwrap_err();
		assert!(matches!(err, DbError::NotFound(_)));
	}

	#[tokio::test]
	async fn test_role_only_assignment_needs_role() {
		let (repo, policy_id) = setup().await;
		repo
			.create_assignment(&new_assignment(policy_id, None, Some(5)), Utc::now())
			.await
			.unwrap();

		assert!(!repo
			.has_matching_assignment(policy_id, UserId::new(2), &[])
			.await
			.unwrap());
		assert!(!repo
			.has_matching_assignment(policy_id, UserId::new(2), &[RoleId::new(6)])
			.await
			.unwrap());
		assert!(repo
			.has_matching_assignment(policy_id, UserId::new(2), &[RoleId::new(5)])
			.await
			.unwrap());
	}

	#[tokio::test]
	async fn test_global_and_direct_assignments() {
		let (repo, policy_id) = setup().await;
		repo
			.create_assignment(&new_assignment(policy_id, Some(3), None), Utc::now())
			.await
			.unwrap();
		assert!(repo
			.has_matching_assignment(policy_id, UserId::new(3), &[])
			.await
			.unwrap());
		assert!(!repo
			.has_matching_assignment(policy_id, UserId::new(4), &[])
			.await
			.unwrap());

		repo
			.create_assignment(&new_assignment(policy_id, None, None), Utc::now())
			.await
			.unwrap();
		assert!(repo
			.has_matching_assignment(policy_id, UserId::new(4), &[])
			.await
			.unwrap());
	}

	#[tokio::test]
	async fn test_list_assignments_filters() {
		let (repo, policy_id) = setup().await;
		repo
			.create_assignment(&new_assignment(policy_id, Some(3), None), Utc::now())
			.await
			.unwrap();
		repo
			.create_assignment(&new_assignment(policy_id, None, Some(1)), Utc::now())
			.await
			.unwrap();

		assert_eq!(repo.list_assignments(Some(policy_id), None).await.unwrap().len(), 2);
		let for_user = repo
			.list_assignments(None, Some(UserId::new(3)))
			.await
			.unwrap();
		assert_eq!(for_user.len(), 1);
		assert_eq!(for_user[0].user_id, Some(UserId::new(3)));
	}
}
