// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Read-only directory of users, their roles, permissions and accessible
//! projects.

use async_trait::async_trait;
use rls_core::{OrgId, RoleId, UserId, UserProfile};
use sqlx::{sqlite::SqlitePool, Row};

use crate::error::Result;

#[async_trait]
pub trait DirectoryStore: Send + Sync {
	async fn get_user(&self, user_id: UserId) -> Result<Option<UserProfile>>;
	async fn roles_for_user(&self, user_id: UserId) -> Result<Vec<String>>;
	async fn role_ids_for_user(&self, user_id: UserId) -> Result<Vec<RoleId>>;
	async fn permissions_for_user(&self, user_id: UserId) -> Result<Vec<String>>;

	/// Projects the user owns, is an active member of, or that are public.
	async fn accessible_resource_ids(
		&self,
		user_id: UserId,
		organization_id: Option<OrgId>,
	) -> Result<Vec<i64>>;
}

#[derive(Clone)]
pub struct DirectoryRepository {
	pool: SqlitePool,
}

impl DirectoryRepository {
	pub fn new(pool: SqlitePool) -> Self {
		Self { pool }
	}

	#[tracing::instrument(skip(self), fields(user_id = %user_id))]
	pub async fn get_user(&self, user_id: UserId) -> Result<Option<UserProfile>> {
		let row = sqlx::query("SELECT id, username, is_superuser, is_active FROM users WHERE id = ?")
			.bind(user_id.get())
			.fetch_optional(&self.pool)
			.await?;

		Ok(row.map(|r| UserProfile {
			id: UserId::new(r.get("id")),
			username: r.get("username"),
			is_superuser: r.get("is_superuser"),
			is_active: r.get("is_active"),
		}))
	}

	#[tracing::instrument(skip(self), fields(user_id = %user_id))]
	pub async fn roles_for_user(&self, user_id: UserId) -> Result<Vec<String>> {
		let rows = sqlx::query(
			r#"
			SELECT r.name
			FROM roles r
			JOIN user_roles ur ON ur.role_id = r.id
			WHERE ur.user_id = ? AND ur.is_active = 1 AND r.is_active = 1
			ORDER BY r.name
			"#,
		)
		.bind(user_id.get())
		.fetch_all(&self.pool)
		.await?;

		Ok(rows.into_iter().map(|r| r.get("name")).collect())
	}

	#[tracing::instrument(skip(self), fields(user_id = %user_id))]
	pub async fn role_ids_for_user(&self, user_id: UserId) -> Result<Vec<RoleId>> {
		let rows = sqlx::query(
			"SELECT role_id FROM user_roles WHERE user_id = ? AND is_active = 1 ORDER BY role_id",
		)
		.bind(user_id.get())
		.fetch_all(&self.pool)
		.await?;

		Ok(rows
			.into_iter()
			.map(|r| RoleId::new(r.get("role_id")))
			.collect())
	}

	#[tracing::instrument(skip(self), fields(user_id = %user_id))]
	pub async fn permissions_for_user(&self, user_id: UserId) -> Result<Vec<String>> {
		let rows = sqlx::query(
			r#"
			SELECT DISTINCT p.name
			FROM permissions p
			JOIN role_permissions rp ON rp.permission_id = p.id
			JOIN roles r ON r.id = rp.role_id
			JOIN user_roles ur ON ur.role_id = r.id
			WHERE ur.user_id = ? AND ur.is_active = 1 AND r.is_active = 1
			ORDER BY p.name
			"#,
		)
		.bind(user_id.get())
		.fetch_all(&self.pool)
		.await?;

		Ok(rows.into_iter().map(|r| r.get("name")).collect())
	}

	// Organization does not narrow the set; the parameter is kept for
	// directories that scope projects per organization.
	#[tracing::instrument(skip(self), fields(user_id = %user_id))]
	pub async fn accessible_resource_ids(
		&self,
		user_id: UserId,
		_organization_id: Option<OrgId>,
	) -> Result<Vec<i64>> {
		let rows = sqlx::query(
			r#"
			SELECT p.id
			FROM projects p
			WHERE p.user_id = ?
			   OR p.is_public = 1
			   OR p.id IN (
			       SELECT pm.project_id FROM project_members pm
			       WHERE pm.user_id = ? AND pm.is_active = 1
			   )
			ORDER BY p.id
			"#,
		)
		.bind(user_id.get())
		.bind(user_id.get())
		.fetch_all(&self.pool)
		.await?;

		Ok(rows.into_iter().map(|r| r.get("id")).collect())
	}
}

#[async_trait]
impl DirectoryStore for DirectoryRepository {
	async fn get_user(&self, user_id: UserId) -> Result<Option<UserProfile>> {
		self.get_user(user_id).await
	}

	async fn roles_for_user(&self, user_id: UserId) -> Result<Vec<String>> {
		self.roles_for_user(user_id).await
	}

	async fn role_ids_for_user(&self, user_id: UserId) -> Result<Vec<RoleId>> {
		self.role_ids_for_user(user_id).await
	}

	async fn permissions_for_user(&self, user_id: UserId) -> Result<Vec<String>> {
		self.permissions_for_user(user_id).await
	}

	async fn accessible_resource_ids(
		&self,
		user_id: UserId,
		organization_id: Option<OrgId>,
	) -> Result<Vec<i64>> {
		self.accessible_resource_ids(user_id, organization_id).await
	}
}
