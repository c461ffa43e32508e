// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! In-memory pools and directory fixtures for tests.

use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use std::str::FromStr;

use crate::migrations::run_migrations;

/// A single-connection in-memory pool. One connection keeps every query on
/// the same in-memory database.
pub async fn create_test_pool() -> SqlitePool {
	let options = SqliteConnectOptions::from_str("sqlite::memory:")
		.unwrap()
		.foreign_keys(true);
	SqlitePoolOptions::new()
		.max_connections(1)
		.idle_timeout(None)
		.max_lifetime(None)
		.connect_with(options)
		.await
		.unwrap()
}

/// An in-memory pool with the full schema applied.
pub async fn create_migrated_test_pool() -> SqlitePool {
	let pool = create_test_pool().await;
	run_migrations(&pool).await.unwrap();
	pool
}

pub async fn insert_user(pool: &SqlitePool, id: i64, username: &str) {
	sqlx::query("INSERT INTO users (id, username, is_active, is_superuser) VALUES (?, ?, 1, 0)")
		.bind(id)
		.bind(username)
		.execute(pool)
		.await
		.unwrap();
}

pub async fn insert_role(pool: &SqlitePool, id: i64, name: &str) {
	sqlx::query("INSERT INTO roles (id, name, is_active) VALUES (?, ?, 1)")
		.bind(id)
		.bind(name)
		.execute(pool)
		.await
		.unwrap();
}

pub async fn grant_role(pool: &SqlitePool, user_id: i64, role_id: i64) {
	sqlx::query("INSERT INTO user_roles (user_id, role_id, is_active) VALUES (?, ?, 1)")
		.bind(user_id)
		.bind(role_id)
		.execute(pool)
		.await
		.unwrap();
}

pub async fn grant_permission(pool: &SqlitePool, role_id: i64, permission: &str) {
	sqlx::query("INSERT OR IGNORE INTO permissions (name) VALUES (?)")
		.bind(permission)
		.execute(pool)
		.await
		.unwrap();
	sqlx::query(
		"INSERT INTO role_permissions (role_id, permission_id) \
		 SELECT ?, id FROM permissions WHERE name = ?",
	)
	.bind(role_id)
	.bind(permission)
	.execute(pool)
	.await
	.unwrap();
}

pub async fn insert_project(pool: &SqlitePool, id: i64, owner_id: i64, is_public: bool) {
	sqlx::query("INSERT INTO projects (id, name, user_id, is_public) VALUES (?, ?, ?, ?)")
		.bind(id)
		.bind(format!("project-{id}"))
		.bind(owner_id)
		.bind(is_public)
		.execute(pool)
		.await
		.unwrap();
}

pub async fn add_project_member(pool: &SqlitePool, project_id: i64, user_id: i64) {
	sqlx::query("INSERT INTO project_members (project_id, user_id, is_active) VALUES (?, ?, 1)")
		.bind(project_id)
		.bind(user_id)
		.execute(pool)
		.await
		.unwrap();
}

pub async fn insert_organization(pool: &SqlitePool, id: i64, slug: &str) {
	sqlx::query(
		"INSERT INTO organizations (id, name, slug, is_active, created_at) \
		 VALUES (?, ?, ?, 1, '2025-01-01T00:00:00.000000Z')",
	)
	.bind(id)
	.bind(slug)
	.bind(slug)
	.execute(pool)
	.await
	.unwrap();
}

pub async fn add_org_member(pool: &SqlitePool, org_id: i64, user_id: i64, is_active: bool) {
	sqlx::query(
		"INSERT INTO organization_members (organization_id, user_id, is_active, created_at) \
		 VALUES (?, ?, ?, '2025-01-01T00:00:00.000000Z')",
	)
	.bind(org_id)
	.bind(user_id)
	.bind(is_active)
	.execute(pool)
	.await
	.unwrap();
}
