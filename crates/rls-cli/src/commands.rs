// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use anyhow::Context;
use rls_config::RlsConfig;
use rls_core::policy::MAX_PAGE_SIZE;
use rls_core::{Action, EntityType, PolicyFilter, UserId};
use rls_db::SqlitePool;
use rls_engine::{AccessRequest, RlsEngine};
use tracing::info;

async fn connect(config: &RlsConfig) -> anyhow::Result<SqlitePool> {
	let pool = rls_db::create_pool(&config.database.url)
		.await
		.with_context(|| format!("failed to open {}", config.database.url))?;
	rls_db::run_migrations(&pool)
		.await
		.context("failed to run migrations")?;
	Ok(pool)
}

async fn engine(config: &RlsConfig) -> anyhow::Result<RlsEngine> {
	let pool = connect(config).await?;
	Ok(RlsEngine::from_config(pool, config)?)
}

pub async fn migrate(config: &RlsConfig) -> anyhow::Result<()> {
	connect(config).await?;
	info!(database = %config.database.url, "migrations applied");
	println!("migrations applied");
	Ok(())
}

pub async fn seed_defaults(config: &RlsConfig, created_by: UserId) -> anyhow::Result<()> {
	let engine = engine(config).await?;
	let created = engine.seed_default_policies(created_by).await;
	for policy in &created {
		println!("{}\t{}", policy.id, policy.name);
	}
	println!("{} default policies created", created.len());
	Ok(())
}

pub async fn check(config: &RlsConfig, request: &AccessRequest) -> anyhow::Result<()> {
	let engine = engine(config).await?;
	let decision = engine.check_access(request).await;
	println!("{}", serde_json::to_string_pretty(&decision)?);
	Ok(())
}

pub async fn policies(
	config: &RlsConfig,
	entity_type: Option<EntityType>,
	action: Option<Action>,
	include_inactive: bool,
) -> anyhow::Result<()> {
	let engine = engine(config).await?;
	let filter = PolicyFilter {
		entity_type,
		action,
		is_active: if include_inactive { None } else { Some(true) },
		offset: 0,
		limit: MAX_PAGE_SIZE,
	};
	let policies = engine.list_policies(&filter).await?;
	println!("{}", serde_json::to_string_pretty(&policies)?);
	Ok(())
}

pub async fn audit_stats(config: &RlsConfig, days: i64) -> anyhow::Result<()> {
	let engine = engine(config).await?;
	let stats = engine.audit_stats(days).await?;
	println!("{}", serde_json::to_string_pretty(&stats)?);
	Ok(())
}
