// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use sqlx::sqlite::SqlitePool;

use crate::error::Result;

const MIGRATIONS: &[(&str, &str)] = &[
	("001_rls", include_str!("../migrations/001_rls.sql")),
	("002_directory", include_str!("../migrations/002_directory.sql")),
];

/// Splits a migration file into executable statements, dropping comment lines.
fn statements(sql: &str) -> impl Iterator<Item = String> + '_ {
	sql.split(';').filter_map(|chunk| {
		let body: Vec<&str> = chunk
			.lines()
			.filter(|line| !line.trim_start().starts_with("--"))
			.collect();
		let stmt = body.join("\n");
		let stmt = stmt.trim();
		(!stmt.is_empty()).then(|| stmt.to_string())
	})
}

/// Apply all schema migrations. Every statement is idempotent, so this is
/// safe to run on each start.
#[tracing::instrument(skip(pool))]
pub async fn run_migrations(pool: &SqlitePool) -> Result<()> {
	for (name, sql) in MIGRATIONS {
		for stmt in statements(sql) {
			sqlx::query(&stmt).execute(pool).await?;
		}
		tracing::debug!(migration = %name, "migration applied");
	}
	tracing::info!(count = MIGRATIONS.len(), "database migrations complete");
	Ok(())
}
