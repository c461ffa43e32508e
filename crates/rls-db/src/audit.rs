// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Access decision audit log. Entries are insert-only.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rls_core::{
	AppliedConditions, AuditEntry, AuditQuery, AuditStats, NewAuditEntry, PolicyId, ReasonCount,
	UserId,
};
use sqlx::{
	sqlite::{SqlitePool, SqliteRow},
	Row,
};

use crate::error::Result;
use crate::types::{format_ts, from_json_or_default, parse_enum, parse_ts, to_json};

#[async_trait]
pub trait AuditStore: Send + Sync {
	async fn insert_audit_entry(&self, entry: &NewAuditEntry, now: DateTime<Utc>) -> Result<i64>;
	async fn query_audit_entries(&self, query: &AuditQuery) -> Result<Vec<AuditEntry>>;
	async fn audit_stats(&self, since: DateTime<Utc>, period_days: i64) -> Result<AuditStats>;
}

#[derive(Clone)]
pub struct AuditRepository {
	pool: SqlitePool,
}

impl AuditRepository {
	pub fn new(pool: SqlitePool) -> Self {
		Self { pool }
	}

	#[tracing::instrument(skip(self, entry), fields(entity_type = %entry.entity_type, granted = entry.access_granted))]
	pub async fn insert_audit_entry(&self, entry: &NewAuditEntry, now: DateTime<Utc>) -> Result<i64> {
		let result = sqlx::query(
			r#"
			INSERT INTO rls_audit_logs (
				request_id, session_id, user_id, policy_id, entity_type, entity_id, action,
				access_granted, denial_reason, table_name, applied_conditions, ip_address,
				user_agent, request_method, request_path, created_at
			) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
			"#,
		)
		.bind(&entry.request_id)
		.bind(&entry.session_id)
		.bind(entry.user_id.map(UserId::get))
		.bind(entry.policy_id.map(PolicyId::get))
		.bind(entry.entity_type.as_str())
		.bind(entry.entity_id)
		.bind(entry.action.as_str())
		.bind(entry.access_granted)
		.bind(&entry.denial_reason)
		.bind(&entry.table_name)
		.bind(to_json(&entry.applied_conditions)?)
		.bind(&entry.ip_address)
		.bind(&entry.user_agent)
		.bind(&entry.request_method)
		.bind(&entry.request_path)
		.bind(format_ts(now))
		.execute(&self.pool)
		.await?;

		Ok(result.last_insert_rowid())
	}

	#[tracing::instrument(skip(self))]
	pub async fn query_audit_entries(&self, query: &AuditQuery) -> Result<Vec<AuditEntry>> {
		let mut conditions = vec!["1=1"];
		if query.user_id.is_some() {
			conditions.push("user_id = ?");
		}
		if query.entity_type.is_some() {
			conditions.push("entity_type = ?");
		}
		if query.action.is_some() {
			conditions.push("action = ?");
		}
		if query.access_granted.is_some() {
			conditions.push("access_granted = ?");
		}
		if query.since.is_some() {
			conditions.push("created_at >= ?");
		}
		if query.until.is_some() {
			conditions.push("created_at <= ?");
		}

		let sql = format!(
			"SELECT id, request_id, session_id, user_id, policy_id, entity_type, entity_id, action, \
			 access_granted, denial_reason, table_name, applied_conditions, ip_address, user_agent, \
			 request_method, request_path, created_at \
			 FROM rls_audit_logs WHERE {} ORDER BY created_at DESC, id DESC LIMIT ? OFFSET ?",
			conditions.join(" AND ")
		);

		let mut q = sqlx::query(&sql);
		if let Some(v) = query.user_id {
			q = q.bind(v.get());
		}
		if let Some(v) = query.entity_type {
			q = q.bind(v.as_str());
		}
		if let Some(v) = query.action {
			q = q.bind(v.as_str());
		}
		if let Some(v) = query.access_granted {
			q = q.bind(v);
		}
		if let Some(v) = query.since {
			q = q.bind(format_ts(v));
		}
		if let Some(v) = query.until {
			q = q.bind(format_ts(v));
		}
		q = q.bind(query.effective_limit()).bind(query.offset.max(0));

		let rows = q.fetch_all(&self.pool).await?;
		rows.iter().map(audit_from_row).collect()
	}

	#[tracing::instrument(skip(self))]
	pub async fn audit_stats(&self, since: DateTime<Utc>, period_days: i64) -> Result<AuditStats> {
		let since = format_ts(since);

		let totals = sqlx::query(
			r#"
			SELECT COUNT(*) AS total,
			       COALESCE(SUM(CASE WHEN access_granted = 1 THEN 1 ELSE 0 END), 0) AS granted
			FROM rls_audit_logs
			WHERE created_at >= ?
			"#,
		)
		.bind(&since)
		.fetch_one(&self.pool)
		.await?;
		let total: i64 = totals.get("total");
		let granted: i64 = totals.get("granted");

		let reasons = sqlx::query(
			r#"
			SELECT denial_reason, COUNT(*) AS cnt
			FROM rls_audit_logs
			WHERE created_at >= ? AND access_granted = 0 AND denial_reason IS NOT NULL
			GROUP BY denial_reason
			ORDER BY cnt DESC, denial_reason ASC
			LIMIT 10
			"#,
		)
		.bind(&since)
		.fetch_all(&self.pool)
		.await?
		.into_iter()
		.map(|row| ReasonCount {
			reason: row.get("denial_reason"),
			count: row.get("cnt"),
		})
		.collect();

		let entity_type_counts = sqlx::query(
			r#"
			SELECT entity_type, COUNT(*) AS cnt
			FROM rls_audit_logs
			WHERE created_at >= ?
			GROUP BY entity_type
			ORDER BY cnt DESC, entity_type ASC
			"#,
		)
		.bind(&since)
		.fetch_all(&self.pool)
		.await?
		.into_iter()
		.map(|row| (row.get::<String, _>("entity_type"), row.get::<i64, _>("cnt")))
		.collect();

		Ok(AuditStats {
			period_days,
			total_checks: total,
			granted,
			denied: total - granted,
			success_rate: AuditStats::compute_success_rate(granted, total),
			top_denial_reasons: reasons,
			entity_type_counts,
		})
	}
}

fn audit_from_row(row: &SqliteRow) -> Result<AuditEntry> {
	let entity_type: String = row.get("entity_type");
	let action: String = row.get("action");
	let created_at: String = row.get("created_at");
	let applied: AppliedConditions = from_json_or_default(row.get("applied_conditions"))?;

	Ok(AuditEntry {
		id: row.get("id"),
		entry: NewAuditEntry {
			request_id: row.get("request_id"),
			session_id: row.get("session_id"),
			user_id: row.get::<Option<i64>, _>("user_id").map(UserId::new),
			policy_id: row.get::<Option<i64>, _>("policy_id").map(PolicyId::new),
			entity_type: parse_enum(&entity_type)?,
			entity_id: row.get("entity_id"),
			action: parse_enum(&action)?,
			access_granted: row.get("access_granted"),
			denial_reason: row.get("denial_reason"),
			table_name: row.get("table_name"),
			applied_conditions: applied,
			ip_address: row.get("ip_address"),
			user_agent: row.get("user_agent"),
			request_method: row.get("request_method"),
			request_path: row.get("request_path"),
		},
		created_at: parse_ts(&created_at)?,
	})
}

#[async_trait]
impl AuditStore for AuditRepository {
	async fn insert_audit_entry(&self, entry: &NewAuditEntry, now: DateTime<Utc>) -> Result<i64> {
		self.insert_audit_entry(entry, now).await
	}

	async fn query_audit_entries(&self, query: &AuditQuery) -> Result<Vec<AuditEntry>> {
		self.query_audit_entries(query).await
	}

	async fn audit_stats(&self, since: DateTime<Utc>, period_days: i64) -> Result<AuditStats> {
		self.audit_stats(since, period_days).await
	}
}
