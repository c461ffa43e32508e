// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Audit records of access decisions.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::context::ContextData;
use crate::policy::MAX_PAGE_SIZE;
use crate::types::{Action, EntityType, PolicyId, UserId};

/// Evaluation summary stored with each entry.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppliedConditions {
	pub policies_evaluated: usize,
	pub context_data: ContextData,
}

/// An audit entry to be written. Entries are never updated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewAuditEntry {
	pub request_id: Option<String>,
	pub session_id: Option<String>,
	pub user_id: Option<UserId>,
	pub policy_id: Option<PolicyId>,
	pub entity_type: EntityType,
	pub entity_id: Option<i64>,
	pub action: Action,
	pub access_granted: bool,
	pub denial_reason: Option<String>,
	pub table_name: Option<String>,
	pub applied_conditions: AppliedConditions,
	pub ip_address: Option<String>,
	pub user_agent: Option<String>,
	pub request_method: Option<String>,
	pub request_path: Option<String>,
}

/// A stored audit entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditEntry {
	pub id: i64,
	#[serde(flatten)]
	pub entry: NewAuditEntry,
	pub created_at: DateTime<Utc>,
}

/// Filter for reading audit entries, newest first.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditQuery {
	pub user_id: Option<UserId>,
	pub entity_type: Option<EntityType>,
	pub action: Option<Action>,
	pub access_granted: Option<bool>,
	pub since: Option<DateTime<Utc>>,
	pub until: Option<DateTime<Utc>>,
	pub offset: i64,
	pub limit: i64,
}

impl Default for AuditQuery {
	fn default() -> Self {
		Self {
			user_id: None,
			entity_type: None,
			action: None,
			access_granted: None,
			since: None,
			until: None,
			offset: 0,
			limit: 100,
		}
	}
}

impl AuditQuery {
	pub fn effective_limit(&self) -> i64 {
		self.limit.clamp(1, MAX_PAGE_SIZE)
	}
}

/// Count of denials sharing a reason.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReasonCount {
	pub reason: String,
	pub count: i64,
}

/// Aggregate decision counts over a time window.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditStats {
	pub period_days: i64,
	pub total_checks: i64,
	pub granted: i64,
	pub denied: i64,
	/// Percentage of granted checks, 0 when there were none.
	pub success_rate: f64,
	pub top_denial_reasons: Vec<ReasonCount>,
	pub entity_type_counts: Vec<(String, i64)>,
}

impl AuditStats {
	pub fn compute_success_rate(granted: i64, total: i64) -> f64 {
		if total == 0 {
			0.0
		} else {
			granted as f64 / total as f64 * 100.0
		}
	}
}
