// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Writes one audit entry per access decision.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use rls_core::{AccessContext, AppliedConditions, Decision, NewAuditEntry, Policy};
use rls_db::AuditStore;
use tracing::{debug, error};

use crate::error::with_timeout;
use crate::request::AccessRequest;

pub struct AuditRecorder {
	store: Arc<dyn AuditStore>,
	enabled: bool,
	store_timeout: Duration,
}

impl AuditRecorder {
	pub fn new(store: Arc<dyn AuditStore>, enabled: bool, store_timeout: Duration) -> Self {
		Self {
			store,
			enabled,
			store_timeout,
		}
	}

	/// Records the decision. Failures are logged and never reach the caller.
	pub async fn record(
		&self,
		request: &AccessRequest,
		context: &AccessContext,
		policies: &[Policy],
		decision: &Decision,
	) {
		if !self.enabled {
			return;
		}

		let entry = build_entry(request, context, policies, decision);
		match with_timeout(
			self.store_timeout,
			self.store.insert_audit_entry(&entry, Utc::now()),
		)
		.await
		{
			Ok(id) => debug!(audit_id = id, "access decision recorded"),
			Err(e) => error!(
				error = %e,
				user_id = %request.user_id,
				entity_type = %request.entity_type,
				"failed to record access decision"
			),
		}
	}
}

fn build_entry(
	request: &AccessRequest,
	context: &AccessContext,
	policies: &[Policy],
	decision: &Decision,
) -> NewAuditEntry {
	NewAuditEntry {
		request_id: request.meta.request_id.clone(),
		session_id: Some(context.session_id.clone()),
		user_id: Some(request.user_id),
		policy_id: policies.first().map(|p| p.id),
		entity_type: request.entity_type,
		entity_id: request.entity_id,
		action: request.action,
		access_granted: decision.granted,
		denial_reason: decision.reason.clone(),
		table_name: request.table_name.clone(),
		applied_conditions: AppliedConditions {
			policies_evaluated: policies.len(),
			context_data: context.context_data.clone(),
		},
		ip_address: request.meta.ip_address.clone(),
		user_agent: request.meta.user_agent.clone(),
		request_method: request.meta.method.clone(),
		request_path: request.meta.path.clone(),
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use async_trait::async_trait;
	use chrono::DateTime;
	use rls_core::{
		Action, AuditEntry, AuditQuery, AuditStats, ContextData, EntityType, PolicyId, PolicyKind,
		RequestMeta, UserId,
	};
	use rls_db::testing::create_migrated_test_pool;
	use rls_db::{AuditRepository, DbError};

	struct FailingAuditStore;

	#[async_trait]
	impl AuditStore for FailingAuditStore {
		async fn insert_audit_entry(
			&self,
			_entry: &NewAuditEntry,
			_now: DateTime<Utc>,
		) -> rls_db::Result<i64> {
			Err(DbError::Internal("audit table locked".to_string()))
		}

		async fn query_audit_entries(&self, _query: &AuditQuery) -> rls_db::Result<Vec<AuditEntry>> {
			Ok(vec![])
		}

		async fn audit_stats(
			&self,
			_since: DateTime<Utc>,
			_period_days: i64,
		) -> rls_db::Result<AuditStats> {
			Err(DbError::Internal("unused".to_string()))
		}
	}

	fn context() -> AccessContext {
		AccessContext {
			session_id: "s1".to_string(),
			user_id: UserId::new(1),
			organization_id: None,
			tenant_id: None,
			roles: vec![],
			permissions: vec![],
			accessible_resource_ids: vec![],
			context_data: ContextData {
				username: "alice".to_string(),
				is_superuser: false,
				is_active: true,
			},
			ip_address: None,
			user_agent: None,
			created_at: Utc::now(),
			expires_at: None,
		}
	}

	fn policy(id: i64) -> Policy {
		Policy {
			id: PolicyId::new(id),
			name: "p".to_string(),
			description: None,
			entity_type: EntityType::Project,
			table_name: "projects".to_string(),
			action: Action::All,
			kind: PolicyKind::Public,
			organization_id: None,
			priority: 100,
			is_active: true,
			created_by: UserId::new(1),
			created_at: Utc::now(),
			updated_at: None,
		}
	}

	fn request() -> AccessRequest {
		AccessRequest::new(UserId::new(1), EntityType::Project, Action::Update)
			.with_entity_id(42)
			.with_table("projects")
			.with_meta(RequestMeta {
				request_id: Some("req-1".to_string()),
				method: Some("PUT".to_string()),
				path: Some("/projects/42".to_string()),
				..Default::default()
			})
	}

	#[tokio::test]
	async fn test_records_first_policy_and_snapshot() {
		let repo = Arc::new(AuditRepository::new(create_migrated_test_pool().await));
		let recorder = AuditRecorder::new(repo.clone(), true, Duration::from_secs(5));

		recorder
			.record(
				&request(),
				&context(),
				&[policy(4), policy(9)],
				&Decision::deny("not owner"),
			)
			.await;

		let entries = repo.query_audit_entries(&AuditQuery::default()).await.unwrap();
		assert_eq!(entries.len(), 1);
		let entry = &entries[0].entry;
		assert_eq!(entry.policy_id, Some(PolicyId::new(4)));
		assert_eq!(entry.applied_conditions.policies_evaluated, 2);
		assert_eq!(entry.applied_conditions.context_data.username, "alice");
		assert_eq!(entry.denial_reason.as_deref(), Some("not owner"));
		assert_eq!(entry.request_path.as_deref(), Some("/projects/42"));
		assert_eq!(entry.session_id.as_deref(), Some("s1"));
	}

	#[tokio::test]
	async fn test_disabled_recorder_writes_nothing() {
		let repo = Arc::new(AuditRepository::new(create_migrated_test_pool().await));
		let recorder = AuditRecorder::new(repo.clone(), false, Duration::from_secs(5));

		recorder
			.record(&request(), &context(), &[], &Decision::allow())
			.await;

		assert!(repo
			.query_audit_entries(&AuditQuery::default())
			.await
			.unwrap()
			.is_empty());
	}

	#[tokio::test]
	async fn test_store_failure_is_swallowed() {
		let recorder = AuditRecorder::new(Arc::new(FailingAuditStore), true, Duration::from_secs(5));
		recorder
			.record(&request(), &context(), &[], &Decision::allow())
			.await;
	}
}
