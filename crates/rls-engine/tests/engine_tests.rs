// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! End-to-end decisions through [`RlsEngine`] on an in-memory database.

use chrono::Utc;
use rls_core::checks::{
	REASON_NOT_OWNER, REASON_NO_ORGANIZATION, REASON_NO_TENANT, REASON_OWNERSHIP_CHECK_FAILED,
	REASON_USER_NOT_FOUND,
};
use rls_core::{
	Action, AuditQuery, ContextUpdate, EntityType, FilterQuery, NewRuleAssignment, OrgId, Policy,
	PolicyDefinition, PolicyFilter, PolicyKind, PolicyUpdate, Predicate, RequestMeta, RoleId, SqlValue,
	UserId,
};
use rls_db::testing::{
	add_org_member, create_migrated_test_pool, grant_role, insert_organization, insert_project,
	insert_role, insert_user,
};
use rls_db::SqlitePool;
use rls_engine::{AccessRequest, EngineError, EngineSettings, RlsEngine};

async fn setup() -> (RlsEngine, SqlitePool) {
	let pool = create_migrated_test_pool().await;
	insert_user(&pool, 1, "alice").await;
	insert_user(&pool, 2, "bob").await;
	let engine = RlsEngine::with_sqlite(pool.clone(), EngineSettings::default());
	(engine, pool)
}

async fn register(engine: &RlsEngine, name: &str, kind: PolicyKind, priority: i32) -> Policy {
	engine
		.register_policy(
			&PolicyDefinition::new(
				name,
				EntityType::Project,
				"projects",
				Action::All,
				kind,
				UserId::new(1),
			)
			.with_priority(priority),
		)
		.await
		.unwrap()
}

async fn assign_to_everyone(engine: &RlsEngine, policy: &Policy) {
	assign(engine, policy, None, None).await;
}

async fn assign(engine: &RlsEngine, policy: &Policy, user: Option<i64>, role: Option<i64>) {
	engine
		.assign_policy(&NewRuleAssignment {
			policy_id: policy.id,
			entity_type: policy.entity_type,
			entity_id: None,
			user_id: user.map(UserId::new),
			role_id: role.map(RoleId::new),
			conditions: None,
			created_by: UserId::new(1),
		})
		.await
		.unwrap();
}

fn select_project(user: i64, entity_id: Option<i64>) -> AccessRequest {
	let request = AccessRequest::new(UserId::new(user), EntityType::Project, Action::Select)
		.with_table("projects");
	match entity_id {
		Some(id) => request.with_entity_id(id),
		None => request,
	}
}

fn role_based(role: &str) -> PolicyKind {
	PolicyKind::RoleBased {
		required_roles: vec![role.to_string()],
		required_permissions: vec![],
	}
}

async fn count_rows(pool: &SqlitePool, query: &FilterQuery) -> usize {
	let (sql, params) = query.to_sql().unwrap();
	let mut q = sqlx::query(&sql);
	for param in params {
		if let SqlValue::Integer(v) = param {
			q = q.bind(v);
		}
	}
	q.fetch_all(pool).await.unwrap().len()
}

#[tokio::test]
async fn test_no_applicable_policies_allows_and_audits() {
	let (engine, _pool) = setup().await;

	let decision = engine.check_access(&select_project(1, Some(42))).await;
	assert!(decision.is_granted());
	assert_eq!(decision.reason(), "");

	let entries = engine.audit_entries(&AuditQuery::default()).await.unwrap();
	assert_eq!(entries.len(), 1);
	assert!(entries[0].entry.access_granted);
	assert_eq!(entries[0].entry.policy_id, None);
	assert_eq!(entries[0].entry.applied_conditions.policies_evaluated, 0);
	assert_eq!(entries[0].entry.applied_conditions.context_data.username, "alice");
}

#[tokio::test]
async fn test_any_denial_overrides_grants() {
	let (engine, _pool) = setup().await;
	let public = register(&engine, "everyone", PolicyKind::Public, 200).await;
	let admins = register(&engine, "admins only", role_based("admin"), 100).await;
	assign_to_everyone(&engine, &public).await;
	assign_to_everyone(&engine, &admins).await;

	let decision = engine.check_access(&select_project(1, None)).await;
	assert!(!decision.is_granted());
	assert_eq!(decision.reason(), "required roles: admin");

	let entries = engine.audit_entries(&AuditQuery::default()).await.unwrap();
	assert_eq!(entries[0].entry.policy_id, Some(public.id));
	assert_eq!(entries[0].entry.applied_conditions.policies_evaluated, 2);
}

#[tokio::test]
async fn test_first_denial_follows_priority_then_id() {
	let (engine, _pool) = setup().await;
	let low = register(&engine, "low", role_based("low"), 10).await;
	let first_tie = register(&engine, "tie a", role_based("tie-a"), 50).await;
	let second_tie = register(&engine, "tie b", role_based("tie-b"), 50).await;
	for policy in [&low, &second_tie, &first_tie] {
		assign_to_everyone(&engine, policy).await;
	}

	let decision = engine.check_access(&select_project(1, None)).await;
	assert_eq!(decision.reason(), "required roles: tie-a");

	engine.deactivate_policy(first_tie.id).await.unwrap();
	let decision = engine.check_access(&select_project(1, None)).await;
	assert_eq!(decision.reason(), "required roles: tie-b");
}

#[tokio::test]
async fn test_owner_scenario() {
	let (engine, pool) = setup().await;
	insert_project(&pool, 42, 1, false).await;
	let owner = register(
		&engine,
		"owners",
		PolicyKind::OwnerOnly {
			condition_column: "user_id".to_string(),
		},
		100,
	)
	.await;
	assign_to_everyone(&engine, &owner).await;

	assert!(engine.check_access(&select_project(1, Some(42))).await.is_granted());

	let denied = engine.check_access(&select_project(2, Some(42))).await;
	assert!(!denied.is_granted());
	assert_eq!(denied.reason(), REASON_NOT_OWNER);
}

#[tokio::test]
async fn test_ownership_lookup_failure_fails_closed() {
	let (engine, _pool) = setup().await;
	let policy = engine
		.register_policy(&PolicyDefinition::new(
			"archived owners",
			EntityType::Project,
			"archived_projects",
			Action::All,
			PolicyKind::OwnerOnly {
				condition_column: "user_id".to_string(),
			},
			UserId::new(1),
		))
		.await
		.unwrap();
	assign_to_everyone(&engine, &policy).await;

	let decision = engine
		.check_access(
			&AccessRequest::new(UserId::new(1), EntityType::Project, Action::Select)
				.with_entity_id(7),
		)
		.await;
	assert_eq!(decision.reason(), REASON_OWNERSHIP_CHECK_FAILED);
}

#[tokio::test]
async fn test_seeded_defaults_without_assignments_allow_profile_updates() {
	let (engine, _pool) = setup().await;
	let seeded = engine.seed_default_policies(UserId::new(1)).await;
	assert_eq!(seeded.len(), 3);

	let decision = engine
		.check_access(
			&AccessRequest::new(UserId::new(2), EntityType::User, Action::Update).with_entity_id(1),
		)
		.await;
	assert!(decision.is_granted());
}

#[tokio::test]
async fn test_role_only_assignment_needs_the_role() {
	let (engine, pool) = setup().await;
	insert_role(&pool, 5, "tenant-bound").await;
	grant_role(&pool, 2, 5).await;
	let tenant = register(&engine, "tenant", PolicyKind::TenantIsolated, 100).await;
	assign(&engine, &tenant, None, Some(5)).await;

	assert!(engine.check_access(&select_project(1, None)).await.is_granted());

	let decision = engine.check_access(&select_project(2, None)).await;
	assert_eq!(decision.reason(), REASON_NO_TENANT);
}

#[tokio::test]
async fn test_unknown_user_is_denied_without_audit() {
	let (engine, _pool) = setup().await;

	let decision = engine.check_access(&select_project(99, None)).await;
	assert_eq!(decision.reason(), REASON_USER_NOT_FOUND);
	assert!(engine
		.audit_entries(&AuditQuery::default())
		.await
		.unwrap()
		.is_empty());
}

#[tokio::test]
async fn test_session_context_supplies_organization() {
	let (engine, pool) = setup().await;
	insert_organization(&pool, 5, "acme").await;
	add_org_member(&pool, 5, 1, true).await;
	let members = register(&engine, "org members", PolicyKind::OrganizationMember, 100).await;
	assign_to_everyone(&engine, &members).await;
	engine
		.create_context(
			UserId::new(1),
			"s1",
			&RequestMeta::default(),
			Some(OrgId::new(5)),
			None,
		)
		.await
		.unwrap();

	let with_session = engine
		.check_access(&select_project(1, None).with_session("s1"))
		.await;
	assert!(with_session.is_granted());

	let without_session = engine.check_access(&select_project(1, None)).await;
	assert_eq!(without_session.reason(), REASON_NO_ORGANIZATION);
}

#[tokio::test]
async fn test_expired_session_falls_back_to_temporary_context() {
	let (engine, pool) = setup().await;
	insert_organization(&pool, 5, "acme").await;
	add_org_member(&pool, 5, 1, true).await;
	let members = register(&engine, "org members", PolicyKind::OrganizationMember, 100).await;
	assign_to_everyone(&engine, &members).await;
	engine
		.create_context(
			UserId::new(1),
			"s1",
			&RequestMeta::default(),
			Some(OrgId::new(5)),
			None,
		)
		.await
		.unwrap();

	engine
		.update_context(
			"s1",
			&ContextUpdate {
				expires_at: Some(Utc::now() - chrono::Duration::minutes(1)),
				..Default::default()
			},
		)
		.await
		.unwrap();
	assert!(engine.get_context("s1").await.unwrap().is_none());

	let decision = engine
		.check_access(&select_project(1, None).with_session("s1"))
		.await;
	assert_eq!(decision.reason(), REASON_NO_ORGANIZATION);

	let entries = engine.audit_entries(&AuditQuery::default()).await.unwrap();
	let session = entries[0].entry.session_id.as_deref().unwrap();
	assert!(session.starts_with("temp_"));
}

#[tokio::test]
async fn test_project_member_filter_without_projects_returns_no_rows() {
	let (engine, pool) = setup().await;
	insert_project(&pool, 1, 1, false).await;
	insert_project(&pool, 2, 1, false).await;
	let members = register(&engine, "members", PolicyKind::ProjectMember, 100).await;
	assign_to_everyone(&engine, &members).await;

	let filtered = engine
		.apply_filter(
			FilterQuery::new("projects"),
			UserId::new(2),
			EntityType::Project,
			Action::Select,
			None,
		)
		.await;
	assert!(filtered.matches_nothing());
	assert_eq!(count_rows(&pool, &filtered).await, 0);

	let owner_view = engine
		.apply_filter(
			FilterQuery::new("projects"),
			UserId::new(1),
			EntityType::Project,
			Action::Select,
			None,
		)
		.await;
	assert_eq!(count_rows(&pool, &owner_view).await, 2);
}

#[tokio::test]
async fn test_owner_filter_restricts_rows() {
	let (engine, pool) = setup().await;
	insert_project(&pool, 1, 1, false).await;
	insert_project(&pool, 2, 2, false).await;
	insert_project(&pool, 3, 2, true).await;
	let owner = register(
		&engine,
		"owners",
		PolicyKind::OwnerOnly {
			condition_column: "user_id".to_string(),
		},
		100,
	)
	.await;
	assign_to_everyone(&engine, &owner).await;

	let filtered = engine
		.apply_filter(
			FilterQuery::new("projects"),
			UserId::new(2),
			EntityType::Project,
			Action::Select,
			None,
		)
		.await;
	assert_eq!(count_rows(&pool, &filtered).await, 2);
}

#[tokio::test]
async fn test_owner_filter_applies_to_other_table_names() {
	let (engine, _pool) = setup().await;
	let owner = register(
		&engine,
		"owners",
		PolicyKind::OwnerOnly {
			condition_column: "user_id".to_string(),
		},
		100,
	)
	.await;
	assign_to_everyone(&engine, &owner).await;

	let filtered = engine
		.apply_filter(
			FilterQuery::new("project_rows"),
			UserId::new(2),
			EntityType::Project,
			Action::Select,
			None,
		)
		.await;
	assert_eq!(
		filtered.predicates,
		vec![Predicate::ColumnEquals {
			column: "user_id".to_string(),
			value: SqlValue::Integer(2),
		}]
	);
	let (sql, params) = filtered.to_sql().unwrap();
	assert!(sql.contains("WHERE"));
	assert_eq!(params, vec![SqlValue::Integer(2)]);
}

#[tokio::test]
async fn test_filter_for_unknown_user_matches_nothing() {
	let (engine, _pool) = setup().await;
	let filtered = engine
		.apply_filter(
			FilterQuery::new("projects"),
			UserId::new(404),
			EntityType::Project,
			Action::Select,
			None,
		)
		.await;
	assert!(filtered.matches_nothing());
}

#[tokio::test]
async fn test_table_registry_rejects_unlisted_policies() {
	let pool = create_migrated_test_pool().await;
	let engine = RlsEngine::with_sqlite(
		pool,
		EngineSettings {
			allowed_tables: vec!["projects".to_string()],
			..Default::default()
		},
	);

	let err = engine
		.register_policy(&PolicyDefinition::new(
			"secrets",
			EntityType::Custom,
			"secrets",
			Action::Select,
			PolicyKind::Public,
			UserId::new(1),
		))
		.await
		.unwrap_err();
	assert!(matches!(err, EngineError::Core(_)));
}

#[tokio::test]
async fn test_policy_administration() {
	let (engine, _pool) = setup().await;
	let policy = register(&engine, "admins", role_based("admin"), 100).await;

	let updated = engine
		.update_policy(
			policy.id,
			&PolicyUpdate {
				priority: Some(300),
				kind: Some(role_based("owner")),
				..Default::default()
			},
		)
		.await
		.unwrap();
	assert_eq!(updated.priority, 300);
	assert!(updated.updated_at.is_some());

	let stored = engine.get_policy(policy.id).await.unwrap().unwrap();
	assert_eq!(stored.kind, role_based("owner"));

	let invalid = engine
		.update_policy(
			policy.id,
			&PolicyUpdate {
				kind: Some(PolicyKind::Conditional {
					custom_condition: Some("id = (SELECT 1)".to_string()),
				}),
				..Default::default()
			},
		)
		.await;
	assert!(invalid.is_err());

	assert!(engine.deactivate_policy(policy.id).await.unwrap());
	assert!(engine
		.list_policies(&PolicyFilter::default())
		.await
		.unwrap()
		.is_empty());
	let all = engine
		.list_policies(&PolicyFilter {
			is_active: None,
			..Default::default()
		})
		.await
		.unwrap();
	assert_eq!(all.len(), 1);

	let missing = engine
		.update_policy(
			rls_core::PolicyId::new(999),
			&PolicyUpdate {
				priority: Some(1),
				..Default::default()
			},
		)
		.await;
	assert!(matches!(missing, Err(EngineError::Db(_))));
}

#[tokio::test]
async fn test_audit_stats_summarise_decisions() {
	let (engine, pool) = setup().await;
	insert_project(&pool, 42, 1, false).await;
	let owner = register(
		&engine,
		"owners",
		PolicyKind::OwnerOnly {
			condition_column: "user_id".to_string(),
		},
		100,
	)
	.await;
	assign_to_everyone(&engine, &owner).await;

	engine.check_access(&select_project(1, Some(42))).await;
	engine.check_access(&select_project(2, Some(42))).await;
	engine.check_access(&select_project(2, Some(42))).await;

	let stats = engine.audit_stats(7).await.unwrap();
	assert_eq!(stats.total_checks, 3);
	assert_eq!(stats.granted, 1);
	assert_eq!(stats.denied, 2);
	assert_eq!(stats.top_denial_reasons[0].reason, REASON_NOT_OWNER);
	assert_eq!(stats.top_denial_reasons[0].count, 2);

	let denied_for_bob = engine
		.audit_entries(&AuditQuery {
			user_id: Some(UserId::new(2)),
			access_granted: Some(false),
			..Default::default()
		})
		.await
		.unwrap();
	assert_eq!(denied_for_bob.len(), 2);
}
