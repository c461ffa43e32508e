// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! The engine facade.
//!
//! `check_access` and `apply_filter` never fail: every internal error is
//! turned into a denial. Administrative operations return [`Result`].

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use rls_config::RlsConfig;
use rls_core::checks::{access_check_failed, REASON_USER_NOT_FOUND};
use rls_core::{
	AccessContext, Action, AuditEntry, AuditQuery, AuditStats, ContextUpdate, Decision, EntityType,
	FilterQuery, NewRuleAssignment, OrgId, Policy, PolicyDefinition, PolicyFilter, PolicyId,
	PolicyKind, PolicyUpdate, RequestMeta, RuleAssignment, TableRegistry, UserId,
};
use rls_db::{
	AssignmentRepository, AssignmentStore, AuditRepository, AuditStore, ContextRepository,
	ContextStore, DbError, DirectoryRepository, DirectoryStore, LookupRepository, LookupStore,
	PolicyRepository, PolicyStore, SqlitePool,
};
use tracing::{error, info, warn};

use crate::audit::AuditRecorder;
use crate::cache::{ContextCache, InMemoryContextCache};
use crate::context::ContextManager;
use crate::error::{with_timeout, EngineError, Result};
use crate::evaluator::PolicyEvaluator;
use crate::filter::QueryFilterBuilder;
use crate::request::AccessRequest;
use crate::resolver::PolicyResolver;

/// Longest window accepted by [`RlsEngine::audit_stats`].
const MAX_STATS_DAYS: i64 = 3650;

/// The persistence seams the engine talks to.
#[derive(Clone)]
pub struct Stores {
	pub policies: Arc<dyn PolicyStore>,
	pub assignments: Arc<dyn AssignmentStore>,
	pub contexts: Arc<dyn ContextStore>,
	pub audit: Arc<dyn AuditStore>,
	pub lookup: Arc<dyn LookupStore>,
	pub directory: Arc<dyn DirectoryStore>,
}

impl Stores {
	/// SQLite repositories sharing one pool.
	pub fn sqlite(pool: SqlitePool) -> Self {
		Self {
			policies: Arc::new(PolicyRepository::new(pool.clone())),
			assignments: Arc::new(AssignmentRepository::new(pool.clone())),
			contexts: Arc::new(ContextRepository::new(pool.clone())),
			audit: Arc::new(AuditRepository::new(pool.clone())),
			lookup: Arc::new(LookupRepository::new(pool.clone())),
			directory: Arc::new(DirectoryRepository::new(pool)),
		}
	}
}

#[derive(Debug, Clone)]
pub struct EngineSettings {
	pub context_ttl: chrono::Duration,
	pub store_timeout: Duration,
	pub audit_enabled: bool,
	pub allowed_tables: Vec<String>,
}

impl Default for EngineSettings {
	fn default() -> Self {
		Self {
			context_ttl: chrono::Duration::hours(24),
			store_timeout: Duration::from_secs(5),
			audit_enabled: true,
			allowed_tables: Vec::new(),
		}
	}
}

impl EngineSettings {
	pub fn from_config(config: &RlsConfig) -> Result<Self> {
		let context_ttl = chrono::Duration::from_std(config.context.ttl())
			.map_err(|e| EngineError::Config(format!("context.ttl_secs: {e}")))?;
		Ok(Self {
			context_ttl,
			store_timeout: config.evaluation.store_timeout(),
			audit_enabled: config.audit.enabled,
			allowed_tables: config.evaluation.allowed_tables.clone(),
		})
	}
}

pub struct RlsEngine {
	contexts: ContextManager,
	resolver: PolicyResolver,
	evaluator: PolicyEvaluator,
	filters: QueryFilterBuilder,
	recorder: AuditRecorder,
	policies: Arc<dyn PolicyStore>,
	assignments: Arc<dyn AssignmentStore>,
	audit: Arc<dyn AuditStore>,
	tables: TableRegistry,
	store_timeout: Duration,
}

impl RlsEngine {
	pub fn new(stores: Stores, cache: Arc<dyn ContextCache>, settings: EngineSettings) -> Self {
		let tables = TableRegistry::new(settings.allowed_tables.iter().cloned());
		let timeout = settings.store_timeout;

		Self {
			contexts: ContextManager::new(
				stores.contexts.clone(),
				stores.directory.clone(),
				cache,
				settings.context_ttl,
				timeout,
			),
			resolver: PolicyResolver::new(
				stores.policies.clone(),
				stores.assignments.clone(),
				stores.directory.clone(),
				timeout,
			),
			evaluator: PolicyEvaluator::new(stores.lookup.clone(), tables.clone(), timeout),
			filters: QueryFilterBuilder::new(tables.clone()),
			recorder: AuditRecorder::new(stores.audit.clone(), settings.audit_enabled, timeout),
			policies: stores.policies,
			assignments: stores.assignments,
			audit: stores.audit,
			tables,
			store_timeout: timeout,
		}
	}

	/// SQLite stores with a process-local context cache.
	pub fn with_sqlite(pool: SqlitePool, settings: EngineSettings) -> Self {
		Self::new(
			Stores::sqlite(pool),
			Arc::new(InMemoryContextCache::new()),
			settings,
		)
	}

	pub fn from_config(pool: SqlitePool, config: &RlsConfig) -> Result<Self> {
		Ok(Self::with_sqlite(pool, EngineSettings::from_config(config)?))
	}

	// Contexts

	pub async fn create_context(
		&self,
		user_id: UserId,
		session_id: &str,
		meta: &RequestMeta,
		organization_id: Option<OrgId>,
		tenant_id: Option<String>,
	) -> Result<AccessContext> {
		self
			.contexts
			.create_context(user_id, session_id, meta, organization_id, tenant_id)
			.await
	}

	pub async fn get_context(&self, session_id: &str) -> Result<Option<AccessContext>> {
		self.contexts.get_context(session_id).await
	}

	pub async fn update_context(
		&self,
		session_id: &str,
		update: &ContextUpdate,
	) -> Result<Option<AccessContext>> {
		self.contexts.update_context(session_id, update).await
	}

	pub async fn invalidate_context(&self, session_id: &str) -> Result<bool> {
		self.contexts.invalidate_context(session_id).await
	}

	pub async fn refresh_context(
		&self,
		user_id: UserId,
		session_id: &str,
		meta: &RequestMeta,
		organization_id: Option<OrgId>,
		tenant_id: Option<String>,
	) -> Result<AccessContext> {
		self
			.contexts
			.refresh_context(user_id, session_id, meta, organization_id, tenant_id)
			.await
	}

	pub async fn purge_expired_contexts(&self, now: DateTime<Utc>) -> Result<u64> {
		self.contexts.purge_expired(now).await
	}

	// Decisions

	/// Decides a request and records it in the audit log.
	#[tracing::instrument(
		skip(self, request),
		fields(user_id = %request.user_id, entity_type = %request.entity_type, action = %request.action)
	)]
	pub async fn check_access(&self, request: &AccessRequest) -> Decision {
		match self.try_check_access(request).await {
			Ok(decision) => decision,
			Err(EngineError::UserNotFound(_)) => Decision::deny(REASON_USER_NOT_FOUND),
			Err(e) => {
				warn!(error = %e, "access check failed");
				Decision::deny(access_check_failed(e))
			}
		}
	}

	async fn try_check_access(&self, request: &AccessRequest) -> Result<Decision> {
		let context = self
			.resolve_context(request.user_id, request.session_id.as_deref())
			.await?;

		let policies = self
			.resolver
			.resolve(
				request.entity_type,
				request.action,
				request.table_name.as_deref(),
				Some(request.user_id),
				context.organization_id,
			)
			.await?;

		let decision = self
			.evaluator
			.evaluate(&policies, &context, request.entity_id, request.action)
			.await;

		self
			.recorder
			.record(request, &context, &policies, &decision)
			.await;
		Ok(decision)
	}

	/// Narrows `query` to the rows the user may see. Policies are resolved by
	/// entity type and action, whatever table `query` reads. Failures match nothing.
	#[tracing::instrument(skip(self, query), fields(table = %query.table, user_id = %user_id))]
	pub async fn apply_filter(
		&self,
		query: FilterQuery,
		user_id: UserId,
		entity_type: EntityType,
		action: Action,
		session_id: Option<&str>,
	) -> FilterQuery {
		let resolved = async {
			let context = self.resolve_context(user_id, session_id).await?;
			let policies = self
				.resolver
				.resolve(
					entity_type,
					action,
					None,
					Some(user_id),
					context.organization_id,
				)
				.await?;
			Ok::<_, EngineError>((context, policies))
		}
		.await;

		match resolved {
			Ok((context, policies)) => self.filters.apply(query, &policies, &context),
			Err(e) => {
				warn!(error = %e, "query filter could not resolve policies");
				query.deny_all()
			}
		}
	}

	async fn resolve_context(
		&self,
		user_id: UserId,
		session_id: Option<&str>,
	) -> Result<AccessContext> {
		if let Some(session_id) = session_id {
			if let Some(context) = self.contexts.get_context(session_id).await? {
				return Ok(context);
			}
		}
		self.contexts.create_temporary_context(user_id).await
	}

	// Policy administration

	#[tracing::instrument(skip(self, definition), fields(name = %definition.name, entity_type = %definition.entity_type))]
	pub async fn register_policy(&self, definition: &PolicyDefinition) -> Result<Policy> {
		definition.validate()?;
		self.tables.quote_table(&definition.table_name)?;

		let policy = with_timeout(
			self.store_timeout,
			self.policies.create_policy(definition, Utc::now()),
		)
		.await?;

		info!(policy_id = %policy.id, kind = policy.kind.type_name(), "policy registered");
		Ok(policy)
	}

	pub async fn get_policy(&self, id: PolicyId) -> Result<Option<Policy>> {
		with_timeout(self.store_timeout, self.policies.get_policy(id)).await
	}

	pub async fn list_policies(&self, filter: &PolicyFilter) -> Result<Vec<Policy>> {
		with_timeout(self.store_timeout, self.policies.list_policies(filter)).await
	}

	#[tracing::instrument(skip(self, update), fields(policy_id = %id))]
	pub async fn update_policy(&self, id: PolicyId, update: &PolicyUpdate) -> Result<Policy> {
		let mut policy = self
			.get_policy(id)
			.await?
			.ok_or_else(|| DbError::NotFound(format!("policy {id}")))?;
		if update.is_empty() {
			return Ok(policy);
		}

		update.apply_to(&mut policy, Utc::now())?;
		with_timeout(self.store_timeout, self.policies.update_policy(&policy)).await?;

		info!("policy updated");
		Ok(policy)
	}

	/// Soft delete: the policy stays stored but stops applying.
	#[tracing::instrument(skip(self), fields(policy_id = %id))]
	pub async fn deactivate_policy(&self, id: PolicyId) -> Result<bool> {
		let deactivated = with_timeout(
			self.store_timeout,
			self.policies.deactivate_policy(id, Utc::now()),
		)
		.await?;
		if deactivated {
			info!("policy deactivated");
		}
		Ok(deactivated)
	}

	pub async fn assign_policy(&self, assignment: &NewRuleAssignment) -> Result<RuleAssignment> {
		let created = with_timeout(
			self.store_timeout,
			self.assignments.create_assignment(assignment, Utc::now()),
		)
		.await?;
		info!(assignment_id = %created.id, policy_id = %created.policy_id, "policy assigned");
		Ok(created)
	}

	pub async fn list_assignments(
		&self,
		policy_id: Option<PolicyId>,
		user_id: Option<UserId>,
	) -> Result<Vec<RuleAssignment>> {
		with_timeout(
			self.store_timeout,
			self.assignments.list_assignments(policy_id, user_id),
		)
		.await
	}

	/// Registers the stock policies. A policy that fails is logged and skipped.
	pub async fn seed_default_policies(&self, created_by: UserId) -> Vec<Policy> {
		let mut created = Vec::new();
		for definition in default_policies(created_by) {
			match self.register_policy(&definition).await {
				Ok(policy) => created.push(policy),
				Err(e) => error!(name = %definition.name, error = %e, "failed to create default policy"),
			}
		}
		created
	}

	// Audit

	pub async fn audit_entries(&self, query: &AuditQuery) -> Result<Vec<AuditEntry>> {
		with_timeout(self.store_timeout, self.audit.query_audit_entries(query)).await
	}

	/// Decision statistics over the last `days` days.
	pub async fn audit_stats(&self, days: i64) -> Result<AuditStats> {
		let days = days.clamp(1, MAX_STATS_DAYS);
		let since = Utc::now() - chrono::Duration::days(days);
		with_timeout(self.store_timeout, self.audit.audit_stats(since, days)).await
	}
}

fn default_policies(created_by: UserId) -> Vec<PolicyDefinition> {
	vec![
		PolicyDefinition::new(
			"Project Owner Access",
			EntityType::Project,
			"projects",
			Action::All,
			PolicyKind::OwnerOnly {
				condition_column: "user_id".to_string(),
			},
			created_by,
		)
		.with_description("Project owners have full access to their projects"),
		PolicyDefinition::new(
			"Public Project Read Access",
			EntityType::Project,
			"projects",
			Action::Select,
			PolicyKind::Conditional {
				custom_condition: Some("is_public = true".to_string()),
			},
			created_by,
		)
		.with_description("Public projects are readable by all users"),
		PolicyDefinition::new(
			"User Profile Access",
			EntityType::User,
			"users",
			Action::Update,
			PolicyKind::OwnerOnly {
				condition_column: "id".to_string(),
			},
			created_by,
		)
		.with_description("Users can only update their own profiles"),
	]
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_default_policies_validate() {
		let defaults = default_policies(UserId::new(1));
		assert_eq!(defaults.len(), 3);
		for definition in &defaults {
			definition.validate().unwrap();
		}
		assert_eq!(defaults[2].table_name, "users");
	}

	#[test]
	fn test_settings_from_config() {
		let mut config = RlsConfig::default();
		config.context.ttl_secs = 60;
		config.evaluation.allowed_tables = vec!["projects".to_string()];

		let settings = EngineSettings::from_config(&config).unwrap();
		assert_eq!(settings.context_ttl, chrono::Duration::seconds(60));
		assert_eq!(settings.allowed_tables, vec!["projects"]);
		assert!(settings.audit_enabled);
	}
}
