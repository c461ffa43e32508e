// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use std::sync::Arc;
use std::time::Duration;

use rls_core::checks::{
	self, REASON_CONDITION_FAILED, REASON_CONDITION_NOT_MET, REASON_NOT_ORG_MEMBER,
	REASON_NOT_OWNER, REASON_NO_ORGANIZATION, REASON_OWNERSHIP_CHECK_FAILED,
};
use rls_core::{
	AccessContext, Action, ConditionBindings, ConditionExpr, Decision, Policy, PolicyKind,
	TableRegistry,
};
use rls_db::LookupStore;
use tracing::{debug, warn};

use crate::error::{with_timeout, Result};

/// Decides access for a resolved, ordered list of policies.
///
/// The first denial wins. An empty list, or a list where every policy
/// passes, grants access.
pub struct PolicyEvaluator {
	lookup: Arc<dyn LookupStore>,
	tables: TableRegistry,
	store_timeout: Duration,
}

impl PolicyEvaluator {
	pub fn new(lookup: Arc<dyn LookupStore>, tables: TableRegistry, store_timeout: Duration) -> Self {
		Self {
			lookup,
			tables,
			store_timeout,
		}
	}

	#[tracing::instrument(skip(self, policies, context), fields(policies = policies.len(), user_id = %context.user_id))]
	pub async fn evaluate(
		&self,
		policies: &[Policy],
		context: &AccessContext,
		entity_id: Option<i64>,
		action: Action,
	) -> Decision {
		for policy in policies.iter().filter(|p| p.applies_to(action)) {
			let decision = self.evaluate_one(policy, context, entity_id).await;
			if !decision.is_granted() {
				debug!(
					policy_id = %policy.id,
					reason = decision.reason(),
					"access denied by policy"
				);
				return decision;
			}
		}
		Decision::allow()
	}

	pub async fn evaluate_one(
		&self,
		policy: &Policy,
		context: &AccessContext,
		entity_id: Option<i64>,
	) -> Decision {
		match &policy.kind {
			PolicyKind::Public => Decision::allow(),
			PolicyKind::OwnerOnly { condition_column } => {
				self
					.check_owner(policy, condition_column, context, entity_id)
					.await
			}
			PolicyKind::OrganizationMember => self.check_organization_member(context).await,
			PolicyKind::ProjectMember => checks::check_project_member(context, entity_id),
			PolicyKind::RoleBased {
				required_roles,
				required_permissions,
			} => checks::check_role_based(context, required_roles, required_permissions),
			PolicyKind::Conditional { custom_condition } => {
				self
					.check_condition(policy, custom_condition.as_deref(), context, entity_id)
					.await
			}
			PolicyKind::TenantIsolated => checks::check_tenant_isolated(context),
			PolicyKind::Unrecognized { kind } => Decision::deny(checks::unknown_policy_type(kind)),
		}
	}

	async fn check_owner(
		&self,
		policy: &Policy,
		column: &str,
		context: &AccessContext,
		entity_id: Option<i64>,
	) -> Decision {
		let Some(entity_id) = entity_id else {
			return Decision::allow();
		};

		match self.lookup_owner(&policy.table_name, column, entity_id).await {
			Ok(Some(owner)) if owner.is_user(context.user_id) => Decision::allow(),
			Ok(_) => Decision::deny(REASON_NOT_OWNER),
			Err(e) => {
				warn!(policy_id = %policy.id, error = %e, "ownership lookup failed");
				Decision::deny(REASON_OWNERSHIP_CHECK_FAILED)
			}
		}
	}

	async fn lookup_owner(
		&self,
		table: &str,
		column: &str,
		entity_id: i64,
	) -> Result<Option<rls_core::SqlValue>> {
		self.tables.quote_table(table)?;
		with_timeout(
			self.store_timeout,
			self.lookup.lookup_column(table, column, entity_id),
		)
		.await
	}

	async fn check_organization_member(&self, context: &AccessContext) -> Decision {
		let Some(organization_id) = context.organization_id else {
			return Decision::deny(REASON_NO_ORGANIZATION);
		};

		let member = with_timeout(
			self.store_timeout,
			self
				.lookup
				.is_active_org_member(organization_id, context.user_id),
		)
		.await;

		match member {
			Ok(true) => Decision::allow(),
			Ok(false) => Decision::deny(REASON_NOT_ORG_MEMBER),
			Err(e) => {
				warn!(organization_id = %organization_id, error = %e, "membership lookup failed");
				Decision::deny(checks::policy_evaluation_error(e))
			}
		}
	}

	async fn check_condition(
		&self,
		policy: &Policy,
		condition: Option<&str>,
		context: &AccessContext,
		entity_id: Option<i64>,
	) -> Decision {
		let condition = condition.map(str::trim).unwrap_or_default();
		if condition.is_empty() {
			return Decision::allow();
		}

		match self
			.run_condition(&policy.table_name, condition, context, entity_id)
			.await
		{
			Ok(Some(value)) if value.is_truthy() => Decision::allow(),
			Ok(_) => Decision::deny(REASON_CONDITION_NOT_MET),
			Err(e) => {
				warn!(policy_id = %policy.id, error = %e, "custom condition failed");
				Decision::deny(REASON_CONDITION_FAILED)
			}
		}
	}

	async fn run_condition(
		&self,
		table: &str,
		condition: &str,
		context: &AccessContext,
		entity_id: Option<i64>,
	) -> Result<Option<rls_core::SqlValue>> {
		let bindings = ConditionBindings {
			user_id: context.user_id,
			organization_id: context.organization_id,
			entity_id,
			tenant_id: context.tenant_id.clone(),
		};
		let compiled = ConditionExpr::parse(condition)?.compile(&bindings)?;

		let scope = match entity_id {
			Some(id) => {
				self.tables.quote_table(table)?;
				Some((table, id))
			}
			None => None,
		};

		with_timeout(
			self.store_timeout,
			self.lookup.evaluate_condition(&compiled, scope),
		)
		.await
	}
}
