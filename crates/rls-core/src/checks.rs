// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Policy checks that need nothing beyond the access context.
//!
//! Kinds that must read from the store (`owner_only`, `organization_member`,
//! `conditional`) are evaluated by the engine; their denial reasons live here
//! so every caller reports the same strings.

use crate::context::AccessContext;
use crate::decision::Decision;

pub const REASON_USER_NOT_FOUND: &str = "user not found";
pub const REASON_NOT_OWNER: &str = "not owner";
pub const REASON_OWNERSHIP_CHECK_FAILED: &str = "ownership check failed";
pub const REASON_NO_ORGANIZATION: &str = "no organization context";
pub const REASON_NOT_ORG_MEMBER: &str = "not an organization member";
pub const REASON_NOT_PROJECT_MEMBER: &str = "not a project member";
pub const REASON_CONDITION_NOT_MET: &str = "custom condition not met";
pub const REASON_CONDITION_FAILED: &str = "custom condition evaluation failed";
pub const REASON_NO_TENANT: &str = "no tenant context";

pub fn unknown_policy_type(kind: &str) -> String {
	format!("unknown policy type: {kind}")
}

pub fn policy_evaluation_error(detail: impl std::fmt::Display) -> String {
	format!("policy evaluation error: {detail}")
}

pub fn access_check_failed(detail: impl std::fmt::Display) -> String {
	format!("access check failed: {detail}")
}

/// `project_member`: without a target row the check passes.
pub fn check_project_member(context: &AccessContext, entity_id: Option<i64>) -> Decision {
	match entity_id {
		None => Decision::allow(),
		Some(id) if context.can_access_resource(id) => Decision::allow(),
		Some(_) => Decision::deny(REASON_NOT_PROJECT_MEMBER),
	}
}

/// `role_based`: each non-empty requirement needs at least one overlap.
pub fn check_role_based(
	context: &AccessContext,
	required_roles: &[String],
	required_permissions: &[String],
) -> Decision {
	if !required_roles.is_empty() && !required_roles.iter().any(|r| context.has_role(r)) {
		return Decision::deny(format!("required roles: {}", required_roles.join(", ")));
	}
	if !required_permissions.is_empty()
		&& !required_permissions.iter().any(|p| context.has_permission(p))
	{
		return Decision::deny(format!(
			"required permissions: {}",
			required_permissions.join(", ")
		));
	}
	Decision::allow()
}

/// `tenant_isolated`: only the presence of a tenant is checked.
pub fn check_tenant_isolated(context: &AccessContext) -> Decision {
	match context.tenant_id.as_deref() {
		Some(t) if !t.is_empty() => Decision::allow(),
		_ => Decision::deny(REASON_NO_TENANT),
	}
}
