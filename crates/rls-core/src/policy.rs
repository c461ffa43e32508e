// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Policies, rule assignments and the definitions used to create them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::condition::ConditionExpr;
use crate::error::{CoreError, Result};
use crate::sql::validate_identifier;
use crate::types::{Action, AssignmentId, EntityType, OrgId, PolicyId, PolicyType, RoleId, UserId};

/// Column compared against the caller for `owner_only` policies when none is given.
pub const DEFAULT_OWNER_COLUMN: &str = "user_id";

/// Priority assigned to policies created without one.
pub const DEFAULT_PRIORITY: i32 = 100;

/// Largest page size accepted by list queries.
pub const MAX_PAGE_SIZE: i64 = 1000;

/// The decision rule of a policy, with the parameters that rule needs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "policy_type", rename_all = "snake_case")]
pub enum PolicyKind {
	Public,
	OwnerOnly {
		condition_column: String,
	},
	OrganizationMember,
	ProjectMember,
	RoleBased {
		#[serde(default)]
		required_roles: Vec<String>,
		#[serde(default)]
		required_permissions: Vec<String>,
	},
	Conditional {
		#[serde(default)]
		custom_condition: Option<String>,
	},
	TenantIsolated,
	/// A stored kind this build does not know how to evaluate.
	Unrecognized {
		kind: String,
	},
}

/// Flat column representation of a [`PolicyKind`], as persisted.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PolicyColumns {
	pub policy_type: String,
	pub condition_column: Option<String>,
	pub custom_condition: Option<String>,
	pub required_roles: Option<Vec<String>>,
	pub required_permissions: Option<Vec<String>>,
}

impl PolicyKind {
	/// Name of the kind as stored.
	pub fn type_name(&self) -> &str {
		match self {
			PolicyKind::Public => PolicyType::Public.as_str(),
			PolicyKind::OwnerOnly { .. } => PolicyType::OwnerOnly.as_str(),
			PolicyKind::OrganizationMember => PolicyType::OrganizationMember.as_str(),
			PolicyKind::ProjectMember => PolicyType::ProjectMember.as_str(),
			PolicyKind::RoleBased { .. } => PolicyType::RoleBased.as_str(),
			PolicyKind::Conditional { .. } => PolicyType::Conditional.as_str(),
			PolicyKind::TenantIsolated => PolicyType::TenantIsolated.as_str(),
			PolicyKind::Unrecognized { kind } => kind,
		}
	}

	/// Rebuilds a kind from its stored columns. Unknown type names load as
	/// [`PolicyKind::Unrecognized`] rather than failing the whole row.
	pub fn from_columns(columns: PolicyColumns) -> Self {
		let Ok(policy_type) = columns.policy_type.parse::<PolicyType>() else {
			return PolicyKind::Unrecognized {
				kind: columns.policy_type,
			};
		};
		match policy_type {
			PolicyType::Public => PolicyKind::Public,
			PolicyType::OwnerOnly => PolicyKind::OwnerOnly {
				condition_column: columns
					.condition_column
					.filter(|c| !c.is_empty())
					.unwrap_or_else(|| DEFAULT_OWNER_COLUMN.to_string()),
			},
			PolicyType::OrganizationMember => PolicyKind::OrganizationMember,
			PolicyType::ProjectMember => PolicyKind::ProjectMember,
			PolicyType::RoleBased => PolicyKind::RoleBased {
				required_roles: columns.required_roles.unwrap_or_default(),
				required_permissions: columns.required_permissions.unwrap_or_default(),
			},
			PolicyType::Conditional => PolicyKind::Conditional {
				custom_condition: columns.custom_condition,
			},
			PolicyType::TenantIsolated => PolicyKind::TenantIsolated,
		}
	}

	/// Splits the kind into its stored columns.
	pub fn to_columns(&self) -> PolicyColumns {
		let mut columns = PolicyColumns {
			policy_type: self.type_name().to_string(),
			..Default::default()
		};
		match self {
			PolicyKind::OwnerOnly { condition_column } => {
				columns.condition_column = Some(condition_column.clone());
			}
			PolicyKind::RoleBased {
				required_roles,
				required_permissions,
			} => {
				columns.required_roles = Some(required_roles.clone());
				columns.required_permissions = Some(required_permissions.clone());
			}
			PolicyKind::Conditional { custom_condition } => {
				columns.custom_condition = custom_condition.clone();
			}
			_ => {}
		}
		columns
	}

	/// Checks the kind's parameters: column names must be plain identifiers and
	/// custom conditions must parse.
	pub fn validate(&self) -> Result<()> {
		match self {
			PolicyKind::OwnerOnly { condition_column } => {
				validate_identifier(condition_column)?;
			}
			PolicyKind::Conditional {
				custom_condition: Some(condition),
			} if !condition.trim().is_empty() => {
				ConditionExpr::parse(condition)?;
			}
			PolicyKind::Unrecognized { kind } => {
				return Err(CoreError::UnknownPolicyType(kind.clone()));
			}
			_ => {}
		}
		Ok(())
	}
}

/// A stored policy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Policy {
	pub id: PolicyId,
	pub name: String,
	pub description: Option<String>,
	pub entity_type: EntityType,
	pub table_name: String,
	pub action: Action,
	pub kind: PolicyKind,
	pub organization_id: Option<OrgId>,
	pub priority: i32,
	pub is_active: bool,
	pub created_by: UserId,
	pub created_at: DateTime<Utc>,
	pub updated_at: Option<DateTime<Utc>>,
}

impl Policy {
	/// Returns true if this policy applies to the requested action.
	pub fn applies_to(&self, requested: Action) -> bool {
		self.action.covers(requested)
	}
}

/// Sorts policies into evaluation order: priority descending, then id ascending.
pub fn sort_for_evaluation(policies: &mut [Policy]) {
	policies.sort_by(|a, b| b.priority.cmp(&a.priority).then(a.id.cmp(&b.id)));
}

/// Input for registering a policy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolicyDefinition {
	pub name: String,
	#[serde(default)]
	pub description: Option<String>,
	pub entity_type: EntityType,
	pub table_name: String,
	#[serde(default)]
	pub action: Action,
	#[serde(flatten)]
	pub kind: PolicyKind,
	#[serde(default)]
	pub organization_id: Option<OrgId>,
	#[serde(default = "default_priority")]
	pub priority: i32,
	#[serde(default = "default_true")]
	pub is_active: bool,
	pub created_by: UserId,
}

fn default_priority() -> i32 {
	DEFAULT_PRIORITY
}

fn default_true() -> bool {
	true
}

impl PolicyDefinition {
	/// Creates a definition with default priority, active, for all actions of `action`.
	pub fn new(
		name: impl Into<String>,
		entity_type: EntityType,
		table_name: impl Into<String>,
		action: Action,
		kind: PolicyKind,
		created_by: UserId,
	) -> Self {
		Self {
			name: name.into(),
			description: None,
			entity_type,
			table_name: table_name.into(),
			action,
			kind,
			organization_id: None,
			priority: DEFAULT_PRIORITY,
			is_active: true,
			created_by,
		}
	}

	pub fn with_description(mut self, description: impl Into<String>) -> Self {
		self.description = Some(description.into());
		self
	}

	pub fn with_priority(mut self, priority: i32) -> Self {
		self.priority = priority;
		self
	}

	pub fn with_organization(mut self, organization_id: OrgId) -> Self {
		self.organization_id = Some(organization_id);
		self
	}

	/// Validates the definition before it is persisted.
	pub fn validate(&self) -> Result<()> {
		if self.name.trim().is_empty() {
			return Err(CoreError::InvalidPolicy("name must not be empty".to_string()));
		}
		validate_identifier(&self.table_name)?;
		self.kind.validate()
	}
}

/// Partial update of a stored policy. `None` leaves the field unchanged.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolicyUpdate {
	#[serde(default)]
	pub name: Option<String>,
	#[serde(default)]
	pub description: Option<String>,
	#[serde(default)]
	pub kind: Option<PolicyKind>,
	#[serde(default)]
	pub action: Option<Action>,
	#[serde(default)]
	pub priority: Option<i32>,
	#[serde(default)]
	pub is_active: Option<bool>,
}

impl PolicyUpdate {
	pub fn is_empty(&self) -> bool {
		self == &PolicyUpdate::default()
	}

	/// Applies the update to a policy, re-validating what changed.
	pub fn apply_to(&self, policy: &mut Policy, now: DateTime<Utc>) -> Result<()> {
		if let Some(name) = &self.name {
			if name.trim().is_empty() {
				return Err(CoreError::InvalidPolicy("name must not be empty".to_string()));
			}
			policy.name = name.clone();
		}
		if let Some(description) = &self.description {
			policy.description = Some(description.clone());
		}
		if let Some(kind) = &self.kind {
			kind.validate()?;
			policy.kind = kind.clone();
		}
		if let Some(action) = self.action {
			policy.action = action;
		}
		if let Some(priority) = self.priority {
			policy.priority = priority;
		}
		if let Some(is_active) = self.is_active {
			policy.is_active = is_active;
		}
		policy.updated_at = Some(now);
		Ok(())
	}
}

/// Filter for listing policies.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolicyFilter {
	pub entity_type: Option<EntityType>,
	pub action: Option<Action>,
	pub is_active: Option<bool>,
	pub offset: i64,
	pub limit: i64,
}

impl Default for PolicyFilter {
	fn default() -> Self {
		Self {
			entity_type: None,
			action: None,
			is_active: Some(true),
			offset: 0,
			limit: 100,
		}
	}
}

impl PolicyFilter {
	/// Page size clamped to `1..=MAX_PAGE_SIZE`.
	pub fn effective_limit(&self) -> i64 {
		self.limit.clamp(1, MAX_PAGE_SIZE)
	}
}

/// Links a policy to a user, a role, or everyone.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleAssignment {
	pub id: AssignmentId,
	pub policy_id: PolicyId,
	pub entity_type: EntityType,
	pub entity_id: Option<i64>,
	/// `None` applies to every user.
	pub user_id: Option<UserId>,
	pub role_id: Option<RoleId>,
	pub is_active: bool,
	pub conditions: Option<serde_json::Value>,
	pub created_by: UserId,
	pub created_at: DateTime<Utc>,
}

impl RuleAssignment {
	/// Returns true if this assignment applies to the given user holding `role_ids`.
	///
	/// A role-only assignment (no user, with a role) applies to holders of that
	/// role. An assignment with neither applies to everyone.
	pub fn matches(&self, user_id: UserId, role_ids: &[RoleId]) -> bool {
		if !self.is_active {
			return false;
		}
		match (self.user_id, self.role_id) {
			(Some(u), _) if u == user_id => true,
			(None, None) => true,
			(_, Some(role)) => role_ids.contains(&role),
			(Some(_), None) => false,
		}
	}
}

/// Input for creating a rule assignment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewRuleAssignment {
	pub policy_id: PolicyId,
	pub entity_type: EntityType,
	#[serde(default)]
	pub entity_id: Option<i64>,
	#[serde(default)]
	pub user_id: Option<UserId>,
	#[serde(default)]
	pub role_id: Option<RoleId>,
	#[serde(default)]
	pub conditions: Option<serde_json::Value>,
	pub created_by: UserId,
}
