// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Core type definitions for row-level security.
//!
//! - **ID newtypes**: Type-safe wrappers around the integer primary keys used by
//!   the policy store ([`UserId`], [`PolicyId`], [`OrgId`], [`RoleId`]) so a
//!   role id can never be passed where a user id is expected
//! - **Action**: The operation being requested ([`Action`]), where
//!   [`Action::All`] on a policy matches any requested action
//! - **Entity types**: The business entities policies are attached to
//!   ([`EntityType`])
//! - **Policy types**: The flat name of each policy kind ([`PolicyType`]) as it
//!   appears in storage and in policy definitions
//!
//! All enums serialize as `snake_case` strings and round-trip through
//! [`std::fmt::Display`] / [`std::str::FromStr`].

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::CoreError;

// =============================================================================
// ID Newtypes
// =============================================================================

macro_rules! define_id_type {
	($name:ident, $doc:expr) => {
		#[doc = $doc]
		#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
		#[serde(transparent)]
		pub struct $name(i64);

		impl $name {
			/// Create a new ID from its integer key.
			pub const fn new(id: i64) -> Self {
				Self(id)
			}

			/// Get the inner integer value.
			pub const fn get(self) -> i64 {
				self.0
			}
		}

		impl fmt::Display for $name {
			fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
				write!(f, "{}", self.0)
			}
		}

		impl From<i64> for $name {
			fn from(id: i64) -> Self {
				Self(id)
			}
		}

		impl From<$name> for i64 {
			fn from(id: $name) -> Self {
				id.0
			}
		}
	};
}

define_id_type!(UserId, "Unique identifier for a user.");
define_id_type!(PolicyId, "Unique identifier for a stored policy.");
define_id_type!(OrgId, "Unique identifier for an organization.");
define_id_type!(RoleId, "Unique identifier for a directory role.");
define_id_type!(AssignmentId, "Unique identifier for a rule assignment.");

// =============================================================================
// Action
// =============================================================================

/// Actions that can be controlled by row-level security.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Action {
	/// Read access.
	#[default]
	Select,
	/// Create access.
	Insert,
	/// Modify access.
	Update,
	/// Delete access.
	Delete,
	/// Matches every requested action when set on a policy.
	All,
}

impl Action {
	/// Returns true if a policy declared for `self` applies to `requested`.
	pub fn covers(self, requested: Action) -> bool {
		self == Action::All || self == requested
	}

	pub fn as_str(self) -> &'static str {
		match self {
			Action::Select => "select",
			Action::Insert => "insert",
			Action::Update => "update",
			Action::Delete => "delete",
			Action::All => "all",
		}
	}
}

impl fmt::Display for Action {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.as_str())
	}
}

impl FromStr for Action {
	type Err = CoreError;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		match s.to_ascii_lowercase().as_str() {
			"select" => Ok(Action::Select),
			"insert" => Ok(Action::Insert),
			"update" => Ok(Action::Update),
			"delete" => Ok(Action::Delete),
			"all" => Ok(Action::All),
			_ => Err(CoreError::UnknownAction(s.to_string())),
		}
	}
}

// =============================================================================
// Entity Types
// =============================================================================

/// Types of entities that can carry row-level security policies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityType {
	Project,
	Page,
	Component,
	User,
	Asset,
	Role,
	Permission,
	Organization,
	Custom,
}

impl EntityType {
	/// Returns all entity types.
	pub fn all() -> &'static [EntityType] {
		&[
			EntityType::Project,
			EntityType::Page,
			EntityType::Component,
			EntityType::User,
			EntityType::Asset,
			EntityType::Role,
			EntityType::Permission,
			EntityType::Organization,
			EntityType::Custom,
		]
	}

	pub fn as_str(self) -> &'static str {
		match self {
			EntityType::Project => "project",
			EntityType::Page => "page",
			EntityType::Component => "component",
			EntityType::User => "user",
			EntityType::Asset => "asset",
			EntityType::Role => "role",
			EntityType::Permission => "permission",
			EntityType::Organization => "organization",
			EntityType::Custom => "custom",
		}
	}
}

impl fmt::Display for EntityType {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.as_str())
	}
}

impl FromStr for EntityType {
	type Err = CoreError;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		let lowered = s.to_ascii_lowercase();
		EntityType::all()
			.iter()
			.copied()
			.find(|e| e.as_str() == lowered)
			.ok_or_else(|| CoreError::UnknownEntityType(s.to_string()))
	}
}

// =============================================================================
// Policy Types
// =============================================================================

/// Flat policy kind names, as stored and as supplied in definitions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PolicyType {
	/// Everyone can access.
	Public,
	/// Only the row owner can access.
	OwnerOnly,
	/// Members of the context organization can access.
	OrganizationMember,
	/// Members of the target project can access.
	ProjectMember,
	/// Holders of any required role and any required permission can access.
	RoleBased,
	/// An administrator-authored boolean condition decides.
	Conditional,
	/// Callers with a tenant context can access.
	TenantIsolated,
}

impl PolicyType {
	pub fn as_str(self) -> &'static str {
		match self {
			PolicyType::Public => "public",
			PolicyType::OwnerOnly => "owner_only",
			PolicyType::OrganizationMember => "organization_member",
			PolicyType::ProjectMember => "project_member",
			PolicyType::RoleBased => "role_based",
			PolicyType::Conditional => "conditional",
			PolicyType::TenantIsolated => "tenant_isolated",
		}
	}
}

impl fmt::Display for PolicyType {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.as_str())
	}
}

impl FromStr for PolicyType {
	type Err = CoreError;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		match s.to_ascii_lowercase().as_str() {
			"public" => Ok(PolicyType::Public),
			"owner_only" => Ok(PolicyType::OwnerOnly),
			"organization_member" => Ok(PolicyType::OrganizationMember),
			"project_member" => Ok(PolicyType::ProjectMember),
			"role_based" => Ok(PolicyType::RoleBased),
			"conditional" => Ok(PolicyType::Conditional),
			"tenant_isolated" => Ok(PolicyType::TenantIsolated),
			_ => Err(CoreError::UnknownPolicyType(s.to_string())),
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use proptest::prelude::*;

	#[test]
	fn test_all_action_covers_everything() {
		for requested in [
			Action::Select,
			Action::Insert,
			Action::Update,
			Action::Delete,
		] {
			assert!(Action::All.covers(requested));
		}
	}

	#[test]
	fn test_specific_action_only_covers_itself() {
		assert!(Action::Select.covers(Action::Select));
		assert!(!Action::Select.covers(Action::Update));
		assert!(!Action::Delete.covers(Action::All));
	}

	#[test]
	fn test_action_parses_case_insensitively() {
		assert_eq!("SELECT".parse::<Action>().unwrap(), Action::Select);
		assert_eq!("all".parse::<Action>().unwrap(), Action::All);
		assert!("drop".parse::<Action>().is_err());
	}

	#[test]
	fn test_entity_type_round_trips_through_display() {
		for entity in EntityType::all() {
			assert_eq!(entity.to_string().parse::<EntityType>().unwrap(), *entity);
		}
	}

	#[test]
	fn test_policy_type_serializes_snake_case() {
		let json = serde_json::to_string(&PolicyType::OrganizationMember).unwrap();
		assert_eq!(json, "\"organization_member\"");
		assert_eq!(
			"tenant_isolated".parse::<PolicyType>().unwrap(),
			PolicyType::TenantIsolated
		);
	}

	#[test]
	fn test_unknown_policy_type_is_an_error() {
		let err = "superuser_only".parse::<PolicyType>().unwrap_err();
		assert!(matches!(err, CoreError::UnknownPolicyType(ref s) if s == "superuser_only"));
	}

	proptest! {
		#[test]
		fn test_user_id_display_matches_inner(raw in any::<i64>()) {
			let id = UserId::new(raw);
			prop_assert_eq!(id.to_string(), raw.to_string());
			prop_assert_eq!(i64::from(id), raw);
		}
	}
}
