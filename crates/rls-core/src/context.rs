// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Per-session access context.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::{OrgId, UserId};

/// Prefix of session ids for contexts that are never persisted.
pub const TEMPORARY_SESSION_PREFIX: &str = "temp_";

/// Directory profile of a user, as needed to build a context.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserProfile {
	pub id: UserId,
	pub username: String,
	pub is_superuser: bool,
	pub is_active: bool,
}

/// Snapshot of profile fields stored with the context.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContextData {
	pub username: String,
	pub is_superuser: bool,
	pub is_active: bool,
}

impl From<&UserProfile> for ContextData {
	fn from(user: &UserProfile) -> Self {
		Self {
			username: user.username.clone(),
			is_superuser: user.is_superuser,
			is_active: user.is_active,
		}
	}
}

/// Request metadata captured into contexts and audit entries.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestMeta {
	pub request_id: Option<String>,
	pub ip_address: Option<String>,
	pub user_agent: Option<String>,
	pub method: Option<String>,
	pub path: Option<String>,
}

/// The resolved capabilities of a user within one session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessContext {
	pub session_id: String,
	pub user_id: UserId,
	pub organization_id: Option<OrgId>,
	pub tenant_id: Option<String>,
	pub roles: Vec<String>,
	pub permissions: Vec<String>,
	pub accessible_resource_ids: Vec<i64>,
	pub context_data: ContextData,
	pub ip_address: Option<String>,
	pub user_agent: Option<String>,
	pub created_at: DateTime<Utc>,
	pub expires_at: Option<DateTime<Utc>>,
}

impl AccessContext {
	/// A context is expired once `expires_at` is at or before `now`.
	pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
		self.expires_at.is_some_and(|exp| exp <= now)
	}

	pub fn is_valid_at(&self, now: DateTime<Utc>) -> bool {
		!self.is_expired_at(now)
	}

	pub fn is_temporary(&self) -> bool {
		self.session_id.starts_with(TEMPORARY_SESSION_PREFIX)
	}

	pub fn has_role(&self, role: &str) -> bool {
		self.roles.iter().any(|r| r == role)
	}

	pub fn has_permission(&self, permission: &str) -> bool {
		self.permissions.iter().any(|p| p == permission)
	}

	pub fn can_access_resource(&self, id: i64) -> bool {
		self.accessible_resource_ids.contains(&id)
	}
}

/// Typed partial update of a context. `None` leaves a field unchanged.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContextUpdate {
	#[serde(default)]
	pub organization_id: Option<OrgId>,
	#[serde(default)]
	pub tenant_id: Option<String>,
	#[serde(default)]
	pub roles: Option<Vec<String>>,
	#[serde(default)]
	pub permissions: Option<Vec<String>>,
	#[serde(default)]
	pub accessible_resource_ids: Option<Vec<i64>>,
	#[serde(default)]
	pub ip_address: Option<String>,
	#[serde(default)]
	pub user_agent: Option<String>,
	#[serde(default)]
	pub expires_at: Option<DateTime<Utc>>,
}

impl ContextUpdate {
	pub fn apply_to(&self, context: &mut AccessContext) {
		if let Some(org) = self.organization_id {
			context.organization_id = Some(org);
		}
		if let Some(tenant) = &self.tenant_id {
			context.tenant_id = Some(tenant.clone());
		}
		if let Some(roles) = &self.roles {
			context.roles = roles.clone();
		}
		if let Some(permissions) = &self.permissions {
			context.permissions = permissions.clone();
		}
		if let Some(ids) = &self.accessible_resource_ids {
			context.accessible_resource_ids = ids.clone();
		}
		if let Some(ip) = &self.ip_address {
			context.ip_address = Some(ip.clone());
		}
		if let Some(ua) = &self.user_agent {
			context.user_agent = Some(ua.clone());
		}
		if let Some(expires_at) = self.expires_at {
			context.expires_at = Some(expires_at);
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use chrono::Duration;

	fn context(expires_at: Option<DateTime<Utc>>) -> AccessContext {
		AccessContext {
			session_id: "s1".to_string(),
			user_id: UserId::new(1),
			organization_id: None,
			tenant_id: None,
			roles: vec!["editor".to_string()],
			permissions: vec![],
			accessible_resource_ids: vec![3, 4],
			context_data: ContextData::default(),
			ip_address: None,
			user_agent: None,
			created_at: Utc::now(),
			expires_at,
		}
	}

	#[test]
	fn test_context_without_expiry_never_expires() {
		assert!(context(None).is_valid_at(Utc::now() + Duration::days(3650)));
	}

	#[test]
	fn test_context_expires_at_boundary() {
		let now = Utc::now();
		let ctx = context(Some(now));
		assert!(ctx.is_expired_at(now));
		assert!(ctx.is_valid_at(now - Duration::seconds(1)));
	}

	#[test]
	fn test_update_only_touches_given_fields() {
		let mut ctx = context(None);
		ContextUpdate {
			tenant_id: Some("acme".to_string()),
			..Default::default()
		}
		.apply_to(&mut ctx);
		assert_eq!(ctx.tenant_id.as_deref(), Some("acme"));
		assert_eq!(ctx.roles, vec!["editor".to_string()]);
		assert!(ctx.can_access_resource(3));
		assert!(ctx.has_role("editor"));
	}

	#[test]
	fn test_temporary_sessions_are_recognised() {
		let mut ctx = context(None);
		ctx.session_id = format!("{TEMPORARY_SESSION_PREFIX}abc");
		assert!(ctx.is_temporary());
	}
}
