// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use rls_core::{Action, EntityType, RequestMeta, UserId};

/// One access question: may `user_id` perform `action` on an entity?
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccessRequest {
	pub user_id: UserId,
	pub entity_type: EntityType,
	pub action: Action,
	pub entity_id: Option<i64>,
	pub table_name: Option<String>,
	pub session_id: Option<String>,
	pub meta: RequestMeta,
}

impl AccessRequest {
	pub fn new(user_id: UserId, entity_type: EntityType, action: Action) -> Self {
		Self {
			user_id,
			entity_type,
			action,
			entity_id: None,
			table_name: None,
			session_id: None,
			meta: RequestMeta::default(),
		}
	}

	pub fn with_entity_id(mut self, entity_id: i64) -> Self {
		self.entity_id = Some(entity_id);
		self
	}

	pub fn with_table(mut self, table_name: impl Into<String>) -> Self {
		self.table_name = Some(table_name.into());
		self
	}

	pub fn with_session(mut self, session_id: impl Into<String>) -> Self {
		self.session_id = Some(session_id.into());
		self
	}

	pub fn with_meta(mut self, meta: RequestMeta) -> Self {
		self.meta = meta;
		self
	}
}
