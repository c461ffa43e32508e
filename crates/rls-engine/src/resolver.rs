// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Selects the policies that apply to a request.

use std::sync::Arc;
use std::time::Duration;

use rls_core::{sort_for_evaluation, Action, EntityType, OrgId, Policy, UserId};
use rls_db::{AssignmentStore, DirectoryStore, PolicyStore};
use tracing::debug;

use crate::error::{with_timeout, Result};

pub struct PolicyResolver {
	policies: Arc<dyn PolicyStore>,
	assignments: Arc<dyn AssignmentStore>,
	directory: Arc<dyn DirectoryStore>,
	store_timeout: Duration,
}

impl PolicyResolver {
	pub fn new(
		policies: Arc<dyn PolicyStore>,
		assignments: Arc<dyn AssignmentStore>,
		directory: Arc<dyn DirectoryStore>,
		store_timeout: Duration,
	) -> Self {
		Self {
			policies,
			assignments,
			directory,
			store_timeout,
		}
	}

	/// Active policies for the request, highest priority first.
	///
	/// With a `user_id`, only policies holding a matching active assignment
	/// survive, so an unassigned policy is dropped. Without one, every
	/// candidate is returned.
	#[tracing::instrument(skip(self), fields(entity_type = %entity_type, action = %action))]
	pub async fn resolve(
		&self,
		entity_type: EntityType,
		action: Action,
		table_name: Option<&str>,
		user_id: Option<UserId>,
		organization_id: Option<OrgId>,
	) -> Result<Vec<Policy>> {
		let mut candidates = with_timeout(
			self.store_timeout,
			self
				.policies
				.find_candidates(entity_type, action, table_name, organization_id),
		)
		.await?;
		sort_for_evaluation(&mut candidates);

		let Some(user_id) = user_id else {
			return Ok(candidates);
		};

		let role_ids = with_timeout(
			self.store_timeout,
			self.directory.role_ids_for_user(user_id),
		)
		.await?;

		let mut applicable = Vec::with_capacity(candidates.len());
		for policy in candidates {
			let assigned = with_timeout(
				self.store_timeout,
				self
					.assignments
					.has_matching_assignment(policy.id, user_id, &role_ids),
			)
			.await?;
			if assigned {
				applicable.push(policy);
			} else {
				debug!(policy_id = %policy.id, "policy has no matching assignment");
			}
		}

		debug!(count = applicable.len(), "policies resolved");
		Ok(applicable)
	}
}
