// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Narrows a [`FilterQuery`] to the rows a context may see.

use rls_core::sql::validate_identifier;
use rls_core::{AccessContext, FilterQuery, Policy, PolicyKind, Predicate, SqlValue, TableRegistry};
use tracing::{debug, warn};

pub struct QueryFilterBuilder {
	tables: TableRegistry,
}

impl QueryFilterBuilder {
	pub fn new(tables: TableRegistry) -> Self {
		Self { tables }
	}

	/// Appends one predicate per row-restricting policy. Any failure yields a
	/// query that matches nothing.
	pub fn apply(&self, query: FilterQuery, policies: &[Policy], context: &AccessContext) -> FilterQuery {
		match self.try_apply(query.clone(), policies, context) {
			Ok(filtered) => {
				debug!(
					table = %filtered.table,
					predicates = filtered.predicates.len(),
					"query filter applied"
				);
				filtered
			}
			Err(e) => {
				warn!(table = %query.table, error = %e, "query filter failed, denying all rows");
				query.deny_all()
			}
		}
	}

	fn try_apply(
		&self,
		mut query: FilterQuery,
		policies: &[Policy],
		context: &AccessContext,
	) -> rls_core::Result<FilterQuery> {
		self.tables.quote_table(&query.table)?;

		for policy in policies {
			match &policy.kind {
				PolicyKind::OwnerOnly { condition_column } => {
					validate_identifier(condition_column)?;
					query.push(Predicate::ColumnEquals {
						column: condition_column.clone(),
						value: SqlValue::Integer(context.user_id.get()),
					});
				}
				PolicyKind::ProjectMember => query.push(Predicate::IdIn {
					ids: context.accessible_resource_ids.clone(),
				}),
				PolicyKind::Public
				| PolicyKind::OrganizationMember
				| PolicyKind::RoleBased { .. }
				| PolicyKind::Conditional { .. }
				| PolicyKind::TenantIsolated
				| PolicyKind::Unrecognized { .. } => {}
			}
		}
		Ok(query)
	}
}
