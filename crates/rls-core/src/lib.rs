// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Core model for the row-level security engine.
//!
//! This crate holds everything that can be decided without I/O:
//!
//! - Identifier newtypes and the action, entity and policy type enums
//! - [`Policy`] with its [`PolicyKind`] sum type and rule assignments
//! - [`AccessContext`], the per-session capability snapshot
//! - The restricted condition language used by `conditional` policies
//! - The abstract [`FilterQuery`] narrowed by policies
//! - Pure policy checks and their denial reasons
//!
//! Storage lives in `rls-db`; orchestration lives in `rls-engine`.

pub mod audit;
pub mod checks;
pub mod condition;
pub mod context;
pub mod decision;
pub mod error;
pub mod filter;
pub mod policy;
pub mod sql;
pub mod types;

pub use audit::{AppliedConditions, AuditEntry, AuditQuery, AuditStats, NewAuditEntry, ReasonCount};
pub use condition::{CompiledCondition, ConditionBindings, ConditionExpr};
pub use context::{AccessContext, ContextData, ContextUpdate, RequestMeta, UserProfile};
pub use decision::Decision;
pub use error::{CoreError, Result};
pub use filter::{FilterQuery, Predicate};
pub use policy::{
	sort_for_evaluation, NewRuleAssignment, Policy, PolicyColumns, PolicyDefinition, PolicyFilter,
	PolicyKind, PolicyUpdate, RuleAssignment,
};
pub use sql::{SqlValue, TableRegistry};
pub use types::{Action, AssignmentId, EntityType, OrgId, PolicyId, PolicyType, RoleId, UserId};
