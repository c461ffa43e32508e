// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! SQLite persistence for the row-level security engine.
//!
//! Each store is an `async_trait` seam with a `*Repository` implementation
//! over a shared [`sqlx::SqlitePool`]:
//!
//! - [`PolicyStore`]: policies and evaluation candidates
//! - [`AssignmentStore`]: rule assignments
//! - [`ContextStore`]: session contexts
//! - [`AuditStore`]: decision audit log
//! - [`LookupStore`]: owner lookups, condition evaluation, org membership
//! - [`DirectoryStore`]: users, roles, permissions and accessible projects

pub mod assignment;
pub mod audit;
pub mod context;
pub mod directory;
pub mod error;
pub mod lookup;
pub mod migrations;
pub mod policy;
pub mod pool;
mod types;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use assignment::{AssignmentRepository, AssignmentStore};
pub use audit::{AuditRepository, AuditStore};
pub use context::{ContextRepository, ContextStore};
pub use directory::{DirectoryRepository, DirectoryStore};
pub use error::{DbError, Result};
pub use lookup::{LookupRepository, LookupStore};
pub use migrations::run_migrations;
pub use policy::{PolicyRepository, PolicyStore};
pub use pool::create_pool;
pub use sqlx::SqlitePool;
