// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

mod audit;
mod context;
mod database;
mod evaluation;
mod logging;

pub use audit::{AuditConfig, AuditConfigLayer};
pub use context::{ContextConfig, ContextConfigLayer};
pub use database::{DatabaseConfig, DatabaseConfigLayer};
pub use evaluation::{EvaluationConfig, EvaluationConfigLayer};
pub use logging::{LogFormat, LoggingConfig, LoggingConfigLayer};
