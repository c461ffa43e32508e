// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Row-level security engine.
//!
//! A request flows through the [`ContextManager`], the [`PolicyResolver`]
//! and the [`PolicyEvaluator`], and its decision is written by the
//! [`AuditRecorder`]. Row queries are narrowed by the
//! [`QueryFilterBuilder`]. [`RlsEngine`] ties these together.

pub mod audit;
pub mod cache;
pub mod context;
pub mod engine;
pub mod error;
pub mod evaluator;
pub mod filter;
pub mod request;
pub mod resolver;

pub use audit::AuditRecorder;
pub use cache::{ContextCache, InMemoryContextCache};
pub use context::ContextManager;
pub use engine::{EngineSettings, RlsEngine, Stores};
pub use error::{EngineError, Result};
pub use evaluator::PolicyEvaluator;
pub use filter::QueryFilterBuilder;
pub use request::AccessRequest;
pub use resolver::PolicyResolver;
