// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Session context cache.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rls_core::AccessContext;
use tokio::sync::RwLock;

/// Cache of live contexts keyed by session id.
///
/// The cache never decides validity; callers check `expires_at` on every hit.
#[async_trait]
pub trait ContextCache: Send + Sync {
	async fn get(&self, session_id: &str) -> Option<AccessContext>;
	async fn put(&self, context: AccessContext);
	async fn remove(&self, session_id: &str) -> Option<AccessContext>;

	/// Drops every entry expired at `now`, returning how many were dropped.
	async fn evict_expired(&self, now: DateTime<Utc>) -> usize;
}

/// Process-local cache owned by one engine instance.
#[derive(Default)]
pub struct InMemoryContextCache {
	entries: RwLock<HashMap<String, AccessContext>>,
}

impl InMemoryContextCache {
	pub fn new() -> Self {
		Self::default()
	}

	pub async fn len(&self) -> usize {
		self.entries.read().await.len()
	}

	pub async fn is_empty(&self) -> bool {
		self.entries.read().await.is_empty()
	}
}

#[async_trait]
impl ContextCache for InMemoryContextCache {
	async fn get(&self, session_id: &str) -> Option<AccessContext> {
		self.entries.read().await.get(session_id).cloned()
	}

	async fn put(&self, context: AccessContext) {
		self
			.entries
			.write()
			.await
			.insert(context.session_id.clone(), context);
	}

	async fn remove(&self, session_id: &str) -> Option<AccessContext> {
		self.entries.write().await.remove(session_id)
	}

	async fn evict_expired(&self, now: DateTime<Utc>) -> usize {
		let mut entries = self.entries.write().await;
		let before = entries.len();
		entries.retain(|_, context| !context.is_expired_at(now));
		before - entries.len()
	}
}
