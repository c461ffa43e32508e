// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Session context lifecycle.
//!
//! Contexts are built from the directory, persisted through a
//! [`ContextStore`] and cached per session. The cache is consulted first but
//! never trusted for validity: an expired hit is evicted and the store is
//! asked again with the same expiry filter.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use rls_core::{
	context::TEMPORARY_SESSION_PREFIX, AccessContext, ContextData, ContextUpdate, OrgId,
	RequestMeta, UserId,
};
use rls_db::{ContextStore, DirectoryStore};
use tracing::{debug, info};
use uuid::Uuid;

use crate::cache::ContextCache;
use crate::error::{with_timeout, EngineError, Result};

pub struct ContextManager {
	contexts: Arc<dyn ContextStore>,
	directory: Arc<dyn DirectoryStore>,
	cache: Arc<dyn ContextCache>,
	ttl: chrono::Duration,
	store_timeout: Duration,
}

impl ContextManager {
	pub fn new(
		contexts: Arc<dyn ContextStore>,
		directory: Arc<dyn DirectoryStore>,
		cache: Arc<dyn ContextCache>,
		ttl: chrono::Duration,
		store_timeout: Duration,
	) -> Self {
		Self {
			contexts,
			directory,
			cache,
			ttl,
			store_timeout,
		}
	}

	/// Builds, persists and caches a context for `session_id`.
	#[tracing::instrument(skip(self, meta), fields(user_id = %user_id))]
	pub async fn create_context(
		&self,
		user_id: UserId,
		session_id: &str,
		meta: &RequestMeta,
		organization_id: Option<OrgId>,
		tenant_id: Option<String>,
	) -> Result<AccessContext> {
		let now = Utc::now();
		let context = self
			.build_context(
				user_id,
				session_id.to_string(),
				meta,
				organization_id,
				tenant_id,
				now,
			)
			.await?;

		with_timeout(self.store_timeout, self.contexts.insert_context(&context)).await?;
		self.cache.put(context.clone()).await;

		info!(
			session_id = %context.session_id,
			roles = context.roles.len(),
			resources = context.accessible_resource_ids.len(),
			"access context created"
		);
		Ok(context)
	}

	/// Returns the live context for a session, or `None`.
	#[tracing::instrument(skip(self))]
	pub async fn get_context(&self, session_id: &str) -> Result<Option<AccessContext>> {
		let now = Utc::now();

		if let Some(cached) = self.cache.get(session_id).await {
			if cached.is_valid_at(now) {
				return Ok(Some(cached));
			}
			debug!("evicting expired cached context");
			self.cache.remove(session_id).await;
		}

		let stored = with_timeout(
			self.store_timeout,
			self.contexts.find_valid_context(session_id, now),
		)
		.await?;

		if let Some(context) = &stored {
			self.cache.put(context.clone()).await;
		}
		Ok(stored)
	}

	#[tracing::instrument(skip(self, update))]
	pub async fn update_context(
		&self,
		session_id: &str,
		update: &ContextUpdate,
	) -> Result<Option<AccessContext>> {
		let Some(mut context) = self.get_context(session_id).await? else {
			return Ok(None);
		};

		update.apply_to(&mut context);
		let now = Utc::now();
		with_timeout(self.store_timeout, self.contexts.update_context(&context, now)).await?;
		self.cache.put(context.clone()).await;

		debug!("access context updated");
		Ok(Some(context))
	}

	/// Expires the session in the store and drops it from the cache.
	#[tracing::instrument(skip(self))]
	pub async fn invalidate_context(&self, session_id: &str) -> Result<bool> {
		let now = Utc::now();
		let expired = with_timeout(
			self.store_timeout,
			self.contexts.expire_context(session_id, now),
		)
		.await?;
		let evicted = self
			.cache
			.remove(session_id)
			.await
			.is_some_and(|c| c.is_valid_at(now));

		if expired || evicted {
			info!("access context invalidated");
		}
		Ok(expired || evicted)
	}

	/// A context for a single check. It is neither persisted nor cached.
	#[tracing::instrument(skip(self), fields(user_id = %user_id))]
	pub async fn create_temporary_context(&self, user_id: UserId) -> Result<AccessContext> {
		let session_id = format!("{TEMPORARY_SESSION_PREFIX}{}", Uuid::new_v4());
		self.build_context(
			user_id,
			session_id,
			&RequestMeta::default(),
			None,
			None,
			Utc::now(),
		)
		.await
	}

	/// Replaces any live context for the session with a freshly built one.
	#[tracing::instrument(skip(self, meta), fields(user_id = %user_id))]
	pub async fn refresh_context(
		&self,
		user_id: UserId,
		session_id: &str,
		meta: &RequestMeta,
		organization_id: Option<OrgId>,
		tenant_id: Option<String>,
	) -> Result<AccessContext> {
		self.invalidate_context(session_id).await?;
		self
			.create_context(user_id, session_id, meta, organization_id, tenant_id)
			.await
	}

	/// Deletes expired rows and evicts expired cache entries.
	#[tracing::instrument(skip(self))]
	pub async fn purge_expired(&self, now: DateTime<Utc>) -> Result<u64> {
		let purged = with_timeout(
			self.store_timeout,
			self.contexts.purge_expired_contexts(now),
		)
		.await?;
		let evicted = self.cache.evict_expired(now).await;

		info!(purged, evicted, "expired contexts purged");
		Ok(purged)
	}

	async fn build_context(
		&self,
		user_id: UserId,
		session_id: String,
		meta: &RequestMeta,
		organization_id: Option<OrgId>,
		tenant_id: Option<String>,
		now: DateTime<Utc>,
	) -> Result<AccessContext> {
		let profile = with_timeout(self.store_timeout, self.directory.get_user(user_id))
			.await?
			.ok_or(EngineError::UserNotFound(user_id))?;
		let roles = with_timeout(self.store_timeout, self.directory.roles_for_user(user_id)).await?;
		let permissions = with_timeout(
			self.store_timeout,
			self.directory.permissions_for_user(user_id),
		)
		.await?;
		let accessible_resource_ids = with_timeout(
			self.store_timeout,
			self.directory.accessible_resource_ids(user_id, organization_id),
		)
		.await?;

		Ok(AccessContext {
			session_id,
			user_id,
			organization_id,
			tenant_id,
			roles,
			permissions,
			accessible_resource_ids,
			context_data: ContextData::from(&profile),
			ip_address: meta.ip_address.clone(),
			user_agent: meta.user_agent.clone(),
			created_at: now,
			expires_at: Some(now + self.ttl),
		})
	}
}
