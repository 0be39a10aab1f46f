//! Identity webhook processing.
//!
//! Maps provider events onto the profile table: `user.created` writes a
//! default-shaped profile, `user.updated` rewrites it while preserving the
//! stored `stats` and `preferences` sub-objects, and `user.deleted` removes
//! it, treating an already-absent profile as success.

pub mod profile;
pub mod signature;

use crate::orchestrator::RequestContext;
use crate::store::{MetadataStoreClient, StoreError, StoredProfile};
use async_trait::async_trait;
use profile::{IdentityEvent, IdentityPayload, map_identity};
use std::sync::Arc;
use thiserror::Error;
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;

/// Errors raised while applying an identity event.
#[derive(Debug, Error)]
pub enum IdentityError {
    /// Event kind we do not handle.
    #[error("Unhandled event type: {kind}")]
    UnknownEvent {
        /// The unhandled kind.
        kind: String,
    },
    /// Envelope was missing its data payload.
    #[error("Invalid webhook payload")]
    MissingData,
    /// Profile table interaction failed.
    #[error("Store request failed: {0}")]
    Store(#[from] StoreError),
}

/// What an applied event did to the profile table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventOutcome {
    /// A new profile was written.
    ProfileCreated,
    /// An existing profile was rewritten.
    ProfileUpdated,
    /// The profile was removed, or was already absent.
    ProfileDeleted {
        /// Whether a record existed before the delete.
        existed: bool,
    },
}

/// Interface implemented by the identity event processor.
#[async_trait]
pub trait IdentityApi: Send + Sync {
    /// Apply one verified identity event to the profile table.
    async fn apply_event(
        &self,
        ctx: &RequestContext,
        event: IdentityEvent,
    ) -> Result<EventOutcome, IdentityError>;
}

/// Identity event processor backed by the metadata store.
pub struct IdentityService {
    metadata_store: Arc<MetadataStoreClient>,
}

impl IdentityService {
    /// Build a processor sharing the given metadata client.
    pub fn new(metadata_store: Arc<MetadataStoreClient>) -> Self {
        Self { metadata_store }
    }

    async fn create_profile(
        &self,
        ctx: &RequestContext,
        payload: &IdentityPayload,
    ) -> Result<EventOutcome, IdentityError> {
        let now = now_rfc3339();
        let profile = map_identity(payload, &now);
        let stored = StoredProfile {
            user_id: payload.id.clone(),
            created_at: profile.metadata.created_at.clone(),
            updated_at: now,
            profile,
        };
        self.metadata_store.put_profile(&stored).await?;
        tracing::info!(
            request_id = %ctx.request_id,
            user_id = %payload.id,
            "Profile created"
        );
        Ok(EventOutcome::ProfileCreated)
    }

    async fn update_profile(
        &self,
        ctx: &RequestContext,
        payload: &IdentityPayload,
    ) -> Result<EventOutcome, IdentityError> {
        let now = now_rfc3339();
        let existing = self.metadata_store.get_profile(&payload.id).await?;
        let mut profile = map_identity(payload, &now);

        // Rebuild the profile from the fresh payload, but user-accumulated
        // state survives the rewrite.
        let created_at = match existing {
            Some(stored) => {
                profile.stats = stored.profile.stats;
                profile.preferences = stored.profile.preferences;
                stored.created_at
            }
            None => profile.metadata.created_at.clone(),
        };

        let stored = StoredProfile {
            user_id: payload.id.clone(),
            created_at,
            updated_at: now,
            profile,
        };
        self.metadata_store.put_profile(&stored).await?;
        tracing::info!(
            request_id = %ctx.request_id,
            user_id = %payload.id,
            "Profile updated"
        );
        Ok(EventOutcome::ProfileUpdated)
    }
}

#[async_trait]
impl IdentityApi for IdentityService {
    async fn apply_event(
        &self,
        ctx: &RequestContext,
        event: IdentityEvent,
    ) -> Result<EventOutcome, IdentityError> {
        tracing::info!(
            request_id = %ctx.request_id,
            kind = %event.kind,
            event_id = event.id.as_deref().unwrap_or("-"),
            "Processing identity event"
        );

        match event.kind.as_str() {
            "user.created" => {
                let payload = event.data.ok_or(IdentityError::MissingData)?;
                self.create_profile(ctx, &payload).await
            }
            "user.updated" => {
                let payload = event.data.ok_or(IdentityError::MissingData)?;
                self.update_profile(ctx, &payload).await
            }
            "user.deleted" => {
                let payload = event.data.ok_or(IdentityError::MissingData)?;
                let existed = self.metadata_store.delete_profile(&payload.id).await?;
                tracing::info!(
                    request_id = %ctx.request_id,
                    user_id = %payload.id,
                    existed,
                    "Profile delete handled"
                );
                Ok(EventOutcome::ProfileDeleted { existed })
            }
            other => Err(IdentityError::UnknownEvent {
                kind: other.to_string(),
            }),
        }
    }
}

fn now_rfc3339() -> String {
    OffsetDateTime::now_utc()
        .format(&Rfc3339)
        .unwrap_or_else(|_| String::from("1970-01-01T00:00:00Z"))
}
