//! Notification Adapters (spec §4.A). Each adapter exposes a single
//! operation, `send`, and is stateless and thread-safe — they persist
//! nothing themselves; the worker pool (§4.C) records outcomes.

pub mod email;
pub mod push;

#[cfg(any(test, feature = "test-support"))]
pub mod fake;

use async_trait::async_trait;

use crate::domain::Outcome as LoggedOutcome;
use crate::render::{RenderedMessage, TemplateKind};

/// Result of a single adapter send attempt.
#[derive(Debug, Clone, PartialEq)]
pub enum AdapterOutcome {
    Sent { provider_msg_id: String },
    InvalidAddress,
    TransientFail { reason: String },
    ProviderReject { reason: String },
}

impl AdapterOutcome {
    /// Maps an adapter outcome onto the persisted delivery-log outcome
    /// vocabulary (spec §3's `DeliveryLog entry.outcome`). `skipped-duplicate`
    /// is never produced here — it is a worker-level decision (§4.C steps 2-3)
    /// made before an adapter is ever called.
    pub fn as_logged_outcome(&self) -> LoggedOutcome {
        match self {
            AdapterOutcome::Sent { .. } => LoggedOutcome::Sent,
            AdapterOutcome::InvalidAddress => LoggedOutcome::InvalidAddress,
            AdapterOutcome::TransientFail { .. } => LoggedOutcome::TransientFail,
            AdapterOutcome::ProviderReject { .. } => LoggedOutcome::ProviderReject,
        }
    }

    /// Terminal outcomes end the job without retry (spec §4.C steps 5-6).
    pub fn is_terminal(&self) -> bool {
        !matches!(self, AdapterOutcome::TransientFail { .. })
    }

    pub fn reason(&self) -> Option<&str> {
        match self {
            AdapterOutcome::TransientFail { reason } | AdapterOutcome::ProviderReject { reason } => {
                Some(reason)
            }
            _ => None,
        }
    }
}

/// A stateless, thread-safe channel adapter (spec §4.A). `kind` and
/// `episode_id` are threaded through so the push adapter can stamp the
/// stable `type`/`episode_id` fields downstream filters key on (spec §6).
#[async_trait]
pub trait Adapter: Send + Sync + 'static {
    async fn send(
        &self,
        channel_address: &str,
        message: &RenderedMessage,
        kind: TemplateKind,
        episode_id: &str,
    ) -> AdapterOutcome;
}
