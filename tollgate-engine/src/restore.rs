use std::sync::Arc;

use serde::Serialize;
use tollgate_core::PurchasePlatform;
use tollgate_shared::EntitlementState;
use tracing::{info, warn};

use crate::engine::EntitlementHandle;

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct RestoreOutcome {
    /// Whether the restore turned up an active subscription
    pub is_subscribed: bool,
    pub entitlement: EntitlementState,
}

#[derive(Debug, thiserror::Error)]
pub enum RestoreError {
    /// The refresh still ran; `entitlement` is what it published
    #[error("Store sync failed: {reason}")]
    SyncFailed {
        reason: String,
        entitlement: EntitlementState,
    },
}

pub struct RestoreCoordinator {
    platform: Arc<dyn PurchasePlatform>,
    engine: EntitlementHandle,
}

impl RestoreCoordinator {
    pub fn new(platform: Arc<dyn PurchasePlatform>, engine: EntitlementHandle) -> Self {
        Self { platform, engine }
    }

    /// Re-sync with the platform, then refresh regardless of how the sync went.
    ///
    /// A failed sync is reported but never withdraws access by itself.
    pub async fn restore(&self) -> Result<RestoreOutcome, RestoreError> {
        let synced = self.platform.sync().await;
        let entitlement = self.engine.refresh().await;

        match synced {
            Ok(()) => {
                info!(subscribed = entitlement.is_subscribed(), "Purchases restored");
                Ok(RestoreOutcome {
                    is_subscribed: entitlement.is_subscribed(),
                    entitlement,
                })
            }
            Err(e) => {
                warn!(error = %e, subscribed = entitlement.is_subscribed(), "Restore sync failed");
                Err(RestoreError::SyncFailed {
                    reason: e.to_string(),
                    entitlement,
                })
            }
        }
    }
}
