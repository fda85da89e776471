use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Access decision of the entitlement engine
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AccessStatus {
    /// No refresh has completed yet
    Unknown,
    Granted,
    Denied,
}

/// What decided the current access status
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EntitlementSource {
    /// The persisted external-payment flag
    Override,
    /// A successful ledger read
    Ledger,
}

/// A published entitlement snapshot.
///
/// Snapshots are only produced by complete recomputation passes, so the
/// status and the product set always come from the same evaluation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct EntitlementState {
    pub status: AccessStatus,
    pub purchased_product_ids: BTreeSet<String>,
    pub source: Option<EntitlementSource>,
    /// Incremented on every publish; 0 means nothing has been published
    pub revision: u64,
    pub evaluated_at: Option<DateTime<Utc>>,
}

impl EntitlementState {
    pub fn unknown() -> Self {
        Self {
            status: AccessStatus::Unknown,
            purchased_product_ids: BTreeSet::new(),
            source: None,
            revision: 0,
            evaluated_at: None,
        }
    }

    /// Override wins outright; ledger products are not reported alongside it.
    pub fn overridden(revision: u64, evaluated_at: DateTime<Utc>) -> Self {
        Self {
            status: AccessStatus::Granted,
            purchased_product_ids: BTreeSet::new(),
            source: Some(EntitlementSource::Override),
            revision,
            evaluated_at: Some(evaluated_at),
        }
    }

    pub fn from_ledger(
        revision: u64,
        purchased_product_ids: BTreeSet<String>,
        is_subscribed: bool,
        evaluated_at: DateTime<Utc>,
    ) -> Self {
        Self {
            status: if is_subscribed {
                AccessStatus::Granted
            } else {
                AccessStatus::Denied
            },
            purchased_product_ids,
            source: Some(EntitlementSource::Ledger),
            revision,
            evaluated_at: Some(evaluated_at),
        }
    }

    pub fn is_subscribed(&self) -> bool {
        self.status == AccessStatus::Granted
    }

    pub fn is_known(&self) -> bool {
        self.status != AccessStatus::Unknown
    }

    /// Structural invariants every published snapshot must satisfy.
    pub fn is_consistent(&self) -> bool {
        match self.source {
            None => {
                self.status == AccessStatus::Unknown
                    && self.purchased_product_ids.is_empty()
                    && self.evaluated_at.is_none()
            }
            Some(EntitlementSource::Override) => {
                self.status == AccessStatus::Granted && self.purchased_product_ids.is_empty()
            }
            Some(EntitlementSource::Ledger) => self.status != AccessStatus::Unknown,
        }
    }
}

impl Default for EntitlementState {
    fn default() -> Self {
        Self::unknown()
    }
}
