use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Ledger-assigned transaction identifier
pub type TransactionId = u64;

/// A snapshot of one ledger transaction.
///
/// Records are owned by the ledger; consumers only ever read them.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TransactionRecord {
    pub id: TransactionId,
    pub product_id: String,
    pub purchase_date: DateTime<Utc>,
    pub revocation_date: Option<DateTime<Utc>>,
    pub expiration_date: Option<DateTime<Utc>>,
}

impl TransactionRecord {
    pub fn new(id: TransactionId, product_id: impl Into<String>, purchase_date: DateTime<Utc>) -> Self {
        Self {
            id,
            product_id: product_id.into(),
            purchase_date,
            revocation_date: None,
            expiration_date: None,
        }
    }

    pub fn expiring_at(mut self, expiration: DateTime<Utc>) -> Self {
        self.expiration_date = Some(expiration);
        self
    }

    pub fn revoked_at(mut self, revocation: DateTime<Utc>) -> Self {
        self.revocation_date = Some(revocation);
        self
    }

    /// Not revoked, and either non-expiring or expiring strictly after `now`.
    pub fn is_active_at(&self, now: DateTime<Utc>) -> bool {
        self.revocation_date.is_none() && self.expiration_date.map_or(true, |exp| exp > now)
    }
}

/// A transaction together with the ledger's authenticity verdict
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "verification", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Verification {
    Verified(TransactionRecord),
    Unverified {
        transaction: TransactionRecord,
        reason: String,
    },
}

impl Verification {
    pub fn transaction(&self) -> &TransactionRecord {
        match self {
            Verification::Verified(tx) => tx,
            Verification::Unverified { transaction, .. } => transaction,
        }
    }

    pub fn verified(&self) -> Option<&TransactionRecord> {
        match self {
            Verification::Verified(tx) => Some(tx),
            Verification::Unverified { .. } => None,
        }
    }

    /// An active entitlement: verified and active at `now`.
    pub fn is_active_at(&self, now: DateTime<Utc>) -> bool {
        self.verified().is_some_and(|tx| tx.is_active_at(now))
    }
}
