pub mod ledger;
pub mod platform;
pub mod repository;

pub use ledger::{EntitlementStream, TransactionSource, TransactionUpdates};
pub use platform::{PurchasePlatform, PurchaseResult};
pub use repository::{OfferSource, OverrideStore};

/// Ledger or offer-source failures. These are transient: callers keep
/// whatever state they already had.
#[derive(Debug, Clone, thiserror::Error)]
pub enum LedgerError {
    #[error("Ledger transport failed: {0}")]
    Transport(String),
    #[error("Ledger unavailable: {0}")]
    Unavailable(String),
}

/// Failures of the platform purchase API itself
#[derive(Debug, Clone, thiserror::Error)]
pub enum PlatformError {
    #[error("Purchase failed: {0}")]
    PurchaseFailed(String),
    #[error("Store sync failed: {0}")]
    SyncFailed(String),
    #[error("Platform request timed out: {0}")]
    Timeout(String),
}

/// Local persistence failures
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Storage I/O failed: {0}")]
    Io(#[from] std::io::Error),
    #[error("Storage serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("Storage unavailable: {0}")]
    Unavailable(String),
}

pub type LedgerResult<T> = Result<T, LedgerError>;
