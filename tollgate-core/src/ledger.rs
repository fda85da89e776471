use async_trait::async_trait;
use futures_util::stream::BoxStream;
use tollgate_shared::{TransactionRecord, Verification};

use crate::LedgerError;

/// Finite snapshot of the transactions that currently entitle the user.
/// A transport failure part-way through surfaces as an `Err` item.
pub type EntitlementStream = BoxStream<'static, Result<Verification, LedgerError>>;

/// Never-ending feed of transactions pushed by the platform
pub type TransactionUpdates = BoxStream<'static, Verification>;

/// The platform purchase ledger, reached asynchronously.
///
/// Authenticity checking happens on the other side of this boundary; the
/// engine only sees the verified/unverified verdict.
#[async_trait]
pub trait TransactionSource: Send + Sync {
    /// Restartable: every call yields a fresh snapshot of the live ledger.
    fn current_entitlements(&self) -> EntitlementStream;

    /// Latest transaction recorded for `product_id`, if any
    async fn latest(&self, product_id: &str) -> Result<Option<Verification>, LedgerError>;

    /// Single-consumer update stream. Transactions that were never finished
    /// are redelivered when a new stream is opened.
    fn updates(&self) -> TransactionUpdates;

    /// Acknowledge that a verified transaction has been durably applied
    async fn finish(&self, transaction: &TransactionRecord) -> Result<(), LedgerError>;
}
