//! In-process purchase ledger.
//!
//! Stands in for the platform store when none is attached: it serves offers,
//! records transactions, runs scripted purchase flows and pushes updates to a
//! single subscriber. Every query can be made to fail so callers can exercise
//! their transient-failure paths.

use std::collections::{BTreeSet, HashMap, VecDeque};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures_util::stream::{self, StreamExt};
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio_stream::wrappers::UnboundedReceiverStream;
use tollgate_core::{
    EntitlementStream, LedgerError, LedgerResult, OfferSource, PlatformError, PurchasePlatform,
    PurchaseResult, TransactionSource, TransactionUpdates,
};
use tollgate_shared::{Offer, TransactionId, TransactionRecord, Verification};
use tracing::{debug, info, warn};

/// What the next purchase sheet should do
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScriptedPurchase {
    Approve,
    ApproveUnverified(String),
    Cancel,
    Defer,
    Fail(String),
    /// The sheet never answers
    TimeOut,
}

#[derive(Default)]
struct LedgerState {
    offers: Vec<Offer>,
    /// Oldest first; a revocation replaces the record in place
    transactions: Vec<Verification>,
    next_id: TransactionId,
    finished: HashMap<TransactionId, usize>,
    scripted: VecDeque<ScriptedPurchase>,
    ledger_failure: Option<String>,
    offer_failure: Option<String>,
    sync_failure: Option<String>,
    latency: Option<Duration>,
    subscriber: Option<mpsc::UnboundedSender<Verification>>,
}

impl LedgerState {
    fn issue(&mut self, product_id: &str, expiration: Option<DateTime<Utc>>) -> TransactionRecord {
        self.next_id += 1;
        let mut tx = TransactionRecord::new(self.next_id, product_id, Utc::now());
        tx.expiration_date = expiration;
        tx
    }

    fn latest(&self, product_id: &str) -> Option<&Verification> {
        self.transactions
            .iter()
            .rev()
            .find(|v| v.transaction().product_id == product_id)
    }

    fn notify(&mut self, update: Verification) {
        if let Some(tx) = &self.subscriber {
            if tx.send(update).is_err() {
                debug!("Update subscriber went away");
                self.subscriber = None;
            }
        }
    }
}

#[derive(Default)]
pub struct SandboxLedger {
    state: Mutex<LedgerState>,
}

impl SandboxLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_offers(offers: Vec<Offer>) -> Self {
        let ledger = Self::default();
        ledger.state.lock().offers = offers;
        ledger
    }

    /// Queue the behaviour of the next purchase; unscripted purchases approve.
    pub fn script_purchase(&self, script: ScriptedPurchase) {
        self.state.lock().scripted.push_back(script);
    }

    /// Fail entitlement queries (`None` restores them)
    pub fn set_ledger_failure(&self, reason: Option<&str>) {
        self.state.lock().ledger_failure = reason.map(str::to_string);
    }

    pub fn set_offer_failure(&self, reason: Option<&str>) {
        self.state.lock().offer_failure = reason.map(str::to_string);
    }

    pub fn set_sync_failure(&self, reason: Option<&str>) {
        self.state.lock().sync_failure = reason.map(str::to_string);
    }

    /// Delay applied to every `latest` lookup
    pub fn set_latency(&self, latency: Option<Duration>) {
        self.state.lock().latency = latency;
    }

    /// Allocate a transaction without recording it
    pub fn issue(&self, product_id: &str, expiration: Option<DateTime<Utc>>) -> TransactionRecord {
        self.state.lock().issue(product_id, expiration)
    }

    /// Record a transaction silently, as if it predates the current session
    pub fn record(&self, verification: Verification) {
        self.state.lock().transactions.push(verification);
    }

    /// Record a verified transaction for `product_id` and return it
    pub fn grant(&self, product_id: &str, expiration: Option<DateTime<Utc>>) -> TransactionRecord {
        let mut state = self.state.lock();
        let tx = state.issue(product_id, expiration);
        state.transactions.push(Verification::Verified(tx.clone()));
        tx
    }

    /// Record a transaction and push it to the update stream
    pub fn push_update(&self, verification: Verification) {
        let mut state = self.state.lock();
        state.transactions.push(verification.clone());
        state.notify(verification);
    }

    /// Revoke a recorded transaction and push the revised record
    pub fn revoke(&self, id: TransactionId, at: DateTime<Utc>) -> Option<TransactionRecord> {
        let mut state = self.state.lock();
        let slot = state
            .transactions
            .iter_mut()
            .find(|v| v.transaction().id == id)?;

        let revised = match slot {
            Verification::Verified(tx) => {
                tx.revocation_date = Some(at);
                Verification::Verified(tx.clone())
            }
            Verification::Unverified { transaction, .. } => {
                transaction.revocation_date = Some(at);
                return Some(transaction.clone());
            }
        };
        let record = revised.transaction().clone();
        state.notify(revised);
        Some(record)
    }

    /// How many times a transaction has been finished
    pub fn finish_count(&self, id: TransactionId) -> usize {
        self.state.lock().finished.get(&id).copied().unwrap_or(0)
    }

    fn check_ledger(&self) -> LedgerResult<()> {
        match &self.state.lock().ledger_failure {
            Some(reason) => Err(LedgerError::Transport(reason.clone())),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl OfferSource for SandboxLedger {
    async fn load_offers(&self, ids: &BTreeSet<String>) -> Result<Vec<Offer>, LedgerError> {
        let state = self.state.lock();
        if let Some(reason) = &state.offer_failure {
            return Err(LedgerError::Unavailable(reason.clone()));
        }
        Ok(state
            .offers
            .iter()
            .filter(|o| ids.contains(&o.id))
            .cloned()
            .collect())
    }
}

#[async_trait]
impl TransactionSource for SandboxLedger {
    fn current_entitlements(&self) -> EntitlementStream {
        if let Err(e) = self.check_ledger() {
            return stream::iter(vec![Err(e)]).boxed();
        }

        let now = Utc::now();
        let state = self.state.lock();
        let products: BTreeSet<&str> = state
            .transactions
            .iter()
            .map(|v| v.transaction().product_id.as_str())
            .collect();

        let current: Vec<Result<Verification, LedgerError>> = products
            .into_iter()
            .filter_map(|id| state.latest(id))
            .filter(|v| v.transaction().is_active_at(now))
            .cloned()
            .map(Ok)
            .collect();

        stream::iter(current).boxed()
    }

    async fn latest(&self, product_id: &str) -> Result<Option<Verification>, LedgerError> {
        let latency = self.state.lock().latency;
        if let Some(delay) = latency {
            tokio::time::sleep(delay).await;
        }
        self.check_ledger()?;
        Ok(self.state.lock().latest(product_id).cloned())
    }

    fn updates(&self) -> TransactionUpdates {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut state = self.state.lock();

        let pending: Vec<Verification> = state
            .transactions
            .iter()
            .filter(|v| v.verified().is_some_and(|t| !state.finished.contains_key(&t.id)))
            .cloned()
            .collect();
        if !pending.is_empty() {
            info!(count = pending.len(), "Redelivering unfinished transactions");
        }
        for update in pending {
            let _ = tx.send(update);
        }

        if state.subscriber.replace(tx).is_some() {
            warn!("Update stream reopened, previous subscriber detached");
        }
        UnboundedReceiverStream::new(rx).boxed()
    }

    async fn finish(&self, transaction: &TransactionRecord) -> Result<(), LedgerError> {
        let mut state = self.state.lock();
        *state.finished.entry(transaction.id).or_insert(0) += 1;
        debug!(transaction_id = transaction.id, "Transaction finished");
        Ok(())
    }
}

#[async_trait]
impl PurchasePlatform for SandboxLedger {
    async fn purchase(&self, offer: &Offer) -> Result<PurchaseResult, PlatformError> {
        let mut state = self.state.lock();
        if !state.offers.iter().any(|o| o.id == offer.id) {
            return Err(PlatformError::PurchaseFailed(format!(
                "Product {} is not available",
                offer.id
            )));
        }

        let script = state.scripted.pop_front().unwrap_or(ScriptedPurchase::Approve);
        let expiration = Utc::now() + chrono::Duration::days(offer.period.approximate_days());

        let result = match script {
            ScriptedPurchase::Approve => {
                let tx = state.issue(&offer.id, Some(expiration));
                let verification = Verification::Verified(tx);
                state.transactions.push(verification.clone());
                PurchaseResult::Success(verification)
            }
            ScriptedPurchase::ApproveUnverified(reason) => {
                let transaction = state.issue(&offer.id, Some(expiration));
                let verification = Verification::Unverified { transaction, reason };
                state.transactions.push(verification.clone());
                PurchaseResult::Success(verification)
            }
            ScriptedPurchase::Cancel => PurchaseResult::UserCancelled,
            ScriptedPurchase::Defer => PurchaseResult::Pending,
            ScriptedPurchase::Fail(reason) => return Err(PlatformError::PurchaseFailed(reason)),
            ScriptedPurchase::TimeOut => {
                return Err(PlatformError::Timeout(format!("no answer for {}", offer.id)))
            }
        };

        info!(offer_id = %offer.id, "Sandbox purchase sheet closed");
        Ok(result)
    }

    async fn sync(&self) -> Result<(), PlatformError> {
        if let Some(reason) = &self.state.lock().sync_failure {
            return Err(PlatformError::SyncFailed(reason.clone()));
        }
        info!("Sandbox ledger synced");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration as ChronoDuration;
    use rust_decimal::Decimal;
    use tollgate_shared::PeriodUnit;

    fn weekly() -> Offer {
        Offer::new("weeklyvibrovibe", Decimal::new(499, 2), "$4.99", PeriodUnit::Week)
    }

    async fn collect(ledger: &SandboxLedger) -> Vec<Result<Verification, LedgerError>> {
        ledger.current_entitlements().collect().await
    }

    #[tokio::test]
    async fn test_current_entitlements_skip_expired_and_revoked() {
        let ledger = SandboxLedger::new();
        let now = Utc::now();
        ledger.grant("expired", Some(now - ChronoDuration::days(1)));
        let revoked = ledger.grant("revoked", Some(now + ChronoDuration::days(1)));
        ledger.revoke(revoked.id, now);
        ledger.grant("lifetime", None);

        let ids: Vec<String> = collect(&ledger)
            .await
            .into_iter()
            .map(|r| r.unwrap().transaction().product_id.clone())
            .collect();
        assert_eq!(ids, vec!["lifetime".to_string()]);
    }

    #[tokio::test]
    async fn test_ledger_failure_surfaces_in_stream() {
        let ledger = SandboxLedger::new();
        ledger.grant("lifetime", None);
        ledger.set_ledger_failure(Some("offline"));

        let items = collect(&ledger).await;
        assert_eq!(items.len(), 1);
        assert!(items[0].is_err());
        assert!(ledger.latest("lifetime").await.is_err());
    }

    #[tokio::test]
    async fn test_offer_outage() {
        let ledger = SandboxLedger::with_offers(vec![weekly()]);
        ledger.set_offer_failure(Some("storefront down"));

        let ids = BTreeSet::from(["weeklyvibrovibe".to_string()]);
        assert!(matches!(
            ledger.load_offers(&ids).await,
            Err(LedgerError::Unavailable(reason)) if reason == "storefront down"
        ));

        ledger.set_offer_failure(None);
        assert_eq!(ledger.load_offers(&ids).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_scripted_purchases() {
        let ledger = SandboxLedger::with_offers(vec![weekly()]);
        ledger.script_purchase(ScriptedPurchase::Cancel);
        ledger.script_purchase(ScriptedPurchase::Fail("card declined".to_string()));
        ledger.script_purchase(ScriptedPurchase::TimeOut);

        assert_eq!(ledger.purchase(&weekly()).await.unwrap(), PurchaseResult::UserCancelled);
        assert!(matches!(
            ledger.purchase(&weekly()).await,
            Err(PlatformError::PurchaseFailed(reason)) if reason == "card declined"
        ));
        assert!(matches!(ledger.purchase(&weekly()).await, Err(PlatformError::Timeout(_))));

        // Unscripted purchases approve
        let result = ledger.purchase(&weekly()).await.unwrap();
        let PurchaseResult::Success(Verification::Verified(tx)) = result else {
            panic!("expected verified purchase");
        };
        assert!(tx.expiration_date.is_some());
        assert_eq!(
            ledger.latest("weeklyvibrovibe").await.unwrap().map(|v| v.transaction().id),
            Some(tx.id)
        );
    }

    #[tokio::test]
    async fn test_updates_redeliver_unfinished() {
        let ledger = SandboxLedger::new();
        let finished = ledger.grant("a", None);
        let unfinished = ledger.grant("b", None);
        ledger.finish(&finished).await.unwrap();

        let mut updates = ledger.updates();
        let first = updates.next().await.unwrap();
        assert_eq!(first.transaction().id, unfinished.id);

        let pushed = ledger.issue("c", None);
        ledger.push_update(Verification::Verified(pushed.clone()));
        assert_eq!(updates.next().await.unwrap().transaction().id, pushed.id);
        assert_eq!(ledger.finish_count(finished.id), 1);
    }
}
