//! The entitlement engine.
//!
//! A single task owns the entitlement state. `refresh` and `set_override`
//! are commands sent to that task, so exactly one recomputation runs at a
//! time and every published snapshot comes from one complete pass. Readers
//! never touch the task: they read the latest snapshot from a watch channel.
//!
//! A refresh that cannot read the ledger (or the override flag) publishes
//! nothing, so access is never withdrawn because of a transient failure.
//! Access is only denied by a successful ledger read with no active
//! transaction for a tracked product.

use std::collections::BTreeSet;
use std::sync::Arc;

use chrono::Utc;
use futures_util::StreamExt;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tollgate_core::{LedgerError, OverrideStore, StoreError, TransactionSource};
use tollgate_shared::{EntitlementState, TransactionRecord, Verification};
use tracing::{debug, error, info, warn};

use crate::ack::Acknowledger;

/// Upper bound on commands folded into one recomputation pass
const MAX_COALESCED: usize = 64;

type Reply = oneshot::Sender<Result<EntitlementState, RefreshAborted>>;

enum Command {
    Refresh { reply: Option<Reply> },
    SetOverride { active: bool, reply: Reply },
}

/// A pass that published nothing. `previous` is the snapshot still in effect.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("entitlement refresh aborted, previous snapshot kept")]
pub struct RefreshAborted {
    pub previous: EntitlementState,
}

#[derive(Debug, thiserror::Error)]
enum RefreshError {
    #[error("ledger read failed: {0}")]
    Ledger(#[from] LedgerError),
    #[error("override flag unreadable: {0}")]
    Override(#[from] StoreError),
}

/// Result of one evaluation pass, before it is stamped and published
enum Evaluation {
    Override,
    Ledger {
        purchased: BTreeSet<String>,
        subscribed: bool,
        consumed: Vec<TransactionRecord>,
    },
}

pub struct EntitlementEngine {
    source: Arc<dyn TransactionSource>,
    overrides: Arc<dyn OverrideStore>,
    acks: Acknowledger,
    tracked_products: BTreeSet<String>,
    published: watch::Sender<EntitlementState>,
    revision: u64,
}

impl EntitlementEngine {
    /// Start the owning task. The engine stops once every handle is dropped.
    pub fn spawn(
        source: Arc<dyn TransactionSource>,
        overrides: Arc<dyn OverrideStore>,
        acks: Acknowledger,
        tracked_products: BTreeSet<String>,
        command_buffer: usize,
    ) -> (EntitlementHandle, JoinHandle<()>) {
        let (commands_tx, commands_rx) = mpsc::channel(command_buffer.max(1));
        let (published, state_rx) = watch::channel(EntitlementState::unknown());

        let engine = Self {
            source,
            overrides,
            acks,
            tracked_products,
            published,
            revision: 0,
        };
        let task = tokio::spawn(engine.run(commands_rx));

        let handle = EntitlementHandle {
            commands: commands_tx,
            state: state_rx,
        };
        (handle, task)
    }

    async fn run(mut self, mut commands: mpsc::Receiver<Command>) {
        info!(tracked = ?self.tracked_products, "Entitlement engine started");

        while let Some(command) = commands.recv().await {
            let mut waiters = Vec::new();
            self.absorb(command, &mut waiters).await;

            // Requests that queued up behind us are served by the same pass
            for _ in 0..MAX_COALESCED {
                match commands.try_recv() {
                    Ok(next) => self.absorb(next, &mut waiters).await,
                    Err(_) => break,
                }
            }

            let result = self.recompute().await;
            for waiter in waiters {
                let _ = waiter.send(result.clone());
            }
        }

        debug!("Entitlement engine stopped, all handles dropped");
    }

    async fn absorb(&self, command: Command, waiters: &mut Vec<Reply>) {
        match command {
            Command::Refresh { reply } => waiters.extend(reply),
            Command::SetOverride { active, reply } => {
                match self.overrides.save(active).await {
                    Ok(()) => info!(active, "External subscription override updated"),
                    Err(e) => error!(active, error = %e, "Failed to persist override flag"),
                }
                waiters.push(reply);
            }
        }
    }

    async fn recompute(&mut self) -> Result<EntitlementState, RefreshAborted> {
        let evaluation = match self.evaluate().await {
            Ok(evaluation) => evaluation,
            Err(e) => {
                warn!(error = %e, "Entitlement refresh aborted, keeping previous state");
                return Err(RefreshAborted {
                    previous: self.published.borrow().clone(),
                });
            }
        };

        self.revision += 1;
        let now = Utc::now();
        let (state, consumed) = match evaluation {
            Evaluation::Override => (EntitlementState::overridden(self.revision, now), Vec::new()),
            Evaluation::Ledger {
                purchased,
                subscribed,
                consumed,
            } => (
                EntitlementState::from_ledger(self.revision, purchased, subscribed, now),
                consumed,
            ),
        };

        let previous = self.published.send_replace(state.clone());
        if previous.status != state.status {
            info!(
                from = ?previous.status,
                to = ?state.status,
                revision = state.revision,
                "Entitlement status changed"
            );
        } else {
            debug!(status = ?state.status, revision = state.revision, "Entitlement state republished");
        }

        // Only after the new state is visible
        self.acks.finish_all(&consumed).await;
        Ok(state)
    }

    async fn evaluate(&self) -> Result<Evaluation, RefreshError> {
        if self.overrides.load().await? {
            return Ok(Evaluation::Override);
        }

        let mut purchased = BTreeSet::new();
        let mut consumed = Vec::new();
        let mut entitlements = self.source.current_entitlements();
        while let Some(item) = entitlements.next().await {
            match item? {
                Verification::Verified(tx) => {
                    purchased.insert(tx.product_id.clone());
                    consumed.push(tx);
                }
                Verification::Unverified { transaction, reason } => {
                    debug!(transaction_id = transaction.id, %reason, "Ignoring unverified entitlement");
                }
            }
        }

        let now = Utc::now();
        let mut subscribed = false;
        for product_id in &self.tracked_products {
            if let Some(latest) = self.source.latest(product_id).await? {
                if latest.is_active_at(now) {
                    subscribed = true;
                    break;
                }
            }
        }

        Ok(Evaluation::Ledger {
            purchased,
            subscribed,
            consumed,
        })
    }
}

/// Cloneable front door to the engine.
#[derive(Clone)]
pub struct EntitlementHandle {
    commands: mpsc::Sender<Command>,
    state: watch::Receiver<EntitlementState>,
}

impl EntitlementHandle {
    /// Latest published snapshot
    pub fn current(&self) -> EntitlementState {
        self.state.borrow().clone()
    }

    pub fn is_subscribed(&self) -> bool {
        self.state.borrow().is_subscribed()
    }

    /// Receiver that is notified on every publish
    pub fn subscribe(&self) -> watch::Receiver<EntitlementState> {
        self.state.clone()
    }

    /// Recompute and wait for the resulting snapshot.
    ///
    /// Never fails: if the pass could not read the ledger the returned
    /// snapshot is the unchanged previous one.
    pub async fn refresh(&self) -> EntitlementState {
        self.try_refresh().await.unwrap_or_else(|aborted| aborted.previous)
    }

    /// Recompute, reporting whether the pass actually published.
    ///
    /// Callers that acknowledge a transaction must only do so on `Ok`: an
    /// aborted pass has not applied it.
    pub async fn try_refresh(&self) -> Result<EntitlementState, RefreshAborted> {
        let (reply, rx) = oneshot::channel();
        self.dispatch(Command::Refresh { reply: Some(reply) }, rx).await
    }

    /// Fire-and-forget refresh
    pub fn request_refresh(&self) {
        match self.commands.try_send(Command::Refresh { reply: None }) {
            Ok(()) => {}
            // Anything already queued triggers a pass that starts after now
            Err(mpsc::error::TrySendError::Full(_)) => {
                debug!("Refresh already queued");
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                error!("Entitlement engine is not running");
            }
        }
    }

    /// Persist the external-payment flag, then recompute.
    ///
    /// Clearing the flag does not revoke anything; evaluation simply goes
    /// back to the ledger.
    pub async fn set_override(&self, active: bool) -> EntitlementState {
        let (reply, rx) = oneshot::channel();
        self.dispatch(Command::SetOverride { active, reply }, rx)
            .await
            .unwrap_or_else(|aborted| aborted.previous)
    }

    async fn dispatch(
        &self,
        command: Command,
        rx: oneshot::Receiver<Result<EntitlementState, RefreshAborted>>,
    ) -> Result<EntitlementState, RefreshAborted> {
        if self.commands.send(command).await.is_err() {
            error!("Entitlement engine is not running");
            return Err(self.aborted());
        }
        match rx.await {
            Ok(result) => result,
            Err(_) => {
                error!("Entitlement engine dropped a request");
                Err(self.aborted())
            }
        }
    }

    fn aborted(&self) -> RefreshAborted {
        RefreshAborted {
            previous: self.current(),
        }
    }
}
