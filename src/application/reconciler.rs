//! Silent background sync of the payment view.
//!
//! The reconciler keeps a [`ViewState`] for the active enrollment in a `watch` channel. Polls
//! replace it only when the fetched data differs, and transactions verified locally but not yet
//! reported by the server are kept until the server catches up.

use crate::domain::enrollment::Enrollment;
use crate::domain::ids::{EnrollmentId, OrderId};
use crate::domain::lock::PaymentLock;
use crate::domain::ports::{EnrollmentDirectoryRef, LedgerStoreRef, LockStoreRef};
use crate::domain::progress::PaymentProgress;
use crate::domain::transaction::{Transaction, ledger_order};
use crate::error::Result;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, watch};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

/// Cached, non-authoritative payment state for one enrollment.
#[derive(Debug, Clone, PartialEq)]
pub struct ViewState {
    pub enrollment_id: EnrollmentId,
    pub enrollment: Option<Enrollment>,
    pub lock: Option<PaymentLock>,
    pub transactions: Vec<Transaction>,
    pub progress: PaymentProgress,
}

impl ViewState {
    fn build(
        enrollment_id: EnrollmentId,
        enrollment: Option<Enrollment>,
        lock: Option<PaymentLock>,
        mut transactions: Vec<Transaction>,
    ) -> Self {
        transactions.sort_by(ledger_order);
        let progress = PaymentProgress::from_transactions(&transactions);
        Self {
            enrollment_id,
            enrollment,
            lock,
            transactions,
            progress,
        }
    }
}

pub struct StateReconciler {
    ledger: LedgerStoreRef,
    locks: LockStoreRef,
    directory: EnrollmentDirectoryRef,
    state: watch::Sender<Option<ViewState>>,
    /// Verified here, not yet seen in a server listing.
    local_only: Mutex<BTreeMap<OrderId, Transaction>>,
}

impl StateReconciler {
    pub fn new(
        ledger: LedgerStoreRef,
        locks: LockStoreRef,
        directory: EnrollmentDirectoryRef,
    ) -> Self {
        let (state, _rx) = watch::channel(None);
        Self {
            ledger,
            locks,
            directory,
            state,
            local_only: Mutex::new(BTreeMap::new()),
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<Option<ViewState>> {
        self.state.subscribe()
    }

    pub fn snapshot(&self) -> Option<ViewState> {
        self.state.borrow().clone()
    }

    fn active_enrollment(&self) -> Option<EnrollmentId> {
        self.state
            .borrow()
            .as_ref()
            .map(|view| view.enrollment_id.clone())
    }

    /// Rebuilds the view from scratch for `enrollment_id`. Nothing carries over from the previous
    /// enrollment.
    pub async fn reset(&self, enrollment_id: Option<&EnrollmentId>) -> Result<()> {
        self.local_only.lock().await.clear();
        let Some(enrollment_id) = enrollment_id.filter(|id| !id.is_unset()) else {
            self.state.send_replace(None);
            return Ok(());
        };

        let enrollment = self.directory.get_enrollment(enrollment_id).await?;
        let lock = self.locks.get(enrollment_id).await?;
        let transactions = self.ledger.list_for_enrollment(enrollment_id).await?;
        self.state.send_replace(Some(ViewState::build(
            enrollment_id.clone(),
            enrollment,
            lock,
            transactions,
        )));
        debug!(enrollment_id = %enrollment_id, "View state rebuilt");
        Ok(())
    }

    /// Polls transactions and lock. Returns whether the view changed.
    pub async fn refresh_payments(&self) -> Result<bool> {
        let Some(enrollment_id) = self.active_enrollment() else {
            return Ok(false);
        };
        let server = self.ledger.list_for_enrollment(&enrollment_id).await?;
        let lock = self.locks.get(&enrollment_id).await?;

        let merged = {
            let mut local_only = self.local_only.lock().await;
            for tx in &server {
                local_only.remove(&tx.order_id);
            }
            let mut merged = server;
            merged.extend(
                local_only
                    .values()
                    .filter(|tx| tx.enrollment_id == enrollment_id)
                    .cloned(),
            );
            merged
        };

        let changed = self.state.send_if_modified(|state| match state {
            Some(view) if view.enrollment_id == enrollment_id => {
                // A lock is write-once, so a missing one in the poll is older data.
                let lock = lock.or_else(|| view.lock.clone());
                let next = ViewState::build(
                    enrollment_id.clone(),
                    view.enrollment.clone(),
                    lock,
                    merged,
                );
                if *view == next {
                    false
                } else {
                    *view = next;
                    true
                }
            }
            _ => false,
        });
        if changed {
            debug!(enrollment_id = %enrollment_id, "Payment view updated");
        }
        Ok(changed)
    }

    /// Polls the coarser enrollment record.
    pub async fn refresh_enrollment(&self) -> Result<bool> {
        let Some(enrollment_id) = self.active_enrollment() else {
            return Ok(false);
        };
        let enrollment = self.directory.get_enrollment(&enrollment_id).await?;
        Ok(self.state.send_if_modified(|state| match state {
            Some(view) if view.enrollment_id == enrollment_id && view.enrollment != enrollment => {
                view.enrollment = enrollment;
                true
            }
            _ => false,
        }))
    }

    /// Folds a transaction verified by this client into the view ahead of the next poll.
    pub async fn record_local(&self, tx: Transaction) {
        if self.active_enrollment().as_ref() != Some(&tx.enrollment_id) {
            return;
        }
        self.local_only
            .lock()
            .await
            .insert(tx.order_id.clone(), tx.clone());
        self.state.send_if_modified(|state| match state {
            Some(view) if !view.transactions.iter().any(|t| t.order_id == tx.order_id) => {
                let mut transactions = view.transactions.clone();
                transactions.push(tx);
                *view = ViewState::build(
                    view.enrollment_id.clone(),
                    view.enrollment.clone(),
                    view.lock.clone(),
                    transactions,
                );
                true
            }
            _ => false,
        });
    }

    pub fn apply_lock(&self, lock: PaymentLock) {
        self.state.send_if_modified(|state| match state {
            Some(view) if view.enrollment_id == lock.enrollment_id && view.lock.is_none() => {
                view.lock = Some(lock);
                true
            }
            _ => false,
        });
    }

    /// Starts polling on two intervals until the returned handle is stopped or dropped.
    pub fn spawn(
        self: Arc<Self>,
        payments_every: Duration,
        enrollment_every: Duration,
    ) -> ReconcilerHandle {
        let (cancel_tx, mut cancel_rx) = watch::channel(false);
        let task = tokio::spawn(async move {
            let mut payments = tokio::time::interval(payments_every);
            payments.set_missed_tick_behavior(MissedTickBehavior::Skip);
            let mut enrollment = tokio::time::interval(enrollment_every);
            enrollment.set_missed_tick_behavior(MissedTickBehavior::Skip);

            info!(
                payments_ms = payments_every.as_millis() as u64,
                enrollment_ms = enrollment_every.as_millis() as u64,
                "Reconciler started"
            );
            loop {
                tokio::select! {
                    _ = cancel_rx.changed() => break,
                    _ = payments.tick() => {
                        if let Err(e) = self.refresh_payments().await {
                            warn!(error = %e, "Payment poll failed");
                        }
                    }
                    _ = enrollment.tick() => {
                        if let Err(e) = self.refresh_enrollment().await {
                            warn!(error = %e, "Enrollment poll failed");
                        }
                    }
                }
            }
            info!("Reconciler stopped");
        });
        ReconcilerHandle {
            cancel: cancel_tx,
            task: Some(task),
        }
    }
}

/// Stops the polling task when told to, or when dropped.
pub struct ReconcilerHandle {
    cancel: watch::Sender<bool>,
    task: Option<JoinHandle<()>>,
}

impl ReconcilerHandle {
    pub async fn stop(mut self) {
        let _ = self.cancel.send(true);
        if let Some(task) = self.task.take()
            && let Err(e) = task.await
        {
            warn!(error = %e, "Reconciler task ended abnormally");
        }
    }
}

impl Drop for ReconcilerHandle {
    fn drop(&mut self) {
        let _ = self.cancel.send(true);
    }
}
