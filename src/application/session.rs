use crate::application::engine::PaymentEngine;
use crate::application::notice::Notice;
use crate::application::orchestrator::{PaymentOutcome, StagedPayment};
use crate::application::reconciler::{ReconcilerHandle, StateReconciler, ViewState};
use crate::application::recovery::RecoveryReport;
use crate::domain::enrollment::{Enrollment, PaymentType};
use crate::domain::fee::FeeQuote;
use crate::domain::ids::{EnrollmentId, RegistrationId};
use crate::domain::lock::PaymentLock;
use crate::domain::money::Money;
use crate::domain::progress::PaymentProgress;
use crate::domain::transaction::Transaction;
use crate::error::{PaymentError, Result};
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::{broadcast, watch};
use tracing::{debug, info};

/// Payment plan state as the UI sees it.
#[derive(Debug, Clone, PartialEq)]
pub enum LockState {
    /// No plan confirmed yet; `selected` is the user's unconfirmed choice.
    Unlocked { selected: Option<PaymentType> },
    /// Plan confirmed. Only this plan's payment actions are available.
    Locked(PaymentLock),
}

/// One row of the installment schedule.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScheduledPeriod {
    pub period: u32,
    pub amount: Money,
    /// Paid, or nothing was due for this period.
    pub settled: bool,
}

/// UI-facing facade over the engine for one registration.
///
/// Holds the active enrollment and the transient plan selection. Switching enrollment drops the
/// selection and reloads the lock of the new enrollment.
pub struct PaymentSession {
    engine: PaymentEngine,
    registration_id: RegistrationId,
    enrollment: Option<Enrollment>,
    selected: Option<PaymentType>,
    lock: Option<PaymentLock>,
    reconciler: Arc<StateReconciler>,
    sync: Option<ReconcilerHandle>,
    last_recovery: Option<RecoveryReport>,
}

impl PaymentSession {
    pub(crate) fn new(
        engine: PaymentEngine,
        registration_id: RegistrationId,
        last_recovery: Option<RecoveryReport>,
    ) -> Self {
        let reconciler = engine.new_reconciler();
        Self {
            engine,
            registration_id,
            enrollment: None,
            selected: None,
            lock: None,
            reconciler,
            sync: None,
            last_recovery,
        }
    }

    pub fn registration_id(&self) -> &RegistrationId {
        &self.registration_id
    }

    pub fn last_recovery(&self) -> Option<RecoveryReport> {
        self.last_recovery
    }

    pub fn active_enrollment(&self) -> Result<&Enrollment> {
        self.enrollment.as_ref().ok_or(PaymentError::NoActiveEnrollment)
    }

    pub fn notices(&self) -> broadcast::Receiver<Notice> {
        self.engine.subscribe_notices()
    }

    pub fn navigation_advisory(&self) -> watch::Receiver<usize> {
        self.engine.navigation_advisory()
    }

    pub fn view(&self) -> watch::Receiver<Option<ViewState>> {
        self.reconciler.subscribe()
    }

    pub async fn enrollments(&self) -> Result<Vec<Enrollment>> {
        self.engine.list_enrollments(&self.registration_id).await
    }

    /// Makes `enrollment_id` the active enrollment.
    pub async fn select_enrollment(&mut self, enrollment_id: &EnrollmentId) -> Result<&Enrollment> {
        self.enrollment = None;
        self.selected = None;
        self.lock = None;
        self.reconciler.reset(None).await?;

        if enrollment_id.is_unset() {
            return Err(PaymentError::NoActiveEnrollment);
        }
        let enrollment = self
            .enrollments()
            .await?
            .into_iter()
            .find(|e| &e.id == enrollment_id)
            .ok_or(PaymentError::NoActiveEnrollment)?;

        self.lock = self.engine.plan_locks().get_lock(enrollment_id).await?;
        self.selected = self.lock.as_ref().map(|lock| lock.payment_type);
        self.reconciler.reset(Some(enrollment_id)).await?;
        debug!(
            enrollment_id = %enrollment_id,
            locked = self.lock.is_some(),
            "Enrollment selected"
        );
        Ok(self.enrollment.insert(enrollment))
    }

    pub async fn get_fee_quote(&self) -> Result<FeeQuote> {
        let enrollment = self.active_enrollment()?;
        self.engine
            .fee_resolver()
            .resolve_fee(&self.registration_id, enrollment)
            .await
    }

    pub async fn get_lock_state(&mut self) -> Result<LockState> {
        let enrollment_id = self.active_enrollment()?.id.clone();
        if let Some(lock) = self.engine.plan_locks().get_lock(&enrollment_id).await? {
            self.selected = Some(lock.payment_type);
            self.lock = Some(lock);
        }
        Ok(match &self.lock {
            Some(lock) => LockState::Locked(lock.clone()),
            None => LockState::Unlocked {
                selected: self.selected,
            },
        })
    }

    /// Records an unconfirmed plan choice. Disabled once a plan is locked.
    pub async fn select_payment_type(&mut self, payment_type: PaymentType) -> Result<()> {
        let quote = self.get_fee_quote().await?;
        if quote.is_free() {
            return Err(PaymentError::FreeCourse(quote.course_name));
        }
        if let LockState::Locked(lock) = self.get_lock_state().await?
            && !lock.allows(payment_type)
        {
            return Err(PaymentError::AlreadyLocked {
                enrollment_id: lock.enrollment_id,
                existing: lock.payment_type,
            });
        }
        if payment_type == PaymentType::Installment {
            quote.payable_schedule()?;
        }
        self.selected = Some(payment_type);
        Ok(())
    }

    /// Confirms the plan. A fee quote must be available and the course must not be free.
    ///
    /// An installment plan is refused when the schedule leaves a period with nothing to charge.
    pub async fn confirm_lock(&mut self, payment_type: PaymentType) -> Result<PaymentLock> {
        let quote = self.get_fee_quote().await?;
        if quote.is_free() {
            return Err(PaymentError::FreeCourse(quote.course_name));
        }
        if payment_type == PaymentType::Installment {
            quote.payable_schedule()?;
        }
        let lock = self
            .engine
            .plan_locks()
            .confirm_lock(&quote.enrollment_id, payment_type)
            .await?;
        self.selected = Some(lock.payment_type);
        self.lock = Some(lock.clone());
        self.reconciler.apply_lock(lock.clone());
        Ok(lock)
    }

    /// Pays the full amount (`None` with a full plan), the next installment (`None` with an
    /// installment plan) or a specific installment period.
    pub async fn pay_now(&mut self, period: Option<u32>) -> Result<PaymentOutcome> {
        if self.get_fee_quote().await?.is_free() {
            info!(registration_id = %self.registration_id, "Free course, nothing to pay");
            return Ok(PaymentOutcome::NothingDue);
        }
        let staged = self.stage_payment(period).await?;
        self.complete_payment(staged).await
    }

    /// First half of [`pay_now`](Self::pay_now): creates the order, runs the checkout and records
    /// the pending payment.
    pub async fn stage_payment(&mut self, period: Option<u32>) -> Result<StagedPayment> {
        let enrollment = self.active_enrollment()?.clone();
        let quote = self.get_fee_quote().await?;
        if quote.is_free() {
            return Err(PaymentError::FreeCourse(quote.course_name));
        }

        let plan = match self.get_lock_state().await? {
            LockState::Locked(lock) => lock.payment_type,
            LockState::Unlocked { .. } => {
                return Err(PaymentError::NotLocked {
                    enrollment_id: enrollment.id,
                    requested: PaymentType::for_period(period),
                });
            }
        };

        let (period, amount) = match (plan, period) {
            (PaymentType::Full, None) => (None, quote.final_amount),
            (PaymentType::Full, Some(_)) => {
                return Err(PaymentError::NotLocked {
                    enrollment_id: enrollment.id,
                    requested: PaymentType::Installment,
                });
            }
            (PaymentType::Installment, requested) => {
                let schedule = quote.payable_schedule()?;
                let history = self
                    .engine
                    .ledger()
                    .list_for_enrollment(&enrollment.id)
                    .await?;
                let next = PaymentProgress::from_transactions(&history)
                    .next_period(&schedule)
                    .ok_or_else(|| PaymentError::AlreadyPaid(enrollment.id.clone()))?;
                let period = requested.unwrap_or(next);
                let amount = schedule.amount_for(period).ok_or(PaymentError::NotNextPeriod {
                    requested: period,
                    expected: next,
                })?;
                (Some(period), amount)
            }
        };

        let orchestrator = self.engine.orchestrator();
        let attempt = orchestrator
            .create_intent(&enrollment, &quote, amount, period)
            .await?;
        orchestrator.checkout(attempt).await
    }

    /// Second half of [`pay_now`](Self::pay_now): verifies and folds the result into the view.
    pub async fn complete_payment(&mut self, staged: StagedPayment) -> Result<PaymentOutcome> {
        let outcome = self.engine.orchestrator().finish(staged).await?;
        if let PaymentOutcome::Verified(tx) = &outcome {
            self.reconciler.record_local(tx.clone()).await;
        }
        Ok(outcome)
    }

    pub async fn get_transactions(&self) -> Result<Vec<Transaction>> {
        let enrollment_id = self.active_enrollment()?.id.clone();
        self.reconciler.refresh_payments().await?;
        Ok(self
            .reconciler
            .snapshot()
            .filter(|view| view.enrollment_id == enrollment_id)
            .map(|view| view.transactions)
            .unwrap_or_default())
    }

    pub async fn get_installment_schedule(&self) -> Result<Vec<ScheduledPeriod>> {
        let quote = self.get_fee_quote().await?;
        let schedule = quote.schedule()?;
        let progress = PaymentProgress::from_transactions(&self.get_transactions().await?);
        Ok(schedule
            .amounts()
            .iter()
            .zip(1u32..)
            .map(|(amount, period)| ScheduledPeriod {
                period,
                amount: *amount,
                settled: !amount.is_positive() || progress.is_period_paid(period),
            })
            .collect())
    }

    /// Runs recovery on demand.
    pub async fn recover(&mut self) -> Result<RecoveryReport> {
        let report = self.engine.recover_pending().await?;
        self.last_recovery = Some(report);
        if report.recovered > 0 {
            self.reconciler.refresh_payments().await?;
        }
        Ok(report)
    }

    /// Starts background reconciliation for the active view. Idempotent.
    pub fn start_sync(&mut self) {
        if self.sync.is_none() {
            let config = self.engine.config();
            self.sync = Some(
                self.reconciler
                    .clone()
                    .spawn(config.payments_poll, config.enrollment_poll),
            );
        }
    }

    pub async fn stop_sync(&mut self) {
        if let Some(handle) = self.sync.take() {
            handle.stop().await;
        }
    }
}
