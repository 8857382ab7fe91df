use crate::application::fee_resolver::FeeResolver;
use crate::application::notice::{Notice, Notifier};
use crate::application::orchestrator::{NavigationAdvisory, PaymentOrchestrator};
use crate::application::plan_lock::PlanLockManager;
use crate::application::reconciler::StateReconciler;
use crate::application::recovery::{RecoveryManager, RecoveryReport};
use crate::application::session::PaymentSession;
use crate::application::verification::VerificationService;
use crate::config::EngineConfig;
use crate::domain::enrollment::Enrollment;
use crate::domain::ids::RegistrationId;
use crate::domain::ports::{
    EnrollmentDirectoryRef, FeeSourceRef, LedgerStoreRef, LockStoreRef, PaymentGatewayRef,
    PendingPaymentStoreRef,
};
use crate::domain::signature::GatewaySignature;
use crate::error::Result;
use std::sync::Arc;
use tokio::sync::{broadcast, watch};
use tracing::warn;

/// The external collaborators the engine is wired to.
#[derive(Clone)]
pub struct Ports {
    pub ledger: LedgerStoreRef,
    pub locks: LockStoreRef,
    pub pending: PendingPaymentStoreRef,
    pub directory: EnrollmentDirectoryRef,
    pub fees: FeeSourceRef,
    pub gateway: PaymentGatewayRef,
}

/// The main entry point of the payment subsystem.
///
/// `PaymentEngine` wires the services together over a set of [`Ports`]. It is cheap to clone;
/// every clone shares the same services, notice channel and navigation advisory.
#[derive(Clone)]
pub struct PaymentEngine {
    config: Arc<EngineConfig>,
    ports: Ports,
    fees: Arc<FeeResolver>,
    plan_locks: Arc<PlanLockManager>,
    orchestrator: Arc<PaymentOrchestrator>,
    recovery: Arc<RecoveryManager>,
    notifier: Notifier,
    advisory: NavigationAdvisory,
}

impl PaymentEngine {
    /// Creates a new `PaymentEngine` instance.
    ///
    /// # Arguments
    ///
    /// * `ports` - Storage backends, enrollment/fee lookups and the payment gateway.
    /// * `config` - Currency, gateway secret, free courses and poll intervals.
    pub fn new(ports: Ports, config: EngineConfig) -> Self {
        let notifier = Notifier::new(config.notice_capacity);
        let advisory = NavigationAdvisory::new();
        let verifier = Arc::new(VerificationService::new(
            ports.ledger.clone(),
            GatewaySignature::new(config.gateway_secret.clone()),
        ));

        let fees = Arc::new(FeeResolver::new(
            ports.directory.clone(),
            ports.fees.clone(),
            ports.ledger.clone(),
            config.free_courses.iter().cloned(),
        ));
        let plan_locks = Arc::new(PlanLockManager::new(
            ports.locks.clone(),
            ports.directory.clone(),
        ));
        let orchestrator = Arc::new(PaymentOrchestrator::new(
            ports.gateway.clone(),
            ports.locks.clone(),
            ports.ledger.clone(),
            ports.pending.clone(),
            verifier.clone(),
            notifier.clone(),
            advisory.clone(),
            config.currency.clone(),
        ));
        let recovery = Arc::new(RecoveryManager::new(
            ports.pending.clone(),
            ports.ledger.clone(),
            verifier,
            notifier.clone(),
        ));

        Self {
            config: Arc::new(config),
            ports,
            fees,
            plan_locks,
            orchestrator,
            recovery,
            notifier,
            advisory,
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn fee_resolver(&self) -> &FeeResolver {
        &self.fees
    }

    pub fn plan_locks(&self) -> &PlanLockManager {
        &self.plan_locks
    }

    pub fn orchestrator(&self) -> &PaymentOrchestrator {
        &self.orchestrator
    }

    pub fn ledger(&self) -> &LedgerStoreRef {
        &self.ports.ledger
    }

    pub fn subscribe_notices(&self) -> broadcast::Receiver<Notice> {
        self.notifier.subscribe()
    }

    /// Number of verifications in flight; non-zero means "do not navigate away".
    pub fn navigation_advisory(&self) -> watch::Receiver<usize> {
        self.advisory.subscribe()
    }

    /// Replays pending payments left behind by an interrupted run.
    pub async fn recover_pending(&self) -> Result<RecoveryReport> {
        self.recovery.recover_pending().await
    }

    pub async fn list_enrollments(&self, registration_id: &RegistrationId) -> Result<Vec<Enrollment>> {
        self.ports.directory.list_enrollments(registration_id).await
    }

    pub(crate) fn new_reconciler(&self) -> Arc<StateReconciler> {
        Arc::new(StateReconciler::new(
            self.ports.ledger.clone(),
            self.ports.locks.clone(),
            self.ports.directory.clone(),
        ))
    }

    /// Opens a payment session for a registration.
    ///
    /// Recovery runs first so the session never shows a payment as unpaid while its verification
    /// is still sitting in the pending store. A failing recovery pass is logged, not returned.
    pub async fn open_session(&self, registration_id: RegistrationId) -> Result<PaymentSession> {
        let report = match self.recover_pending().await {
            Ok(report) => Some(report),
            Err(e) => {
                warn!(error = %e, "Recovery pass failed, continuing");
                None
            }
        };
        Ok(PaymentSession::new(self.clone(), registration_id, report))
    }
}
