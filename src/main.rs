use clap::{Args, Parser, Subcommand, ValueEnum};
use enrollpay::application::engine::{PaymentEngine, Ports};
use enrollpay::application::orchestrator::PaymentOutcome;
use enrollpay::application::session::{LockState, PaymentSession};
use enrollpay::config::{EngineConfig, SANDBOX_GATEWAY_SECRET};
use enrollpay::domain::enrollment::PaymentType;
use enrollpay::domain::ids::{EnrollmentId, RegistrationId};
use enrollpay::domain::money::Money;
use enrollpay::domain::ports::{LedgerStoreRef, LockStoreRef, PendingPaymentStoreRef};
use enrollpay::domain::schedule::InstallmentSchedule;
use enrollpay::domain::signature::GatewaySignature;
use enrollpay::infrastructure::file_store::FileStore;
use enrollpay::infrastructure::in_memory::{
    InMemoryCatalog, InMemoryLedgerStore, InMemoryLockStore, InMemoryPendingStore,
};
use enrollpay::infrastructure::sandbox_gateway::{SandboxGateway, ScriptedCheckout};
use enrollpay::interfaces::csv::catalog_reader::CatalogReader;
use enrollpay::interfaces::csv::ledger_writer::LedgerWriter;
use enrollpay::telemetry::{LogFormat, init_tracing};
use miette::{IntoDiagnostic, Result};
use rust_decimal::Decimal;
use std::fs::File;
use std::io;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Enrollment catalog CSV
    /// (registration,enrollment,course,duration_months,created_at,original_fee,discount)
    #[arg(long, global = true)]
    catalog: Option<PathBuf>,

    /// Directory for locks, ledger and pending payments. Without it, state lives in memory.
    #[arg(long, global = true)]
    state_dir: Option<PathBuf>,

    /// Path to persistent database (optional). If provided, uses RocksDB.
    #[arg(long, global = true)]
    db_path: Option<PathBuf>,

    /// Shared secret of the payment gateway
    #[arg(long, global = true, env = "ENROLLPAY_GATEWAY_SECRET", default_value = SANDBOX_GATEWAY_SECRET, hide_env_values = true)]
    gateway_secret: String,

    #[arg(long, global = true, default_value = "INR")]
    currency: String,

    /// Course names that never take a payment (repeatable or comma separated)
    #[arg(long, global = true, value_delimiter = ',')]
    free_course: Vec<String>,

    #[arg(long, global = true, value_enum, default_value_t = LogFormatArg::Pretty)]
    log_format: LogFormatArg,

    #[command(subcommand)]
    command: Command,
}

#[derive(Clone, Copy, ValueEnum)]
enum LogFormatArg {
    Pretty,
    Json,
}

#[derive(Args)]
struct Target {
    #[arg(long)]
    registration: String,
    #[arg(long)]
    enrollment: String,
}

#[derive(Clone, Copy, ValueEnum)]
enum OutcomeArg {
    Approve,
    Cancel,
    Decline,
    Tamper,
    /// Stop right after the gateway reports success, before verification
    Interrupt,
}

impl OutcomeArg {
    fn scripted(self) -> ScriptedCheckout {
        match self {
            OutcomeArg::Approve | OutcomeArg::Interrupt => ScriptedCheckout::Approve,
            OutcomeArg::Cancel => ScriptedCheckout::Cancel,
            OutcomeArg::Decline => ScriptedCheckout::Decline,
            OutcomeArg::Tamper => ScriptedCheckout::TamperSignature,
        }
    }
}

#[derive(Subcommand)]
enum Command {
    /// Show the fee quote of an enrollment
    Quote(Target),
    /// Print the installment schedule for an amount
    Schedule {
        #[arg(long)]
        amount: Decimal,
        #[arg(long)]
        periods: u32,
    },
    /// Lock the payment plan of an enrollment
    Lock {
        #[command(flatten)]
        target: Target,
        /// full, installment (or emi)
        #[arg(long)]
        plan: PaymentType,
    },
    /// Pay the full amount or the next installment
    Pay {
        #[command(flatten)]
        target: Target,
        /// Installment period to pay (defaults to the next unpaid one)
        #[arg(long)]
        period: Option<u32>,
        /// How the sandbox checkout ends
        #[arg(long, value_enum, default_value_t = OutcomeArg::Approve)]
        outcome: OutcomeArg,
    },
    /// Replay pending payments left by an interrupted run
    Recover,
    /// Print a registration's ledger as CSV
    Ledger {
        #[arg(long)]
        registration: String,
        #[arg(long)]
        enrollment: Option<String>,
    },
    /// Run background reconciliation and print view changes
    Watch {
        #[command(flatten)]
        target: Target,
        #[arg(long, default_value_t = 10)]
        seconds: u64,
    },
}

struct Stores {
    ledger: LedgerStoreRef,
    locks: LockStoreRef,
    pending: PendingPaymentStoreRef,
}

#[cfg(feature = "storage-rocksdb")]
fn open_rocksdb(cli: &Cli) -> Result<Option<Stores>> {
    let Some(db_path) = &cli.db_path else {
        return Ok(None);
    };
    let store = enrollpay::infrastructure::rocksdb::RocksDBStore::open(db_path).into_diagnostic()?;
    Ok(Some(Stores {
        ledger: Arc::new(store.clone()),
        locks: Arc::new(store.clone()),
        pending: Arc::new(store),
    }))
}

#[cfg(not(feature = "storage-rocksdb"))]
fn open_rocksdb(cli: &Cli) -> Result<Option<Stores>> {
    if cli.db_path.is_some() {
        eprintln!(
            "WARNING: Persistent storage requested via --db-path, but 'storage-rocksdb' feature is not enabled. Falling back to {} storage.",
            if cli.state_dir.is_some() { "file" } else { "In-Memory" }
        );
    }
    Ok(None)
}

async fn open_stores(cli: &Cli) -> Result<Stores> {
    if let Some(stores) = open_rocksdb(cli)? {
        return Ok(stores);
    }

    if let Some(dir) = &cli.state_dir {
        let store = FileStore::open(dir).await.into_diagnostic()?;
        return Ok(Stores {
            ledger: Arc::new(store.clone()),
            locks: Arc::new(store.clone()),
            pending: Arc::new(store),
        });
    }

    Ok(Stores {
        ledger: Arc::new(InMemoryLedgerStore::new()),
        locks: Arc::new(InMemoryLockStore::new()),
        pending: Arc::new(InMemoryPendingStore::new()),
    })
}

async fn build_engine(cli: &Cli, outcome: ScriptedCheckout) -> Result<PaymentEngine> {
    let catalog = InMemoryCatalog::new();
    if let Some(path) = &cli.catalog {
        let file = File::open(path).into_diagnostic()?;
        let rows = CatalogReader::new(file)
            .load_into(&catalog)
            .await
            .into_diagnostic()?;
        info!(rows, path = %path.display(), "Catalog loaded");
    }

    let stores = open_stores(cli).await?;
    let gateway = SandboxGateway::new(GatewaySignature::new(cli.gateway_secret.clone()))
        .with_default_outcome(outcome);
    let config = EngineConfig::default()
        .with_gateway_secret(cli.gateway_secret.clone())
        .with_currency(cli.currency.clone())
        .with_free_courses(cli.free_course.iter().cloned());

    Ok(PaymentEngine::new(
        Ports {
            ledger: stores.ledger,
            locks: stores.locks,
            pending: stores.pending,
            directory: Arc::new(catalog.clone()),
            fees: Arc::new(catalog),
            gateway: Arc::new(gateway),
        },
        config,
    ))
}

async fn open_target(engine: &PaymentEngine, target: &Target) -> Result<PaymentSession> {
    let mut session = engine
        .open_session(RegistrationId::new(target.registration.as_str()))
        .await
        .into_diagnostic()?;
    report_recovery(&session);
    session
        .select_enrollment(&EnrollmentId::new(target.enrollment.as_str()))
        .await
        .into_diagnostic()?;
    Ok(session)
}

fn report_recovery(session: &PaymentSession) {
    if let Some(report) = session.last_recovery()
        && report.recovered + report.already_verified + report.outstanding() > 0
    {
        println!(
            "Recovery: {} recovered, {} already verified, {} outstanding",
            report.recovered,
            report.already_verified,
            report.outstanding()
        );
    }
}

fn print_schedule(amounts: &[Money]) {
    println!("period,amount");
    for (period, amount) in (1u32..).zip(amounts) {
        println!("{},{}", period, amount);
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(match cli.log_format {
        LogFormatArg::Pretty => LogFormat::Pretty,
        LogFormatArg::Json => LogFormat::Json,
    });

    let outcome = match &cli.command {
        Command::Pay { outcome, .. } => outcome.scripted(),
        _ => ScriptedCheckout::Approve,
    };

    match &cli.command {
        Command::Schedule { amount, periods } => {
            let schedule =
                InstallmentSchedule::compute(Money::new(*amount), *periods).into_diagnostic()?;
            print_schedule(schedule.amounts());
        }
        Command::Quote(target) => {
            let engine = build_engine(&cli, outcome).await?;
            let mut session = open_target(&engine, target).await?;
            let quote = session.get_fee_quote().await.into_diagnostic()?;
            println!("course: {}", quote.course_name);
            println!("original_fee: {}", quote.original_fee);
            println!("discount_pct: {}", quote.discount_pct.normalize());
            println!("final_amount: {}", quote.final_amount);
            println!("duration_months: {}", quote.duration_months);
            match session.get_lock_state().await.into_diagnostic()? {
                LockState::Locked(lock) => println!("plan: {} (locked)", lock.payment_type),
                LockState::Unlocked { .. } if quote.is_free() => println!("plan: none (free course)"),
                LockState::Unlocked { .. } => println!("plan: not locked"),
            }
        }
        Command::Lock { target, plan } => {
            let engine = build_engine(&cli, outcome).await?;
            let mut session = open_target(&engine, target).await?;
            let lock = session.confirm_lock(*plan).await.into_diagnostic()?;
            println!("Locked {} to {} payment", lock.enrollment_id, lock.payment_type);
            if lock.payment_type == PaymentType::Installment {
                let rows = session.get_installment_schedule().await.into_diagnostic()?;
                let amounts: Vec<Money> = rows.iter().map(|row| row.amount).collect();
                print_schedule(&amounts);
            }
        }
        Command::Pay {
            target,
            period,
            outcome: requested,
        } => {
            let engine = build_engine(&cli, outcome).await?;
            let mut session = open_target(&engine, target).await?;
            let mut notices = session.notices();

            if matches!(requested, OutcomeArg::Interrupt) {
                let staged = session.stage_payment(*period).await.into_diagnostic()?;
                println!(
                    "Payment for order {} staged; verification interrupted",
                    staged.record.order_id
                );
                return Ok(());
            }
            let result = session.pay_now(*period).await;

            while let Ok(notice) = notices.try_recv() {
                println!("{}", notice.message());
            }
            match result.into_diagnostic()? {
                PaymentOutcome::Verified(tx) => println!(
                    "Verified order {} ({}{}) amount {}",
                    tx.order_id,
                    tx.payment_type,
                    tx.period.map(|p| format!(" period {}", p)).unwrap_or_default(),
                    tx.amount
                ),
                PaymentOutcome::Deferred(order_id) => {
                    println!("Order {} will be verified on the next run", order_id)
                }
                PaymentOutcome::AwaitingReview(order_id) => {
                    println!("Order {} is awaiting review", order_id)
                }
                PaymentOutcome::NothingDue => println!("Nothing to pay"),
            }
        }
        Command::Recover => {
            let engine = build_engine(&cli, outcome).await?;
            let report = engine.recover_pending().await.into_diagnostic()?;
            println!(
                "Recovery: {} recovered, {} already verified, {} deferred, {} needs review",
                report.recovered, report.already_verified, report.deferred, report.needs_review
            );
        }
        Command::Ledger {
            registration,
            enrollment,
        } => {
            let engine = build_engine(&cli, outcome).await?;
            let registration_id = RegistrationId::new(registration.as_str());
            let session = engine
                .open_session(registration_id.clone())
                .await
                .into_diagnostic()?;
            if let Some(report) = session.last_recovery()
                && report.recovered > 0
            {
                info!(recovered = report.recovered, "Recovered pending payments");
            }
            let transactions: Vec<_> = match enrollment {
                Some(id) => engine
                    .ledger()
                    .list_for_enrollment(&EnrollmentId::new(id.as_str()))
                    .await
                    .into_diagnostic()?
                    .into_iter()
                    .filter(|tx| tx.registration_id == registration_id)
                    .collect(),
                None => engine
                    .ledger()
                    .list_for_registration(&registration_id)
                    .await
                    .into_diagnostic()?,
            };
            let stdout = io::stdout();
            let mut writer = LedgerWriter::new(stdout.lock());
            writer.write_transactions(&transactions).into_diagnostic()?;
        }
        Command::Watch { target, seconds } => {
            let engine = build_engine(&cli, outcome).await?;
            let mut session = open_target(&engine, target).await?;
            let mut view = session.view();
            session.start_sync();

            let deadline = tokio::time::sleep(Duration::from_secs(*seconds));
            tokio::pin!(deadline);
            loop {
                tokio::select! {
                    _ = &mut deadline => break,
                    _ = tokio::signal::ctrl_c() => break,
                    changed = view.changed() => {
                        if changed.is_err() {
                            break;
                        }
                        if let Some(state) = view.borrow_and_update().as_ref() {
                            println!(
                                "{}: lock={} paid_periods={:?} full_paid={}",
                                state.enrollment_id,
                                state
                                    .lock
                                    .as_ref()
                                    .map(|l| l.payment_type.to_string())
                                    .unwrap_or_else(|| "none".to_string()),
                                state.progress.paid_periods,
                                state.progress.full_paid
                            );
                        }
                    }
                }
            }
            session.stop_sync().await;
        }
    }

    Ok(())
}
