#![allow(dead_code)]

use enrollpay::application::engine::{PaymentEngine, Ports};
use enrollpay::config::EngineConfig;
use enrollpay::domain::signature::GatewaySignature;
use enrollpay::infrastructure::in_memory::{
    InMemoryCatalog, InMemoryLedgerStore, InMemoryLockStore, InMemoryPendingStore,
};
use enrollpay::infrastructure::sandbox_gateway::SandboxGateway;
use enrollpay::interfaces::csv::catalog_reader::CatalogReader;
use std::io::Error;
use std::path::Path;
use std::sync::Arc;

pub const SECRET: &str = "test-gateway-secret";

/// R1 has a single enrollment; R2 has two, each priced on its own; R3 is a free course.
pub const CATALOG: &str = "\
registration,enrollment,course,duration_months,created_at,original_fee,discount
R1,E1,German A1,6,2024-01-10T09:00:00Z,18600,5
R2,E2,German A2,3,2024-02-01T09:00:00Z,10000,0
R2,E3,German B1,6,2024-03-01T09:00:00Z,10000,0
R3,E4,Orientation,1,2024-01-01T09:00:00Z,,
";

pub fn write_catalog(path: &Path) -> Result<(), Error> {
    std::fs::write(path, CATALOG)
}

pub struct Harness {
    pub engine: PaymentEngine,
    pub gateway: SandboxGateway,
    pub ledger: InMemoryLedgerStore,
    pub locks: InMemoryLockStore,
    pub pending: InMemoryPendingStore,
    pub catalog: InMemoryCatalog,
}

pub async fn harness() -> Harness {
    harness_over(
        InMemoryLedgerStore::new(),
        InMemoryLockStore::new(),
        InMemoryPendingStore::new(),
    )
    .await
}

impl Harness {
    /// A fresh engine over the same stores, as after a process restart.
    pub async fn restart(&self) -> Harness {
        harness_over(self.ledger.clone(), self.locks.clone(), self.pending.clone()).await
    }
}

async fn harness_over(
    ledger: InMemoryLedgerStore,
    locks: InMemoryLockStore,
    pending: InMemoryPendingStore,
) -> Harness {
    let catalog = InMemoryCatalog::new();
    CatalogReader::new(CATALOG.as_bytes())
        .load_into(&catalog)
        .await
        .unwrap();
    let gateway = SandboxGateway::new(GatewaySignature::new(SECRET));
    let config = EngineConfig::default()
        .with_gateway_secret(SECRET)
        .with_free_courses(["orientation"]);

    let engine = PaymentEngine::new(
        Ports {
            ledger: Arc::new(ledger.clone()),
            locks: Arc::new(locks.clone()),
            pending: Arc::new(pending.clone()),
            directory: Arc::new(catalog.clone()),
            fees: Arc::new(catalog.clone()),
            gateway: Arc::new(gateway.clone()),
        },
        config,
    );
    Harness {
        engine,
        gateway,
        ledger,
        locks,
        pending,
        catalog,
    }
}
