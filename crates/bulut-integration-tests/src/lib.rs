//! Integration test fixtures for Bulut.
//!
//! [`Harness`] wires the alias directory, validator, coordinator and
//! scheduler over in-memory SQLite with a [`SimulatedGateway`] and a
//! [`ManualClock`], the same way the daemon wires them over a file.
//!
//! Run all integration tests:
//! ```sh
//! cargo test -p bulut-integration-tests
//! ```

use std::sync::Arc;
use std::time::Duration;

use bulut_alias::challenge::{registration_challenge, release_challenge};
use bulut_alias::{AliasDirectory, SqliteAliasStore};
use bulut_crypto::secp256k1::LocalSigner;
use bulut_execution::gateway::SimulatedGateway;
use bulut_execution::{Coordinator, ExecutionStore, ManualClock, RetryPolicy, SqliteLedger};
use bulut_scheduler::{Scheduler, SqliteSubscriptionStore, SubscriptionBook};
use bulut_types::intent::ValidatedIntent;
use bulut_types::{Address, Handle};

/// 2023-11-14T22:13:20Z.
pub const T0: u64 = 1_700_000_000;

/// Retry policy with millisecond delays.
pub fn fast_policy() -> RetryPolicy {
    RetryPolicy {
        max_attempts: 3,
        base_delay: Duration::from_millis(5),
        max_delay: Duration::from_millis(20),
        call_timeout: Duration::from_millis(500),
        confirm_polls: 3,
        confirm_interval: Duration::from_millis(5),
    }
}

/// A wallet user: signing key plus address.
pub struct Wallet {
    pub signer: LocalSigner,
    pub address: Address,
}

impl Wallet {
    pub fn new() -> Self {
        let signer = LocalSigner::generate();
        let address = Address(signer.address());
        Self { signer, address }
    }

    /// Hex signature over the registration challenge for `handle`.
    pub fn sign_registration(&self, handle: &str) -> String {
        let handle: Handle = handle.parse().expect("handle");
        let message = registration_challenge(&handle, &self.address);
        hex::encode(self.signer.sign_personal(message.as_bytes()).expect("sign"))
    }

    /// Hex signature releasing the binding of `handle` registered at
    /// `registered_at`.
    pub fn sign_release(&self, handle: &str, registered_at: u64) -> String {
        let handle: Handle = handle.parse().expect("handle");
        let message = release_challenge(&handle, &self.address, registered_at);
        hex::encode(self.signer.sign_personal(message.as_bytes()).expect("sign"))
    }
}

impl Default for Wallet {
    fn default() -> Self {
        Self::new()
    }
}

/// All components over fresh in-memory databases.
pub struct Harness {
    pub aliases: AliasDirectory,
    pub ledger: Arc<dyn ExecutionStore>,
    pub coordinator: Arc<Coordinator>,
    pub book: SubscriptionBook,
    pub gateway: Arc<SimulatedGateway>,
    pub clock: Arc<ManualClock>,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_gateway(SimulatedGateway::new())
    }

    pub fn with_gateway(gateway: SimulatedGateway) -> Self {
        let ledger: Arc<dyn ExecutionStore> = Arc::new(SqliteLedger::new(
            bulut_db::open_memory().expect("ledger db"),
        ));
        Self::over_ledger(ledger, Arc::new(gateway), Arc::new(ManualClock::new(T0)))
    }

    /// A fresh coordinator over an existing ledger and gateway, as after a
    /// daemon restart.
    pub fn over_ledger(
        ledger: Arc<dyn ExecutionStore>,
        gateway: Arc<SimulatedGateway>,
        clock: Arc<ManualClock>,
    ) -> Self {
        let coordinator = Arc::new(Coordinator::new(
            ledger.clone(),
            gateway.clone(),
            clock.clone(),
            fast_policy(),
        ));
        Self {
            aliases: AliasDirectory::new(Arc::new(SqliteAliasStore::new(
                bulut_db::open_memory().expect("alias db"),
            ))),
            ledger,
            coordinator,
            book: SubscriptionBook::new(Arc::new(SqliteSubscriptionStore::new(
                bulut_db::open_memory().expect("subscription db"),
            ))),
            gateway,
            clock,
        }
    }

    /// Create a wallet and bind `handle` to it.
    pub fn register(&self, handle: &str) -> Wallet {
        let wallet = Wallet::new();
        self.aliases
            .register(
                handle,
                &wallet.address.to_string(),
                &wallet.sign_registration(handle),
                self.clock_now(),
            )
            .expect("register");
        wallet
    }

    /// Validate a JSON intent record against the directory.
    pub fn validate(&self, record: serde_json::Value) -> ValidatedIntent {
        bulut_intent::validate_value(record, &self.aliases, self.clock_now()).expect("validate")
    }

    pub fn scheduler(&self) -> Scheduler {
        Scheduler::new(self.book.clone(), self.coordinator.clone(), self.clock.clone())
    }

    fn clock_now(&self) -> u64 {
        bulut_execution::Clock::now(self.clock.as_ref())
    }
}

impl Default for Harness {
    fn default() -> Self {
        Self::new()
    }
}
