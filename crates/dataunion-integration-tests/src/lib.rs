//! Integration test fixtures for the Data Union ledger.
//!
//! The scenarios in `tests/` drive a full ledger (token, fee oracle,
//! modules, clock) across the workspace crates. Everything here is a
//! fixture shared between them.
//!
//! Run all integration tests:
//! ```sh
//! cargo test -p dataunion-integration-tests
//! ```

use std::sync::Arc;

use dataunion_crypto::ed25519::KeyPair;
use dataunion_ledger::clock::ManualClock;
use dataunion_ledger::fees::Fraction;
use dataunion_ledger::ledger::LedgerConfig;
use dataunion_ledger::oracle::FixedFeeOracle;
use dataunion_ledger::token::InMemoryToken;
use dataunion_ledger::Ledger;
use dataunion_types::{Address, Amount};

/// Base timestamp for test scenarios.
pub const BASE_TIME: u64 = 1_700_000_000;

pub const IDENTITY: Address = Address::from_bytes([0xd0; 32]);
pub const OWNER: Address = Address::from_bytes([0x01; 32]);
pub const AGENT: Address = Address::from_bytes([0x02; 32]);
pub const PAYER: Address = Address::from_bytes([0x09; 32]);
pub const PROTOCOL: Address = Address::from_bytes([0x0f; 32]);

/// Starting token balance of [`PAYER`].
pub const PAYER_FUNDS: Amount = 1_000_000_000;

/// Deterministic test address.
pub fn addr(b: u8) -> Address {
    Address::from_bytes([b; 32])
}

/// A ledger with its externally controlled collaborators.
pub struct Harness {
    pub ledger: Ledger<InMemoryToken>,
    pub oracle: Arc<FixedFeeOracle>,
    pub clock: Arc<ManualClock>,
}

impl Harness {
    /// Initialized ledger: [`OWNER`] owns it, [`AGENT`] is a join-part agent,
    /// [`PAYER`] holds [`PAYER_FUNDS`].
    pub fn new(admin_bps: u32, protocol_bps: u32) -> Self {
        let oracle = Arc::new(FixedFeeOracle::new(Fraction::from_bps(protocol_bps), PROTOCOL));
        let clock = Arc::new(ManualClock::new(BASE_TIME));
        let token = InMemoryToken::with_balances([(PAYER, PAYER_FUNDS)]);
        let mut ledger = Ledger::new(IDENTITY, token, oracle.clone(), clock.clone());
        ledger
            .initialize(LedgerConfig {
                owner: OWNER,
                admin_fee: Fraction::from_bps(admin_bps),
                join_part_agents: vec![AGENT],
                metadata: String::new(),
            })
            .expect("initialize ledger");
        ledger.take_events();
        Self { ledger, oracle, clock }
    }

    pub fn join(&mut self, member: Address) {
        self.ledger.add_member(&AGENT, member).expect("add member");
    }

    pub fn pay(&mut self, amount: Amount) {
        self.ledger.pay_revenue(&PAYER, amount).expect("pay revenue");
    }

    pub fn earnings(&self, member: &Address) -> Amount {
        self.ledger.get_earnings(member).expect("earnings")
    }

    pub fn withdrawable(&self, member: &Address) -> Amount {
        self.ledger.get_withdrawable_earnings(member).expect("withdrawable")
    }

    /// The ledger's token balance equals recognized-but-unwithdrawn revenue
    /// plus whatever has not been refreshed yet.
    pub fn assert_solvent(&self) {
        let stats = self.ledger.get_stats();
        assert!(stats.is_conserved(), "conservation violated: {stats:?}");
        let held = dataunion_ledger::token::Token::balance_of(self.ledger.token(), &IDENTITY);
        assert_eq!(
            u128::from(held),
            u128::from(stats.total_revenue - stats.total_withdrawn) + u128::from(self.ledger.unaccounted_revenue()),
        );
    }
}

/// A member with a real signing key, for signed withdrawals.
pub fn signing_member() -> (KeyPair, Address) {
    let kp = KeyPair::generate();
    let address = kp.address();
    (kp, address)
}

/// Append `events` to an in-memory journal, returning the connection.
pub fn journal_of(events: &[dataunion_types::events::LedgerEvent]) -> rusqlite::Connection {
    let mut conn = dataunion_db::open_memory().expect("open journal");
    dataunion_db::queries::events::append(&mut conn, BASE_TIME, events).expect("append");
    conn
}
