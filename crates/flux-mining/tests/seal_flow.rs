//! End-to-end sealing flows: header preparation, sealing, verification,
//! and reward finalisation against an in-memory chain.

use ethereum_types::{H256, U256};
use flux_consensus::{
    calc_block_reward, calc_difficulty, empty_uncle_hash, meets_difficulty, Address, Block,
    ChainConfig, ChainHeaderReader, Header, Progpow, StateDb,
};
use flux_mining::{Api, Sealer};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::mpsc;
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

struct TestChain {
    config: ChainConfig,
    headers: Mutex<HashMap<H256, Header>>,
}

impl TestChain {
    fn new() -> Self {
        TestChain {
            config: ChainConfig::default(),
            headers: Mutex::new(HashMap::new()),
        }
    }

    fn insert(&self, header: Header) {
        self.headers.lock().insert(header.hash(), header);
    }
}

impl ChainHeaderReader for TestChain {
    fn config(&self) -> &ChainConfig {
        &self.config
    }

    fn header(&self, hash: &H256, number: u64) -> Option<Header> {
        self.headers
            .lock()
            .get(hash)
            .filter(|h| h.number == number)
            .cloned()
    }
}

#[derive(Default)]
struct TestState {
    balances: HashMap<Address, U256>,
}

impl StateDb for TestState {
    fn add_balance(&mut self, address: &Address, amount: U256) {
        *self.balances.entry(*address).or_default() += amount;
    }
}

fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or_default()
}

#[test]
fn prepared_sealed_block_passes_verification_and_pays_rewards() {
    let engine = Arc::new(Progpow::faker());
    let sealer = Sealer::new(Arc::clone(&engine), 1);
    let chain = TestChain::new();

    let genesis = Header {
        number: 0,
        time: unix_now() - 40,
        difficulty: U256::from(131_072u64),
        gas_limit: 8_000_000,
        uncle_hash: empty_uncle_hash(),
        ..Default::default()
    };
    chain.insert(genesis.clone());

    let mut header = Header {
        parent_hash: genesis.hash(),
        number: 1,
        time: genesis.time + 10,
        gas_limit: genesis.gas_limit,
        uncle_hash: empty_uncle_hash(),
        coinbase: Address::repeat_byte(0x11),
        ..Default::default()
    };
    engine.prepare(&chain, &mut header).expect("prepare");
    assert_eq!(header.difficulty, calc_difficulty(header.time, &genesis));

    let (tx, rx) = mpsc::sync_channel(1);
    sealer
        .seal(Block::with_header(header), tx)
        .expect("seal should start");
    let sealed = rx
        .recv_timeout(Duration::from_secs(10))
        .expect("sealed block");

    assert_eq!(
        engine.verify_header(&chain, &sealed.header, true),
        Ok(()),
        "sealed header should satisfy the full rule set"
    );

    let mut state = TestState::default();
    engine.finalize(chain.config(), &mut state, &sealed.header, &[]);
    let reward = calc_block_reward(1);
    assert_eq!(
        state.balances[&sealed.header.coinbase],
        reward * U256::from(70u64) / U256::from(100u64)
    );

    sealer.close();
}

#[test]
fn remote_miner_round_trip_over_the_hex_api() {
    let engine = Arc::new(Progpow::tester());
    let sealer = Sealer::remote_only(Arc::clone(&engine));
    let api = Api::new(Arc::clone(&sealer));

    let block = Block::with_header(Header {
        number: 1,
        time: 1,
        difficulty: U256::from(100u64),
        ..Default::default()
    });
    let (tx, rx) = mpsc::sync_channel(1);
    sealer.seal(block, tx).expect("seal");

    let work = api.get_work().expect("work");
    let seal_hash = work[0].clone();
    let parsed_hash = H256::from_slice(&hex::decode(&seal_hash[2..]).expect("hex"));

    // Play the external miner: scan nonces with the light kernel until
    // one meets the difficulty, then submit it back through the API.
    let mut nonce = 0u64;
    let accepted = loop {
        let (digest, result) = engine.compute(parsed_hash, nonce, 1, false);
        if meets_difficulty(&result, &U256::from(100u64)) {
            break api.submit_work(
                &format!("{nonce:#x}"),
                &seal_hash,
                &format!("{digest:#x}"),
            );
        }
        nonce += 1;
    };
    assert!(accepted, "valid remote solution should be accepted");

    let sealed = rx
        .recv_timeout(Duration::from_secs(10))
        .expect("published block");
    assert_eq!(engine.verify_seal(&sealed.header), Ok(()));

    sealer.close();
}
