//! The ProgPow consensus engine.
//!
//! Verification-side entry points: single and batched header checks,
//! uncle checks, seal checks, difficulty preparation, and reward
//! finalisation. The engine owns the per-epoch artifact manager and
//! dispatches kernel calls to the full dataset when one is ready,
//! falling back to the light path so verification never blocks on a
//! dataset build.

use ethereum_types::{H256, U256, U512};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::mpsc::{self, Receiver};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tracing::{debug, trace, warn};

use flux_progpow::params as pow_params;
use flux_progpow::{progpow_full, progpow_light, EpochManager};

use crate::difficulty::calc_difficulty;
use crate::eip1559::{verify_eip1559_header, verify_gas_limit};
use crate::error::{ConsensusError, ConsensusResult};
use crate::params::{
    ALLOWED_FUTURE_BLOCK_TIME_SECS, MAXIMUM_EXTRA_DATA_SIZE, MAX_GAS_LIMIT, MAX_UNCLES,
    UNCLE_ANCESTOR_WINDOW,
};
use crate::rewards::accumulate_rewards;
use crate::types::{empty_uncle_hash, Address, Block, ChainConfig, ChainHeaderReader, ChainReader, Header, StateDb};

/// Proof-of-work operating mode, fixed at engine construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PowMode {
    /// Real sizes, real verification.
    Normal,
    /// Tiny cache/dataset sizes for unit tests.
    Test,
    /// Seals are accepted without PoW; `fake_delay`/`fake_fail` apply.
    Fake,
    /// Every header is accepted without any checks.
    FullFake,
}

/// Engine configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProgpowConfig {
    /// Operating mode.
    pub mode: PowMode,
    /// Epoch caches retained in memory.
    pub caches_in_mem: usize,
    /// Epoch datasets retained in memory.
    pub datasets_in_mem: usize,
    /// Artificial delay before fake-mode seal verification returns.
    pub fake_delay: Duration,
    /// Block number whose fake-mode seal verification fails.
    pub fake_fail: Option<u64>,
}

impl Default for ProgpowConfig {
    fn default() -> Self {
        ProgpowConfig {
            mode: PowMode::Normal,
            caches_in_mem: 5,
            datasets_in_mem: 3,
            fake_delay: Duration::ZERO,
            fake_fail: None,
        }
    }
}

/// Cancellation handle for a batch verification.
#[derive(Clone)]
pub struct VerifyAbort {
    flag: Arc<AtomicBool>,
}

impl VerifyAbort {
    /// Stop delivering further results; in-flight checks may still finish
    /// and are discarded.
    pub fn abort(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }
}

/// The ProgPow consensus engine.
pub struct Progpow {
    config: ProgpowConfig,
    epochs: EpochManager,
}

impl Progpow {
    /// Engine with the given configuration.
    pub fn new(config: ProgpowConfig) -> Self {
        let epochs = match config.mode {
            PowMode::Test => EpochManager::for_tests(),
            _ => EpochManager::with_capacity(config.caches_in_mem, config.datasets_in_mem),
        };
        Progpow { config, epochs }
    }

    /// Engine with tiny artifact sizes for tests.
    pub fn tester() -> Self {
        Self::new(ProgpowConfig {
            mode: PowMode::Test,
            ..Default::default()
        })
    }

    /// Engine that accepts any seal.
    pub fn faker() -> Self {
        Self::new(ProgpowConfig {
            mode: PowMode::Fake,
            ..Default::default()
        })
    }

    /// Fake engine that sleeps before answering seal checks.
    pub fn faker_with_delay(delay: Duration) -> Self {
        Self::new(ProgpowConfig {
            mode: PowMode::Fake,
            fake_delay: delay,
            ..Default::default()
        })
    }

    /// Fake engine that rejects the seal of one specific block number.
    pub fn faker_with_fail(fail: u64) -> Self {
        Self::new(ProgpowConfig {
            mode: PowMode::Fake,
            fake_fail: Some(fail),
            ..Default::default()
        })
    }

    /// Engine that accepts any header outright.
    pub fn full_faker() -> Self {
        Self::new(ProgpowConfig {
            mode: PowMode::FullFake,
            ..Default::default()
        })
    }

    /// The engine configuration.
    pub fn config(&self) -> &ProgpowConfig {
        &self.config
    }

    /// The proof-of-work verified author of the block.
    pub fn author(&self, header: &Header) -> Address {
        header.coinbase
    }

    /// The value miners hash against for this header.
    pub fn seal_hash(&self, header: &Header) -> H256 {
        header.seal_hash()
    }

    /// Difficulty a child of `parent` created at `time` must carry.
    pub fn calc_difficulty(&self, time: u64, parent: &Header) -> U256 {
        calc_difficulty(time, parent)
    }

    /// Fill the header's difficulty field from its parent.
    pub fn prepare(&self, chain: &dyn ChainHeaderReader, header: &mut Header) -> ConsensusResult<()> {
        let parent_number = header
            .number
            .checked_sub(1)
            .ok_or(ConsensusError::UnknownAncestor)?;
        let parent = chain
            .header(&header.parent_hash, parent_number)
            .ok_or(ConsensusError::UnknownAncestor)?;
        header.difficulty = calc_difficulty(header.time, &parent);
        Ok(())
    }

    /// Check a single header against the consensus rules.
    pub fn verify_header(
        &self,
        chain: &dyn ChainHeaderReader,
        header: &Header,
        seal: bool,
    ) -> ConsensusResult<()> {
        if self.config.mode == PowMode::FullFake {
            return Ok(());
        }
        // Short circuit if the header is already known or its parent is
        // missing.
        if chain.header(&header.hash(), header.number).is_some() {
            return Ok(());
        }
        let parent_number = header
            .number
            .checked_sub(1)
            .ok_or(ConsensusError::UnknownAncestor)?;
        let parent = chain
            .header(&header.parent_hash, parent_number)
            .ok_or(ConsensusError::UnknownAncestor)?;
        self.verify_header_inner(chain.config(), header, &parent, false, seal, unix_now())
    }

    /// Check a batch of headers concurrently.
    ///
    /// Results arrive on the returned channel strictly in input order,
    /// one per header, regardless of worker scheduling. The abort handle
    /// stops further delivery.
    pub fn verify_headers(
        self: &Arc<Self>,
        chain: Arc<dyn ChainHeaderReader>,
        headers: Vec<Header>,
        seals: Vec<bool>,
    ) -> (VerifyAbort, Receiver<ConsensusResult<()>>) {
        let abort = VerifyAbort {
            flag: Arc::new(AtomicBool::new(false)),
        };
        let total = headers.len();
        let (out_tx, out_rx) = mpsc::sync_channel(total.max(1));

        if self.config.mode == PowMode::FullFake || total == 0 {
            for _ in 0..total {
                let _ = out_tx.send(Ok(()));
            }
            return (abort, out_rx);
        }

        let workers = num_cpus::get().min(total);
        debug!(headers = total, workers, "Verifying header batch");

        let headers = Arc::new(headers);
        let seals = Arc::new(seals);
        let next = Arc::new(AtomicUsize::new(0));
        let now = unix_now();
        let (done_tx, done_rx) = mpsc::channel::<(usize, ConsensusResult<()>)>();

        for id in 0..workers {
            let engine = Arc::clone(self);
            let chain = Arc::clone(&chain);
            let headers = Arc::clone(&headers);
            let seals = Arc::clone(&seals);
            let next = Arc::clone(&next);
            let flag = Arc::clone(&abort.flag);
            let done_tx = done_tx.clone();
            let spawned = thread::Builder::new()
                .name(format!("flux-verify-{id}"))
                .spawn(move || loop {
                    let index = next.fetch_add(1, Ordering::SeqCst);
                    if index >= headers.len() || flag.load(Ordering::SeqCst) {
                        break;
                    }
                    let result =
                        engine.verify_header_worker(chain.as_ref(), &headers, &seals, index, now);
                    if done_tx.send((index, result)).is_err() {
                        break;
                    }
                });
            if let Err(err) = spawned {
                warn!(%err, "Failed to spawn verification worker");
            }
        }
        drop(done_tx);

        // Sequencer: drain completions and forward them in input order.
        let flag = Arc::clone(&abort.flag);
        let sequencer = thread::Builder::new()
            .name("flux-verify-seq".into())
            .spawn(move || {
                let mut pending: HashMap<usize, ConsensusResult<()>> = HashMap::new();
                let mut out = 0usize;
                while out < total {
                    match done_rx.recv() {
                        Ok((index, result)) => {
                            pending.insert(index, result);
                            while let Some(result) = pending.remove(&out) {
                                if flag.load(Ordering::SeqCst) {
                                    return;
                                }
                                if out_tx.send(result).is_err() {
                                    return;
                                }
                                out += 1;
                            }
                        }
                        Err(_) => return,
                    }
                }
            });
        if let Err(err) = sequencer {
            warn!(%err, "Failed to spawn verification sequencer");
        }

        (abort, out_rx)
    }

    fn verify_header_worker(
        &self,
        chain: &dyn ChainHeaderReader,
        headers: &[Header],
        seals: &[bool],
        index: usize,
        now: u64,
    ) -> ConsensusResult<()> {
        let header = &headers[index];
        let parent = if index == 0 {
            let parent_number = header
                .number
                .checked_sub(1)
                .ok_or(ConsensusError::UnknownAncestor)?;
            chain
                .header(&header.parent_hash, parent_number)
                .ok_or(ConsensusError::UnknownAncestor)?
        } else if headers[index - 1].hash() == header.parent_hash {
            headers[index - 1].clone()
        } else {
            return Err(ConsensusError::UnknownAncestor);
        };
        self.verify_header_inner(
            chain.config(),
            header,
            &parent,
            false,
            seals.get(index).copied().unwrap_or(false),
            now,
        )
    }

    fn verify_header_inner(
        &self,
        config: &ChainConfig,
        header: &Header,
        parent: &Header,
        uncle: bool,
        seal: bool,
        now: u64,
    ) -> ConsensusResult<()> {
        if header.extra_data.len() > MAXIMUM_EXTRA_DATA_SIZE {
            return Err(ConsensusError::ExtraDataTooLong {
                len: header.extra_data.len(),
                max: MAXIMUM_EXTRA_DATA_SIZE,
            });
        }
        if !uncle && header.time > now + ALLOWED_FUTURE_BLOCK_TIME_SECS {
            return Err(ConsensusError::FutureBlock {
                time: header.time,
                limit: now + ALLOWED_FUTURE_BLOCK_TIME_SECS,
            });
        }
        if header.time <= parent.time {
            return Err(ConsensusError::OlderBlockTime);
        }
        let expected = calc_difficulty(header.time, parent);
        if expected != header.difficulty {
            return Err(ConsensusError::InvalidDifficulty {
                have: header.difficulty,
                want: expected,
            });
        }
        if header.gas_limit > MAX_GAS_LIMIT {
            return Err(ConsensusError::InvalidGasLimit {
                have: header.gas_limit,
                limit: MAX_GAS_LIMIT,
            });
        }
        if header.gas_used > header.gas_limit {
            return Err(ConsensusError::InvalidGasUsed {
                have: header.gas_used,
                limit: header.gas_limit,
            });
        }
        if !config.is_london(header.number) {
            if let Some(base_fee) = header.base_fee {
                return Err(ConsensusError::InvalidBaseFee(format!(
                    "have {base_fee} before London fork"
                )));
            }
            verify_gas_limit(parent.gas_limit, header.gas_limit)?;
        } else {
            verify_eip1559_header(config, parent, header)?;
        }
        if header.number != parent.number + 1 {
            return Err(ConsensusError::InvalidNumber {
                have: header.number,
                parent: parent.number,
            });
        }
        if seal {
            self.verify_seal_inner(header, false)?;
        }
        Ok(())
    }

    /// Check that a block's uncles conform to the consensus rules.
    pub fn verify_uncles(&self, chain: &dyn ChainReader, block: &Block) -> ConsensusResult<()> {
        if self.config.mode == PowMode::FullFake {
            return Ok(());
        }
        if block.uncles.len() > MAX_UNCLES {
            return Err(ConsensusError::TooManyUncles);
        }
        if block.uncles.is_empty() {
            return Ok(());
        }

        // Gather the recent ancestors and every uncle they already
        // rewarded.
        let mut ancestors: HashMap<H256, Header> = HashMap::new();
        let mut seen: HashSet<H256> = HashSet::new();

        let mut parent_hash = block.header.parent_hash;
        let mut number = block.number().saturating_sub(1);
        for _ in 0..UNCLE_ANCESTOR_WINDOW {
            let Some(ancestor) = chain.header(&parent_hash, number) else {
                break;
            };
            if ancestor.uncle_hash != empty_uncle_hash() {
                let Some(ancestor_block) = chain.block(&parent_hash, number) else {
                    break;
                };
                for uncle in &ancestor_block.uncles {
                    seen.insert(uncle.hash());
                }
            }
            let next = ancestor.parent_hash;
            ancestors.insert(parent_hash, ancestor);
            parent_hash = next;
            if number == 0 {
                break;
            }
            number -= 1;
        }
        ancestors.insert(block.hash(), block.header.clone());
        seen.insert(block.hash());

        let now = unix_now();
        for uncle in &block.uncles {
            let hash = uncle.hash();
            if !seen.insert(hash) {
                return Err(ConsensusError::DuplicateUncle { hash });
            }
            if ancestors.contains_key(&hash) {
                return Err(ConsensusError::UncleIsAncestor { hash });
            }
            let parent = ancestors
                .get(&uncle.parent_hash)
                .filter(|_| uncle.parent_hash != block.header.parent_hash)
                .ok_or(ConsensusError::DanglingUncle { hash })?;
            self.verify_header_inner(chain.config(), uncle, parent, true, true, now)?;
        }
        Ok(())
    }

    /// Check a header's proof-of-work seal.
    pub fn verify_seal(&self, header: &Header) -> ConsensusResult<()> {
        self.verify_seal_inner(header, false)
    }

    fn verify_seal_inner(&self, header: &Header, fulldag: bool) -> ConsensusResult<()> {
        if matches!(self.config.mode, PowMode::Fake | PowMode::FullFake) {
            if !self.config.fake_delay.is_zero() {
                thread::sleep(self.config.fake_delay);
            }
            if self.config.fake_fail == Some(header.number) {
                return Err(ConsensusError::InvalidPoW);
            }
            return Ok(());
        }
        if header.difficulty.is_zero() {
            return Err(ConsensusError::NonPositiveDifficulty);
        }

        let (digest, result) = self.compute(header.seal_hash(), header.nonce, header.number, fulldag);
        trace!(number = header.number, nonce = header.nonce, %digest, "Verified seal");

        if digest != header.mix_digest {
            return Err(ConsensusError::InvalidMixDigest);
        }
        if !meets_difficulty(&result, &header.difficulty) {
            return Err(ConsensusError::InvalidPoW);
        }
        Ok(())
    }

    /// Run the ProgPow kernel for `(seal_hash, nonce, block_number)`.
    ///
    /// With `fulldag`, the prebuilt dataset is used when ready (queuing a
    /// background build otherwise); in every other case the light path
    /// regenerates dataset items from the epoch cache. Never blocks on a
    /// dataset build.
    pub fn compute(
        &self,
        seal_hash: H256,
        nonce: u64,
        block_number: u64,
        fulldag: bool,
    ) -> (H256, H256) {
        let epoch = pow_params::epoch(block_number);
        let hash = seal_hash.to_fixed_bytes();

        if fulldag {
            let dataset = self.epochs.dataset(epoch, true);
            if let Some(words) = dataset.words() {
                let cache = self.epochs.cache(epoch);
                let (digest, result) = progpow_full(words, &hash, nonce, block_number, cache.c_dag());
                return (H256::from(digest), H256::from(result));
            }
            // Dataset still generating; fall through to the light path
            // rather than stalling the caller.
        }

        let cache = self.epochs.cache(epoch);
        let dataset_size = self.epochs.dataset_bytes_for_block(block_number);
        let (digest, result) = progpow_light(
            dataset_size,
            cache.words(),
            &hash,
            nonce,
            block_number,
            cache.c_dag(),
        );
        (H256::from(digest), H256::from(result))
    }

    /// Accumulate block and uncle rewards into the state.
    pub fn finalize(
        &self,
        config: &ChainConfig,
        state: &mut dyn StateDb,
        header: &Header,
        uncles: &[Header],
    ) {
        accumulate_rewards(config, state, header, uncles);
    }
}

fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or_default()
}

/// Mining target for a difficulty: `2^256 / difficulty`, saturating.
pub fn difficulty_to_target(difficulty: &U256) -> U256 {
    if difficulty.is_zero() {
        return U256::MAX;
    }
    let target = (U512::one() << 256u32) / U512::from(*difficulty);
    let words = target.0;
    if words[4] | words[5] | words[6] | words[7] != 0 {
        U256::MAX
    } else {
        U256([words[0], words[1], words[2], words[3]])
    }
}

/// Whether a big-endian kernel result satisfies the difficulty:
/// `result * difficulty <= 2^256`.
pub fn meets_difficulty(result: &H256, difficulty: &U256) -> bool {
    let result = U256::from_big_endian(result.as_bytes());
    U512::from(result) * U512::from(*difficulty) <= (U512::one() << 256u32)
}
