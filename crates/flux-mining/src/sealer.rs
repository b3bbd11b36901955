//! The sealing loop and remote-work registry.
//!
//! A [`Sealer`] owns a pool of worker threads that search the nonce
//! space for the current sealing task. Tasks are broadcast over a watch
//! channel: pushing a new block replaces the previous task and every
//! worker migrates to it between attempts. A found solution is published
//! to the task's results channel at most once, without blocking, and
//! stops the remaining workers.
//!
//! The sealer doubles as the registry behind the remote-mining API:
//! every sealing task is retained (keyed by seal hash) so external
//! miners can fetch work and submit solutions.

use ethereum_types::{H256, U256};
use parking_lot::Mutex;
use rand::Rng;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::SyncSender;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tokio::sync::watch;
use tracing::{debug, info, warn};

use flux_consensus::{difficulty_to_target, meets_difficulty, Block, PowMode, Progpow};
use flux_progpow::params as pow_params;

use crate::error::{MiningError, MiningResult};
use crate::hashrate::HashrateMeter;

/// Attempts between hashrate samples.
const HASHRATE_SAMPLE_ATTEMPTS: u64 = 1 << 17;

/// Idle poll interval while no task is pending.
const IDLE_POLL: Duration = Duration::from_millis(50);

/// Sealing tasks retained for remote miners.
const MAX_TRACKED_WORKS: usize = 3;

/// Remote hashrate contributions expire after this long.
const HASHRATE_EXPIRY: Duration = Duration::from_secs(10);

struct SealTask {
    block: Block,
    seal_hash: H256,
    target: U256,
    results: SyncSender<Block>,
    found: AtomicBool,
}

struct RemoteState {
    current: Option<H256>,
    works: HashMap<H256, Arc<SealTask>>,
    order: VecDeque<H256>,
    rates: HashMap<H256, (u64, Instant)>,
}

impl RemoteState {
    fn track(&mut self, seal_hash: H256, task: Arc<SealTask>) {
        self.works.insert(seal_hash, task);
        self.order.push_back(seal_hash);
        while self.order.len() > MAX_TRACKED_WORKS {
            if let Some(stale) = self.order.pop_front() {
                self.works.remove(&stale);
            }
        }
        self.current = Some(seal_hash);
    }

    fn prune_rates(&mut self, now: Instant) {
        self.rates
            .retain(|_, (_, seen)| now.saturating_duration_since(*seen) < HASHRATE_EXPIRY);
    }
}

/// Multi-threaded block sealer with a remote-mining registry.
pub struct Sealer {
    engine: Arc<Progpow>,
    task_tx: watch::Sender<Option<Arc<SealTask>>>,
    running: Arc<AtomicBool>,
    closed: AtomicBool,
    meter: Arc<HashrateMeter>,
    remote: Mutex<RemoteState>,
    workers: Mutex<Vec<JoinHandle<()>>>,
}

impl Sealer {
    /// Start a sealer with `threads` workers (0 = one per CPU).
    pub fn new(engine: Arc<Progpow>, threads: usize) -> Arc<Self> {
        let threads = if threads == 0 {
            num_cpus::get().max(1)
        } else {
            threads
        };
        Self::start(engine, threads)
    }

    /// Sealer without local workers: work is only handed out to (and
    /// accepted back from) remote miners.
    pub fn remote_only(engine: Arc<Progpow>) -> Arc<Self> {
        Self::start(engine, 0)
    }

    fn start(engine: Arc<Progpow>, threads: usize) -> Arc<Self> {
        let (task_tx, task_rx) = watch::channel(None);
        let running = Arc::new(AtomicBool::new(true));
        let meter = Arc::new(HashrateMeter::new());

        let sealer = Arc::new(Sealer {
            engine,
            task_tx,
            running: Arc::clone(&running),
            closed: AtomicBool::new(false),
            meter: Arc::clone(&meter),
            remote: Mutex::new(RemoteState {
                current: None,
                works: HashMap::new(),
                order: VecDeque::new(),
                rates: HashMap::new(),
            }),
            workers: Mutex::new(Vec::new()),
        });

        let mut workers = sealer.workers.lock();
        for id in 0..threads {
            let engine = Arc::clone(&sealer.engine);
            let task_rx = task_rx.clone();
            let running = Arc::clone(&running);
            let meter = Arc::clone(&meter);
            let spawned = thread::Builder::new()
                .name(format!("flux-seal-{id}"))
                .spawn(move || worker_loop(id, engine, task_rx, running, meter));
            match spawned {
                Ok(handle) => workers.push(handle),
                Err(err) => warn!(%err, "Failed to spawn sealing worker"),
            }
        }
        info!(threads, "Sealer started");
        drop(workers);
        sealer
    }

    /// The consensus engine this sealer mines for.
    pub fn engine(&self) -> &Arc<Progpow> {
        &self.engine
    }

    /// Start searching for a seal of `block`, publishing the sealed block
    /// to `results`.
    ///
    /// A later call with a new block replaces the search; workers migrate
    /// between nonce attempts. At most one sealed block is published per
    /// task, and publication never blocks: if the consumer is not ready
    /// the solution is dropped with a warning.
    pub fn seal(&self, block: Block, results: SyncSender<Block>) -> MiningResult<()> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(MiningError::EngineStopped);
        }

        // Fake engines short-circuit with an empty seal.
        if matches!(
            self.engine.config().mode,
            PowMode::Fake | PowMode::FullFake
        ) {
            let sealed = block.with_seal(0, H256::zero());
            if results.send(sealed).is_err() {
                warn!(number = block.number(), "Fake sealing result dropped");
            }
            return Ok(());
        }

        let seal_hash = self.engine.seal_hash(&block.header);
        let target = difficulty_to_target(&block.header.difficulty);
        let number = block.number();
        let task = Arc::new(SealTask {
            block,
            seal_hash,
            target,
            results,
            found: AtomicBool::new(false),
        });

        self.remote.lock().track(seal_hash, Arc::clone(&task));
        debug!(number, %seal_hash, "Commencing work on new sealing task");

        self.task_tx.send_replace(Some(task));
        Ok(())
    }

    /// Abort the current sealing task; workers go idle.
    pub fn cancel(&self) {
        self.task_tx.send_replace(None);
    }

    /// Current work for remote miners:
    /// `(seal_hash, epoch seed hash, target, block_number)`.
    pub fn get_work(&self) -> MiningResult<(H256, H256, U256, u64)> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(MiningError::EngineStopped);
        }
        let remote = self.remote.lock();
        let task = remote
            .current
            .and_then(|hash| remote.works.get(&hash))
            .ok_or(MiningError::NoMiningWork)?;
        let number = task.block.number();
        let seed = pow_params::seed_hash(pow_params::epoch(number));
        Ok((task.seal_hash, H256::from(seed), task.target, number))
    }

    /// Verify and publish an externally mined solution.
    ///
    /// Returns whether the solution was accepted. Stale seal hashes,
    /// wrong mix digests, insufficient results, and already-solved tasks
    /// are all rejected.
    pub fn submit_work(&self, nonce: u64, seal_hash: H256, mix_digest: H256) -> bool {
        if self.closed.load(Ordering::SeqCst) {
            warn!("Work submitted after sealer was stopped");
            return false;
        }
        let Some(task) = self.remote.lock().works.get(&seal_hash).cloned() else {
            warn!(%seal_hash, "Work submitted but none pending");
            return false;
        };

        let number = task.block.number();
        let (digest, result) = self.engine.compute(seal_hash, nonce, number, true);
        if digest != mix_digest {
            warn!(number, nonce, "Submitted work has invalid mix digest");
            return false;
        }
        if !meets_difficulty(&result, &task.block.header.difficulty) {
            warn!(number, nonce, "Submitted work does not meet the target");
            return false;
        }
        if task.found.swap(true, Ordering::SeqCst) {
            debug!(number, nonce, "Submitted work for an already solved task");
            return false;
        }

        let sealed = task.block.with_seal(nonce, digest);
        if task.results.try_send(sealed).is_err() {
            warn!(number, "Submitted sealing result dropped, consumer not ready");
            return false;
        }
        info!(number, nonce, "Accepted remotely mined block");
        true
    }

    /// Record a remote miner's reported hashrate under `id`.
    pub fn submit_hashrate(&self, rate: u64, id: H256) -> bool {
        if self.closed.load(Ordering::SeqCst) {
            return false;
        }
        let mut remote = self.remote.lock();
        let now = Instant::now();
        remote.prune_rates(now);
        remote.rates.insert(id, (rate, now));
        true
    }

    /// Combined hashrate: the local workers' smoothed rate plus every
    /// unexpired remote contribution.
    pub fn hashrate(&self) -> f64 {
        let mut remote = self.remote.lock();
        remote.prune_rates(Instant::now());
        let contributed: u64 = remote.rates.values().map(|(rate, _)| rate).sum();
        self.meter.rate() + contributed as f64
    }

    /// Stop the workers and flip the remote API to `EngineStopped`.
    /// Idempotent.
    pub fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        self.running.store(false, Ordering::SeqCst);
        self.task_tx.send_replace(None);
        let mut workers = self.workers.lock();
        for worker in workers.drain(..) {
            let _ = worker.join();
        }
        info!("Sealer stopped");
    }
}

impl Drop for Sealer {
    fn drop(&mut self) {
        self.closed.store(true, Ordering::SeqCst);
        self.running.store(false, Ordering::SeqCst);
    }
}

fn worker_loop(
    id: usize,
    engine: Arc<Progpow>,
    mut task_rx: watch::Receiver<Option<Arc<SealTask>>>,
    running: Arc<AtomicBool>,
    meter: Arc<HashrateMeter>,
) {
    while running.load(Ordering::SeqCst) {
        let task = task_rx.borrow_and_update().clone();
        let Some(task) = task else {
            thread::sleep(IDLE_POLL);
            continue;
        };
        if task.found.load(Ordering::SeqCst) {
            thread::sleep(IDLE_POLL);
            continue;
        }

        let number = task.block.number();
        let mut nonce: u64 = rand::thread_rng().gen();
        debug!(worker_id = id, number, start_nonce = nonce, "Started nonce search");

        let mut attempts = 0u64;
        loop {
            if !running.load(Ordering::SeqCst) || task.found.load(Ordering::SeqCst) {
                break;
            }
            // A replaced or cancelled task shows up as a watch change.
            if task_rx.has_changed().unwrap_or(true) {
                debug!(worker_id = id, number, "Sealing task replaced");
                break;
            }

            let (digest, result) = engine.compute(task.seal_hash, nonce, number, true);
            attempts += 1;
            if attempts % HASHRATE_SAMPLE_ATTEMPTS == 0 {
                meter.mark(HASHRATE_SAMPLE_ATTEMPTS);
            }

            if U256::from_big_endian(result.as_bytes()) <= task.target {
                if !task.found.swap(true, Ordering::SeqCst) {
                    let sealed = task.block.with_seal(nonce, digest);
                    info!(worker_id = id, number, nonce, "Sealed new block");
                    if task.results.try_send(sealed).is_err() {
                        warn!(
                            worker_id = id,
                            number, "Sealing result dropped, consumer not ready"
                        );
                    }
                }
                break;
            }
            nonce = nonce.wrapping_add(1);
        }
        meter.mark(attempts % HASHRATE_SAMPLE_ATTEMPTS);
    }
    debug!(worker_id = id, "Sealing worker shut down");
}

#[cfg(test)]
mod tests {
    use super::*;
    use flux_consensus::Header;
    use std::sync::mpsc;

    fn test_block(number: u64, difficulty: u64) -> Block {
        Block::with_header(Header {
            number,
            time: number,
            difficulty: U256::from(difficulty),
            ..Default::default()
        })
    }

    #[test]
    fn seals_and_verifies_in_test_mode() {
        let engine = Arc::new(Progpow::tester());
        let sealer = Sealer::new(Arc::clone(&engine), 2);

        let block = test_block(1, 100);
        let (tx, rx) = mpsc::sync_channel(1);
        sealer.seal(block, tx).expect("seal should start");

        let sealed = rx
            .recv_timeout(Duration::from_secs(60))
            .expect("sealing result");
        assert_eq!(engine.verify_seal(&sealed.header), Ok(()));

        // A corrupted nonce no longer verifies.
        let mut tampered = sealed.header.clone();
        tampered.nonce = tampered.nonce.wrapping_add(1);
        assert!(engine.verify_seal(&tampered).is_err());

        sealer.close();
    }

    #[test]
    fn fake_mode_seals_immediately_with_empty_seal() {
        let engine = Arc::new(Progpow::faker());
        let sealer = Sealer::new(engine, 1);

        let (tx, rx) = mpsc::sync_channel(1);
        sealer.seal(test_block(1, 100), tx).expect("seal");

        let sealed = rx
            .recv_timeout(Duration::from_secs(5))
            .expect("fake result");
        assert_eq!(sealed.header.nonce, 0);
        assert_eq!(sealed.header.mix_digest, H256::zero());
        sealer.close();
    }

    #[test]
    fn replaced_task_is_abandoned_for_the_new_one() {
        let engine = Arc::new(Progpow::tester());
        let sealer = Sealer::new(engine, 1);

        // Practically unsolvable target keeps the worker busy.
        let hard = Block::with_header(Header {
            number: 1,
            time: 1,
            difficulty: U256::MAX >> 1u32,
            ..Default::default()
        });
        let (hard_tx, hard_rx) = mpsc::sync_channel(1);
        sealer.seal(hard, hard_tx).expect("seal hard");

        let easy = test_block(2, 1);
        let (easy_tx, easy_rx) = mpsc::sync_channel(1);
        sealer.seal(easy, easy_tx).expect("seal easy");

        let sealed = easy_rx
            .recv_timeout(Duration::from_secs(60))
            .expect("easy result");
        assert_eq!(sealed.number(), 2);
        assert!(hard_rx.try_recv().is_err());
        sealer.close();
    }

    #[test]
    fn remote_work_lifecycle() {
        let engine = Arc::new(Progpow::tester());
        let sealer = Sealer::new(Arc::clone(&engine), 1);

        assert_eq!(sealer.get_work(), Err(MiningError::NoMiningWork));

        let block = test_block(1, 100);
        let seal_hash = engine.seal_hash(&block.header);
        let (tx, _rx) = mpsc::sync_channel(1);
        sealer.seal(block, tx).expect("seal");

        let (work_hash, seed, target, number) = sealer.get_work().expect("work");
        assert_eq!(work_hash, seal_hash);
        assert_eq!(seed, H256::zero(), "epoch 0 seed is all zeros");
        assert_eq!(target, difficulty_to_target(&U256::from(100u64)));
        assert_eq!(number, 1);

        // A fabricated solution is rejected.
        assert!(!sealer.submit_work(0, seal_hash, H256::zero()));
        // A solution for unknown work is rejected.
        assert!(!sealer.submit_work(0, H256::repeat_byte(9), H256::zero()));

        // Pushing a replacement block surfaces the newest work.
        let replacement = test_block(1, 1000);
        let replacement_hash = engine.seal_hash(&replacement.header);
        let (tx, _rx2) = mpsc::sync_channel(1);
        sealer.seal(replacement, tx).expect("seal replacement");
        let (work_hash, _, _, _) = sealer.get_work().expect("work");
        assert_eq!(work_hash, replacement_hash);

        sealer.close();
    }

    #[test]
    fn submitted_solution_is_verified_and_published() {
        let engine = Arc::new(Progpow::tester());
        // No local workers: the "remote miner" does the searching.
        let sealer = Sealer::remote_only(Arc::clone(&engine));

        let block = test_block(1, 1);
        let seal_hash = engine.seal_hash(&block.header);
        let (tx, rx) = mpsc::sync_channel(1);
        sealer.seal(block, tx).expect("seal");

        // Difficulty 1: every nonce solves, so mine nonce 7 by hand.
        let (digest, _result) = engine.compute(seal_hash, 7, 1, false);
        assert!(sealer.submit_work(7, seal_hash, digest));

        let sealed = rx.recv_timeout(Duration::from_secs(5)).expect("published");
        assert_eq!(sealed.header.nonce, 7);
        assert_eq!(sealed.header.mix_digest, digest);
        assert_eq!(engine.verify_seal(&sealed.header), Ok(()));

        // Second submission for the same task is stale.
        let (digest8, _) = engine.compute(seal_hash, 8, 1, false);
        assert!(!sealer.submit_work(8, seal_hash, digest8));

        sealer.close();
    }

    #[test]
    fn hashrate_sums_remote_contributions() {
        let engine = Arc::new(Progpow::tester());
        let sealer = Sealer::new(engine, 1);

        assert_eq!(sealer.hashrate(), 0.0);
        assert!(sealer.submit_hashrate(100, H256::repeat_byte(0xa)));
        assert!(sealer.submit_hashrate(200, H256::repeat_byte(0xb)));
        assert!(sealer.submit_hashrate(300, H256::repeat_byte(0xc)));
        // Re-submitting under the same id replaces, not accumulates.
        assert!(sealer.submit_hashrate(300, H256::repeat_byte(0xc)));
        assert_eq!(sealer.hashrate(), 600.0);

        sealer.close();
    }

    #[test]
    fn closed_sealer_rejects_everything() {
        let engine = Arc::new(Progpow::tester());
        let sealer = Sealer::new(engine, 1);
        sealer.close();
        sealer.close();

        assert_eq!(sealer.get_work(), Err(MiningError::EngineStopped));
        assert!(!sealer.submit_hashrate(100, H256::repeat_byte(0xa)));
        assert!(!sealer.submit_work(0, H256::zero(), H256::zero()));
        let (tx, _rx) = mpsc::sync_channel(1);
        assert_eq!(
            sealer.seal(test_block(1, 100), tx),
            Err(MiningError::EngineStopped)
        );
    }
}
