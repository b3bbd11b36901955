//! Shared per-epoch artifact manager.
//!
//! Caches and datasets are pure functions of the epoch, expensive to
//! build, and shared by every verifier and sealing worker in the
//! process. The manager keeps a small LRU of `Arc` handles per artifact
//! kind with single-flight construction: the first caller for an epoch
//! builds, concurrent callers block on the same cell, and later callers
//! get the finished artifact. Eviction drops only the manager's handle,
//! so artifacts stay alive while any kernel call still holds one.

use once_cell::sync::OnceCell;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use tracing::{debug, warn};

use crate::cache::generate_cache;
use crate::dataset::{generate_cdag, generate_dataset};
use crate::kernel::PROGPOW_CACHE_WORDS;
use crate::params;

/// Live epochs retained per artifact kind, plus room for prefetched
/// future epochs.
const DEFAULT_CACHES_IN_MEM: usize = 5;
const DEFAULT_DATASETS_IN_MEM: usize = 3;

/// An epoch cache plus its lazily materialised cDag.
///
/// Construction happens on first access through [`Cache::words`]; the
/// struct itself is a cheap placeholder that can sit in the LRU while a
/// build is in flight.
pub struct Cache {
    epoch: u64,
    size: usize,
    words: OnceCell<Vec<u32>>,
    cdag: OnceCell<Vec<u32>>,
}

impl Cache {
    fn new(epoch: u64, size: usize) -> Self {
        Cache {
            epoch,
            size,
            words: OnceCell::new(),
            cdag: OnceCell::new(),
        }
    }

    /// Epoch this cache belongs to.
    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    /// The cache words, building them on first use (single-flight:
    /// concurrent callers block until the winning builder finishes).
    pub fn words(&self) -> &[u32] {
        self.words.get_or_init(|| {
            let mut words = vec![0u32; self.size / 4];
            generate_cache(&mut words, self.epoch, &params::seed_hash(self.epoch));
            words
        })
    }

    /// The 16 KiB cDag derived from this cache.
    pub fn c_dag(&self) -> &[u32] {
        self.cdag.get_or_init(|| {
            let mut cdag = vec![0u32; PROGPOW_CACHE_WORDS];
            generate_cdag(&mut cdag, self.words(), self.epoch);
            cdag
        })
    }
}

/// A full epoch dataset.
///
/// Generation can run in the background; [`Dataset::generated`] lets the
/// engine use the full path opportunistically and fall back to the light
/// path instead of blocking on a multi-minute build.
pub struct Dataset {
    epoch: u64,
    size: usize,
    words: OnceCell<Vec<u32>>,
    pending: AtomicBool,
}

impl Dataset {
    fn new(epoch: u64, size: usize) -> Self {
        Dataset {
            epoch,
            size,
            words: OnceCell::new(),
            pending: AtomicBool::new(false),
        }
    }

    /// Epoch this dataset belongs to.
    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    /// Dataset size in bytes.
    pub fn size(&self) -> usize {
        self.size
    }

    /// Whether generation has finished. Never blocks.
    pub fn generated(&self) -> bool {
        self.words.get().is_some()
    }

    /// The dataset words if generation has finished. Never blocks.
    pub fn words(&self) -> Option<&[u32]> {
        self.words.get().map(Vec::as_slice)
    }

    /// Build the dataset from `cache`, blocking until done. Concurrent
    /// callers for the same epoch share one build.
    pub fn generate(&self, cache: &Cache) -> &[u32] {
        self.words.get_or_init(|| {
            let mut words = vec![0u32; self.size / 4];
            generate_dataset(&mut words, cache.words(), self.epoch);
            words
        })
    }
}

struct Lru<T> {
    cap: usize,
    entries: HashMap<u64, Arc<T>>,
    // Most recently used last.
    recency: Vec<u64>,
}

impl<T> Lru<T> {
    fn new(cap: usize) -> Self {
        Lru {
            cap,
            entries: HashMap::new(),
            recency: Vec::new(),
        }
    }

    fn get(&mut self, epoch: u64) -> Option<Arc<T>> {
        let entry = self.entries.get(&epoch).cloned()?;
        self.touch(epoch);
        Some(entry)
    }

    fn insert(&mut self, epoch: u64, entry: Arc<T>) {
        self.entries.insert(epoch, entry);
        self.touch(epoch);
        while self.entries.len() > self.cap {
            let evicted = self.recency.remove(0);
            self.entries.remove(&evicted);
            debug!(epoch = evicted, "Evicted epoch artifact");
        }
    }

    fn touch(&mut self, epoch: u64) {
        self.recency.retain(|&e| e != epoch);
        self.recency.push(epoch);
    }
}

struct Inner {
    caches: Mutex<Lru<Cache>>,
    datasets: Mutex<Lru<Dataset>>,
    test: bool,
}

/// Owner of the per-epoch caches and datasets for one engine instance.
#[derive(Clone)]
pub struct EpochManager {
    inner: Arc<Inner>,
}

impl EpochManager {
    /// Manager with production sizing.
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CACHES_IN_MEM, DEFAULT_DATASETS_IN_MEM)
    }

    /// Manager with explicit LRU bounds.
    pub fn with_capacity(caches_in_mem: usize, datasets_in_mem: usize) -> Self {
        EpochManager {
            inner: Arc::new(Inner {
                caches: Mutex::new(Lru::new(caches_in_mem.max(1))),
                datasets: Mutex::new(Lru::new(datasets_in_mem.max(1))),
                test: false,
            }),
        }
    }

    /// Manager using the tiny test-mode sizes.
    pub fn for_tests() -> Self {
        EpochManager {
            inner: Arc::new(Inner {
                caches: Mutex::new(Lru::new(DEFAULT_CACHES_IN_MEM)),
                datasets: Mutex::new(Lru::new(DEFAULT_DATASETS_IN_MEM)),
                test: true,
            }),
        }
    }

    /// Whether this manager uses test-mode sizes.
    pub fn is_test(&self) -> bool {
        self.inner.test
    }

    /// Dataset size in bytes for a block under this manager's sizing.
    pub fn dataset_bytes_for_block(&self, block_number: u64) -> usize {
        if self.inner.test {
            params::TEST_DATASET_BYTES
        } else {
            params::dataset_size(params::epoch(block_number))
        }
    }

    fn cache_bytes(&self, epoch: u64) -> usize {
        if self.inner.test {
            params::TEST_CACHE_BYTES
        } else {
            params::cache_size(epoch)
        }
    }

    fn dataset_bytes(&self, epoch: u64) -> usize {
        if self.inner.test {
            params::TEST_DATASET_BYTES
        } else {
            params::dataset_size(epoch)
        }
    }

    /// Fetch the cache for an epoch, building it if needed (blocking).
    ///
    /// A miss also queues a background build of the next epoch's cache so
    /// the epoch rollover does not stall verification.
    pub fn cache(&self, epoch: u64) -> Arc<Cache> {
        let (entry, miss) = {
            let mut caches = self.inner.caches.lock();
            match caches.get(epoch) {
                Some(entry) => (entry, false),
                None => {
                    let entry = Arc::new(Cache::new(epoch, self.cache_bytes(epoch)));
                    caches.insert(epoch, entry.clone());
                    (entry, true)
                }
            }
        };
        if miss {
            self.prefetch_cache(epoch + 1);
        }
        entry.words();
        entry
    }

    /// Fetch the dataset for an epoch.
    ///
    /// With `asynchronous`, generation runs on a background thread and the
    /// returned handle reports readiness through [`Dataset::generated`];
    /// otherwise the call blocks until the dataset is built. Either way a
    /// follow-up build for the next epoch is queued in the background.
    pub fn dataset(&self, epoch: u64, asynchronous: bool) -> Arc<Dataset> {
        let entry = self.dataset_entry(epoch);
        if asynchronous {
            self.spawn_dataset_build(epoch, entry.clone());
            self.spawn_dataset_build(epoch + 1, self.dataset_entry(epoch + 1));
        } else {
            entry.generate(&self.cache(epoch));
        }
        entry
    }

    fn dataset_entry(&self, epoch: u64) -> Arc<Dataset> {
        let mut datasets = self.inner.datasets.lock();
        match datasets.get(epoch) {
            Some(entry) => entry,
            None => {
                let entry = Arc::new(Dataset::new(epoch, self.dataset_bytes(epoch)));
                datasets.insert(epoch, entry.clone());
                entry
            }
        }
    }

    fn prefetch_cache(&self, epoch: u64) {
        let entry = {
            let mut caches = self.inner.caches.lock();
            if caches.get(epoch).is_some() {
                return;
            }
            let entry = Arc::new(Cache::new(epoch, self.cache_bytes(epoch)));
            caches.insert(epoch, entry.clone());
            entry
        };
        let spawned = thread::Builder::new()
            .name(format!("flux-cache-gen-{epoch}"))
            .spawn(move || {
                entry.words();
            });
        if let Err(err) = spawned {
            warn!(epoch, %err, "Failed to spawn cache prefetch thread");
        }
    }

    fn spawn_dataset_build(&self, epoch: u64, entry: Arc<Dataset>) {
        if entry.generated() || entry.pending.swap(true, Ordering::SeqCst) {
            return;
        }
        let manager = self.clone();
        let thread_entry = entry.clone();
        let spawned = thread::Builder::new()
            .name(format!("flux-dag-gen-{epoch}"))
            .spawn(move || {
                let cache = manager.cache(epoch);
                thread_entry.generate(&cache);
            });
        if let Err(err) = spawned {
            entry.pending.store(false, Ordering::SeqCst);
            warn!(epoch, %err, "Failed to spawn dataset build thread");
        }
    }
}

impl Default for EpochManager {
    fn default() -> Self {
        Self::new()
    }
}
