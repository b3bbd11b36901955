//! Exponentially weighted hashrate meter.

use parking_lot::Mutex;
use std::time::Instant;

/// Time constant of the exponential decay, in seconds.
const TAU_SECS: f64 = 60.0;

struct MeterState {
    rate: f64,
    last_update: Instant,
}

/// Tracks a hashes-per-second rate from irregular batch samples.
///
/// Workers report attempt batches; the meter blends each batch's
/// instantaneous rate into an exponential moving average so short stalls
/// and bursts do not whipsaw the reported rate.
pub struct HashrateMeter {
    state: Mutex<MeterState>,
}

impl HashrateMeter {
    /// A meter reading zero.
    pub fn new() -> Self {
        HashrateMeter {
            state: Mutex::new(MeterState {
                rate: 0.0,
                last_update: Instant::now(),
            }),
        }
    }

    /// Record `hashes` attempts since the previous mark.
    pub fn mark(&self, hashes: u64) {
        if hashes == 0 {
            return;
        }
        let mut state = self.state.lock();
        let now = Instant::now();
        let dt = now
            .saturating_duration_since(state.last_update)
            .as_secs_f64()
            .max(1e-9);
        let instantaneous = hashes as f64 / dt;
        let alpha = 1.0 - (-dt / TAU_SECS).exp();
        state.rate += alpha * (instantaneous - state.rate);
        state.last_update = now;
    }

    /// The current smoothed rate in hashes per second.
    pub fn rate(&self) -> f64 {
        self.state.lock().rate
    }
}

impl Default for HashrateMeter {
    fn default() -> Self {
        Self::new()
    }
}
