/// Admission guard counter store.
///
/// A coarse per-client submission counter with a resetting window. This is
/// an abuse deterrent, not a security boundary: the in-memory backend is
/// best-effort, single-process state, and undercounting under true
/// concurrency is accepted. The trait exists so multi-instance deployments
/// can inject a shared backend without touching the handlers.
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

/// Outcome of one counted submission attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Decision {
    pub allowed: bool,
    /// Submissions left in the current window; zero when rejected.
    pub remaining: u32,
}

pub trait CounterStore: Send + Sync {
    /// Counts one submission for `key` and reports whether it is admitted.
    fn increment(&self, key: &str) -> Decision;

    /// Configured per-window maximum, advertised in rate-limit headers.
    fn limit(&self) -> u32;
}

/// In-memory backend: per-key count plus window start, reset once the
/// window elapses. Entries for idle keys are pruned opportunistically.
pub struct InMemoryCounterStore {
    max: u32,
    window: Duration,
    entries: Mutex<HashMap<String, (u32, Instant)>>,
}

// Prune expired entries once the map grows past this many keys.
const PRUNE_THRESHOLD: usize = 1024;

impl InMemoryCounterStore {
    pub fn new(max: u32, window: Duration) -> Self {
        Self {
            max,
            window,
            entries: Mutex::new(HashMap::new()),
        }
    }
}

impl CounterStore for InMemoryCounterStore {
    fn increment(&self, key: &str) -> Decision {
        let now = Instant::now();
        let mut entries = match self.entries.lock() {
            Ok(guard) => guard,
            // A poisoned lock only means another thread panicked mid-update;
            // the counter data is still usable for a best-effort guard.
            Err(poisoned) => poisoned.into_inner(),
        };

        if entries.len() > PRUNE_THRESHOLD {
            let window = self.window;
            entries.retain(|_, (_, start)| now.duration_since(*start) < window);
        }

        let entry = entries.entry(key.to_string()).or_insert((0, now));
        if now.duration_since(entry.1) >= self.window {
            *entry = (0, now);
        }

        entry.0 = entry.0.saturating_add(1);
        if entry.0 > self.max {
            Decision {
                allowed: false,
                remaining: 0,
            }
        } else {
            Decision {
                allowed: true,
                remaining: self.max - entry.0,
            }
        }
    }

    fn limit(&self) -> u32 {
        self.max
    }
}
