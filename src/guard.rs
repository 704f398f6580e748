//! Pass admission and staleness: a single in-flight flag plus a language
//! generation counter so results of superseded passes can be recognised.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

/// Allows at most one orchestration pass at a time. Triggers arriving while a
/// pass runs are dropped, not queued.
#[derive(Debug, Default)]
pub struct InFlight {
    busy: Arc<AtomicBool>,
}

impl InFlight {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim the slot. `None` means another pass is running.
    pub fn try_begin(&self) -> Option<InFlightGuard> {
        self.busy
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| InFlightGuard {
                busy: Arc::clone(&self.busy),
            })
    }

    pub fn is_busy(&self) -> bool {
        self.busy.load(Ordering::Acquire)
    }
}

/// Releases the slot on drop, including when the pass future is dropped mid-await.
#[derive(Debug)]
pub struct InFlightGuard {
    busy: Arc<AtomicBool>,
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.busy.store(false, Ordering::Release);
    }
}

/// Advanced on every language change.
#[derive(Debug, Default)]
pub struct LanguageGeneration {
    generation: Arc<AtomicU64>,
}

impl LanguageGeneration {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn advance(&self) -> u64 {
        self.generation.fetch_add(1, Ordering::SeqCst) + 1
    }

    pub fn current(&self) -> u64 {
        self.generation.load(Ordering::SeqCst)
    }

    pub fn guard(&self) -> GenerationGuard {
        GenerationGuard {
            generation: Arc::clone(&self.generation),
            my_generation: self.current(),
        }
    }
}

/// Checked by a pass before applying results.
#[derive(Debug, Clone)]
pub struct GenerationGuard {
    generation: Arc<AtomicU64>,
    my_generation: u64,
}

impl GenerationGuard {
    /// False once the language changed after this guard was taken.
    #[inline]
    pub fn is_current(&self) -> bool {
        self.generation.load(Ordering::SeqCst) == self.my_generation
    }

    pub fn my_generation(&self) -> u64 {
        self.my_generation
    }
}
