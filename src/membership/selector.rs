// Peer Selector - The single source of randomness for target selection
//
// Rounds ask a selector for an index instead of calling the RNG directly,
// so tests can swap in a deterministic one.

use rand::Rng;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Picks an index into a pool of candidates
pub trait PeerSelector: Send + Sync {
    /// Return an index in `0..len`. Only called with `len >= 2`.
    fn pick(&self, len: usize) -> usize;
}

/// Choose one element of `pool`
///
/// A pool of one is answered without consulting the selector.
pub fn select_one<'a, T>(selector: &dyn PeerSelector, pool: &'a [T]) -> Option<&'a T> {
    match pool.len() {
        0 => None,
        1 => pool.first(),
        len => pool.get(selector.pick(len) % len),
    }
}

/// Uniform random selection
#[derive(Clone, Copy, Debug, Default)]
pub struct RandomSelector;

impl PeerSelector for RandomSelector {
    fn pick(&self, len: usize) -> usize {
        rand::thread_rng().gen_range(0..len)
    }
}

/// Deterministic selector that always answers the same index
#[derive(Debug, Default)]
pub struct FixedSelector {
    index: usize,
    calls: AtomicUsize,
}

impl FixedSelector {
    pub fn new(index: usize) -> Self {
        Self {
            index,
            calls: AtomicUsize::new(0),
        }
    }

    /// How many times `pick` ran
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl PeerSelector for FixedSelector {
    fn pick(&self, _len: usize) -> usize {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.index
    }
}
