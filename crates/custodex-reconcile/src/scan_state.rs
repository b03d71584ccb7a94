//! Per-chain scan exclusion.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

/// Whether a scan of one chain is in flight.
#[derive(Debug, Default)]
pub struct ScanState {
    scanning: AtomicBool,
    completed: AtomicU64,
}

impl ScanState {
    #[must_use]
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Claim the chain. `None` when another scan holds it.
    #[must_use]
    pub fn try_begin(self: &Arc<Self>) -> Option<ScanGuard> {
        self.scanning
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| ScanGuard {
                state: Arc::clone(self),
            })
    }

    #[must_use]
    pub fn is_scanning(&self) -> bool {
        self.scanning.load(Ordering::Acquire)
    }

    /// Scans finished so far, successful or not.
    #[must_use]
    pub fn completed(&self) -> u64 {
        self.completed.load(Ordering::Relaxed)
    }
}

/// Releases the chain on drop, including during a panic unwind.
#[derive(Debug)]
pub struct ScanGuard {
    state: Arc<ScanState>,
}

impl Drop for ScanGuard {
    fn drop(&mut self) {
        self.state.completed.fetch_add(1, Ordering::Relaxed);
        self.state.scanning.store(false, Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_one_guard_at_a_time() {
        let state = ScanState::new();
        let guard = state.try_begin().unwrap();
        assert!(state.is_scanning());
        assert!(state.try_begin().is_none());
        drop(guard);
        assert!(!state.is_scanning());
        assert_eq!(state.completed(), 1);
        assert!(state.try_begin().is_some());
    }

    #[test]
    fn panic_releases_the_chain() {
        let state = ScanState::new();
        let inner = Arc::clone(&state);
        let result = std::thread::spawn(move || {
            let _guard = inner.try_begin().unwrap();
            panic!("scan blew up");
        })
        .join();
        assert!(result.is_err());
        assert!(!state.is_scanning());
    }
}
