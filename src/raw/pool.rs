//! Selection of the epoch pool a table retires its garbage into.

use crossbeam_epoch::{self, Collector, Guard};

/// Where retired bucket lists and entries go.
///
/// The default is the process-wide `crossbeam_epoch` collector, shared
/// with everything else in the process that uses epochs; garbage may then
/// outlive the table for a while. A table can instead own its collector.
/// Dropping the owned collector runs every destructor still pending, so
/// the table's memory is reclaimed no later than the table itself.
pub(crate) enum Pool {
    Global,
    Owned(Collector),
}

impl Pool {
    /// Pins the current thread, marking it active in this pool's epoch.
    ///
    /// The global pool pins through the shared thread-local handle. An
    /// owned pool registers the thread anew for each pin; that is a
    /// heavier operation, which is why owned pools are opt-in.
    pub(crate) fn pin(&self) -> Guard {
        match self {
            Pool::Global => crossbeam_epoch::pin(),
            Pool::Owned(collector) => collector.register().pin(),
        }
    }
}

impl Default for Pool {
    fn default() -> Self {
        Pool::Global
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn owned_pool_runs_deferred_destructors_on_drop() {
        use std::sync::atomic::{AtomicBool, Ordering};
        use std::sync::Arc;

        let destroyed = Arc::new(AtomicBool::new(false));
        let pool = Pool::Owned(Collector::new());
        {
            let pin = pool.pin();
            let flag = Arc::clone(&destroyed);
            pin.defer(move || flag.store(true, Ordering::SeqCst));
        }
        drop(pool);
        assert!(destroyed.load(Ordering::SeqCst));
    }
}
