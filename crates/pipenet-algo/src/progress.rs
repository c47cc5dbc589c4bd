//! Progress hooks for long-running steps.
//!
//! Observers are called from worker threads and must be cheap; every method
//! has a no-op default so an implementation only overrides what it shows.

pub trait ProgressObserver: Send + Sync {
    /// One elimination step of the spanning-tree determinant finished.
    fn pivot(&self, _step: usize, _total: usize) {}

    /// One enumerated candidate has been priced.
    fn candidate_priced(&self, _done: usize, _total: usize) {}
}

/// Silent observer.
impl ProgressObserver for () {}
