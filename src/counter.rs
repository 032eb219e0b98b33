//! Lock-free invocation counter shared between a [`Job`](crate::job::Job) and its workers.
use std::sync::{
    Arc,
    atomic::{AtomicU64, Ordering},
};

/// A monotonic 64-bit tally, incremented once per completed runner invocation.
///
/// Increments use [`Ordering::Relaxed`]: the [`Sampler`](crate::sampler) tolerates any
/// skew between workers because it computes deltas over intervals many orders of
/// magnitude longer than a single increment. Wraparound is not defended against; a
/// benchmark would need to sustain more than 2^63 iterations per second to overflow
/// within any realistic sample window.
#[derive(Debug, Default)]
pub struct Counter(AtomicU64);

impl Counter {
    /// Creates a new counter starting at zero.
    pub fn new() -> Self {
        Self(AtomicU64::new(0))
    }

    /// Increments the counter by one.
    pub fn increment(&self) {
        self.0.fetch_add(1, Ordering::Relaxed);
    }

    /// Reads the current value.
    pub fn get(&self) -> u64 {
        self.0.load(Ordering::Relaxed)
    }
}

/// A shareable, read-only handle to a [`Counter`].
///
/// Cloning a handle is cheap ([`Arc`] clone); every clone observes the same
/// underlying atomic.
#[derive(Debug, Clone)]
pub struct CounterHandle(Arc<Counter>);

impl CounterHandle {
    pub(crate) fn new(counter: Arc<Counter>) -> Self {
        Self(counter)
    }

    /// Reads the current counter value.
    pub fn get(&self) -> u64 {
        self.0.get()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn increments_are_visible_through_handle() {
        let counter = Arc::new(Counter::new());
        let handle = CounterHandle::new(counter.clone());
        assert_eq!(handle.get(), 0);
        counter.increment();
        counter.increment();
        assert_eq!(handle.get(), 2);
    }
}
