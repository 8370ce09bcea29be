use std::sync::atomic::{AtomicU64, Ordering};

/// Source of event sequence numbers
///
/// The default is process-wide. A cluster-wide counter can be plugged in so
/// the ordering of dispatched events is observable across nodes.
pub trait SequenceGenerator: Send + Sync {
    fn next(&self) -> u64;
}

/// In-process monotonic counter starting at 1
#[derive(Debug, Default)]
pub struct LocalSequence {
    counter: AtomicU64,
}

impl LocalSequence {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SequenceGenerator for LocalSequence {
    fn next(&self) -> u64 {
        self.counter.fetch_add(1, Ordering::Relaxed) + 1
    }
}
