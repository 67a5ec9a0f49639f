use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Process-wide stop request shared by the acquisition and tick loops.
/// Each loop checks it at the top of every iteration.
#[derive(Debug, Clone, Default)]
pub struct Shutdown {
    flag: Arc<AtomicBool>,
}

impl Shutdown {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn trigger(&self) {
        self.flag.store(true, Ordering::Release);
    }

    pub fn is_triggered(&self) -> bool {
        self.flag.load(Ordering::Acquire)
    }
}
