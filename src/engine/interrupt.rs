use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, LazyLock};

static GLOBAL: LazyLock<Interrupt> = LazyLock::new(Interrupt::new);

/// A latch recording that the user asked the build to stop.
///
/// Executors check it before starting any unit of work and refuse to start
/// new work once it is triggered. Work already running is left alone.
#[derive(Debug, Clone, Default)]
pub struct Interrupt(Arc<AtomicBool>);

impl Interrupt {
    pub fn new() -> Self {
        Self::default()
    }

    /// The process-wide latch, meant to be triggered from a signal handler.
    pub fn global() -> Self {
        GLOBAL.clone()
    }

    pub fn trigger(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_triggered(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    pub fn reset(&self) {
        self.0.store(false, Ordering::SeqCst);
    }
}
