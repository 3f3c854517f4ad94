//! RAII guard decrementing the unauthenticated-connection counter on drop,
//! so a peer that disconnects mid-handshake always frees its slot.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

pub struct UnauthGuard {
    counter: Arc<AtomicUsize>,
}

impl UnauthGuard {
    pub fn new(counter: Arc<AtomicUsize>) -> Self {
        counter.fetch_add(1, Ordering::Relaxed);
        UnauthGuard { counter }
    }
}

impl Drop for UnauthGuard {
    fn drop(&mut self) {
        self.counter.fetch_sub(1, Ordering::Relaxed);
    }
}
