#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use eventgate::Handler;
use tracing_subscriber::EnvFilter;

/// Route library logs to the test harness. Honors `RUST_LOG`.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// A handler that counts its invocations.
pub fn counting_handler() -> (Arc<AtomicUsize>, Handler) {
    let hits = Arc::new(AtomicUsize::new(0));
    let hits_clone = Arc::clone(&hits);
    let handler = Handler::new(move || {
        hits_clone.fetch_add(1, Ordering::SeqCst);
    });
    (hits, handler)
}

pub fn hits(counter: &AtomicUsize) -> usize {
    counter.load(Ordering::SeqCst)
}
