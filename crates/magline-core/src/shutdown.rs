//! Caller-driven cancellation via a process-wide flag
//!
//! The harvester never checks this itself; front ends poll it between
//! records and simply stop pulling from the iterator.

use std::sync::atomic::{AtomicBool, Ordering};

/// Global shutdown flag, set by the SIGINT/SIGTERM handler
pub fn shutdown_flag() -> &'static AtomicBool {
    static FLAG: AtomicBool = AtomicBool::new(false);
    &FLAG
}

pub fn is_shutdown_requested() -> bool {
    shutdown_flag().load(Ordering::Relaxed)
}

/// Request shutdown; returns whether one had already been requested.
pub fn request_shutdown() -> bool {
    shutdown_flag().swap(true, Ordering::Relaxed)
}
