//! Typed errors for the batching and offload layer.
//!
//! Invariant violations (counter underflow, serialize accounting mismatches)
//! are logic bugs and panic instead; only genuinely recoverable conditions
//! get an error variant here.

use std::fmt;

/// Errors arising while assembling or dispatching an offload request.
#[derive(Debug)]
pub enum OffloadError {
    /// Every transfer buffer is in flight and the pool's cap forbids
    /// allocating another.
    TransferExhausted {
        /// Buffers currently owned by outstanding requests.
        in_flight: usize,
        /// Configured cap.
        cap: usize,
    },
    /// Walk configuration failed to load or validate.
    Config(String),
}

impl fmt::Display for OffloadError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::TransferExhausted { in_flight, cap } => write!(
                f,
                "transfer pool exhausted: {in_flight} buffers in flight (cap {cap})"
            ),
            Self::Config(msg) => write!(f, "walk configuration error: {msg}"),
        }
    }
}

impl std::error::Error for OffloadError {}
