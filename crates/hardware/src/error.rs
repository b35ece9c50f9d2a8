//! Error taxonomy for the simulator.
//!
//! Per the design's error handling policy there are exactly two kinds of
//! failure: [`SimError::Config`] (fatal at init, reported and the process
//! exits non-zero) and protocol invariant violations (a snoop arriving in
//! an unsupported state, a pending request that cannot be matched, a
//! duplicate tag). The latter are bugs in the simulator, not in the
//! simulated workload, so they are not represented as a `SimError` variant
//! at all — they go through [`protocol_violation`], which panics with a
//! diagnostic rather than handing the caller a `Result` to ignore.

use thiserror::Error;

/// Top-level simulator error.
#[derive(Debug, Error)]
pub enum SimError {
    /// A configuration is missing a required value or describes an
    /// impossible hardware configuration (e.g. zero sets, zero ways).
    #[error("configuration error: {0}")]
    Config(String),
}

/// Raises a protocol-invariant violation.
///
/// These represent bugs in the simulator's bookkeeping (two requests
/// sharing a tag, a snoop landing on a state the protocol table does not
/// cover, a pending request that cannot be matched to a callback) and are
/// not recoverable conditions a caller should branch on, so this panics
/// rather than returning a `Result`, per the design's error taxonomy.
#[track_caller]
pub fn protocol_violation(msg: impl Into<String>) -> ! {
    panic!("protocol invariant violation: {}", msg.into())
}
