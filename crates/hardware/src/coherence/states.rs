//! Per-`(processor, line)` coherence states across all five supported protocols.
//!
//! Not every protocol uses every variant — MI only ever visits
//! [`LineState::Modified`] and [`LineState::InvalidModified`], for instance.
//! A missing `(proc_num, addr)` entry in
//! [`CoherenceController`](super::CoherenceController) means INVALID; there
//! is no explicit variant for it, so absence and invalidation are the same
//! operation.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineState {
    /// Readable, held by one or more processors, clean.
    Share,
    /// Readable and writable, sole copy, clean.
    Exclusive,
    /// Readable and writable, sole copy, dirty.
    Modified,
    /// Dirty-shared provider: supplies data on a read snoop without writeback.
    Owned,
    /// The single sharer designated to supply data on a read snoop.
    Forward,
    /// Waiting for a `BUSRD` to resolve into `SHARE`.
    InvalidShared,
    /// Waiting for a `BUSRD` to resolve into `EXCLUSIVE` or `SHARE`/`FORWARD`.
    InvalidSharedExclusive,
    /// Waiting for a `BUSWR` to resolve into `MODIFIED`.
    InvalidModified,
    /// Held `SHARE`, store in flight to upgrade to `MODIFIED`.
    SharedModified,
}
