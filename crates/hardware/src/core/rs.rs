//! Reservation stations and the schedule queue they live in.
//!
//! Mirrors the source's `RS{tag, FU?, src[2], dest, isLongALU}` shape,
//! stored in a [`crate::handle::Slab`] instead of the original's
//! pointer-linked schedule queue (see `crate::handle` for the rationale).
//! Insertion order doubles as tag order (tags are minted monotonically at
//! dispatch time), so a plain `VecDeque` of handles gives oldest-first
//! iteration for free.

use std::collections::VecDeque;

use crate::handle::{Handle, Slab};

/// Which functional-unit class a reservation station targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RsKind {
    Fast,
    Long,
}

/// A renamed source operand: already-ready, or awaiting `tag`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SrcOperand {
    pub ready: bool,
    pub tag: u64,
}

impl SrcOperand {
    /// A source operand whose value is already committed.
    pub const READY: Self = Self { ready: true, tag: 0 };
}

/// One reservation station: the renamed form of a dispatched ALU op.
#[derive(Debug, Clone, Copy)]
pub struct Rs {
    pub tag: u64,
    pub kind: RsKind,
    pub src: [SrcOperand; 2],
    pub dest: Option<u32>,
    /// Selected by schedule this tick, to be fired into a functional unit at
    /// the start of next tick's fire-ready step.
    pub selected: bool,
}

impl Rs {
    #[must_use]
    pub fn both_ready(&self) -> bool {
        self.src[0].ready && self.src[1].ready
    }
}

/// The schedule queue: reservation stations awaiting their operands, split
/// into independent fast/long capacity halves per the sizing formula
/// (`scheduleWidth * numFastALU` / `scheduleWidth * numLongALU`).
pub struct ScheduleQueue {
    rs: Slab<Rs>,
    order: VecDeque<Handle<Rs>>,
    fast_capacity: usize,
    long_capacity: usize,
    fast_count: usize,
    long_count: usize,
}

impl ScheduleQueue {
    #[must_use]
    pub fn new(fast_capacity: usize, long_capacity: usize) -> Self {
        Self {
            rs: Slab::new(),
            order: VecDeque::new(),
            fast_capacity,
            long_capacity,
            fast_count: 0,
            long_count: 0,
        }
    }

    /// Whether there is room for one more reservation station of `kind`.
    #[must_use]
    pub fn has_room(&self, kind: RsKind) -> bool {
        match kind {
            RsKind::Fast => self.fast_count < self.fast_capacity,
            RsKind::Long => self.long_count < self.long_capacity,
        }
    }

    pub fn insert(&mut self, tag: u64, kind: RsKind, src: [SrcOperand; 2], dest: Option<u32>) -> Handle<Rs> {
        let handle = self.rs.insert(Rs { tag, kind, src, dest, selected: false });
        self.order.push_back(handle);
        match kind {
            RsKind::Fast => self.fast_count += 1,
            RsKind::Long => self.long_count += 1,
        }
        handle
    }

    pub fn remove(&mut self, handle: Handle<Rs>) {
        let rs = self.rs.remove(handle);
        self.order.retain(|&h| h != handle);
        match rs.kind {
            RsKind::Fast => self.fast_count -= 1,
            RsKind::Long => self.long_count -= 1,
        }
    }

    #[must_use]
    pub fn get(&self, handle: Handle<Rs>) -> Option<&Rs> {
        self.rs.get(handle)
    }

    #[must_use]
    pub fn get_mut(&mut self, handle: Handle<Rs>) -> Option<&mut Rs> {
        self.rs.get_mut(handle)
    }

    /// Every live handle, oldest (lowest tag) first.
    #[must_use]
    pub fn oldest_first(&self) -> Vec<Handle<Rs>> {
        self.order.iter().copied().collect()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.fast_count == 0 && self.long_count == 0
    }

    /// Wakes every source operand matching a tag visible on the CDB this tick.
    pub fn wakeup(&mut self, visible_tags: &[u64]) {
        for &handle in &self.order {
            let Some(rs) = self.rs.get_mut(handle) else { continue };
            for src in &mut rs.src {
                if !src.ready && visible_tags.contains(&src.tag) {
                    src.ready = true;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insert_respects_capacity_per_kind() {
        let mut sq = ScheduleQueue::new(1, 2);
        assert!(sq.has_room(RsKind::Fast));
        sq.insert(1, RsKind::Fast, [SrcOperand::READY; 2], None);
        assert!(!sq.has_room(RsKind::Fast));
        assert!(sq.has_room(RsKind::Long));
    }

    #[test]
    fn wakeup_marks_matching_source_ready() {
        let mut sq = ScheduleQueue::new(4, 4);
        let not_ready = SrcOperand { ready: false, tag: 9 };
        let handle = sq.insert(1, RsKind::Fast, [not_ready, SrcOperand::READY], Some(3));
        sq.wakeup(&[9]);
        assert!(sq.get(handle).unwrap().both_ready());
    }

    #[test]
    fn oldest_first_matches_insertion_order() {
        let mut sq = ScheduleQueue::new(4, 4);
        let a = sq.insert(1, RsKind::Fast, [SrcOperand::READY; 2], None);
        let b = sq.insert(2, RsKind::Fast, [SrcOperand::READY; 2], None);
        assert_eq!(sq.oldest_first(), vec![a, b]);
    }

    #[test]
    fn remove_frees_capacity() {
        let mut sq = ScheduleQueue::new(1, 1);
        let handle = sq.insert(1, RsKind::Fast, [SrcOperand::READY; 2], None);
        assert!(!sq.has_room(RsKind::Fast));
        sq.remove(handle);
        assert!(sq.has_room(RsKind::Fast));
    }
}
