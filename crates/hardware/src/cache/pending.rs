//! Pending-request bookkeeping for the cache.
//!
//! A memory request is represented as one or two [`Sub`] records — two when
//! the access straddles a block boundary — joined by a [`Join`] so the
//! caller's callback fires exactly once, after every sub-request reaches
//! `readyReq`. Each `Sub` lives on exactly one of the four queues described
//! by [`Queue`] at a time, tracked by its [`Handle`] rather than by scanning
//! for a matching `(addr, procNum)` pair.

use std::collections::VecDeque;

use crate::handle::{Handle, Slab};

/// Which of the four conceptual queues a [`Sub`] currently occupies.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Queue {
    /// Waiting for data after a `permReq`/`invlReq` deferred to the bus.
    Pend,
    /// Ready for its half of the join to fire.
    Ready,
    /// Waiting for an invalidation to resolve before re-requesting permission.
    PendPerm,
    /// Ready to re-issue `permReq`.
    ReadyPerm,
}

/// One aligned sub-request against a single cache block.
pub struct Sub {
    /// External tag this sub-request belongs to, for diagnostics.
    pub tag: u64,
    /// Block-aligned address this sub-request targets.
    pub addr: u64,
    /// Address evicted to make room for `addr`, if any.
    pub evicted_addr: Option<u64>,
    /// Requesting processor.
    pub proc_num: usize,
    /// Whether this is a load (vs. a store).
    pub is_load: bool,
    /// Which queue this sub-request currently sits on.
    pub queue: Queue,
    /// The join this sub-request reports to on completion.
    pub join: Handle<Join>,
}

/// Tracks how many sub-requests of one external request remain outstanding.
pub struct Join {
    /// External tag supplied by the caller (core).
    pub tag: u64,
    /// Requesting processor.
    pub proc_num: usize,
    /// Number of subs that have not yet reached [`Queue::Ready`] and been drained.
    pub remaining: u32,
}

/// Owns all in-flight sub-requests and their queue membership.
#[derive(Default)]
pub struct PendingState {
    subs: Slab<Sub>,
    joins: Slab<Join>,
    pend: VecDeque<Handle<Sub>>,
    ready: VecDeque<Handle<Sub>>,
    pend_perm: VecDeque<Handle<Sub>>,
    ready_perm: VecDeque<Handle<Sub>>,
}

impl PendingState {
    /// Creates an empty pending-request tracker.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a new external request with `sub_count` sub-requests (1 or 2).
    pub fn new_join(&mut self, tag: u64, proc_num: usize, sub_count: u32) -> Handle<Join> {
        self.joins.insert(Join {
            tag,
            proc_num,
            remaining: sub_count,
        })
    }

    /// Creates a sub-request and places it on `queue`.
    pub fn push_sub(
        &mut self,
        tag: u64,
        addr: u64,
        proc_num: usize,
        is_load: bool,
        join: Handle<Join>,
        queue: Queue,
    ) -> Handle<Sub> {
        let handle = self.subs.insert(Sub {
            tag,
            addr,
            evicted_addr: None,
            proc_num,
            is_load,
            queue,
            join,
        });
        self.enqueue(handle, queue);
        handle
    }

    fn enqueue(&mut self, handle: Handle<Sub>, queue: Queue) {
        match queue {
            Queue::Pend => self.pend.push_back(handle),
            Queue::Ready => self.ready.push_back(handle),
            Queue::PendPerm => self.pend_perm.push_back(handle),
            Queue::ReadyPerm => self.ready_perm.push_back(handle),
        }
    }

    /// Borrows a sub-request.
    #[must_use]
    pub fn sub(&self, handle: Handle<Sub>) -> &Sub {
        self.subs.get(handle).expect("live sub handle")
    }

    /// Mutably borrows a sub-request, e.g. to record an evicted address.
    pub fn sub_mut(&mut self, handle: Handle<Sub>) -> &mut Sub {
        self.subs.get_mut(handle).expect("live sub handle")
    }

    /// Moves a sub-request from `pendPerm` to `readyPerm`, matching by
    /// `(proc_num, evicted_addr)` — the only ambiguity left once requests
    /// are tracked by handle is picking *which* outstanding sub this
    /// callback resolves, since several subs can share an evicted address
    /// only transiently; ties are broken FIFO.
    pub fn resolve_no_action(&mut self, proc_num: usize, evicted_addr: u64) {
        Self::move_matching(
            &mut self.pend_perm,
            &mut self.ready_perm,
            &mut self.subs,
            |sub| sub.proc_num == proc_num && sub.evicted_addr == Some(evicted_addr),
            Queue::ReadyPerm,
        );
    }

    /// Moves a sub-request from `pend` to `ready`, matching by `(proc_num, addr)`.
    pub fn resolve_data_recv(&mut self, proc_num: usize, addr: u64) {
        Self::move_matching(
            &mut self.pend,
            &mut self.ready,
            &mut self.subs,
            |sub| sub.proc_num == proc_num && sub.addr == addr,
            Queue::Ready,
        );
    }

    fn move_matching(
        from: &mut VecDeque<Handle<Sub>>,
        to: &mut VecDeque<Handle<Sub>>,
        subs: &mut Slab<Sub>,
        matches: impl Fn(&Sub) -> bool,
        new_queue: Queue,
    ) {
        let pos = from
            .iter()
            .position(|&h| matches(subs.get(h).expect("live sub handle")));
        if let Some(pos) = pos {
            let handle = from.remove(pos).expect("position came from this deque");
            subs.get_mut(handle).expect("live sub handle").queue = new_queue;
            to.push_back(handle);
        }
    }

    /// Drains `readyPerm`, handing each handle to `f` which re-attempts
    /// `permReq` and returns whether permission was granted; granted subs
    /// move to `ready`, others to `pend`.
    pub fn drain_ready_perm(&mut self, mut f: impl FnMut(&Sub) -> bool) {
        let handles: Vec<_> = self.ready_perm.drain(..).collect();
        for handle in handles {
            let granted = f(self.subs.get(handle).expect("live sub handle"));
            let queue = if granted { Queue::Ready } else { Queue::Pend };
            self.subs.get_mut(handle).expect("live sub handle").queue = queue;
            self.enqueue(handle, queue);
        }
    }

    /// Drains `ready` in FIFO order, decrementing each sub's join and
    /// returning `(tag, proc_num)` for every join that reaches zero —
    /// i.e. every external request whose callback should now fire.
    pub fn drain_ready(&mut self) -> Vec<(u64, usize)> {
        let mut completions = Vec::new();
        while let Some(handle) = self.ready.pop_front() {
            let sub = self.subs.remove(handle);
            let join = self.joins.get_mut(sub.join).expect("live join handle");
            join.remaining -= 1;
            if join.remaining == 0 {
                completions.push((join.tag, join.proc_num));
                self.joins.remove(sub.join);
            }
        }
        completions
    }

    /// Whether a `pend` sub matching `(proc_num, addr)` is a store, so the
    /// cache knows to mark the line dirty once [`PendingState::resolve_data_recv`]
    /// fires for it.
    #[must_use]
    pub fn pend_is_store(&self, proc_num: usize, addr: u64) -> bool {
        self.pend.iter().any(|&h| {
            let sub = self.subs.get(h).expect("live sub handle");
            sub.proc_num == proc_num && sub.addr == addr && !sub.is_load
        })
    }

    /// Total sub-requests currently tracked across all four queues —
    /// exposed for the "exactly one queue" invariant check in tests.
    #[must_use]
    pub fn live_sub_count(&self) -> usize {
        self.subs.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_sub_request_fires_once_ready() {
        let mut state = PendingState::new();
        let join = state.new_join(42, 0, 1);
        state.push_sub(42, 0x100, 0, true, join, Queue::Ready);
        let completions = state.drain_ready();
        assert_eq!(completions, vec![(42, 0)]);
        assert_eq!(state.live_sub_count(), 0);
    }

    #[test]
    fn split_request_fires_only_after_both_subs_ready() {
        let mut state = PendingState::new();
        let join = state.new_join(7, 1, 2);
        state.push_sub(7, 0x0, 1, true, join, Queue::Pend);
        state.push_sub(7, 0x10, 1, true, join, Queue::Ready);
        assert!(state.drain_ready().is_empty());
        state.resolve_data_recv(1, 0x0);
        let completions = state.drain_ready();
        assert_eq!(completions, vec![(7, 1)]);
    }

    #[test]
    fn no_action_moves_matching_sub_to_ready_perm() {
        let mut state = PendingState::new();
        let join = state.new_join(1, 0, 1);
        let handle = state.push_sub(1, 0x40, 0, false, join, Queue::PendPerm);
        state.sub_mut(handle).evicted_addr = Some(0x20);
        state.resolve_no_action(0, 0x20);
        assert_eq!(state.sub(handle).queue, Queue::ReadyPerm);
    }
}
