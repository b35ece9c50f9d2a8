//! Snoop-based cache coherence: MI, MSI, MESI, MOESI, and MESIF.
//!
//! One [`CoherenceController`] is shared by the whole machine; it holds
//! per-`(proc_num, addr)` line state and dispatches to whichever
//! [`Protocol`](crate::config::Protocol) transition table the run was
//! configured with. A [`Cache`](crate::cache::Cache) calls
//! [`CoherenceLike::perm_req`] before it may read or write a line and
//! [`CoherenceLike::invl_req`] when it silently drops a line to make room.
//! The interconnect calls the `on_*` methods as bus transactions complete;
//! the cache picks up the result on its next
//! [`tick`](crate::cache::CacheLike::tick) via [`CoherenceLike::poll_actions`].

mod protocol;
mod states;

use std::collections::{HashMap, VecDeque};

use crate::config::Protocol;
use crate::interconnect::Interconnect;
pub use protocol::MsgKind;
pub use states::LineState;

/// What a cache should do in response to a resolved coherence event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheAction {
    /// A deferred self-eviction writeback resolved; no data involved.
    NoAction,
    /// Data (or permission) has arrived for a previously deferred request.
    DataRecv,
    /// Another processor's request requires this line to be invalidated.
    Invalidate,
}

/// Capability a cache needs from whatever tracks coherence state.
pub trait CoherenceLike {
    /// Requests permission to load (or store, if `is_load` is false) `addr`.
    /// Returns `true` if permission is already held and no bus transaction
    /// is needed; otherwise a bus request has been issued and the result
    /// will surface later through [`CoherenceLike::poll_actions`].
    fn perm_req(&mut self, interconnect: &mut Interconnect, is_load: bool, addr: u64, proc_num: usize) -> bool;

    /// Informs the controller that `proc_num` is silently dropping `addr`
    /// (e.g. a victim-buffer capacity eviction). Returns `true` if this
    /// resolves immediately (the line was clean) or `false` if a writeback
    /// must complete first.
    fn invl_req(&mut self, interconnect: &mut Interconnect, addr: u64, proc_num: usize) -> bool;

    /// Drains resolved coherence events for `proc_num` since the last poll.
    fn poll_actions(&mut self, proc_num: usize) -> Vec<(CacheAction, u64)>;
}

/// Shared coherence directory for every cache in the machine.
pub struct CoherenceController {
    protocol: Protocol,
    states: HashMap<(usize, u64), LineState>,
    actions: HashMap<usize, VecDeque<(CacheAction, u64)>>,
    perm_immediate: u64,
    perm_deferred: u64,
    snoop_invalidations: u64,
}

impl CoherenceController {
    /// Builds an empty directory for `num_processors` caches running `protocol`.
    #[must_use]
    pub fn new(protocol: Protocol, num_processors: usize) -> Self {
        let mut actions = HashMap::new();
        for p in 0..num_processors {
            actions.insert(p, VecDeque::new());
        }
        Self {
            protocol,
            states: HashMap::new(),
            actions,
            perm_immediate: 0,
            perm_deferred: 0,
            snoop_invalidations: 0,
        }
    }

    /// Cumulative `(perm_immediate, perm_deferred, snoop_invalidations)`
    /// since this controller was created, for [`crate::stats::SimStats`].
    #[must_use]
    pub fn stats(&self) -> (u64, u64, u64) {
        (self.perm_immediate, self.perm_deferred, self.snoop_invalidations)
    }

    fn state(&self, proc_num: usize, addr: u64) -> Option<LineState> {
        self.states.get(&(proc_num, addr)).copied()
    }

    /// Test-only peek at a cache's tracked line state.
    #[cfg(test)]
    pub(crate) fn state_for_test(&self, proc_num: usize, addr: u64) -> Option<LineState> {
        self.state(proc_num, addr)
    }

    fn set_state(&mut self, proc_num: usize, addr: u64, state: Option<LineState>) {
        match state {
            Some(s) => {
                self.states.insert((proc_num, addr), s);
            }
            None => {
                self.states.remove(&(proc_num, addr));
            }
        }
    }

    fn push_action(&mut self, proc_num: usize, action: CacheAction, addr: u64) {
        self.actions.entry(proc_num).or_default().push_back((action, addr));
    }

    /// Called by the interconnect for every processor but the requester
    /// during a transaction's snoop phase. Returns the response message, if
    /// any, this processor contributes toward the requester's final
    /// notification.
    pub(crate) fn on_snoop(&mut self, proc_num: usize, req: MsgKind, addr: u64) -> Option<MsgKind> {
        let state = self.state(proc_num, addr);
        if state.is_none() {
            // Doesn't hold the line: nothing to invalidate or supply, but
            // the interconnect still needs this processor's ack to count
            // the broadcast complete.
            return Some(MsgKind::Ack);
        }
        let outcome = protocol::snoop_outcome(self.protocol, req, state);
        self.set_state(proc_num, addr, outcome.new_state);
        if outcome.action == CacheAction::Invalidate {
            self.snoop_invalidations += 1;
        }
        if outcome.action == CacheAction::Invalidate || outcome.action == CacheAction::DataRecv {
            self.push_action(proc_num, outcome.action, addr);
        }
        outcome.response
    }

    /// Called by the interconnect once a transaction fully resolves, with
    /// `final_kind` being whatever [`Interconnect`] collapsed the snoop
    /// responses into (see its arbitration logic for the exact rule).
    pub(crate) fn on_complete(&mut self, proc_num: usize, addr: u64, final_kind: MsgKind) {
        let state = self.state(proc_num, addr);
        let outcome = protocol::snoop_outcome(self.protocol, final_kind, state);
        self.set_state(proc_num, addr, outcome.new_state.or(state));
        self.push_action(proc_num, CacheAction::DataRecv, addr);
    }

    /// Called by the interconnect once a self-eviction writeback completes.
    pub(crate) fn on_invl_complete(&mut self, proc_num: usize, addr: u64) {
        self.set_state(proc_num, addr, None);
        self.push_action(proc_num, CacheAction::NoAction, addr);
    }
}

impl CoherenceLike for CoherenceController {
    fn perm_req(&mut self, interconnect: &mut Interconnect, is_load: bool, addr: u64, proc_num: usize) -> bool {
        let state = self.state(proc_num, addr);
        let outcome = protocol::cache_outcome(self.protocol, is_load, state);
        self.set_state(proc_num, addr, outcome.new_state);
        if outcome.perm_avail {
            self.perm_immediate += 1;
            return true;
        }
        self.perm_deferred += 1;
        if let Some(request) = outcome.request {
            interconnect.issue(request, addr, proc_num);
        }
        false
    }

    fn invl_req(&mut self, interconnect: &mut Interconnect, addr: u64, proc_num: usize) -> bool {
        match self.state(proc_num, addr) {
            Some(LineState::Modified) | Some(LineState::Owned) => {
                interconnect.issue_writeback(addr, proc_num);
                false
            }
            _ => {
                self.set_state(proc_num, addr, None);
                true
            }
        }
    }

    fn poll_actions(&mut self, proc_num: usize) -> Vec<(CacheAction, u64)> {
        self.actions.entry(proc_num).or_default().drain(..).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Topology;

    fn harness(protocol: Protocol, n: usize) -> (CoherenceController, Interconnect) {
        (CoherenceController::new(protocol, n), Interconnect::new(Topology::Bus, n, 2, 2, 2))
    }

    #[test]
    fn perm_req_grants_immediately_once_line_is_modified() {
        let (mut coherence, mut interconnect) = harness(Protocol::Msi, 1);
        coherence.set_state(0, 0x40, Some(LineState::Modified));
        assert!(coherence.perm_req(&mut interconnect, true, 0x40, 0));
    }

    #[test]
    fn perm_req_defers_and_issues_a_bus_request_on_a_cold_line() {
        let (mut coherence, mut interconnect) = harness(Protocol::Msi, 2);
        let granted = coherence.perm_req(&mut interconnect, true, 0x40, 0);
        assert!(!granted);
        assert_eq!(coherence.state(0, 0x40), Some(LineState::InvalidShared));
    }

    #[test]
    fn invl_req_resolves_immediately_for_a_clean_line() {
        let (mut coherence, mut interconnect) = harness(Protocol::Msi, 1);
        coherence.set_state(0, 0x40, Some(LineState::Share));
        assert!(coherence.invl_req(&mut interconnect, 0x40, 0));
        assert_eq!(coherence.state(0, 0x40), None);
    }

    #[test]
    fn invl_req_defers_for_a_dirty_line() {
        let (mut coherence, mut interconnect) = harness(Protocol::Msi, 1);
        coherence.set_state(0, 0x40, Some(LineState::Modified));
        assert!(!coherence.invl_req(&mut interconnect, 0x40, 0));
    }
}
