//! Set-associative data cache with an optional victim buffer, LRU/RRIP
//! replacement, and unaligned-access splitting.
//!
//! One [`Cache`] exists per processor core. Its two entry points mirror the
//! two interfaces every component in this simulator presents: a
//! synchronous request call ([`Cache::memory_request`]) and a per-tick
//! advance ([`Cache::tick`]) that drains deferred work and returns
//! completions for the core to apply.

pub mod pending;
pub mod policies;

use crate::coherence::{CacheAction, CoherenceLike};
use crate::interconnect::Interconnect;
use crate::trace::TraceKind;
use pending::{PendingState, Queue};
use policies::Policy;

/// One way within a set, or a victim-buffer entry (same shape, wider tag).
#[derive(Debug, Clone, Copy, Default)]
struct Line {
    valid: bool,
    dirty: bool,
    tag: u64,
    addr: u64,
    owner_proc: usize,
    timestamp: u64,
}

/// `(proc_num, tag)` handed back to the caller when a request completes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Completion {
    /// The processor that issued the original request.
    pub proc_num: usize,
    /// The external tag supplied at `memory_request` time.
    pub tag: u64,
}

/// Capability this cache exposes to whatever drives its per-tick advance.
pub trait CacheLike {
    /// Advances the cache by one tick, applying any queued coherence
    /// actions first and returning completions ready to deliver.
    fn tick(&mut self, coherence: &mut impl CoherenceLike, interconnect: &mut Interconnect) -> Vec<Completion>;
}

/// A set-associative cache for one processor.
pub struct Cache {
    proc_num: usize,
    set_bits: u32,
    block_bits: u32,
    ways: usize,
    sets: Vec<Vec<Line>>,
    victim: Vec<Line>,
    victim_capacity: usize,
    policy: Policy,
    access_counter: u64,
    victim_counter: u64,
    pending: PendingState,
    hits: u64,
    misses: u64,
    victim_hits: u64,
    victim_insertions: u64,
}

impl Cache {
    /// Builds an empty cache for `proc_num`.
    ///
    /// # Panics
    ///
    /// Panics if `ways` is zero.
    #[must_use]
    pub fn new(
        proc_num: usize,
        set_bits: u32,
        ways: usize,
        block_bits: u32,
        victim_capacity: usize,
        policy: Policy,
    ) -> Self {
        assert!(ways > 0, "a cache set needs at least one way");
        let num_sets = 1usize << set_bits;
        Self {
            proc_num,
            set_bits,
            block_bits,
            ways,
            sets: vec![vec![Line::default(); ways]; num_sets],
            victim: vec![Line::default(); victim_capacity],
            victim_capacity,
            policy,
            access_counter: 0,
            victim_counter: 0,
            pending: PendingState::new(),
            hits: 0,
            misses: 0,
            victim_hits: 0,
            victim_insertions: 0,
        }
    }

    /// Cumulative `(hits, misses, victim_hits, victim_insertions)` since
    /// this cache was created, for [`crate::stats::SimStats`] reporting.
    #[must_use]
    pub fn stats(&self) -> (u64, u64, u64, u64) {
        (self.hits, self.misses, self.victim_hits, self.victim_insertions)
    }

    fn get_set(&self, addr: u64) -> usize {
        let mask = (1u64 << self.set_bits) - 1;
        ((addr >> self.block_bits) & mask) as usize
    }

    fn get_tag(&self, addr: u64) -> u64 {
        addr >> (self.block_bits + self.set_bits)
    }

    fn get_victim_tag(&self, addr: u64) -> u64 {
        addr >> self.block_bits
    }

    fn find_in_victim(&self, addr: u64) -> Option<usize> {
        let tag = self.get_victim_tag(addr);
        self.victim
            .iter()
            .position(|line| line.valid && line.tag == tag)
    }

    /// Places `line` (a way just evicted from the main set) into the victim
    /// buffer. `is_swap` is true when this eviction is the counterpart of a
    /// victim-buffer recovery — in that case the caller's request has
    /// already been satisfied and no permission bookkeeping is needed here.
    ///
    /// Returns `Some(evicted)` when the victim buffer itself was full and
    /// had to evict its own LRU entry to make room.
    fn place_in_victim(&mut self, line: Line, is_swap: bool) -> Option<Line> {
        self.victim_insertions += 1;
        let tag = self.get_victim_tag(line.addr);
        if let Some(idx) = self.victim.iter().position(|v| !v.valid) {
            self.victim[idx] = Line {
                valid: true,
                tag,
                timestamp: self.victim_counter,
                ..line
            };
            self.victim_counter += 1;
            return None;
        }
        assert!(
            !is_swap,
            "victim-buffer recovery must always free a slot before swapping in"
        );
        let evict_idx = self
            .victim
            .iter()
            .enumerate()
            .min_by_key(|&(_, v)| v.timestamp)
            .map(|(i, _)| i)
            .expect("victim buffer has nonzero capacity when this path is reached");
        let evicted = self.victim[evict_idx];
        self.victim[evict_idx] = Line {
            valid: true,
            tag,
            timestamp: self.victim_counter,
            ..line
        };
        self.victim_counter += 1;
        Some(evicted)
    }

    /// Non-blocking request entry point. Splits an access that straddles a
    /// block boundary into two sub-requests sharing one join; the caller's
    /// completion is reported via [`Cache::tick`] only after every
    /// sub-request is ready.
    pub fn memory_request(
        &mut self,
        coherence: &mut impl CoherenceLike,
        interconnect: &mut Interconnect,
        kind: TraceKind,
        mem_address: u64,
        size: u32,
        tag: u64,
    ) {
        let is_load = kind == TraceKind::MemLoad;
        let block_size = 1u64 << self.block_bits;
        let mask = block_size - 1;
        let straddles = (mem_address & mask) != 0 && (mem_address & mask) + u64::from(size) > block_size;
        if straddles {
            let addr1 = mem_address & !mask;
            let addr2 = addr1 + block_size;
            let join = self.pending.new_join(tag, self.proc_num, 2);
            self.cache_request(coherence, interconnect, addr1, is_load, tag, join);
            self.cache_request(coherence, interconnect, addr2, is_load, tag, join);
        } else {
            let addr = mem_address & !mask;
            let join = self.pending.new_join(tag, self.proc_num, 1);
            self.cache_request(coherence, interconnect, addr, is_load, tag, join);
        }
    }

    fn cache_request(
        &mut self,
        coherence: &mut impl CoherenceLike,
        interconnect: &mut Interconnect,
        addr: u64,
        is_load: bool,
        tag: u64,
        join: crate::handle::Handle<pending::Join>,
    ) {
        let proc_num = self.proc_num;
        let set_idx = self.get_set(addr);
        let cache_tag = self.get_tag(addr);

        if let Some(way) = self.sets[set_idx]
            .iter()
            .position(|l| l.valid && l.tag == cache_tag)
        {
            self.sets[set_idx][way].timestamp = self.policy.hit_timestamp(self.access_counter);
            self.access_counter += 1;
            self.hits += 1;
            // A data hit is not necessarily a permission hit: a store to a
            // line held SHARE still needs a BUSWR upgrade before it may be
            // marked dirty, so every access consults the coherence
            // controller even when the block is already resident.
            let granted = coherence.perm_req(interconnect, is_load, addr, proc_num);
            if granted && !is_load {
                self.sets[set_idx][way].dirty = true;
            }
            let queue = if granted { Queue::Ready } else { Queue::Pend };
            self.pending
                .push_sub(tag, addr, proc_num, is_load, join, queue);
            return;
        }
        self.misses += 1;

        // Miss: first try the victim buffer.
        let mut found_in_victim = false;
        if self.victim_capacity > 0 {
            if let Some(idx) = self.find_in_victim(addr) {
                self.victim[idx].valid = false;
                found_in_victim = true;
                self.victim_hits += 1;
                self.pending
                    .push_sub(tag, addr, proc_num, is_load, join, Queue::Ready);
            }
        }

        if let Some(way) = self.sets[set_idx].iter().position(|l| !l.valid) {
            assert!(
                !found_in_victim,
                "a victim-buffer hit must never coincide with a free way in the same set"
            );
            self.install(set_idx, way, cache_tag, addr, proc_num, is_load);
            let granted = coherence.perm_req(interconnect, is_load, addr, proc_num);
            let queue = if granted { Queue::Ready } else { Queue::Pend };
            self.pending
                .push_sub(tag, addr, proc_num, is_load, join, queue);
            return;
        }

        // Eviction required.
        let mut timestamps: Vec<u64> = self.sets[set_idx].iter().map(|l| l.timestamp).collect();
        let victim_way = self.policy.choose_victim(&mut timestamps);
        for (line, ts) in self.sets[set_idx].iter_mut().zip(timestamps) {
            line.timestamp = ts;
        }
        let evicted = self.sets[set_idx][victim_way];

        if self.victim_capacity > 0 {
            if let Some(displaced) = self.place_in_victim(evicted, found_in_victim) {
                if !found_in_victim {
                    let immediate =
                        coherence.invl_req(interconnect, displaced.addr, displaced.owner_proc);
                    self.defer_after_invl(tag, addr, proc_num, is_load, join, displaced.addr, immediate);
                }
            } else if !found_in_victim {
                let granted = coherence.perm_req(interconnect, is_load, addr, proc_num);
                let queue = if granted { Queue::Ready } else { Queue::Pend };
                self.pending
                    .push_sub(tag, addr, proc_num, is_load, join, queue);
            }
        } else {
            let immediate = coherence.invl_req(interconnect, evicted.addr, evicted.owner_proc);
            self.defer_after_invl(tag, addr, proc_num, is_load, join, evicted.addr, immediate);
        }

        self.install(set_idx, victim_way, cache_tag, addr, proc_num, is_load);
    }

    /// Places a sub-request that displaced a line out of the hierarchy onto
    /// `pendPerm` (waiting for the invalidation to resolve) or `readyPerm`
    /// (the invalidation already resolved synchronously), so that it
    /// re-attempts `permReq` for its own address on a later tick rather than
    /// immediately — matching the self-consistent source variant that
    /// separates re-permission-requests into their own queue.
    fn defer_after_invl(
        &mut self,
        tag: u64,
        addr: u64,
        proc_num: usize,
        is_load: bool,
        join: crate::handle::Handle<pending::Join>,
        evicted_addr: u64,
        immediate: bool,
    ) {
        let queue = if immediate {
            Queue::ReadyPerm
        } else {
            Queue::PendPerm
        };
        let handle = self.pending.push_sub(tag, addr, proc_num, is_load, join, queue);
        self.pending.sub_mut(handle).evicted_addr = Some(evicted_addr);
    }

    fn install(
        &mut self,
        set_idx: usize,
        way: usize,
        cache_tag: u64,
        addr: u64,
        proc_num: usize,
        is_load: bool,
    ) {
        let timestamp = self.policy.install_timestamp(self.access_counter);
        self.sets[set_idx][way] = Line {
            valid: true,
            dirty: !is_load,
            tag: cache_tag,
            addr,
            owner_proc: proc_num,
            timestamp,
        };
        self.access_counter += 1;
    }

    /// Invoked by the coherence controller with the outcome of a deferred
    /// permission or data request.
    pub fn coher_callback(&mut self, action: CacheAction, proc_num: usize, addr: u64) {
        match action {
            CacheAction::NoAction => self.pending.resolve_no_action(proc_num, addr),
            CacheAction::DataRecv => {
                // A store's permission upgrade may resolve after the block
                // was already installed (it was a data hit, just not yet a
                // permission hit) — mark it dirty now rather than on install.
                if self.pending.pend_is_store(proc_num, addr) {
                    self.mark_dirty_if_resident(proc_num, addr);
                }
                self.pending.resolve_data_recv(proc_num, addr);
            }
            CacheAction::Invalidate => {
                self.invalidate_owned_line(proc_num, addr);
            }
        }
    }

    fn invalidate_owned_line(&mut self, proc_num: usize, addr: u64) -> Option<usize> {
        let set_idx = self.get_set(addr);
        let tag = self.get_tag(addr);
        let way = self.sets[set_idx]
            .iter()
            .position(|l| l.valid && l.tag == tag && l.owner_proc == proc_num)?;
        self.sets[set_idx][way].valid = false;
        Some(set_idx)
    }

    fn mark_dirty_if_resident(&mut self, proc_num: usize, addr: u64) {
        let set_idx = self.get_set(addr);
        let tag = self.get_tag(addr);
        if let Some(way) = self.sets[set_idx]
            .iter()
            .position(|l| l.valid && l.tag == tag && l.owner_proc == proc_num)
        {
            self.sets[set_idx][way].dirty = true;
        }
    }
}

impl CacheLike for Cache {
    fn tick(
        &mut self,
        coherence: &mut impl CoherenceLike,
        interconnect: &mut Interconnect,
    ) -> Vec<Completion> {
        self.pending.drain_ready_perm(|sub| {
            coherence.perm_req(interconnect, sub.is_load, sub.addr, sub.proc_num)
        });
        self.pending
            .drain_ready()
            .into_iter()
            .map(|(tag, proc_num)| Completion { proc_num, tag })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coherence::CoherenceController;
    use crate::config::{Protocol, Topology};
    use crate::interconnect::Interconnect;

    fn harness(set_bits: u32, ways: usize, block_bits: u32, victim: usize) -> (Cache, CoherenceController, Interconnect) {
        let cache = Cache::new(0, set_bits, ways, block_bits, victim, Policy::Lru);
        let coherence = CoherenceController::new(Protocol::Msi, 1);
        let interconnect = Interconnect::new(Topology::Bus, 1, 10, 10, 10);
        (cache, coherence, interconnect)
    }

    #[test]
    fn single_core_lru_eviction_replaces_oldest_line() {
        let (mut cache, mut coherence, mut interconnect) = harness(1, 2, 4, 0);
        for (addr, tag) in [(0x00, 1), (0x20, 2), (0x40, 3)] {
            cache.memory_request(&mut coherence, &mut interconnect, TraceKind::MemLoad, addr, 1, tag);
            for _ in 0..5 {
                interconnect.tick(&mut coherence);
                cache.tick(&mut coherence, &mut interconnect);
            }
        }
        let set0 = &cache.sets[0];
        let addrs: Vec<u64> = set0.iter().filter(|l| l.valid).map(|l| l.addr).collect();
        assert_eq!(addrs.len(), 2);
        assert!(addrs.contains(&0x20));
        assert!(addrs.contains(&0x40));
        assert!(!addrs.contains(&0x00));
    }

    #[test]
    fn victim_buffer_recovers_an_evicted_line_without_a_bus_transaction() {
        // A, B, C collide in set 0 of a 2-way cache with a 2-entry victim
        // buffer: the third access evicts A into the victim buffer, and a
        // fourth access to A recovers it from there.
        let (mut cache, mut coherence, mut interconnect) = harness(1, 2, 4, 2);
        for (addr, tag) in [(0x00, 1), (0x20, 2), (0x40, 3)] {
            cache.memory_request(&mut coherence, &mut interconnect, TraceKind::MemLoad, addr, 1, tag);
            for _ in 0..5 {
                interconnect.tick(&mut coherence);
                cache.tick(&mut coherence, &mut interconnect);
            }
        }
        assert!(cache.find_in_victim(0x00).is_some());

        let transactions_before = interconnect.transactions_issued();
        cache.memory_request(&mut coherence, &mut interconnect, TraceKind::MemLoad, 0x00, 1, 4);
        let mut completions = Vec::new();
        for _ in 0..5 {
            interconnect.tick(&mut coherence);
            completions.extend(cache.tick(&mut coherence, &mut interconnect));
        }
        assert_eq!(completions, vec![Completion { proc_num: 0, tag: 4 }]);
        assert_eq!(interconnect.transactions_issued(), transactions_before);
        assert!(cache.find_in_victim(0x00).is_none());
        let set0_addrs: Vec<u64> = cache.sets[0].iter().filter(|l| l.valid).map(|l| l.addr).collect();
        assert!(set0_addrs.contains(&0x00));
    }

    #[test]
    fn unaligned_access_splits_and_completes_once() {
        let (mut cache, mut coherence, mut interconnect) = harness(2, 2, 4, 0);
        cache.memory_request(&mut coherence, &mut interconnect, TraceKind::MemLoad, 12, 8, 99);
        let mut completions = Vec::new();
        for _ in 0..10 {
            interconnect.tick(&mut coherence);
            completions.extend(cache.tick(&mut coherence, &mut interconnect));
        }
        assert_eq!(completions, vec![Completion { proc_num: 0, tag: 99 }]);
    }

    #[test]
    fn msi_store_on_a_shared_line_invalidates_the_other_sharer() {
        use crate::coherence::LineState;

        let mut cache0 = Cache::new(0, 1, 2, 4, 0, Policy::Lru);
        let mut cache1 = Cache::new(1, 1, 2, 4, 0, Policy::Lru);
        let mut coherence = CoherenceController::new(Protocol::Msi, 2);
        let mut interconnect = Interconnect::new(Topology::Bus, 2, 2, 2, 2);

        cache0.memory_request(&mut coherence, &mut interconnect, TraceKind::MemLoad, 0x40, 1, 1);
        for _ in 0..10 {
            interconnect.tick(&mut coherence);
            cache0.tick(&mut coherence, &mut interconnect);
            cache1.tick(&mut coherence, &mut interconnect);
        }
        assert_eq!(coherence.state_for_test(0, 0x40), Some(LineState::Share));

        cache1.memory_request(&mut coherence, &mut interconnect, TraceKind::MemLoad, 0x40, 1, 2);
        for _ in 0..10 {
            interconnect.tick(&mut coherence);
            cache0.tick(&mut coherence, &mut interconnect);
            cache1.tick(&mut coherence, &mut interconnect);
        }
        assert_eq!(coherence.state_for_test(1, 0x40), Some(LineState::Share));

        cache1.memory_request(&mut coherence, &mut interconnect, TraceKind::MemStore, 0x40, 1, 3);
        for _ in 0..10 {
            interconnect.tick(&mut coherence);
            cache0.tick(&mut coherence, &mut interconnect);
            cache1.tick(&mut coherence, &mut interconnect);
        }
        assert_eq!(coherence.state_for_test(1, 0x40), Some(LineState::Modified));
        assert_eq!(coherence.state_for_test(0, 0x40), None);
    }
}
