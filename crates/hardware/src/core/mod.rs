//! The out-of-order processor core: fetch, dispatch, schedule, execute, and
//! state-update, wired together per processor.
//!
//! Every tick runs the stages in the order the design fixes them:
//! `execute -> state_update -> fire_ready -> schedule -> dispatch -> shift CDBs`.
//! MEM ops bypass the tag/regfile/CDB machinery entirely — fetch blocks
//! until the cache reports a matching [`Completion`]. BRANCH ops resolve
//! at fetch time against the branch predictor and stall fetch for exactly
//! one tick on a misprediction. Only ALU/ALU_LONG ops flow through
//! dispatch, the schedule queue, a functional-unit bank, and the CDB.
//! `state_update` broadcasts in ascending tag order among whatever has
//! finished its functional-unit work so far — a fast op dispatched after a
//! long one can complete, and broadcast, before its elder does.

pub mod alu;
pub mod cdb;
pub mod regfile;
pub mod rs;

use std::collections::{HashMap, VecDeque};

use alu::{FastBank, LongBank};
use cdb::Cdb;
use regfile::RegFile;
use rs::{RsKind, ScheduleQueue, SrcOperand};

use crate::branch::{BranchPredictor, BranchPredictorWrapper};
use crate::cache::{Cache, CacheLike};
use crate::coherence::{CoherenceController, CoherenceLike};
use crate::config::CoreConfig;
use crate::handle::Handle;
use crate::interconnect::Interconnect;
use crate::trace::{TraceKind, TraceOp, TraceReader};

/// A dispatch-queue entry: a fetched ALU op waiting for a dispatch slot.
#[derive(Debug, Clone, Copy)]
struct DispatchEntry {
    kind: RsKind,
    src_reg: [Option<u32>; 2],
    dest_reg: Option<u32>,
}

/// Cumulative per-core counters this core contributes to
/// [`crate::stats::SimStats`] once the run finishes.
#[derive(Debug, Clone, Copy, Default)]
pub struct CoreStats {
    pub instructions_retired: u64,
    pub inst_mem: u64,
    pub inst_branch: u64,
    pub inst_alu: u64,
    pub branch_correct: u64,
    pub branch_mispredictions: u64,
}

/// One out-of-order core: its own trace, branch predictor, cache, and
/// Tomasulo-style scheduling state.
pub struct ProcessorCore {
    proc_num: usize,
    trace: Box<dyn TraceReader>,
    branch: BranchPredictorWrapper,
    cache: Cache,

    regfile: RegFile,
    dispatch_queue: VecDeque<DispatchEntry>,
    dispatch_capacity: usize,
    dispatch_width: usize,
    fetch_rate: usize,
    schedule_width: usize,
    schedule: ScheduleQueue,
    cdb: Cdb,
    fast_bank: FastBank,
    long_bank: LongBank,

    /// Maps an in-flight RS's tag back to its handle, so state_update can
    /// find the reservation station a completion tag belongs to.
    tag_to_rs: HashMap<u64, Handle<rs::Rs>>,
    /// Tags retired by `execute` this tick and any prior tick's leftover
    /// (when there were more retirements than CDB slots), oldest first once
    /// sorted by `state_update`.
    completion_list: Vec<u64>,
    /// RSes selected by last tick's `schedule`, to occupy a free functional
    /// unit slot at the start of this tick's `fire_ready`.
    ready_to_fire: Vec<(Handle<rs::Rs>, RsKind)>,

    /// Next tag to hand out for an entry moving from the dispatch queue into
    /// the schedule queue. Kept separate from `next_mem_tag`: MEM ops never
    /// touch the schedule queue, `tag_to_rs`, or the CDB, so the two are
    /// unrelated correlation-token streams rather than one shared counter.
    next_sq_tag: u64,
    /// Next tag to hand out for a MEM op's cache correlation token.
    next_mem_tag: u64,
    /// Tag of the in-flight MEM op fetch is blocked on, if any.
    pending_mem: Option<u64>,
    /// Set for exactly one tick after a branch misprediction is detected.
    pending_branch: bool,
    /// The trace has been exhausted; no more fetching will occur.
    trace_exhausted: bool,

    stats: CoreStats,
}

impl ProcessorCore {
    /// Builds a core for `proc_num`, owning `trace`, `branch`, and `cache`.
    #[must_use]
    pub fn new(
        proc_num: usize,
        trace: Box<dyn TraceReader>,
        branch: BranchPredictorWrapper,
        cache: Cache,
        core_cfg: &CoreConfig,
    ) -> Self {
        Self {
            proc_num,
            trace,
            branch,
            cache,
            regfile: RegFile::new(),
            dispatch_queue: VecDeque::new(),
            dispatch_capacity: core_cfg.dispatch_queue_capacity(),
            dispatch_width: core_cfg.dispatch_width,
            fetch_rate: core_cfg.fetch_rate,
            schedule_width: core_cfg.schedule_width,
            schedule: ScheduleQueue::new(
                core_cfg.schedule_queue_fast_capacity(),
                core_cfg.schedule_queue_long_capacity(),
            ),
            cdb: Cdb::new(core_cfg.num_cdb),
            fast_bank: FastBank::new(core_cfg.num_fast_alu),
            long_bank: LongBank::new(core_cfg.num_long_alu),
            tag_to_rs: HashMap::new(),
            completion_list: Vec::new(),
            ready_to_fire: Vec::new(),
            next_sq_tag: 0,
            next_mem_tag: 0,
            pending_mem: None,
            pending_branch: false,
            trace_exhausted: false,
            stats: CoreStats::default(),
        }
    }

    fn mint_sq_tag(&mut self) -> u64 {
        let tag = self.next_sq_tag;
        self.next_sq_tag += 1;
        tag
    }

    fn mint_mem_tag(&mut self) -> u64 {
        let tag = self.next_mem_tag;
        self.next_mem_tag += 1;
        tag
    }

    /// Cumulative per-core instruction/branch stats for this run.
    #[must_use]
    pub fn stats(&self) -> CoreStats {
        self.stats
    }

    /// Cumulative cache stats, for [`crate::stats::SimStats`] aggregation.
    #[must_use]
    pub fn cache_stats(&self) -> (u64, u64, u64, u64) {
        self.cache.stats()
    }

    /// True once the trace is exhausted and every in-flight structure has
    /// drained: the termination condition the simulator polls per core.
    #[must_use]
    pub fn is_idle(&self) -> bool {
        self.trace_exhausted
            && self.pending_mem.is_none()
            && !self.pending_branch
            && self.dispatch_queue.is_empty()
            && self.schedule.is_empty()
            && self.fast_bank.is_empty()
            && self.long_bank.is_empty()
            && self.completion_list.is_empty()
            && self.ready_to_fire.is_empty()
    }

    /// Advances this core by one tick: applies coherence callbacks queued
    /// for it, ticks its cache, then runs the pipeline stages in their
    /// fixed order.
    pub fn tick(&mut self, coherence: &mut CoherenceController, interconnect: &mut Interconnect) {
        for (action, addr) in coherence.poll_actions(self.proc_num) {
            self.cache.coher_callback(action, self.proc_num, addr);
        }
        for completion in self.cache.tick(coherence, interconnect) {
            if self.pending_mem == Some(completion.tag) {
                self.pending_mem = None;
                self.stats.instructions_retired += 1;
            }
        }

        self.execute();
        self.state_update();
        self.fire_ready();
        self.schedule();
        self.dispatch();
        self.cdb.shift();
        self.fetch(coherence, interconnect);
    }

    /// Retires completed functional-unit work, queuing the tags for
    /// `state_update` to drain onto the CDB in tag order.
    fn execute(&mut self) {
        let mut retired = self.fast_bank.advance();
        retired.extend(self.long_bank.advance());
        self.completion_list.extend(retired);
    }

    /// Broadcasts up to `num_cdb` completed tags this tick, oldest first
    /// among whatever has finished its functional-unit work so far, waking
    /// the destination register and deleting the reservation station from
    /// the schedule queue. A younger op can legitimately broadcast before
    /// an elder still occupying a functional unit; `RegFile::wakeup`'s
    /// matching-tag check is what keeps a stale broadcast from clobbering a
    /// newer rename of the same register. Anything beyond `num_cdb` this
    /// tick waits for a future one.
    fn state_update(&mut self) {
        self.completion_list.sort_unstable();
        let capacity = self.cdb.capacity();
        let mut remaining = Vec::new();
        for (i, tag) in self.completion_list.drain(..).enumerate() {
            if i >= capacity {
                remaining.push(tag);
                continue;
            }
            self.cdb.issue(tag);
            if let Some(handle) = self.tag_to_rs.remove(&tag) {
                if let Some(rs) = self.schedule.get(handle) {
                    if let Some(dest) = rs.dest {
                        self.regfile.wakeup(dest, tag);
                    }
                }
                self.schedule.remove(handle);
            }
            self.stats.instructions_retired += 1;
            self.stats.inst_alu += 1;
        }
        self.completion_list = remaining;
    }

    /// Occupies a functional unit slot for every RS `schedule` selected
    /// last tick. Relies on `schedule` never over-selecting beyond the free
    /// slots it observed at that point in the tick (which this tick's
    /// `execute`, running before `fire_ready`, has not since disturbed).
    fn fire_ready(&mut self) {
        let ready = std::mem::take(&mut self.ready_to_fire);
        for (handle, kind) in ready {
            let Some(rs) = self.schedule.get(handle) else { continue };
            let tag = rs.tag;
            match kind {
                RsKind::Fast => {
                    if let Some(idx) = self.fast_bank.free_slot() {
                        self.fast_bank.occupy(idx, tag);
                    }
                }
                RsKind::Long => {
                    if let Some(idx) = self.long_bank.free_slot() {
                        self.long_bank.occupy(idx, tag);
                    }
                }
            }
        }
    }

    /// Wakes reservation-station sources against this tick's visible CDB
    /// tags, then selects up to `schedule_width` oldest-ready RSes per kind
    /// (bounded by free functional-unit slots) to fire next tick.
    fn schedule(&mut self) {
        let visible: Vec<u64> = self.cdb.visible_tags().collect();
        self.schedule.wakeup(&visible);

        let mut fast_free = self.fast_bank.free_count();
        let mut long_free = self.long_bank.free_count();
        let mut selected = 0usize;
        for handle in self.schedule.oldest_first() {
            if selected >= self.schedule_width {
                break;
            }
            let Some(rs) = self.schedule.get_mut(handle) else { continue };
            if rs.selected || !rs.both_ready() {
                continue;
            }
            let free = match rs.kind {
                RsKind::Fast => &mut fast_free,
                RsKind::Long => &mut long_free,
            };
            if *free == 0 {
                continue;
            }
            *free -= 1;
            rs.selected = true;
            self.ready_to_fire.push((handle, rs.kind));
            selected += 1;
        }
    }

    /// Renames up to `dispatch_width` dispatch-queue entries into the
    /// schedule queue, consulting the register file for each source.
    fn dispatch(&mut self) {
        let mut moved = 0;
        while moved < self.dispatch_width {
            let kind = match self.dispatch_queue.front() {
                Some(entry) => entry.kind,
                None => break,
            };
            if !self.schedule.has_room(kind) {
                break;
            }
            let entry = self
                .dispatch_queue
                .pop_front()
                .unwrap_or_else(|| crate::error::protocol_violation("dispatch queue emptied between peek and pop"));

            let tag = self.mint_sq_tag();
            let src = entry.src_reg.map(|reg| match reg {
                Some(r) => {
                    let e = self.regfile.read(r);
                    if e.ready {
                        SrcOperand::READY
                    } else {
                        SrcOperand { ready: false, tag: e.tag }
                    }
                }
                None => SrcOperand::READY,
            });
            if let Some(dest) = entry.dest_reg {
                self.regfile.rename_dest(dest, tag);
            }
            let handle = self.schedule.insert(tag, entry.kind, src, entry.dest_reg);
            self.tag_to_rs.insert(tag, handle);
            moved += 1;
        }
    }

    /// Fetches up to `fetch_rate` trace ops this tick, stopping early on a
    /// MEM op (fetch then blocks until the cache completes it), a BRANCH
    /// misprediction (a one-tick stall), or a full dispatch queue.
    fn fetch(&mut self, coherence: &mut CoherenceController, interconnect: &mut Interconnect) {
        if self.pending_branch {
            self.pending_branch = false;
            return;
        }
        if self.pending_mem.is_some() || self.trace_exhausted {
            return;
        }
        for _ in 0..self.fetch_rate {
            if self.pending_mem.is_some() || self.pending_branch {
                break;
            }
            if self.dispatch_queue.len() >= self.dispatch_capacity {
                break;
            }
            let Some(op) = self.trace.next_op() else {
                self.trace_exhausted = true;
                break;
            };
            self.fetch_one(op, coherence, interconnect);
        }
    }

    fn fetch_one(&mut self, op: TraceOp, coherence: &mut CoherenceController, interconnect: &mut Interconnect) {
        match op.kind {
            TraceKind::MemLoad | TraceKind::MemStore => {
                self.stats.inst_mem += 1;
                let tag = self.mint_mem_tag();
                self.pending_mem = Some(tag);
                self.cache
                    .memory_request(coherence, interconnect, op.kind, op.mem_address, op.size, tag);
            }
            TraceKind::Branch => {
                self.stats.inst_branch += 1;
                self.stats.instructions_retired += 1;
                let (predicted_taken, predicted_target) = self.branch.predict_branch(op.pc_address);
                // Ground truth for "taken" is not in the trace record; ISA
                // semantics are out of scope, so this infers it from the
                // static fall-through address instead.
                let actual_taken = op.next_pc_address != op.pc_address.wrapping_add(4);
                let actual_target = actual_taken.then_some(op.next_pc_address);
                let mispredicted =
                    predicted_taken != actual_taken || (actual_taken && predicted_target != actual_target);
                self.branch.update_branch(op.pc_address, actual_taken, actual_target);
                if mispredicted {
                    self.stats.branch_mispredictions += 1;
                    self.pending_branch = true;
                } else {
                    self.stats.branch_correct += 1;
                }
            }
            TraceKind::Alu | TraceKind::AluLong => {
                let kind = if op.kind == TraceKind::AluLong { RsKind::Long } else { RsKind::Fast };
                self.dispatch_queue.push_back(DispatchEntry {
                    kind,
                    src_reg: op.src_reg,
                    dest_reg: op.dest_reg,
                });
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::branch::Flavor;
    use crate::cache::policies::Policy;
    use crate::config::{CoreConfig, Protocol, Topology};
    use crate::trace::VecTraceReader;

    fn harness(ops: Vec<TraceOp>, core_cfg: CoreConfig) -> (ProcessorCore, CoherenceController, Interconnect) {
        let trace = Box::new(VecTraceReader::new(ops));
        let branch = BranchPredictorWrapper::new(Flavor::Static, 10, 0, 16, 4);
        let cache = Cache::new(0, 4, 2, 4, 0, Policy::Lru);
        let core = ProcessorCore::new(0, trace, branch, cache, &core_cfg);
        let coherence = CoherenceController::new(Protocol::Msi, 1);
        let interconnect = Interconnect::new(Topology::Bus, 1, 2, 2, 2);
        (core, coherence, interconnect)
    }

    fn alu_op(pc: u64, src0: Option<u32>, src1: Option<u32>, dest: Option<u32>) -> TraceOp {
        TraceOp {
            kind: TraceKind::Alu,
            pc_address: pc,
            next_pc_address: pc + 4,
            mem_address: 0,
            size: 0,
            src_reg: [src0, src1],
            dest_reg: dest,
        }
    }

    fn alu_long_op(pc: u64, dest: Option<u32>) -> TraceOp {
        TraceOp {
            kind: TraceKind::AluLong,
            pc_address: pc,
            next_pc_address: pc + 4,
            mem_address: 0,
            size: 0,
            src_reg: [None, None],
            dest_reg: dest,
        }
    }

    #[test]
    fn independent_alu_ops_retire_and_drain_to_idle() {
        let ops = vec![alu_op(0, None, None, Some(1)), alu_op(4, None, None, Some(2))];
        let (mut core, mut coherence, mut interconnect) = harness(ops, CoreConfig::default());
        for _ in 0..20 {
            interconnect.tick(&mut coherence);
            core.tick(&mut coherence, &mut interconnect);
        }
        assert!(core.is_idle());
        assert_eq!(core.stats().instructions_retired, 2);
        assert_eq!(core.stats().inst_alu, 2);
    }

    #[test]
    fn dependent_alu_op_waits_for_its_producer_before_retiring() {
        // op 1 produces r1; op 2 consumes r1. Without wakeup, op 2 would
        // never become ready and the core would never go idle.
        let ops = vec![alu_op(0, None, None, Some(1)), alu_op(4, Some(1), None, Some(2))];
        let (mut core, mut coherence, mut interconnect) = harness(ops, CoreConfig::default());
        for _ in 0..20 {
            interconnect.tick(&mut coherence);
            core.tick(&mut coherence, &mut interconnect);
        }
        assert!(core.is_idle());
        assert_eq!(core.stats().instructions_retired, 2);
    }

    #[test]
    fn mem_op_blocks_fetch_until_the_cache_completes_it() {
        let ops = vec![TraceOp {
            kind: TraceKind::MemLoad,
            pc_address: 0,
            next_pc_address: 4,
            mem_address: 0x100,
            size: 4,
            src_reg: [None, None],
            dest_reg: Some(1),
        }];
        let (mut core, mut coherence, mut interconnect) = harness(ops, CoreConfig::default());
        for _ in 0..20 {
            interconnect.tick(&mut coherence);
            core.tick(&mut coherence, &mut interconnect);
        }
        assert!(core.is_idle());
        assert_eq!(core.stats().instructions_retired, 1);
        assert_eq!(core.stats().inst_mem, 1);
    }

    #[test]
    fn branch_misprediction_stalls_fetch_for_exactly_one_tick() {
        // next_pc != pc + 4, so actual_taken is true; the static predictor
        // always predicts not-taken, so this one mispredicts and costs a
        // one-tick fetch stall before the following op is fetched.
        let branch = TraceOp {
            kind: TraceKind::Branch,
            pc_address: 0,
            next_pc_address: 0x40,
            mem_address: 0,
            size: 0,
            src_reg: [None, None],
            dest_reg: None,
        };
        let ops = vec![branch, alu_op(0x40, None, None, Some(1))];
        let (mut core, mut coherence, mut interconnect) = harness(ops, CoreConfig::default());
        for _ in 0..20 {
            interconnect.tick(&mut coherence);
            core.tick(&mut coherence, &mut interconnect);
        }
        assert!(core.is_idle());
        assert_eq!(core.stats().branch_mispredictions, 1);
        assert_eq!(core.stats().branch_correct, 0);
        assert_eq!(core.stats().instructions_retired, 2);
        assert_eq!(core.stats().inst_alu, 1);
    }

    #[test]
    fn a_younger_fast_op_can_broadcast_before_its_elder_long_op_retires() {
        // A (long ALU, dest r1) dispatches before B (fast ALU, dest r2) and
        // has no dependency on it, so B's single-cycle fast bank produces a
        // result well before A's three-stage long bank does. state_update
        // only orders entries that have *already* finished their functional
        // unit, so B legitimately broadcasts — and wakes r2 — before A does,
        // and nothing about that ordering corrupts either register.
        let ops = vec![alu_long_op(0, Some(1)), alu_op(4, None, None, Some(2))];
        let core_cfg = CoreConfig {
            fetch_rate: 2,
            dispatch_width: 1,
            schedule_width: 1,
            num_fast_alu: 1,
            num_long_alu: 1,
            num_cdb: 1,
            ..CoreConfig::default()
        };
        let (mut core, mut coherence, mut interconnect) = harness(ops, core_cfg);
        let mut r1_ready_tick = None;
        let mut r2_ready_tick = None;
        for t in 0..30 {
            interconnect.tick(&mut coherence);
            core.tick(&mut coherence, &mut interconnect);
            if r1_ready_tick.is_none() && core.regfile.read(1).ready {
                r1_ready_tick = Some(t);
            }
            if r2_ready_tick.is_none() && core.regfile.read(2).ready {
                r2_ready_tick = Some(t);
            }
        }
        assert!(core.is_idle());
        assert_eq!(core.stats().instructions_retired, 2);
        assert_eq!(core.stats().inst_alu, 2);
        let (r1, r2) = (r1_ready_tick.unwrap(), r2_ready_tick.unwrap());
        assert!(r2 < r1, "expected the fast op B (r2, tick {r2}) to retire before the long op A (r1, tick {r1})");
    }
}
