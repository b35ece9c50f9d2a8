//! `cmpsim-core`: a cycle-driven simulator for a chip-multiprocessor memory
//! and execution subsystem.
//!
//! The machine is built leaf-first and ticked leaf-first: a
//! [`memory::FixedLatencyMemory`] backs an [`interconnect::Interconnect`],
//! which a [`coherence::CoherenceController`] issues transactions on behalf
//! of the [`cache::Cache`] owned by each [`core::ProcessorCore`]. [`Simulator`]
//! is the only thing that ticks all of it and knows when the run is over.

pub mod branch;
pub mod cache;
pub mod coherence;
pub mod config;
pub mod core;
pub mod error;
pub mod handle;
pub mod interconnect;
pub mod memory;
pub mod stats;
pub mod trace;

use branch::{BranchPredictorWrapper, Flavor as BranchFlavor};
use cache::policies::Policy;
use cache::Cache;
use coherence::CoherenceController;
use config::{BranchFlavor as ConfigBranchFlavor, Config, ReplacementPolicy};
use core::ProcessorCore;
use interconnect::Interconnect;
use stats::SimStats;
use trace::TraceReader;

fn branch_flavor(flavor: ConfigBranchFlavor) -> BranchFlavor {
    match flavor {
        ConfigBranchFlavor::Static => BranchFlavor::Static,
        ConfigBranchFlavor::GSelect => BranchFlavor::GSelect,
    }
}

fn cache_policy(config: &config::CacheConfig) -> Policy {
    match config.policy() {
        ReplacementPolicy::Lru => Policy::Lru,
        ReplacementPolicy::Rrip => Policy::Rrip { bits: config.rrip_bits },
    }
}

/// Drives the whole machine: one [`Interconnect`]/[`CoherenceController`]
/// pair shared by every [`ProcessorCore`], ticked leaf-first until the
/// termination rule is met.
pub struct Simulator {
    cores: Vec<ProcessorCore>,
    coherence: CoherenceController,
    interconnect: Interconnect,
    stall_time: u64,
    ticks_since_progress: u64,
    stats: SimStats,
}

impl Simulator {
    /// Builds a machine from `config`, with one trace reader per core.
    ///
    /// # Panics
    ///
    /// Panics if `traces.len()` does not match `config.core.num_processors`.
    #[must_use]
    pub fn new(config: &Config, traces: Vec<Box<dyn TraceReader>>) -> Self {
        assert_eq!(
            traces.len(),
            config.core.num_processors,
            "one trace reader is required per configured processor"
        );
        let policy = cache_policy(&config.cache);
        let cores = traces
            .into_iter()
            .enumerate()
            .map(|(proc_num, trace)| {
                let branch = BranchPredictorWrapper::new(
                    branch_flavor(config.branch.flavor),
                    config.branch.table_bits,
                    config.branch.bhr_bits,
                    config.branch.btb_size,
                );
                let cache = Cache::new(
                    proc_num,
                    config.cache.set_bits,
                    config.cache.ways,
                    config.cache.block_bits,
                    config.cache.victim_capacity,
                    policy,
                );
                ProcessorCore::new(proc_num, trace, branch, cache, &config.core)
            })
            .collect();
        let coherence = CoherenceController::new(config.coherence.protocol, config.core.num_processors);
        let interconnect = Interconnect::new(
            config.interconnect.topology,
            config.core.num_processors,
            config.interconnect.cache_delay,
            config.interconnect.cache_transfer,
            config.general.memory_latency,
        );
        Self {
            cores,
            coherence,
            interconnect,
            stall_time: config.general.stall_time,
            ticks_since_progress: 0,
            stats: SimStats::default(),
        }
    }

    /// Runs until every core's trace is exhausted and every in-flight
    /// structure (dispatch queue, schedule queue, functional units, pending
    /// memory/coherence requests) has drained.
    pub fn run(&mut self) {
        while !self.is_done() {
            self.tick();
        }
        self.finish();
    }

    fn is_done(&self) -> bool {
        self.cores.iter().all(ProcessorCore::is_idle)
    }

    /// Advances every subsystem by exactly one tick, leaf-first: the
    /// interconnect (and the memory behind it) first, then each core (which
    /// applies its own queued coherence callbacks and ticks its cache
    /// before running its own pipeline stages).
    fn tick(&mut self) {
        let broadcasts_before = self.interconnect.broadcasts_completed();
        self.interconnect.tick(&mut self.coherence);
        for core in &mut self.cores {
            core.tick(&mut self.coherence, &mut self.interconnect);
        }
        self.stats.ticks += 1;

        if self.interconnect.broadcasts_completed() > broadcasts_before {
            self.ticks_since_progress = 0;
        } else {
            self.ticks_since_progress += 1;
            if self.ticks_since_progress == self.stall_time {
                tracing::warn!(
                    ticks = self.stats.ticks,
                    "no interconnect transaction has completed in {} ticks",
                    self.stall_time
                );
            }
        }
    }

    /// Aggregates every subsystem's cumulative counters into `self.stats`.
    /// Cheap and idempotent, so it's safe to call more than once (e.g. from
    /// a test that wants a mid-run snapshot).
    fn finish(&mut self) {
        self.stats.interconnect_transactions = self.interconnect.transactions_issued();
        self.stats.broadcasts_completed = self.interconnect.broadcasts_completed();

        let (perm_immediate, perm_deferred, snoop_invalidations) = self.coherence.stats();
        self.stats.perm_immediate = perm_immediate;
        self.stats.perm_deferred = perm_deferred;
        self.stats.snoop_invalidations = snoop_invalidations;
        self.stats.stall_ticks_since_progress = self.ticks_since_progress;

        self.stats.instructions_retired = 0;
        self.stats.inst_mem = 0;
        self.stats.inst_branch = 0;
        self.stats.inst_alu = 0;
        self.stats.branch_correct = 0;
        self.stats.branch_mispredictions = 0;
        self.stats.cache_hits = 0;
        self.stats.cache_misses = 0;
        self.stats.victim_hits = 0;
        self.stats.victim_insertions = 0;
        for core in &self.cores {
            let c = core.stats();
            self.stats.instructions_retired += c.instructions_retired;
            self.stats.inst_mem += c.inst_mem;
            self.stats.inst_branch += c.inst_branch;
            self.stats.inst_alu += c.inst_alu;
            self.stats.branch_correct += c.branch_correct;
            self.stats.branch_mispredictions += c.branch_mispredictions;

            let (hits, misses, victim_hits, victim_insertions) = core.cache_stats();
            self.stats.cache_hits += hits;
            self.stats.cache_misses += misses;
            self.stats.victim_hits += victim_hits;
            self.stats.victim_insertions += victim_insertions;
        }
    }

    /// The aggregated statistics for this run. Calls [`Simulator::finish`]
    /// first so it reflects every tick run so far.
    pub fn stats(&mut self) -> SimStats {
        self.finish();
        self.stats.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::trace::{TraceKind, TraceOp, VecTraceReader};

    fn op(kind: TraceKind, pc: u64, mem: u64, src: [Option<u32>; 2], dest: Option<u32>) -> TraceOp {
        TraceOp {
            kind,
            pc_address: pc,
            next_pc_address: pc + 4,
            mem_address: mem,
            size: 4,
            src_reg: src,
            dest_reg: dest,
        }
    }

    #[test]
    fn single_core_run_retires_every_op_and_terminates() {
        let ops = vec![
            op(TraceKind::Alu, 0, 0, [None, None], Some(1)),
            op(TraceKind::MemLoad, 4, 0x100, [None, None], Some(2)),
            op(TraceKind::Alu, 8, 0, [Some(1), Some(2)], Some(3)),
        ];
        let config = Config::default();
        let trace: Box<dyn TraceReader> = Box::new(VecTraceReader::new(ops));
        let mut sim = Simulator::new(&config, vec![trace]);
        sim.run();
        let stats = sim.stats();
        assert_eq!(stats.instructions_retired, 3);
        assert_eq!(stats.inst_alu, 2);
        assert_eq!(stats.inst_mem, 1);
    }

    #[test]
    fn two_cores_sharing_an_address_both_drain_to_completion() {
        let ops_for = || {
            vec![
                op(TraceKind::MemStore, 0, 0x100, [None, None], None),
                op(TraceKind::MemLoad, 4, 0x100, [None, None], Some(1)),
            ]
        };
        let mut config = Config::default();
        config.core.num_processors = 2;
        let traces: Vec<Box<dyn TraceReader>> =
            vec![Box::new(VecTraceReader::new(ops_for())), Box::new(VecTraceReader::new(ops_for()))];
        let mut sim = Simulator::new(&config, traces);
        sim.run();
        let stats = sim.stats();
        assert_eq!(stats.instructions_retired, 4);
    }
}
