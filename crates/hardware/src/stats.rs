//! Simulation statistics collection and reporting.
//!
//! Each subsystem increments its own counters here rather than threading a
//! logger through every tick; the driver aggregates them at
//! [`Simulator::finish`](crate::Simulator::finish) and the CLI prints a
//! formatted report via [`SimStats::print_sections`].

use std::time::Instant;

/// Aggregate statistics for one simulation run.
#[derive(Clone)]
pub struct SimStats {
    start_time: Instant,
    /// Total ticks elapsed.
    pub ticks: u64,
    /// Instructions retired across all cores.
    pub instructions_retired: u64,

    /// Memory ops retired.
    pub inst_mem: u64,
    /// Branch ops retired.
    pub inst_branch: u64,
    /// ALU ops retired (fast + long).
    pub inst_alu: u64,

    /// Branch predictions that matched the eventual outcome.
    pub branch_correct: u64,
    /// Branch mispredictions.
    pub branch_mispredictions: u64,

    /// Cache accesses that hit in the main set.
    pub cache_hits: u64,
    /// Cache accesses that missed the main set and the victim buffer.
    pub cache_misses: u64,
    /// Misses recovered from the victim buffer.
    pub victim_hits: u64,
    /// Lines evicted from the main set into the victim buffer.
    pub victim_insertions: u64,

    /// Coherence permission requests granted synchronously (already held).
    pub perm_immediate: u64,
    /// Coherence permission requests that had to wait for a bus transaction.
    pub perm_deferred: u64,
    /// Snoop-invalidations applied to a local line.
    pub snoop_invalidations: u64,

    /// Bus/link transactions issued.
    pub interconnect_transactions: u64,
    /// Broadcasts completed (all acks received).
    pub broadcasts_completed: u64,

    /// Ticks the stall watchdog has gone without a memory completion.
    pub stall_ticks_since_progress: u64,
}

impl Default for SimStats {
    fn default() -> Self {
        Self {
            start_time: Instant::now(),
            ticks: 0,
            instructions_retired: 0,
            inst_mem: 0,
            inst_branch: 0,
            inst_alu: 0,
            branch_correct: 0,
            branch_mispredictions: 0,
            cache_hits: 0,
            cache_misses: 0,
            victim_hits: 0,
            victim_insertions: 0,
            perm_immediate: 0,
            perm_deferred: 0,
            snoop_invalidations: 0,
            interconnect_transactions: 0,
            broadcasts_completed: 0,
            stall_ticks_since_progress: 0,
        }
    }
}

/// Valid section identifiers for [`SimStats::print_sections`].
pub const STATS_SECTIONS: &[&str] = &["summary", "instruction_mix", "branch", "cache", "coherence"];

impl SimStats {
    /// Prints only the requested statistics sections to stdout.
    ///
    /// Pass an empty slice to print every section (equivalent to
    /// [`SimStats::print`]).
    pub fn print_sections(&self, sections: &[String]) {
        let want = |s: &str| sections.is_empty() || sections.iter().any(|x| x == s);
        let seconds = self.start_time.elapsed().as_secs_f64();
        let ticks = if self.ticks == 0 { 1 } else { self.ticks };
        let instr = if self.instructions_retired == 0 {
            1
        } else {
            self.instructions_retired
        };

        if want("summary") {
            let ipc = self.instructions_retired as f64 / ticks as f64;
            let khz = (self.ticks as f64 / seconds) / 1000.0;
            println!("\n==========================================================");
            println!("CMPSIM STATISTICS");
            println!("==========================================================");
            println!("Ticks - {}", self.ticks);
            println!("host_seconds             {seconds:.4} s");
            println!("sim_freq                 {khz:.2} kHz");
            println!("sim_insts                {}", self.instructions_retired);
            println!("sim_ipc                  {ipc:.4}");
            println!("----------------------------------------------------------");
        }
        if want("instruction_mix") {
            let total = instr as f64;
            println!("INSTRUCTION MIX");
            println!(
                "  op.alu                 {} ({:.2}%)",
                self.inst_alu,
                (self.inst_alu as f64 / total) * 100.0
            );
            println!(
                "  op.mem                 {} ({:.2}%)",
                self.inst_mem,
                (self.inst_mem as f64 / total) * 100.0
            );
            println!(
                "  op.branch              {} ({:.2}%)",
                self.inst_branch,
                (self.inst_branch as f64 / total) * 100.0
            );
            println!("----------------------------------------------------------");
        }
        if want("branch") {
            let total = self.branch_correct + self.branch_mispredictions;
            let acc = if total > 0 {
                100.0 * (self.branch_correct as f64 / total as f64)
            } else {
                0.0
            };
            println!("BRANCH PREDICTION");
            println!("  bp.lookups             {total}");
            println!("  bp.mispredicts         {}", self.branch_mispredictions);
            println!("  bp.accuracy            {acc:.2}%");
            println!("----------------------------------------------------------");
        }
        if want("cache") {
            let total = self.cache_hits + self.cache_misses;
            let rate = if total > 0 {
                (self.cache_hits as f64 / total as f64) * 100.0
            } else {
                0.0
            };
            println!("CACHE");
            println!("  accesses               {total}");
            println!("  hit_rate               {rate:.2}%");
            println!("  victim.hits            {}", self.victim_hits);
            println!("  victim.insertions      {}", self.victim_insertions);
            println!("----------------------------------------------------------");
        }
        if want("coherence") {
            println!("COHERENCE");
            println!("  perm.immediate         {}", self.perm_immediate);
            println!("  perm.deferred          {}", self.perm_deferred);
            println!("  snoop.invalidations    {}", self.snoop_invalidations);
            println!("  interconnect.txns      {}", self.interconnect_transactions);
            println!("  broadcasts.completed   {}", self.broadcasts_completed);
        }
        println!("==========================================================");
    }

    /// Prints every statistics section to stdout.
    pub fn print(&self) {
        self.print_sections(&[]);
    }
}
