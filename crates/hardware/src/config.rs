//! Configuration for the simulator.
//!
//! Each subsystem parses its own slice of the CLI (see `cmpsim-cli`), but the
//! resulting values are collected into this single [`Config`] tree so the
//! rest of the crate has one typed, `serde`-deserializable source of truth —
//! useful both for the CLI and for driving scenarios directly from tests.

use serde::Deserialize;

/// Baseline values used when a field is not supplied.
mod defaults {
    pub const CACHE_SET_BITS: u32 = 6;
    pub const CACHE_WAYS: usize = 4;
    pub const CACHE_BLOCK_BITS: u32 = 6;
    pub const CACHE_LATENCY: u64 = 1;

    pub const BRANCH_TABLE_BITS: u32 = 10;
    pub const BRANCH_BHR_BITS: u32 = 0;
    pub const BTB_SIZE: usize = 256;

    pub const NUM_PROCESSORS: usize = 1;
    pub const FETCH_RATE: usize = 1;
    pub const DISPATCH_WIDTH: usize = 1;
    pub const SCHEDULE_WIDTH: usize = 1;
    pub const NUM_FAST_ALU: usize = 1;
    pub const NUM_LONG_ALU: usize = 1;
    pub const NUM_CDB: usize = 1;

    pub const MEMORY_LATENCY: u64 = 100;
    pub const CACHE_TRANSFER: u64 = 10;

    pub const STALL_TIME: u64 = 100_000;
}

/// Cache replacement policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ReplacementPolicy {
    /// Least-recently-used: evict the line with the smallest timestamp.
    #[default]
    Lru,
    /// Re-Reference Interval Prediction: evict the line with the largest
    /// (oldest-predicted-reuse) counter.
    Rrip,
}

/// Cache hierarchy parameters, taken from the `-s/-E/-b/-i/-R` flags.
#[derive(Debug, Clone, Deserialize)]
pub struct CacheConfig {
    /// `log2(sets)`, CLI `-s`.
    #[serde(default = "CacheConfig::default_set_bits")]
    pub set_bits: u32,
    /// Lines per set, CLI `-E`.
    #[serde(default = "CacheConfig::default_ways")]
    pub ways: usize,
    /// `log2(block size)`, CLI `-b`.
    #[serde(default = "CacheConfig::default_block_bits")]
    pub block_bits: u32,
    /// Victim-buffer capacity; `0` disables it. CLI `-i`.
    #[serde(default)]
    pub victim_capacity: usize,
    /// RRIP counter width in bits; `0` selects LRU instead. CLI `-R`.
    #[serde(default)]
    pub rrip_bits: u32,
    /// Fixed per-access latency charged on a hit.
    #[serde(default = "CacheConfig::default_latency")]
    pub latency: u64,
}

impl CacheConfig {
    const fn default_set_bits() -> u32 {
        defaults::CACHE_SET_BITS
    }
    const fn default_ways() -> usize {
        defaults::CACHE_WAYS
    }
    const fn default_block_bits() -> u32 {
        defaults::CACHE_BLOCK_BITS
    }
    const fn default_latency() -> u64 {
        defaults::CACHE_LATENCY
    }

    /// Whether the victim buffer is enabled.
    #[must_use]
    pub fn victim_buffer_enabled(&self) -> bool {
        self.victim_capacity > 0
    }

    /// Whether RRIP replacement is enabled (as opposed to LRU).
    #[must_use]
    pub fn policy(&self) -> ReplacementPolicy {
        if self.rrip_bits > 0 {
            ReplacementPolicy::Rrip
        } else {
            ReplacementPolicy::Lru
        }
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            set_bits: Self::default_set_bits(),
            ways: Self::default_ways(),
            block_bits: Self::default_block_bits(),
            victim_capacity: 0,
            rrip_bits: 0,
            latency: Self::default_latency(),
        }
    }
}

/// Branch predictor flavor, CLI `-g`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BranchFlavor {
    /// PC-indexed static predictor (`-g 0`).
    #[default]
    Static,
    /// GSelect global-history predictor (`-g 2`).
    GSelect,
}

/// Branch predictor parameters, taken from the `-s/-b/-g` flags.
#[derive(Debug, Clone, Deserialize)]
pub struct BranchConfig {
    /// Predictor flavor, CLI `-g`.
    #[serde(default)]
    pub flavor: BranchFlavor,
    /// `log2(predictor entries)`, CLI `-s`.
    #[serde(default = "BranchConfig::default_table_bits")]
    pub table_bits: u32,
    /// BHR bits, CLI `-b`.
    #[serde(default = "BranchConfig::default_bhr_bits")]
    pub bhr_bits: u32,
    /// Branch target buffer size.
    #[serde(default = "BranchConfig::default_btb_size")]
    pub btb_size: usize,
}

impl BranchConfig {
    const fn default_table_bits() -> u32 {
        defaults::BRANCH_TABLE_BITS
    }
    const fn default_bhr_bits() -> u32 {
        defaults::BRANCH_BHR_BITS
    }
    const fn default_btb_size() -> usize {
        defaults::BTB_SIZE
    }
}

impl Default for BranchConfig {
    fn default() -> Self {
        Self {
            flavor: BranchFlavor::default(),
            table_bits: Self::default_table_bits(),
            bhr_bits: Self::default_bhr_bits(),
            btb_size: Self::default_btb_size(),
        }
    }
}

/// Coherence protocol selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Protocol {
    /// Invalid/Modified only; no sharing.
    Mi,
    /// Modified/Shared/Invalid.
    #[default]
    Msi,
    /// MSI plus Exclusive.
    Mesi,
    /// MESI plus Owned (dirty-shared, no writeback on read).
    Moesi,
    /// MESI plus Forward (single designated sharer forwards data).
    Mesif,
}

/// Interconnect topology selection, CLI `-t`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Topology {
    /// Single shared medium, round-robin arbitration. CLI `-t 0`.
    #[default]
    Bus,
    /// Linear chain of point-to-point links. CLI `-t 1`.
    Line,
    /// Point-to-point links forming a cycle. CLI `-t 2`.
    Ring,
    /// `sqrt(n) x sqrt(n)` grid of point-to-point links. CLI `-t 3`.
    Mesh,
}

/// Interconnect timing and topology parameters.
#[derive(Debug, Clone, Deserialize)]
pub struct InterconnectConfig {
    /// Topology, CLI `-t`.
    #[serde(default)]
    pub topology: Topology,
    /// Cache-to-cache transfer setup delay.
    #[serde(default = "InterconnectConfig::default_cache_delay")]
    pub cache_delay: u64,
    /// Cache-to-cache transfer duration.
    #[serde(default = "InterconnectConfig::default_cache_transfer")]
    pub cache_transfer: u64,
}

impl InterconnectConfig {
    const fn default_cache_delay() -> u64 {
        defaults::CACHE_TRANSFER
    }
    const fn default_cache_transfer() -> u64 {
        defaults::CACHE_TRANSFER
    }
}

impl Default for InterconnectConfig {
    fn default() -> Self {
        Self {
            topology: Topology::default(),
            cache_delay: Self::default_cache_delay(),
            cache_transfer: Self::default_cache_transfer(),
        }
    }
}

/// Processor core parameters, taken from the `-p/-f/-d/-m/-j/-k/-c` flags.
#[derive(Debug, Clone, Deserialize)]
pub struct CoreConfig {
    /// Processor count, CLI `-p`.
    #[serde(default = "CoreConfig::default_num_processors")]
    pub num_processors: usize,
    /// Ops fetched per tick per core, CLI `-f`.
    #[serde(default = "CoreConfig::default_fetch_rate")]
    pub fetch_rate: usize,
    /// Dispatch-width multiplier, CLI `-d`.
    #[serde(default = "CoreConfig::default_dispatch_width")]
    pub dispatch_width: usize,
    /// Schedule-width multiplier, CLI `-m`.
    #[serde(default = "CoreConfig::default_schedule_width")]
    pub schedule_width: usize,
    /// Fast-ALU count, CLI `-j`.
    #[serde(default = "CoreConfig::default_num_fast_alu")]
    pub num_fast_alu: usize,
    /// Long-ALU count, CLI `-k`.
    #[serde(default = "CoreConfig::default_num_long_alu")]
    pub num_long_alu: usize,
    /// CDB slot count, CLI `-c`.
    #[serde(default = "CoreConfig::default_num_cdb")]
    pub num_cdb: usize,
}

impl CoreConfig {
    const fn default_num_processors() -> usize {
        defaults::NUM_PROCESSORS
    }
    const fn default_fetch_rate() -> usize {
        defaults::FETCH_RATE
    }
    const fn default_dispatch_width() -> usize {
        defaults::DISPATCH_WIDTH
    }
    const fn default_schedule_width() -> usize {
        defaults::SCHEDULE_WIDTH
    }
    const fn default_num_fast_alu() -> usize {
        defaults::NUM_FAST_ALU
    }
    const fn default_num_long_alu() -> usize {
        defaults::NUM_LONG_ALU
    }
    const fn default_num_cdb() -> usize {
        defaults::NUM_CDB
    }

    /// Dispatch-queue capacity, derived per the core's sizing formula.
    #[must_use]
    pub fn dispatch_queue_capacity(&self) -> usize {
        self.dispatch_width * self.schedule_width * (self.num_fast_alu + self.num_long_alu)
    }

    /// Fast-ALU half of the schedule-queue capacity.
    #[must_use]
    pub fn schedule_queue_fast_capacity(&self) -> usize {
        self.schedule_width * self.num_fast_alu
    }

    /// Long-ALU half of the schedule-queue capacity.
    #[must_use]
    pub fn schedule_queue_long_capacity(&self) -> usize {
        self.schedule_width * self.num_long_alu
    }
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            num_processors: Self::default_num_processors(),
            fetch_rate: Self::default_fetch_rate(),
            dispatch_width: Self::default_dispatch_width(),
            schedule_width: Self::default_schedule_width(),
            num_fast_alu: Self::default_num_fast_alu(),
            num_long_alu: Self::default_num_long_alu(),
            num_cdb: Self::default_num_cdb(),
        }
    }
}

/// General, cross-cutting settings.
#[derive(Debug, Clone, Deserialize)]
pub struct GeneralConfig {
    /// Emit a `tracing` event for every component tick and request
    /// transition; off by default since it is diagnostic-only.
    #[serde(default)]
    pub trace_events: bool,
    /// Ticks without a memory-op completion before the stall watchdog
    /// emits a diagnostic warning.
    #[serde(default = "GeneralConfig::default_stall_time")]
    pub stall_time: u64,
    /// Fixed latency of the backend memory model.
    #[serde(default = "GeneralConfig::default_memory_latency")]
    pub memory_latency: u64,
}

impl GeneralConfig {
    const fn default_stall_time() -> u64 {
        defaults::STALL_TIME
    }
    const fn default_memory_latency() -> u64 {
        defaults::MEMORY_LATENCY
    }
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            trace_events: false,
            stall_time: Self::default_stall_time(),
            memory_latency: Self::default_memory_latency(),
        }
    }
}

/// Root configuration, assembled from every subsystem's CLI flags (or
/// deserialized directly from JSON for tests and scripted scenarios).
///
/// # Examples
///
/// ```
/// use cmpsim_core::config::Config;
///
/// let config = Config::default();
/// assert_eq!(config.core.num_processors, 1);
/// assert_eq!(config.cache.ways, 4);
/// ```
///
/// ```
/// use cmpsim_core::config::{Config, Protocol, Topology};
///
/// let json = r#"{
///     "cache": { "set_bits": 1, "ways": 2, "block_bits": 4 },
///     "coherence": { "protocol": "MESI" },
///     "interconnect": { "topology": "ring" },
///     "core": { "num_processors": 4 }
/// }"#;
/// let config: Config = serde_json::from_str(json).unwrap();
/// assert_eq!(config.coherence.protocol, Protocol::Mesi);
/// assert_eq!(config.interconnect.topology, Topology::Ring);
/// assert_eq!(config.core.num_processors, 4);
/// ```
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    /// Cross-cutting settings.
    #[serde(default)]
    pub general: GeneralConfig,
    /// Cache hierarchy parameters.
    #[serde(default)]
    pub cache: CacheConfig,
    /// Branch predictor parameters.
    #[serde(default)]
    pub branch: BranchConfig,
    /// Coherence protocol selection.
    #[serde(default)]
    pub coherence: CoherenceConfig,
    /// Interconnect topology and timing.
    #[serde(default)]
    pub interconnect: InterconnectConfig,
    /// Processor core parameters.
    #[serde(default)]
    pub core: CoreConfig,
}

/// Coherence-protocol configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CoherenceConfig {
    /// Which snoop protocol the coherence controller runs.
    #[serde(default)]
    pub protocol: Protocol,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_matches_documented_defaults() {
        let config = Config::default();
        assert_eq!(config.cache.ways, 4);
        assert_eq!(config.core.num_processors, 1);
        assert_eq!(config.coherence.protocol, Protocol::Msi);
        assert!(!config.cache.victim_buffer_enabled());
        assert_eq!(config.cache.policy(), ReplacementPolicy::Lru);
    }

    #[test]
    fn victim_buffer_and_rrip_are_gated_by_nonzero_flags() {
        let mut cache = CacheConfig::default();
        cache.victim_capacity = 4;
        cache.rrip_bits = 2;
        assert!(cache.victim_buffer_enabled());
        assert_eq!(cache.policy(), ReplacementPolicy::Rrip);
    }

    #[test]
    fn dispatch_queue_capacity_follows_sizing_formula() {
        let core = CoreConfig {
            dispatch_width: 2,
            schedule_width: 3,
            num_fast_alu: 2,
            num_long_alu: 1,
            ..CoreConfig::default()
        };
        assert_eq!(core.dispatch_queue_capacity(), 2 * 3 * (2 + 1));
        assert_eq!(core.schedule_queue_fast_capacity(), 6);
        assert_eq!(core.schedule_queue_long_capacity(), 3);
    }
}
