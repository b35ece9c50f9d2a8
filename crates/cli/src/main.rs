//! `cmpsim`: drives [`cmpsim_core::Simulator`] against a trace file.
//!
//! Per the design's CLI surface, each subsystem parses its own slice of
//! argv rather than sharing one flat flag namespace (cache's `-s` and
//! branch's `-s` mean different things) — the trace path and subsystem
//! groups are split out by the `cache`/`branch`/`core`/`interconnect`
//! keywords before each group is handed to its own `clap::Parser`.

use std::fs::File;
use std::io::Write;
use std::process;

use clap::Parser;

use cmpsim_core::config::{
    BranchConfig, BranchFlavor, CacheConfig, Config, CoherenceConfig, CoreConfig, GeneralConfig,
    InterconnectConfig, Protocol, Topology,
};
use cmpsim_core::trace::FileTraceReader;
use cmpsim_core::Simulator;

/// `-s -E -b -i -R`.
#[derive(Parser, Debug, Default)]
#[command(no_binary_name = true)]
struct CacheArgs {
    #[arg(short = 's')]
    set_bits: Option<u32>,
    #[arg(short = 'E')]
    ways: Option<usize>,
    #[arg(short = 'b')]
    block_bits: Option<u32>,
    #[arg(short = 'i')]
    victim_capacity: Option<usize>,
    #[arg(short = 'R')]
    rrip_bits: Option<u32>,
}

/// `-s -b -g`.
#[derive(Parser, Debug, Default)]
#[command(no_binary_name = true)]
struct BranchArgs {
    #[arg(short = 's')]
    table_bits: Option<u32>,
    #[arg(short = 'b')]
    bhr_bits: Option<u32>,
    /// 0 = PC-indexed static, 2 = GSelect.
    #[arg(short = 'g')]
    flavor: Option<u32>,
}

/// `-p -f -d -m -j -k -c`.
#[derive(Parser, Debug, Default)]
#[command(no_binary_name = true)]
struct CoreArgs {
    #[arg(short = 'p')]
    num_processors: Option<usize>,
    #[arg(short = 'f')]
    fetch_rate: Option<usize>,
    #[arg(short = 'd')]
    dispatch_width: Option<usize>,
    #[arg(short = 'm')]
    schedule_width: Option<usize>,
    #[arg(short = 'j')]
    num_fast_alu: Option<usize>,
    #[arg(short = 'k')]
    num_long_alu: Option<usize>,
    #[arg(short = 'c')]
    num_cdb: Option<usize>,
}

/// `-t`, plus the cache-to-cache timing knobs the spec leaves to this
/// subsystem's own configuration.
#[derive(Parser, Debug, Default)]
#[command(no_binary_name = true)]
struct InterconnectArgs {
    /// 0 = bus, 1 = line, 2 = ring, 3 = mesh.
    #[arg(short = 't')]
    topology: Option<u32>,
    #[arg(long)]
    cache_delay: Option<u64>,
    #[arg(long)]
    cache_transfer: Option<u64>,
}

/// Cross-cutting run settings with no letter in the subsystem table.
#[derive(Parser, Debug, Default)]
#[command(no_binary_name = true)]
struct GeneralArgs {
    #[arg(long)]
    trace_events: bool,
    #[arg(long)]
    stall_time: Option<u64>,
    #[arg(long)]
    memory_latency: Option<u64>,
    /// Comma-separated statistics sections to print (default: all).
    #[arg(long, value_delimiter = ',')]
    sections: Vec<String>,
    /// Where to write the `Ticks - <N>` line (default: stdout).
    #[arg(long)]
    output: Option<String>,
}

const GROUP_KEYWORDS: &[&str] = &["cache", "branch", "core", "interconnect", "general"];

/// Splits `args` into a leading positional run (the trace path) and one
/// argument slice per recognized subsystem keyword.
fn split_groups(args: &[String]) -> (Vec<String>, Vec<(String, Vec<String>)>) {
    let mut positional = Vec::new();
    let mut groups: Vec<(String, Vec<String>)> = Vec::new();
    let mut current: Option<(String, Vec<String>)> = None;

    for arg in args {
        if GROUP_KEYWORDS.contains(&arg.as_str()) {
            if let Some(group) = current.take() {
                groups.push(group);
            }
            current = Some((arg.clone(), Vec::new()));
        } else if let Some((_, rest)) = current.as_mut() {
            rest.push(arg.clone());
        } else {
            positional.push(arg.clone());
        }
    }
    if let Some(group) = current.take() {
        groups.push(group);
    }
    (positional, groups)
}

fn branch_flavor(n: u32) -> BranchFlavor {
    match n {
        2 => BranchFlavor::GSelect,
        _ => BranchFlavor::Static,
    }
}

fn topology(n: u32) -> Topology {
    match n {
        1 => Topology::Line,
        2 => Topology::Ring,
        3 => Topology::Mesh,
        _ => Topology::Bus,
    }
}

fn build_config(groups: &[(String, Vec<String>)]) -> Config {
    let mut cache = CacheConfig::default();
    let mut branch = BranchConfig::default();
    let mut core = CoreConfig::default();
    let mut interconnect = InterconnectConfig::default();
    let mut general = GeneralConfig::default();

    for (name, rest) in groups {
        match name.as_str() {
            "cache" => {
                let args = CacheArgs::parse_from(rest.clone());
                if let Some(v) = args.set_bits {
                    cache.set_bits = v;
                }
                if let Some(v) = args.ways {
                    cache.ways = v;
                }
                if let Some(v) = args.block_bits {
                    cache.block_bits = v;
                }
                if let Some(v) = args.victim_capacity {
                    cache.victim_capacity = v;
                }
                if let Some(v) = args.rrip_bits {
                    cache.rrip_bits = v;
                }
            }
            "branch" => {
                let args = BranchArgs::parse_from(rest.clone());
                if let Some(v) = args.table_bits {
                    branch.table_bits = v;
                }
                if let Some(v) = args.bhr_bits {
                    branch.bhr_bits = v;
                }
                if let Some(v) = args.flavor {
                    branch.flavor = branch_flavor(v);
                }
            }
            "core" => {
                let args = CoreArgs::parse_from(rest.clone());
                if let Some(v) = args.num_processors {
                    core.num_processors = v;
                }
                if let Some(v) = args.fetch_rate {
                    core.fetch_rate = v;
                }
                if let Some(v) = args.dispatch_width {
                    core.dispatch_width = v;
                }
                if let Some(v) = args.schedule_width {
                    core.schedule_width = v;
                }
                if let Some(v) = args.num_fast_alu {
                    core.num_fast_alu = v;
                }
                if let Some(v) = args.num_long_alu {
                    core.num_long_alu = v;
                }
                if let Some(v) = args.num_cdb {
                    core.num_cdb = v;
                }
            }
            "interconnect" => {
                let args = InterconnectArgs::parse_from(rest.clone());
                if let Some(v) = args.topology {
                    interconnect.topology = topology(v);
                }
                if let Some(v) = args.cache_delay {
                    interconnect.cache_delay = v;
                }
                if let Some(v) = args.cache_transfer {
                    interconnect.cache_transfer = v;
                }
            }
            "general" => {
                let args = GeneralArgs::parse_from(rest.clone());
                general.trace_events = args.trace_events;
                if let Some(v) = args.stall_time {
                    general.stall_time = v;
                }
                if let Some(v) = args.memory_latency {
                    general.memory_latency = v;
                }
            }
            _ => {}
        }
    }

    Config {
        general,
        cache,
        branch,
        coherence: CoherenceConfig { protocol: Protocol::default() },
        interconnect,
        core,
    }
}

fn main() {
    tracing_subscriber::fmt::init();

    let raw: Vec<String> = std::env::args().skip(1).collect();
    let (positional, groups) = split_groups(&raw);

    let Some(trace_path) = positional.first() else {
        eprintln!("usage: cmpsim <trace-file> [cache -s N ...] [branch -s N ...] [core -p N ...] [interconnect -t N ...] [general ...]");
        process::exit(1);
    };

    let config = build_config(&groups);

    let reader = FileTraceReader::open(trace_path).unwrap_or_else(|e| {
        eprintln!("error: {e}");
        process::exit(1);
    });

    let mut sim = Simulator::new(&config, vec![Box::new(reader)]);
    sim.run();
    let stats = sim.stats();

    let general_args = groups
        .iter()
        .find(|(name, _)| name == "general")
        .map(|(_, rest)| GeneralArgs::parse_from(rest.clone()))
        .unwrap_or_default();

    match general_args.output {
        Some(path) => {
            let mut file = File::create(&path).unwrap_or_else(|e| {
                eprintln!("error: cannot open output file {path}: {e}");
                process::exit(1);
            });
            writeln!(file, "Ticks - {}", stats.ticks).ok();
        }
        None => {
            println!("Ticks - {}", stats.ticks);
        }
    }
    stats.print_sections(&general_args.sections);
}
