//! Bus topology: a single shared medium, at most one transaction live at a
//! time, round-robin arbitration among processors.
//!
//! Mirrors `original_source/interconnectProj/interconnectProj.c`'s bus
//! model: a FIFO of queued requests, one active transaction progressing
//! through `QUEUED -> WAITING_CACHE -> WAITING_MEMORY -> TRANSFERING_{CACHE,MEMORY}`.
//! The snoop only fires once the `WAITING_CACHE` countdown (`cache_delay`)
//! has fully elapsed, at the same instant the speculative memory request is
//! issued; a cache-to-cache hit then short-circuits straight to
//! `TRANSFERING_CACHE` instead of waiting on memory, so a coherent
//! cache-to-cache transfer still costs `cache_delay + cache_transfer` ticks
//! in total, never just `cache_transfer`.

use std::collections::VecDeque;

use crate::coherence::CoherenceController;
use crate::coherence::MsgKind;
use crate::memory::{FixedLatencyMemory, MemoryLike};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BusState {
    Queued,
    WaitingCache,
    WaitingMemory,
    TransferingCache,
    TransferingMemory,
}

struct Transaction {
    kind: MsgKind,
    addr: u64,
    proc_num: usize,
    state: BusState,
    remaining: u64,
    shared: bool,
    is_writeback: bool,
}

/// Bus fabric: owns the FIFO of queued/active transactions and the fairness
/// cursor.
pub struct BusFabric {
    n: usize,
    cache_delay: u64,
    cache_transfer: u64,
    queue: VecDeque<Transaction>,
    active: Option<Transaction>,
    last_proc: usize,
    pub(super) transactions_issued: u64,
    pub(super) broadcasts_completed: u64,
}

impl BusFabric {
    #[must_use]
    pub fn new(n: usize, cache_delay: u64, cache_transfer: u64) -> Self {
        Self {
            n,
            cache_delay,
            cache_transfer,
            queue: VecDeque::new(),
            active: None,
            last_proc: 0,
            transactions_issued: 0,
            broadcasts_completed: 0,
        }
    }

    pub fn issue(&mut self, kind: MsgKind, addr: u64, proc_num: usize) {
        self.transactions_issued += 1;
        self.queue.push_back(Transaction {
            kind,
            addr,
            proc_num,
            state: BusState::Queued,
            remaining: 0,
            shared: false,
            is_writeback: false,
        });
    }

    pub fn issue_writeback(&mut self, addr: u64, proc_num: usize) {
        self.transactions_issued += 1;
        self.queue.push_back(Transaction {
            kind: MsgKind::BusWr,
            addr,
            proc_num,
            state: BusState::Queued,
            remaining: 0,
            shared: false,
            is_writeback: true,
        });
    }

    /// Round-robin pick starting at `(last_proc + 1) mod n`, among whatever
    /// is queued; the queue is usually small (one outstanding request per
    /// processor is typical), so a linear scan is fine.
    fn pick_next(&mut self) -> Option<Transaction> {
        if self.queue.is_empty() {
            return None;
        }
        let n = self.n.max(1);
        let mut best_idx = 0;
        let mut best_rank = usize::MAX;
        for (idx, txn) in self.queue.iter().enumerate() {
            let rank = (txn.proc_num + n - (self.last_proc + 1) % n) % n;
            if rank < best_rank {
                best_rank = rank;
                best_idx = idx;
            }
        }
        self.queue.remove(best_idx)
    }

    pub fn tick(&mut self, coherence: &mut CoherenceController, memory: &mut FixedLatencyMemory) {
        for (proc_num, addr) in memory.tick() {
            if let Some(txn) = &mut self.active {
                if txn.state == BusState::WaitingMemory && txn.proc_num == proc_num && txn.addr == addr {
                    txn.state = BusState::TransferingMemory;
                    txn.remaining = self.cache_transfer;
                }
            }
        }

        if self.active.is_none() {
            self.active = self.pick_next();
            if let Some(txn) = &mut self.active {
                self.last_proc = txn.proc_num;
                txn.state = BusState::WaitingCache;
                txn.remaining = self.cache_delay;
            }
        }

        let Some(txn) = &mut self.active else { return };
        if txn.remaining > 0 {
            txn.remaining -= 1;
            if txn.remaining > 0 {
                return;
            }
        }

        match txn.state {
            BusState::WaitingCache => {
                if txn.is_writeback {
                    txn.state = BusState::TransferingCache;
                    txn.remaining = self.cache_transfer;
                } else {
                    // The snoop phase and the speculative memory request fire
                    // together, the instant the cache_delay countdown fully
                    // elapses — never before it, and never at activation time.
                    let latency = memory.bus_req(txn.addr, txn.proc_num);
                    txn.state = BusState::WaitingMemory;
                    txn.remaining = latency.max(1);
                    for other in 0..self.n {
                        if other == txn.proc_num {
                            continue;
                        }
                        if let Some(resp) = coherence.on_snoop(other, txn.kind, txn.addr) {
                            match resp {
                                MsgKind::Data | MsgKind::SharedData => {
                                    txn.state = BusState::TransferingCache;
                                    txn.remaining = self.cache_transfer;
                                    txn.shared = resp == MsgKind::SharedData;
                                }
                                MsgKind::Shared => txn.shared = true,
                                MsgKind::Ack | MsgKind::BusRd | MsgKind::BusWr => {}
                            }
                        }
                    }
                }
            }
            BusState::WaitingMemory => {
                // Still waiting on the memory completion delivered above.
            }
            BusState::TransferingCache | BusState::TransferingMemory => {
                let Transaction { proc_num, addr, shared, is_writeback, .. } =
                    self.active.take().unwrap_or_else(|| unreachable!("active transaction present"));
                if is_writeback {
                    coherence.on_invl_complete(proc_num, addr);
                } else {
                    let final_kind = if shared { MsgKind::Shared } else { MsgKind::Data };
                    coherence.on_complete(proc_num, addr, final_kind);
                    self.broadcasts_completed += 1;
                }
            }
            BusState::Queued => unreachable!("active transaction is never left Queued"),
        }
    }
}
