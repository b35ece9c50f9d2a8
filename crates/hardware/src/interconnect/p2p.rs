//! Point-to-point fabrics (line, ring, mesh): per-link queuing, broadcast
//! flooding with duplicate suppression, and ack-counted completion.
//!
//! Grounded in `original_source/interconnectProj/interconnectProj.c`'s
//! `link`/`enqLinkRequest`/`deqLinkRequest` plus the ring/mesh
//! `forwardIfNeeded` broadcast relay. A coherence request becomes a
//! broadcast [`Message`] flooded outward from the requester's node, one hop
//! per [`P2pFabric::hop_latency`] ticks; each receiving node snoops exactly
//! once per `(p_src, msg_num)` courtesy of `last_msgs`, and per Open
//! Question (ii)'s resolution the source never re-delivers to itself.
//! Snoop responses (ACK/DATA/SHARED/SHARED_DATA) are routed back to the
//! requester as a single timed delivery over the shortest-path hop
//! distance rather than re-simulating the return trip hop-by-hop — the
//! property under test (`numAcks == n-1` at completion, and per-source
//! delivery exactly once) does not depend on contention along the ack
//! path, only on the flood.

use std::collections::HashMap;

use crate::coherence::CoherenceController;
use crate::coherence::MsgKind;
use crate::memory::{FixedLatencyMemory, MemoryLike};

use super::topology::{distance, memory_node, next_hop};

#[derive(Debug, Clone, Copy)]
struct Message {
    kind: MsgKind,
    addr: u64,
    p_src: usize,
    msg_num: u64,
}

struct FloodHop {
    remaining: u64,
    to: usize,
    arrived_from: usize,
    msg: Message,
}

/// A timed ack/data delivery travelling back to the original requester.
struct AckHop {
    remaining: u64,
    msg_num: u64,
    kind: MsgKind,
}

/// A request en route to, or a completion en route back from, the memory
/// node. `at_memory` distinguishes which leg of the trip this hop models.
struct MemHop {
    remaining: u64,
    proc_num: usize,
    addr: u64,
    is_writeback: bool,
    at_memory: bool,
}

struct ActiveRequest {
    addr: u64,
    proc_num: usize,
    acks: usize,
    data_kind: Option<MsgKind>,
}

/// Shared fabric for line/ring/mesh: floods broadcasts, suppresses
/// duplicates, and counts acks to completion.
pub struct P2pFabric {
    n: usize,
    adj: Vec<Vec<usize>>,
    hop_latency: u64,
    next_msg_num: u64,
    last_msgs: Vec<HashMap<usize, u64>>,
    flood: Vec<FloodHop>,
    acks: Vec<AckHop>,
    mem_hops: Vec<MemHop>,
    active: HashMap<u64, ActiveRequest>,
    pub(super) transactions_issued: u64,
    pub(super) broadcasts_completed: u64,
}

impl P2pFabric {
    #[must_use]
    pub fn new(adj: Vec<Vec<usize>>, n: usize, hop_latency: u64) -> Self {
        Self {
            n,
            last_msgs: vec![HashMap::new(); n + 1],
            adj,
            hop_latency: hop_latency.max(1),
            next_msg_num: 1,
            flood: Vec::new(),
            acks: Vec::new(),
            mem_hops: Vec::new(),
            active: HashMap::new(),
            transactions_issued: 0,
            broadcasts_completed: 0,
        }
    }

    fn broadcast(&mut self, msg: Message) {
        for &nbr in &self.adj[msg.p_src].clone() {
            if nbr >= self.n {
                continue; // the memory link, not a snooping peer
            }
            self.flood.push(FloodHop { remaining: self.hop_latency, to: nbr, arrived_from: msg.p_src, msg });
        }
    }

    pub fn issue(&mut self, kind: MsgKind, addr: u64, proc_num: usize) {
        self.transactions_issued += 1;
        let msg_num = self.next_msg_num;
        self.next_msg_num += 1;
        self.active.insert(msg_num, ActiveRequest { addr, proc_num, acks: 0, data_kind: None });
        if self.n <= 1 {
            self.send_to_memory(proc_num, addr, false);
            self.active.remove(&msg_num);
            return;
        }
        self.broadcast(Message { kind, addr, p_src: proc_num, msg_num });
    }

    pub fn issue_writeback(&mut self, addr: u64, proc_num: usize) {
        self.transactions_issued += 1;
        self.send_to_memory(proc_num, addr, true);
    }

    fn send_to_memory(&mut self, proc_num: usize, addr: u64, is_writeback: bool) {
        let dist = distance(&self.adj, proc_num, memory_node(self.n));
        self.mem_hops.push(MemHop {
            remaining: (dist * self.hop_latency).max(1),
            proc_num,
            addr,
            is_writeback,
            at_memory: false,
        });
    }

    pub fn tick(&mut self, coherence: &mut CoherenceController, memory: &mut FixedLatencyMemory) {
        for (proc_num, addr) in memory.tick() {
            let dist = distance(&self.adj, memory_node(self.n), proc_num);
            // The preceding `bus_req` that produced this completion always
            // came from a MemHop that just landed `at_memory`; we don't
            // track which one here (FixedLatencyMemory already matched
            // proc_num/addr 1:1), so this return trip only needs to know
            // whether it is a writeback-drain ack or a fetched line.
            self.mem_hops.push(MemHop {
                remaining: (dist * self.hop_latency).max(1),
                proc_num,
                addr,
                is_writeback: false,
                at_memory: true,
            });
        }

        let mut still_flying = Vec::new();
        for mut hop in self.flood.drain(..) {
            hop.remaining = hop.remaining.saturating_sub(1);
            if hop.remaining == 0 {
                self.arrive_flood(coherence, hop);
            } else {
                still_flying.push(hop);
            }
        }
        self.flood = still_flying;

        let mut still_acking = Vec::new();
        for mut hop in self.acks.drain(..) {
            hop.remaining = hop.remaining.saturating_sub(1);
            if hop.remaining == 0 {
                self.arrive_ack(coherence, memory, hop);
            } else {
                still_acking.push(hop);
            }
        }
        self.acks = still_acking;

        let mut still_memhop = Vec::new();
        for mut hop in self.mem_hops.drain(..) {
            hop.remaining = hop.remaining.saturating_sub(1);
            if hop.remaining == 0 {
                self.arrive_mem_hop(coherence, memory, hop);
            } else {
                still_memhop.push(hop);
            }
        }
        self.mem_hops = still_memhop;
    }

    fn arrive_flood(&mut self, coherence: &mut CoherenceController, hop: FloodHop) {
        let msg = hop.msg;
        if hop.to == msg.p_src {
            return; // no self-delivery (Open Question ii)
        }
        let watermark = self.last_msgs[hop.to].entry(msg.p_src).or_insert(0);
        if *watermark >= msg.msg_num {
            return; // duplicate, suppressed
        }
        *watermark = msg.msg_num;

        if let Some(resp) = coherence.on_snoop(hop.to, msg.kind, msg.addr) {
            let dist = distance(&self.adj, hop.to, msg.p_src);
            self.acks.push(AckHop { remaining: (dist * self.hop_latency).max(1), msg_num: msg.msg_num, kind: resp });
        }

        for &nbr in &self.adj[hop.to].clone() {
            if nbr == hop.arrived_from || nbr >= self.n {
                continue;
            }
            self.flood.push(FloodHop { remaining: self.hop_latency, to: nbr, arrived_from: hop.to, msg });
        }
    }

    fn arrive_ack(&mut self, coherence: &mut CoherenceController, memory: &mut FixedLatencyMemory, hop: AckHop) {
        let Some(req) = self.active.get_mut(&hop.msg_num) else { return };
        req.acks += 1;
        if matches!(hop.kind, MsgKind::Data | MsgKind::SharedData) {
            req.data_kind = Some(hop.kind);
        }
        if req.acks == self.n.saturating_sub(1) {
            let req = self.active.remove(&hop.msg_num).expect("present, just matched");
            if let Some(kind) = req.data_kind {
                coherence.on_complete(req.proc_num, req.addr, kind);
                self.broadcasts_completed += 1;
            } else {
                let _ = memory.bus_req(req.addr, req.proc_num);
                // Completion for (proc_num, addr) surfaces via
                // `memory.tick()` at the top of a later `tick()` call.
            }
        }
    }

    fn arrive_mem_hop(&mut self, coherence: &mut CoherenceController, memory: &mut FixedLatencyMemory, hop: MemHop) {
        if hop.at_memory {
            coherence.on_complete(hop.proc_num, hop.addr, MsgKind::Data);
            self.broadcasts_completed += 1;
        } else if hop.is_writeback {
            // Modeled as complete once the write reaches memory; unlike a
            // read there is no reply payload to route back.
            coherence.on_invl_complete(hop.proc_num, hop.addr);
        } else {
            let _ = memory.bus_req(hop.addr, hop.proc_num);
        }
    }

    /// Next hop toward `to` from `from`, exposed for tests asserting routing.
    #[must_use]
    pub fn route(&self, from: usize, to: usize) -> usize {
        next_hop(&self.adj, from, to)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Protocol, Topology};
    use crate::interconnect::topology::build_adjacency;

    fn fabric(topology: Topology, n: usize) -> P2pFabric {
        P2pFabric::new(build_adjacency(topology, n), n, 1)
    }

    #[test]
    fn ring_broadcast_reaches_every_other_processor_exactly_once() {
        let mut fabric = fabric(Topology::Ring, 4);
        let mut coherence = CoherenceController::new(Protocol::Msi, 4);
        let mut memory = FixedLatencyMemory::new(5);

        fabric.issue(MsgKind::BusRd, 0x40, 0);
        for _ in 0..10 {
            fabric.tick(&mut coherence, &mut memory);
        }
        assert_eq!(*fabric.last_msgs[1].get(&0).unwrap(), 1);
        assert_eq!(*fabric.last_msgs[2].get(&0).unwrap(), 1);
        assert_eq!(*fabric.last_msgs[3].get(&0).unwrap(), 1);
        assert!(fabric.active.is_empty());
    }

    #[test]
    fn single_core_request_routes_straight_to_memory() {
        let mut fabric = fabric(Topology::Ring, 1);
        let mut coherence = CoherenceController::new(Protocol::Msi, 1);
        let mut memory = FixedLatencyMemory::new(3);
        fabric.issue(MsgKind::BusRd, 0x0, 0);
        let mut completed = false;
        for _ in 0..10 {
            fabric.tick(&mut coherence, &mut memory);
            if coherence.state_for_test(0, 0x0).is_some() {
                completed = true;
            }
        }
        assert!(completed);
    }
}
