//! Adjacency and routing helpers for the point-to-point topologies (line,
//! ring, mesh). The bus topology needs none of this — it has no per-link
//! structure at all.
//!
//! Every topology here is modeled as an undirected graph over `n` processor
//! nodes plus one extra node, [`memory_node`], representing the single link
//! out to main memory. Adjacency is built once at [`crate::interconnect::Interconnect::new`]
//! time and then only ever read.

use crate::config::Topology;

/// The node id standing in for main memory in the adjacency graph.
#[must_use]
pub fn memory_node(n: usize) -> usize {
    n
}

/// Builds the neighbor list for every node (0..n are processors, node `n`
/// is memory) under `topology`.
#[must_use]
pub fn build_adjacency(topology: Topology, n: usize) -> Vec<Vec<usize>> {
    let mem = memory_node(n);
    let mut adj = vec![Vec::new(); n + 1];
    let mut link = |a: usize, b: usize, adj: &mut Vec<Vec<usize>>| {
        if !adj[a].contains(&b) {
            adj[a].push(b);
        }
        if !adj[b].contains(&a) {
            adj[b].push(a);
        }
    };

    match topology {
        Topology::Bus => {}
        Topology::Line => {
            for i in 0..n.saturating_sub(1) {
                link(i, i + 1, &mut adj);
            }
            if n > 0 {
                link(0, mem, &mut adj);
            }
        }
        Topology::Ring => {
            if n > 1 {
                for i in 0..n {
                    link(i, (i + 1) % n, &mut adj);
                }
            }
            if n > 0 {
                link(0, mem, &mut adj);
            }
        }
        Topology::Mesh => {
            let w = (n as f64).sqrt().round() as usize;
            let w = w.max(1);
            for i in 0..n {
                let (r, c) = (i / w, i % w);
                if c + 1 < w && i + 1 < n {
                    link(i, i + 1, &mut adj);
                }
                if r + 1 < (n + w - 1) / w && i + w < n {
                    link(i, i + w, &mut adj);
                }
            }
            if n > 0 {
                link(0, mem, &mut adj);
            }
        }
    }
    adj
}

/// Breadth-first shortest-path next hop from `from` toward `to`. Returns
/// `from` itself if `from == to` (caller should treat that as "arrived").
///
/// Ties (multiple shortest paths) are broken by always preferring the
/// lowest-numbered neighbor first, matching the spec's "lower-ID direction
/// first" tie-break for the ring.
#[must_use]
pub fn next_hop(adj: &[Vec<usize>], from: usize, to: usize) -> usize {
    if from == to {
        return from;
    }
    let mut prev = vec![None; adj.len()];
    let mut visited = vec![false; adj.len()];
    let mut queue = std::collections::VecDeque::new();
    queue.push_back(from);
    visited[from] = true;
    while let Some(node) = queue.pop_front() {
        if node == to {
            break;
        }
        let mut neighbors = adj[node].clone();
        neighbors.sort_unstable();
        for nbr in neighbors {
            if !visited[nbr] {
                visited[nbr] = true;
                prev[nbr] = Some(node);
                queue.push_back(nbr);
            }
        }
    }
    // Walk back from `to` until we find the step taken directly out of `from`.
    let mut cur = to;
    while let Some(p) = prev[cur] {
        if p == from {
            return cur;
        }
        cur = p;
    }
    to
}

/// Hop-count shortest-path distance from `from` to `to`.
#[must_use]
pub fn distance(adj: &[Vec<usize>], from: usize, to: usize) -> u64 {
    if from == to {
        return 0;
    }
    let mut dist = vec![None; adj.len()];
    let mut queue = std::collections::VecDeque::new();
    queue.push_back(from);
    dist[from] = Some(0u64);
    while let Some(node) = queue.pop_front() {
        let d = dist[node].expect("dequeued node was visited");
        if node == to {
            return d;
        }
        for &nbr in &adj[node] {
            if dist[nbr].is_none() {
                dist[nbr] = Some(d + 1);
                queue.push_back(nbr);
            }
        }
    }
    dist[to].unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ring_of_four_links_each_node_to_two_neighbors_plus_memory_at_node_zero() {
        let adj = build_adjacency(Topology::Ring, 4);
        assert_eq!(adj[0].len(), 3); // neighbors 1, 3, and memory
        assert_eq!(adj[1].len(), 2);
        assert!(adj[0].contains(&memory_node(4)));
    }

    #[test]
    fn line_has_no_wraparound() {
        let adj = build_adjacency(Topology::Line, 4);
        assert!(!adj[3].contains(&0));
        assert_eq!(adj[3].len(), 1);
    }

    #[test]
    fn distance_on_ring_takes_shorter_direction() {
        let adj = build_adjacency(Topology::Ring, 4);
        assert_eq!(distance(&adj, 0, 2), 2);
        assert_eq!(distance(&adj, 0, 1), 1);
    }

    #[test]
    fn next_hop_steps_toward_destination() {
        let adj = build_adjacency(Topology::Line, 4);
        assert_eq!(next_hop(&adj, 0, 3), 1);
        assert_eq!(next_hop(&adj, 2, 0), 1);
    }
}
