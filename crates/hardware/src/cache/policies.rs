//! Victim-selection policies for a set-associative cache.
//!
//! Both policies operate on the `timestamp` field of [`CacheLine`](super::CacheLine):
//! LRU treats it as a monotonic access counter (smaller = older), RRIP treats
//! it as a re-reference counter (larger = closer to eviction).

/// Chooses which way within a set to evict on a miss.
#[derive(Debug, Clone, Copy)]
pub enum Policy {
    /// Least-recently-used: victim is the line with the smallest timestamp.
    Lru,
    /// Re-Reference Interval Prediction: victim is the line with the
    /// largest timestamp, after redistributing any shortfall so at least
    /// one line reaches the maximum value `2^rrip_bits - 1`.
    Rrip {
        /// Counter width in bits.
        bits: u32,
    },
}

impl Policy {
    /// The timestamp assigned to a newly installed line, before the first
    /// access bumps it.
    #[must_use]
    pub fn install_timestamp(&self, access_counter: u64) -> u64 {
        match self {
            Policy::Lru => access_counter,
            Policy::Rrip { bits } => (1u64 << bits) - 2,
        }
    }

    /// The timestamp a line is given on a hit.
    #[must_use]
    pub fn hit_timestamp(&self, access_counter: u64) -> u64 {
        match self {
            Policy::Lru => access_counter,
            Policy::Rrip { .. } => 0,
        }
    }

    /// Picks the victim way among `timestamps`, redistributing RRIP
    /// shortfall across the set first if needed. Returns the chosen index
    /// and, for RRIP, the updated timestamps.
    pub fn choose_victim(&self, timestamps: &mut [u64]) -> usize {
        match self {
            Policy::Lru => timestamps
                .iter()
                .enumerate()
                .min_by_key(|&(_, &ts)| ts)
                .map(|(i, _)| i)
                .expect("set has at least one way"),
            Policy::Rrip { bits } => {
                let max_value = (1u64 << bits) - 1;
                let victim = timestamps
                    .iter()
                    .enumerate()
                    .max_by_key(|&(_, &ts)| ts)
                    .map(|(i, _)| i)
                    .expect("set has at least one way");
                if timestamps[victim] < max_value {
                    let diff = max_value - timestamps[victim];
                    for ts in timestamps.iter_mut() {
                        *ts += diff;
                    }
                }
                victim
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::Policy;

    #[test]
    fn lru_picks_smallest_timestamp() {
        let mut ts = vec![5, 1, 9];
        assert_eq!(Policy::Lru.choose_victim(&mut ts), 1);
    }

    #[test]
    fn rrip_redistributes_shortfall_before_choosing() {
        let policy = Policy::Rrip { bits: 2 };
        let mut ts = vec![1, 2];
        let victim = policy.choose_victim(&mut ts);
        assert_eq!(victim, 1);
        assert_eq!(ts[victim], 3);
    }

    #[test]
    fn rrip_no_redistribution_when_max_already_present() {
        let policy = Policy::Rrip { bits: 2 };
        let mut ts = vec![3, 0];
        let victim = policy.choose_victim(&mut ts);
        assert_eq!(victim, 0);
        assert_eq!(ts, vec![3, 0]);
    }
}
