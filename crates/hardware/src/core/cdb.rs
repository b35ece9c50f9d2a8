//! Common data bus: a fixed-size, double-buffered array of broadcast slots.
//!
//! State update writes into the "issued" half this tick; schedule only ever
//! reads the "visible" half, which becomes this tick's issued contents only
//! after [`Cdb::shift`] runs at the end of the tick — this is what makes a
//! wakeup broadcast in tick N visible to the scheduler in tick N+1 and not
//! sooner, per the core's per-tick stage order.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CdbSlot {
    pub tag: u64,
}

/// Double-buffered CDB with `num_slots` entries per buffer.
#[derive(Debug, Clone)]
pub struct Cdb {
    issued: Vec<Option<CdbSlot>>,
    visible: Vec<Option<CdbSlot>>,
}

impl Cdb {
    #[must_use]
    pub fn new(num_slots: usize) -> Self {
        Self { issued: vec![None; num_slots.max(1)], visible: vec![None; num_slots.max(1)] }
    }

    /// Total slot count.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.issued.len()
    }

    /// Writes `tag` into the next free "issued" slot this tick. Returns
    /// `false` if every slot is already occupied (the caller must not have
    /// exceeded `num_cdb` retirements per tick).
    pub fn issue(&mut self, tag: u64) -> bool {
        if let Some(slot) = self.issued.iter_mut().find(|s| s.is_none()) {
            *slot = Some(CdbSlot { tag });
            true
        } else {
            false
        }
    }

    /// The tags visible to schedule's wakeup this tick.
    pub fn visible_tags(&self) -> impl Iterator<Item = u64> + '_ {
        self.visible.iter().filter_map(|s| s.map(|slot| slot.tag))
    }

    /// Moves this tick's issued slots into next tick's visible slots and
    /// clears the issued half for the next round of state-update writes.
    pub fn shift(&mut self) {
        self.visible.clone_from(&self.issued);
        for slot in &mut self.issued {
            *slot = None;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn issued_tag_is_not_visible_until_shift() {
        let mut cdb = Cdb::new(2);
        assert!(cdb.issue(7));
        assert_eq!(cdb.visible_tags().count(), 0);
        cdb.shift();
        assert_eq!(cdb.visible_tags().collect::<Vec<_>>(), vec![7]);
    }

    #[test]
    fn issue_fails_once_every_slot_is_full() {
        let mut cdb = Cdb::new(1);
        assert!(cdb.issue(1));
        assert!(!cdb.issue(2));
    }

    #[test]
    fn shift_clears_issued_for_the_next_round() {
        let mut cdb = Cdb::new(1);
        cdb.issue(1);
        cdb.shift();
        assert!(cdb.issue(2));
        cdb.shift();
        assert_eq!(cdb.visible_tags().collect::<Vec<_>>(), vec![2]);
    }
}
