//! Branch Target Buffer (BTB).
//!
//! The BTB is a direct-mapped cache that stores target addresses for control
//! flow instructions, letting the fetch stage predict a branch's target
//! before it is resolved.

/// An entry in the Branch Target Buffer.
#[derive(Clone, Copy, Default)]
struct BtbEntry {
    /// The tag used to verify if this entry corresponds to the requested PC.
    tag: u64,
    /// The predicted target address.
    target: u64,
    /// Indicates if this entry contains valid data.
    valid: bool,
}

/// Branch Target Buffer structure.
pub struct Btb {
    /// The table of BTB entries.
    table: Vec<BtbEntry>,
    /// The total number of entries in the BTB.
    size: usize,
}

impl Btb {
    /// Creates a new Branch Target Buffer with the specified size.
    ///
    /// # Panics
    ///
    /// Panics if `size` is not a power of two.
    pub fn new(size: usize) -> Self {
        assert!(size.is_power_of_two(), "BTB size must be a power of two");
        Self {
            table: vec![BtbEntry::default(); size],
            size,
        }
    }

    fn index(&self, pc: u64) -> usize {
        ((pc >> 2) as usize) & (self.size - 1)
    }

    /// Looks up a target address for the given program counter.
    pub fn lookup(&self, pc: u64) -> Option<u64> {
        let idx = self.index(pc);
        let e = self.table[idx];
        if e.valid && e.tag == pc {
            Some(e.target)
        } else {
            None
        }
    }

    /// Writes a new entry (or overwrites an existing one) for `pc`.
    pub fn update(&mut self, pc: u64, target: u64) {
        let idx = self.index(pc);
        self.table[idx] = BtbEntry {
            tag: pc,
            target,
            valid: true,
        };
    }
}
