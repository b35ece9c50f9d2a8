//! Static branch predictor ("always not taken"), CLI flavor `-g 0`.
//!
//! Conditional branches always fall through; a BTB still drives target
//! prediction for the branches that are (mispredicted-but-)taken.

use super::{btb::Btb, predictor::BranchPredictor};

/// Static predictor structure.
pub struct StaticPredictor {
    btb: Btb,
}

impl StaticPredictor {
    /// Creates a new static predictor with the given BTB size.
    pub fn new(btb_size: usize) -> Self {
        Self { btb: Btb::new(btb_size) }
    }
}

impl BranchPredictor for StaticPredictor {
    fn predict_branch(&self, _pc: u64) -> (bool, Option<u64>) {
        (false, None)
    }

    fn update_branch(&mut self, pc: u64, _taken: bool, target: Option<u64>) {
        if let Some(tgt) = target {
            self.btb.update(pc, tgt);
        }
    }
}
