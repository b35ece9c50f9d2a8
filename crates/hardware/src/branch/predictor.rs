//! Branch predictor interface.

/// Trait for branch prediction algorithms.
pub trait BranchPredictor {
    /// Predicts whether a branch instruction will be taken and its target.
    fn predict_branch(&self, pc: u64) -> (bool, Option<u64>);

    /// Updates the predictor with the actual outcome of a branch.
    fn update_branch(&mut self, pc: u64, taken: bool, target: Option<u64>);
}
