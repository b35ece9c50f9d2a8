//! Branch prediction: an address-to-address function with its own tables,
//! peripheral to the core pipeline.

pub use self::predictor::BranchPredictor;

/// Branch Target Buffer.
pub mod btb;
/// GSelect global-history predictor (`-g 2`).
pub mod gselect;
/// Branch predictor trait.
pub mod predictor;
/// Static "always not taken" predictor (`-g 0`).
pub mod static_bp;

use self::{gselect::GSelectPredictor, static_bp::StaticPredictor};

/// Selects which predictor flavor a [`BranchPredictorWrapper`] wraps.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flavor {
    /// PC-indexed static predictor (CLI `-g 0`).
    Static,
    /// GSelect global-history predictor (CLI `-g 2`).
    GSelect,
}

/// Enum wrapper for static dispatch of branch predictors, avoiding vtable
/// lookups in the per-tick fetch loop.
pub enum BranchPredictorWrapper {
    /// Wraps [`StaticPredictor`].
    Static(StaticPredictor),
    /// Wraps [`GSelectPredictor`].
    GSelect(GSelectPredictor),
}

impl BranchPredictorWrapper {
    /// Builds a wrapper for the requested flavor.
    ///
    /// `table_bits` and `bhr_bits` come from the `-s`/`-b` CLI flags as
    /// interpreted for the branch subsystem; they are unused for
    /// [`Flavor::Static`].
    #[must_use]
    pub fn new(flavor: Flavor, table_bits: u32, bhr_bits: u32, btb_size: usize) -> Self {
        match flavor {
            Flavor::Static => Self::Static(StaticPredictor::new(btb_size)),
            Flavor::GSelect => {
                Self::GSelect(GSelectPredictor::new(table_bits, bhr_bits, btb_size))
            }
        }
    }
}

impl BranchPredictor for BranchPredictorWrapper {
    fn predict_branch(&self, pc: u64) -> (bool, Option<u64>) {
        match self {
            Self::Static(bp) => bp.predict_branch(pc),
            Self::GSelect(bp) => bp.predict_branch(pc),
        }
    }

    fn update_branch(&mut self, pc: u64, taken: bool, target: Option<u64>) {
        match self {
            Self::Static(bp) => bp.update_branch(pc, taken, target),
            Self::GSelect(bp) => bp.update_branch(pc, taken, target),
        }
    }
}
