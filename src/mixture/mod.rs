/*!
# Mixture module
Univariate Gaussian mixtures fit by EM, where each candidate ploidy maps to `ploidy - 1` components.
Component means and weights can be pinned to the values expected for a given ploidy, see `ModelConstraints`.
*/
use derive_builder::Builder;
use serde::Serialize;

/// Expected allele-balance means and weights for each supported ploidy
pub mod expected;
/// EM fitting of a single univariate Gaussian mixture
pub mod gaussian;
/// Fits all candidate ploidies and selects the best supported one
pub mod selection;

/// Lowest ploidy that can be tested, a single component centered at 0.5
pub const MIN_PLOIDY: u8 = 2;
/// Highest ploidy that can be tested
pub const MAX_PLOIDY: u8 = 6;

#[derive(thiserror::Error, Debug, PartialEq)]
pub enum MixtureError {
    #[error("ploidy {ploidy} is not supported, values must be between {MIN_PLOIDY} and {MAX_PLOIDY}")]
    UnsupportedPloidy { ploidy: u8 },
    #[error("model constraint {value} is not supported, use 0 (none), 1 (means), or 2 (means and weights)")]
    UnsupportedConstraint { value: u8 },
    #[error("cannot fit a mixture to an empty dataset")]
    EmptyData,
    #[error("constraint has {found} values, but the mixture has {expected} components")]
    ConstraintLength { expected: usize, found: usize },
    #[error("no candidate model produced a finite score")]
    NoFiniteScore
}

impl MixtureError {
    /// Returns true for errors that come from the configuration rather than the data.
    /// These should stop the whole run instead of skipping one individual.
    pub fn is_configuration_error(&self) -> bool {
        match self {
            MixtureError::UnsupportedPloidy { .. } |
            MixtureError::UnsupportedConstraint { .. } |
            MixtureError::ConstraintLength { .. } => true,

            MixtureError::EmptyData |
            MixtureError::NoFiniteScore => false
        }
    }
}

/// Tunables for EM fitting and model selection
#[derive(Builder, Clone, Copy, Debug, PartialEq, Serialize)]
#[builder(default)]
pub struct MixtureConfig {
    /// Maximum number of EM iterations per fit
    max_iterations: usize,
    /// Convergence threshold on the change in mean log-likelihood
    tolerance: f64,
    /// Added to every component variance to keep it positive
    reg_variance: f64,
    /// A later candidate must beat the current best score by more than this to replace it
    evidence_margin: f64
}

impl Default for MixtureConfig {
    fn default() -> Self {
        Self {
            max_iterations: 100,
            tolerance: 1e-3,
            reg_variance: 1e-6,
            // "substantial" evidence on the Kass and Raftery (1995) scale
            evidence_margin: 3.2
        }
    }
}

impl MixtureConfig {
    // getters
    pub fn max_iterations(&self) -> usize {
        self.max_iterations
    }

    pub fn tolerance(&self) -> f64 {
        self.tolerance
    }

    pub fn reg_variance(&self) -> f64 {
        self.reg_variance
    }

    pub fn evidence_margin(&self) -> f64 {
        self.evidence_margin
    }
}
