
use itertools::Itertools;
use log::debug;
use serde::Serialize;

use crate::mixture::{MixtureConfig, MixtureError};
use crate::mixture::expected::{components_for_ploidy, MixtureConstraint, ModelConstraints};
use crate::mixture::gaussian::GaussianMixture;

/// One fitted candidate ploidy
#[derive(Clone, Debug, Serialize)]
pub struct CandidateFit {
    /// The ploidy this model represents
    ploidy: u8,
    /// The fitted mixture
    model: GaussianMixture,
    /// Cached model score, lower is better
    bic: f64
}

impl CandidateFit {
    pub fn new(ploidy: u8, model: GaussianMixture) -> Self {
        let bic = model.bic();
        Self { ploidy, model, bic }
    }

    // getters
    pub fn ploidy(&self) -> u8 {
        self.ploidy
    }

    pub fn model(&self) -> &GaussianMixture {
        &self.model
    }

    pub fn bic(&self) -> f64 {
        self.bic
    }
}

/// All candidates for one dataset, plus the winner
#[derive(Clone, Debug, Serialize)]
pub struct PloidyFit {
    /// Candidates in ascending ploidy order
    candidates: Vec<CandidateFit>,
    /// Index of the selected candidate
    best_index: usize,
    /// Component label per input value under the selected model
    assignments: Vec<usize>
}

impl PloidyFit {
    // getters
    pub fn candidates(&self) -> &[CandidateFit] {
        &self.candidates
    }

    pub fn best_index(&self) -> usize {
        self.best_index
    }

    pub fn best(&self) -> &CandidateFit {
        &self.candidates[self.best_index]
    }

    pub fn best_ploidy(&self) -> u8 {
        self.best().ploidy()
    }

    pub fn assignments(&self) -> &[usize] {
        &self.assignments
    }
}

/// Sorts and de-duplicates the candidate ploidies, rejecting any unsupported value.
/// # Errors
/// * if the list is empty, `MixtureError::EmptyData`
/// * if any ploidy is outside the supported range
pub fn validate_ploidy_levels(ploidy_levels: &[u8]) -> Result<Vec<u8>, MixtureError> {
    if ploidy_levels.is_empty() {
        return Err(MixtureError::EmptyData);
    }
    for &ploidy in ploidy_levels.iter() {
        components_for_ploidy(ploidy)?;
    }
    Ok(ploidy_levels.iter().cloned().sorted().dedup().collect())
}

/// Walks the candidates in order, switching to a later one only if its score is lower than the current best by more than `evidence_margin`.
/// Candidates with a non-finite score are never selected.
/// Returns None if no candidate has a finite score.
pub fn select_best_candidate(scores: &[f64], evidence_margin: f64) -> Option<usize> {
    scores.iter().enumerate()
        .fold(None, |best: Option<(usize, f64)>, (index, &score)| {
            if !score.is_finite() {
                return best;
            }
            match best {
                None => Some((index, score)),
                Some((_, best_score)) if score < best_score - evidence_margin => Some((index, score)),
                keep => keep
            }
        })
        .map(|(index, _score)| index)
}

/// Fits one mixture per candidate ploidy and selects the best supported one.
/// # Arguments
/// * `data` - allele balance values to model
/// * `ploidy_levels` - candidate ploidies, validated with `validate_ploidy_levels`
/// * `regime` - which parameters are pinned to the expected values
/// * `config` - EM and selection controls
/// # Errors
/// * if any ploidy is unsupported; this is checked before any fitting
/// * if `data` is empty
/// * if no candidate produced a finite score
pub fn fit_ploidy_candidates(data: &[f64], ploidy_levels: &[u8], regime: ModelConstraints, config: &MixtureConfig) -> Result<PloidyFit, MixtureError> {
    let ploidy_levels = validate_ploidy_levels(ploidy_levels)?;
    if data.is_empty() {
        return Err(MixtureError::EmptyData);
    }

    let mut candidates = Vec::with_capacity(ploidy_levels.len());
    for &ploidy in ploidy_levels.iter() {
        let constraint = MixtureConstraint::for_ploidy(regime, ploidy)?;
        let model = GaussianMixture::fit(data, components_for_ploidy(ploidy)?, &constraint, config)?;
        debug!("Ploidy {ploidy}: BIC={:.3}, iterations={}, converged={}", model.bic(), model.n_iterations(), model.converged());
        candidates.push(CandidateFit::new(ploidy, model));
    }

    let scores: Vec<f64> = candidates.iter().map(|c| c.bic()).collect();
    let best_index = select_best_candidate(&scores, config.evidence_margin())
        .ok_or(MixtureError::NoFiniteScore)?;
    let assignments = candidates[best_index].model().predict(data);

    Ok(PloidyFit {
        candidates,
        best_index,
        assignments
    })
}
