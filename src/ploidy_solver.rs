/*!
# Ploidy solver
Runs the per-individual ploidy estimation over an extracted allele-balance tensor.
Each individual is handled independently:
1. keep pass-filter sites with an allele balance strictly inside the band (default `(0.05, 0.95)`)
2. skip the individual if fewer than `min_sites` remain
3. fit a mixture per candidate ploidy and select the best supported one
4. if the best ploidy is above 2, test whether the mixture site classes explain the allele counts

## Example usage
```rust
use abploidy::ploidy_solver::{solve_individual, PloidyConfigBuilder};

// a perfectly balanced diploid
let sites: Vec<(f64, f64)> = (0..40).map(|i| (0.45 + 0.0025 * i as f64, 40.0 + i as f64)).collect();
let config = PloidyConfigBuilder::default()
    .ploidy_levels(vec![2, 3])
    .min_sites(20)
    .build().unwrap();
let estimate = solve_individual("ind_a", "north", &sites, &config).unwrap();
assert_eq!(estimate.call().ploidy(), Some(2));
assert_eq!(estimate.call().p_value(), None);
```
*/

use anyhow::{bail, ensure};
use derive_builder::Builder;
use indicatif::ParallelProgressIterator;
use itertools::Itertools;
use log::{debug, error, info, warn};
use rayon::prelude::*;
use serde::Serialize;

use crate::data_types::ploidy_call::{PloidyCall, PloidyTable};
use crate::data_types::variant_tensor::{ExtractionMode, IndividualLayers, VariantTensor};
use crate::mixed_model::{test_site_class_effect, MixedModelFit};
use crate::mixture::MixtureConfig;
use crate::mixture::expected::ModelConstraints;
use crate::mixture::selection::{fit_ploidy_candidates, validate_ploidy_levels, PloidyFit};
use crate::parsing::population_map::PopulationMap;
use crate::parsing::sample_columns::SampleColumns;
use crate::util::progress_bar::get_progress_style;

/// Controls the per-individual estimation
#[derive(Builder, Clone, Debug, PartialEq, Serialize)]
#[builder(default)]
pub struct PloidyConfig {
    /// Candidate ploidies
    ploidy_levels: Vec<u8>,
    /// Which mixture parameters are pinned
    model_constraints: ModelConstraints,
    /// Individuals with fewer banded sites than this are skipped
    min_sites: usize,
    /// Exclusive lower bound on allele balance
    band_lower: f64,
    /// Exclusive upper bound on allele balance
    band_upper: f64,
    /// EM and selection controls
    mixture_config: MixtureConfig
}

impl Default for PloidyConfig {
    fn default() -> Self {
        Self {
            ploidy_levels: vec![2, 4, 6],
            model_constraints: ModelConstraints::default(),
            min_sites: 100,
            band_lower: 0.05,
            band_upper: 0.95,
            mixture_config: MixtureConfig::default()
        }
    }
}

impl PloidyConfig {
    /// Checks everything that would otherwise fail for every individual.
    /// # Errors
    /// * if any ploidy level is unsupported or the list is empty
    /// * if the band is empty
    pub fn validate(&self) -> anyhow::Result<()> {
        if let Err(e) = validate_ploidy_levels(&self.ploidy_levels) {
            bail!("Invalid ploidy levels {:?}: {e}", self.ploidy_levels);
        }
        ensure!(
            0.0 <= self.band_lower && self.band_lower < self.band_upper && self.band_upper <= 1.0,
            "Allele balance band ({}, {}) is empty or outside [0, 1]", self.band_lower, self.band_upper
        );
        Ok(())
    }

    // getters
    pub fn ploidy_levels(&self) -> &[u8] {
        &self.ploidy_levels
    }

    pub fn model_constraints(&self) -> ModelConstraints {
        self.model_constraints
    }

    pub fn min_sites(&self) -> usize {
        self.min_sites
    }

    pub fn band_lower(&self) -> f64 {
        self.band_lower
    }

    pub fn band_upper(&self) -> f64 {
        self.band_upper
    }

    pub fn mixture_config(&self) -> &MixtureConfig {
        &self.mixture_config
    }
}

/// Everything computed for one individual
#[derive(Clone, Debug)]
pub struct PloidyEstimate {
    /// The row for the ploidy table
    call: PloidyCall,
    /// All candidate fits, None if skipped
    mixture: Option<PloidyFit>,
    /// Site class test, only for ploidy above 2
    mixed_model: Option<MixedModelFit>
}

impl PloidyEstimate {
    /// An individual that was not fit
    pub fn skipped(individual: &str, population: &str, n_sites: usize) -> Self {
        Self {
            call: PloidyCall::skipped(individual.to_string(), population.to_string(), n_sites),
            mixture: None,
            mixed_model: None
        }
    }

    // getters
    pub fn call(&self) -> &PloidyCall {
        &self.call
    }

    pub fn mixture(&self) -> Option<&PloidyFit> {
        self.mixture.as_ref()
    }

    pub fn mixed_model(&self) -> Option<&MixedModelFit> {
        self.mixed_model.as_ref()
    }
}

/// Returns (allele balance, depth) for pass-filter rows strictly inside the configured band
pub fn band_sites(layers: &IndividualLayers, config: &PloidyConfig) -> Vec<(f64, f64)> {
    layers.passing().into_iter()
        .filter(|&(value, _depth)| value > config.band_lower && value < config.band_upper)
        .collect()
}

/// Estimates ploidy for one individual from its banded sites.
/// # Arguments
/// * `individual` - identifier, used for logging and the output row
/// * `population` - population label for the output row
/// * `sites` - (allele balance, depth) per banded site
/// * `config` - estimation controls
/// A mixed model failure is logged and leaves the p-value empty.
/// # Errors
/// * if the mixture cannot be fit
pub fn solve_individual(individual: &str, population: &str, sites: &[(f64, f64)], config: &PloidyConfig) -> anyhow::Result<PloidyEstimate> {
    let n_sites = sites.len();
    if n_sites < config.min_sites {
        warn!("{individual}: only {n_sites} sites pass filters (minimum {}), skipping", config.min_sites);
        return Ok(PloidyEstimate::skipped(individual, population, n_sites));
    }

    let values: Vec<f64> = sites.iter().map(|&(v, _d)| v).collect();
    let mixture = fit_ploidy_candidates(&values, &config.ploidy_levels, config.model_constraints, &config.mixture_config)?;
    let best_ploidy = mixture.best_ploidy();
    debug!("{individual}: candidate BIC = [{}]", mixture.candidates().iter().map(|c| format!("{}:{:.2}", c.ploidy(), c.bic())).join(", "));

    let mixed_model = if best_ploidy > 2 {
        let depths: Vec<f64> = sites.iter().map(|&(_v, d)| d).collect();
        match test_site_class_effect(&values, &depths, mixture.assignments()) {
            Ok(fit) => {
                if fit.is_significant() {
                    info!("{individual}: ploidy {best_ploidy}, site classes explain allele counts (p={:.3e})", fit.p_value());
                } else {
                    info!("{individual}: ploidy {best_ploidy}, site class effect is not significant (p={:.3e}), multimodality may be noise", fit.p_value());
                }
                debug!(
                    "{individual}: alt ~ {:.4} + {:.4} * ref, residual var={:.4}, class var={:.4}, random effects = [{}]",
                    fit.intercept(), fit.ref_slope(), fit.residual_variance(), fit.group_variance(),
                    fit.random_effects().iter().map(|r| format!("{}:{:.4}", r.site_class(), r.effect())).join(", ")
                );
                Some(fit)
            },
            Err(e) => {
                warn!("{individual}: ploidy {best_ploidy}, mixed model could not be fit: {e}");
                None
            }
        }
    } else {
        info!("{individual}: diploid detected, skipping mixed model");
        None
    };

    let p_value = mixed_model.as_ref().map(|m| m.p_value());
    Ok(PloidyEstimate {
        call: PloidyCall::new(individual.to_string(), population.to_string(), n_sites, Some(best_ploidy), p_value),
        mixture: Some(mixture),
        mixed_model
    })
}

/// Runs `solve_individual` for every individual in the tensor, in parallel on the global rayon pool.
/// Per-individual failures are logged and recorded as a skipped call.
/// Results are returned in tensor order.
/// # Arguments
/// * `tensor` - extracted allele-balance tensor
/// * `columns` - maps tensor individual indices to identifiers
/// * `population_map` - population label lookup
/// * `config` - estimation controls
/// # Errors
/// * if the configuration is invalid, before any fitting happens
/// * if the tensor does not contain allele balance values
/// * if the tensor and the column table disagree on the number of individuals
pub fn estimate_ploidy(tensor: &VariantTensor, columns: &SampleColumns, population_map: &PopulationMap, config: &PloidyConfig) -> anyhow::Result<Vec<PloidyEstimate>> {
    config.validate()?;
    ensure!(
        tensor.mode() == ExtractionMode::AlleleBalance,
        "Ploidy estimation requires {} values, but the tensor contains {} values", ExtractionMode::AlleleBalance, tensor.mode()
    );
    ensure!(
        tensor.n_individuals() == columns.len(),
        "Tensor has {} individuals, but {} sample columns were mapped", tensor.n_individuals(), columns.len()
    );
    info!("Candidate ploidy levels: {}", config.ploidy_levels.iter().sorted().dedup().join(", "));

    let style = get_progress_style();
    let mut results: Vec<(usize, PloidyEstimate)> = (0..tensor.n_individuals()).into_par_iter()
        .map(|index| {
            let individual = columns.individual(index).unwrap_or_default();
            let population = population_map.population(individual).unwrap_or_default();
            let sites = match tensor.individual(index) {
                Some(layers) => band_sites(&layers, config),
                None => vec![]
            };
            let estimate = match solve_individual(individual, population, &sites, config) {
                Ok(e) => e,
                Err(e) => {
                    error!("Error while estimating ploidy for {individual}: {e:#}");
                    PloidyEstimate::skipped(individual, population, sites.len())
                }
            };
            (index, estimate)
        })
        .progress_with_style(style)
        .collect();

    // sort them by tensor index
    results.sort_by_key(|(index, _e)| *index);
    Ok(results.into_iter().map(|(_index, e)| e).collect())
}

/// Collects the calls into the final table
pub fn build_ploidy_table(estimates: &[PloidyEstimate]) -> PloidyTable {
    PloidyTable::new(estimates.iter().map(|e| e.call().clone()).collect())
}
