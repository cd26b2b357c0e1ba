/*!
# Mixed model
Tests whether the site classes from the selected mixture explain the allele counts.
The full model is `alt ~ 1 + ref + (1 | site_class)`, a random intercept per site class, fit by maximum likelihood.
The null model is the same regression without the random intercept.
The two are compared with a likelihood-ratio test.

The full model likelihood is profiled on the variance ratio `gamma = var(random) / var(residual)`.
For a fixed `gamma` the fixed effects and residual variance have closed forms using per-class sums, so fitting is a 1-D search.

## Example usage
```rust
use abploidy::mixed_model::test_site_class_effect;

// allele balance, depth, and site class for each site
let balance = [0.25, 0.3, 0.24, 0.5, 0.52, 0.47, 0.75, 0.7, 0.76];
let depth = [40.0, 60.0, 25.0, 30.0, 80.0, 55.0, 45.0, 70.0, 50.0];
let site_classes = [0, 0, 0, 1, 1, 1, 2, 2, 2];
let fit = test_site_class_effect(&balance, &depth, &site_classes).unwrap();
assert!(fit.p_value() >= 0.0 && fit.p_value() <= 1.0);
```
*/

use rustc_hash::FxHashMap;
use serde::Serialize;
use statrs::distribution::{ChiSquared, ContinuousCDF};
use std::f64::consts::PI;

/// Fixed intercept, fixed slope, residual variance, and random intercept variance
pub const FULL_MODEL_PARAMETERS: usize = 4;
/// Fixed intercept, fixed slope, and residual variance
pub const NULL_MODEL_PARAMETERS: usize = 3;
/// Only used for the verdict message
pub const SIGNIFICANCE_LEVEL: f64 = 0.05;

/// Search range for ln(gamma)
const LN_GAMMA_MIN: f64 = -25.0;
const LN_GAMMA_MAX: f64 = 10.0;
const LN_GAMMA_STEP: f64 = 0.5;
/// Golden-section stopping width on ln(gamma)
const LN_GAMMA_TOLERANCE: f64 = 1e-8;
const MAX_GOLDEN_ITERATIONS: usize = 200;
/// Relative determinant threshold for a singular fixed-effect design
const SINGULAR_THRESHOLD: f64 = 1e-12;

#[derive(thiserror::Error, Debug, PartialEq)]
pub enum MixedModelError {
    #[error("input lengths differ: {values} values, {depths} depths, {labels} site classes")]
    LengthMismatch { values: usize, depths: usize, labels: usize },
    #[error("need at least {required} complete observations, found {found}")]
    TooFewObservations { required: usize, found: usize },
    #[error("reference counts do not vary, the fixed-effect design is singular")]
    SingularDesign,
    #[error("the regression fits perfectly, residual variance is zero")]
    ZeroResidualVariance,
    #[error("failed to build chi-squared distribution: {0}")]
    Distribution(String)
}

/// Best linear unbiased prediction of one site class intercept
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct RandomEffect {
    /// The mixture component label
    site_class: usize,
    /// Number of observations in this class
    n_sites: usize,
    /// Predicted intercept shift
    effect: f64
}

impl RandomEffect {
    // getters
    pub fn site_class(&self) -> usize {
        self.site_class
    }

    pub fn n_sites(&self) -> usize {
        self.n_sites
    }

    pub fn effect(&self) -> f64 {
        self.effect
    }
}

/// Full model fit and the likelihood-ratio test against the null model
#[derive(Clone, Debug, Serialize)]
pub struct MixedModelFit {
    /// Fixed intercept of the full model
    intercept: f64,
    /// Fixed slope on the reference count
    ref_slope: f64,
    /// Random intercepts, sorted by site class
    random_effects: Vec<RandomEffect>,
    /// Residual variance
    residual_variance: f64,
    /// Variance of the random intercepts
    group_variance: f64,
    /// Log-likelihood of the full model
    log_likelihood: f64,
    /// Log-likelihood of the null model
    null_log_likelihood: f64,
    /// -2 * (null - full), never negative
    lrt_statistic: f64,
    /// Difference in parameter counts
    degrees_of_freedom: usize,
    /// Chi-squared survival function of the statistic
    p_value: f64,
    /// Observations used after dropping incomplete rows
    n_observations: usize
}

impl MixedModelFit {
    /// True if the p-value is below `SIGNIFICANCE_LEVEL`
    pub fn is_significant(&self) -> bool {
        self.p_value < SIGNIFICANCE_LEVEL
    }

    // getters
    pub fn intercept(&self) -> f64 {
        self.intercept
    }

    pub fn ref_slope(&self) -> f64 {
        self.ref_slope
    }

    pub fn random_effects(&self) -> &[RandomEffect] {
        &self.random_effects
    }

    pub fn residual_variance(&self) -> f64 {
        self.residual_variance
    }

    pub fn group_variance(&self) -> f64 {
        self.group_variance
    }

    pub fn log_likelihood(&self) -> f64 {
        self.log_likelihood
    }

    pub fn null_log_likelihood(&self) -> f64 {
        self.null_log_likelihood
    }

    pub fn lrt_statistic(&self) -> f64 {
        self.lrt_statistic
    }

    pub fn degrees_of_freedom(&self) -> usize {
        self.degrees_of_freedom
    }

    pub fn p_value(&self) -> f64 {
        self.p_value
    }

    pub fn n_observations(&self) -> usize {
        self.n_observations
    }
}

/// Sufficient statistics for one site class, x = ref count and y = alt count
#[derive(Clone, Copy, Debug, Default)]
struct GroupSums {
    n: f64,
    sx: f64,
    sy: f64,
    sxx: f64,
    sxy: f64,
    syy: f64
}

impl GroupSums {
    fn add(&mut self, x: f64, y: f64) {
        self.n += 1.0;
        self.sx += x;
        self.sy += y;
        self.sxx += x * x;
        self.sxy += x * y;
        self.syy += y * y;
    }
}

/// Fixed effects and likelihood at one value of gamma
#[derive(Clone, Copy, Debug)]
struct Profile {
    intercept: f64,
    slope: f64,
    residual_variance: f64,
    log_likelihood: f64
}

/// Grouped data, with the class labels kept in ascending order
struct GroupedData {
    labels: Vec<usize>,
    sums: Vec<GroupSums>,
    n: f64
}

impl GroupedData {
    /// Maximum-likelihood fixed effects for a given gamma.
    /// Uses V = sigma^2 (I + gamma Z Z'), whose inverse is block-wise `I - c_j 11'` with `c_j = gamma / (1 + gamma n_j)`.
    fn profile(&self, gamma: f64) -> Result<Profile, MixedModelError> {
        let (mut a00, mut a01, mut a11) = (0.0, 0.0, 0.0);
        let (mut b0, mut b1, mut yy) = (0.0, 0.0, 0.0);
        let mut log_det = 0.0;
        for g in self.sums.iter() {
            let c = gamma / (1.0 + gamma * g.n);
            a00 += g.n - c * g.n * g.n;
            a01 += g.sx - c * g.n * g.sx;
            a11 += g.sxx - c * g.sx * g.sx;
            b0 += g.sy - c * g.n * g.sy;
            b1 += g.sxy - c * g.sx * g.sy;
            yy += g.syy - c * g.sy * g.sy;
            log_det += (1.0 + gamma * g.n).ln();
        }

        let det = a00 * a11 - a01 * a01;
        if !(det > SINGULAR_THRESHOLD * a00.abs() * a11.abs()) {
            return Err(MixedModelError::SingularDesign);
        }
        let slope = (a00 * b1 - a01 * b0) / det;
        let intercept = (a11 * b0 - a01 * b1) / det;

        let rss = yy - intercept * b0 - slope * b1;
        let residual_variance = rss / self.n;
        if !(residual_variance > 0.0) {
            return Err(MixedModelError::ZeroResidualVariance);
        }
        let log_likelihood = -0.5 * self.n * ((2.0 * PI).ln() + residual_variance.ln() + 1.0) - 0.5 * log_det;

        Ok(Profile {
            intercept,
            slope,
            residual_variance,
            log_likelihood
        })
    }

    /// Profile log-likelihood on the ln(gamma) scale, -inf where it is undefined
    fn objective(&self, ln_gamma: f64) -> f64 {
        self.profile(ln_gamma.exp())
            .map(|p| p.log_likelihood)
            .unwrap_or(f64::NEG_INFINITY)
    }

    /// Grid search over ln(gamma), then golden-section refinement around the best grid point.
    /// Returns the best gamma found, or 0 if no positive gamma beats the null.
    fn maximize_gamma(&self, null_log_likelihood: f64) -> f64 {
        let n_steps = ((LN_GAMMA_MAX - LN_GAMMA_MIN) / LN_GAMMA_STEP).round() as usize;
        let grid: Vec<f64> = (0..=n_steps)
            .map(|i| LN_GAMMA_MIN + i as f64 * LN_GAMMA_STEP)
            .collect();
        let (best_index, best_value) = grid.iter()
            .map(|&ln_gamma| self.objective(ln_gamma))
            .enumerate()
            .fold((0, f64::NEG_INFINITY), |best, (i, v)| if v > best.1 { (i, v) } else { best });
        if !(best_value > null_log_likelihood) {
            return 0.0;
        }

        let lower = grid[best_index.saturating_sub(1)];
        let upper = grid[(best_index + 1).min(n_steps)];
        let ln_gamma = golden_section_max(|x| self.objective(x), lower, upper);
        if self.objective(ln_gamma) >= best_value {
            ln_gamma.exp()
        } else {
            grid[best_index].exp()
        }
    }
}

/// Maximizes a unimodal function on [lower, upper]
fn golden_section_max<F: Fn(f64) -> f64>(f: F, lower: f64, upper: f64) -> f64 {
    let inv_phi = (5.0_f64.sqrt() - 1.0) / 2.0;
    let (mut a, mut b) = (lower, upper);
    let mut c = b - inv_phi * (b - a);
    let mut d = a + inv_phi * (b - a);
    let mut fc = f(c);
    let mut fd = f(d);
    for _ in 0..MAX_GOLDEN_ITERATIONS {
        if (b - a).abs() < LN_GAMMA_TOLERANCE {
            break;
        }
        if fc > fd {
            b = d;
            d = c;
            fd = fc;
            c = b - inv_phi * (b - a);
            fc = f(c);
        } else {
            a = c;
            c = d;
            fc = fd;
            d = a + inv_phi * (b - a);
            fd = f(d);
        }
    }
    (a + b) / 2.0
}

/// Builds the per-class sums from allele balance, depth, and class labels.
/// Rows where either derived count is not finite are dropped.
fn group_observations(values: &[f64], depths: &[f64], labels: &[usize]) -> GroupedData {
    let mut groups: FxHashMap<usize, GroupSums> = FxHashMap::default();
    let mut n = 0.0;
    for ((&value, &depth), &label) in values.iter().zip(depths.iter()).zip(labels.iter()) {
        let (alt, reference) = derived_counts(value, depth);
        if !alt.is_finite() || !reference.is_finite() {
            continue;
        }
        groups.entry(label).or_default().add(reference, alt);
        n += 1.0;
    }

    let mut labels: Vec<usize> = groups.keys().cloned().collect();
    labels.sort_unstable();
    let sums = labels.iter().map(|l| groups[l]).collect();
    GroupedData { labels, sums, n }
}

/// Alternate and reference counts recovered from allele balance and depth
pub fn derived_counts(allele_balance: f64, depth: f64) -> (f64, f64) {
    let alt = allele_balance * depth;
    (alt, depth - alt)
}

/// Fits the random-intercept model and tests it against the null model.
/// # Arguments
/// * `values` - allele balance per site
/// * `depths` - total depth per site
/// * `labels` - mixture component per site
/// # Errors
/// * if the inputs have different lengths
/// * if fewer than `FULL_MODEL_PARAMETERS + 1` complete rows remain
/// * if the reference counts do not vary, or the regression is exact
pub fn test_site_class_effect(values: &[f64], depths: &[f64], labels: &[usize]) -> Result<MixedModelFit, MixedModelError> {
    if values.len() != depths.len() || values.len() != labels.len() {
        return Err(MixedModelError::LengthMismatch { values: values.len(), depths: depths.len(), labels: labels.len() });
    }

    let data = group_observations(values, depths, labels);
    let n_observations = data.n as usize;
    if n_observations <= FULL_MODEL_PARAMETERS {
        return Err(MixedModelError::TooFewObservations { required: FULL_MODEL_PARAMETERS + 1, found: n_observations });
    }

    // gamma = 0 is ordinary least squares
    let null = data.profile(0.0)?;
    let gamma = data.maximize_gamma(null.log_likelihood);
    let full = if gamma > 0.0 { data.profile(gamma)? } else { null };

    let random_effects = data.labels.iter().zip(data.sums.iter())
        .map(|(&site_class, g)| {
            let shrinkage = gamma * g.n / (1.0 + gamma * g.n);
            let mean_residual = (g.sy - full.intercept * g.n - full.slope * g.sx) / g.n;
            RandomEffect {
                site_class,
                n_sites: g.n as usize,
                effect: shrinkage * mean_residual
            }
        })
        .collect();

    let lrt_statistic = (-2.0 * (null.log_likelihood - full.log_likelihood)).max(0.0);
    let degrees_of_freedom = FULL_MODEL_PARAMETERS - NULL_MODEL_PARAMETERS;
    let chi_squared = ChiSquared::new(degrees_of_freedom as f64)
        .map_err(|e| MixedModelError::Distribution(e.to_string()))?;
    let p_value = chi_squared.sf(lrt_statistic);

    Ok(MixedModelFit {
        intercept: full.intercept,
        ref_slope: full.slope,
        random_effects,
        residual_variance: full.residual_variance,
        group_variance: gamma * full.residual_variance,
        log_likelihood: full.log_likelihood,
        null_log_likelihood: null.log_likelihood,
        lrt_statistic,
        degrees_of_freedom,
        p_value,
        n_observations
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx_eq::assert_approx_eq;
    use rand::{Rng, SeedableRng};
    use rand::distributions::Distribution;
    use rand::rngs::StdRng;
    use statrs::distribution::Normal;

    #[test]
    fn test_derived_counts() {
        for (ab, depth) in [(0.25, 40.0), (1.0 / 3.0, 31.0), (0.0, 12.0), (0.9, 65535.0)] {
            let (alt, reference) = derived_counts(ab, depth);
            assert_approx_eq!(alt + reference, depth);
        }
    }

    #[test]
    fn test_synthetic_clusters() {
        let mut rng = StdRng::seed_from_u64(3232);
        let mut values = vec![];
        let mut depths = vec![];
        let mut labels = vec![];
        for (label, (center, count)) in [(0.25, 500), (0.5, 1000), (0.75, 500)].into_iter().enumerate() {
            let normal = Normal::new(center, 0.05).unwrap();
            for _ in 0..count {
                values.push(normal.sample(&mut rng));
                depths.push(rng.gen_range(20..100) as f64);
                labels.push(label);
            }
        }

        let fit = test_site_class_effect(&values, &depths, &labels).unwrap();
        assert_eq!(fit.n_observations(), 2000);
        assert_eq!(fit.degrees_of_freedom(), 1);
        assert!(fit.p_value() < 0.001);
        assert!(fit.is_significant());
        assert!(fit.log_likelihood() > fit.null_log_likelihood());
        assert!(fit.group_variance() > 0.0);

        // higher allele balance classes sit above the shared regression line
        let effects: Vec<f64> = fit.random_effects().iter().map(|r| r.effect()).collect();
        assert_eq!(effects.len(), 3);
        assert!(effects[0] < effects[1] && effects[1] < effects[2]);
    }

    #[test]
    fn test_mixture_labels_feed_site_class_test() {
        use crate::mixture::MixtureConfig;
        use crate::mixture::expected::ModelConstraints;
        use crate::mixture::selection::fit_ploidy_candidates;

        // several individuals, each a random half of the same tetraploid design
        let mut rng = StdRng::seed_from_u64(3232);
        for _individual in 0..4 {
            let mut values = vec![];
            let mut depths = vec![];
            for (center, count) in [(0.25, 500), (0.5, 1000), (0.75, 500)] {
                let normal = Normal::new(center, 0.05).unwrap();
                for _ in 0..count {
                    let value = normal.sample(&mut rng);
                    let depth = rng.gen_range(20..100) as f64;
                    if rng.gen_bool(0.5) {
                        values.push(value);
                        depths.push(depth);
                    }
                }
            }

            let mixture = fit_ploidy_candidates(&values, &[2, 3, 4, 5, 6], ModelConstraints::FixedMeans, &MixtureConfig::default()).unwrap();
            assert_eq!(mixture.best_ploidy(), 4);
            let fit = test_site_class_effect(&values, &depths, mixture.assignments()).unwrap();
            assert_eq!(fit.n_observations(), values.len());
            assert!(fit.p_value() < 0.001);
        }
    }

    #[test]
    fn test_no_class_effect() {
        // two classes with identical data, so the class explains nothing
        let mut values = vec![];
        let mut depths = vec![];
        let mut labels = vec![];
        for label in [0, 1] {
            for (i, depth) in [20.0, 35.0, 50.0, 41.0, 77.0, 63.0, 28.0, 90.0].into_iter().enumerate() {
                values.push(0.4 + 0.02 * (i % 3) as f64);
                depths.push(depth);
                labels.push(label);
            }
        }

        let fit = test_site_class_effect(&values, &depths, &labels).unwrap();
        assert!(fit.lrt_statistic() < 1e-6);
        assert!(fit.p_value() > 0.9);
        assert!(!fit.is_significant());
        for effect in fit.random_effects() {
            assert_approx_eq!(effect.effect() + 1.0, 1.0, 1e-6);
        }
    }

    #[test]
    fn test_null_is_least_squares() {
        let values = [0.2, 0.4, 0.5, 0.3, 0.6, 0.45];
        let depths = [10.0, 20.0, 30.0, 40.0, 50.0, 60.0];
        let labels = [0, 0, 0, 1, 1, 1];
        let fit = test_site_class_effect(&values, &depths, &labels).unwrap();

        // direct OLS of alt on ref
        let xs: Vec<f64> = values.iter().zip(depths.iter()).map(|(&v, &d)| d - v * d).collect();
        let ys: Vec<f64> = values.iter().zip(depths.iter()).map(|(&v, &d)| v * d).collect();
        let n = xs.len() as f64;
        let mx = xs.iter().sum::<f64>() / n;
        let my = ys.iter().sum::<f64>() / n;
        let sxy: f64 = xs.iter().zip(ys.iter()).map(|(x, y)| (x - mx) * (y - my)).sum();
        let sxx: f64 = xs.iter().map(|x| (x - mx).powi(2)).sum();
        let slope = sxy / sxx;
        let intercept = my - slope * mx;
        let rss: f64 = xs.iter().zip(ys.iter()).map(|(x, y)| (y - intercept - slope * x).powi(2)).sum();
        let expected_ll = -0.5 * n * ((2.0 * PI).ln() + (rss / n).ln() + 1.0);

        assert_approx_eq!(fit.null_log_likelihood(), expected_ll, 1e-9);
        assert!(fit.log_likelihood() >= fit.null_log_likelihood());
    }

    #[test]
    fn test_incomplete_rows_dropped() {
        let values = [0.2, f64::NAN, 0.5, 0.3, 0.6, 0.45, 0.35];
        let depths = [10.0, 20.0, 30.0, f64::INFINITY, 50.0, 60.0, 45.0];
        let labels = [0, 0, 0, 1, 1, 1, 1];
        let fit = test_site_class_effect(&values, &depths, &labels).unwrap();
        assert_eq!(fit.n_observations(), 5);
    }

    #[test]
    fn test_errors() {
        assert_eq!(
            test_site_class_effect(&[0.5; 3], &[10.0; 3], &[0; 2]).unwrap_err(),
            MixedModelError::LengthMismatch { values: 3, depths: 3, labels: 2 }
        );
        assert_eq!(
            test_site_class_effect(&[0.5; 4], &[10.0; 4], &[0; 4]).unwrap_err(),
            MixedModelError::TooFewObservations { required: 5, found: 4 }
        );
        // constant reference count
        assert_eq!(
            test_site_class_effect(&[0.5; 6], &[10.0; 6], &[0, 0, 0, 1, 1, 1]).unwrap_err(),
            MixedModelError::SingularDesign
        );
    }
}
