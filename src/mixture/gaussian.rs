
use serde::Serialize;
use std::f64::consts::PI;

use crate::mixture::MixtureConfig;
use crate::mixture::MixtureError;
use crate::mixture::expected::MixtureConstraint;

/// Keeps responsibilities strictly positive in the M-step
const MIN_COMPONENT_MASS: f64 = 10.0 * f64::EPSILON;

/// A fitted univariate Gaussian mixture
#[derive(Clone, Debug, Serialize)]
pub struct GaussianMixture {
    /// Component means
    means: Vec<f64>,
    /// Component variances, always at least the regularization term
    variances: Vec<f64>,
    /// Component weights, sum to 1
    weights: Vec<f64>,
    /// Mean per-sample log-likelihood of the training data under the final parameters
    mean_log_likelihood: f64,
    /// Number of training samples
    n_samples: usize,
    /// Number of parameters that EM was allowed to update
    n_free_parameters: usize,
    /// Number of EM iterations performed
    n_iterations: usize,
    /// True if the log-likelihood change dropped below tolerance before max_iterations
    converged: bool
}

impl GaussianMixture {
    /// Fits a mixture with EM, only updating the parameters that the constraint leaves free.
    /// # Arguments
    /// * `data` - the observations
    /// * `n_components` - number of mixture components
    /// * `constraint` - pinned means and/or weights; lengths must match `n_components`
    /// * `config` - EM controls
    /// # Errors
    /// * if `data` is empty or `n_components` is zero
    /// * if the constraint length does not match `n_components`
    pub fn fit(data: &[f64], n_components: usize, constraint: &MixtureConstraint, config: &MixtureConfig) -> Result<Self, MixtureError> {
        if data.is_empty() || n_components == 0 {
            return Err(MixtureError::EmptyData);
        }
        for pinned in [constraint.means(), constraint.weights()].into_iter().flatten() {
            if pinned.len() != n_components {
                return Err(MixtureError::ConstraintLength { expected: n_components, found: pinned.len() });
            }
        }

        let n_free_parameters = count_free_parameters(n_components, constraint);
        let mut model = initialize(data, n_components, constraint, config.reg_variance());
        model.n_free_parameters = n_free_parameters;

        let n = data.len();
        let mut responsibilities = vec![0.0; n * n_components];
        let mut previous_ll = f64::NEG_INFINITY;
        for iteration in 1..=config.max_iterations() {
            model.n_iterations = iteration;

            // E-step
            let mut total_ll = 0.0;
            for (i, &x) in data.iter().enumerate() {
                let row = &mut responsibilities[i*n_components..(i+1)*n_components];
                for (k, r) in row.iter_mut().enumerate() {
                    *r = model.weighted_log_density(k, x);
                }
                let norm = log_sum_exp(row);
                total_ll += norm;
                for r in row.iter_mut() {
                    *r = (*r - norm).exp();
                }
            }
            let mean_ll = total_ll / n as f64;

            // M-step
            for k in 0..n_components {
                let mass: f64 = (0..n).map(|i| responsibilities[i*n_components + k]).sum::<f64>() + MIN_COMPONENT_MASS;
                if constraint.weights().is_none() {
                    model.weights[k] = mass / n as f64;
                }
                if constraint.means().is_none() {
                    model.means[k] = data.iter().enumerate()
                        .map(|(i, &x)| responsibilities[i*n_components + k] * x)
                        .sum::<f64>() / mass;
                }
                let mean = model.means[k];
                model.variances[k] = data.iter().enumerate()
                    .map(|(i, &x)| responsibilities[i*n_components + k] * (x - mean).powi(2))
                    .sum::<f64>() / mass + config.reg_variance();
            }

            if (mean_ll - previous_ll).abs() < config.tolerance() {
                model.converged = true;
                break;
            }
            previous_ll = mean_ll;
        }

        model.mean_log_likelihood = model.score(data);
        Ok(model)
    }

    /// log(w_k) + log N(x | mu_k, var_k)
    fn weighted_log_density(&self, component: usize, x: f64) -> f64 {
        let variance = self.variances[component];
        self.weights[component].ln() - 0.5 * ((2.0 * PI * variance).ln() + (x - self.means[component]).powi(2) / variance)
    }

    /// Log-likelihood of each sample under the mixture
    pub fn score_samples(&self, data: &[f64]) -> Vec<f64> {
        let mut buffer = vec![0.0; self.n_components()];
        data.iter()
            .map(|&x| {
                for (k, v) in buffer.iter_mut().enumerate() {
                    *v = self.weighted_log_density(k, x);
                }
                log_sum_exp(&buffer)
            })
            .collect()
    }

    /// Mean per-sample log-likelihood, NaN for empty data
    pub fn score(&self, data: &[f64]) -> f64 {
        if data.is_empty() {
            return f64::NAN;
        }
        self.score_samples(data).iter().sum::<f64>() / data.len() as f64
    }

    /// Most likely component for each sample; ties go to the lower component index
    pub fn predict(&self, data: &[f64]) -> Vec<usize> {
        data.iter()
            .map(|&x| {
                let mut best = (0, f64::NEG_INFINITY);
                for k in 0..self.n_components() {
                    let value = self.weighted_log_density(k, x);
                    if value > best.1 {
                        best = (k, value);
                    }
                }
                best.0
            })
            .collect()
    }

    /// Bayesian information criterion of the training data, lower is better.
    /// Only parameters that EM was free to update are penalized.
    pub fn bic(&self) -> f64 {
        let n = self.n_samples as f64;
        -2.0 * self.mean_log_likelihood * n + self.n_free_parameters as f64 * n.ln()
    }

    // getters
    pub fn n_components(&self) -> usize {
        self.means.len()
    }

    pub fn means(&self) -> &[f64] {
        &self.means
    }

    pub fn variances(&self) -> &[f64] {
        &self.variances
    }

    pub fn weights(&self) -> &[f64] {
        &self.weights
    }

    pub fn mean_log_likelihood(&self) -> f64 {
        self.mean_log_likelihood
    }

    pub fn n_samples(&self) -> usize {
        self.n_samples
    }

    pub fn n_free_parameters(&self) -> usize {
        self.n_free_parameters
    }

    pub fn n_iterations(&self) -> usize {
        self.n_iterations
    }

    pub fn converged(&self) -> bool {
        self.converged
    }
}

/// Free variances always, plus means and K-1 weights when they are not pinned
fn count_free_parameters(n_components: usize, constraint: &MixtureConstraint) -> usize {
    let mut count = n_components;
    if constraint.means().is_none() {
        count += n_components;
    }
    if constraint.weights().is_none() {
        count += n_components - 1;
    }
    count
}

/// Deterministic starting point.
/// Free means start at the centers of equal-size chunks of the sorted data; pinned means hard-assign each point to the nearest mean.
fn initialize(data: &[f64], n_components: usize, constraint: &MixtureConstraint, reg_variance: f64) -> GaussianMixture {
    let n = data.len();
    let global_mean = data.iter().sum::<f64>() / n as f64;

    // group the points that seed each component
    let mut groups: Vec<Vec<f64>> = vec![vec![]; n_components];
    let means: Vec<f64> = match constraint.means() {
        Some(pinned) => {
            for &x in data.iter() {
                let nearest = pinned.iter().enumerate()
                    .map(|(k, m)| (k, (x - m).abs()))
                    .fold((0, f64::INFINITY), |best, (k, d)| if d < best.1 { (k, d) } else { best });
                groups[nearest.0].push(x);
            }
            pinned.to_vec()
        },
        None => {
            let mut sorted = data.to_vec();
            sorted.sort_by(|a, b| a.total_cmp(b));
            // first `n % k` chunks take one extra point
            let base = n / n_components;
            let extra = n % n_components;
            let mut start = 0;
            for (k, group) in groups.iter_mut().enumerate() {
                let size = base + usize::from(k < extra);
                group.extend_from_slice(&sorted[start..start+size]);
                start += size;
            }
            groups.iter()
                .map(|g| if g.is_empty() { global_mean } else { g.iter().sum::<f64>() / g.len() as f64 })
                .collect()
        }
    };

    let variances: Vec<f64> = groups.iter().zip(means.iter())
        .map(|(group, &mean)| {
            // an empty group falls back to the spread of all data around this mean
            let points: &[f64] = if group.is_empty() { data } else { group };
            points.iter().map(|x| (x - mean).powi(2)).sum::<f64>() / points.len() as f64 + reg_variance
        })
        .collect();

    let weights = match constraint.weights() {
        Some(pinned) => pinned.to_vec(),
        None => vec![1.0 / n_components as f64; n_components]
    };

    GaussianMixture {
        means,
        variances,
        weights,
        mean_log_likelihood: f64::NAN,
        n_samples: n,
        n_free_parameters: 0,
        n_iterations: 0,
        converged: false
    }
}

/// Numerically stable log(sum(exp(values)))
fn log_sum_exp(values: &[f64]) -> f64 {
    let max = values.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
    if !max.is_finite() {
        return max;
    }
    max + values.iter().map(|v| (v - max).exp()).sum::<f64>().ln()
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx_eq::assert_approx_eq;
    use rand::SeedableRng;
    use rand::rngs::StdRng;
    use rand::distributions::Distribution;
    use statrs::distribution::Normal;

    fn sample_clusters(centers: &[(f64, usize)], sd: f64, seed: u64) -> Vec<f64> {
        let mut rng = StdRng::seed_from_u64(seed);
        let mut data = vec![];
        for &(center, count) in centers.iter() {
            let normal = Normal::new(center, sd).unwrap();
            data.extend((0..count).map(|_| normal.sample(&mut rng)));
        }
        data
    }

    #[test]
    fn test_log_sum_exp() {
        assert_approx_eq!(log_sum_exp(&[0.0, 0.0]), 2.0_f64.ln());
        assert_approx_eq!(log_sum_exp(&[-1000.0, -1000.0]), -1000.0 + 2.0_f64.ln());
        assert_eq!(log_sum_exp(&[f64::NEG_INFINITY, f64::NEG_INFINITY]), f64::NEG_INFINITY);
    }

    #[test]
    fn test_unconstrained_recovers_clusters() {
        let data = sample_clusters(&[(0.25, 300), (0.75, 300)], 0.03, 7);
        let model = GaussianMixture::fit(&data, 2, &MixtureConstraint::Unconstrained, &MixtureConfig::default()).unwrap();
        assert!(model.converged());
        assert_approx_eq!(model.means()[0], 0.25, 0.05);
        assert_approx_eq!(model.means()[1], 0.75, 0.05);
        assert_approx_eq!(model.weights()[0], 0.5, 0.05);
        assert_approx_eq!(model.weights().iter().sum::<f64>(), 1.0);
        assert_eq!(model.n_free_parameters(), 5);

        let labels = model.predict(&[0.2, 0.8, 0.3]);
        assert_eq!(labels, vec![0, 1, 0]);
    }

    #[test]
    fn test_pinned_parameters_stay_pinned() {
        let data = sample_clusters(&[(0.3, 200), (0.5, 100), (0.7, 200)], 0.05, 11);
        let means = vec![0.25, 0.5, 0.75];
        let weights = vec![0.25, 0.5, 0.25];

        let model = GaussianMixture::fit(&data, 3, &MixtureConstraint::FixedMeans(means.clone()), &MixtureConfig::default()).unwrap();
        assert_eq!(model.means(), means.as_slice());
        assert_eq!(model.n_free_parameters(), 5);
        assert_approx_eq!(model.weights().iter().sum::<f64>(), 1.0);
        assert!(model.weights().iter().all(|&w| w > 0.0));

        // free weights follow the class proportions when the clusters sit on the pinned means
        let skewed = sample_clusters(&[(0.25, 300), (0.5, 100), (0.75, 100)], 0.03, 13);
        let model = GaussianMixture::fit(&skewed, 3, &MixtureConstraint::FixedMeans(means.clone()), &MixtureConfig::default()).unwrap();
        assert_eq!(model.means(), means.as_slice());
        assert_approx_eq!(model.weights()[0], 0.6, 0.1);
        assert_approx_eq!(model.weights()[1], 0.2, 0.1);
        assert_approx_eq!(model.weights()[2], 0.2, 0.1);

        let model = GaussianMixture::fit(
            &data, 3, &MixtureConstraint::FixedMeansFixedWeights(means.clone(), weights.clone()), &MixtureConfig::default()
        ).unwrap();
        assert_eq!(model.means(), means.as_slice());
        assert_eq!(model.weights(), weights.as_slice());
        assert_eq!(model.n_free_parameters(), 3);
        assert!(model.variances().iter().all(|&v| v >= 1e-6));
    }

    #[test]
    fn test_degenerate_data() {
        // identical points still produce a finite fit thanks to the variance floor
        let data = vec![0.5; 20];
        let model = GaussianMixture::fit(&data, 2, &MixtureConstraint::Unconstrained, &MixtureConfig::default()).unwrap();
        assert!(model.bic().is_finite());
        assert!(model.variances().iter().all(|&v| v >= 1e-6));

        // fewer points than components
        let model = GaussianMixture::fit(&[0.4], 3, &MixtureConstraint::Unconstrained, &MixtureConfig::default()).unwrap();
        assert!(model.mean_log_likelihood().is_finite());
    }

    #[test]
    fn test_fit_errors() {
        let config = MixtureConfig::default();
        assert_eq!(GaussianMixture::fit(&[], 2, &MixtureConstraint::Unconstrained, &config).unwrap_err(), MixtureError::EmptyData);
        assert_eq!(
            GaussianMixture::fit(&[0.5], 2, &MixtureConstraint::FixedMeans(vec![0.5]), &config).unwrap_err(),
            MixtureError::ConstraintLength { expected: 2, found: 1 }
        );
    }

    #[test]
    fn test_bic() {
        let data = sample_clusters(&[(0.5, 100)], 0.05, 3);
        let model = GaussianMixture::fit(&data, 1, &MixtureConstraint::FixedMeans(vec![0.5]), &MixtureConfig::default()).unwrap();
        let expected = -2.0 * model.score(&data) * 100.0 + (100.0_f64).ln();
        assert_approx_eq!(model.bic(), expected);
    }
}
