
use serde::Serialize;
use strum::IntoEnumIterator;
use strum_macros::{EnumIter, EnumString};

use crate::mixture::{MixtureError, MAX_PLOIDY, MIN_PLOIDY};

/// Which mixture parameters are pinned to their expected values
#[derive(Clone, Copy, Default, Debug, PartialEq, Eq, strum_macros::Display, EnumIter, EnumString, Serialize)]
pub enum ModelConstraints {
    /// Standard EM, nothing pinned
    #[strum(ascii_case_insensitive, serialize = "none")]
    Unconstrained,
    /// Means pinned, weights and variances free
    #[strum(ascii_case_insensitive, serialize = "means")]
    FixedMeans,
    /// Means and weights pinned, only variances free
    #[default]
    #[strum(ascii_case_insensitive, serialize = "means_weights")]
    FixedMeansFixedWeights
}

impl ModelConstraints {
    /// Numeric code used on the command line
    pub fn code(&self) -> u8 {
        match self {
            ModelConstraints::Unconstrained => 0,
            ModelConstraints::FixedMeans => 1,
            ModelConstraints::FixedMeansFixedWeights => 2
        }
    }
}

impl TryFrom<u8> for ModelConstraints {
    type Error = MixtureError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        ModelConstraints::iter()
            .find(|regime| regime.code() == value)
            .ok_or(MixtureError::UnsupportedConstraint { value })
    }
}

/// The concrete pinned parameters for a single fit
#[derive(Clone, Debug, PartialEq)]
pub enum MixtureConstraint {
    Unconstrained,
    FixedMeans(Vec<f64>),
    FixedMeansFixedWeights(Vec<f64>, Vec<f64>)
}

impl MixtureConstraint {
    /// Builds the pinned parameters for a ploidy under the given regime
    /// # Errors
    /// * if the ploidy is outside the supported range
    pub fn for_ploidy(regime: ModelConstraints, ploidy: u8) -> Result<Self, MixtureError> {
        Ok(match regime {
            ModelConstraints::Unconstrained => {
                // still validate so every regime accepts the same ploidies
                components_for_ploidy(ploidy)?;
                MixtureConstraint::Unconstrained
            },
            ModelConstraints::FixedMeans => MixtureConstraint::FixedMeans(expected_means(ploidy)?),
            ModelConstraints::FixedMeansFixedWeights => MixtureConstraint::FixedMeansFixedWeights(
                expected_means(ploidy)?, expected_weights(ploidy)?
            )
        })
    }

    /// Pinned means, if any
    pub fn means(&self) -> Option<&[f64]> {
        match self {
            MixtureConstraint::Unconstrained => None,
            MixtureConstraint::FixedMeans(means) |
            MixtureConstraint::FixedMeansFixedWeights(means, _) => Some(means)
        }
    }

    /// Pinned weights, if any
    pub fn weights(&self) -> Option<&[f64]> {
        match self {
            MixtureConstraint::Unconstrained |
            MixtureConstraint::FixedMeans(_) => None,
            MixtureConstraint::FixedMeansFixedWeights(_, weights) => Some(weights)
        }
    }
}

/// Number of mixture components for a ploidy; a diploid is a single component
pub fn components_for_ploidy(ploidy: u8) -> Result<usize, MixtureError> {
    if !(MIN_PLOIDY..=MAX_PLOIDY).contains(&ploidy) {
        return Err(MixtureError::UnsupportedPloidy { ploidy });
    }
    Ok(ploidy as usize - 1)
}

/// Expected allele balance of each heterozygous dosage class: 1/p, 2/p, ..., (p-1)/p
pub fn expected_means(ploidy: u8) -> Result<Vec<f64>, MixtureError> {
    let n_components = components_for_ploidy(ploidy)?;
    Ok((1..=n_components)
        .map(|dosage| dosage as f64 / ploidy as f64)
        .collect())
}

/// Expected proportion of sites in each dosage class
pub fn expected_weights(ploidy: u8) -> Result<Vec<f64>, MixtureError> {
    Ok(match ploidy {
        2 => vec![1.0],
        3 => vec![0.5, 0.5],
        4 => vec![0.25, 0.5, 0.25],
        5 => vec![0.25, 0.25, 0.25, 0.25],
        6 => vec![1.0 / 6.0, 1.0 / 6.0, 2.0 / 6.0, 1.0 / 6.0, 1.0 / 6.0],
        _ => return Err(MixtureError::UnsupportedPloidy { ploidy })
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx_eq::assert_approx_eq;
    use std::str::FromStr;

    #[test]
    fn test_expected_tables() {
        for ploidy in MIN_PLOIDY..=MAX_PLOIDY {
            let means = expected_means(ploidy).unwrap();
            let weights = expected_weights(ploidy).unwrap();
            assert_eq!(means.len(), ploidy as usize - 1);
            assert_eq!(weights.len(), means.len());
            assert_approx_eq!(weights.iter().sum::<f64>(), 1.0);
            // symmetric around 0.5
            for (i, j) in (0..means.len()).zip((0..means.len()).rev()) {
                assert_approx_eq!(means[i] + means[j], 1.0);
                assert_approx_eq!(weights[i], weights[j]);
            }
        }

        assert_eq!(expected_means(4).unwrap(), vec![0.25, 0.5, 0.75]);
        assert_eq!(expected_means(5).unwrap(), vec![0.2, 0.4, 0.6, 0.8]);
    }

    #[test]
    fn test_unsupported_ploidy() {
        for ploidy in [0, 1, 7, 200] {
            assert_eq!(components_for_ploidy(ploidy), Err(MixtureError::UnsupportedPloidy { ploidy }));
            assert!(MixtureConstraint::for_ploidy(ModelConstraints::Unconstrained, ploidy).unwrap_err().is_configuration_error());
        }
    }

    #[test]
    fn test_constraints() {
        assert_eq!(ModelConstraints::try_from(1).unwrap(), ModelConstraints::FixedMeans);
        for regime in ModelConstraints::iter() {
            assert_eq!(ModelConstraints::try_from(regime.code()).unwrap(), regime);
        }
        assert_eq!(ModelConstraints::try_from(3), Err(MixtureError::UnsupportedConstraint { value: 3 }));
        assert_eq!(ModelConstraints::from_str("MEANS_WEIGHTS").unwrap(), ModelConstraints::FixedMeansFixedWeights);

        let constraint = MixtureConstraint::for_ploidy(ModelConstraints::FixedMeans, 3).unwrap();
        assert_eq!(constraint.means().unwrap().len(), 2);
        assert!(constraint.weights().is_none());
        let constraint = MixtureConstraint::for_ploidy(ModelConstraints::FixedMeansFixedWeights, 4).unwrap();
        assert_eq!(constraint.weights().unwrap(), &[0.25, 0.5, 0.25]);
        assert_eq!(MixtureConstraint::for_ploidy(ModelConstraints::Unconstrained, 2).unwrap(), MixtureConstraint::Unconstrained);
    }
}
