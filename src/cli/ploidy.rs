
use anyhow::{bail, ensure};
use clap::Args;
use itertools::Itertools;
use log::info;
use serde::Serialize;
use std::path::PathBuf;
use strum_macros::EnumString;

use crate::cli::core::{AFTER_HELP, FULL_VERSION};
use crate::cli::extraction::{check_extraction_args, ExtractionArgs};
use crate::mixture::expected::ModelConstraints;
use crate::mixture::selection::validate_ploidy_levels;

/// Method used to estimate ploidy
#[derive(Clone, Copy, Default, Debug, PartialEq, Eq, strum_macros::Display, EnumString, Serialize, clap::ValueEnum)]
pub enum EstimationMethod {
    /// Gaussian mixture models over allele balance
    #[default]
    #[strum(ascii_case_insensitive, serialize = "gmm")]
    #[clap(name = "gmm")]
    Gmm
}

#[derive(Args, Clone, Default, Serialize)]
#[clap(author, about,
    after_help = &**AFTER_HELP
)]
pub struct PloidySettings {
    #[clap(default_value = "")]
    #[clap(hide = true)]
    abploidy_version: String,

    #[clap(flatten)]
    pub extraction: ExtractionArgs,

    /// Output folder for the ploidy table and per-individual fit reports
    #[clap(required = true)]
    #[clap(short = 'o')]
    #[clap(long = "output-dir")]
    #[clap(value_name = "DIR")]
    #[clap(help_heading = Some("Input/Output"))]
    pub output_folder: PathBuf,

    /// Ploidy estimation method
    #[clap(long = "estimation-method")]
    #[clap(value_name = "METHOD")]
    #[clap(default_value = "gmm")]
    #[clap(help_heading = Some("Ploidy estimation"))]
    pub estimation_method: EstimationMethod,

    /// Candidate ploidy levels, comma separated (2-6)
    #[clap(long = "ploidy-levels")]
    #[clap(value_name = "LIST")]
    #[clap(value_delimiter = ',')]
    #[clap(default_value = "2,4,6")]
    #[clap(help_heading = Some("Ploidy estimation"))]
    pub ploidy_levels: Vec<u8>,

    /// Minimum number of filtered sites for an individual to be estimated
    #[clap(long = "min-sites")]
    #[clap(value_name = "COUNT")]
    #[clap(default_value = "100")]
    #[clap(help_heading = Some("Ploidy estimation"))]
    pub min_sites: usize,

    /// Mixture constraints: 0 = none, 1 = fixed means, 2 = fixed means and weights
    #[clap(long = "model-constraints")]
    #[clap(value_name = "INT")]
    #[clap(default_value = "2")]
    #[clap(help_heading = Some("Ploidy estimation"))]
    pub model_constraints: u8,

    /// Minimum BIC improvement for a higher ploidy to be selected
    #[clap(long = "evidence-margin")]
    #[clap(value_name = "FLOAT")]
    #[clap(default_value = "3.2")]
    #[clap(help_heading = Some("Ploidy estimation"))]
    pub evidence_margin: f64,

    /// Number of threads to use in the estimation step
    #[clap(long = "threads")]
    #[clap(value_name = "THREADS")]
    #[clap(default_value = "1")]
    pub threads: usize,

    /// Enable verbose output.
    #[clap(short = 'v')]
    #[clap(long = "verbose")]
    #[clap(action = clap::ArgAction::Count)]
    pub verbosity: u8
}

impl PloidySettings {
    /// The constraint regime; valid after `check_ploidy_settings`
    pub fn constraint_regime(&self) -> anyhow::Result<ModelConstraints> {
        Ok(ModelConstraints::try_from(self.model_constraints)?)
    }
}

pub fn check_ploidy_settings(mut settings: PloidySettings) -> anyhow::Result<PloidySettings> {
    // hard code the version in
    settings.abploidy_version = FULL_VERSION.clone();
    info!("abploidy version: {:?}", &settings.abploidy_version);
    info!("Sub-command: ploidy");

    check_extraction_args(&settings.extraction)?;

    info!("Outputs:");
    info!("\tOutput folder: {:?}", &settings.output_folder);

    info!("Ploidy estimation:");
    info!("\tMethod: {}", settings.estimation_method);
    settings.ploidy_levels = match validate_ploidy_levels(&settings.ploidy_levels) {
        Ok(levels) => levels,
        Err(e) => bail!("Invalid --ploidy-levels {:?}: {e}", settings.ploidy_levels)
    };
    info!("\tPloidy levels: {}", settings.ploidy_levels.iter().join(", "));
    ensure!(settings.min_sites > 0, "--min-sites must be >0");
    info!("\tMinimum sites: {}", settings.min_sites);
    let regime = settings.constraint_regime()?;
    info!("\tModel constraints: {} ({regime})", settings.model_constraints);
    ensure!(
        settings.evidence_margin.is_finite() && settings.evidence_margin >= 0.0,
        "--evidence-margin must be a finite value >=0"
    );
    info!("\tEvidence margin: {}", settings.evidence_margin);

    if settings.threads == 0 {
        settings.threads = 1;
    }
    info!("Processing threads: {}", settings.threads);

    Ok(settings)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::core::{Cli, Commands};
    use clap::Parser;

    fn parse_ploidy(extra: &[&str]) -> PloidySettings {
        let mut args = vec![
            "abploidy", "ploidy",
            "-p", "./test_data/minimal/populations.csv",
            "-i", "./test_data/minimal/minimal.vcf",
            "-o", "./unused_output"
        ];
        args.extend_from_slice(extra);
        let cli = Cli::try_parse_from(args).unwrap();
        match cli.command {
            Commands::Ploidy(settings) => *settings,
            _ => panic!("wrong subcommand")
        }
    }

    #[test]
    fn test_defaults() {
        let settings = check_ploidy_settings(parse_ploidy(&[])).unwrap();
        assert_eq!(settings.ploidy_levels, vec![2, 4, 6]);
        assert_eq!(settings.min_sites, 100);
        assert_eq!(settings.constraint_regime().unwrap(), ModelConstraints::FixedMeansFixedWeights);
        assert_eq!(settings.evidence_margin, 3.2);
        assert_eq!(settings.estimation_method, EstimationMethod::Gmm);
    }

    #[test]
    fn test_ploidy_levels() {
        let settings = check_ploidy_settings(parse_ploidy(&["--ploidy-levels", "6,3,3,2"])).unwrap();
        assert_eq!(settings.ploidy_levels, vec![2, 3, 6]);

        assert!(check_ploidy_settings(parse_ploidy(&["--ploidy-levels", "2,7"])).is_err());
        assert!(check_ploidy_settings(parse_ploidy(&["--ploidy-levels", "1,2"])).is_err());
    }

    #[test]
    fn test_invalid_options() {
        assert!(check_ploidy_settings(parse_ploidy(&["--model-constraints", "3"])).is_err());
        assert!(check_ploidy_settings(parse_ploidy(&["--min-sites", "0"])).is_err());
        assert!(check_ploidy_settings(parse_ploidy(&["--evidence-margin=-1"])).is_err());

        // unsupported methods are rejected while parsing
        let args = [
            "abploidy", "ploidy", "-p", "a.csv", "-i", "b.vcf", "-o", "out", "--estimation-method", "kmeans"
        ];
        assert!(Cli::try_parse_from(args).is_err());
    }
}
