
use anyhow::ensure;
use clap::Args;
use log::info;
use serde::Serialize;
use std::path::PathBuf;
use strum_macros::EnumString;

use crate::cli::core::check_required_filename;
use crate::data_types::genotype_record::{FilterConfig, FilterConfigBuilder};
use crate::parsing::sample_columns::IdentifierMode;

/// How missing genotype data is handled
#[derive(Clone, Copy, Default, Debug, PartialEq, Eq, strum_macros::Display, EnumString, Serialize, clap::ValueEnum)]
pub enum ImputationMethod {
    /// Missing and failing calls are dropped from the analysis
    #[default]
    #[strum(ascii_case_insensitive, serialize = "drop")]
    #[clap(name = "drop")]
    Drop
}

#[derive(Args, Clone, Default, Serialize)]
pub struct ExtractionArgs {
    /// Population map with `individual` and `population` columns (CSV)
    #[clap(required = true)]
    #[clap(short = 'p')]
    #[clap(long = "population-map")]
    #[clap(value_name = "CSV")]
    #[clap(help_heading = Some("Input/Output"))]
    pub population_map_fn: PathBuf,

    /// Input variant call file (uncompressed VCF)
    #[clap(required = true)]
    #[clap(short = 'i')]
    #[clap(long = "vcf")]
    #[clap(value_name = "VCF")]
    #[clap(help_heading = Some("Input/Output"))]
    pub vcf_fn: PathBuf,

    /// Optional output debug folder
    #[clap(long = "output-debug")]
    #[clap(value_name = "DIR")]
    #[clap(help_heading = Some("Input/Output"))]
    pub debug_folder: Option<PathBuf>,

    /// Use the second-to-last path segment of header sample names as the identifier
    #[clap(long = "pipeline-ids")]
    #[clap(help_heading = Some("Input/Output"))]
    pub pipeline_ids: bool,

    /// FILTER column value for sites to keep
    #[clap(long = "pass-flag")]
    #[clap(value_name = "FLAG")]
    #[clap(default_value = "PASS")]
    #[clap(help_heading = Some("Site filters"))]
    pub pass_flag: String,

    /// Minimum total read depth for a call to pass
    #[clap(long = "min-depth")]
    #[clap(value_name = "COUNT")]
    #[clap(default_value = "10")]
    #[clap(help_heading = Some("Site filters"))]
    pub min_depth: u32,

    /// Minimum alternate read count for a call to pass
    #[clap(long = "min-count")]
    #[clap(value_name = "COUNT")]
    #[clap(default_value = "3")]
    #[clap(help_heading = Some("Site filters"))]
    pub min_count: u32,

    /// Minimum genotype quality for a call to pass
    #[clap(long = "min-quality")]
    #[clap(value_name = "GQ")]
    #[clap(default_value = "20")]
    #[clap(help_heading = Some("Site filters"))]
    pub min_quality: u32,

    /// Handling of missing data
    #[clap(long = "imputation-method")]
    #[clap(value_name = "METHOD")]
    #[clap(default_value = "drop")]
    #[clap(help_heading = Some("Site filters"))]
    pub imputation_method: ImputationMethod
}

impl ExtractionArgs {
    /// Sample header identifier handling
    pub fn id_mode(&self) -> IdentifierMode {
        if self.pipeline_ids {
            IdentifierMode::SecondToLastSegment
        } else {
            IdentifierMode::LastSegment
        }
    }

    /// Builds the pass-filter thresholds
    pub fn filter_config(&self) -> anyhow::Result<FilterConfig> {
        Ok(FilterConfigBuilder::default()
            .min_depth(self.min_depth)
            .min_count(self.min_count)
            .min_quality(self.min_quality)
            .build()?)
    }
}

/// Validates and logs the shared extraction options
pub fn check_extraction_args(args: &ExtractionArgs) -> anyhow::Result<()> {
    info!("Inputs:");
    check_required_filename(&args.population_map_fn, "Population map")?;
    info!("\tPopulation map: {:?}", &args.population_map_fn);
    check_required_filename(&args.vcf_fn, "Input VCF")?;
    info!("\tVCF: {:?}", &args.vcf_fn);
    info!("\tSample identifiers: {}", if args.pipeline_ids { "second-to-last path segment" } else { "last path segment" });
    if let Some(debug_folder) = args.debug_folder.as_ref() {
        info!("\tDebug folder: {debug_folder:?}");
    }

    info!("Site filters:");
    ensure!(!args.pass_flag.is_empty(), "--pass-flag must not be empty");
    info!("\tPass flag: {:?}", args.pass_flag);
    info!("\tMinimum depth: {}", args.min_depth);
    info!("\tMinimum alternate count: {}", args.min_count);
    info!("\tMinimum quality: {}", args.min_quality);
    info!("\tImputation: {}", args.imputation_method);
    Ok(())
}
