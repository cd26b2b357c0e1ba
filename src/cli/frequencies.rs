
use clap::Args;
use log::info;
use serde::Serialize;
use std::path::PathBuf;

use crate::cli::core::{AFTER_HELP, FULL_VERSION};
use crate::cli::extraction::{check_extraction_args, ExtractionArgs};
use crate::data_types::variant_tensor::ExtractionMode;

#[derive(Args, Clone, Default, Serialize)]
#[clap(author, about,
    after_help = &**AFTER_HELP
)]
pub struct FrequenciesSettings {
    #[clap(default_value = "")]
    #[clap(hide = true)]
    abploidy_version: String,

    #[clap(flatten)]
    pub extraction: ExtractionArgs,

    /// Output folder for the per-individual layer dumps [default: no dumps]
    #[clap(short = 'o')]
    #[clap(long = "output-dir")]
    #[clap(value_name = "DIR")]
    #[clap(help_heading = Some("Input/Output"))]
    pub output_folder: Option<PathBuf>,

    /// Quantity stored in the value layer
    #[clap(long = "extraction-mode")]
    #[clap(value_name = "MODE")]
    #[clap(default_value = "allele-balance")]
    #[clap(help_heading = Some("Extraction"))]
    pub extraction_mode: ExtractionMode,

    /// Keep the chromosome and position of every site (always on in genotype mode)
    #[clap(long = "track-positions")]
    #[clap(help_heading = Some("Extraction"))]
    pub track_positions: bool,

    /// Enable verbose output.
    #[clap(short = 'v')]
    #[clap(long = "verbose")]
    #[clap(action = clap::ArgAction::Count)]
    pub verbosity: u8
}

pub fn check_frequencies_settings(mut settings: FrequenciesSettings) -> anyhow::Result<FrequenciesSettings> {
    // hard code the version in
    settings.abploidy_version = FULL_VERSION.clone();
    info!("abploidy version: {:?}", &settings.abploidy_version);
    info!("Sub-command: frequencies");

    check_extraction_args(&settings.extraction)?;

    // genotype counts are only useful with their coordinates
    if settings.extraction_mode == ExtractionMode::Genotype {
        settings.track_positions = true;
    }
    info!("Extraction:");
    info!("\tMode: {}", settings.extraction_mode);
    info!("\tTrack positions: {}", if settings.track_positions { "ENABLED" } else { "DISABLED" });

    info!("Outputs:");
    match settings.output_folder.as_ref() {
        Some(output_folder) => info!("\tLayer dumps: {output_folder:?}"),
        None => info!("\tLayer dumps: None")
    };

    Ok(settings)
}
