
use anyhow::bail;
use clap::{Parser, Subcommand};
use chrono::Datelike;
use lazy_static::lazy_static;
use std::path::Path;

use crate::cli::frequencies::FrequenciesSettings;
use crate::cli::ploidy::PloidySettings;

lazy_static! {
    /// Stores the full version string we plan to use, which is generated in build.rs
    /// # Examples
    /// * `0.3.1-6bb9635-dirty` - while on a dirty branch
    /// * `0.3.1-6bb9635` - with a fresh commit
    pub static ref FULL_VERSION: String = format!("{}-{}", env!("CARGO_PKG_VERSION"), env!("VERGEN_GIT_DESCRIBE"));

    /// Shared after help string containing the legalese.
    pub static ref AFTER_HELP: String = format!("Copyright (C) 2021-{}     abploidy contributors
This program comes with ABSOLUTELY NO WARRANTY; it is distributed under
the MIT license and is intended for research use only.", chrono::Utc::now().year());
}

#[derive(Parser)]
#[clap(author,
    version = &**FULL_VERSION,
    about,
    after_help = &**AFTER_HELP)]
#[command(propagate_version = true)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands
}

/// abploidy, ploidy estimation from allele balance in population VCFs.
/// Select a subcommand to see more usage information:
#[derive(Subcommand)]
pub enum Commands {
    /// Extracts per-individual allele balance (or genotype) layers from a VCF
    Frequencies(Box<FrequenciesSettings>),
    /// Estimates the ploidy of every individual from allele balance mixtures
    Ploidy(Box<PloidySettings>)
}

pub fn get_cli() -> Cli {
    Cli::parse()
}

/// Checks if a file exists and will otherwise exit
/// # Arguments
/// * `filename` - the file path to check for
/// * `label` - the label to use for error messages
pub fn check_required_filename(filename: &Path, label: &str) -> anyhow::Result<()> {
    if !filename.exists() {
        bail!("{} does not exist: \"{}\"", label, filename.display());
    }

    // file exists
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_check_required_filename() {
        assert!(check_required_filename(Path::new("./test_data/minimal/minimal.vcf"), "VCF").is_ok());
        let err = check_required_filename(Path::new("./test_data/minimal/missing.vcf"), "VCF").unwrap_err();
        assert!(err.to_string().starts_with("VCF does not exist"));
    }
}
