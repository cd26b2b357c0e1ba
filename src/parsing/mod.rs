/// Parses the colon-delimited per-sample genotype strings
pub mod genotype_field;
/// Loads the sample sheet that maps individuals to populations
pub mod population_map;
/// Resolves the VCF sample header into an ordered individual table
pub mod sample_columns;
/// Pre-scan and streaming of VCF data lines
pub mod vcf_reader;
