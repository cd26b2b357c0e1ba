/// Command line interface functionality
pub mod cli;
/// Contains various shared data types
pub mod data_types;
/// Mixed-effects significance testing of the mixture site classes
pub mod mixed_model;
/// Constrained Gaussian mixture fitting and model selection
pub mod mixture;
/// Tooling for parsing input files into meaningful structs / data
pub mod parsing;
/// Core logic for estimating ploidy across all individuals
pub mod ploidy_solver;
/// Converts the parsed VCF records into the dense per-individual layers
pub mod tensor_extractor;
/// Various utility functions that tend to be very generic
pub mod util;
/// All output writers
pub mod writers;
