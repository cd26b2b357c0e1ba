/*!
# Writers module
Contains the logic for writing the per-individual and summary output files.
*/
/// Generates the per-individual mixture fit diagnostics
pub mod fit_report;
/// Generates one tab-separated layer dump per individual
pub mod layer_dump;
/// Generates the final ploidy table
pub mod ploidy_table;
