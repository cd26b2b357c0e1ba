/*!
# CLI module
Command line interface functionality that is specific to abploidy.
*/

/// The main CLI module that contains the top-level CLI parser and help text
pub mod core;
/// Input and filter options shared by every subcommand
pub mod extraction;
/// The frequencies CLI subcommand
pub mod frequencies;
/// The ploidy CLI subcommand
pub mod ploidy;
