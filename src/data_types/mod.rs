/// Per-sample genotype field values and the filtering thresholds applied to them
pub mod genotype_record;
/// Per-individual ploidy calls and the final table
pub mod ploidy_call;
/// Chromosome label interning and per-site coordinates
pub mod site_positions;
/// The dense four-layer per-site, per-individual data
pub mod variant_tensor;
