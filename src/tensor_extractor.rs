/*!
# Tensor extractor
Streams the pass-filter sites of a VCF and writes every mapped individual's call into the pre-allocated `VariantTensor`.
The tensor is sized by the pre-scan, so this is always a two-pass process over the file.

## Example usage
```rust
use abploidy::data_types::variant_tensor::ExtractionMode;
use abploidy::parsing::population_map::PopulationMap;
use abploidy::parsing::sample_columns::IdentifierMode;
use abploidy::parsing::vcf_reader::scan_vcf_dimensions;
use abploidy::tensor_extractor::{extract_tensor, ExtractionConfig};
use std::io::Cursor;

let vcf = "#CHROM\tPOS\tID\tREF\tALT\tQUAL\tFILTER\tINFO\tFORMAT\tind_a\nchr1\t10\t.\tA\tG\t.\tPASS\t.\tGT:AD:DP:GQ:PL\t0/1:10,5:.:30:.\n";
let sheet = "individual,population\nind_a,p1\n";
let population_map = PopulationMap::from_csv_reader(csv::Reader::from_reader(sheet.as_bytes())).unwrap();

let dimensions = scan_vcf_dimensions(Cursor::new(vcf), &population_map, IdentifierMode::LastSegment, "PASS").unwrap();
let tensor = extract_tensor(Cursor::new(vcf), &dimensions, &ExtractionConfig::default()).unwrap();
assert_eq!(tensor.shape(), (4, 1, 1));
assert_eq!(tensor.mode(), ExtractionMode::AlleleBalance);
assert_eq!(tensor.individual(0).unwrap().depth[0], 15);
```
*/
use anyhow::Context;
use derive_builder::Builder;
use log::{debug, info, warn};
use serde::Serialize;
use std::io::BufRead;
use std::path::Path;

use crate::data_types::genotype_record::{FieldStatus, FilterConfig, GenotypeRecord};
use crate::data_types::variant_tensor::{ExtractionMode, VariantTensor};
use crate::parsing::vcf_reader::{open_vcf_file, VcfDimensions, VcfSiteReader};

/// Controls how calls are converted into tensor values
#[derive(Builder, Clone, Debug, Serialize)]
#[builder(default)]
pub struct ExtractionConfig {
    /// What goes into the value layer
    mode: ExtractionMode,
    /// Thresholds for the pass-filter layer
    filters: FilterConfig,
    /// Filter column value that marks a usable site
    #[builder(setter(into))]
    pass_flag: String,
    /// If true, the chromosome and position of each site is kept with the tensor
    track_positions: bool
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            mode: ExtractionMode::AlleleBalance,
            filters: FilterConfig::default(),
            pass_flag: "PASS".to_string(),
            track_positions: false
        }
    }
}

impl ExtractionConfig {
    // getters
    pub fn mode(&self) -> ExtractionMode {
        self.mode
    }

    pub fn filters(&self) -> &FilterConfig {
        &self.filters
    }

    pub fn pass_flag(&self) -> &str {
        &self.pass_flag
    }

    pub fn track_positions(&self) -> bool {
        self.track_positions
    }
}

/// Opens a VCF and extracts it into a tensor, see `extract_tensor`
pub fn extract_vcf_file(vcf_fn: &Path, dimensions: &VcfDimensions, config: &ExtractionConfig) -> anyhow::Result<VariantTensor> {
    let reader = open_vcf_file(vcf_fn)?;
    extract_tensor(reader, dimensions, config)
        .with_context(|| format!("Error while extracting {vcf_fn:?}:"))
}

/// Fills a new tensor from the VCF content.
/// Malformed genotype fields are reported and stored as zero-depth, failing calls.
/// # Arguments
/// * `reader` - the VCF content, from the top of the file
/// * `dimensions` - results of the pre-scan on the same content
/// * `config` - value mode and filter thresholds
/// # Errors
/// * if the VCF fails to parse at the line level
/// * if the number of sites differs from the pre-scan
pub fn extract_tensor<R: BufRead>(reader: R, dimensions: &VcfDimensions, config: &ExtractionConfig) -> anyhow::Result<VariantTensor> {
    let columns = dimensions.columns();
    let mut tensor = VariantTensor::new(
        dimensions.n_sites(), dimensions.n_individuals(), config.mode, config.track_positions
    );

    let mut malformed_records: usize = 0;
    for site in VcfSiteReader::new(reader, columns, &config.pass_flag) {
        let site = site?;
        let site_index = tensor.next_site(site.chrom(), site.position())
            .with_context(|| format!("Error while adding line {}:", site.line_number()))?;

        for (ind_index, opt_record) in site.records().iter().enumerate() {
            let record = match opt_record {
                Some(r) => *r,
                None => {
                    debug!("Line {} is missing the column for {:?}", site.line_number(), columns.individual(ind_index));
                    GenotypeRecord::degraded(FieldStatus::TooFewSubfields, None)
                }
            };

            if record.status() == FieldStatus::MalformedCounts {
                malformed_records += 1;
                warn!(
                    "Incorrectly formatted genotype field for {} at variant {} ({}:{})",
                    columns.individual(ind_index).unwrap_or("?"), tensor.site_counts()[ind_index],
                    site.chrom(), site.position()
                );
            }

            let value = call_value(&record, config.mode);
            let passes = record.passes(&config.filters);
            tensor.write_call(site_index, ind_index, value, record.depth(), record.quality(), passes)?;
        }
    }
    tensor.finalize()?;

    if malformed_records > 0 {
        warn!("Found {malformed_records} incorrectly formatted genotype fields");
    }
    info!("Array shape: {:?}", tensor.shape());
    info!("Memory usage: {:.2} MB", tensor.nbytes() as f64 / 1024.0 / 1024.0);
    info!("Processed VCF of {} sites for {} individuals", tensor.n_sites(), tensor.n_individuals());
    Ok(tensor)
}

/// Converts a genotype record into the value layer entry for the given mode.
/// Unparseable diploid calls become NaN in genotype mode.
pub fn call_value(record: &GenotypeRecord, mode: ExtractionMode) -> f32 {
    match mode {
        ExtractionMode::AlleleBalance => record.allele_balance() as f32,
        ExtractionMode::Genotype => record.alt_alleles()
            .map(|a| a as f32)
            .unwrap_or(f32::NAN)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx_eq::assert_approx_eq;
    use std::io::Cursor;
    use std::path::PathBuf;

    use crate::data_types::variant_tensor::TensorError;
    use crate::parsing::population_map::PopulationMap;
    use crate::parsing::sample_columns::IdentifierMode;
    use crate::parsing::vcf_reader::{scan_vcf_dimensions, scan_vcf_file};

    const TEST_VCF: &str = "#CHROM\tPOS\tID\tREF\tALT\tQUAL\tFILTER\tINFO\tFORMAT\tind_a\tind_b
chr1\t100\t.\tA\tC\t50\tPASS\t.\tGT:AD:DP:GQ:PL\t0/1:10,5:.:30:.\t1/1:1,12:13:40:.
chr1\t150\t.\tA\tC\t50\tq10\t.\tGT:AD:DP:GQ:PL\t0/1:10,5:.:30:.\t1/1:1,12:13:40:.
chr2\t200\t.\tG\tT\t50\tPASS\t.\tGT:AD:DP:GQ:PL\t0/1:ab:.:30:.\t0/0:70000,2:.:300:.
chr3\t5\t.\tG\tT\t50\tPASS\t.\tGT:AD:DP:GQ:PL\t./.:0,0:0:0:.
";

    fn pop_map() -> PopulationMap {
        PopulationMap::from_csv_reader(csv::Reader::from_reader("individual,population\nind_a,p1\nind_b,p1\n".as_bytes())).unwrap()
    }

    #[test]
    fn test_minimal_file() {
        let pop_map = PopulationMap::from_csv(&PathBuf::from("test_data/minimal/populations.csv")).unwrap();
        let vcf_fn = PathBuf::from("test_data/minimal/minimal.vcf");
        let dims = scan_vcf_file(&vcf_fn, &pop_map, IdentifierMode::LastSegment, "PASS").unwrap();
        assert_eq!((dims.n_sites(), dims.n_individuals()), (1, 2));

        let tensor = extract_vcf_file(&vcf_fn, &dims, &ExtractionConfig::default()).unwrap();
        assert_eq!(tensor.shape(), (4, dims.n_sites(), dims.n_individuals()));
        for ind in 0..2 {
            let layers = tensor.individual(ind).unwrap();
            assert_eq!(layers.depth[0], 15);
            assert_eq!(layers.quality[0], 30);
            assert!(layers.pass_filter[0]);
            // alt = balance * depth, ref = depth - alt
            let alt = layers.values[0] as f64 * layers.depth[0] as f64;
            assert_approx_eq!(alt, 5.0, 1e-5);
            assert_approx_eq!(layers.depth[0] as f64 - alt, 10.0, 1e-5);
        }
    }

    #[test]
    fn test_allele_balance_mode() {
        let dims = scan_vcf_dimensions(Cursor::new(TEST_VCF), &pop_map(), IdentifierMode::LastSegment, "PASS").unwrap();
        let tensor = extract_tensor(Cursor::new(TEST_VCF), &dims, &ExtractionConfig::default()).unwrap();
        assert_eq!(tensor.shape(), (4, 3, 2));
        assert_eq!(tensor.site_counts(), &[3, 3]);
        assert!(tensor.positions().is_none());

        let ind_a = tensor.individual(0).unwrap();
        assert_approx_eq!(ind_a.values[0] as f64, 1.0 / 3.0, 1e-6);
        // malformed counts degrade to zeros
        assert_eq!((ind_a.values[1], ind_a.depth[1], ind_a.quality[1], ind_a.pass_filter[1]), (0.0, 0, 0, false));

        let ind_b = tensor.individual(1).unwrap();
        assert!(ind_b.pass_filter[0]);
        // saturated layers, fails on alt count
        assert_eq!((ind_b.depth[1], ind_b.quality[1], ind_b.pass_filter[1]), (u16::MAX, u8::MAX, false));
        // missing column is written as an empty call
        assert_eq!((ind_b.depth[2], ind_b.pass_filter[2]), (0, false));
    }

    #[test]
    fn test_genotype_mode() {
        let dims = scan_vcf_dimensions(Cursor::new(TEST_VCF), &pop_map(), IdentifierMode::LastSegment, "PASS").unwrap();
        let config = ExtractionConfigBuilder::default()
            .mode(ExtractionMode::Genotype)
            .track_positions(true)
            .build().unwrap();
        let tensor = extract_tensor(Cursor::new(TEST_VCF), &dims, &config).unwrap();

        let ind_a = tensor.individual(0).unwrap();
        assert_eq!(ind_a.values[0], 1.0);
        assert_eq!(ind_a.values[1], 1.0);
        assert!(ind_a.values[2].is_nan());
        let ind_b = tensor.individual(1).unwrap();
        assert_eq!(ind_b.values[0], 2.0);
        assert_eq!(ind_b.values[1], 0.0);

        let positions = tensor.positions().unwrap();
        assert_eq!(positions.chrom_ids(), &[0, 1, 2]);
        assert_eq!(positions.get(1), Some(("chr2", 200)));
    }

    #[test]
    fn test_dimension_mismatch() {
        // pre-scan with one sentinel, extract with another
        let dims = scan_vcf_dimensions(Cursor::new(TEST_VCF), &pop_map(), IdentifierMode::LastSegment, "q10").unwrap();
        let result = extract_tensor(Cursor::new(TEST_VCF), &dims, &ExtractionConfig::default());
        let err = result.unwrap_err();
        assert!(err.chain().any(|e| matches!(e.downcast_ref::<TensorError>(), Some(TensorError::SiteOverflow { .. }))));

        let config = ExtractionConfigBuilder::default().pass_flag("q10").build().unwrap();
        let dims = scan_vcf_dimensions(Cursor::new(TEST_VCF), &pop_map(), IdentifierMode::LastSegment, "PASS").unwrap();
        let err = extract_tensor(Cursor::new(TEST_VCF), &dims, &config).unwrap_err();
        assert_eq!(err.downcast_ref::<TensorError>(), Some(&TensorError::SiteCountMismatch { expected: 3, found: 1 }));
    }
}
