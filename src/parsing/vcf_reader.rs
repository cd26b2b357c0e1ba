
use anyhow::{anyhow, bail, Context};
use log::{debug, info, warn};
use std::fs::File;
use std::io::{BufRead, BufReader, Lines};
use std::path::Path;

use crate::data_types::genotype_record::GenotypeRecord;
use crate::parsing::genotype_field::parse_genotype_field;
use crate::parsing::population_map::PopulationMap;
use crate::parsing::sample_columns::{IdentifierMode, SampleColumns};

// fixed column indices we read from each data line
const CHROM_INDEX: usize = 0;
const POS_INDEX: usize = 1;
const FILTER_INDEX: usize = 6;

/// Opens an uncompressed, line-oriented VCF file
/// # Errors
/// * if the file looks compressed or cannot be opened
pub fn open_vcf_file(filename: &Path) -> anyhow::Result<BufReader<File>> {
    let extension = filename.extension().unwrap_or_default();
    if extension == "gz" || extension == "bgz" || extension == "bcf" {
        bail!("Compressed VCF input is not supported, please decompress {filename:?}");
    }
    let file = File::open(filename)
        .with_context(|| format!("Error while opening {filename:?}:"))?;
    Ok(BufReader::new(file))
}

/// Result of the pre-scan, used to size the tensor
#[derive(Clone, Debug)]
pub struct VcfDimensions {
    /// Number of data lines whose filter column equals the pass sentinel
    n_sites: usize,
    /// Mapped individuals in header order
    columns: SampleColumns
}

impl VcfDimensions {
    pub fn n_sites(&self) -> usize {
        self.n_sites
    }

    pub fn n_individuals(&self) -> usize {
        self.columns.len()
    }

    pub fn columns(&self) -> &SampleColumns {
        &self.columns
    }
}

/// Scans a VCF file once to count pass-filter sites and resolve the sample header.
/// See `scan_vcf_dimensions` for details.
pub fn scan_vcf_file(vcf_fn: &Path, population_map: &PopulationMap, id_mode: IdentifierMode, pass_flag: &str) -> anyhow::Result<VcfDimensions> {
    let reader = open_vcf_file(vcf_fn)?;
    scan_vcf_dimensions(reader, population_map, id_mode, pass_flag)
        .with_context(|| format!("Error while scanning {vcf_fn:?}:"))
}

/// Counts pass-filter sites and builds the individual column table.
/// Every individual in the population map must be present in the header; all missing ones are reported before failing.
/// # Arguments
/// * `reader` - the VCF content
/// * `population_map` - individuals of interest
/// * `id_mode` - how to reduce path-style sample identifiers
/// * `pass_flag` - filter column value that marks a usable site, e.g. "PASS" or "."
/// # Errors
/// * if the header line is missing
/// * if any mapped individual is absent from the header
pub fn scan_vcf_dimensions<R: BufRead>(reader: R, population_map: &PopulationMap, id_mode: IdentifierMode, pass_flag: &str) -> anyhow::Result<VcfDimensions> {
    let mut columns: Option<SampleColumns> = None;
    let mut n_sites = 0;
    for line in reader.lines() {
        let line = line?;
        if columns.is_none() {
            if SampleColumns::is_header_line(&line) {
                columns = Some(SampleColumns::from_header_line(&line, id_mode, population_map));
            }
            continue;
        }

        if line.split_whitespace().nth(FILTER_INDEX) == Some(pass_flag) {
            n_sites += 1;
        }
    }

    let columns = columns.ok_or(anyhow!("No sample header line (#CHROM) was found"))?;
    let missing = columns.missing_individuals(population_map);
    if !missing.is_empty() {
        warn!("Not all individuals in the population map are present in the VCF:");
        for individual in missing.iter() {
            warn!("\t{individual} found in population map but not VCF!");
        }
        bail!("{} individuals from the population map are missing from the VCF", missing.len());
    }

    info!("Found {n_sites} sites and {} individuals", columns.len());
    Ok(VcfDimensions {
        n_sites, columns
    })
}

/// One pass-filter data line
#[derive(Clone, Debug, PartialEq)]
pub struct VcfSite {
    /// 1-based line number in the file
    line_number: usize,
    /// Chromosome label
    chrom: String,
    /// 1-based position
    position: u64,
    /// Parsed genotype for each mapped individual, in individual-index order; None if the column is absent
    records: Vec<Option<GenotypeRecord>>
}

impl VcfSite {
    pub fn line_number(&self) -> usize {
        self.line_number
    }

    pub fn chrom(&self) -> &str {
        &self.chrom
    }

    pub fn position(&self) -> u64 {
        self.position
    }

    pub fn records(&self) -> &[Option<GenotypeRecord>] {
        &self.records
    }
}

/// Streams pass-filter sites from a VCF, in file order.
/// Lines before the sample header are ignored, as are data lines whose filter column is not the pass sentinel.
pub struct VcfSiteReader<'a, R: BufRead> {
    /// Underlying line iterator
    lines: Lines<R>,
    /// Column table from the pre-scan
    columns: &'a SampleColumns,
    /// Filter column value that marks a usable site
    pass_flag: String,
    /// Lines consumed so far
    line_number: usize,
    /// Set once the header line goes by
    header_seen: bool,
    /// Set once we have returned the end of the iterator (or an error for a missing header)
    finished: bool
}

impl<'a, R: BufRead> VcfSiteReader<'a, R> {
    /// Creates a new site reader
    /// # Arguments
    /// * `reader` - the VCF content, starting from the top of the file
    /// * `columns` - the column table resolved during the pre-scan
    /// * `pass_flag` - filter column value that marks a usable site
    pub fn new(reader: R, columns: &'a SampleColumns, pass_flag: &str) -> Self {
        Self {
            lines: reader.lines(),
            columns,
            pass_flag: pass_flag.to_string(),
            line_number: 0,
            header_seen: false,
            finished: false
        }
    }

    /// Parses a single data line; returns None if the line is skipped by the filter column
    fn parse_line(&self, line: &str) -> anyhow::Result<Option<VcfSite>> {
        let fields: Vec<&str> = line.split_whitespace().collect();
        if fields.len() <= FILTER_INDEX {
            bail!("Line {} has {} columns, expected at least {}", self.line_number, fields.len(), FILTER_INDEX + 1);
        }
        if fields[FILTER_INDEX] != self.pass_flag {
            return Ok(None);
        }

        let chrom = fields[CHROM_INDEX].to_string();
        let position: u64 = fields[POS_INDEX].parse()
            .with_context(|| format!("Error while parsing position {:?} on line {}", fields[POS_INDEX], self.line_number))?;
        let records = self.columns.mapped().iter()
            .map(|sc| fields.get(sc.column()).map(|f| parse_genotype_field(f)))
            .collect();

        Ok(Some(VcfSite {
            line_number: self.line_number,
            chrom, position, records
        }))
    }
}

impl<R: BufRead> Iterator for VcfSiteReader<'_, R> {
    type Item = anyhow::Result<VcfSite>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }

        while let Some(line) = self.lines.next() {
            self.line_number += 1;
            let line = match line {
                Ok(l) => l,
                Err(e) => {
                    self.finished = true;
                    return Some(Err(e.into()));
                }
            };

            if !self.header_seen {
                if SampleColumns::is_header_line(&line) {
                    debug!("Found sample header on line {}", self.line_number);
                    self.header_seen = true;
                }
                continue;
            }

            if line.trim().is_empty() {
                continue;
            }

            match self.parse_line(&line) {
                Ok(Some(site)) => return Some(Ok(site)),
                Ok(None) => {},
                Err(e) => {
                    self.finished = true;
                    return Some(Err(e));
                }
            }
        }

        self.finished = true;
        if self.header_seen {
            None
        } else {
            Some(Err(anyhow!("No sample header line (#CHROM) was found")))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;
    use std::path::PathBuf;

    use crate::data_types::genotype_record::FieldStatus;

    const TEST_VCF: &str = "##fileformat=VCFv4.2
##source=unit_test
1\t1\t.\tA\tC\t.\tPASS\t.\tGT:AD:DP:GQ:PL\t0/1:10,5:.:30:.\t0/1:10,5:.:30:.
#CHROM\tPOS\tID\tREF\tALT\tQUAL\tFILTER\tINFO\tFORMAT\tind_a\tunmapped\tind_b
chr1\t100\t.\tA\tC\t50\tPASS\t.\tGT:AD:DP:GQ:PL\t0/1:10,5:.:30:.\t0/0:9,0:9:20:.\t1/1:0,12:12:40:.
chr1\t200\t.\tG\tT\t50\tLowQual\t.\tGT:AD:DP:GQ:PL\t0/1:10,5:.:30:.\t0/0:9,0:9:20:.\t1/1:0,12:12:40:.

chr2\t50\t.\tG\tT\t50\tPASS\t.\tGT:AD:DP:GQ:PL\t0/1:x,5:.:30:.\t./.\t./.
";

    fn pop_map() -> PopulationMap {
        PopulationMap::from_csv_reader(csv::Reader::from_reader("individual,population\nind_b,p2\nind_a,p1\n".as_bytes())).unwrap()
    }

    #[test]
    fn test_scan_dimensions() {
        let dims = scan_vcf_dimensions(Cursor::new(TEST_VCF), &pop_map(), IdentifierMode::LastSegment, "PASS").unwrap();
        assert_eq!(dims.n_sites(), 2);
        assert_eq!(dims.n_individuals(), 2);
        assert_eq!(dims.columns().individuals(), vec!["ind_a".to_string(), "ind_b".to_string()]);

        let dims = scan_vcf_dimensions(Cursor::new(TEST_VCF), &pop_map(), IdentifierMode::LastSegment, "LowQual").unwrap();
        assert_eq!(dims.n_sites(), 1);
    }

    #[test]
    fn test_scan_missing_individual() {
        let pop_map = PopulationMap::from_csv_reader(csv::Reader::from_reader("individual,population\nind_a,p1\nind_q,p1\n".as_bytes())).unwrap();
        assert!(scan_vcf_dimensions(Cursor::new(TEST_VCF), &pop_map, IdentifierMode::LastSegment, "PASS").is_err());
        assert!(scan_vcf_dimensions(Cursor::new("##no header\n"), &pop_map, IdentifierMode::LastSegment, "PASS").is_err());
    }

    #[test]
    fn test_site_reader() {
        let dims = scan_vcf_dimensions(Cursor::new(TEST_VCF), &pop_map(), IdentifierMode::LastSegment, "PASS").unwrap();
        let sites: Vec<VcfSite> = VcfSiteReader::new(Cursor::new(TEST_VCF), dims.columns(), "PASS")
            .collect::<anyhow::Result<_>>()
            .unwrap();
        assert_eq!(sites.len(), 2);

        // pre-header data line is ignored, first real site
        assert_eq!(sites[0].chrom(), "chr1");
        assert_eq!(sites[0].position(), 100);
        assert_eq!(sites[0].line_number(), 5);
        let ind_a = sites[0].records()[0].unwrap();
        assert_eq!((ind_a.ref_count(), ind_a.alt_count(), ind_a.quality()), (10, 5, 30));
        let ind_b = sites[0].records()[1].unwrap();
        assert_eq!(ind_b.alt_alleles(), Some(2));

        // malformed and missing calls
        assert_eq!(sites[1].chrom(), "chr2");
        assert_eq!(sites[1].records()[0].unwrap().status(), FieldStatus::MalformedCounts);
        assert_eq!(sites[1].records()[1].unwrap().status(), FieldStatus::TooFewSubfields);
    }

    #[test]
    fn test_bad_lines() {
        let columns = SampleColumns::default();
        let short_line = "#CHROM\tPOS\nchr1\t5\t.\n";
        let result: anyhow::Result<Vec<VcfSite>> = VcfSiteReader::new(Cursor::new(short_line), &columns, "PASS").collect();
        assert!(result.is_err());

        let bad_pos = "#CHROM\tPOS\nchr1\tfive\t.\tA\tC\t.\tPASS\t.\n";
        let result: anyhow::Result<Vec<VcfSite>> = VcfSiteReader::new(Cursor::new(bad_pos), &columns, "PASS").collect();
        assert!(result.is_err());

        let no_header = "chr1\t5\t.\tA\tC\t.\tPASS\t.\n";
        let result: anyhow::Result<Vec<VcfSite>> = VcfSiteReader::new(Cursor::new(no_header), &columns, "PASS").collect();
        assert!(result.is_err());
    }

    #[test]
    fn test_open_vcf_file() {
        assert!(open_vcf_file(&PathBuf::from("test_data/minimal/minimal.vcf")).is_ok());
        assert!(open_vcf_file(&PathBuf::from("test_data/minimal/minimal.vcf.gz")).is_err());
    }
}
