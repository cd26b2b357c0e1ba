
use derive_builder::Builder;
use serde::Serialize;

/// Outcome of parsing one sample column
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum FieldStatus {
    /// All required subfields were found and the allele counts parsed
    #[default]
    Parsed,
    /// Fewer than the required number of colon-delimited subfields, typically a missing call like `./.`
    TooFewSubfields,
    /// The allele count subfield did not look like `ref,alt`
    MalformedCounts
}

/// Everything we pull out of a single sample's genotype string, e.g. `0/1:10,5:.:30:.`
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct GenotypeRecord {
    /// Reads supporting the reference allele
    ref_count: u32,
    /// Reads supporting the alternate allele
    alt_count: u32,
    /// Number of non-reference allele indices in the diploid call; None if the call was unparseable
    alt_alleles: Option<u8>,
    /// Genotype quality score
    quality: u32,
    /// Parse status, anything other than Parsed carries zero counts and quality
    status: FieldStatus
}

impl GenotypeRecord {
    /// Constructor for a successfully parsed record
    pub fn new(ref_count: u32, alt_count: u32, alt_alleles: Option<u8>, quality: u32) -> Self {
        Self {
            ref_count, alt_count, alt_alleles, quality,
            status: FieldStatus::Parsed
        }
    }

    /// Constructor for a record that could not be parsed; counts and quality are zero.
    /// The genotype call may still be available since it is parsed independently.
    pub fn degraded(status: FieldStatus, alt_alleles: Option<u8>) -> Self {
        Self {
            alt_alleles,
            status,
            ..Default::default()
        }
    }

    /// Total depth across both alleles
    pub fn depth(&self) -> u32 {
        self.ref_count.saturating_add(self.alt_count)
    }

    /// Fraction of reads supporting the alternate allele, 0.0 when there are no reads
    pub fn allele_balance(&self) -> f64 {
        let depth = self.depth();
        if depth > 0 {
            self.alt_count as f64 / depth as f64
        } else {
            0.0
        }
    }

    /// Returns true if this record meets all of the thresholds in `filters`
    pub fn passes(&self, filters: &FilterConfig) -> bool {
        self.status == FieldStatus::Parsed &&
            self.depth() >= filters.min_depth &&
            self.ref_count >= 1 &&
            self.alt_count >= filters.min_count &&
            self.quality >= filters.min_quality
    }

    // getters
    pub fn ref_count(&self) -> u32 {
        self.ref_count
    }

    pub fn alt_count(&self) -> u32 {
        self.alt_count
    }

    pub fn alt_alleles(&self) -> Option<u8> {
        self.alt_alleles
    }

    pub fn quality(&self) -> u32 {
        self.quality
    }

    pub fn status(&self) -> FieldStatus {
        self.status
    }
}

/// Thresholds for a genotype call to be considered high-quality
#[derive(Builder, Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[builder(default)]
pub struct FilterConfig {
    /// Minimum total read depth
    pub min_depth: u32,
    /// Minimum number of reads supporting the alternate allele
    pub min_count: u32,
    /// Minimum genotype quality
    pub min_quality: u32
}

impl Default for FilterConfig {
    fn default() -> Self {
        Self {
            min_depth: 10,
            min_count: 3,
            min_quality: 20
        }
    }
}
