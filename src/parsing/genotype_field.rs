
use lazy_static::lazy_static;
use regex::Regex;

use crate::data_types::genotype_record::{FieldStatus, GenotypeRecord};

/// Minimum number of colon-delimited subfields for a usable biallelic call
pub const MIN_SUBFIELDS: usize = 5;

// subfield indices within the sample column
const GT_INDEX: usize = 0;
const AD_INDEX: usize = 1;
const GQ_INDEX: usize = 3;

lazy_static! {
    /// `ref,alt` allele depths; anything after the second count is ignored
    static ref COUNTS_REGEX: Regex = Regex::new(r"^(\d+),(\d+)").unwrap();
    /// Diploid call with either separator, e.g. `0/1` or `1|1`
    static ref GENOTYPE_REGEX: Regex = Regex::new(r"^(\d+)[/|](\d+)").unwrap();
    /// Leading integer of the quality subfield
    static ref QUALITY_REGEX: Regex = Regex::new(r"^(\d+)").unwrap();
}

/// Parses one sample column like `0/1:10,5:.:30:.`.
/// This never fails; malformed subfields degrade to zero counts with a non-Parsed status so the caller can report it.
pub fn parse_genotype_field(field: &str) -> GenotypeRecord {
    let subfields: Vec<&str> = field.split(':').collect();
    if subfields.len() < MIN_SUBFIELDS {
        return GenotypeRecord::degraded(FieldStatus::TooFewSubfields, None);
    }

    let alt_alleles = parse_alt_alleles(subfields[GT_INDEX]);
    let Some((ref_count, alt_count)) = parse_counts(subfields[AD_INDEX]) else {
        return GenotypeRecord::degraded(FieldStatus::MalformedCounts, alt_alleles);
    };
    let quality = parse_leading_integer(subfields[GQ_INDEX]).unwrap_or(0);

    GenotypeRecord::new(ref_count, alt_count, alt_alleles, quality)
}

/// Parses `ref,alt` from the allele depth subfield
fn parse_counts(subfield: &str) -> Option<(u32, u32)> {
    let captures = COUNTS_REGEX.captures(subfield)?;
    let ref_count = captures[1].parse().ok()?;
    let alt_count = captures[2].parse().ok()?;
    Some((ref_count, alt_count))
}

/// Counts the non-reference allele indices in a diploid call
fn parse_alt_alleles(subfield: &str) -> Option<u8> {
    let captures = GENOTYPE_REGEX.captures(subfield)?;
    let mut alt_alleles = 0;
    for allele in [&captures[1], &captures[2]] {
        let allele_index: u32 = allele.parse().ok()?;
        if allele_index > 0 {
            alt_alleles += 1;
        }
    }
    Some(alt_alleles)
}

/// Returns the leading integer of a subfield, or None if it does not start with a digit
fn parse_leading_integer(subfield: &str) -> Option<u32> {
    let captures = QUALITY_REGEX.captures(subfield)?;
    // saturate absurdly long digit runs rather than drop them
    Some(captures[1].parse().unwrap_or(u32::MAX))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_well_formed() {
        let record = parse_genotype_field("0/1:10,5:.:30:.");
        assert_eq!(record.status(), FieldStatus::Parsed);
        assert_eq!(record.ref_count(), 10);
        assert_eq!(record.alt_count(), 5);
        assert_eq!(record.depth(), 15);
        assert_eq!(record.quality(), 30);
        assert_eq!(record.alt_alleles(), Some(1));

        let record = parse_genotype_field("1|1:0,22,4:22:66:0,66,900");
        assert_eq!(record.status(), FieldStatus::Parsed);
        assert_eq!((record.ref_count(), record.alt_count()), (0, 22));
        assert_eq!(record.alt_alleles(), Some(2));
        assert_eq!(record.quality(), 66);
    }

    #[test]
    fn test_partial_fields() {
        // missing quality is zero, not an error
        let record = parse_genotype_field("0/0:12,0:12:.:0,36,400");
        assert_eq!(record.status(), FieldStatus::Parsed);
        assert_eq!(record.quality(), 0);
        assert_eq!(record.alt_alleles(), Some(0));

        // missing call but good counts
        let record = parse_genotype_field("./.:7,3:10:25:.");
        assert_eq!(record.status(), FieldStatus::Parsed);
        assert_eq!(record.alt_alleles(), None);
        assert_eq!(record.depth(), 10);
    }

    #[test]
    fn test_degraded_fields() {
        let record = parse_genotype_field("./.");
        assert_eq!(record.status(), FieldStatus::TooFewSubfields);
        assert_eq!(record.depth(), 0);

        let record = parse_genotype_field("0/1:.:.:30:.");
        assert_eq!(record.status(), FieldStatus::MalformedCounts);
        assert_eq!(record.depth(), 0);
        assert_eq!(record.quality(), 0);
        assert_eq!(record.alt_alleles(), Some(1));
    }
}
