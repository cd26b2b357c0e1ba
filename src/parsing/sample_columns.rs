
use serde::Serialize;

use crate::parsing::population_map::PopulationMap;

/// Token that identifies the sample header line
pub const HEADER_MARKER: &str = "#CHROM";
/// Number of fixed VCF columns before the first sample column
pub const NUM_FIXED_COLUMNS: usize = 9;

/// How to turn a path-style sample identifier into an individual identifier
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub enum IdentifierMode {
    /// `path/to/ind_a` -> `ind_a`
    #[default]
    LastSegment,
    /// `path/to/ind_a/sample.bam` -> `ind_a`, for pipelines that name samples by their alignment path
    SecondToLastSegment
}

impl IdentifierMode {
    /// Reduces a raw header identifier to the individual identifier
    pub fn resolve<'a>(&self, raw: &'a str) -> &'a str {
        if !raw.contains('/') {
            return raw;
        }
        let mut segments = raw.rsplit('/');
        let last = segments.next().unwrap_or(raw);
        match self {
            IdentifierMode::LastSegment => last,
            IdentifierMode::SecondToLastSegment => segments.next().unwrap_or(last)
        }
    }
}

/// A VCF column that belongs to a mapped individual
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SampleColumn {
    /// 0-based column in the tab-delimited line
    column: usize,
    /// Resolved individual identifier
    individual: String
}

impl SampleColumn {
    pub fn column(&self) -> usize {
        self.column
    }

    pub fn individual(&self) -> &str {
        &self.individual
    }
}

/// Ordered table from VCF columns to individuals, built once from the header line.
/// The position of an entry in this table is the individual index used by the tensor.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SampleColumns {
    /// Mapped individuals in header order
    mapped: Vec<SampleColumn>,
    /// Every resolved identifier in the header, mapped or not
    header_identifiers: Vec<String>
}

impl SampleColumns {
    /// Returns true if the line is the sample header line
    pub fn is_header_line(line: &str) -> bool {
        line.starts_with(HEADER_MARKER)
    }

    /// Builds the table from the header line, keeping only individuals present in the population map
    /// # Arguments
    /// * `line` - the `#CHROM` header line
    /// * `id_mode` - how to reduce path-style identifiers
    /// * `population_map` - individuals of interest
    pub fn from_header_line(line: &str, id_mode: IdentifierMode, population_map: &PopulationMap) -> Self {
        let mut mapped = vec![];
        let mut header_identifiers = vec![];
        for (column, raw) in line.split_whitespace().enumerate().skip(NUM_FIXED_COLUMNS) {
            let individual = id_mode.resolve(raw);
            if population_map.contains(individual) {
                mapped.push(SampleColumn {
                    column,
                    individual: individual.to_string()
                });
            }
            header_identifiers.push(individual.to_string());
        }

        Self {
            mapped, header_identifiers
        }
    }

    /// Returns every population map individual that is not in the header
    pub fn missing_individuals<'a>(&self, population_map: &'a PopulationMap) -> Vec<&'a str> {
        population_map.individuals()
            .filter(|ind| !self.header_identifiers.iter().any(|h| h == ind))
            .collect()
    }

    /// Identifier for an individual index
    pub fn individual(&self, index: usize) -> Option<&str> {
        self.mapped.get(index).map(|sc| sc.individual())
    }

    /// All mapped columns in individual-index order
    pub fn mapped(&self) -> &[SampleColumn] {
        &self.mapped
    }

    /// Identifiers of all mapped individuals in index order
    pub fn individuals(&self) -> Vec<String> {
        self.mapped.iter().map(|sc| sc.individual.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.mapped.len()
    }

    pub fn is_empty(&self) -> bool {
        self.mapped.is_empty()
    }
}
