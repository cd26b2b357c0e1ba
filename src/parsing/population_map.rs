
use anyhow::{anyhow, bail, Context};
use indexmap::IndexMap;
use std::collections::BTreeMap;
use std::path::Path;

/// Column holding the individual identifier
const INDIVIDUAL_COLUMN: &str = "individual";
/// Column holding the population label
const POPULATION_COLUMN: &str = "population";

/// Everything we know about one individual from the population map
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct IndividualInfo {
    /// Population or other grouping label
    population: String,
    /// Any extra columns in the sheet, keyed by header name
    attributes: BTreeMap<String, String>
}

impl IndividualInfo {
    pub fn population(&self) -> &str {
        &self.population
    }

    pub fn attributes(&self) -> &BTreeMap<String, String> {
        &self.attributes
    }
}

/// Mapping from individual identifiers (as they appear in the VCF) to population information.
/// Insertion order matches the row order of the sheet.
#[derive(Clone, Debug, Default)]
pub struct PopulationMap {
    individuals: IndexMap<String, IndividualInfo>
}

impl PopulationMap {
    /// Loads a CSV sample sheet with a header row.
    /// The `individual` and `population` columns are required, others are kept as attributes.
    /// # Arguments
    /// * `filename` - path to the sample sheet
    /// # Errors
    /// * if the file cannot be opened or parsed
    /// * if a required column is missing or an individual is listed twice
    pub fn from_csv(filename: &Path) -> anyhow::Result<Self> {
        let csv_reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .trim(csv::Trim::All)
            .from_path(filename)
            .with_context(|| format!("Error while opening {filename:?}:"))?;
        Self::from_csv_reader(csv_reader)
            .with_context(|| format!("Error while parsing {filename:?}:"))
    }

    /// Parses the population map from an already constructed CSV reader
    pub fn from_csv_reader<R: std::io::Read>(mut csv_reader: csv::Reader<R>) -> anyhow::Result<Self> {
        let headers = csv_reader.headers()?.clone();
        let find_column = |label: &str| -> anyhow::Result<usize> {
            headers.iter().position(|h| h == label)
                .ok_or(anyhow!("Missing required column \"{label}\" in header: {headers:?}"))
        };
        let ind_col = find_column(INDIVIDUAL_COLUMN)?;
        let pop_col = find_column(POPULATION_COLUMN)?;

        let mut individuals: IndexMap<String, IndividualInfo> = Default::default();
        for result in csv_reader.records() {
            let row = result?;
            let individual = row.get(ind_col)
                .ok_or(anyhow!("Missing individual on row: {row:?}"))?;
            let population = row.get(pop_col)
                .ok_or(anyhow!("Missing population on row: {row:?}"))?;
            if individual.is_empty() {
                bail!("Empty individual identifier on row: {row:?}");
            }
            if individuals.contains_key(individual) {
                bail!("Duplicate individual found: {individual}");
            }

            let attributes = headers.iter().zip(row.iter())
                .enumerate()
                .filter(|(i, _hv)| *i != ind_col && *i != pop_col)
                .map(|(_i, (h, v))| (h.to_string(), v.to_string()))
                .collect();

            individuals.insert(individual.to_string(), IndividualInfo {
                population: population.to_string(),
                attributes
            });
        }

        Ok(Self {
            individuals
        })
    }

    /// Returns true if the individual is in the map
    pub fn contains(&self, individual: &str) -> bool {
        self.individuals.contains_key(individual)
    }

    /// Returns the population label for an individual
    pub fn population(&self, individual: &str) -> Option<&str> {
        self.individuals.get(individual).map(|info| info.population())
    }

    /// Full lookup for an individual
    pub fn get(&self, individual: &str) -> Option<&IndividualInfo> {
        self.individuals.get(individual)
    }

    /// Groups individuals by population; both levels preserve sheet order
    pub fn populations(&self) -> IndexMap<String, Vec<String>> {
        let mut populations: IndexMap<String, Vec<String>> = Default::default();
        for (individual, info) in self.individuals.iter() {
            populations.entry(info.population.clone())
                .or_default()
                .push(individual.clone());
        }
        populations
    }

    /// Iterates over the individual identifiers in sheet order
    pub fn individuals(&self) -> impl Iterator<Item = &str> {
        self.individuals.keys().map(|k| k.as_str())
    }

    pub fn len(&self) -> usize {
        self.individuals.len()
    }

    pub fn is_empty(&self) -> bool {
        self.individuals.is_empty()
    }
}
