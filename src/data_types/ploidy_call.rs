
/// Final result for one individual
#[derive(Clone, Debug, PartialEq)]
pub struct PloidyCall {
    /// Individual identifier from the VCF header
    individual: String,
    /// Population from the population map
    population: String,
    /// Number of pass-filter sites inside the allele-balance band
    n_sites: usize,
    /// Estimated ploidy, None if the individual was skipped
    ploidy: Option<u8>,
    /// p-value of the site-class effect, None when no test was performed
    p_value: Option<f64>
}

impl PloidyCall {
    /// Constructor
    pub fn new(individual: String, population: String, n_sites: usize, ploidy: Option<u8>, p_value: Option<f64>) -> Self {
        Self {
            individual, population, n_sites, ploidy, p_value
        }
    }

    /// Shortcut for an individual that was not fit
    pub fn skipped(individual: String, population: String, n_sites: usize) -> Self {
        Self::new(individual, population, n_sites, None, None)
    }

    // getters
    pub fn individual(&self) -> &str {
        &self.individual
    }

    pub fn population(&self) -> &str {
        &self.population
    }

    pub fn n_sites(&self) -> usize {
        self.n_sites
    }

    pub fn ploidy(&self) -> Option<u8> {
        self.ploidy
    }

    pub fn p_value(&self) -> Option<f64> {
        self.p_value
    }
}

/// Collection of ploidy calls, ordered the same as the individuals in the tensor
#[derive(Clone, Debug, Default, PartialEq)]
pub struct PloidyTable {
    calls: Vec<PloidyCall>
}

impl PloidyTable {
    /// Constructor
    pub fn new(calls: Vec<PloidyCall>) -> Self {
        Self { calls }
    }

    /// Looks up a call by individual identifier
    pub fn get(&self, individual: &str) -> Option<&PloidyCall> {
        self.calls.iter().find(|c| c.individual == individual)
    }

    /// Number of individuals that received a ploidy estimate
    pub fn num_called(&self) -> usize {
        self.calls.iter().filter(|c| c.ploidy.is_some()).count()
    }

    pub fn calls(&self) -> &[PloidyCall] {
        &self.calls
    }

    pub fn len(&self) -> usize {
        self.calls.len()
    }

    pub fn is_empty(&self) -> bool {
        self.calls.is_empty()
    }
}
