
use ndarray::{Array2, ArrayView1};
use serde::Serialize;
use strum_macros::EnumString;

use crate::data_types::site_positions::{PositionError, SitePositions};

/// Number of layers stored per (site, individual)
pub const NUM_LAYERS: usize = 4;

/// Controls what gets stored in the value layer
#[derive(Clone, Copy, Default, Debug, PartialEq, Eq, strum_macros::Display, EnumString, Serialize, clap::ValueEnum)]
pub enum ExtractionMode {
    /// Fraction of reads supporting the alternate allele
    #[default]
    #[strum(ascii_case_insensitive, serialize = "allele-balance")]
    #[clap(name = "allele-balance")]
    AlleleBalance,
    /// Number of alternate alleles in the diploid call (0, 1, 2)
    #[strum(ascii_case_insensitive, serialize = "genotype")]
    #[clap(name = "genotype")]
    Genotype
}

#[derive(thiserror::Error, Debug, PartialEq, Eq)]
pub enum TensorError {
    #[error("attempted to write site #{site} but only {capacity} sites were allocated")]
    SiteOverflow { site: usize, capacity: usize },
    #[error("individual index {index} is out of range for {capacity} individuals")]
    IndividualOutOfRange { index: usize, capacity: usize },
    #[error("pre-scan found {expected} sites but {found} were written")]
    SiteCountMismatch { expected: usize, found: usize },
    #[error("error while recording site position: {0}")]
    Position(#[from] PositionError)
}

/// Dense per-site, per-individual layers extracted from a VCF.
/// All layers share the same (site, individual) indexing and are sized once at allocation.
#[derive(Clone, Debug)]
pub struct VariantTensor {
    /// What the value layer represents
    mode: ExtractionMode,
    /// Layer 0: allele balance or alternate allele count
    values: Array2<f32>,
    /// Layer 1: total read depth, saturating at u16::MAX
    depth: Array2<u16>,
    /// Layer 2: genotype quality, saturating at u8::MAX
    quality: Array2<u8>,
    /// Layer 3: pass-filter flag
    pass_filter: Array2<bool>,
    /// Number of rows written for each individual
    site_counts: Vec<usize>,
    /// Number of sites handed out so far
    sites_used: usize,
    /// Optional chromosome and position of each site
    positions: Option<SitePositions>
}

impl VariantTensor {
    /// Allocates all layers for a fixed number of sites and individuals
    /// # Arguments
    /// * `n_sites` - number of pass-filter lines from the pre-scan
    /// * `n_individuals` - number of mapped individuals from the pre-scan
    /// * `mode` - what the value layer will contain
    /// * `track_positions` - if true, also stores the chromosome and position of each site
    pub fn new(n_sites: usize, n_individuals: usize, mode: ExtractionMode, track_positions: bool) -> Self {
        let shape = (n_sites, n_individuals);
        Self {
            mode,
            values: Array2::zeros(shape),
            depth: Array2::zeros(shape),
            quality: Array2::zeros(shape),
            pass_filter: Array2::from_elem(shape, false),
            site_counts: vec![0; n_individuals],
            sites_used: 0,
            positions: track_positions.then(|| SitePositions::with_capacity(n_sites))
        }
    }

    /// Claims the next site row and returns its index.
    /// # Arguments
    /// * `chrom` - chromosome label, only stored when tracking positions
    /// * `position` - 1-based position, only stored when tracking positions
    /// # Errors
    /// * if all pre-allocated sites are already used
    pub fn next_site(&mut self, chrom: &str, position: u64) -> Result<usize, TensorError> {
        let capacity = self.n_sites();
        if self.sites_used >= capacity {
            return Err(TensorError::SiteOverflow { site: self.sites_used, capacity });
        }
        if let Some(positions) = self.positions.as_mut() {
            positions.push(chrom, position)?;
        }
        let site = self.sites_used;
        self.sites_used += 1;
        Ok(site)
    }

    /// Writes all four layers for one (site, individual) and bumps that individual's row counter.
    /// Depth and quality saturate at the layer type maximum.
    /// # Errors
    /// * if `site` was never claimed or `individual` is out of range
    pub fn write_call(&mut self, site: usize, individual: usize, value: f32, depth: u32, quality: u32, passes: bool) -> Result<(), TensorError> {
        if site >= self.sites_used {
            return Err(TensorError::SiteOverflow { site, capacity: self.sites_used });
        }
        let capacity = self.n_individuals();
        if individual >= capacity {
            return Err(TensorError::IndividualOutOfRange { index: individual, capacity });
        }

        let index = (site, individual);
        self.values[index] = value;
        self.depth[index] = u16::try_from(depth).unwrap_or(u16::MAX);
        self.quality[index] = u8::try_from(quality).unwrap_or(u8::MAX);
        self.pass_filter[index] = passes;
        self.site_counts[individual] += 1;
        Ok(())
    }

    /// Confirms that exactly the pre-scanned number of sites were written
    pub fn finalize(&self) -> Result<(), TensorError> {
        if self.sites_used != self.n_sites() {
            return Err(TensorError::SiteCountMismatch { expected: self.n_sites(), found: self.sites_used });
        }
        Ok(())
    }

    /// Returns a read-only view of all layers for one individual, truncated to the rows written for them
    pub fn individual(&self, individual: usize) -> Option<IndividualLayers<'_>> {
        let site_count = *self.site_counts.get(individual)?;
        let rows = ndarray::s![..site_count, individual];
        Some(IndividualLayers {
            values: self.values.slice(rows),
            depth: self.depth.slice(rows),
            quality: self.quality.slice(rows),
            pass_filter: self.pass_filter.slice(rows)
        })
    }

    /// Shape as (layers, sites, individuals)
    pub fn shape(&self) -> (usize, usize, usize) {
        (NUM_LAYERS, self.n_sites(), self.n_individuals())
    }

    /// Approximate bytes held by the four layers
    pub fn nbytes(&self) -> usize {
        let cells = self.n_sites() * self.n_individuals();
        cells * (
            std::mem::size_of::<f32>() + std::mem::size_of::<u16>() +
            std::mem::size_of::<u8>() + std::mem::size_of::<bool>()
        )
    }

    // getters
    pub fn mode(&self) -> ExtractionMode {
        self.mode
    }

    pub fn n_sites(&self) -> usize {
        self.values.nrows()
    }

    pub fn n_individuals(&self) -> usize {
        self.values.ncols()
    }

    pub fn sites_used(&self) -> usize {
        self.sites_used
    }

    pub fn site_counts(&self) -> &[usize] {
        &self.site_counts
    }

    pub fn positions(&self) -> Option<&SitePositions> {
        self.positions.as_ref()
    }
}

/// Column views of the tensor for a single individual
#[derive(Clone, Debug)]
pub struct IndividualLayers<'a> {
    pub values: ArrayView1<'a, f32>,
    pub depth: ArrayView1<'a, u16>,
    pub quality: ArrayView1<'a, u8>,
    pub pass_filter: ArrayView1<'a, bool>
}

impl IndividualLayers<'_> {
    /// Number of rows in this individual's view
    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Returns (value, depth) for every row with the pass-filter flag set, in site order
    pub fn passing(&self) -> Vec<(f64, f64)> {
        self.values.iter()
            .zip(self.depth.iter())
            .zip(self.pass_filter.iter())
            .filter(|(_vd, passes)| **passes)
            .map(|((&v, &d), _p)| (v as f64, d as f64))
            .collect()
    }
}
