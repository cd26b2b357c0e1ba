
use indexmap::IndexMap;

#[derive(thiserror::Error, Debug, PartialEq, Eq)]
pub enum PositionError {
    #[error("more than {} distinct chromosomes were found", u16::MAX as usize + 1)]
    TooManyChromosomes,
    #[error("position {position} on {chrom} does not fit in 32 bits")]
    PositionOverflow { chrom: String, position: u64 }
}

/// Maps chromosome labels to small integer ids, assigned in first-seen order.
/// This is a context object for a single scan, it is not shared between scans.
#[derive(Clone, Debug, Default)]
pub struct ChromosomeDictionary {
    lookup: IndexMap<String, u16>
}

impl ChromosomeDictionary {
    /// Returns the id for `chrom`, creating the next id if this is the first time we see it
    /// # Errors
    /// * if we run out of u16 ids
    pub fn intern(&mut self, chrom: &str) -> Result<u16, PositionError> {
        if let Some(&chrom_id) = self.lookup.get(chrom) {
            return Ok(chrom_id);
        }
        let chrom_id = u16::try_from(self.lookup.len())
            .map_err(|_e| PositionError::TooManyChromosomes)?;
        self.lookup.insert(chrom.to_string(), chrom_id);
        Ok(chrom_id)
    }

    /// Reverse lookup from id to label
    pub fn label(&self, chrom_id: u16) -> Option<&str> {
        self.lookup.get_index(chrom_id as usize).map(|(k, _v)| k.as_str())
    }

    pub fn len(&self) -> usize {
        self.lookup.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lookup.is_empty()
    }
}

/// Compact per-site coordinates; index matches the site axis of the tensor
#[derive(Clone, Debug, Default)]
pub struct SitePositions {
    /// Dictionary that produced the chromosome ids
    chromosomes: ChromosomeDictionary,
    /// Chromosome id for each site
    chrom_ids: Vec<u16>,
    /// 1-based position for each site
    positions: Vec<u32>
}

impl SitePositions {
    /// Pre-allocates space for `n_sites` coordinates
    pub fn with_capacity(n_sites: usize) -> Self {
        Self {
            chromosomes: Default::default(),
            chrom_ids: Vec::with_capacity(n_sites),
            positions: Vec::with_capacity(n_sites)
        }
    }

    /// Appends the coordinate of the next site
    /// # Errors
    /// * if the chromosome dictionary is full or the position overflows
    pub fn push(&mut self, chrom: &str, position: u64) -> Result<(), PositionError> {
        let position32 = u32::try_from(position)
            .map_err(|_e| PositionError::PositionOverflow { chrom: chrom.to_string(), position })?;
        let chrom_id = self.chromosomes.intern(chrom)?;
        self.chrom_ids.push(chrom_id);
        self.positions.push(position32);
        Ok(())
    }

    /// Returns the (chromosome label, position) of a site
    pub fn get(&self, site: usize) -> Option<(&str, u32)> {
        let chrom_id = *self.chrom_ids.get(site)?;
        let position = *self.positions.get(site)?;
        Some((self.chromosomes.label(chrom_id)?, position))
    }

    // getters
    pub fn chromosomes(&self) -> &ChromosomeDictionary {
        &self.chromosomes
    }

    pub fn chrom_ids(&self) -> &[u16] {
        &self.chrom_ids
    }

    pub fn positions(&self) -> &[u32] {
        &self.positions
    }

    pub fn len(&self) -> usize {
        self.positions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_seen_order() {
        let mut dictionary = ChromosomeDictionary::default();
        assert_eq!(dictionary.intern("chr2").unwrap(), 0);
        assert_eq!(dictionary.intern("chr1").unwrap(), 1);
        assert_eq!(dictionary.intern("chr2").unwrap(), 0);
        assert_eq!(dictionary.intern("scaffold_9").unwrap(), 2);
        assert_eq!(dictionary.len(), 3);
        assert_eq!(dictionary.label(1), Some("chr1"));
        assert_eq!(dictionary.label(3), None);
    }

    #[test]
    fn test_site_positions() {
        let mut positions = SitePositions::with_capacity(3);
        positions.push("chr1", 100).unwrap();
        positions.push("chr1", 250).unwrap();
        positions.push("chr5", 7).unwrap();
        assert_eq!(positions.chrom_ids(), &[0, 0, 1]);
        assert_eq!(positions.get(2), Some(("chr5", 7)));
        assert_eq!(positions.get(3), None);

        let err = positions.push("chr5", u32::MAX as u64 + 1).unwrap_err();
        assert_eq!(err, PositionError::PositionOverflow { chrom: "chr5".to_string(), position: u32::MAX as u64 + 1 });
        assert_eq!(positions.len(), 3);
    }
}
