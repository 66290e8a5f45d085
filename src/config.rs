use serde::Deserialize;

/// The geometry of a simulated cache
///
/// All three values are byte/line counts fixed for the lifetime of a run and
/// are usually parsed from a small JSON file:
///
/// ```json
/// { "line_size": 64, "cache_size": 32768, "associativity": 8 }
/// ```
#[derive(Debug, Clone, Deserialize)]
pub struct CacheConfig {
    /// Bytes per cache line
    pub line_size: u64,
    /// Total bytes the cache can hold
    pub cache_size: u64,
    /// Lines per set
    pub associativity: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            line_size: 64,
            cache_size: 32768,
            associativity: 8,
        }
    }
}

impl CacheConfig {
    /// Checks the power-of-two and ordering constraints on the geometry
    ///
    /// Set selection relies on every derived quantity being a power of two,
    /// so this must pass before a cache is built. Checked once at startup,
    /// never on the access path
    ///
    /// returns: Result<(), String>
    pub fn validate(&self) -> Result<(), String> {
        if !self.line_size.is_power_of_two() {
            return Err(format!("Line size must be a power of two, got {}", self.line_size));
        }
        if !self.cache_size.is_power_of_two() {
            return Err(format!("Cache size must be a power of two, got {}", self.cache_size));
        }
        if !self.associativity.is_power_of_two() {
            return Err(format!("Associativity must be a non-zero power of two, got {}", self.associativity));
        }
        if self.cache_size < self.associativity {
            return Err(format!(
                "Cache size ({}) must be at least the associativity ({})",
                self.cache_size, self.associativity
            ));
        }
        if self.cache_size < self.line_size * self.associativity {
            return Err(format!(
                "Cache size ({}) must hold at least one full set ({} bytes)",
                self.cache_size,
                self.line_size * self.associativity
            ));
        }
        Ok(())
    }

    /// The number of sets this geometry derives. At least 1 once validated
    pub fn num_sets(&self) -> u64 {
        self.cache_size / (self.line_size * self.associativity)
    }

    /// The number of low address bits covered by one line
    pub fn line_bits(&self) -> u32 {
        self.line_size.trailing_zeros()
    }
}
