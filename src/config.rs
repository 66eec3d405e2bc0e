//! Configuration for the tablet balancer.

/// Default number of tablets visited between cooperative yields while
/// traversing a tablet map.
pub const DEFAULT_YIELD_CHUNK: usize = 1024;

/// Configuration for a planning round.
#[derive(Debug, Clone)]
pub struct BalancerConfig {
    /// Number of tablets visited between cooperative yields during
    /// tablet-map traversal. Large maps are walked in chunks of this size
    /// so planning never monopolizes the executor.
    pub yield_chunk: usize,

    /// Emit a per-node load summary before greedy fill starts.
    pub log_node_loads: bool,
}

impl Default for BalancerConfig {
    fn default() -> Self {
        Self {
            yield_chunk: DEFAULT_YIELD_CHUNK,
            log_node_loads: true,
        }
    }
}

impl BalancerConfig {
    /// Create a configuration with default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the tablet-traversal chunk size between cooperative yields.
    ///
    /// A chunk size of zero disables yielding during traversal.
    pub fn with_yield_chunk(mut self, yield_chunk: usize) -> Self {
        self.yield_chunk = yield_chunk;
        self
    }

    /// Enable or disable the per-node load summary.
    pub fn with_node_load_logging(mut self, enabled: bool) -> Self {
        self.log_node_loads = enabled;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder() {
        let config = BalancerConfig::new()
            .with_yield_chunk(16)
            .with_node_load_logging(false);
        assert_eq!(config.yield_chunk, 16);
        assert!(!config.log_node_loads);
    }

    #[test]
    fn test_defaults() {
        let config = BalancerConfig::default();
        assert_eq!(config.yield_chunk, DEFAULT_YIELD_CHUNK);
        assert!(config.log_node_loads);
    }
}
