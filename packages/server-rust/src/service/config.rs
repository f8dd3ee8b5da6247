/// Server-level configuration for the dispatch framework.
///
/// Controls concurrency limits of the dispatch pipeline.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Identifier for this worker, reported by the health endpoint and logs.
    pub node_id: String,
    /// Maximum number of concurrent calls before load shedding.
    pub max_concurrent_calls: u32,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            node_id: String::new(),
            max_concurrent_calls: 1000,
        }
    }
}
