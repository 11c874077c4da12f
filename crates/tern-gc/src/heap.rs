//! GC heap configuration

/// GC configuration
#[derive(Debug, Clone)]
pub struct GcConfig {
    /// Number of slots reserved up front (default: 256)
    pub initial_capacity: usize,
    /// Maximum number of live objects before allocation fails (default: 1M)
    pub max_objects: usize,
}

impl Default for GcConfig {
    fn default() -> Self {
        Self {
            initial_capacity: 256,
            max_objects: 1024 * 1024,
        }
    }
}

impl GcConfig {
    /// Create a config with defaults
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the number of slots reserved up front
    pub fn initial_capacity(mut self, capacity: usize) -> Self {
        self.initial_capacity = capacity;
        self
    }

    /// Set the live object limit
    pub fn max_objects(mut self, limit: usize) -> Self {
        self.max_objects = limit;
        self
    }
}
