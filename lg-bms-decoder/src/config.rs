use embassy_time::Duration;

/// Pack topology and freshness settings supplied by the configuration store
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct PackConfig {
    /// Number of module strings wired in parallel, 0 leaves the pack voltage undefined
    pub parallel_strings: u16,
    /// Maximum age of the last frame before a module counts as absent
    pub stale_window: Duration,
}

impl PackConfig {
    pub const DEFAULT_STALE_WINDOW: Duration = Duration::from_secs(5);
}

impl Default for PackConfig {
    fn default() -> Self {
        Self {
            parallel_strings: 1,
            stale_window: Self::DEFAULT_STALE_WINDOW,
        }
    }
}
