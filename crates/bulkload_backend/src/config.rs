//! Configuration for the delivery-target facade.

/// Default number of attempts for retried operations.
///
/// Remote importers already retry internally, so this stays small.
pub const DEFAULT_MAX_RETRY_TIMES: u32 = 3;

/// Configuration for a [`Backend`](crate::Backend).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackendConfig {
    max_retry_times: u32,
    /// Abort the process when more engines than this are open at once.
    pub engine_count_limit: Option<i64>,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            max_retry_times: DEFAULT_MAX_RETRY_TIMES,
            engine_count_limit: None,
        }
    }
}

impl BackendConfig {
    /// Creates a configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Attempts per chunk write and per import before giving up. Never zero.
    pub const fn max_retry_times(&self) -> u32 {
        self.max_retry_times
    }

    /// Sets the number of attempts. Values below one are raised to one.
    #[must_use]
    pub const fn with_max_retry_times(mut self, attempts: u32) -> Self {
        self.max_retry_times = if attempts == 0 { 1 } else { attempts };
        self
    }

    /// Installs an engine-count ceiling.
    #[must_use]
    pub const fn with_engine_count_limit(mut self, limit: i64) -> Self {
        self.engine_count_limit = Some(limit);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = BackendConfig::default();
        assert_eq!(config.max_retry_times(), 3);
        assert_eq!(config.engine_count_limit, None);
    }

    #[test]
    fn builder() {
        let config = BackendConfig::new()
            .with_max_retry_times(5)
            .with_engine_count_limit(16);
        assert_eq!(config.max_retry_times(), 5);
        assert_eq!(config.engine_count_limit, Some(16));
    }

    #[test]
    fn zero_attempts_means_one() {
        assert_eq!(BackendConfig::new().with_max_retry_times(0).max_retry_times(), 1);
    }
}
