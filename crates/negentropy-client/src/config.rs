//! Tunables for the session layer. The core engine itself is stateless
//! with respect to configuration; everything here governs how the session
//! wraps it.

use std::time::Duration;

/// Configuration for a sync session.
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Soft cap on a single reconciliation message, in bytes. A relay
    /// replying over this limit has its `NEG-MSG` treated as `RESULTS_TOO_BIG`.
    pub frame_size_limit: usize,
    /// How long to wait for the relay's next `NEG-MSG` before giving up.
    pub reconcile_timeout: Duration,
    /// How long to wait for the event-store consumer to publish fetched
    /// events before giving up.
    pub publish_timeout: Duration,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            frame_size_limit: 60_000,
            reconcile_timeout: Duration::from_secs(30),
            publish_timeout: Duration::from_secs(10),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_the_documented_values() {
        let config = SyncConfig::default();
        assert_eq!(config.frame_size_limit, 60_000);
        assert_eq!(config.reconcile_timeout, Duration::from_secs(30));
        assert_eq!(config.publish_timeout, Duration::from_secs(10));
    }

    #[test]
    fn fields_override_independently_of_the_rest_of_the_defaults() {
        let config = SyncConfig {
            frame_size_limit: 1024,
            reconcile_timeout: Duration::from_secs(5),
            ..SyncConfig::default()
        };
        assert_eq!(config.frame_size_limit, 1024);
        assert_eq!(config.reconcile_timeout, Duration::from_secs(5));
        assert_eq!(config.publish_timeout, Duration::from_secs(10));
    }
}
