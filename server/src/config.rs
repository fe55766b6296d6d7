//! Server-side tracking policy configuration.
//!
//! The server is the sole source of the update interval and movement
//! threshold; clients receive both with every `StartTracking` relay and
//! never choose their own. Values below the floor are corrected with a
//! warning rather than rejected.

use log::warn;
use thiserror::Error;

/// Floor for the client evaluation interval.
pub const MIN_UPDATE_INTERVAL_MS: u64 = 500;

/// Floor for the movement threshold, in (unsquared) distance units.
pub const MIN_MOVEMENT_THRESHOLD: u32 = 1;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing port number in {0:?}")]
    MissingPort(String),
    #[error("missing ']' in {0:?}")]
    UnterminatedIpv6(String),
    #[error("invalid port number in {0:?}")]
    InvalidPort(String),
}

/// Tracking policy handed to clients.
#[derive(Debug, Clone, Copy)]
pub struct TrackerConfig {
    /// Minimum milliseconds between gate evaluations on the client.
    pub update_interval: u64,
    /// Movement threshold, squared once here so every runtime comparison
    /// stays in squared-distance space.
    pub movement_threshold: u32,
}

impl TrackerConfig {
    /// Builds the policy from configured values, clamping both to their
    /// minimums and squaring the threshold.
    pub fn new(update_interval: u64, movement_threshold: u32) -> Self {
        let update_interval = if update_interval < MIN_UPDATE_INTERVAL_MS {
            warn!(
                "update interval set too low ({}ms), using minimum {}ms",
                update_interval, MIN_UPDATE_INTERVAL_MS
            );
            MIN_UPDATE_INTERVAL_MS
        } else {
            update_interval
        };

        let movement_threshold = if movement_threshold < MIN_MOVEMENT_THRESHOLD {
            warn!(
                "movement threshold set too low ({}), using minimum {}",
                movement_threshold, MIN_MOVEMENT_THRESHOLD
            );
            MIN_MOVEMENT_THRESHOLD
        } else {
            movement_threshold
        };

        TrackerConfig {
            update_interval,
            // Saturates for thresholds past 65535 units instead of wrapping.
            movement_threshold: movement_threshold.saturating_mul(movement_threshold),
        }
    }
}

/// Splits a `host:port` address, accepting the IPv6 bracket form
/// `[host]:port`.
pub fn split_host_port(input: &str) -> Result<(String, u16), ConfigError> {
    let input = input.trim();

    let colon = input
        .rfind(':')
        .ok_or_else(|| ConfigError::MissingPort(input.to_string()))?;

    let host = if input.starts_with('[') {
        let end = input
            .find(']')
            .ok_or_else(|| ConfigError::UnterminatedIpv6(input.to_string()))?;
        input[1..end].to_string()
    } else {
        input[..colon].to_string()
    };

    let port = input[colon + 1..]
        .parse::<u16>()
        .map_err(|_| ConfigError::InvalidPort(input.to_string()))?;

    Ok((host, port))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_interval_below_minimum_is_corrected() {
        let config = TrackerConfig::new(100, 1);
        assert_eq!(config.update_interval, 500);
    }

    #[test]
    fn test_interval_above_minimum_unchanged() {
        let config = TrackerConfig::new(2000, 1);
        assert_eq!(config.update_interval, 2000);
    }

    #[test]
    fn test_threshold_is_squared() {
        let config = TrackerConfig::new(1000, 3);
        assert_eq!(config.movement_threshold, 9);
    }

    #[test]
    fn test_threshold_below_minimum_is_corrected_then_squared() {
        let config = TrackerConfig::new(1000, 0);
        assert_eq!(config.movement_threshold, 1);
    }

    #[test]
    fn test_huge_threshold_saturates_instead_of_wrapping() {
        let config = TrackerConfig::new(1000, 100_000);
        assert_eq!(config.movement_threshold, u32::MAX);
    }

    #[test]
    fn test_split_host_port_ipv4() {
        let (host, port) = split_host_port("127.0.0.1:6379").unwrap();
        assert_eq!(host, "127.0.0.1");
        assert_eq!(port, 6379);
    }

    #[test]
    fn test_split_host_port_hostname_with_whitespace() {
        let (host, port) = split_host_port("  cache.internal:7000 ").unwrap();
        assert_eq!(host, "cache.internal");
        assert_eq!(port, 7000);
    }

    #[test]
    fn test_split_host_port_ipv6() {
        let (host, port) = split_host_port("[::1]:6379").unwrap();
        assert_eq!(host, "::1");
        assert_eq!(port, 6379);

        let (host, port) = split_host_port("[2001:db8::1]:7000").unwrap();
        assert_eq!(host, "2001:db8::1");
        assert_eq!(port, 7000);
    }

    #[test]
    fn test_split_host_port_missing_port() {
        assert!(matches!(
            split_host_port("localhost"),
            Err(ConfigError::MissingPort(_))
        ));
    }

    #[test]
    fn test_split_host_port_unterminated_ipv6() {
        assert!(matches!(
            split_host_port("[::1:6379"),
            Err(ConfigError::UnterminatedIpv6(_))
        ));
    }

    #[test]
    fn test_split_host_port_bad_port() {
        assert!(matches!(
            split_host_port("localhost:notaport"),
            Err(ConfigError::InvalidPort(_))
        ));
        assert!(matches!(
            split_host_port("localhost:99999"),
            Err(ConfigError::InvalidPort(_))
        ));
    }
}
