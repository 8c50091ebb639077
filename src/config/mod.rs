//! Monitoring configuration.
//!
//! Tunables are stored in the `settings` table as key/value pairs and read
//! through [`SettingsService`], which caches the merged view for a short
//! TTL so edits take effect on the next scheduling decision without a
//! restart.

mod service;

pub use service::SettingsService;

use std::collections::HashMap;
use std::time::Duration;

/// Merged monitoring settings with per-key fallback to defaults.
#[derive(Debug, Clone, PartialEq)]
pub struct MonitorSettings {
    /// Poll interval while an account is believed offline.
    pub offline_check_interval: Duration,
    /// Poll interval while a session is active (refresh-only checks).
    pub online_check_interval: Duration,
    /// Window after a session ends during which probes are skipped, to
    /// avoid reconnecting into a lingering ghost room.
    pub post_session_cooldown: Duration,
    /// Block cooldown curve: `min(max, base * 2^(count-1))` hours.
    pub cooldown_base_hours: f64,
    pub cooldown_max_hours: f64,
    /// Delay before the one-shot recovery probe after a block.
    pub recovery_test_delay: Duration,
    /// Bounded short-interval retries before accepting a block.
    pub quick_retry_enabled: bool,
    pub quick_retry_attempts: u32,
    pub quick_retry_interval: Duration,
    /// Stop an active session when a block is detected.
    pub stop_on_block: bool,
    /// Record cooldowns automatically on detected blocks.
    pub auto_cooldown_enabled: bool,
    /// Schedule recovery probes automatically after cooldowns.
    pub auto_recovery_enabled: bool,
    /// Liveness probe observation window and minimum dwell.
    pub probe_timeout: Duration,
    pub probe_min_dwell: Duration,
    /// Buffered event flush cadence.
    pub event_flush_interval: Duration,
    /// Coalesced counter flush cadence.
    pub counter_flush_interval: Duration,
    /// Stats snapshot cadence.
    pub snapshot_interval: Duration,
    /// Supervisor reconnect policy.
    pub max_reconnect_attempts: u32,
    pub reconnect_base_delay: Duration,
    /// Ceiling on re-buffered events per session.
    pub event_buffer_ceiling: usize,
    /// Maximum random jitter added to scheduling delays.
    pub check_jitter: Duration,
}

impl Default for MonitorSettings {
    fn default() -> Self {
        Self {
            offline_check_interval: Duration::from_secs(60),
            online_check_interval: Duration::from_secs(120),
            post_session_cooldown: Duration::from_secs(90),
            cooldown_base_hours: 1.0,
            cooldown_max_hours: 72.0,
            recovery_test_delay: Duration::from_secs(30 * 60),
            quick_retry_enabled: true,
            quick_retry_attempts: 3,
            quick_retry_interval: Duration::from_secs(10),
            stop_on_block: true,
            auto_cooldown_enabled: true,
            auto_recovery_enabled: true,
            probe_timeout: Duration::from_secs(5),
            probe_min_dwell: Duration::from_secs(2),
            event_flush_interval: Duration::from_secs(1),
            counter_flush_interval: Duration::from_secs(5),
            snapshot_interval: Duration::from_secs(15),
            max_reconnect_attempts: 5,
            reconnect_base_delay: Duration::from_secs(1),
            event_buffer_ceiling: 10_000,
            check_jitter: Duration::from_secs(5),
        }
    }
}

fn secs(map: &HashMap<String, String>, key: &str, default: Duration) -> Duration {
    map.get(key)
        .and_then(|v| v.parse::<u64>().ok())
        .map(Duration::from_secs)
        .unwrap_or(default)
}

fn float(map: &HashMap<String, String>, key: &str, default: f64) -> f64 {
    map.get(key)
        .and_then(|v| v.parse::<f64>().ok())
        .unwrap_or(default)
}

fn boolean(map: &HashMap<String, String>, key: &str, default: bool) -> bool {
    map.get(key)
        .and_then(|v| v.parse::<bool>().ok())
        .unwrap_or(default)
}

fn integer<T: std::str::FromStr>(map: &HashMap<String, String>, key: &str, default: T) -> T {
    map.get(key)
        .and_then(|v| v.parse::<T>().ok())
        .unwrap_or(default)
}

impl MonitorSettings {
    /// Build settings from stored key/value pairs, falling back to defaults
    /// for missing or malformed keys.
    pub fn from_map(map: &HashMap<String, String>) -> Self {
        let d = Self::default();
        Self {
            offline_check_interval: secs(map, "offline_check_interval_secs", d.offline_check_interval),
            online_check_interval: secs(map, "online_check_interval_secs", d.online_check_interval),
            post_session_cooldown: secs(map, "post_session_cooldown_secs", d.post_session_cooldown),
            cooldown_base_hours: float(map, "cooldown_base_hours", d.cooldown_base_hours),
            cooldown_max_hours: float(map, "cooldown_max_hours", d.cooldown_max_hours),
            recovery_test_delay: secs(map, "recovery_test_delay_secs", d.recovery_test_delay),
            quick_retry_enabled: boolean(map, "quick_retry_enabled", d.quick_retry_enabled),
            quick_retry_attempts: integer(map, "quick_retry_attempts", d.quick_retry_attempts),
            quick_retry_interval: secs(map, "quick_retry_interval_secs", d.quick_retry_interval),
            stop_on_block: boolean(map, "stop_on_block", d.stop_on_block),
            auto_cooldown_enabled: boolean(map, "auto_cooldown_enabled", d.auto_cooldown_enabled),
            auto_recovery_enabled: boolean(map, "auto_recovery_enabled", d.auto_recovery_enabled),
            probe_timeout: secs(map, "probe_timeout_secs", d.probe_timeout),
            probe_min_dwell: secs(map, "probe_min_dwell_secs", d.probe_min_dwell),
            event_flush_interval: secs(map, "event_flush_interval_secs", d.event_flush_interval),
            counter_flush_interval: secs(map, "counter_flush_interval_secs", d.counter_flush_interval),
            snapshot_interval: secs(map, "snapshot_interval_secs", d.snapshot_interval),
            max_reconnect_attempts: integer(map, "max_reconnect_attempts", d.max_reconnect_attempts),
            reconnect_base_delay: secs(map, "reconnect_base_delay_secs", d.reconnect_base_delay),
            event_buffer_ceiling: integer(map, "event_buffer_ceiling", d.event_buffer_ceiling),
            check_jitter: secs(map, "check_jitter_secs", d.check_jitter),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_empty_map_is_default() {
        let settings = MonitorSettings::from_map(&HashMap::new());
        assert_eq!(settings, MonitorSettings::default());
    }

    #[test]
    fn test_from_map_overrides() {
        let mut map = HashMap::new();
        map.insert("offline_check_interval_secs".to_string(), "30".to_string());
        map.insert("cooldown_max_hours".to_string(), "24".to_string());
        map.insert("stop_on_block".to_string(), "false".to_string());

        let settings = MonitorSettings::from_map(&map);
        assert_eq!(settings.offline_check_interval, Duration::from_secs(30));
        assert_eq!(settings.cooldown_max_hours, 24.0);
        assert!(!settings.stop_on_block);
        // Untouched keys keep defaults.
        assert_eq!(settings.probe_timeout, Duration::from_secs(5));
    }

    #[test]
    fn test_malformed_values_fall_back() {
        let mut map = HashMap::new();
        map.insert("quick_retry_attempts".to_string(), "lots".to_string());
        let settings = MonitorSettings::from_map(&map);
        assert_eq!(
            settings.quick_retry_attempts,
            MonitorSettings::default().quick_retry_attempts
        );
    }
}
