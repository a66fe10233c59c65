//! Configuration types.

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::error::ConfigError;

/// Default rule file, relative to the working directory.
pub const DEFAULT_RULES_PATH: &str = "auto_responder_rules.json";

/// Default WhatsApp bridge REST base URL.
pub const DEFAULT_BRIDGE_URL: &str = "http://localhost:8080/api";

/// Auto-responder configuration.
#[derive(Debug, Clone)]
pub struct ResponderConfig {
    /// Time between poll cycles.
    pub check_interval: Duration,
    /// Path of the JSON rule store.
    pub rules_path: PathBuf,
    /// Maximum messages fetched per cycle.
    pub page_size: usize,
    /// Dedup memory size that triggers pruning.
    pub dedup_ceiling: usize,
    /// Dedup memory size after pruning.
    pub dedup_target: usize,
    /// How long `stop()` waits for the poll task to exit.
    pub stop_grace: Duration,
    /// Caller-side timeout for a single sink call.
    pub send_timeout: Duration,
    /// Bridge REST base URL.
    pub bridge_url: String,
    /// Port for the control API.
    pub control_port: u16,
    /// Directory holding `auto_responder.log`.
    pub log_dir: PathBuf,
}

impl Default for ResponderConfig {
    fn default() -> Self {
        Self {
            check_interval: Duration::from_secs(60),
            rules_path: PathBuf::from(DEFAULT_RULES_PATH),
            page_size: 50,
            dedup_ceiling: 1000,
            dedup_target: 500,
            stop_grace: Duration::from_secs(5),
            send_timeout: Duration::from_secs(30),
            bridge_url: DEFAULT_BRIDGE_URL.to_string(),
            control_port: 8090,
            log_dir: PathBuf::from("."),
        }
    }
}

impl ResponderConfig {
    /// Build config from environment variables, falling back to defaults.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build config from an arbitrary key lookup. `from_env` delegates here.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        let check_interval = parse_var(&lookup, "AUTO_RESPONDER_CHECK_INTERVAL_SECS")?
            .map(Duration::from_secs)
            .unwrap_or(defaults.check_interval);
        if check_interval.is_zero() {
            return Err(ConfigError::InvalidValue {
                key: "AUTO_RESPONDER_CHECK_INTERVAL_SECS".into(),
                message: "must be greater than 0".into(),
            });
        }

        let rules_path = lookup("AUTO_RESPONDER_RULES_PATH")
            .map(PathBuf::from)
            .unwrap_or(defaults.rules_path);

        let page_size =
            parse_var(&lookup, "AUTO_RESPONDER_PAGE_SIZE")?.unwrap_or(defaults.page_size);

        let dedup_ceiling =
            parse_var(&lookup, "AUTO_RESPONDER_DEDUP_CEILING")?.unwrap_or(defaults.dedup_ceiling);
        let dedup_target =
            parse_var(&lookup, "AUTO_RESPONDER_DEDUP_TARGET")?.unwrap_or(defaults.dedup_target);
        if dedup_target >= dedup_ceiling {
            return Err(ConfigError::InvalidValue {
                key: "AUTO_RESPONDER_DEDUP_TARGET".into(),
                message: format!("{dedup_target} must be below the ceiling ({dedup_ceiling})"),
            });
        }

        let stop_grace = parse_var(&lookup, "AUTO_RESPONDER_STOP_GRACE_SECS")?
            .map(Duration::from_secs)
            .unwrap_or(defaults.stop_grace);

        let send_timeout = parse_var(&lookup, "AUTO_RESPONDER_SEND_TIMEOUT_SECS")?
            .map(Duration::from_secs)
            .unwrap_or(defaults.send_timeout);

        let bridge_url = lookup("WHATSAPP_BRIDGE_URL")
            .map(|s| s.trim_end_matches('/').to_string())
            .unwrap_or(defaults.bridge_url);

        let control_port =
            parse_var(&lookup, "AUTO_RESPONDER_CONTROL_PORT")?.unwrap_or(defaults.control_port);

        let log_dir = lookup("AUTO_RESPONDER_LOG_DIR")
            .map(PathBuf::from)
            .unwrap_or(defaults.log_dir);

        Ok(Self {
            check_interval,
            rules_path,
            page_size,
            dedup_ceiling,
            dedup_target,
            stop_grace,
            send_timeout,
            bridge_url,
            control_port,
            log_dir,
        })
    }
}

fn parse_var<T, F>(lookup: &F, key: &str) -> Result<Option<T>, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        None => Ok(None),
        Some(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|e: T::Err| ConfigError::InvalidValue {
                key: key.to_string(),
                message: format!("'{raw}': {e}"),
            }),
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_when_unset() {
        let config = ResponderConfig::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config.check_interval, Duration::from_secs(60));
        assert_eq!(config.page_size, 50);
        assert_eq!(config.dedup_ceiling, 1000);
        assert_eq!(config.dedup_target, 500);
        assert_eq!(config.stop_grace, Duration::from_secs(5));
        assert_eq!(config.rules_path, PathBuf::from(DEFAULT_RULES_PATH));
        assert_eq!(config.bridge_url, DEFAULT_BRIDGE_URL);
    }

    #[test]
    fn overrides_from_lookup() {
        let config = ResponderConfig::from_lookup(lookup(&[
            ("AUTO_RESPONDER_CHECK_INTERVAL_SECS", "15"),
            ("AUTO_RESPONDER_RULES_PATH", "/tmp/rules.json"),
            ("WHATSAPP_BRIDGE_URL", "http://bridge:9000/api/"),
            ("AUTO_RESPONDER_CONTROL_PORT", "9999"),
        ]))
        .unwrap();
        assert_eq!(config.check_interval, Duration::from_secs(15));
        assert_eq!(config.rules_path, PathBuf::from("/tmp/rules.json"));
        assert_eq!(config.bridge_url, "http://bridge:9000/api");
        assert_eq!(config.control_port, 9999);
    }

    #[test]
    fn rejects_unparseable_number() {
        let err = ResponderConfig::from_lookup(lookup(&[("AUTO_RESPONDER_PAGE_SIZE", "lots")]))
            .unwrap_err();
        assert!(err.to_string().contains("AUTO_RESPONDER_PAGE_SIZE"));
    }

    #[test]
    fn rejects_zero_interval() {
        assert!(
            ResponderConfig::from_lookup(lookup(&[("AUTO_RESPONDER_CHECK_INTERVAL_SECS", "0")]))
                .is_err()
        );
    }

    #[test]
    fn rejects_target_not_below_ceiling() {
        let result = ResponderConfig::from_lookup(lookup(&[
            ("AUTO_RESPONDER_DEDUP_CEILING", "100"),
            ("AUTO_RESPONDER_DEDUP_TARGET", "100"),
        ]));
        assert!(result.is_err());
    }
}
