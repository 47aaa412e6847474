//! Configuration management for Floodgate.
//!
//! Loads the demo server's settings and the per-identity limit policy from
//! YAML. Rules are matched by key prefix, most specific (longest) prefix
//! first, so `user:premium:` can carry a looser limit than the `user:`
//! fallback.

use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;
use tracing::info;

use crate::error::{FloodgateError, Result};
use crate::limiter::Limit;

/// Main configuration for the Floodgate server.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FloodgateConfig {
    /// Server configuration
    #[serde(default)]
    pub server: ServerConfig,

    /// Rate limit policy
    #[serde(default)]
    pub limits: LimitsConfig,
}

/// Server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// HTTP listen address
    #[serde(default = "default_listen_addr")]
    pub listen_addr: SocketAddr,

    /// Redis URL for the distributed strategy; local-only when unset
    #[serde(default)]
    pub redis_url: Option<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: default_listen_addr(),
            redis_url: None,
        }
    }
}

fn default_listen_addr() -> SocketAddr {
    "127.0.0.1:8080".parse().unwrap()
}

/// Rate limit policy: a default rule plus prefix-matched overrides.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LimitsConfig {
    /// Limit applied when no rule matches
    #[serde(default)]
    pub default: LimitRule,

    /// Prefix-matched overrides
    #[serde(default)]
    pub rules: Vec<KeyRule>,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            default: LimitRule::default(),
            rules: Vec::new(),
        }
    }
}

/// A limit rule bound to an identity key prefix.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KeyRule {
    /// Identity key prefix this rule applies to
    pub prefix: String,
    /// The limit to enforce
    #[serde(flatten)]
    pub rule: LimitRule,
}

/// A rate limit rule specifying the allowance and time window.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LimitRule {
    /// Requests allowed per unit of time
    pub rate: u32,
    /// The time unit
    pub unit: TimeUnit,
    /// Maximum burst; defaults to `rate` when omitted
    #[serde(default)]
    pub burst: Option<u32>,
}

impl Default for LimitRule {
    fn default() -> Self {
        Self {
            rate: 10,
            unit: TimeUnit::Minute,
            burst: None,
        }
    }
}

impl LimitRule {
    /// Convert to the strategy-facing limit.
    pub fn to_limit(&self) -> Limit {
        Limit {
            rate: self.rate,
            period: self.unit.duration(),
            burst: self.burst.unwrap_or(self.rate),
        }
    }

    fn validate(&self) -> Result<()> {
        Limit::new(
            self.rate,
            self.unit.duration(),
            self.burst.unwrap_or(self.rate),
        )
        .map(|_| ())
    }
}

/// Time unit for rate limits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TimeUnit {
    Second,
    Minute,
    Hour,
    Day,
}

impl TimeUnit {
    /// Get the duration of this time unit.
    pub fn duration(&self) -> Duration {
        match self {
            TimeUnit::Second => Duration::from_secs(1),
            TimeUnit::Minute => Duration::from_secs(60),
            TimeUnit::Hour => Duration::from_secs(3600),
            TimeUnit::Day => Duration::from_secs(86400),
        }
    }
}

impl FloodgateConfig {
    /// Load configuration from a YAML file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        info!(path = %path.display(), "Loading configuration");

        let contents = std::fs::read_to_string(path)?;
        Self::from_yaml(&contents)
    }

    /// Load configuration from a YAML string, validating every rule.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let config: FloodgateConfig = serde_yaml::from_str(yaml)
            .map_err(|e| FloodgateError::Config(format!("Failed to parse config: {}", e)))?;

        config.limits.default.validate()?;
        for rule in &config.limits.rules {
            rule.rule.validate()?;
        }
        Ok(config)
    }
}

impl LimitsConfig {
    /// Find the limit for an identity key.
    ///
    /// The longest matching prefix wins; the default rule applies when no
    /// prefix matches.
    pub fn find_limit(&self, key: &str) -> Limit {
        self.rules
            .iter()
            .filter(|r| key.starts_with(&r.prefix))
            .max_by_key(|r| r.prefix.len())
            .map(|r| r.rule.to_limit())
            .unwrap_or_else(|| self.default.to_limit())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = FloodgateConfig::default();
        assert_eq!(config.server.listen_addr, default_listen_addr());
        assert!(config.server.redis_url.is_none());
        assert!(config.limits.rules.is_empty());

        let limit = config.limits.find_limit("anything");
        assert_eq!(limit.rate, 10);
        assert_eq!(limit.period, Duration::from_secs(60));
        assert_eq!(limit.burst, 10);
    }

    #[test]
    fn test_parse_full_config() {
        let yaml = r#"
server:
  listen_addr: 0.0.0.0:9000
  redis_url: redis://127.0.0.1/
limits:
  default:
    rate: 100
    unit: minute
  rules:
    - prefix: "user:"
      rate: 50
      unit: minute
    - prefix: "user:premium:"
      rate: 1000
      unit: minute
      burst: 2000
"#;
        let config = FloodgateConfig::from_yaml(yaml).unwrap();
        assert_eq!(config.server.listen_addr, "0.0.0.0:9000".parse().unwrap());
        assert_eq!(
            config.server.redis_url.as_deref(),
            Some("redis://127.0.0.1/")
        );
        assert_eq!(config.limits.rules.len(), 2);
    }

    #[test]
    fn test_longest_prefix_wins() {
        let yaml = r#"
limits:
  rules:
    - prefix: "user:"
      rate: 50
      unit: minute
    - prefix: "user:premium:"
      rate: 1000
      unit: minute
      burst: 2000
"#;
        let config = FloodgateConfig::from_yaml(yaml).unwrap();

        let basic = config.limits.find_limit("user:42");
        assert_eq!(basic.rate, 50);
        assert_eq!(basic.burst, 50);

        let premium = config.limits.find_limit("user:premium:42");
        assert_eq!(premium.rate, 1000);
        assert_eq!(premium.burst, 2000);

        let other = config.limits.find_limit("ip:10.0.0.1");
        assert_eq!(other.rate, 10);
    }

    #[test]
    fn test_unit_durations() {
        assert_eq!(TimeUnit::Second.duration(), Duration::from_secs(1));
        assert_eq!(TimeUnit::Minute.duration(), Duration::from_secs(60));
        assert_eq!(TimeUnit::Hour.duration(), Duration::from_secs(3600));
        assert_eq!(TimeUnit::Day.duration(), Duration::from_secs(86400));
    }

    #[test]
    fn test_invalid_rule_rejected_at_load() {
        let yaml = r#"
limits:
  default:
    rate: 0
    unit: second
"#;
        assert!(FloodgateConfig::from_yaml(yaml).is_err());
    }

    #[test]
    fn test_unparseable_yaml_rejected() {
        assert!(FloodgateConfig::from_yaml("limits: [not a map").is_err());
    }
}
