//! Configuration for the cargo manager
//!
//! Layers, lowest priority first: built-in defaults, an optional TOML file,
//! `CARGOMGR_*` environment variables. The server binary applies CLI flags on
//! top of the loaded value.

use crate::common::geohash::{DEFAULT_PRECISION, MAX_PRECISION};
use crate::common::utils::parse_duration;
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::net::{IpAddr, SocketAddr};
use std::path::Path;
use std::time::Duration;

/// Environment variable prefix (`CARGOMGR_PORT=7000`, ...)
pub const ENV_PREFIX: &str = "CARGOMGR";

/// Ordering applied to proximity scores when picking replicas
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RankOrder {
    /// Longest shared geohash prefix first
    #[default]
    Nearest,
    /// Shortest shared prefix first (historical behaviour, kept for compatibility)
    Legacy,
}

/// What a replica request does when the application's write lock is held
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReplacePolicy {
    /// Refuse the request; the locked entry stays in place
    #[default]
    Reject,
    /// Install the new entry and abort everyone waiting on the old one
    Replace,
}

/// Cargo manager configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ManagerConfig {
    /// Interface the gRPC listener binds to
    pub host: String,

    /// gRPC listen port (both service surfaces)
    pub port: u16,

    /// Optional bind address for the read-only HTTP admin API
    #[serde(skip_serializing_if = "Option::is_none")]
    pub admin_addr: Option<SocketAddr>,

    /// Geohash length used for identities and ranking
    pub geohash_precision: usize,

    pub rank_order: RankOrder,

    pub replace_policy: ReplacePolicy,

    /// Default wait bound for AcquireWriteLock (e.g. "30s"); unset waits forever
    #[serde(skip_serializing_if = "Option::is_none")]
    pub acquire_timeout: Option<String>,

    /// Lease after which a held write lock is released automatically (e.g. "5m")
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lock_lease: Option<String>,

    /// Logging level
    pub log_level: String,
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 7000,
            admin_addr: None,
            geohash_precision: DEFAULT_PRECISION,
            rank_order: RankOrder::default(),
            replace_policy: ReplacePolicy::default(),
            acquire_timeout: None,
            lock_lease: None,
            log_level: "info".to_string(),
        }
    }
}

impl ManagerConfig {
    /// Load from an optional TOML file plus `CARGOMGR_*` environment variables.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut builder = config::Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(
                config::File::from(path)
                    .format(config::FileFormat::Toml)
                    .required(true),
            );
        }
        let settings = builder
            .add_source(config::Environment::with_prefix(ENV_PREFIX).try_parsing(true))
            .build()?;

        let config: ManagerConfig = settings.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Check ranges and parse the duration fields once so bad values fail at startup.
    pub fn validate(&self) -> Result<()> {
        if !(1..=MAX_PRECISION).contains(&self.geohash_precision) {
            return Err(Error::InvalidConfig(format!(
                "geohash_precision must be in 1..={}, got {}",
                MAX_PRECISION, self.geohash_precision
            )));
        }
        self.grpc_addr()?;
        self.acquire_timeout()?;
        self.lock_lease()?;
        Ok(())
    }

    /// Socket address for the gRPC listener
    pub fn grpc_addr(&self) -> Result<SocketAddr> {
        let ip: IpAddr = self
            .host
            .parse()
            .map_err(|_| Error::InvalidConfig(format!("invalid host address: {}", self.host)))?;
        Ok(SocketAddr::new(ip, self.port))
    }

    pub fn acquire_timeout(&self) -> Result<Option<Duration>> {
        self.acquire_timeout.as_deref().map(parse_duration).transpose()
    }

    pub fn lock_lease(&self) -> Result<Option<Duration>> {
        self.lock_lease.as_deref().map(parse_duration).transpose()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults_are_valid() {
        let config = ManagerConfig::default();
        config.validate().unwrap();
        assert_eq!(config.grpc_addr().unwrap(), "0.0.0.0:7000".parse().unwrap());
        assert_eq!(config.acquire_timeout().unwrap(), None);
        assert_eq!(config.rank_order, RankOrder::Nearest);
        assert_eq!(config.replace_policy, ReplacePolicy::Reject);
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            r#"
port = 7100
geohash_precision = 8
rank_order = "legacy"
replace_policy = "replace"
acquire_timeout = "30s"
lock_lease = "5m"
admin_addr = "127.0.0.1:7101"
"#
        )
        .unwrap();

        let config = ManagerConfig::load(Some(file.path())).unwrap();
        assert_eq!(config.port, 7100);
        assert_eq!(config.host, "0.0.0.0");
        assert_eq!(config.geohash_precision, 8);
        assert_eq!(config.rank_order, RankOrder::Legacy);
        assert_eq!(config.replace_policy, ReplacePolicy::Replace);
        assert_eq!(
            config.acquire_timeout().unwrap(),
            Some(Duration::from_secs(30))
        );
        assert_eq!(config.lock_lease().unwrap(), Some(Duration::from_secs(300)));
        assert_eq!(config.admin_addr, Some("127.0.0.1:7101".parse().unwrap()));
    }

    #[test]
    fn test_invalid_precision_rejected() {
        let config = ManagerConfig {
            geohash_precision: 0,
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(Error::InvalidConfig(_))));
    }

    #[test]
    fn test_invalid_host_rejected() {
        let config = ManagerConfig {
            host: "not an ip".to_string(),
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_invalid_duration_rejected() {
        let config = ManagerConfig {
            lock_lease: Some("forever".to_string()),
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_missing_file_is_error() {
        let result = ManagerConfig::load(Some(Path::new("/nonexistent/cargomgr.toml")));
        assert!(result.is_err());
    }
}
