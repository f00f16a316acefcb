//! Cargo manager core
//!
//! Owns the registry and the lock table and implements every operation the
//! RPC surfaces expose. Transport code only converts messages.

use crate::common::geohash::is_valid_coordinate;
use crate::common::{Error, ManagerConfig, Result};
use crate::manager::locks::{AppView, LockTable, ReplicaSet};
use crate::manager::placement::ProximityRanker;
use crate::manager::registry::{CargoNode, Registration, Registry};
use serde::Serialize;
use std::time::Duration;

/// Replica request from a task runner
#[derive(Debug, Clone)]
pub struct ReplicaRequest {
    pub app_id: String,
    pub lat: f64,
    pub lon: f64,
    pub n_replicas: i64,
}

/// Summary served by the admin API
#[derive(Debug, Clone, Serialize)]
pub struct ManagerStatus {
    pub version: &'static str,
    pub cargos: usize,
    pub applications: usize,
    pub locked_applications: usize,
    pub geohash_precision: usize,
    pub rank_order: crate::common::RankOrder,
    pub replace_policy: crate::common::ReplacePolicy,
}

pub struct CargoManager {
    config: ManagerConfig,
    registry: Registry,
    ranker: ProximityRanker,
    locks: LockTable,
    acquire_timeout: Option<Duration>,
}

impl CargoManager {
    pub fn new(config: ManagerConfig) -> Result<Self> {
        config.validate()?;
        let acquire_timeout = config.acquire_timeout()?;
        let lease = config.lock_lease()?;

        Ok(Self {
            registry: Registry::new(config.geohash_precision),
            ranker: ProximityRanker::new(config.rank_order, config.geohash_precision),
            locks: LockTable::new(config.replace_policy, lease),
            acquire_timeout,
            config,
        })
    }

    pub fn config(&self) -> &ManagerConfig {
        &self.config
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn locks(&self) -> &LockTable {
        &self.locks
    }

    /// Register a cargo node and return its identity.
    pub fn register(&self, reg: Registration) -> Result<String> {
        self.registry.register(reg)
    }

    /// Pick the nearest `n_replicas` nodes for an application and record them
    /// as its replica set. Returns the chosen nodes, nearest first.
    pub fn request_cargo(&self, req: ReplicaRequest) -> Result<Vec<CargoNode>> {
        if req.app_id.is_empty() {
            return Err(Error::InvalidArgument("app id must not be empty".into()));
        }
        if req.n_replicas <= 0 {
            return Err(Error::InvalidArgument(format!(
                "replica count must be positive, got {}",
                req.n_replicas
            )));
        }
        if !is_valid_coordinate(req.lat, req.lon) {
            return Err(Error::InvalidArgument(format!(
                "coordinates out of range: lat={}, lon={}",
                req.lat, req.lon
            )));
        }

        let k = usize::try_from(req.n_replicas).unwrap_or(usize::MAX);
        let ids = self.ranker.rank(&self.registry, req.lat, req.lon, k)?;
        let nodes = self.registry.resolve(&ids)?;

        if nodes.is_empty() {
            tracing::warn!(app_id = %req.app_id, "No cargo registered; assigning empty replica set");
        } else if nodes.len() < k {
            tracing::warn!(
                app_id = %req.app_id,
                requested = k,
                available = nodes.len(),
                "Fewer cargo nodes than requested replicas"
            );
        }

        self.locks
            .create_or_replace(&req.app_id, ReplicaSet::from_nodes(&nodes))?;
        Ok(nodes)
    }

    /// Block until the application's write lock is ours; returns the
    /// generation of the replica set the grant belongs to.
    ///
    /// `wait` overrides the configured default bound.
    pub async fn acquire_write_lock(&self, app_id: &str, wait: Option<Duration>) -> Result<u64> {
        self.locks
            .acquire(app_id, wait.or(self.acquire_timeout))
            .await
    }

    /// `generation` restricts the release to the replica set it was granted on.
    pub fn release_write_lock(&self, app_id: &str, generation: Option<u64>) -> Result<bool> {
        self.locks.release(app_id, generation)
    }

    pub fn replica_info(&self, app_id: &str) -> Result<ReplicaSet> {
        self.locks.replicas(app_id)
    }

    pub fn cargo(&self, cargo_id: &str) -> Result<CargoNode> {
        self.registry.get(cargo_id)
    }

    pub fn application(&self, app_id: &str) -> Result<AppView> {
        self.locks.describe(app_id)
    }

    pub fn status(&self) -> Result<ManagerStatus> {
        let apps = self.locks.snapshot()?;
        Ok(ManagerStatus {
            version: crate::VERSION,
            cargos: self.registry.len()?,
            applications: apps.len(),
            locked_applications: apps.iter().filter(|a| a.locked).count(),
            geohash_precision: self.config.geohash_precision,
            rank_order: self.config.rank_order,
            replace_policy: self.config.replace_policy,
        })
    }
}
