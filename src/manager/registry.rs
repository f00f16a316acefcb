//! Cargo node registry
//!
//! Stores:
//! - Registered cargo nodes (cargo_id → address, location, capacity)
//!
//! Nodes are never removed; a crashed or relocated node stays registered
//! until the manager restarts.

use crate::common::geohash;
use crate::common::{timestamp_now_millis, Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

/// One registered storage node
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CargoNode {
    /// `<geohash>-<uuid>`
    pub id: String,
    pub host: String,
    pub port: u16,
    pub lat: f64,
    pub lon: f64,
    pub geohash: String,
    pub total_capacity: f64,
    /// Initialised to `total_capacity`; nothing consumes it yet.
    pub remaining_capacity: f64,
    pub registered_at: u64,
}

impl CargoNode {
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Registration request as received from a cargo node
#[derive(Debug, Clone)]
pub struct Registration {
    pub host: String,
    pub port: u32,
    pub lat: f64,
    pub lon: f64,
    pub total_capacity: f64,
}

impl Registration {
    fn validate(&self) -> Result<u16> {
        if !geohash::is_valid_coordinate(self.lat, self.lon) {
            return Err(Error::InvalidArgument(format!(
                "coordinates out of range: lat={}, lon={}",
                self.lat, self.lon
            )));
        }
        if !self.total_capacity.is_finite() || self.total_capacity <= 0.0 {
            return Err(Error::InvalidArgument(format!(
                "total capacity must be positive, got {}",
                self.total_capacity
            )));
        }
        if self.host.trim().is_empty() {
            return Err(Error::InvalidArgument("host must not be empty".into()));
        }
        match u16::try_from(self.port) {
            Ok(port) if port != 0 => Ok(port),
            _ => Err(Error::InvalidArgument(format!(
                "port must be in 1..=65535, got {}",
                self.port
            ))),
        }
    }
}

/// Identity and geohash of a node, as seen by the ranker
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Candidate {
    pub id: String,
    pub geohash: String,
}

/// Registry of cargo nodes, safe for concurrent registration and ranking
pub struct Registry {
    nodes: RwLock<HashMap<String, CargoNode>>,
    precision: usize,
}

impl Registry {
    pub fn new(precision: usize) -> Self {
        Self {
            nodes: RwLock::new(HashMap::new()),
            precision,
        }
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, HashMap<String, CargoNode>>> {
        self.nodes
            .read()
            .map_err(|_| Error::Internal("registry lock poisoned".into()))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, HashMap<String, CargoNode>>> {
        self.nodes
            .write()
            .map_err(|_| Error::Internal("registry lock poisoned".into()))
    }

    /// Validate and store a new node; returns its assigned identity.
    pub fn register(&self, reg: Registration) -> Result<String> {
        let port = reg.validate()?;

        let geohash = geohash::encode(reg.lat, reg.lon, self.precision);
        let mut nodes = self.write()?;

        // Never overwrite a live node.
        let id = geohash::cargo_id(&geohash);
        if nodes.contains_key(&id) {
            return Err(Error::Internal(format!("duplicate cargo id generated: {}", id)));
        }

        let node = CargoNode {
            id: id.clone(),
            host: reg.host,
            port,
            lat: reg.lat,
            lon: reg.lon,
            geohash,
            total_capacity: reg.total_capacity,
            remaining_capacity: reg.total_capacity,
            registered_at: timestamp_now_millis(),
        };
        nodes.insert(id.clone(), node);

        tracing::info!(
            cargo_id = %id,
            total = nodes.len(),
            "Registered cargo node"
        );
        Ok(id)
    }

    /// Look up a single node
    pub fn get(&self, id: &str) -> Result<CargoNode> {
        self.read()?
            .get(id)
            .cloned()
            .ok_or_else(|| Error::NotFound(format!("cargo {}", id)))
    }

    /// Resolve several identities under one read guard, preserving order.
    pub fn resolve(&self, ids: &[String]) -> Result<Vec<CargoNode>> {
        let nodes = self.read()?;
        ids.iter()
            .map(|id| {
                nodes
                    .get(id)
                    .cloned()
                    .ok_or_else(|| Error::Internal(format!("ranked cargo {} vanished", id)))
            })
            .collect()
    }

    /// Snapshot of (identity, geohash) pairs for ranking
    pub fn candidates(&self) -> Result<Vec<Candidate>> {
        Ok(self
            .read()?
            .values()
            .map(|node| Candidate {
                id: node.id.clone(),
                geohash: node.geohash.clone(),
            })
            .collect())
    }

    /// All nodes, ordered by identity
    pub fn list(&self) -> Result<Vec<CargoNode>> {
        let mut nodes: Vec<CargoNode> = self.read()?.values().cloned().collect();
        nodes.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(nodes)
    }

    pub fn len(&self) -> Result<usize> {
        Ok(self.read()?.len())
    }

    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.read()?.is_empty())
    }
}
