//! # cargomgr
//!
//! Coordination service for a geo-distributed storage cluster:
//! - Cargo (storage node) registration with geohash-derived identities
//! - Replica placement by geohash proximity to the requester
//! - Per-application exclusive write locks held across RPC calls
//! - gRPC for nodes and task runners, optional HTTP admin API
//!
//! ## Architecture
//!
//! ```text
//!  ┌──────────────┐  RegisterToMgr / AcquireWriteLock /   ┌──────────────┐
//!  │ cargo node   │──── ReleaseWriteLock / GetReplicaInfo ─▶│              │
//!  └──────────────┘                                       │ cargo manager│
//!  ┌──────────────┐            RequestCargo               │  registry    │
//!  │ task runner  │──────────────────────────────────────▶│  lock table  │
//!  └──────────────┘                                       └──────────────┘
//! ```
//!
//! All state is in memory; a restart forgets every node and application.
//!
//! ## Usage
//!
//! ### Start the manager
//! ```bash
//! cargomgr serve --port 7000 --admin 127.0.0.1:7080
//! ```
//!
//! ### Use the CLI
//! ```bash
//! cargoctl register --ip 10.0.0.7 --port 9000 --lat 37.77 --lon -122.42 --size 1024
//! cargoctl request app1 --lat 37.70 --lon -122.40 --replicas 3
//! cargoctl lock app1 --wait 30s
//! cargoctl replicas app1
//! cargoctl unlock app1
//! ```

#![allow(clippy::result_large_err)]

pub mod common;
pub mod manager;

// Re-export commonly used types
pub use common::{Error, ManagerConfig, Result};
pub use manager::{CargoManager, Manager, ManagerClient};

// Generated protobuf code
pub mod proto {
    tonic::include_proto!("cargomgr");

    /// Encoded descriptors for gRPC server reflection
    pub const FILE_DESCRIPTOR_SET: &[u8] = tonic::include_file_descriptor_set!("cargomgr_descriptor");
}

/// Current version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
