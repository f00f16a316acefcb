//! Cargo manager implementation
//!
//! The manager is responsible for:
//! - Cargo registry (cargo_id → location, address, capacity)
//! - Replica placement (geohash proximity)
//! - Per-application replica sets and write locks
//! - gRPC surfaces for cargo nodes and task runners, plus an optional admin API

pub mod client;
pub mod grpc;
pub mod http;
pub mod locks;
pub mod placement;
pub mod registry;
pub mod server;
pub mod service;

pub use client::ManagerClient;
pub use server::Manager;
pub use service::CargoManager;
