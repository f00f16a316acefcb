//! gRPC client for the cargo manager

use crate::common::Result;
use crate::proto::cargo_to_mgr_client::CargoToMgrClient;
use crate::proto::task_to_cargo_mgr_client::TaskToCargoMgrClient;
use crate::proto::*;
use std::time::Duration;
use tonic::transport::Channel;

/// Typed client for both manager services over one channel.
#[derive(Clone)]
pub struct ManagerClient {
    cargo: CargoToMgrClient<Channel>,
    task: TaskToCargoMgrClient<Channel>,
}

impl ManagerClient {
    pub async fn connect(addr: String) -> Result<Self> {
        let channel = Channel::from_shared(addr)
            .map_err(|e| crate::Error::InvalidArgument(format!("bad manager address: {}", e)))?
            .connect()
            .await?;
        Ok(Self {
            cargo: CargoToMgrClient::new(channel.clone()),
            task: TaskToCargoMgrClient::new(channel),
        })
    }

    pub async fn register(
        &mut self,
        ip: String,
        port: u32,
        lat: f64,
        lon: f64,
        t_size: f64,
    ) -> Result<Ack> {
        let request = tonic::Request::new(CargoInfo {
            ip,
            port,
            lat,
            lon,
            t_size,
        });

        let response = self.cargo.register_to_mgr(request).await?;
        Ok(response.into_inner())
    }

    pub async fn request_cargo(
        &mut self,
        app_id: String,
        lat: f64,
        lon: f64,
        n_replicas: i64,
    ) -> Result<Cargos> {
        let request = tonic::Request::new(RequesterInfo {
            app_id,
            lat,
            lon,
            n_replicas,
        });

        let response = self.task.request_cargo(request).await?;
        Ok(response.into_inner())
    }

    /// `wait` of `None` leaves the bound to the server's default.
    pub async fn acquire_write_lock(
        &mut self,
        app_id: String,
        wait: Option<Duration>,
    ) -> Result<LockAck> {
        let request = tonic::Request::new(AppInfo {
            app_id,
            wait_timeout_ms: wait.map(|d| d.as_millis() as u64).unwrap_or(0),
            ..Default::default()
        });

        let response = self.cargo.acquire_write_lock(request).await?;
        Ok(response.into_inner())
    }

    /// Pass the generation from [`LockAck`] so a release after the replica
    /// set was replaced does not free someone else's lock.
    pub async fn release_write_lock(
        &mut self,
        app_id: String,
        generation: Option<u64>,
    ) -> Result<bool> {
        let request = tonic::Request::new(AppInfo {
            app_id,
            generation: generation.unwrap_or(0),
            ..Default::default()
        });

        let response = self.cargo.release_write_lock(request).await?;
        Ok(response.into_inner().released)
    }

    pub async fn get_replica_info(&mut self, app_id: String) -> Result<ReplicaInfo> {
        let request = tonic::Request::new(AppInfo {
            app_id,
            ..Default::default()
        });

        let response = self.cargo.get_replica_info(request).await?;
        Ok(response.into_inner())
    }
}
