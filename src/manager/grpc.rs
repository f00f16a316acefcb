//! Manager gRPC services
//!
//! Two services share one listener:
//! - `CargoToMgr`: called by cargo nodes (registration, write locks, replica lookup)
//! - `TaskToCargoMgr`: called by task runners (replica set requests)

use crate::manager::registry::Registration;
use crate::manager::service::{CargoManager, ReplicaRequest};
use crate::proto::cargo_to_mgr_server::{CargoToMgr, CargoToMgrServer};
use crate::proto::task_to_cargo_mgr_server::{TaskToCargoMgr, TaskToCargoMgrServer};
use crate::proto::*;
use std::sync::Arc;
use std::time::Duration;
use tonic::{Request, Response, Status};

/// Node-facing service
#[derive(Clone)]
pub struct CargoService {
    manager: Arc<CargoManager>,
}

impl CargoService {
    pub fn new(manager: Arc<CargoManager>) -> Self {
        Self { manager }
    }

    /// Converts this service into a gRPC server instance.
    pub fn into_server(self) -> CargoToMgrServer<Self> {
        CargoToMgrServer::new(self)
    }
}

#[tonic::async_trait]
impl CargoToMgr for CargoService {
    #[tracing::instrument(skip_all, fields(ip = %req.get_ref().ip, port = req.get_ref().port))]
    async fn register_to_mgr(&self, req: Request<CargoInfo>) -> Result<Response<Ack>, Status> {
        let info = req.into_inner();
        let id = self
            .manager
            .register(Registration {
                host: info.ip,
                port: info.port,
                lat: info.lat,
                lon: info.lon,
                total_capacity: info.t_size,
            })
            .inspect_err(|e| tracing::warn!("Registration rejected: {}", e))?;

        Ok(Response::new(Ack {
            id,
            ack: "Registered cargo node".to_string(),
        }))
    }

    #[tracing::instrument(skip_all, fields(app_id = %req.get_ref().app_id))]
    async fn acquire_write_lock(&self, req: Request<AppInfo>) -> Result<Response<LockAck>, Status> {
        let app = req.into_inner();
        let wait = (app.wait_timeout_ms > 0).then(|| Duration::from_millis(app.wait_timeout_ms));

        tracing::debug!("Waiting for write lock");
        let generation = self.manager.acquire_write_lock(&app.app_id, wait).await?;
        Ok(Response::new(LockAck {
            locked: true,
            generation,
        }))
    }

    #[tracing::instrument(skip_all, fields(app_id = %req.get_ref().app_id))]
    async fn release_write_lock(
        &self,
        req: Request<AppInfo>,
    ) -> Result<Response<ReleaseAck>, Status> {
        let app = req.into_inner();
        let generation = (app.generation > 0).then_some(app.generation);
        let released = self.manager.release_write_lock(&app.app_id, generation)?;
        Ok(Response::new(ReleaseAck { released }))
    }

    #[tracing::instrument(skip_all, fields(app_id = %req.get_ref().app_id))]
    async fn get_replica_info(
        &self,
        req: Request<AppInfo>,
    ) -> Result<Response<ReplicaInfo>, Status> {
        let app = req.into_inner();
        let replicas = self.manager.replica_info(&app.app_id)?;
        Ok(Response::new(ReplicaInfo {
            cargo_ids: replicas.cargo_ids().to_vec(),
            ips: replicas.hosts().to_vec(),
            ports: replicas.ports().iter().map(|&p| u32::from(p)).collect(),
        }))
    }
}

/// Client-facing service
#[derive(Clone)]
pub struct TaskService {
    manager: Arc<CargoManager>,
}

impl TaskService {
    pub fn new(manager: Arc<CargoManager>) -> Self {
        Self { manager }
    }

    /// Converts this service into a gRPC server instance.
    pub fn into_server(self) -> TaskToCargoMgrServer<Self> {
        TaskToCargoMgrServer::new(self)
    }
}

#[tonic::async_trait]
impl TaskToCargoMgr for TaskService {
    #[tracing::instrument(skip_all, fields(app_id = %req.get_ref().app_id, n = req.get_ref().n_replicas))]
    async fn request_cargo(
        &self,
        req: Request<RequesterInfo>,
    ) -> Result<Response<Cargos>, Status> {
        let info = req.into_inner();
        let nodes = self
            .manager
            .request_cargo(ReplicaRequest {
                app_id: info.app_id,
                lat: info.lat,
                lon: info.lon,
                n_replicas: info.n_replicas,
            })
            .inspect_err(|e| tracing::warn!("Replica request rejected: {}", e))?;

        tracing::info!(assigned = nodes.len(), "Replica set assigned");
        Ok(Response::new(Cargos {
            ips: nodes.iter().map(|n| n.host.clone()).collect(),
            ports: nodes.iter().map(|n| u32::from(n.port)).collect(),
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::ManagerConfig;
    use tonic::Code;

    fn services() -> (CargoService, TaskService) {
        let manager = Arc::new(CargoManager::new(ManagerConfig::default()).unwrap());
        (CargoService::new(manager.clone()), TaskService::new(manager))
    }

    fn app(app_id: &str) -> Request<AppInfo> {
        Request::new(AppInfo {
            app_id: app_id.to_string(),
            ..Default::default()
        })
    }

    #[tokio::test]
    async fn test_register_and_request() {
        let (cargo, task) = services();
        let ack = cargo
            .register_to_mgr(Request::new(CargoInfo {
                ip: "10.1.1.1".to_string(),
                port: 7001,
                lat: 37.7749,
                lon: -122.4194,
                t_size: 64.0,
            }))
            .await
            .unwrap()
            .into_inner();
        assert!(ack.id.starts_with("9q8yy"));

        let cargos = task
            .request_cargo(Request::new(RequesterInfo {
                app_id: "app1".to_string(),
                lat: 37.7749,
                lon: -122.4194,
                n_replicas: 3,
            }))
            .await
            .unwrap()
            .into_inner();
        assert_eq!(cargos.ips, vec!["10.1.1.1"]);
        assert_eq!(cargos.ports, vec![7001]);

        let info = cargo.get_replica_info(app("app1")).await.unwrap().into_inner();
        assert_eq!(info.cargo_ids, vec![ack.id]);
        assert_eq!(info.ips.len(), info.ports.len());
    }

    #[tokio::test]
    async fn test_status_codes() {
        let (cargo, task) = services();

        let bad = cargo
            .register_to_mgr(Request::new(CargoInfo {
                ip: "10.1.1.1".to_string(),
                port: 7001,
                lat: 200.0,
                lon: 0.0,
                t_size: 1.0,
            }))
            .await
            .unwrap_err();
        assert_eq!(bad.code(), Code::InvalidArgument);

        let bad = task
            .request_cargo(Request::new(RequesterInfo {
                app_id: "app1".to_string(),
                lat: 0.0,
                lon: 0.0,
                n_replicas: 0,
            }))
            .await
            .unwrap_err();
        assert_eq!(bad.code(), Code::InvalidArgument);

        for status in [
            cargo.acquire_write_lock(app("ghost")).await.unwrap_err(),
            cargo.release_write_lock(app("ghost")).await.unwrap_err(),
        ] {
            assert_eq!(status.code(), Code::NotFound);
        }
        let status = cargo.get_replica_info(app("ghost")).await.unwrap_err();
        assert_eq!(status.code(), Code::NotFound);
    }

    #[tokio::test]
    async fn test_wait_timeout_from_request() {
        let (cargo, task) = services();
        task.request_cargo(Request::new(RequesterInfo {
            app_id: "app1".to_string(),
            lat: 0.0,
            lon: 0.0,
            n_replicas: 1,
        }))
        .await
        .unwrap();

        assert!(cargo.acquire_write_lock(app("app1")).await.unwrap().into_inner().locked);
        let status = cargo
            .acquire_write_lock(Request::new(AppInfo {
                app_id: "app1".to_string(),
                wait_timeout_ms: 50,
                ..Default::default()
            }))
            .await
            .unwrap_err();
        assert_eq!(status.code(), Code::DeadlineExceeded);

        let released = cargo.release_write_lock(app("app1")).await.unwrap().into_inner();
        assert!(released.released);
        let released = cargo.release_write_lock(app("app1")).await.unwrap().into_inner();
        assert!(!released.released);
    }
}
