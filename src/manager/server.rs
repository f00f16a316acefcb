//! Manager server

use crate::common::{Error, ManagerConfig, Result};
use crate::manager::grpc::{CargoService, TaskService};
use crate::manager::http::create_router;
use crate::manager::service::CargoManager;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio_stream::wrappers::TcpListenerStream;

pub struct Manager {
    manager: Arc<CargoManager>,
}

impl Manager {
    pub fn new(config: ManagerConfig) -> Result<Self> {
        let manager = Arc::new(CargoManager::new(config)?);
        Ok(Self { manager })
    }

    /// Shared state, for embedding and tests
    pub fn state(&self) -> Arc<CargoManager> {
        self.manager.clone()
    }

    /// Bind the configured address and serve until Ctrl-C.
    pub async fn serve(self) -> Result<()> {
        let addr = self.manager.config().grpc_addr()?;
        let listener = bind(addr).await?;
        self.serve_with_listener(listener, async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!("Failed to listen for shutdown signal: {}", e);
                std::future::pending::<()>().await;
            }
            tracing::info!("Shutdown signal received");
        })
        .await
    }

    /// Serve both gRPC surfaces on an already bound listener until `shutdown` resolves.
    pub async fn serve_with_listener<F>(self, listener: TcpListener, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()> + Send,
    {
        let config = self.manager.config();
        let local_addr = listener.local_addr()?;
        tracing::info!("Starting cargo manager");
        tracing::info!("  gRPC API: {}", local_addr);
        tracing::info!("  Geohash precision: {}", config.geohash_precision);
        tracing::info!("  Rank order: {:?}", config.rank_order);
        tracing::info!("  Replace policy: {:?}", config.replace_policy);

        let admin_listener = match config.admin_addr {
            Some(addr) => {
                tracing::info!("  HTTP admin API: {}", addr);
                Some(bind(addr).await?)
            }
            None => None,
        };

        let reflection = tonic_reflection::server::Builder::configure()
            .register_encoded_file_descriptor_set(crate::proto::FILE_DESCRIPTOR_SET)
            .build_v1()
            .map_err(|e| Error::Internal(format!("gRPC reflection: {}", e)))?;

        // Fail queued lock waiters before tonic drains in-flight calls.
        let manager = self.manager.clone();
        let shutdown = async move {
            shutdown.await;
            if let Err(e) = manager.locks().close_all() {
                tracing::error!("Failed to close lock table: {}", e);
            }
        };

        let grpc_server = tonic::transport::Server::builder()
            .add_service(reflection)
            .add_service(CargoService::new(self.manager.clone()).into_server())
            .add_service(TaskService::new(self.manager.clone()).into_server())
            .serve_with_incoming_shutdown(TcpListenerStream::new(listener), shutdown);

        tracing::info!("✓ Cargo manager ready");

        match admin_listener {
            Some(admin_listener) => {
                let http_server = axum::serve(admin_listener, create_router(self.manager.clone()));
                tokio::select! {
                    res = grpc_server => res?,
                    res = http_server => {
                        let err = admin_stopped(res);
                        tracing::error!("{}", err);
                        return Err(err);
                    }
                }
            }
            None => grpc_server.await?,
        }

        tracing::info!("Cargo manager stopped");
        Ok(())
    }
}

/// The admin server only returns on failure; either way the manager is down.
fn admin_stopped(res: std::io::Result<()>) -> Error {
    match res {
        Ok(()) => Error::Unavailable("HTTP admin server stopped".into()),
        Err(e) => Error::Unavailable(format!("HTTP admin server failed: {}", e)),
    }
}

async fn bind(addr: SocketAddr) -> Result<TcpListener> {
    TcpListener::bind(addr)
        .await
        .map_err(|e| Error::Unavailable(format!("cannot bind {}: {}", addr, e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_bind_conflict_is_unavailable() {
        let taken = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = taken.local_addr().unwrap();

        let config = ManagerConfig {
            host: "127.0.0.1".to_string(),
            port: addr.port(),
            ..Default::default()
        };
        let result = Manager::new(config).unwrap().serve().await;
        assert!(matches!(result, Err(Error::Unavailable(_))));
    }

    #[test]
    fn test_admin_exit_is_unavailable() {
        let failed = admin_stopped(Err(std::io::Error::other("accept failed")));
        assert!(matches!(failed, Error::Unavailable(ref m) if m.contains("accept failed")));
        assert!(matches!(admin_stopped(Ok(())), Error::Unavailable(_)));
    }

    #[tokio::test]
    async fn test_admin_bind_conflict_is_unavailable() {
        let taken = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let grpc = TcpListener::bind("127.0.0.1:0").await.unwrap();

        let config = ManagerConfig {
            admin_addr: Some(taken.local_addr().unwrap()),
            ..Default::default()
        };
        let result = Manager::new(config)
            .unwrap()
            .serve_with_listener(grpc, std::future::pending())
            .await;
        assert!(matches!(result, Err(Error::Unavailable(_))));
    }

    #[tokio::test]
    async fn test_invalid_config_rejected() {
        let config = ManagerConfig {
            geohash_precision: 99,
            ..Default::default()
        };
        assert!(matches!(Manager::new(config), Err(Error::InvalidConfig(_))));
    }
}
