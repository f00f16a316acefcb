//! Manager status after traffic over gRPC
use cargomgr::common::{RankOrder, ReplacePolicy};
use cargomgr::{Manager, ManagerClient, ManagerConfig};
use tokio::net::TcpListener;

#[tokio::test]
async fn test_admin_status() {
    let config = ManagerConfig {
        rank_order: RankOrder::Legacy,
        replace_policy: ReplacePolicy::Replace,
        ..Default::default()
    };
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let manager = Manager::new(config).unwrap();
    let state = manager.state();
    tokio::spawn(manager.serve_with_listener(listener, std::future::pending()));

    let mut client = ManagerClient::connect(format!("http://{}", addr))
        .await
        .unwrap();
    for (i, (lat, lon)) in [(35.6762, 139.6503), (34.6937, 135.5023), (51.5074, -0.1278)]
        .into_iter()
        .enumerate()
    {
        client
            .register(format!("10.0.0.{}", i + 1), 9000, lat, lon, 50.0)
            .await
            .unwrap();
    }
    // Legacy order hands out the farthest node first
    let cargos = client
        .request_cargo("tokyo".into(), 35.6762, 139.6503, 1)
        .await
        .unwrap();
    assert_eq!(cargos.ips, vec!["10.0.0.3"]);
    client.acquire_write_lock("tokyo".into(), None).await.unwrap();

    // Replace policy lets a new request through despite the held lock
    client
        .request_cargo("tokyo".into(), 35.6762, 139.6503, 2)
        .await
        .unwrap();

    let status = state.status().unwrap();
    assert_eq!(status.cargos, 3);
    assert_eq!(status.applications, 1);
    assert_eq!(status.locked_applications, 0);
    assert_eq!(status.rank_order, RankOrder::Legacy);
    assert_eq!(state.application("tokyo").unwrap().replicas.len(), 2);
}
