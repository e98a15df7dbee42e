//! Coordination server lifecycle specs

use crate::prelude::*;
use mx_daemon::ServerError;

#[tokio::test]
async fn second_open_fails() {
    let mut cluster = Cluster::start().await;

    let err = cluster.server.open().await.unwrap_err();
    assert!(matches!(err, ServerError::AlreadyOpen(_)));
    assert!(cluster.server.is_open());

    cluster.stop().await;
}

#[tokio::test]
async fn close_without_connections_succeeds() {
    let cluster = Cluster::start().await;
    let endpoint = cluster.endpoint.clone();

    cluster.stop().await;

    assert!(MutexClient::connect(&endpoint).await.is_err());
}

#[tokio::test]
async fn close_releases_every_lock() {
    let mut cluster = Cluster::start().await;
    let a = cluster.worker().await;
    let b = Arc::new(cluster.worker().await);

    a.lock("x").await.unwrap();
    a.set_value("x", Some(json!("a"))).await.unwrap();
    b.lock("y").await.unwrap();
    let pending = {
        let b = Arc::clone(&b);
        tokio::spawn(async move { b.lock("x").await })
    };
    eventually(|| cluster.registry().waiters("x").len() == 1).await;

    cluster.server.close().await.unwrap();

    assert!(cluster.registry().is_empty());
    assert_eq!(cluster.registry().get_value("x"), None);
    assert!(matches!(
        pending.await.unwrap(),
        Err(ClientError::ConnectionClosed)
    ));
    assert!(matches!(a.ping().await, Err(ClientError::ConnectionClosed)));
}
