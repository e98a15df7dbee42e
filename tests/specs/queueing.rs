//! Blocking acquisition and disconnect cleanup specs

use crate::prelude::*;
use mx_core::ConnectionId;

#[tokio::test]
async fn waiters_are_granted_in_arrival_order() {
    let cluster = Cluster::start().await;
    let a = cluster.worker().await;
    let b = Arc::new(cluster.worker().await);
    let c = Arc::new(cluster.worker().await);

    a.lock("x").await.unwrap();

    let b_wait = {
        let b = Arc::clone(&b);
        tokio::spawn(async move { b.lock("x").await })
    };
    eventually(|| cluster.registry().waiters("x").len() == 1).await;

    let c_wait = {
        let c = Arc::clone(&c);
        tokio::spawn(async move { c.lock("x").await })
    };
    eventually(|| cluster.registry().waiters("x").len() == 2).await;

    a.unlock("x").await.unwrap();
    b_wait.await.unwrap().unwrap();
    assert_eq!(cluster.registry().holder("x"), Some(ConnectionId(2)));
    assert!(!c_wait.is_finished());

    b.unlock("x").await.unwrap();
    c_wait.await.unwrap().unwrap();
    assert_eq!(cluster.registry().holder("x"), Some(ConnectionId(3)));

    cluster.stop().await;
}

#[tokio::test]
async fn disconnect_releases_held_keys_and_abandons_waits() {
    let cluster = Cluster::start().await;
    let m_owner = cluster.worker().await;
    let x = Arc::new(cluster.worker().await);
    let k_waiter = Arc::new(cluster.worker().await);

    m_owner.lock("M").await.unwrap();
    x.lock("K").await.unwrap();
    x.set_value("K", Some(json!("from x"))).await.unwrap();

    let x_wait = {
        let x = Arc::clone(&x);
        tokio::spawn(async move { x.lock("M").await })
    };
    let k_wait = {
        let k_waiter = Arc::clone(&k_waiter);
        tokio::spawn(async move { k_waiter.lock("K").await })
    };
    eventually(|| {
        cluster.registry().waiters("M").len() == 1 && cluster.registry().waiters("K").len() == 1
    })
    .await;

    // Drop every handle on x so its connection goes away mid-wait
    x_wait.abort();
    let _ = x_wait.await;
    drop(x);

    k_wait.await.unwrap().unwrap();
    assert_eq!(cluster.registry().holder("K"), Some(ConnectionId(3)));
    assert_eq!(k_waiter.get_value("K").await.unwrap(), None);

    eventually(|| cluster.registry().waiters("M").is_empty()).await;
    assert_eq!(cluster.registry().holder("M"), Some(ConnectionId(1)));

    // M is released to nobody once its owner unlocks
    m_owner.unlock("M").await.unwrap();
    assert_eq!(cluster.registry().holder("M"), None);

    cluster.stop().await;
}

#[tokio::test]
async fn misuse_by_non_holder_changes_nothing() {
    let cluster = Cluster::start().await;
    let holder = cluster.worker().await;
    let other = cluster.worker().await;

    holder.lock("x").await.unwrap();
    holder.set_value("x", Some(json!(1))).await.unwrap();

    assert!(matches!(other.unlock("x").await, Err(ClientError::NotHolder(_))));
    assert!(matches!(
        other.set_value("x", Some(json!(2))).await,
        Err(ClientError::NotHolder(_))
    ));
    assert!(matches!(other.unlock("free").await, Err(ClientError::NotHolder(_))));

    assert_eq!(cluster.registry().holder("x"), Some(ConnectionId(1)));
    assert_eq!(other.get_value("x").await.unwrap(), Some(json!(1)));
    assert!(cluster.registry().holder("free").is_none());

    cluster.stop().await;
}
