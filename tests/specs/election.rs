//! Update-master election specs

use crate::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct Controller {
    host: String,
    port: u16,
}

#[tokio::test]
async fn racing_workers_elect_one_master_and_fail_over() {
    let cluster = Cluster::start().await;
    let a = cluster.worker().await;
    let b = cluster.worker().await;
    let c = cluster.worker().await;

    let (won_a, won_b) = tokio::join!(a.try_lock("master"), b.try_lock("master"));
    let (won_a, won_b) = (won_a.unwrap(), won_b.unwrap());
    assert!(won_a ^ won_b, "exactly one worker wins");

    let (winner, loser) = if won_a { (a, b) } else { (b, a) };
    winner
        .set_value("master", Some(json!({"host": "10.0.0.1", "port": 37001})))
        .await
        .unwrap();

    assert_eq!(
        c.get_value("master").await.unwrap(),
        Some(json!({"host": "10.0.0.1", "port": 37001}))
    );
    assert!(!loser.try_lock("master").await.unwrap());

    winner.close().await.unwrap();
    eventually(|| cluster.registry().holder("master").is_none()).await;

    assert_eq!(c.get_value("master").await.unwrap(), None);
    assert!(c.try_lock("master").await.unwrap());

    cluster.stop().await;
}

#[tokio::test]
async fn election_helpers_publish_and_hand_over_the_controller() {
    let cluster = Cluster::start().await;
    let first = cluster.worker().await;
    let second = Arc::new(cluster.worker().await);
    let observer = cluster.worker().await;

    let primary = Controller {
        host: "10.0.0.1".to_string(),
        port: 37001,
    };
    let standby = Controller {
        host: "10.0.0.2".to_string(),
        port: 37001,
    };

    assert_eq!(
        elect(&first, UPDATE_MASTER_KEY, &primary).await.unwrap(),
        Election::Master
    );
    assert_eq!(
        elect(&second, UPDATE_MASTER_KEY, &standby).await.unwrap(),
        Election::Follower
    );

    let found: Option<Controller> = locate(&observer, UPDATE_MASTER_KEY).await.unwrap();
    assert_eq!(found, Some(primary));

    let takeover = {
        let second = Arc::clone(&second);
        let standby = standby.clone();
        tokio::spawn(async move { campaign(&second, UPDATE_MASTER_KEY, &standby).await })
    };
    first.close().await.unwrap();

    tokio::time::timeout(Duration::from_secs(5), takeover)
        .await
        .expect("standby takes over")
        .unwrap()
        .unwrap();

    let found: Option<Controller> = locate(&observer, UPDATE_MASTER_KEY).await.unwrap();
    assert_eq!(found, Some(standby));

    cluster.stop().await;
}
