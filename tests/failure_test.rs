
use mini_dynamo::network::NetworkClient;
use mini_dynamo::store::MemStore;
use mini_dynamo::{DynamoError, Message, Record};
use std::sync::Arc;
use test_utils::{setup_cluster_with_silent, setup_test_cluster, sorted, TEST_TIMEOUT_MS};
use tokio::time::{Duration, Instant};

#[tokio::test]
async fn test_read_survives_stopped_replica() -> Result<(), Box<dyn std::error::Error>> {
    let mut cluster = setup_test_cluster(5).await;

    let key = cluster.find_key(|r| !r.contains(&0));
    cluster.node(0).insert(&key, "v1").await?;

    let replicas = cluster.replica_indices(&key);
    cluster.stop(replicas[0]).await;

    let records = cluster.node(0).read(&key).await?;
    assert_eq!(records, vec![Record::new(key.as_str(), "v1", 1)]);

    Ok(())
}

#[tokio::test]
async fn test_write_skips_stopped_replica() -> Result<(), Box<dyn std::error::Error>> {
    let mut cluster = setup_test_cluster(5).await;

    let key = cluster.find_key(|r| !r.contains(&0));
    let replicas = cluster.replica_indices(&key);
    cluster.stop(replicas[1]).await;

    cluster.node(0).insert(&key, "v1").await?;

    assert_eq!(cluster.local_record(replicas[0], &key).unwrap().value, "v1");
    assert_eq!(cluster.local_record(replicas[1], &key), None);
    assert_eq!(cluster.local_record(replicas[2], &key).unwrap().value, "v1");

    assert_eq!(cluster.node(0).delete(&key).await?, 1);

    Ok(())
}

#[tokio::test]
async fn test_quorum_not_met_with_two_replicas_down() -> Result<(), Box<dyn std::error::Error>> {
    let mut cluster = setup_test_cluster(5).await;

    let key = cluster.find_key(|r| !r.contains(&0));
    cluster.node(0).insert(&key, "v1").await?;

    let replicas = cluster.replica_indices(&key);
    cluster.stop(replicas[0]).await;
    cluster.stop(replicas[2]).await;

    let read = cluster.node(0).read(&key).await;
    assert!(matches!(
        read,
        Err(DynamoError::QuorumNotMet { needed: 2, got: 1 })
    ));

    let write = cluster.node(0).insert(&key, "v2").await;
    assert!(matches!(write, Err(DynamoError::QuorumNotMet { .. })));

    // the surviving replica still applied the write
    assert_eq!(cluster.local_record(replicas[1], &key).unwrap().version, 2);

    Ok(())
}

#[tokio::test]
async fn test_silent_replica_treated_as_failed() -> Result<(), Box<dyn std::error::Error>> {
    let cluster = setup_cluster_with_silent(5, &[2]).await;

    let key = cluster.find_key(|r| r.contains(&2) && !r.contains(&0));

    let started = Instant::now();
    cluster.node(0).insert(&key, "quiet").await?;
    let records = cluster.node(0).read(&key).await?;
    assert!(started.elapsed() < Duration::from_secs(5));

    assert_eq!(records, vec![Record::new(key.as_str(), "quiet", 1)]);

    // global read skips the silent node instead of hanging on it
    let all = cluster.node(0).read("*").await?;
    assert_eq!(all.len(), 1);

    Ok(())
}

#[tokio::test]
async fn test_restarted_node_recovers_its_share() -> Result<(), Box<dyn std::error::Error>> {
    let mut cluster = setup_test_cluster(5).await;
    let victim = 3;

    let keys: Vec<String> = (0..30).map(|i| format!("r{i}")).collect();
    for key in &keys {
        cluster.node(0).insert(key, "before").await?;
    }

    cluster.stop(victim).await;

    // writes the victim misses while down
    let missed = cluster.find_key(|r| r.contains(&victim) && !r.contains(&0));
    cluster.node(0).insert(&missed, "while-down").await?;
    cluster.node(0).insert(&keys[0], "updated").await?;

    cluster.restart(victim).await;

    let expected = cluster.expected_share(victim, 0).await;
    let recovered = sorted(cluster.node(victim).store().get_all()?);
    assert!(!recovered.is_empty());
    assert_eq!(recovered, expected);
    assert!(recovered.iter().any(|r| r.key == missed && r.value == "while-down"));

    Ok(())
}

#[tokio::test]
async fn test_restarted_node_refuses_requests_until_recovered() -> Result<(), Box<dyn std::error::Error>> {
    // the silent member keeps recovery busy for a full request timeout
    let mut cluster = setup_cluster_with_silent(5, &[2]).await;
    let victim = 3;

    let keys = cluster.find_keys(6, |r| r.contains(&victim) && !r.contains(&2));
    for key in &keys {
        cluster.node(0).insert(key, "kept").await?;
    }

    cluster
        .restart_in_background(victim, Arc::new(MemStore::new()), true)
        .await;

    let client = NetworkClient::new(Duration::from_millis(TEST_TIMEOUT_MS));
    let early = client
        .send(
            cluster.endpoint(victim),
            &Message::ReadReq {
                key: keys[0].clone(),
            },
        )
        .await;
    assert!(matches!(early, Err(DynamoError::PeerUnreachable { .. })));

    cluster.wait_until_serving(victim).await;

    // once serving, the node answers "@" with its recovered share
    let local = sorted(cluster.node(victim).read("@").await?);
    assert_eq!(local, cluster.expected_share(victim, 0).await);
    for key in &keys {
        assert!(local.iter().any(|r| &r.key == key && r.value == "kept"));
    }

    Ok(())
}
