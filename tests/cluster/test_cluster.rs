use std::thread;
use std::time::Duration;

use maplit::btreeset;
use openraft::ServerState;
use raft_event_store::client::EventStoreClient;
use raft_event_store::config::NodeConfig;
use raft_event_store::node::NodeRole;
use raft_event_store::start_event_node;
use raft_event_store::Node;
use serde_json::json;
use tokio::runtime::Runtime;

use crate::fixtures::event;
use crate::fixtures::init_tracing;
use crate::fixtures::node_config;
use crate::fixtures::wait_until;

fn spawn_node(config: NodeConfig) {
    thread::spawn(move || {
        let rt = Runtime::new().unwrap();
        let x = rt.block_on(start_event_node(config));
        println!("node exited: {:?}", x);
    });
}

/// Grow a cluster from one bootstrapped node to two, replicate an event, and shrink it back.
#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn test_cluster() -> anyhow::Result<()> {
    init_tracing();

    let dir1 = tempfile::tempdir()?;
    let dir2 = tempfile::tempdir()?;

    let addr1 = "127.0.0.1:22001";
    let addr2 = "127.0.0.1:22002";

    // --- Start 2 nodes in 2 threads; only n1 bootstraps a cluster.

    spawn_node(node_config(22001, "n1", dir1.path(), true)?);
    spawn_node(node_config(22002, "n2", dir2.path(), false)?);

    let client1 = &EventStoreClient::new(addr1);
    let client2 = &EventStoreClient::new(addr2);

    wait_until(Duration::from_secs(10), "n1 becomes leader", move || async move {
        matches!(client1.metrics().await, Ok(m) if m.state == ServerState::Leader)
    })
    .await?;

    println!("=== add n2");
    let nodes = client1.add_node(&Node::new("n2", addr2)).await?;

    let members = nodes.iter().map(|n| (n.id.as_str(), n.address.as_str(), n.role)).collect::<Vec<_>>();
    assert_eq!(
        vec![("n1", addr1, NodeRole::Voter), ("n2", addr2, NodeRole::Voter)],
        members
    );

    println!("=== write an event to the leader");
    let appended = client1.submit_event(&event(json!({"player": "A", "points": 10}))).await?;
    assert_eq!(0, appended.position);

    println!("=== the event is replicated to n2");
    wait_until(Duration::from_secs(10), "n2 applies the event", move || async move {
        matches!(client2.events().await, Ok(events) if events == vec![event(json!({"player": "A", "points": 10}))])
    })
    .await?;

    let metrics = client2.metrics().await?;
    assert_eq!(
        &vec![btreeset! {Node::new("n1", addr1).node_id(), Node::new("n2", addr2).node_id()}],
        metrics.membership_config.membership().get_joint_config()
    );

    println!("=== a write to the follower is refused with the leader's address");
    let err = client2.submit_event(&event(json!({"player": "B", "points": 3}))).await.unwrap_err();
    let output = err.output().unwrap();
    assert_eq!(403, output.status_code);
    assert_eq!(Some("n1".to_string()), output.leader_id);
    assert_eq!(Some(addr1.to_string()), output.leader_address);

    let err = client2.add_node(&Node::new("n3", "127.0.0.1:22003")).await.unwrap_err();
    assert_eq!(403, err.output().unwrap().status_code);

    assert_eq!(1, client2.events().await?.len());

    println!("=== remove n2");
    let nodes = client1.remove_node("n2").await?;
    assert_eq!(vec!["n1"], nodes.iter().map(|n| n.id.as_str()).collect::<Vec<_>>());

    println!("=== the single node cluster still commits");
    let appended = client1.submit_event(&event(json!({"player": "B", "points": 3}))).await?;
    assert_eq!(1, appended.position);

    Ok(())
}
