use std::time::Duration;

use actix_web::http::header;
use actix_web::http::StatusCode;
use actix_web::test;
use actix_web::web::Data;
use maplit::btreeset;
use openraft::ChangeMembers;
use openraft::ServerState;
use raft_event_store::app::App;
use raft_event_store::network;
use raft_event_store::network::api::EventAppended;
use raft_event_store::network::error::ErrorOutput;
use raft_event_store::node::NodeInfo;
use raft_event_store::node::NodeRole;
use raft_event_store::Node;
use serde_json::json;

use crate::fixtures::event;
use crate::fixtures::init_tracing;
use crate::fixtures::node_config;

async fn open_leader(port: u16, dir: &std::path::Path) -> anyhow::Result<Data<App>> {
    let app = App::open(&node_config(port, "n1", dir, true)?).await?;

    app.raft
        .wait(Some(Duration::from_secs(10)))
        .state(ServerState::Leader, "bootstrapped node becomes leader")
        .await?;

    Ok(Data::new(app))
}

/// A bootstrapped single node commits an event and its snapshot holds exactly that event.
#[actix_web::test]
async fn test_submit_event() -> anyhow::Result<()> {
    init_tracing();
    let dir = tempfile::tempdir()?;
    let app = open_leader(23001, dir.path()).await?;

    let srv = test::init_service(actix_web::App::new().app_data(app.clone()).configure(network::configure)).await;

    let req = test::TestRequest::post().uri("/events").set_json(json!({"player": "A", "points": 10})).to_request();
    let resp = test::call_service(&srv, req).await;
    assert_eq!(StatusCode::OK, resp.status());

    let appended: EventAppended = test::read_body_json(resp).await;
    assert_eq!(0, appended.position);

    let snapshot = app.fsm.snapshot();
    assert_eq!(vec![event(json!({"player": "A", "points": 10}))], snapshot.events().to_vec());

    let req = test::TestRequest::get().uri("/events").to_request();
    let events: Vec<serde_json::Value> = test::call_and_read_body_json(&srv, req).await;
    assert_eq!(vec![json!({"player": "A", "points": 10})], events);

    app.raft.shutdown().await?;
    Ok(())
}

#[actix_web::test]
async fn test_malformed_body() -> anyhow::Result<()> {
    init_tracing();
    let dir = tempfile::tempdir()?;
    let app = open_leader(23002, dir.path()).await?;

    let srv = test::init_service(actix_web::App::new().app_data(app.clone()).configure(network::configure)).await;

    for (uri, body) in [
        ("/events", r#"[1,2,3]"#),
        ("/events", r#"{"player":"#),
        ("/nodes", r#"{"id":"n2"}"#),
        ("/nodes", r#"{"id":"","address":"127.0.0.1:9999"}"#),
    ] {
        let req = test::TestRequest::post()
            .uri(uri)
            .insert_header((header::CONTENT_TYPE, "application/json"))
            .set_payload(body)
            .to_request();
        let resp = test::call_service(&srv, req).await;
        assert_eq!(StatusCode::BAD_REQUEST, resp.status(), "POST {} {}", uri, body);

        let output: ErrorOutput = test::read_body_json(resp).await;
        assert_eq!(400, output.status_code);
    }

    assert!(app.fsm.is_empty());

    app.raft.shutdown().await?;
    Ok(())
}

/// Adding a node that does not accept connections fails and leaves the membership untouched.
#[actix_web::test]
async fn test_add_unreachable_node() -> anyhow::Result<()> {
    init_tracing();
    let dir = tempfile::tempdir()?;
    let app = open_leader(23003, dir.path()).await?;

    let closed_addr = {
        let listener = std::net::TcpListener::bind("127.0.0.1:0")?;
        listener.local_addr()?.to_string()
    };

    let srv = test::init_service(actix_web::App::new().app_data(app.clone()).configure(network::configure)).await;

    let req = test::TestRequest::post().uri("/nodes").set_json(json!({"id": "n2", "address": closed_addr})).to_request();
    let resp = test::call_service(&srv, req).await;
    assert_eq!(StatusCode::INTERNAL_SERVER_ERROR, resp.status());

    let output: ErrorOutput = test::read_body_json(resp).await;
    assert!(output.message.contains("unreachable"), "{}", output.message);

    let req = test::TestRequest::get().uri("/nodes").to_request();
    let nodes: Vec<NodeInfo> = test::call_and_read_body_json(&srv, req).await;
    assert_eq!(
        vec![NodeInfo {
            id: "n1".to_string(),
            address: "127.0.0.1:23003".to_string(),
            role: NodeRole::Voter,
        }],
        nodes
    );

    let req = test::TestRequest::delete().uri("/nodes").set_json(json!({"id": "n9"})).to_request();
    let resp = test::call_service(&srv, req).await;
    assert_eq!(StatusCode::INTERNAL_SERVER_ERROR, resp.status());

    app.raft.shutdown().await?;
    Ok(())
}

/// A node that is not the leader refuses every write with 403 and changes nothing.
#[actix_web::test]
async fn test_writes_to_non_leader() -> anyhow::Result<()> {
    init_tracing();
    let dir = tempfile::tempdir()?;
    let app = Data::new(App::open(&node_config(23004, "n1", dir.path(), false)?).await?);

    let srv = test::init_service(actix_web::App::new().app_data(app.clone()).configure(network::configure)).await;

    let requests = vec![
        test::TestRequest::post().uri("/events").set_json(json!({"player": "A", "points": 10})),
        test::TestRequest::post().uri("/nodes").set_json(json!({"id": "n2", "address": "127.0.0.1:23005"})),
        test::TestRequest::delete().uri("/nodes").set_json(json!({"id": "n2"})),
    ];

    for req in requests {
        let resp = test::call_service(&srv, req.to_request()).await;
        assert_eq!(StatusCode::FORBIDDEN, resp.status());

        let output: ErrorOutput = test::read_body_json(resp).await;
        assert_eq!(403, output.status_code);
        assert!(output.message.contains("only leaders can accept this request"), "{}", output.message);
    }

    assert!(app.fsm.is_empty());
    assert!(app.cluster.list_nodes().is_empty());

    app.raft.shutdown().await?;
    Ok(())
}

/// Events survive a restart through the snapshot on disk.
#[actix_web::test]
async fn test_restore_from_snapshot() -> anyhow::Result<()> {
    init_tracing();
    let dir = tempfile::tempdir()?;
    let app = open_leader(23006, dir.path()).await?;

    let srv = test::init_service(actix_web::App::new().app_data(app.clone()).configure(network::configure)).await;

    let mut last = None;
    for points in [10, 3, 7] {
        let req = test::TestRequest::post().uri("/events").set_json(json!({"player": "B", "points": points})).to_request();
        let appended: EventAppended = test::call_and_read_body_json(&srv, req).await;
        last = Some(appended.log_index);
    }

    let req = test::TestRequest::post().uri("/snapshot").to_request();
    let resp = test::call_service(&srv, req).await;
    assert_eq!(StatusCode::OK, resp.status());

    app.raft
        .wait(Some(Duration::from_secs(10)))
        .metrics(|m| m.snapshot.map(|x| x.index) >= last, "snapshot is built")
        .await?;

    let events = app.fsm.events();
    app.raft.shutdown().await?;
    drop(srv);
    drop(app);

    let reopened = App::open(&node_config(23006, "n1", dir.path(), false)?).await?;
    assert_eq!(events, reopened.fsm.events());
    assert_eq!(3, reopened.fsm.len());

    reopened.raft.shutdown().await?;
    Ok(())
}

/// Committed events and the vote survive a restart without any snapshot, even with the bootstrap
/// flag still set.
#[actix_web::test]
async fn test_restart_replays_committed_log() -> anyhow::Result<()> {
    init_tracing();
    let dir = tempfile::tempdir()?;
    let app = open_leader(23008, dir.path()).await?;

    let srv = test::init_service(actix_web::App::new().app_data(app.clone()).configure(network::configure)).await;

    let req = test::TestRequest::post().uri("/events").set_json(json!({"player": "A", "points": 10})).to_request();
    let appended: EventAppended = test::call_and_read_body_json(&srv, req).await;
    assert_eq!(0, appended.position);

    let term = app.raft.metrics().borrow().current_term;
    assert!(app.raft.metrics().borrow().snapshot.is_none());

    app.raft.shutdown().await?;
    drop(srv);
    drop(app);

    let reopened = open_leader(23008, dir.path()).await?;
    reopened
        .raft
        .wait(Some(Duration::from_secs(10)))
        .applied_index_at_least(Some(appended.log_index), "committed log is applied again")
        .await?;

    assert_eq!(vec![event(json!({"player": "A", "points": 10}))], reopened.fsm.events());

    let metrics = reopened.raft.metrics().borrow().clone();
    assert!(metrics.snapshot.is_none());
    assert!(metrics.current_term > term, "a new term is elected, not a new cluster bootstrapped");
    assert_eq!(vec![btreeset! {reopened.id}], metrics.membership_config.membership().get_joint_config().clone());

    reopened.raft.shutdown().await?;
    Ok(())
}

/// A leader that can not reach a quorum gives up on an event after the proposal timeout.
#[actix_web::test]
async fn test_propose_timeout() -> anyhow::Result<()> {
    init_tracing();
    let dir = tempfile::tempdir()?;

    let mut config = node_config(23007, "n1", dir.path(), true)?;
    config.propose_timeout_ms = Some(300);

    let app = App::open(&config).await?;
    app.raft
        .wait(Some(Duration::from_secs(10)))
        .state(ServerState::Leader, "bootstrapped node becomes leader")
        .await?;
    let app = Data::new(app);

    let closed_addr = {
        let listener = std::net::TcpListener::bind("127.0.0.1:0")?;
        listener.local_addr()?.to_string()
    };

    // Make a voter out of a node that never answers: the joint config needs it for a quorum.
    let n2 = Node::new("n2", closed_addr);
    let n2_id = n2.node_id();
    app.raft.add_learner(n2_id, n2, false).await?;

    let raft = app.raft.clone();
    tokio::spawn(async move { raft.change_membership(ChangeMembers::AddVoterIds(btreeset! {n2_id}), false).await });

    app.raft
        .wait(Some(Duration::from_secs(10)))
        .metrics(
            |m| m.membership_config.membership().get_joint_config().iter().any(|voters| voters.contains(&n2_id)),
            "n2 is a voter",
        )
        .await?;

    let srv = test::init_service(actix_web::App::new().app_data(app.clone()).configure(network::configure)).await;

    let req = test::TestRequest::post().uri("/events").set_json(json!({"player": "A", "points": 10})).to_request();
    let resp = test::call_service(&srv, req).await;
    assert_eq!(StatusCode::GATEWAY_TIMEOUT, resp.status());

    let output: ErrorOutput = test::read_body_json(resp).await;
    assert_eq!(504, output.status_code);
    assert!(output.message.contains("not committed within"), "{}", output.message);

    assert!(app.fsm.is_empty());

    app.raft.shutdown().await?;
    Ok(())
}
