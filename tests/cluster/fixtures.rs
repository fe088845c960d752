use std::future::Future;
use std::path::Path;
use std::time::Duration;
use std::time::Instant;

use raft_event_store::config::NodeConfig;
use raft_event_store::Event;
use tracing_subscriber::EnvFilter;

/// Install the test logger once per test binary.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_target(true)
        .with_thread_ids(true)
        .with_level(true)
        .with_ansi(false)
        .with_env_filter(EnvFilter::from_default_env())
        .try_init();
}

/// A node config with short raft timeouts, so that elections finish quickly in tests.
pub fn node_config(port: u16, id: &str, data_dir: &Path, bootstrap: bool) -> anyhow::Result<NodeConfig> {
    let port = format!("--port={}", port);
    let id = format!("--node-id={}", id);
    let data_dir = format!("--data-dir={}", data_dir.display());

    let mut args = vec![
        "raft-event-store",
        port.as_str(),
        id.as_str(),
        data_dir.as_str(),
        "--host=127.0.0.1",
        "--heartbeat-interval=50",
        "--election-timeout-min=150",
        "--election-timeout-max=300",
    ];
    if bootstrap {
        args.push("--bootstrap-cluster");
    }

    Ok(NodeConfig::build(&args)?)
}

pub fn event(value: serde_json::Value) -> Event {
    Event::try_from(value).unwrap()
}

/// Poll `f` until it returns true or `timeout` passes.
pub async fn wait_until<F, Fut>(timeout: Duration, msg: &str, mut f: F) -> anyhow::Result<()>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    let deadline = Instant::now() + timeout;

    loop {
        if f().await {
            return Ok(());
        }
        if Instant::now() > deadline {
            anyhow::bail!("timeout after {:?} waiting for: {}", timeout, msg);
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
}
