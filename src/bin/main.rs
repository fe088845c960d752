use clap::Parser;
use raft_event_store::config::NodeConfig;
use raft_event_store::error::StartError;
use raft_event_store::start_event_node;
use tracing_subscriber::EnvFilter;

#[actix_web::main]
async fn main() -> Result<(), StartError> {
    // Setup the logger
    tracing_subscriber::fmt()
        .with_target(true)
        .with_thread_ids(true)
        .with_level(true)
        .with_ansi(false)
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    // Parse the parameters passed by arguments or the environment.
    let config = NodeConfig::parse();

    start_event_node(config).await
}
