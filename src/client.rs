use reqwest::Method;
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::network::api::EventAppended;
use crate::network::error::ErrorOutput;
use crate::network::management::Empty;
use crate::node::NodeInfo;
use crate::node::NodeRef;
use crate::typ::RaftMetrics;
use crate::Event;
use crate::Node;

#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error(transparent)]
    Http(#[from] reqwest::Error),

    /// The node answered with an error status.
    #[error("{}: {}", .0.status_code, .0.message)]
    Api(ErrorOutput),
}

impl ClientError {
    /// The error body if the node answered with an error status.
    pub fn output(&self) -> Option<&ErrorOutput> {
        match self {
            ClientError::Api(output) => Some(output),
            ClientError::Http(_) => None,
        }
    }
}

/// A client of one node's HTTP API.
///
/// It does not follow leader redirects: a 403 is returned as [`ClientError::Api`], carrying the
/// leader's id and address.
pub struct EventStoreClient {
    /// `host:port` of the node to talk to.
    pub addr: String,

    pub inner: reqwest::Client,
}

impl EventStoreClient {
    pub fn new(addr: impl ToString) -> Self {
        Self {
            addr: addr.to_string(),
            inner: reqwest::Client::new(),
        }
    }

    // --- Application API

    /// Append an event; returns once it is committed.
    pub async fn submit_event(&self, event: &Event) -> Result<EventAppended, ClientError> {
        self.send(Method::POST, "events", Some(event)).await
    }

    /// The events applied on the node, in log order.
    pub async fn events(&self) -> Result<Vec<Event>, ClientError> {
        self.send(Method::GET, "events", None::<&()>).await
    }

    // --- Cluster management API

    pub async fn nodes(&self) -> Result<Vec<NodeInfo>, ClientError> {
        self.send(Method::GET, "nodes", None::<&()>).await
    }

    /// Add a voter through the node, which has to be the leader.
    pub async fn add_node(&self, node: &Node) -> Result<Vec<NodeInfo>, ClientError> {
        self.send(Method::POST, "nodes", Some(node)).await
    }

    /// Remove a node through the node, which has to be the leader.
    pub async fn remove_node(&self, id: &str) -> Result<Vec<NodeInfo>, ClientError> {
        let req = NodeRef { id: id.to_string() };
        self.send(Method::DELETE, "nodes", Some(&req)).await
    }

    pub async fn metrics(&self) -> Result<RaftMetrics, ClientError> {
        self.send(Method::GET, "metrics", None::<&()>).await
    }

    /// Ask the node to build a snapshot now.
    pub async fn snapshot(&self) -> Result<(), ClientError> {
        let _: Empty = self.send(Method::POST, "snapshot", None::<&()>).await?;
        Ok(())
    }

    // --- Internal methods

    async fn send<Req, Resp>(&self, method: Method, uri: &str, req: Option<&Req>) -> Result<Resp, ClientError>
    where
        Req: Serialize + ?Sized,
        Resp: DeserializeOwned,
    {
        let url = format!("http://{}/{}", self.addr, uri);
        tracing::debug!(">>> client send {} request to {}", method, url);

        let mut builder = self.inner.request(method, url.clone());
        if let Some(r) = req {
            builder = builder.json(r);
        }

        let resp = builder.send().await?;
        let status = resp.status();
        tracing::debug!("<<< client recv {} from {}", status, url);

        if status.is_success() {
            Ok(resp.json().await?)
        } else {
            let output: ErrorOutput = resp.json().await?;
            Err(ClientError::Api(output))
        }
    }
}
