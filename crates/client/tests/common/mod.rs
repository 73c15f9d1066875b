//! In-memory socket for exercising the connection manager without a server.

#![allow(dead_code)]

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use futures_channel::mpsc::{unbounded, UnboundedReceiver, UnboundedSender};
use futures_util::StreamExt;
use jobfair_client::{
    handler, ClientConfig, ClientEvent, Connector, Transport, TransportError, WsClient,
};
use jobfair_shared::EventKind;
use serde_json::Value;
use tokio::time::Instant;
use url::Url;

pub const TEST_URL: &str = "ws://fair.test/ws/notifications/";

/// Server end of one accepted in-memory connection.
pub struct ServerSide {
    pub url: Url,
    to_client: UnboundedSender<Result<String, TransportError>>,
    from_client: UnboundedReceiver<String>,
}

impl ServerSide {
    pub fn push(&self, frame: Value) {
        self.push_text(&frame.to_string());
    }

    pub fn push_text(&self, text: &str) {
        let _ = self.to_client.unbounded_send(Ok(text.to_string()));
    }

    pub fn fail(&self, reason: &str) {
        let _ = self
            .to_client
            .unbounded_send(Err(TransportError::Other(reason.to_string())));
    }

    /// Next frame written by the client; `None` once the client closed.
    pub async fn recv(&mut self) -> Option<String> {
        tokio::time::timeout(Duration::from_secs(5), self.from_client.next())
            .await
            .ok()
            .flatten()
    }

    /// Close from the server side.
    pub fn close(self) {}

    pub fn token(&self) -> Option<String> {
        query_value(&self.url, "token")
    }

    pub fn company_token(&self) -> Option<String> {
        query_value(&self.url, "company_token")
    }
}

pub fn query_value(url: &Url, key: &str) -> Option<String> {
    url.query_pairs()
        .find(|(k, _)| k == key)
        .map(|(_, v)| v.into_owned())
}

#[derive(Default)]
struct Script {
    attempts: Vec<(Url, Instant)>,
    failures_left: usize,
    refuse_all: bool,
}

/// Connector handing every accepted connection to the test.
#[derive(Clone)]
pub struct MemoryConnector {
    script: Arc<Mutex<Script>>,
    accepted: UnboundedSender<ServerSide>,
}

/// Test-side queue of accepted connections.
pub struct Accepted {
    rx: UnboundedReceiver<ServerSide>,
}

impl Accepted {
    pub async fn next(&mut self) -> ServerSide {
        tokio::time::timeout(Duration::from_secs(120), self.rx.next())
            .await
            .expect("no connection within timeout")
            .expect("connector dropped")
    }

    /// A connection accepted without waiting, if any.
    pub fn try_next(&mut self) -> Option<ServerSide> {
        self.rx.try_next().ok().flatten()
    }
}

impl MemoryConnector {
    pub fn new() -> (Self, Accepted) {
        let (accepted, rx) = unbounded();
        (
            Self {
                script: Arc::default(),
                accepted,
            },
            Accepted { rx },
        )
    }

    pub fn fail_next(&self, n: usize) {
        self.script.lock().unwrap().failures_left = n;
    }

    pub fn refuse_all(&self, refuse: bool) {
        self.script.lock().unwrap().refuse_all = refuse;
    }

    pub fn attempt_count(&self) -> usize {
        self.script.lock().unwrap().attempts.len()
    }

    pub fn attempt_times(&self) -> Vec<Instant> {
        self.script
            .lock()
            .unwrap()
            .attempts
            .iter()
            .map(|(_, at)| *at)
            .collect()
    }

    pub fn attempt_urls(&self) -> Vec<Url> {
        self.script
            .lock()
            .unwrap()
            .attempts
            .iter()
            .map(|(url, _)| url.clone())
            .collect()
    }
}

#[async_trait]
impl Connector for MemoryConnector {
    async fn connect(&self, url: &Url) -> Result<Transport, TransportError> {
        {
            let mut script = self.script.lock().unwrap();
            script.attempts.push((url.clone(), Instant::now()));
            if script.refuse_all {
                return Err(TransportError::Refused("memory server is down".to_string()));
            }
            if script.failures_left > 0 {
                script.failures_left -= 1;
                return Err(TransportError::Refused("memory server is down".to_string()));
            }
        }

        let (outbound, from_client) = unbounded();
        let (to_client, inbound) = unbounded();
        let _ = self.accepted.unbounded_send(ServerSide {
            url: url.clone(),
            to_client,
            from_client,
        });

        Ok(Transport {
            outbound,
            inbound: inbound.boxed(),
        })
    }
}

pub fn test_config() -> ClientConfig {
    ClientConfig::new(Url::parse(TEST_URL).unwrap())
}

pub fn client() -> (WsClient, MemoryConnector, Accepted) {
    let (connector, accepted) = MemoryConnector::new();
    let client = WsClient::new(test_config(), connector.clone()).unwrap();
    (client, connector, accepted)
}

/// Forward every event delivered to `kind` into a channel.
pub fn record(
    client: &WsClient,
    kind: EventKind,
) -> tokio::sync::mpsc::UnboundedReceiver<ClientEvent> {
    let (tx, rx) = tokio::sync::mpsc::unbounded_channel();
    client.on(
        kind,
        handler(move |event: &ClientEvent| {
            let _ = tx.send(event.clone());
            Ok(())
        }),
    );
    rx
}

/// Wait until the client reaches `state`.
pub async fn wait_for_state(client: &WsClient, state: jobfair_client::ConnectionState) {
    let mut rx = client.watch_state();
    tokio::time::timeout(Duration::from_secs(120), rx.wait_for(|s| *s == state))
        .await
        .unwrap_or_else(|_| panic!("timed out waiting for {state:?}, at {:?}", client.state()))
        .expect("state channel closed");
}

/// Let spawned tasks run until they are all idle.
pub async fn settle() {
    for _ in 0..20 {
        tokio::task::yield_now().await;
    }
}

/// Drain whatever the channel holds right now.
pub fn drain<T>(rx: &mut tokio::sync::mpsc::UnboundedReceiver<T>) -> Vec<T> {
    let mut out = Vec::new();
    while let Ok(item) = rx.try_recv() {
        out.push(item);
    }
    out
}
