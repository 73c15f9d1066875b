//! Socket transport behind the connection manager.
//!
//! A [`Connector`] opens one socket and hands back a [`Transport`]: a channel
//! for outbound text frames and a stream of inbound text frames. Dropping the
//! outbound sender closes the socket.

use async_trait::async_trait;
use futures_channel::mpsc::{unbounded, UnboundedSender};
use futures_util::stream::BoxStream;
use futures_util::{SinkExt, StreamExt};
use tokio_tungstenite::{connect_async, tungstenite::Message};
use url::Url;

use crate::error::TransportError;

/// An open socket, split into its two directions.
pub struct Transport {
    /// Text frames to write. Dropping every clone of this closes the socket.
    pub outbound: UnboundedSender<String>,
    /// Text frames as they arrive. Ends when the peer closes.
    pub inbound: BoxStream<'static, Result<String, TransportError>>,
}

/// Opens sockets for the connection manager.
#[async_trait]
pub trait Connector: Send + Sync + 'static {
    async fn connect(&self, url: &Url) -> Result<Transport, TransportError>;
}

/// Native connector using tokio-tungstenite.
#[derive(Debug, Clone, Default)]
pub struct TungsteniteConnector;

#[async_trait]
impl Connector for TungsteniteConnector {
    async fn connect(&self, url: &Url) -> Result<Transport, TransportError> {
        let (ws_stream, _response) = connect_async(url.as_str()).await?;
        let (mut write, read) = ws_stream.split();

        let (outbound, mut outbound_rx) = unbounded::<String>();

        // Write task: forwards queued frames, closes the socket once every
        // sender is gone.
        tokio::spawn(async move {
            while let Some(text) = outbound_rx.next().await {
                if let Err(e) = write.send(Message::text(text)).await {
                    crate::log_error!("Send failed: {}", e);
                    break;
                }
            }
            let _ = write.close().await;
            crate::log_debug!("Write task finished");
        });

        let inbound = read
            .filter_map(|msg| async move {
                match msg {
                    Ok(Message::Text(text)) => Some(Ok(text.as_str().to_string())),
                    Ok(Message::Close(frame)) => {
                        crate::log_info!("Received close frame: {:?}", frame);
                        None
                    }
                    Ok(Message::Ping(data)) => {
                        // Pong is handled automatically by tungstenite
                        crate::log_debug!("Received ping: {:?}", data);
                        None
                    }
                    // Binary and pong frames carry nothing for us.
                    Ok(_) => None,
                    Err(e) => Some(Err(TransportError::from(e))),
                }
            })
            .boxed();

        Ok(Transport { outbound, inbound })
    }
}
