//! Websocket transport seam
//!
//! The manager only needs "open a URL" and "give me the next frame";
//! `WsConnector` provides that over tokio-tungstenite.

use async_trait::async_trait;
use futures_util::StreamExt;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tracing::debug;
use url::Url;

use crate::types::error::Result;

const CLOSE_ACK_TIMEOUT: Duration = Duration::from_secs(1);

/// One inbound data frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    Text(String),
    Binary(Vec<u8>),
}

#[async_trait]
pub trait Connection: Send {
    /// Next data frame; `None` once the connection has closed
    async fn next_frame(&mut self) -> Option<Result<Frame>>;

    /// Close from our side
    async fn close(&mut self);
}

#[async_trait]
pub trait Connector: Send + Sync {
    async fn open(&self, url: &str) -> Result<Box<dyn Connection>>;
}

/// Build the connection URL with the access token as the `token` parameter
pub fn connection_url(ws_url: &str, token: &str) -> Result<String> {
    let mut url = Url::parse(ws_url)?;
    url.query_pairs_mut().append_pair("token", token);
    Ok(url.into())
}

#[derive(Debug, Default, Clone, Copy)]
pub struct WsConnector;

#[async_trait]
impl Connector for WsConnector {
    async fn open(&self, url: &str) -> Result<Box<dyn Connection>> {
        let (stream, response) = tokio_tungstenite::connect_async(url).await?;
        debug!("Websocket handshake completed ({})", response.status());
        Ok(Box::new(WsConnection { stream }))
    }
}

struct WsConnection {
    stream: WebSocketStream<MaybeTlsStream<TcpStream>>,
}

#[async_trait]
impl Connection for WsConnection {
    async fn next_frame(&mut self) -> Option<Result<Frame>> {
        loop {
            match self.stream.next().await? {
                Ok(Message::Text(text)) => return Some(Ok(Frame::Text(text))),
                Ok(Message::Binary(bytes)) => return Some(Ok(Frame::Binary(bytes))),
                Ok(Message::Close(frame)) => {
                    debug!("Websocket closed by server: {:?}", frame);
                    return None;
                }
                // Control frames are answered by tungstenite itself
                Ok(Message::Ping(_)) | Ok(Message::Pong(_)) | Ok(Message::Frame(_)) => continue,
                Err(e) => return Some(Err(e.into())),
            }
        }
    }

    async fn close(&mut self) {
        if let Err(e) = self.stream.close(None).await {
            debug!("Websocket close handshake failed: {}", e);
        }
        // Give the peer a moment to acknowledge before the socket is dropped
        let drain = async { while let Some(Ok(_)) = self.stream.next().await {} };
        let _ = tokio::time::timeout(CLOSE_ACK_TIMEOUT, drain).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connection_url_carries_token() {
        assert_eq!(
            connection_url("ws://localhost:5001", "A1").unwrap(),
            "ws://localhost:5001/?token=A1"
        );
        assert_eq!(
            connection_url("wss://mail.example.com/ws?v=2", "a b+c").unwrap(),
            "wss://mail.example.com/ws?v=2&token=a+b%2Bc"
        );
        assert!(connection_url("not a url", "A1").is_err());
    }

    #[tokio::test]
    async fn test_refused_connection_is_an_error() {
        let result = WsConnector.open("ws://127.0.0.1:9/").await;
        assert!(result.is_err());
    }
}
