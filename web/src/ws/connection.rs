//! Adapters from an upgraded axum `WebSocket` to the hub's connection traits.

use async_trait::async_trait;
use axum::extract::ws::{Message as WsMessage, WebSocket};
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use hub::connection::{ConnectionSink, ConnectionStream, Frame};
use hub::error::{Error, TransportErrorKind};
use log::*;

pub(crate) struct WebSocketSink {
    inner: SplitSink<WebSocket, WsMessage>,
}

impl WebSocketSink {
    pub(crate) fn new(inner: SplitSink<WebSocket, WsMessage>) -> Self {
        Self { inner }
    }
}

#[async_trait]
impl ConnectionSink for WebSocketSink {
    async fn send_text(&mut self, text: String) -> Result<(), Error> {
        self.inner
            .send(WsMessage::Text(text.into()))
            .await
            .map_err(|e| Error::transport(TransportErrorKind::Send, e))
    }

    async fn close(&mut self) -> Result<(), Error> {
        // The peer may already be gone; the sink is shut down either way.
        if let Err(e) = self.inner.send(WsMessage::Close(None)).await {
            debug!("Failed to send close frame: {e}");
        }
        self.inner
            .close()
            .await
            .map_err(|e| Error::transport(TransportErrorKind::Close, e))
    }
}

pub(crate) struct WebSocketStream {
    inner: SplitStream<WebSocket>,
}

impl WebSocketStream {
    pub(crate) fn new(inner: SplitStream<WebSocket>) -> Self {
        Self { inner }
    }
}

#[async_trait]
impl ConnectionStream for WebSocketStream {
    async fn recv(&mut self) -> Option<Result<Frame, Error>> {
        to_frame(self.inner.next().await?)
    }
}

/// Maps one WebSocket read onto a hub frame. A close frame ends the stream.
fn to_frame(read: Result<WsMessage, axum::Error>) -> Option<Result<Frame, Error>> {
    match read {
        Ok(WsMessage::Text(text)) => Some(Ok(Frame::Text(text.as_str().to_owned()))),
        Ok(WsMessage::Binary(bytes)) => Some(Ok(Frame::Binary(bytes.to_vec()))),
        Ok(WsMessage::Ping(_)) | Ok(WsMessage::Pong(_)) => Some(Ok(Frame::Control)),
        Ok(WsMessage::Close(_)) => None,
        Err(e) => Some(Err(Error::transport(TransportErrorKind::Receive, e))),
    }
}
