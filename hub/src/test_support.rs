//! In-memory connection doubles shared by the hub's unit tests.

use crate::connection::{ConnectionSink, ConnectionStream, Frame};
use crate::error::{Error, TransportErrorKind};
use crate::message::Message;
use crate::presence::PresenceStore;
use async_trait::async_trait;
use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;

type Inbound = mpsc::UnboundedSender<Result<Frame, Error>>;

pub(crate) struct MemorySink {
    frames: Arc<Mutex<Vec<String>>>,
    closes: Arc<AtomicUsize>,
    fail_sends: Arc<AtomicBool>,
}

#[async_trait]
impl ConnectionSink for MemorySink {
    async fn send_text(&mut self, text: String) -> Result<(), Error> {
        if self.fail_sends.load(Ordering::SeqCst) {
            return Err(Error::transport(TransportErrorKind::Send, "connection reset"));
        }
        self.frames.lock().unwrap().push(text);
        Ok(())
    }

    async fn close(&mut self) -> Result<(), Error> {
        self.closes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

pub(crate) struct MemoryStream {
    inbound: mpsc::UnboundedReceiver<Result<Frame, Error>>,
}

#[async_trait]
impl ConnectionStream for MemoryStream {
    async fn recv(&mut self) -> Option<Result<Frame, Error>> {
        self.inbound.recv().await
    }
}

/// The remote end of an in-memory connection, as seen by a test.
#[derive(Clone)]
pub(crate) struct Peer {
    frames: Arc<Mutex<Vec<String>>>,
    closes: Arc<AtomicUsize>,
    fail_sends: Arc<AtomicBool>,
    inbound: Arc<Mutex<Option<Inbound>>>,
}

impl Peer {
    /// Every message the hub wrote to this connection, in order.
    pub(crate) fn received(&self) -> Vec<Message> {
        self.frames
            .lock()
            .unwrap()
            .iter()
            .map(|frame| Message::decode(frame.as_bytes()).unwrap())
            .collect()
    }

    pub(crate) fn close_count(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }

    /// Makes every subsequent write to this connection fail.
    pub(crate) fn break_writes(&self) {
        self.fail_sends.store(true, Ordering::SeqCst);
    }

    pub(crate) fn send_frame(&self, frame: Frame) {
        if let Some(inbound) = self.inbound.lock().unwrap().as_ref() {
            let _ = inbound.send(Ok(frame));
        }
    }

    pub(crate) fn send_json(&self, json: serde_json::Value) {
        self.send_frame(Frame::Text(json.to_string()));
    }

    pub(crate) fn fail_read(&self) {
        if let Some(inbound) = self.inbound.lock().unwrap().take() {
            let _ = inbound.send(Err(Error::transport(
                TransportErrorKind::Receive,
                "connection reset by peer",
            )));
        }
    }

    /// Simulates the peer hanging up cleanly.
    pub(crate) fn disconnect(&self) {
        self.inbound.lock().unwrap().take();
    }
}

pub(crate) fn memory_connection() -> (Box<dyn ConnectionSink>, MemoryStream, Peer) {
    let frames = Arc::new(Mutex::new(Vec::new()));
    let closes = Arc::new(AtomicUsize::new(0));
    let fail_sends = Arc::new(AtomicBool::new(false));
    let (tx, rx) = mpsc::unbounded_channel();

    let sink = MemorySink {
        frames: Arc::clone(&frames),
        closes: Arc::clone(&closes),
        fail_sends: Arc::clone(&fail_sends),
    };
    let peer = Peer {
        frames,
        closes,
        fail_sends,
        inbound: Arc::new(Mutex::new(Some(tx))),
    };

    (Box::new(sink), MemoryStream { inbound: rx }, peer)
}

struct StalledSink;

#[async_trait]
impl ConnectionSink for StalledSink {
    async fn send_text(&mut self, _text: String) -> Result<(), Error> {
        std::future::pending().await
    }

    async fn close(&mut self) -> Result<(), Error> {
        Ok(())
    }
}

/// A sink whose writes never complete, like a peer that stopped reading.
pub(crate) fn stalled_sink() -> Box<dyn ConnectionSink> {
    Box::new(StalledSink)
}

/// Presence store that records every call it receives.
#[derive(Default)]
pub(crate) struct RecordingPresenceStore {
    calls: Mutex<Vec<(String, bool)>>,
    fail: AtomicBool,
}

impl RecordingPresenceStore {
    pub(crate) fn failing() -> Self {
        Self {
            calls: Mutex::new(Vec::new()),
            fail: AtomicBool::new(true),
        }
    }

    pub(crate) fn calls(&self) -> Vec<(String, bool)> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl PresenceStore for RecordingPresenceStore {
    async fn set_online(&self, user_id: &str, online: bool) -> Result<(), Error> {
        self.calls.lock().unwrap().push((user_id.to_string(), online));
        if self.fail.load(Ordering::SeqCst) {
            return Err(Error::with_source(
                crate::error::ErrorKind::Presence,
                "user store unavailable",
            ));
        }
        Ok(())
    }

    async fn online_users(&self) -> Result<Vec<String>, Error> {
        let mut latest = std::collections::BTreeMap::new();
        for (user_id, online) in self.calls() {
            latest.insert(user_id, online);
        }
        Ok(latest
            .into_iter()
            .filter(|(_, online)| *online)
            .map(|(user_id, _)| user_id)
            .collect())
    }
}

/// Polls `check` until it holds, failing the test after roughly two seconds.
pub(crate) async fn eventually<F, Fut>(mut check: F)
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    for _ in 0..400 {
        if check().await {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("condition was not met in time");
}
