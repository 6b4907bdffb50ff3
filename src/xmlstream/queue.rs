//! Event-queue variant of the XML stream front-end: a bounded FIFO layered
//! atop the base handlers, driven by a `run(once?, timeout?)` loop that
//! owns the transport (spec §4.F "Optional event-queue variant").

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::timeout as tokio_timeout;

use crate::error::StreamError;
use crate::xmlstream::{Element, StreamHandler, XmlStream};

/// Hard cap on queued-but-undelivered stanzas (spec: MAX_EVENT_QUEUE = 512).
pub const MAX_EVENT_QUEUE: usize = 512;
/// Upper bound on a single transport read (spec: MAX_RECV_BUF = 65536).
pub const MAX_RECV_BUF: usize = 65536;

/// The byte-stream socket the event-queue variant drives directly.
/// `recv` returning an empty buffer signals an orderly close, matching the
/// transport contract in spec §6.
#[async_trait]
pub trait Transport: Send {
    async fn recv(&mut self, max_bytes: usize) -> std::io::Result<Vec<u8>>;
    async fn sendall(&mut self, bytes: &[u8]) -> std::io::Result<()>;
}

struct Shared {
    queue: Mutex<VecDeque<Element>>,
    stream_ended: Mutex<bool>,
}

struct QueueHandler {
    shared: Arc<Shared>,
    overflow: Option<StreamError>,
}

impl StreamHandler for QueueHandler {
    fn handle_element(&mut self, stanza: Element) {
        let mut q = self.shared.queue.lock().expect("queue mutex poisoned");
        if q.len() >= MAX_EVENT_QUEUE {
            self.overflow = Some(StreamError::QueueOverflow {
                capacity: MAX_EVENT_QUEUE,
            });
            return;
        }
        q.push_back(stanza);
    }

    fn handle_stream_end(&mut self) {
        *self.shared.stream_ended.lock().expect("queue mutex poisoned") = true;
    }

    fn handle_close(&mut self) {
        self.shared.queue.lock().expect("queue mutex poisoned").clear();
    }
}

/// Layers a bounded stanza queue over [`XmlStream`] and owns a [`Transport`],
/// so callers drive the whole read/parse/dispatch cycle with [`Self::run`]
/// instead of calling `feed` themselves.
pub struct QueuedStream<T: Transport> {
    inner: XmlStream<QueueHandler>,
    shared: Arc<Shared>,
    transport: T,
}

impl<T: Transport> QueuedStream<T> {
    pub fn new(transport: T) -> Self {
        let shared = Arc::new(Shared {
            queue: Mutex::new(VecDeque::new()),
            stream_ended: Mutex::new(false),
        });
        let handler = QueueHandler {
            shared: shared.clone(),
            overflow: None,
        };
        Self {
            inner: XmlStream::new(handler),
            shared,
            transport,
        }
    }

    pub async fn sendall(&mut self, bytes: &[u8]) -> std::io::Result<()> {
        self.transport.sendall(bytes).await
    }

    /// Read from the transport, feed the parser, and return the next queued
    /// stanza.
    ///
    /// `once = true` bounds this call to a single transport `recv` (spec:
    /// "`run(once=true, timeout)` bounds a single recv"): if nothing is
    /// queued yet, it returns `Ok(None)` rather than looping.
    /// `once = false` loops until a stanza is queued or the stream ends.
    /// `timeout` bounds each individual `recv`.
    pub async fn run(
        &mut self,
        once: bool,
        recv_timeout: Option<Duration>,
    ) -> Result<Option<Element>, StreamError> {
        if let Some(stanza) = self.pop_queued() {
            return Ok(Some(stanza));
        }

        loop {
            if *self.shared.stream_ended.lock().expect("queue mutex poisoned") {
                return Ok(None);
            }

            let recv_fut = self.transport.recv(MAX_RECV_BUF);
            let bytes = match recv_timeout {
                Some(d) => match tokio_timeout(d, recv_fut).await {
                    Ok(r) => r.map_err(StreamError::from_io)?,
                    Err(_) => return Ok(None),
                },
                None => recv_fut.await.map_err(StreamError::from_io)?,
            };

            if bytes.is_empty() {
                return Ok(None);
            }

            self.inner.feed(&bytes)?;
            self.check_overflow()?;

            if let Some(stanza) = self.pop_queued() {
                return Ok(Some(stanza));
            }
            if once {
                return Ok(None);
            }
        }
    }

    fn pop_queued(&self) -> Option<Element> {
        self.shared.queue.lock().expect("queue mutex poisoned").pop_front()
    }

    fn check_overflow(&self) -> Result<(), StreamError> {
        self.inner.with_handler(|h| match h.overflow.take() {
            Some(e) => Err(e),
            None => Ok(()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque as Chunks;

    struct FakeTransport {
        chunks: Chunks<Vec<u8>>,
    }

    #[async_trait]
    impl Transport for FakeTransport {
        async fn recv(&mut self, _max_bytes: usize) -> std::io::Result<Vec<u8>> {
            Ok(self.chunks.pop_front().unwrap_or_default())
        }

        async fn sendall(&mut self, _bytes: &[u8]) -> std::io::Result<()> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn run_returns_queued_stanza_then_none_at_stream_end() {
        let transport = FakeTransport {
            chunks: vec![
                b"<stream>".to_vec(),
                b"<ping/>".to_vec(),
                b"</stream>".to_vec(),
                Vec::new(),
            ]
            .into(),
        };
        let mut stream = QueuedStream::new(transport);

        let first = stream.run(false, None).await.unwrap();
        assert_eq!(first.unwrap().tag, "ping");

        let second = stream.run(false, None).await.unwrap();
        assert!(second.is_none());
    }

    #[tokio::test]
    async fn once_bounds_a_single_recv() {
        let transport = FakeTransport {
            chunks: vec![b"<stream>".to_vec()].into(),
        };
        let mut stream = QueuedStream::new(transport);
        let result = stream.run(true, None).await.unwrap();
        assert!(result.is_none());
    }
}
