//! Incremental XML stream front-end: a depth-based state machine wrapping a
//! SAX-like parser, dispatching five handler callbacks (spec §4.F).

pub mod queue;

use std::sync::Mutex;

use quick_xml::events::Event as XmlEvent;
use quick_xml::Reader;

use crate::error::StreamError;

/// A constructed XML element: the stream root (attributes only, built at
/// `handle_stream_start`) or a fully-built top-level stanza (built at
/// `handle_element`).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Element {
    pub tag: String,
    pub attrs: Vec<(String, String)>,
    pub children: Vec<Element>,
    pub text: String,
}

impl Element {
    fn new(tag: String, attrs: Vec<(String, String)>) -> Self {
        Self {
            tag,
            attrs,
            children: Vec::new(),
            text: String::new(),
        }
    }

    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attrs.iter().find(|(k, _)| k == name).map(|(_, v)| v.as_str())
    }
}

/// The five handler callbacks the depth protocol dispatches to, in document
/// order: `stream_start` precedes any `element`, which precede
/// `stream_end`, which precedes `close` (spec §5 ordering guarantee).
pub trait StreamHandler: Send {
    fn handle_stream_start(&mut self, root: &Element) {
        let _ = root;
    }
    fn handle_element(&mut self, stanza: Element) {
        let _ = stanza;
    }
    fn handle_stream_end(&mut self) {}
    fn handle_parse_error(&mut self, error: &StreamError) {
        let _ = error;
    }
    fn handle_close(&mut self) {}
}

struct Inner<H: StreamHandler> {
    handler: H,
    buffer: Vec<u8>,
    consumed: usize,
    depth: usize,
    root: Option<Element>,
    stack: Vec<Element>,
    broken: bool,
}

/// The stream itself: feed opaque byte chunks via [`XmlStream::feed`].
/// `feed` serializes access internally (spec: "MUST serialize parser
/// access"), so a stream may be shared behind an `Arc` across tasks.
pub struct XmlStream<H: StreamHandler> {
    inner: Mutex<Inner<H>>,
}

impl<H: StreamHandler> XmlStream<H> {
    pub fn new(handler: H) -> Self {
        Self {
            inner: Mutex::new(Inner {
                handler,
                buffer: Vec::new(),
                consumed: 0,
                depth: 0,
                root: None,
                stack: Vec::new(),
                broken: false,
            }),
        }
    }

    /// Feed a chunk of bytes from the transport. Already-broken streams
    /// (a prior parse error) immediately re-surface that error rather than
    /// attempting to parse further (spec: "subsequent feed() calls behave
    /// as if the stream is closed").
    pub fn feed(&self, bytes: &[u8]) -> Result<(), StreamError> {
        let mut inner = self.inner.lock().expect("xml stream mutex poisoned");
        if inner.broken {
            return Err(StreamError::AlreadyBroken);
        }
        inner.buffer.extend_from_slice(bytes);
        inner.drain()
    }

    /// Tear down parser state and fire `handle_close`. Idempotent for the
    /// handler's sake, but only the first call clears state.
    pub fn close(&self) {
        let mut inner = self.inner.lock().expect("xml stream mutex poisoned");
        inner.buffer.clear();
        inner.consumed = 0;
        inner.depth = 0;
        inner.root = None;
        inner.stack.clear();
        inner.handler.handle_close();
    }

    pub fn with_handler<R>(&self, f: impl FnOnce(&mut H) -> R) -> R {
        let mut inner = self.inner.lock().expect("xml stream mutex poisoned");
        f(&mut inner.handler)
    }
}

impl<H: StreamHandler> Inner<H> {
    /// Re-parse the unconsumed tail of `buffer` from scratch on every feed.
    /// `quick_xml::Reader` over a byte slice treats end-of-slice as EOF
    /// regardless of whether more bytes are coming, so a bare `Event::Eof`
    /// here means "wait for more data", not "stream ended" — a genuine
    /// parse failure comes back as `Err`.
    fn drain(&mut self) -> Result<(), StreamError> {
        let unconsumed = &self.buffer[self.consumed..];
        let mut reader = Reader::from_reader(unconsumed);
        reader.config_mut().trim_text(false);
        let mut scratch = Vec::new();
        let mut advanced = 0usize;

        loop {
            match reader.read_event_into(&mut scratch) {
                Ok(XmlEvent::Eof) => break,
                Ok(XmlEvent::Start(e)) => {
                    let tag = String::from_utf8_lossy(e.name().as_ref()).into_owned();
                    let attrs = decode_attrs(&e);
                    self.on_start(tag, attrs);
                    advanced = reader.buffer_position() as usize;
                }
                Ok(XmlEvent::Empty(e)) => {
                    let tag = String::from_utf8_lossy(e.name().as_ref()).into_owned();
                    let attrs = decode_attrs(&e);
                    self.on_start(tag.clone(), attrs);
                    self.on_end(&tag);
                    advanced = reader.buffer_position() as usize;
                }
                Ok(XmlEvent::End(e)) => {
                    let tag = String::from_utf8_lossy(e.name().as_ref()).into_owned();
                    self.on_end(&tag);
                    advanced = reader.buffer_position() as usize;
                }
                Ok(XmlEvent::Text(t)) => {
                    if let Ok(text) = t.unescape() {
                        self.on_text(&text);
                    }
                    advanced = reader.buffer_position() as usize;
                }
                Ok(_) => {
                    advanced = reader.buffer_position() as usize;
                }
                Err(e) => {
                    self.broken = true;
                    let err = StreamError::Parse(e);
                    self.handler.handle_parse_error(&err);
                    return Err(err);
                }
            }
            scratch.clear();
        }

        self.consumed += advanced;
        Ok(())
    }

    fn on_start(&mut self, tag: String, attrs: Vec<(String, String)>) {
        let element = Element::new(tag, attrs);
        if self.depth == 0 {
            self.root = Some(element.clone());
            self.handler.handle_stream_start(self.root.as_ref().unwrap());
        }
        self.stack.push(element);
        self.depth += 1;
    }

    fn on_end(&mut self, _tag: &str) {
        self.depth -= 1;
        let finished = self.stack.pop().unwrap_or_default();
        if self.depth == 0 {
            self.handler.handle_stream_end();
        } else if self.depth == 1 {
            self.handler.handle_element(finished);
        } else if let Some(parent) = self.stack.last_mut() {
            parent.children.push(finished);
        }
    }

    fn on_text(&mut self, data: &str) {
        if self.depth <= 1 {
            return;
        }
        if let Some(top) = self.stack.last_mut() {
            top.text.push_str(data);
        }
    }
}

fn decode_attrs(e: &quick_xml::events::BytesStart) -> Vec<(String, String)> {
    e.attributes()
        .filter_map(Result::ok)
        .map(|a| {
            let key = String::from_utf8_lossy(a.key.as_ref()).into_owned();
            let value = a.unescape_value().unwrap_or_default().into_owned();
            (key, value)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct Recorder {
        started: Option<Element>,
        elements: Vec<Element>,
        ended: bool,
        closed: bool,
        errors: usize,
    }

    impl StreamHandler for Recorder {
        fn handle_stream_start(&mut self, root: &Element) {
            self.started = Some(root.clone());
        }
        fn handle_element(&mut self, stanza: Element) {
            self.elements.push(stanza);
        }
        fn handle_stream_end(&mut self) {
            self.ended = true;
        }
        fn handle_parse_error(&mut self, _error: &StreamError) {
            self.errors += 1;
        }
        fn handle_close(&mut self) {
            self.closed = true;
        }
    }

    #[test]
    fn emits_handlers_in_document_order() {
        let stream = XmlStream::new(Recorder::default());
        stream.feed(b"<stream key='value'>").unwrap();
        stream
            .feed(b"<message><body>foobar</body></message>")
            .unwrap();
        stream.feed(b"</stream>").unwrap();

        stream.with_handler(|h| {
            let root = h.started.as_ref().unwrap();
            assert_eq!(root.tag, "stream");
            assert_eq!(root.attr("key"), Some("value"));

            assert_eq!(h.elements.len(), 1);
            let msg = &h.elements[0];
            assert_eq!(msg.tag, "message");
            assert_eq!(msg.children.len(), 1);
            assert_eq!(msg.children[0].tag, "body");
            assert_eq!(msg.children[0].text, "foobar");

            assert!(h.ended);
        });
    }

    #[test]
    fn second_close_tag_is_a_parse_error() {
        let stream = XmlStream::new(Recorder::default());
        stream.feed(b"<stream>").unwrap();
        stream.feed(b"</stream>").unwrap();
        let result = stream.feed(b"</stream>");
        assert!(result.is_err());

        stream.with_handler(|h| {
            assert_eq!(h.errors, 1);
        });

        let second = stream.feed(b"<x/>");
        assert!(matches!(second, Err(StreamError::AlreadyBroken)));
    }

    #[test]
    fn partial_chunk_across_feed_calls_waits_for_more_data() {
        let stream = XmlStream::new(Recorder::default());
        stream.feed(b"<stream><msg").unwrap();
        stream.feed(b"></msg></stream>").unwrap();
        stream.with_handler(|h| {
            assert_eq!(h.elements.len(), 1);
            assert_eq!(h.elements[0].tag, "msg");
        });
    }

    #[test]
    fn close_resets_state_and_fires_handle_close() {
        let stream = XmlStream::new(Recorder::default());
        stream.feed(b"<stream>").unwrap();
        stream.close();
        stream.with_handler(|h| assert!(h.closed));
    }
}
