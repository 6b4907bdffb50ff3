//! Core substrate for an XMPP-family client: JID parsing and construction,
//! SRV-based endpoint discovery, a happy-eyeballs connector, and a streaming
//! XML stream front-end.
//!
//! The four pieces are independent and composable: a caller typically
//! parses a [`Jid`], uses [`resolver::Resolver`] plus [`connector::connect`]
//! to establish a TCP socket to the right endpoint, then drives
//! [`xmlstream::XmlStream`] (or [`xmlstream::queue::QueuedStream`]) over
//! that socket.

pub mod connector;
pub mod error;
pub mod jid;
pub mod precis;
pub mod resolver;
pub mod util;
pub mod xmlstream;

pub use connector::{connect, Address, ConnectOptions, Family};
pub use error::{ConnectError, Error, JidError, ResolverError, StreamError};
pub use jid::{Jid, UnescapedJid};
pub use resolver::{Resolver, ResolverSettings};
pub use xmlstream::{Element, StreamHandler, XmlStream};
