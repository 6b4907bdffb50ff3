//! Crate-wide error taxonomy.
//!
//! Each subsystem gets its own enum (mirrors the way the teacher's `DNSError`
//! collected every underlying I/O/parse cause into one place); [`Error`] is
//! the top-level sum type a caller driving the whole stack will see.

use std::net::SocketAddr;

use thiserror::Error;

/// Errors raised from [`crate::jid`] construction (spec `ValidationError`).
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum JidError {
    #[error("domainpart cannot be empty")]
    EmptyDomain,

    #[error("localpart must not start or end with the SPACE character (0x20)")]
    LocalpartBoundarySpace,

    #[error("{part} must not exceed 1023 octets in length")]
    LengthExceeded { part: &'static str },

    #[error("domainpart must be a valid IDN string: {reason}")]
    InvalidIdn { reason: String },

    #[error("{part} failed to validate against the {profile} PRECIS class")]
    PrecisViolation {
        part: &'static str,
        profile: &'static str,
    },
}

/// Errors raised from [`crate::resolver`] (spec `ResolverError`).
#[derive(Debug, Error)]
pub enum ResolverError {
    #[error("failed to resolve: {host} (no A or AAAA records)")]
    UnresolvableHost { host: String },
}

/// One recorded failure from a single connect attempt.
#[derive(Debug, Error, Clone)]
#[error("{family:?} {addr:?}: {cause}")]
pub struct ConnectFailure {
    pub family: crate::connector::Family,
    pub addr: Option<SocketAddr>,
    pub cause: String,
}

/// Errors raised from [`crate::connector`] (spec `ConnectError`/`ConnectTimeout`).
#[derive(Debug, Error)]
pub enum ConnectError {
    #[error("all connection attempts failed: {0:?}")]
    Aggregate(Vec<ConnectFailure>),

    #[error("connection timed out after {0:?}")]
    Timeout(std::time::Duration),
}

/// Errors raised from [`crate::xmlstream`] (spec `ParseError`/`QueueOverflow`).
#[derive(Debug, Error)]
pub enum StreamError {
    #[error("XML parse error: {0}")]
    Parse(#[from] quick_xml::Error),

    #[error("stream is closed after a previous parse error")]
    AlreadyBroken,

    #[error("event queue overflowed (capacity {capacity})")]
    QueueOverflow { capacity: usize },

    #[error("transport I/O error: {0}")]
    Transport(String),
}

impl StreamError {
    pub fn from_io(err: std::io::Error) -> Self {
        StreamError::Transport(err.to_string())
    }
}

/// Top-level error aggregating every subsystem. Not itself named in the spec's
/// taxonomy; a convenience for callers that drive the whole stack end to end.
#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Jid(#[from] JidError),

    #[error(transparent)]
    Resolver(#[from] ResolverError),

    #[error(transparent)]
    Connect(#[from] ConnectError),

    #[error(transparent)]
    Stream(#[from] StreamError),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}
