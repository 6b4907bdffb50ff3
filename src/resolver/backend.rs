//! The injected DNS resolver abstraction (spec §4.C / §6 "Resolver interface
//! consumed") and its production implementation over `hickory-resolver`.
//!
//! Exception-driven DNS fallback (the shape the original Python
//! implementation used, catching `dns.exception.*` subclasses) becomes an
//! explicit result type here: [`DnsOutcome`] is `Found | Empty | Timeout |
//! Failed`, and callers match on it instead of catching broad error
//! supertypes (spec §9 redesign guidance).

use std::net::{Ipv4Addr, Ipv6Addr};
use std::time::Duration;

use async_trait::async_trait;
use hickory_resolver::config::{ResolverConfig, ResolverOpts};
use hickory_resolver::TokioAsyncResolver;

/// One SRV record as returned by a `query(qname, SRV)` lookup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SrvRecord {
    pub target: String,
    pub port: u16,
    pub priority: u16,
    pub weight: u16,
}

/// The outcome of a single DNS query, in place of the exception hierarchy the
/// original implementation dispatched on.
#[derive(Debug)]
pub enum DnsOutcome<T> {
    /// The query succeeded and returned at least one record.
    Found(Vec<T>),
    /// The query succeeded but the answer was empty (NXDOMAIN or NoAnswer).
    Empty,
    /// The query did not complete within the backend's configured timeout.
    Timeout,
    /// A hard DNS failure unrelated to the name simply not existing.
    Failed(String),
}

/// The DNS resolution dependency [`crate::resolver::Resolver`] is built over.
/// Injected so tests can substitute [`FixtureBackend`] instead of touching
/// the network.
#[async_trait]
pub trait DnsBackend: Send + Sync {
    async fn query_srv(&self, qname: &str) -> DnsOutcome<SrvRecord>;
    async fn query_a(&self, qname: &str) -> DnsOutcome<Ipv4Addr>;
    async fn query_aaaa(&self, qname: &str) -> DnsOutcome<Ipv6Addr>;
}

/// Production backend wrapping `hickory_resolver::TokioAsyncResolver`.
pub struct HickoryBackend {
    resolver: TokioAsyncResolver,
}

impl HickoryBackend {
    /// Build a backend from the system's `/etc/resolv.conf` (or platform
    /// equivalent), falling back to `ResolverConfig::default()` if that
    /// can't be read — the same fallback the pack's
    /// `xmpp_proxy::dns::resolve_xmpp_server` uses.
    pub fn from_system_conf() -> Self {
        let resolver = TokioAsyncResolver::tokio_from_system_conf().unwrap_or_else(|e| {
            tracing::warn!(error = %e, "failed to load system DNS config, using defaults");
            TokioAsyncResolver::tokio(ResolverConfig::default(), ResolverOpts::default())
        });
        Self { resolver }
    }

    pub fn new(config: ResolverConfig, opts: ResolverOpts) -> Self {
        Self {
            resolver: TokioAsyncResolver::tokio(config, opts),
        }
    }

    /// Like [`Self::from_system_conf`], but overrides the per-query timeout
    /// with `dns_timeout` (used by [`crate::resolver::ResolverSettings`]).
    pub fn from_system_conf_with_timeout(dns_timeout: Duration) -> Self {
        let (config, mut opts) = hickory_resolver::system_conf::read_system_conf().unwrap_or_else(|e| {
            tracing::warn!(error = %e, "failed to load system DNS config, using defaults");
            (ResolverConfig::default(), ResolverOpts::default())
        });
        opts.timeout = dns_timeout;
        Self {
            resolver: TokioAsyncResolver::tokio(config, opts),
        }
    }
}

#[async_trait]
impl DnsBackend for HickoryBackend {
    async fn query_srv(&self, qname: &str) -> DnsOutcome<SrvRecord> {
        match self.resolver.srv_lookup(qname).await {
            Ok(lookup) => {
                let records: Vec<SrvRecord> = lookup
                    .iter()
                    .map(|r| SrvRecord {
                        target: r.target().to_string().trim_end_matches('.').to_string(),
                        port: r.port(),
                        priority: r.priority(),
                        weight: r.weight(),
                    })
                    .collect();
                if records.is_empty() {
                    DnsOutcome::Empty
                } else {
                    DnsOutcome::Found(records)
                }
            }
            Err(e) => classify_error(e),
        }
    }

    async fn query_a(&self, qname: &str) -> DnsOutcome<Ipv4Addr> {
        match self.resolver.ipv4_lookup(qname).await {
            Ok(lookup) => {
                let addrs: Vec<Ipv4Addr> = lookup.iter().map(|r| r.0).collect();
                if addrs.is_empty() {
                    DnsOutcome::Empty
                } else {
                    DnsOutcome::Found(addrs)
                }
            }
            Err(e) => classify_error(e),
        }
    }

    async fn query_aaaa(&self, qname: &str) -> DnsOutcome<Ipv6Addr> {
        match self.resolver.ipv6_lookup(qname).await {
            Ok(lookup) => {
                let addrs: Vec<Ipv6Addr> = lookup.iter().map(|r| r.0).collect();
                if addrs.is_empty() {
                    DnsOutcome::Empty
                } else {
                    DnsOutcome::Found(addrs)
                }
            }
            Err(e) => classify_error(e),
        }
    }
}

fn classify_error<T>(err: hickory_resolver::error::ResolveError) -> DnsOutcome<T> {
    use hickory_resolver::error::ResolveErrorKind;
    match err.kind() {
        ResolveErrorKind::NoRecordsFound { .. } => DnsOutcome::Empty,
        ResolveErrorKind::Timeout => DnsOutcome::Timeout,
        _ => DnsOutcome::Failed(err.to_string()),
    }
}

/// A canned-answer backend for tests, so the picker/resolver tests never
/// touch the network (spec §4.C explicitly requires the backend be
/// substitutable for fixtures).
#[derive(Default)]
pub struct FixtureBackend {
    pub srv: std::collections::HashMap<String, DnsOutcomeFixture<SrvRecord>>,
    pub a: std::collections::HashMap<String, DnsOutcomeFixture<Ipv4Addr>>,
    pub aaaa: std::collections::HashMap<String, DnsOutcomeFixture<Ipv6Addr>>,
}

/// A cloneable mirror of [`DnsOutcome`], since the trait's outcome type
/// isn't `Clone` (records may be large) but fixtures are reused across
/// lookups in a test.
#[derive(Clone)]
pub enum DnsOutcomeFixture<T: Clone> {
    Found(Vec<T>),
    Empty,
    Timeout,
    Failed(String),
}

impl<T: Clone> From<DnsOutcomeFixture<T>> for DnsOutcome<T> {
    fn from(f: DnsOutcomeFixture<T>) -> Self {
        match f {
            DnsOutcomeFixture::Found(v) => DnsOutcome::Found(v),
            DnsOutcomeFixture::Empty => DnsOutcome::Empty,
            DnsOutcomeFixture::Timeout => DnsOutcome::Timeout,
            DnsOutcomeFixture::Failed(s) => DnsOutcome::Failed(s),
        }
    }
}

impl FixtureBackend {
    pub fn with_srv(mut self, qname: &str, outcome: DnsOutcomeFixture<SrvRecord>) -> Self {
        self.srv.insert(qname.to_string(), outcome);
        self
    }

    pub fn with_a(mut self, qname: &str, outcome: DnsOutcomeFixture<Ipv4Addr>) -> Self {
        self.a.insert(qname.to_string(), outcome);
        self
    }

    pub fn with_aaaa(mut self, qname: &str, outcome: DnsOutcomeFixture<Ipv6Addr>) -> Self {
        self.aaaa.insert(qname.to_string(), outcome);
        self
    }
}

#[async_trait]
impl DnsBackend for FixtureBackend {
    async fn query_srv(&self, qname: &str) -> DnsOutcome<SrvRecord> {
        self.srv
            .get(qname)
            .cloned()
            .map(Into::into)
            .unwrap_or(DnsOutcome::Empty)
    }

    async fn query_a(&self, qname: &str) -> DnsOutcome<Ipv4Addr> {
        self.a
            .get(qname)
            .cloned()
            .map(Into::into)
            .unwrap_or(DnsOutcome::Empty)
    }

    async fn query_aaaa(&self, qname: &str) -> DnsOutcome<Ipv6Addr> {
        self.aaaa
            .get(qname)
            .cloned()
            .map(Into::into)
            .unwrap_or(DnsOutcome::Empty)
    }
}
