//! Endpoint discovery: turning a service name and host into a ranked set of
//! `(ipv4?, ipv6?, port)` candidates via SRV + A/AAAA (spec §4.C, §4.D).

pub mod backend;
mod picker;

use std::net::{Ipv4Addr, Ipv6Addr};
use std::sync::Arc;
use std::time::Duration;

use backend::{DnsBackend, DnsOutcome};
pub use backend::{DnsOutcomeFixture, FixtureBackend, HickoryBackend, SrvRecord};
pub use picker::ServerPicker;

use crate::error::ResolverError;

/// A candidate connection endpoint: at least one of `ipv4`/`ipv6` is set.
pub type Candidate = (Option<Ipv4Addr>, Option<Ipv6Addr>, u16);

/// Ambient configuration for building a [`Resolver`]: the SRV prefix
/// template (service name + transport proto) plus the DNS backend timeout
/// default. Plain `Default` + builder methods, the teacher's configuration
/// style — nothing in this layer calls for an external config-file crate.
#[derive(Debug, Clone)]
pub struct ResolverSettings {
    pub service_name: String,
    pub service_proto: String,
    pub dns_timeout: Duration,
}

impl Default for ResolverSettings {
    fn default() -> Self {
        Self {
            service_name: "xmpp-client".to_string(),
            service_proto: "tcp".to_string(),
            dns_timeout: Duration::from_secs(5),
        }
    }
}

impl ResolverSettings {
    pub fn new(service_name: impl Into<String>, service_proto: impl Into<String>) -> Self {
        Self {
            service_name: service_name.into(),
            service_proto: service_proto.into(),
            ..Default::default()
        }
    }

    pub fn with_dns_timeout(mut self, dns_timeout: Duration) -> Self {
        self.dns_timeout = dns_timeout;
        self
    }

    /// Build a [`Resolver`] over a [`HickoryBackend`] loaded from the
    /// system's resolver config, with `dns_timeout` applied to it.
    pub fn build_with_system_backend(&self) -> Resolver {
        let backend = Arc::new(HickoryBackend::from_system_conf_with_timeout(self.dns_timeout));
        self.build(backend)
    }

    /// Build a [`Resolver`] over a caller-supplied backend (e.g. a
    /// [`FixtureBackend`] in tests). `dns_timeout` only has an effect on the
    /// production `HickoryBackend` path, not on injected backends.
    pub fn build(&self, backend: Arc<dyn DnsBackend>) -> Resolver {
        Resolver::new(&self.service_name, &self.service_proto, backend)
    }
}

/// Resolves a service host into candidate endpoints, preferring SRV records
/// and falling back to plain A/AAAA lookups.
pub struct Resolver {
    service_prefix: String,
    backend: Arc<dyn DnsBackend>,
}

/// A pull-based source of [`Candidate`]s: either a single literal-IP
/// candidate, an SRV-backed [`ServerPicker`], or a plain A/AAAA fallback
/// list. DNS resolution may happen lazily on `next()`, so this isn't a
/// `std::iter::Iterator`.
pub enum CandidateSource<'r> {
    Single(Option<Candidate>),
    Picker(ServerPicker<'r>),
    Fallback(std::vec::IntoIter<Candidate>),
}

impl<'r> CandidateSource<'r> {
    pub async fn next(&mut self) -> Option<Candidate> {
        match self {
            CandidateSource::Single(slot) => slot.take(),
            CandidateSource::Picker(picker) => picker.next().await,
            CandidateSource::Fallback(iter) => iter.next(),
        }
    }
}

impl Resolver {
    /// `service_name`/`service_proto` build the SRV prefix, e.g.
    /// `("xmpp-client", "tcp")` → `_xmpp-client._tcp.`.
    pub fn new(service_name: &str, service_proto: &str, backend: Arc<dyn DnsBackend>) -> Self {
        Self {
            service_prefix: format!("_{service_name}._{service_proto}."),
            backend,
        }
    }

    /// Resolve `host` (with a default `port` used for literal-IP and
    /// A/AAAA-fallback candidates; SRV-derived candidates carry their own
    /// port) into a pull-based candidate source.
    pub async fn getaddrs(&self, host: &str, port: u16) -> CandidateSource<'_> {
        if let Some(candidate) = literal_candidate(host, port) {
            return CandidateSource::Single(Some(candidate));
        }

        let srv_name = format!("{}{}", self.service_prefix, host);
        match self.backend.query_srv(&srv_name).await {
            DnsOutcome::Found(records) => {
                CandidateSource::Picker(ServerPicker::new(self, records, Some(port)))
            }
            DnsOutcome::Empty => {
                tracing::debug!(qname = %srv_name, "getaddrs: missing SRV record");
                self.fallback(host, port).await
            }
            DnsOutcome::Timeout => {
                tracing::warn!(qname = %srv_name, "getaddrs: timed out querying SRV record");
                self.fallback(host, port).await
            }
            DnsOutcome::Failed(reason) => {
                tracing::error!(qname = %srv_name, %reason, "getaddrs: DNS failed querying SRV record");
                self.fallback(host, port).await
            }
        }
    }

    async fn fallback(&self, host: &str, port: u16) -> CandidateSource<'_> {
        let pairs = self.resolveaddrs(host).await;
        let candidates: Vec<Candidate> = pairs.into_iter().map(|(v4, v6)| (v4, v6, port)).collect();
        CandidateSource::Fallback(candidates.into_iter())
    }

    /// Issue A and AAAA queries for `qname` and pair results positionally
    /// (longest-zip: the i-th IPv4 and i-th IPv6 form one pair, missing
    /// positions are `None`). Per-type DNS errors degrade to an empty list
    /// for that type and are logged, never raised.
    pub(crate) async fn resolveaddrs(&self, qname: &str) -> Vec<(Option<Ipv4Addr>, Option<Ipv6Addr>)> {
        let (a, aaaa) = tokio::join!(self.backend.query_a(qname), self.backend.query_aaaa(qname));
        let v4 = log_outcome(qname, "A", a);
        let v6 = log_outcome(qname, "AAAA", aaaa);
        let len = v4.len().max(v6.len());
        (0..len)
            .map(|i| (v4.get(i).copied(), v6.get(i).copied()))
            .collect()
    }

    /// Force-resolve `host` to candidates, raising [`ResolverError::UnresolvableHost`]
    /// if both A and AAAA come back empty. Unlike [`Self::getaddrs`]'s
    /// internal SRV-fallback path (which degrades silently to an empty
    /// iterator), this is the "forced" operation spec §7 calls out as the
    /// one that surfaces a hard error to the caller.
    pub async fn resolve_forced(&self, host: &str, port: u16) -> Result<Vec<Candidate>, ResolverError> {
        let pairs = self.resolveaddrs(host).await;
        if pairs.is_empty() {
            return Err(ResolverError::UnresolvableHost {
                host: host.to_string(),
            });
        }
        Ok(pairs.into_iter().map(|(v4, v6)| (v4, v6, port)).collect())
    }
}

fn log_outcome<T>(qname: &str, rdtype: &str, outcome: DnsOutcome<T>) -> Vec<T> {
    match outcome {
        DnsOutcome::Found(v) => v,
        DnsOutcome::Empty => {
            tracing::debug!(qname, rdtype, "missing record");
            Vec::new()
        }
        DnsOutcome::Timeout => {
            tracing::warn!(qname, rdtype, "timed out querying record");
            Vec::new()
        }
        DnsOutcome::Failed(reason) => {
            tracing::error!(qname, rdtype, %reason, "DNS failed querying record");
            Vec::new()
        }
    }
}

/// If `host` is a literal IPv4 or IPv6 address (brackets stripped), return
/// the single candidate it represents.
fn literal_candidate(host: &str, port: u16) -> Option<Candidate> {
    if let Ok(v4) = host.parse::<Ipv4Addr>() {
        return Some((Some(v4), None, port));
    }
    let stripped = host.trim_start_matches('[').trim_end_matches(']');
    if let Ok(v6) = stripped.parse::<Ipv6Addr>() {
        return Some((None, Some(v6), port));
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use backend::DnsOutcomeFixture;

    #[tokio::test]
    async fn literal_ipv4_short_circuits() {
        let backend = Arc::new(FixtureBackend::default());
        let resolver = Resolver::new("xmpp-client", "tcp", backend);
        let mut src = resolver.getaddrs("192.0.2.1", 5222).await;
        let c = src.next().await.unwrap();
        assert_eq!(c, (Some("192.0.2.1".parse().unwrap()), None, 5222));
        assert!(src.next().await.is_none());
    }

    #[tokio::test]
    async fn literal_ipv6_with_brackets() {
        let backend = Arc::new(FixtureBackend::default());
        let resolver = Resolver::new("xmpp-client", "tcp", backend);
        let mut src = resolver.getaddrs("[2001:db8::1]", 5222).await;
        let c = src.next().await.unwrap();
        assert_eq!(c.1, Some("2001:db8::1".parse().unwrap()));
    }

    #[tokio::test]
    async fn missing_srv_falls_back_to_a_aaaa() {
        let backend = Arc::new(
            FixtureBackend::default()
                .with_a("example.org", DnsOutcomeFixture::Found(vec!["1.2.3.4".parse().unwrap()]))
                .with_aaaa("example.org", DnsOutcomeFixture::Empty),
        );
        let resolver = Resolver::new("xmpp-client", "tcp", backend);
        let mut src = resolver.getaddrs("example.org", 5222).await;
        let c = src.next().await.unwrap();
        assert_eq!(c, (Some("1.2.3.4".parse().unwrap()), None, 5222));
    }

    #[tokio::test]
    async fn resolve_forced_errors_on_empty() {
        let backend = Arc::new(FixtureBackend::default());
        let resolver = Resolver::new("xmpp-client", "tcp", backend);
        let err = resolver.resolve_forced("nowhere.invalid", 5222).await.unwrap_err();
        assert!(matches!(err, ResolverError::UnresolvableHost { .. }));
    }

    #[tokio::test]
    async fn resolveaddrs_pairs_positionally() {
        let backend = Arc::new(
            FixtureBackend::default()
                .with_a(
                    "example.org",
                    DnsOutcomeFixture::Found(vec!["1.1.1.1".parse().unwrap(), "1.1.1.2".parse().unwrap()]),
                )
                .with_aaaa("example.org", DnsOutcomeFixture::Found(vec!["::1".parse().unwrap()])),
        );
        let resolver = Resolver::new("xmpp-client", "tcp", backend);
        let pairs = resolver.resolveaddrs("example.org").await;
        assert_eq!(pairs.len(), 2);
        assert_eq!(pairs[0].1, Some("::1".parse().unwrap()));
        assert_eq!(pairs[1].1, None);
    }
}
