//! The protocol's addressing primitive (RFC 7622 + XEP-0106).
//!
//! A [`Jid`] is an immutable, escaped-and-normalized `(local?, domain,
//! resource?)` triple. Construct one either from an already-escaped wire
//! string with [`Jid::parse`] (no validation beyond a non-empty domain) or
//! from unescaped parts with [`Jid::create`] (full XEP-0106 escaping + PRECIS
//! + IDNA enforcement).

mod escape;

use std::fmt;
use std::net::{Ipv4Addr, Ipv6Addr};

use once_cell::sync::Lazy;

use crate::error::JidError;
use crate::precis;
use crate::util::BoundedCache;

const MAX_OCTETS: usize = 1023;

static PARSE_CACHE: Lazy<BoundedCache<String, Result<Jid, JidError>>> =
    Lazy::new(|| BoundedCache::new(1024));
static CREATE_CACHE: Lazy<BoundedCache<(Option<String>, String, Option<String>), Result<Jid, JidError>>> =
    Lazy::new(|| BoundedCache::new(128));

/// An immutable, escaped-and-normalized JID.
///
/// Equality and hashing route the domain through IDNA canonicalization, so
/// a U-label and its equivalent A-label compare equal (spec invariant: "JID
/// equality ignores domain label form").
#[derive(Debug, Clone)]
pub struct Jid {
    local: Option<String>,
    domain: String,
    resource: Option<String>,
}

/// The presentation-only, XEP-0106-reversed form of a [`Jid`]. Not suitable
/// for protocol identity or stanza construction — see [`Jid::unescaped`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnescapedJid {
    pub local: Option<String>,
    pub domain: String,
    pub resource: Option<String>,
}

fn is_ip_literal(domain: &str) -> bool {
    if domain.parse::<Ipv4Addr>().is_ok() {
        return true;
    }
    let stripped = domain.trim_start_matches('[').trim_end_matches(']');
    stripped.parse::<Ipv6Addr>().is_ok()
}

fn normalize_domain(domain: &str) -> Result<String, JidError> {
    if domain.is_empty() {
        return Err(JidError::EmptyDomain);
    }
    if is_ip_literal(domain) {
        // Strip brackets for comparison/storage; callers that need wire
        // bracket notation for a literal IPv6 domain re-add them themselves.
        return Ok(domain.trim_start_matches('[').trim_end_matches(']').to_string());
    }
    let trimmed = domain.strip_suffix('.').unwrap_or(domain);
    let ascii = precis::idna_to_ascii(trimmed)?;
    let octets = ascii.as_bytes().len();
    if octets == 0 || octets > MAX_OCTETS {
        return Err(JidError::LengthExceeded { part: "domainpart" });
    }
    Ok(ascii)
}

fn idna_canonical(domain: &str) -> String {
    if is_ip_literal(domain) {
        return domain.to_string();
    }
    precis::idna_to_ascii(domain).unwrap_or_else(|_| domain.to_string())
}

fn check_length(part: &'static str, value: &str) -> Result<(), JidError> {
    let len = value.as_bytes().len();
    if len == 0 || len > MAX_OCTETS {
        return Err(JidError::LengthExceeded { part });
    }
    Ok(())
}

impl Jid {
    /// Parse a JID from an already-escaped wire string. Splits on the
    /// *first* `/` into `rest`/`resource`, then the *first* `@` in `rest`
    /// into `local`/`domain`. Performs no validation beyond a non-empty
    /// domain: the input is trusted to already be escaped/normalized.
    pub fn parse(escaped: &str) -> Result<Jid, JidError> {
        PARSE_CACHE.get_or_insert_with(escaped.to_string(), || Self::parse_uncached(escaped))
    }

    fn parse_uncached(escaped: &str) -> Result<Jid, JidError> {
        let (rest, resource) = match escaped.split_once('/') {
            Some((rest, resource)) => (rest, Some(resource.to_string())),
            None => (escaped, None),
        };
        let (local, domain) = match rest.split_once('@') {
            Some((local, domain)) => (Some(local.to_string()), domain),
            None => (None, rest),
        };
        if domain.is_empty() {
            return Err(JidError::EmptyDomain);
        }
        Ok(Jid {
            local,
            domain: domain.to_string(),
            resource,
        })
    }

    /// Create a JID from unescaped parts, applying XEP-0106 escaping and
    /// PRECIS/IDNA normalization. This is the validating constructor.
    pub fn create(
        local: Option<&str>,
        domain: &str,
        resource: Option<&str>,
    ) -> Result<Jid, JidError> {
        let key = (
            local.map(String::from),
            domain.to_string(),
            resource.map(String::from),
        );
        CREATE_CACHE.get_or_insert_with(key, || Self::create_uncached(local, domain, resource))
    }

    fn create_uncached(
        local: Option<&str>,
        domain: &str,
        resource: Option<&str>,
    ) -> Result<Jid, JidError> {
        let local = match local {
            None => None,
            Some(l) => {
                let escaped = escape::escape_localpart(l)?;
                let enforced = precis::enforce_username_case_mapped("localpart", &escaped)?;
                check_length("localpart", &enforced)?;
                Some(enforced)
            }
        };
        let domain = normalize_domain(domain)?;
        let resource = match resource {
            None => None,
            Some(r) => {
                let enforced = precis::enforce_opaque_string("resourcepart", r)?;
                check_length("resourcepart", &enforced)?;
                Some(enforced)
            }
        };
        Ok(Jid {
            local,
            domain,
            resource,
        })
    }

    /// The local (username) part, if any, in escaped/normalized form.
    pub fn local_str(&self) -> Option<&str> {
        self.local.as_deref()
    }

    /// The domain part, in normalized (A-label or stripped-bracket IP) form.
    pub fn domain_str(&self) -> &str {
        &self.domain
    }

    /// The resource part, if any.
    pub fn resource_str(&self) -> Option<&str> {
        self.resource.as_deref()
    }

    /// Form a bare JID: `local@domain`, or just `domain` if there's no
    /// localpart. Never contains `/`.
    pub fn bare(&self) -> String {
        match &self.local {
            Some(local) => format!("{}@{}", local, self.domain),
            None => self.domain.clone(),
        }
    }

    /// Produce the presentation-only unescaped form. The result is *not* a
    /// [`Jid`] and must never be used for protocol identity or stanza
    /// construction — only for display to a human or gatewaying to a
    /// non-XMPP system.
    pub fn unescaped(&self) -> UnescapedJid {
        UnescapedJid {
            local: self.local.as_deref().map(escape::unescape_localpart),
            domain: self.domain.clone(),
            resource: self.resource.clone(),
        }
    }
}

impl fmt::Display for Jid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(local) = &self.local {
            write!(f, "{}@", local)?;
        }
        write!(f, "{}", self.domain)?;
        if let Some(resource) = &self.resource {
            write!(f, "/{}", resource)?;
        }
        Ok(())
    }
}

impl std::str::FromStr for Jid {
    type Err = JidError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Jid::parse(s)
    }
}

#[cfg(feature = "serde")]
impl serde::Serialize for Jid {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.collect_str(self)
    }
}

#[cfg(feature = "serde")]
impl<'de> serde::Deserialize<'de> for Jid {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let wire = String::deserialize(deserializer)?;
        Jid::parse(&wire).map_err(serde::de::Error::custom)
    }
}

impl PartialEq for Jid {
    fn eq(&self, other: &Self) -> bool {
        self.local == other.local
            && idna_canonical(&self.domain) == idna_canonical(&other.domain)
            && self.resource == other.resource
    }
}

impl Eq for Jid {}

impl std::hash::Hash for Jid {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.local.hash(state);
        idna_canonical(&self.domain).hash(state);
        self.resource.hash(state);
    }
}

impl PartialOrd for Jid {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Jid {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        // Must agree with `Eq`/`Hash`, both of which route the domain
        // through IDNA-canonical comparison: a U-label and its equivalent
        // A-label domain are equal, so they must also be incomparable here,
        // not ordered apart by raw string form.
        (&self.local, idna_canonical(&self.domain), &self.resource).cmp(&(
            &other.local,
            idna_canonical(&other.domain),
            &other.resource,
        ))
    }
}

/// Reset both the `parse` and `create` memoization caches. Exposed for tests
/// that need deterministic, cache-free runs; has no effect on semantics.
pub fn clear_caches() {
    PARSE_CACHE.clear();
    CREATE_CACHE.clear();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_splits_on_first_delimiters() {
        let j = Jid::parse("d\\27artagnan@musketeers.lit/foo/bar@qux!quux").unwrap();
        assert_eq!(j.local_str(), Some("d\\27artagnan"));
        assert_eq!(j.domain_str(), "musketeers.lit");
        assert_eq!(j.resource_str(), Some("foo/bar@qux!quux"));
        assert_eq!(j.unescaped().local, Some("d'artagnan".to_string()));
    }

    #[test]
    fn create_escapes_and_lowercases() {
        let j = Jid::create(Some("John O'Hara"), "writers.club.", None).unwrap();
        assert_eq!(j.to_string(), "john\\20o\\27hara@writers.club");
        assert_eq!(j.bare(), "john\\20o\\27hara@writers.club");
    }

    #[test]
    fn create_without_local() {
        let j = Jid::create(None, "writers.club", None).unwrap();
        assert_eq!(j.local_str(), None);
        assert_eq!(j.bare(), "writers.club");
        assert_eq!(j.to_string(), "writers.club");
    }

    #[test]
    fn create_accepts_ip_literal_domain() {
        assert!(Jid::create(None, "127.0.0.1", None).is_ok());
    }

    #[test]
    fn create_rejects_boundary_space() {
        let err = Jid::create(Some(" INVALID"), "JID", None).unwrap_err();
        assert_eq!(err, JidError::LocalpartBoundarySpace);
    }

    #[test]
    fn create_rejects_overlong_local() {
        let local = "a".repeat(1024);
        let err = Jid::create(Some(&local), "example.org", None).unwrap_err();
        assert_eq!(
            err,
            JidError::LengthExceeded {
                part: "localpart"
            }
        );
    }

    #[test]
    fn create_rejects_zero_width_space_in_domain() {
        let err = Jid::create(Some("INVALID"), "example\u{200B}.org", None).unwrap_err();
        assert!(matches!(err, JidError::InvalidIdn { .. }));
    }

    #[test]
    fn create_rejects_zero_width_space_in_local() {
        let err = Jid::create(Some("INVAL\u{200B}ID"), "example.org", None).unwrap_err();
        assert_eq!(
            err,
            JidError::PrecisViolation {
                part: "localpart",
                profile: "UsernameCaseMapped",
            }
        );
    }

    #[test]
    fn equality_ignores_domain_label_form() {
        let j1 = Jid::parse("porthos@\u{9283}\u{58eb}.lit").unwrap();
        let j2 = Jid::create(Some("porthos"), "xn--zqs335k.lit", None).unwrap();
        assert_eq!(j1, j2);
        use std::collections::hash_map::DefaultHasher;
        use std::hash::{Hash, Hasher};
        let mut h1 = DefaultHasher::new();
        let mut h2 = DefaultHasher::new();
        j1.hash(&mut h1);
        j2.hash(&mut h2);
        assert_eq!(h1.finish(), h2.finish());
        assert_eq!(j1.cmp(&j2), std::cmp::Ordering::Equal, "Eq and Ord must agree on domain label form");
    }

    #[test]
    fn parse_rejects_empty_domain() {
        assert_eq!(Jid::parse("user@").unwrap_err(), JidError::EmptyDomain);
    }
}
