//! Thin facades over PRECIS (RFC 8264) profile enforcement and IDNA (RFC 5890)
//! domain-name encoding, as consumed by [`crate::jid`].
//!
//! Both profiles perform width-mapping, case-mapping (for
//! `UsernameCaseMapped`), Unicode normalization and disallowed-code-point
//! rejection; we don't reimplement any of that here, we just adapt
//! `precis-core`/`precis-profiles`'s and `idna`'s error types into the
//! crate's [`JidError`] taxonomy.

use precis_core::profile::Profile;
use precis_profiles::{OpaqueString, UsernameCaseMapped};

use crate::error::JidError;

/// Enforce the `UsernameCaseMapped` PRECIS profile (used for the JID localpart
/// after XEP-0106 escaping has been applied).
pub(crate) fn enforce_username_case_mapped(part: &'static str, value: &str) -> Result<String, JidError> {
    UsernameCaseMapped::new()
        .enforce(value)
        .map(|cow| cow.into_owned())
        .map_err(|_| JidError::PrecisViolation {
            part,
            profile: "UsernameCaseMapped",
        })
}

/// Enforce the `OpaqueString` PRECIS profile (used for the JID resourcepart).
pub(crate) fn enforce_opaque_string(part: &'static str, value: &str) -> Result<String, JidError> {
    OpaqueString::new()
        .enforce(value)
        .map(|cow| cow.into_owned())
        .map_err(|_| JidError::PrecisViolation {
            part,
            profile: "OpaqueString",
        })
}

/// Encode a U-label domain into its ASCII A-label form (RFC 5890). Trailing
/// dots are not stripped here; callers normalize that first.
pub(crate) fn idna_to_ascii(domain: &str) -> Result<String, JidError> {
    idna::domain_to_ascii(domain).map_err(|e| JidError::InvalidIdn {
        reason: e.to_string(),
    })
}
