//! XEP-0106 escaping: the bidirectional reserved-octet map applied to a JID
//! localpart on the wire.

/// `(raw, escaped)` pairs for the exact XEP-0106 table. Kept as a flat slice
/// rather than a `HashMap` since it's iterated both ways and has only ten
/// entries.
const ESCAPE_TABLE: &[(char, &str)] = &[
    (' ', "\\20"),
    ('"', "\\22"),
    ('&', "\\26"),
    ('\'', "\\27"),
    ('/', "\\2f"),
    (':', "\\3a"),
    ('<', "\\3c"),
    ('>', "\\3e"),
    ('@', "\\40"),
    ('\\', "\\5c"),
]; // lands on the 10 reserved octets from XEP-0106 §4

fn escape_of(c: char) -> Option<&'static str> {
    ESCAPE_TABLE.iter().find(|(raw, _)| *raw == c).map(|(_, e)| *e)
}

fn unescape_of(seq: &str) -> Option<char> {
    ESCAPE_TABLE.iter().find(|(_, e)| *e == seq).map(|(raw, _)| *raw)
}

/// Escape `local` per XEP-0106. Rejects a localpart starting or ending with
/// SPACE (even though SPACE itself is an escape target, a leading/trailing
/// one would still be ambiguous presentation-wise, so the spec forbids it
/// up front).
pub(crate) fn escape_localpart(local: &str) -> Result<String, crate::error::JidError> {
    if local.starts_with(' ') || local.ends_with(' ') {
        return Err(crate::error::JidError::LocalpartBoundarySpace);
    }
    let mut out = String::with_capacity(local.len());
    for c in local.chars() {
        match escape_of(c) {
            Some(seq) => out.push_str(seq),
            None => out.push(c),
        }
    }
    Ok(out)
}

/// Reverse XEP-0106 escaping. Only a `\` immediately followed by two
/// hex-like characters that form a known escape sequence is substituted;
/// any other backslash run is preserved literally.
pub(crate) fn unescape_localpart(local: &str) -> String {
    let chars: Vec<char> = local.chars().collect();
    let mut out = String::with_capacity(local.len());
    let mut i = 0;
    while i < chars.len() {
        if chars[i] == '\\' && i + 2 < chars.len() {
            let seq: String = chars[i..i + 3].iter().collect();
            if let Some(c) = unescape_of(&seq) {
                out.push(c);
                i += 3;
                continue;
            }
        }
        out.push(chars[i]);
        i += 1;
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trip_reserved_octets() {
        let raw = " \"&'/:<>@\\".trim_start().trim_end_matches(' ');
        // escape/unescape without the leading/trailing SPACE restriction
        let escaped = escape_localpart(raw).unwrap();
        assert_eq!(unescape_localpart(&escaped), raw);
    }

    #[test]
    fn rejects_leading_space() {
        assert!(escape_localpart(" x").is_err());
    }

    #[test]
    fn rejects_trailing_space() {
        assert!(escape_localpart("x ").is_err());
    }

    #[test]
    fn unescape_preserves_unknown_sequences() {
        assert_eq!(unescape_localpart("foo\\99bar"), "foo\\99bar");
    }

    #[test]
    fn escape_example_from_spec() {
        // d'Artagnan style example from the spec's worked scenario
        assert_eq!(escape_localpart("d'artagnan").unwrap(), "d\\27artagnan");
    }
}
