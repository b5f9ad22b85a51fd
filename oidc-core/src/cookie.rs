//! Session cookie encoding/decoding and manual Cookie-header parsing.
//!
//! The cookie value is `<domain_id>:<urlsafe_b64(session_cookie_id)>`, so
//! a single cookie name can be reused across multiple registered
//! application domains without collision: the stored session cookie id is
//! resolved by first matching on `domain_id`, not just on cookie name.
//!
//! The `Cookie` request header is parsed by hand, not via a generic
//! cookie-jar crate, because a single header line may carry the same
//! cookie name more than once (one per domain the browser attaches it
//! for) and a jar keyed purely by name would silently drop all but one.

use anyhow::{Context, Result, anyhow};
use base64::Engine as _;
use regex::Regex;
use uuid::Uuid;

/// One `name=value` pair recovered from a `Cookie` header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawCookie {
    pub name: String,
    pub value: String,
}

/// Split a `Cookie` header into its `name=value` segments. Segments are
/// separated by `"; "` or `";"`; values are taken verbatim (no further
/// percent-decoding, matching how the session cookie value is composed).
pub fn parse_cookie_header(header: &str) -> Vec<RawCookie> {
    header
        .split(';')
        .filter_map(|segment| {
            let segment = segment.trim();
            let (name, value) = segment.split_once('=')?;
            Some(RawCookie {
                name: name.trim().to_string(),
                value: value.trim().to_string(),
            })
        })
        .collect()
}

/// Build the cookie value for a given domain id and session cookie id.
pub fn encode_cookie_value(domain_id: &str, session_cookie_id: Uuid) -> String {
    let encoded =
        base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(session_cookie_id.as_bytes());
    format!("{domain_id}:{encoded}")
}

/// Recover `(domain_id, session_cookie_id)` from a cookie value produced
/// by [`encode_cookie_value`].
pub fn decode_cookie_value(value: &str) -> Result<(String, Uuid)> {
    let (domain_id, encoded) = value
        .split_once(':')
        .ok_or_else(|| anyhow!("malformed cookie value: missing domain prefix"))?;
    let bytes = base64::engine::general_purpose::URL_SAFE_NO_PAD
        .decode(encoded)
        .context("malformed cookie value: invalid base64")?;
    let id = Uuid::from_slice(&bytes).context("malformed cookie value: not a session id")?;
    Ok((domain_id.to_string(), id))
}

/// Find this application's session cookie among every `name=value` pair
/// in a `Cookie` header, verifying that its decoded `domain_id` matches
/// the domain the request is being introspected for.
pub fn find_session_cookie_id(
    header: &str,
    cookie_name: &str,
    expected_domain_id: &str,
) -> Option<Uuid> {
    parse_cookie_header(header).into_iter().find_map(|c| {
        if c.name != cookie_name {
            return None;
        }
        let (domain_id, id) = decode_cookie_value(&c.value).ok()?;
        if domain_id == expected_domain_id {
            Some(id)
        } else {
            None
        }
    })
}

/// Compiled pattern to strip this application's cookie out of a `Cookie`
/// header before forwarding it upstream, so the upstream service never
/// sees the session cookie it has no use for.
pub struct CookieStripper {
    pattern: Regex,
}

impl CookieStripper {
    pub fn new(cookie_name: &str) -> Self {
        let escaped = regex::escape(cookie_name);
        let pattern = Regex::new(&format!("(^{escaped}=[^;]*; ?|; ?{escaped}=[^;]*)"))
            .expect("cookie stripper pattern is always valid");
        Self { pattern }
    }

    pub fn strip(&self, header: &str) -> String {
        self.pattern.replace_all(header, "").into_owned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_multiple_same_named_cookies() {
        let header = "SeaCatSCI=appA:AAAA; SeaCatSCI=appB:BBBB; other=1";
        let cookies = parse_cookie_header(header);
        assert_eq!(cookies.len(), 3);
        assert_eq!(cookies[0].value, "appA:AAAA");
        assert_eq!(cookies[1].value, "appB:BBBB");
    }

    #[test]
    fn encode_decode_round_trip() {
        let id = Uuid::new_v4();
        let value = encode_cookie_value("myapp", id);
        let (domain_id, decoded_id) = decode_cookie_value(&value).unwrap();
        assert_eq!(domain_id, "myapp");
        assert_eq!(decoded_id, id);
    }

    #[test]
    fn find_session_cookie_matches_only_expected_domain() {
        let id_a = Uuid::new_v4();
        let id_b = Uuid::new_v4();
        let header = format!(
            "SeaCatSCI={}; SeaCatSCI={}",
            encode_cookie_value("appA", id_a),
            encode_cookie_value("appB", id_b)
        );
        assert_eq!(
            find_session_cookie_id(&header, "SeaCatSCI", "appB"),
            Some(id_b)
        );
        assert_eq!(
            find_session_cookie_id(&header, "SeaCatSCI", "appC"),
            None
        );
    }

    #[test]
    fn stripper_removes_cookie_wherever_it_appears() {
        let stripper = CookieStripper::new("SeaCatSCI");
        assert_eq!(
            stripper.strip("SeaCatSCI=abc; other=1"),
            "other=1"
        );
        assert_eq!(
            stripper.strip("other=1; SeaCatSCI=abc"),
            "other=1"
        );
        assert_eq!(
            stripper.strip("a=1; SeaCatSCI=abc; b=2"),
            "a=1; b=2"
        );
    }

    #[test]
    fn decode_rejects_missing_domain_prefix() {
        assert!(decode_cookie_value("not-a-valid-value").is_err());
    }
}
