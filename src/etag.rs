//! Entity tags and HTTP-date codec (C2): strong/weak ETag comparison per
//! RFC 7232, and `SystemTime` <-> RFC 7231/RFC 3339 date conversion.

use std::fmt::Display;
use std::str::FromStr;
use std::time::SystemTime;

use headers::Header;
use http::header::HeaderValue;

fn invalid() -> headers::Error {
    headers::Error::invalid()
}

/// An entity tag: a pair of an opaque tag and a weak/strong flag
/// (RFC 7232 §2.3). Strong equality requires both the flag and the tag
/// to match; a weak tag never strong-compares equal to anything,
/// including another copy of itself with the same tag text, since two
/// weak tags are only ever compared weakly by callers that ask for it
/// explicitly via [`ETag::weak_eq`].
#[derive(Debug, Clone)]
pub struct ETag {
    tag: String,
    weak: bool,
}

impl ETag {
    pub fn new(weak: bool, t: impl Into<String>) -> Result<ETag, headers::Error> {
        let t = t.into();
        if t.contains('"') {
            Err(invalid())
        } else {
            Ok(ETag { tag: t, weak })
        }
    }

    /// Build the canonical strong ETag for a resource's current metadata:
    /// `len-mtime` in hex, Apache style.
    pub fn from_parts(len: u64, modified: Option<SystemTime>) -> ETag {
        let tag = match modified.and_then(|t| t.duration_since(SystemTime::UNIX_EPOCH).ok()) {
            Some(d) => format!("{:x}-{:x}", len, d.as_secs() * 1_000_000 + d.subsec_micros() as u64),
            None => format!("{:x}", len),
        };
        ETag { tag, weak: false }
    }

    pub fn is_weak(&self) -> bool {
        self.weak
    }

    pub fn tag(&self) -> &str {
        &self.tag
    }

    /// Strong comparison, per RFC 7232 §2.3.2: both tags must be strong
    /// and the opaque tag text must match exactly.
    pub fn strong_eq(&self, other: &ETag) -> bool {
        !self.weak && !other.weak && self.tag == other.tag
    }

    /// Weak comparison: opaque tag text matches, flags ignored.
    pub fn weak_eq(&self, other: &ETag) -> bool {
        self.tag == other.tag
    }
}

impl FromStr for ETag {
    type Err = headers::Error;

    fn from_str(t: &str) -> Result<Self, Self::Err> {
        let (weak, s) = match t.strip_prefix("W/") {
            Some(rest) => (true, rest),
            None => (false, t),
        };
        if s.len() >= 2 && s.starts_with('"') && s.ends_with('"') && !s[1..s.len() - 1].contains('"') {
            Ok(ETag { tag: s[1..s.len() - 1].to_owned(), weak })
        } else {
            Err(invalid())
        }
    }
}

impl Display for ETag {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        if self.weak {
            write!(f, "W/\"{}\"", self.tag)
        } else {
            write!(f, "\"{}\"", self.tag)
        }
    }
}

impl PartialEq for ETag {
    fn eq(&self, other: &Self) -> bool {
        self.strong_eq(other)
    }
}

/// Header wire form, reusing the standard `headers::ETag` name but our
/// own weak-tracking type (the `headers` crate's built-in `ETag` drops
/// the weak flag on comparison in a way that isn't spelled out).
impl Header for ETag {
    fn name() -> &'static http::HeaderName {
        static NAME: http::HeaderName = http::HeaderName::from_static("etag");
        &NAME
    }

    fn decode<'i, I>(values: &mut I) -> Result<Self, headers::Error>
    where
        I: Iterator<Item = &'i HeaderValue>,
    {
        let v = values.next().ok_or_else(invalid)?;
        if values.next().is_some() {
            return Err(invalid());
        }
        ETag::from_str(v.to_str().map_err(|_| invalid())?)
    }

    fn encode<E>(&self, values: &mut E)
    where
        E: Extend<HeaderValue>,
    {
        values.extend(std::iter::once(HeaderValue::from_str(&self.to_string()).unwrap()));
    }
}

const HTTPDATE_FMT: &str = "%a, %d %b %Y %H:%M:%S GMT";
const RFC850_FMT: &str = "%A, %d-%b-%y %H:%M:%S GMT";
const ASCTIME_FMT: &str = "%a %b %e %H:%M:%S %Y";

/// Convert a `SystemTime` to an RFC 7231 `HTTP-date` string, as used in
/// `Last-Modified`/`Date`/`If-Modified-Since` etc.
pub fn systemtime_to_httpdate(t: SystemTime) -> String {
    let dt: chrono::DateTime<chrono::Utc> = t.into();
    dt.format(HTTPDATE_FMT).to_string()
}

/// Parse an RFC 7231 `HTTP-date` string. Also accepts the obsolete RFC 850
/// and asctime formats, as required for `If-Modified-Since` compatibility
/// with older clients (RFC 7231 §7.1.1.1).
pub fn httpdate_to_systemtime(s: &str) -> Option<SystemTime> {
    use chrono::{NaiveDateTime, Utc};
    let naive = NaiveDateTime::parse_from_str(s, HTTPDATE_FMT)
        .or_else(|_| NaiveDateTime::parse_from_str(s, RFC850_FMT))
        .or_else(|_| NaiveDateTime::parse_from_str(s, ASCTIME_FMT))
        .ok()?;
    Some(naive.and_utc().with_timezone(&Utc).into())
}

/// Convert a `SystemTime` to an RFC 3339 string (`1996-12-19T16:39:57Z`),
/// used for the `creationdate` live property.
pub fn systemtime_to_rfc3339(t: SystemTime) -> String {
    let dt: chrono::DateTime<chrono::Utc> = t.into();
    dt.to_rfc3339_opts(chrono::SecondsFormat::Secs, true)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn etag_header() {
        let t1 = ETag::from_str(r#"W/"12345""#).unwrap();
        let t2 = ETag::from_str(r#"W/"12345""#).unwrap();
        let t3 = ETag::from_str(r#""12346""#).unwrap();
        let t4 = ETag::from_str(r#""12346""#).unwrap();
        assert!(t1 != t2); // weak never strong-matches, even itself
        assert!(t2 != t3);
        assert!(t3 == t4);
    }

    #[test]
    fn rfc3339_epoch() {
        assert_eq!(systemtime_to_rfc3339(SystemTime::UNIX_EPOCH), "1970-01-01T00:00:00Z");
    }

    #[test]
    fn httpdate_roundtrip() {
        let s = systemtime_to_httpdate(SystemTime::UNIX_EPOCH);
        let back = httpdate_to_systemtime(&s).unwrap();
        assert_eq!(back, SystemTime::UNIX_EPOCH);
    }
}
