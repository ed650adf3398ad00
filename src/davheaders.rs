//! C7 (request parsers, header half): typed `headers::Header` impls for
//! the WebDAV-specific request/response headers (§6's "headers
//! consumed"/"headers produced" lists). `If` lives in `ifheader.rs`
//! (it needs the lock manager to evaluate, unlike these); `ETag` lives
//! in `etag.rs` (it's shared with the precondition engine and isn't
//! DAV-specific). `lazy_static!` is replaced by `std::sync::LazyLock`
//! (stable since edition 2024, no extra dependency needed); a
//! regex-based `Destination` parser is replaced by `url::Url` since
//! `regex` was never a declared dependency of this crate.

use std::convert::TryFrom;
use std::sync::LazyLock;

use headers::Header;
use http::header::{HeaderName, HeaderValue};

use crate::etag::ETag;

pub static DEPTH: LazyLock<HeaderName> = LazyLock::new(|| HeaderName::from_static("depth"));
pub static TIMEOUT: LazyLock<HeaderName> = LazyLock::new(|| HeaderName::from_static("timeout"));
pub static OVERWRITE: LazyLock<HeaderName> = LazyLock::new(|| HeaderName::from_static("overwrite"));
pub static DESTINATION: LazyLock<HeaderName> = LazyLock::new(|| HeaderName::from_static("destination"));
pub static IF_RANGE: LazyLock<HeaderName> = LazyLock::new(|| HeaderName::from_static("if-range"));
pub static IF_MATCH: LazyLock<HeaderName> = LazyLock::new(|| HeaderName::from_static("if-match"));
pub static IF_NONE_MATCH: LazyLock<HeaderName> = LazyLock::new(|| HeaderName::from_static("if-none-match"));
pub static CONTENT_LANGUAGE: LazyLock<HeaderName> = LazyLock::new(|| HeaderName::from_static("content-language"));

fn one<'i, I>(values: &mut I) -> Result<&'i HeaderValue, headers::Error>
where
    I: Iterator<Item = &'i HeaderValue>,
{
    let v = values.next().ok_or_else(invalid)?;
    if values.next().is_some() { Err(invalid()) } else { Ok(v) }
}

fn invalid() -> headers::Error {
    headers::Error::invalid()
}

fn map_invalid(_e: impl std::error::Error) -> headers::Error {
    headers::Error::invalid()
}

macro_rules! header {
    ($tname:ident, $hname:ident, $sname:expr) => {
        pub static $hname: LazyLock<HeaderName> = LazyLock::new(|| HeaderName::from_static($sname));

        #[derive(Debug, Clone, PartialEq)]
        pub struct $tname(pub String);

        impl Header for $tname {
            fn name() -> &'static HeaderName {
                &$hname
            }

            fn decode<'i, I>(values: &mut I) -> Result<Self, headers::Error>
            where
                I: Iterator<Item = &'i HeaderValue>,
            {
                one(values)?.to_str().map(|x| $tname(x.to_owned())).map_err(map_invalid)
            }

            fn encode<E>(&self, values: &mut E)
            where
                E: Extend<HeaderValue>,
            {
                let value = HeaderValue::from_str(&self.0).unwrap();
                values.extend(std::iter::once(value))
            }
        }
    };
}

header!(ContentType, CONTENT_TYPE, "content-type");
header!(ContentLocation, CONTENT_LOCATION, "content-location");
header!(LockToken, LOCK_TOKEN, "lock-token");

/// `Depth:` header (§6).
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Depth {
    Zero,
    One,
    Infinity,
}

impl Header for Depth {
    fn name() -> &'static HeaderName {
        &DEPTH
    }

    fn decode<'i, I>(values: &mut I) -> Result<Self, headers::Error>
    where
        I: Iterator<Item = &'i HeaderValue>,
    {
        let value = one(values)?;
        match value.as_bytes() {
            b"0" => Ok(Depth::Zero),
            b"1" => Ok(Depth::One),
            b"infinity" | b"Infinity" => Ok(Depth::Infinity),
            _ => Err(invalid()),
        }
    }

    fn encode<E>(&self, values: &mut E)
    where
        E: Extend<HeaderValue>,
    {
        let value = match *self {
            Depth::Zero => "0",
            Depth::One => "1",
            Depth::Infinity => "infinity",
        };
        values.extend(std::iter::once(HeaderValue::from_static(value)));
    }
}

/// `Content-Language:` header, validated as a loose RFC 5646 language tag.
#[derive(Debug, Clone, PartialEq)]
pub struct ContentLanguage(headers::Vary);

impl ContentLanguage {
    pub fn iter_langs(&self) -> impl Iterator<Item = &str> {
        self.0.iter_strs()
    }
}

impl TryFrom<&str> for ContentLanguage {
    type Error = headers::Error;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        let value = HeaderValue::from_str(value).map_err(map_invalid)?;
        let mut values = std::iter::once(&value);
        ContentLanguage::decode(&mut values)
    }
}

impl Header for ContentLanguage {
    fn name() -> &'static HeaderName {
        &CONTENT_LANGUAGE
    }

    fn decode<'i, I>(values: &mut I) -> Result<Self, headers::Error>
    where
        I: Iterator<Item = &'i HeaderValue>,
    {
        let h = headers::Vary::decode(values)?;
        for lang in h.iter_strs() {
            let lang = lang.as_bytes();
            let ok = lang.len() == 2 || (lang.len() > 4 && lang[2] == b'-');
            if !ok {
                return Err(invalid());
            }
        }
        Ok(ContentLanguage(h))
    }

    fn encode<E>(&self, values: &mut E)
    where
        E: Extend<HeaderValue>,
    {
        self.0.encode(values)
    }
}

/// One duration in a `Timeout:` header's comma-separated preference list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DavTimeout {
    Seconds(u32),
    Infinite,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Timeout(pub Vec<DavTimeout>);

impl Header for Timeout {
    fn name() -> &'static HeaderName {
        &TIMEOUT
    }

    fn decode<'i, I>(values: &mut I) -> Result<Self, headers::Error>
    where
        I: Iterator<Item = &'i HeaderValue>,
    {
        let value = one(values)?;
        let mut v = Vec::new();
        for word in value.to_str().map_err(map_invalid)?.split(',') {
            let word = word.trim();
            let w = match word {
                "Infinite" => DavTimeout::Infinite,
                _ if word.starts_with("Second-") => {
                    let num: u32 = word[7..].parse().map_err(map_invalid)?;
                    DavTimeout::Seconds(num)
                },
                _ => return Err(invalid()),
            };
            v.push(w);
        }
        if v.is_empty() {
            return Err(invalid());
        }
        Ok(Timeout(v))
    }

    fn encode<E>(&self, values: &mut E)
    where
        E: Extend<HeaderValue>,
    {
        let parts: Vec<String> = self
            .0
            .iter()
            .map(|t| match t {
                DavTimeout::Seconds(n) => format!("Second-{}", n),
                DavTimeout::Infinite => "Infinite".to_string(),
            })
            .collect();
        values.extend(std::iter::once(HeaderValue::from_str(&parts.join(", ")).unwrap()));
    }
}

/// `Destination:` header - a path, possibly given as an absolute URL.
/// Only the path component is kept; the caller resolves it against the
/// service prefix with `DavPath::from_str_and_prefix`.
#[derive(Debug, Clone, PartialEq)]
pub struct Destination(pub String);

impl Header for Destination {
    fn name() -> &'static HeaderName {
        &DESTINATION
    }

    fn decode<'i, I>(values: &mut I) -> Result<Self, headers::Error>
    where
        I: Iterator<Item = &'i HeaderValue>,
    {
        let s = one(values)?.to_str().map_err(map_invalid)?;
        if s.starts_with('/') {
            return Ok(Destination(s.to_string()));
        }
        let url = url::Url::parse(s).map_err(map_invalid)?;
        Ok(Destination(url.path().to_string()))
    }

    fn encode<E>(&self, values: &mut E)
    where
        E: Extend<HeaderValue>,
    {
        values.extend(std::iter::once(HeaderValue::from_str(&self.0).unwrap()));
    }
}

/// `Overwrite:` header (`T`/`F`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Overwrite(pub bool);

impl Header for Overwrite {
    fn name() -> &'static HeaderName {
        &OVERWRITE
    }

    fn decode<'i, I>(values: &mut I) -> Result<Self, headers::Error>
    where
        I: Iterator<Item = &'i HeaderValue>,
    {
        match one(values)?.as_bytes() {
            b"F" => Ok(Overwrite(false)),
            b"T" => Ok(Overwrite(true)),
            _ => Err(invalid()),
        }
    }

    fn encode<E>(&self, values: &mut E)
    where
        E: Extend<HeaderValue>,
    {
        values.extend(std::iter::once(HeaderValue::from_static(if self.0 { "T" } else { "F" })));
    }
}

/// `If-Range:` header: either an `ETag` or a date.
#[derive(Debug, Clone, PartialEq)]
pub enum IfRange {
    ETag(ETag),
    Date(headers::Date),
}

impl Header for IfRange {
    fn name() -> &'static HeaderName {
        &IF_RANGE
    }

    fn decode<'i, I>(values: &mut I) -> Result<Self, headers::Error>
    where
        I: Iterator<Item = &'i HeaderValue>,
    {
        let value = one(values)?;

        let mut iter = std::iter::once(value);
        if let Ok(tm) = headers::Date::decode(&mut iter) {
            return Ok(IfRange::Date(tm));
        }
        let mut iter = std::iter::once(value);
        if let Ok(et) = ETag::decode(&mut iter) {
            return Ok(IfRange::ETag(et));
        }
        Err(invalid())
    }

    fn encode<E>(&self, values: &mut E)
    where
        E: Extend<HeaderValue>,
    {
        match self {
            IfRange::Date(d) => d.encode(values),
            IfRange::ETag(t) => t.encode(values),
        }
    }
}

/// `If-Match:`/`If-None-Match:` value: either `*` or an explicit list.
#[derive(Debug, Clone, PartialEq)]
pub enum ETagList {
    Tags(Vec<ETag>),
    Star,
}

impl ETagList {
    /// Convert to the precondition engine's `MatchList` representation.
    pub fn into_match_list(self) -> crate::precondition::MatchList {
        match self {
            ETagList::Star => crate::precondition::MatchList::Any,
            ETagList::Tags(tags) => crate::precondition::MatchList::Tags(tags),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct IfMatch(pub ETagList);

#[derive(Debug, Clone, PartialEq)]
pub struct IfNoneMatch(pub ETagList);

// Not a fully conformant quoted-string parser - commas inside an etag's
// opaque-tag are not handled.
fn decode_etaglist<'i, I>(values: &mut I) -> Result<ETagList, headers::Error>
where
    I: Iterator<Item = &'i HeaderValue>,
{
    let mut v = Vec::new();
    let mut count = 0usize;
    for value in values {
        let s = value.to_str().map_err(map_invalid)?;
        if s.trim() == "*" {
            return Ok(ETagList::Star);
        }
        for t in s.split(',') {
            if let Ok(t) = ETag::from_str(t.trim()) {
                v.push(t);
            }
        }
        count += 1;
    }
    if count != 0 { Ok(ETagList::Tags(v)) } else { Err(invalid()) }
}

fn encode_etaglist<E>(m: &ETagList, values: &mut E)
where
    E: Extend<HeaderValue>,
{
    let value = match m {
        ETagList::Star => "*".to_string(),
        ETagList::Tags(t) => t.iter().map(|t| t.to_string()).collect::<Vec<_>>().join(", "),
    };
    values.extend(std::iter::once(HeaderValue::from_str(&value).unwrap()));
}

impl Header for IfMatch {
    fn name() -> &'static HeaderName {
        &IF_MATCH
    }

    fn decode<'i, I>(values: &mut I) -> Result<Self, headers::Error>
    where
        I: Iterator<Item = &'i HeaderValue>,
    {
        Ok(IfMatch(decode_etaglist(values)?))
    }

    fn encode<E>(&self, values: &mut E)
    where
        E: Extend<HeaderValue>,
    {
        encode_etaglist(&self.0, values)
    }
}

impl Header for IfNoneMatch {
    fn name() -> &'static HeaderName {
        &IF_NONE_MATCH
    }

    fn decode<'i, I>(values: &mut I) -> Result<Self, headers::Error>
    where
        I: Iterator<Item = &'i HeaderValue>,
    {
        Ok(IfNoneMatch(decode_etaglist(values)?))
    }

    fn encode<E>(&self, values: &mut E)
    where
        E: Extend<HeaderValue>,
    {
        encode_etaglist(&self.0, values)
    }
}

pub static RANGE: LazyLock<HeaderName> = LazyLock::new(|| HeaderName::from_static("range"));
pub static CONTENT_RANGE: LazyLock<HeaderName> = LazyLock::new(|| HeaderName::from_static("content-range"));

/// One unit of a `Range:` header's comma-separated list (RFC 7233 §2.1).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ByteRangeSpec {
    /// `first-last`.
    FromTo(u64, u64),
    /// `first-`.
    AllFrom(u64),
    /// `-suffix_len`: the last `suffix_len` bytes.
    Last(u64),
}

/// `Range: bytes=...`. Only the `bytes` unit is supported, matching
/// every client this engine has ever seen in practice.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Range(pub Vec<ByteRangeSpec>);

impl Header for Range {
    fn name() -> &'static HeaderName {
        &RANGE
    }

    fn decode<'i, I>(values: &mut I) -> Result<Self, headers::Error>
    where
        I: Iterator<Item = &'i HeaderValue>,
    {
        let value = one(values)?.to_str().map_err(map_invalid)?;
        let rest = value.strip_prefix("bytes=").ok_or_else(invalid)?;
        let mut specs = Vec::new();
        for part in rest.split(',') {
            let part = part.trim();
            let spec = match part.split_once('-') {
                Some(("", suffix)) => ByteRangeSpec::Last(suffix.parse().map_err(map_invalid)?),
                Some((first, "")) => ByteRangeSpec::AllFrom(first.parse().map_err(map_invalid)?),
                Some((first, last)) => {
                    let first: u64 = first.parse().map_err(map_invalid)?;
                    let last: u64 = last.parse().map_err(map_invalid)?;
                    if last < first {
                        return Err(invalid());
                    }
                    ByteRangeSpec::FromTo(first, last)
                },
                None => return Err(invalid()),
            };
            specs.push(spec);
        }
        if specs.is_empty() {
            return Err(invalid());
        }
        Ok(Range(specs))
    }

    fn encode<E>(&self, values: &mut E)
    where
        E: Extend<HeaderValue>,
    {
        let parts: Vec<String> = self
            .0
            .iter()
            .map(|s| match s {
                ByteRangeSpec::FromTo(a, b) => format!("{}-{}", a, b),
                ByteRangeSpec::AllFrom(a) => format!("{}-", a),
                ByteRangeSpec::Last(n) => format!("-{}", n),
            })
            .collect();
        values.extend(std::iter::once(HeaderValue::from_str(&format!("bytes={}", parts.join(","))).unwrap()));
    }
}

/// `Content-Range:` response header for a `206`/`416`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ContentRange {
    pub start: u64,
    pub end: u64,
    pub complete_length: Option<u64>,
}

impl Header for ContentRange {
    fn name() -> &'static HeaderName {
        &CONTENT_RANGE
    }

    fn decode<'i, I>(values: &mut I) -> Result<Self, headers::Error>
    where
        I: Iterator<Item = &'i HeaderValue>,
    {
        let value = one(values)?.to_str().map_err(map_invalid)?;
        let rest = value.strip_prefix("bytes ").ok_or_else(invalid)?;
        let (range, total) = rest.split_once('/').ok_or_else(invalid)?;
        let (start, end) = range.split_once('-').ok_or_else(invalid)?;
        let complete_length = if total == "*" { None } else { Some(total.parse().map_err(map_invalid)?) };
        Ok(ContentRange {
            start: start.parse().map_err(map_invalid)?,
            end: end.parse().map_err(map_invalid)?,
            complete_length,
        })
    }

    fn encode<E>(&self, values: &mut E)
    where
        E: Extend<HeaderValue>,
    {
        let total = self.complete_length.map(|n| n.to_string()).unwrap_or_else(|| "*".to_string());
        let value = format!("bytes {}-{}/{}", self.start, self.end, total);
        values.extend(std::iter::once(HeaderValue::from_str(&value).unwrap()));
    }
}

#[cfg(test)]
mod tests {
    use std::str::FromStr;

    use super::*;

    #[test]
    fn depth_header() {
        let hdrval = HeaderValue::from_static("infinity");
        let mut iter = std::iter::once(&hdrval);
        assert_eq!(Depth::decode(&mut iter).unwrap(), Depth::Infinity);
    }

    #[test]
    fn timeout_header() {
        let hdrval = HeaderValue::from_static("Second-60, Infinite");
        let mut iter = std::iter::once(&hdrval);
        let t = Timeout::decode(&mut iter).unwrap();
        assert_eq!(t.0, vec![DavTimeout::Seconds(60), DavTimeout::Infinite]);
    }

    #[test]
    fn destination_from_absolute_url() {
        let hdrval = HeaderValue::from_static("http://example.com/a/b?x=1");
        let mut iter = std::iter::once(&hdrval);
        let d = Destination::decode(&mut iter).unwrap();
        assert_eq!(d.0, "/a/b");
    }

    #[test]
    fn etaglist_star() {
        let hdrval = HeaderValue::from_static("*");
        let mut iter = std::iter::once(&hdrval);
        assert_eq!(IfMatch::decode(&mut iter).unwrap().0, ETagList::Star);
    }

    #[test]
    fn etaglist_tags() {
        let hdrval = HeaderValue::from_static(r#""a", "b""#);
        let mut iter = std::iter::once(&hdrval);
        let ETagList::Tags(tags) = IfNoneMatch::decode(&mut iter).unwrap().0 else {
            panic!("expected tag list")
        };
        assert_eq!(tags.len(), 2);
    }

    #[test]
    fn range_header_multi() {
        let hdrval = HeaderValue::from_static("bytes=0-499,-500,1000-");
        let mut iter = std::iter::once(&hdrval);
        let r = Range::decode(&mut iter).unwrap();
        assert_eq!(
            r.0,
            vec![ByteRangeSpec::FromTo(0, 499), ByteRangeSpec::Last(500), ByteRangeSpec::AllFrom(1000)]
        );
    }

    #[test]
    fn content_range_roundtrip() {
        let hdrval = HeaderValue::from_static("bytes 0-499/1234");
        let mut iter = std::iter::once(&hdrval);
        let cr = ContentRange::decode(&mut iter).unwrap();
        assert_eq!(cr, ContentRange { start: 0, end: 499, complete_length: Some(1234) });
    }
}
