//! C10: the partial-content engine (RFC 7233, as applied by RFC 4918's
//! GET semantics and this engine's partial-PUT extension, §4.5).
//!
//! Grounded on `handle_gethead.rs`, which parsed a single
//! `typed_headers::ByteRangeSpec` and served one `206`. This engine
//! supports the full comma-separated range list: resolving each spec
//! against the resource length, dropping unsatisfiable ones, merging
//! ranges that are at or near each other (so two adjacent 1-byte ranges
//! don't turn into two separate multipart body parts), and rendering
//! either a single `206` or a `multipart/byteranges` body.
//!
//! "Near" is this engine's own call (the merge distance is left
//! unspecified by RFC 7233) - two requested ranges merge when the gap
//! between them is no larger than [`MERGE_GAP`], matching the gap below
//! which the multipart boundary/header overhead of keeping them
//! separate exceeds the cost of just sending the bytes in between.

use crate::davheaders::ByteRangeSpec;

/// Ranges separated by no more than this many bytes are coalesced into
/// one part instead of being sent as two.
pub const MERGE_GAP: u64 = 128;

/// A single resolved, in-bounds byte range (`start..=end`, inclusive).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResolvedRange {
    pub start: u64,
    pub end: u64,
}

impl ResolvedRange {
    pub fn len(&self) -> u64 {
        self.end - self.start + 1
    }
}

/// Resolve a `Range:` header's specs against an entity of `total_len`
/// bytes: drop anything wholly outside `[0, total_len)`, clamp partial
/// overlaps, then merge near/overlapping ranges and sort by start.
///
/// Returns `None` when every requested range was unsatisfiable (the
/// caller should respond `416 Range Not Satisfiable`); `Some(vec![])`
/// never happens (an empty spec list is itself a parse error, not a
/// resolved-to-nothing scenario).
pub fn resolve(specs: &[ByteRangeSpec], total_len: u64) -> Option<Vec<ResolvedRange>> {
    if total_len == 0 {
        return None;
    }
    let mut resolved: Vec<ResolvedRange> = Vec::new();
    for spec in specs {
        let r = match *spec {
            ByteRangeSpec::FromTo(start, end) => {
                if start >= total_len {
                    continue;
                }
                ResolvedRange { start, end: end.min(total_len - 1) }
            },
            ByteRangeSpec::AllFrom(start) => {
                if start >= total_len {
                    continue;
                }
                ResolvedRange { start, end: total_len - 1 }
            },
            ByteRangeSpec::Last(n) => {
                if n == 0 {
                    continue;
                }
                let n = n.min(total_len);
                ResolvedRange { start: total_len - n, end: total_len - 1 }
            },
        };
        resolved.push(r);
    }
    if resolved.is_empty() {
        return None;
    }
    resolved.sort_by_key(|r| r.start);
    Some(merge(resolved))
}

fn merge(ranges: Vec<ResolvedRange>) -> Vec<ResolvedRange> {
    let mut out: Vec<ResolvedRange> = Vec::with_capacity(ranges.len());
    for r in ranges {
        match out.last_mut() {
            Some(prev) if r.start <= prev.end.saturating_add(MERGE_GAP + 1) => {
                prev.end = prev.end.max(r.end);
            },
            _ => out.push(r),
        }
    }
    out
}

/// One part of a rendered range response: the byte range and its bytes.
pub struct RangePart {
    pub range: ResolvedRange,
    pub data: bytes::Bytes,
}

/// Whether to render a single `206` (`Content-Range` header, plain
/// body) or a `multipart/byteranges` body (more than one resolved part).
pub enum RangeRendering {
    Single(RangePart),
    Multipart { boundary: String, media_type: Option<String>, parts: Vec<RangePart> },
}

/// Decide how a set of resolved ranges (plus the bytes for each, already
/// read by the caller via `Resource::read_range`) should be rendered.
pub fn render(parts: Vec<RangePart>, media_type: Option<String>, boundary: impl Into<String>) -> RangeRendering {
    if parts.len() == 1 {
        let mut parts = parts;
        RangeRendering::Single(parts.remove(0))
    } else {
        RangeRendering::Multipart { boundary: boundary.into(), media_type, parts }
    }
}

/// Serialize a `multipart/byteranges` body per RFC 7233 appendix A.
pub fn write_multipart(boundary: &str, media_type: Option<&str>, total_len: u64, parts: &[RangePart]) -> bytes::Bytes {
    let mut out = Vec::new();
    for part in parts {
        out.extend_from_slice(format!("--{}\r\n", boundary).as_bytes());
        if let Some(mt) = media_type {
            out.extend_from_slice(format!("Content-Type: {}\r\n", mt).as_bytes());
        }
        out.extend_from_slice(
            format!("Content-Range: bytes {}-{}/{}\r\n\r\n", part.range.start, part.range.end, total_len).as_bytes(),
        );
        out.extend_from_slice(&part.data);
        out.extend_from_slice(b"\r\n");
    }
    out.extend_from_slice(format!("--{}--\r\n", boundary).as_bytes());
    bytes::Bytes::from(out)
}

/// A partial-PUT target, resolved from a `Content-Range:` header
/// against a resource that may not yet exist (`existing_len == 0`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PutSplice {
    pub start: u64,
    pub end: u64,
}

pub fn resolve_put_range(cr: &crate::davheaders::ContentRange) -> PutSplice {
    PutSplice { start: cr.start, end: cr.end }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolve_clamps_and_sorts() {
        let specs = vec![ByteRangeSpec::AllFrom(900), ByteRangeSpec::FromTo(0, 99)];
        let r = resolve(&specs, 1000).unwrap();
        assert_eq!(r, vec![ResolvedRange { start: 0, end: 99 }, ResolvedRange { start: 900, end: 999 }]);
    }

    #[test]
    fn resolve_suffix_clamped_to_length() {
        let specs = vec![ByteRangeSpec::Last(10_000)];
        let r = resolve(&specs, 50).unwrap();
        assert_eq!(r, vec![ResolvedRange { start: 0, end: 49 }]);
    }

    #[test]
    fn resolve_drops_unsatisfiable_but_keeps_others() {
        let specs = vec![ByteRangeSpec::FromTo(1000, 2000), ByteRangeSpec::FromTo(0, 9)];
        let r = resolve(&specs, 100).unwrap();
        assert_eq!(r, vec![ResolvedRange { start: 0, end: 9 }]);
    }

    #[test]
    fn resolve_all_unsatisfiable_is_none() {
        let specs = vec![ByteRangeSpec::FromTo(1000, 2000)];
        assert!(resolve(&specs, 100).is_none());
    }

    #[test]
    fn nearby_ranges_merge() {
        let specs = vec![ByteRangeSpec::FromTo(0, 9), ByteRangeSpec::FromTo(20, 29)];
        let r = resolve(&specs, 1000).unwrap();
        assert_eq!(r, vec![ResolvedRange { start: 0, end: 29 }]);
    }

    #[test]
    fn far_apart_ranges_stay_separate() {
        let specs = vec![ByteRangeSpec::FromTo(0, 9), ByteRangeSpec::FromTo(9999, 10_009)];
        let r = resolve(&specs, 20_000).unwrap();
        assert_eq!(r.len(), 2);
    }

    #[test]
    fn multipart_body_contains_each_part() {
        let parts = vec![
            RangePart { range: ResolvedRange { start: 0, end: 2 }, data: bytes::Bytes::from_static(b"abc") },
            RangePart { range: ResolvedRange { start: 100, end: 102 }, data: bytes::Bytes::from_static(b"xyz") },
        ];
        let body = write_multipart("BOUND", Some("text/plain"), 1000, &parts);
        let s = String::from_utf8(body.to_vec()).unwrap();
        assert!(s.contains("--BOUND"));
        assert!(s.contains("bytes 0-2/1000"));
        assert!(s.contains("bytes 100-102/1000"));
        assert!(s.ends_with("--BOUND--\r\n"));
    }
}
