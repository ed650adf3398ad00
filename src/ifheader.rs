//! C5: the `If`-header parser and evaluator (RFC 4918 §10.4).
//!
//! The tokenizer/parser below is carried over from `davheaders.rs`
//! almost unchanged - it is generation-independent, pure byte-slice
//! parsing with no bearing on the async/sync split. The evaluator
//! (`evaluate`) is new, since `If`-satisfaction was previously folded
//! into an `if_match_get_tokens` function rather than exposed on its
//! own - it's built fresh against §4.2's E1-E4 rules.

use std::str::FromStr;

use headers::Header;
use http::HeaderName;
use http::header::HeaderValue;

use crate::etag::ETag;
use crate::lock::LockManager;
use crate::path::{DavPath, DavPathRef};

/// The header value: a sequence of lists, OR'd together (E1).
#[derive(Debug, Clone, PartialEq)]
pub struct If(pub Vec<IfList>);

/// One production: an optional tag naming the URL it applies to, and a
/// list of conditions AND'd together.
#[derive(Debug, Clone, PartialEq)]
pub struct IfList {
    pub resource_tag: Option<url::Url>,
    pub conditions: Vec<IfCondition>,
}

impl IfList {
    fn new() -> IfList {
        IfList { resource_tag: None, conditions: Vec::new() }
    }

    fn add(&mut self, not: bool, item: IfItem) {
        self.conditions.push(IfCondition { not, item });
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct IfCondition {
    pub not: bool,
    pub item: IfItem,
}

#[derive(Debug, Clone, PartialEq)]
pub enum IfItem {
    StateToken(String),
    ETag(ETag),
}

#[derive(Debug, Clone, PartialEq)]
enum IfToken {
    ListOpen,
    ListClose,
    Not,
    Word(String),
    Pointy(String),
    ETag(ETag),
    End,
}

#[derive(Debug, Clone, PartialEq)]
enum IfState {
    Start,
    RTag,
    List,
    Not,
    Bad,
}

fn invalid() -> headers::Error {
    headers::Error::invalid()
}

fn map_invalid(_e: impl std::error::Error) -> headers::Error {
    headers::Error::invalid()
}

fn is_whitespace(c: u8) -> bool {
    b" \t\r\n".iter().any(|&x| x == c)
}

fn is_special(c: u8) -> bool {
    b"<>()[]".iter().any(|&x| x == c)
}

fn trim_left(mut out: &[u8]) -> &[u8] {
    while !out.is_empty() && is_whitespace(out[0]) {
        out = &out[1..];
    }
    out
}

fn scan_until(buf: &[u8], c: u8) -> Result<(&[u8], &[u8]), headers::Error> {
    let mut i = 1;
    let mut quote = false;
    while quote || buf.get(i).copied() != Some(c) {
        if i >= buf.len() || is_whitespace(buf[i]) {
            return Err(invalid());
        }
        if buf[i] == b'"' {
            quote = !quote;
        }
        i += 1;
    }
    Ok((&buf[1..i], &buf[i + 1..]))
}

fn scan_word(buf: &[u8]) -> Result<(&[u8], &[u8]), headers::Error> {
    for (i, &c) in buf.iter().enumerate() {
        if is_whitespace(c) || is_special(c) || c < 32 {
            if i == 0 {
                return Err(invalid());
            }
            return Ok((&buf[..i], &buf[i..]));
        }
    }
    Ok((buf, b""))
}

fn get_token(buf: &[u8]) -> Result<(IfToken, &[u8]), headers::Error> {
    let buf = trim_left(buf);
    if buf.is_empty() {
        return Ok((IfToken::End, buf));
    }
    match buf[0] {
        b'(' => Ok((IfToken::ListOpen, &buf[1..])),
        b')' => Ok((IfToken::ListClose, &buf[1..])),
        b'N' if buf.starts_with(b"Not") => Ok((IfToken::Not, &buf[3..])),
        b'<' => {
            let (tok, rest) = scan_until(buf, b'>')?;
            let s = String::from_utf8(tok.to_vec()).map_err(map_invalid)?;
            Ok((IfToken::Pointy(s), rest))
        },
        b'[' => {
            let (tok, rest) = scan_until(buf, b']')?;
            let s = std::str::from_utf8(tok).map_err(map_invalid)?;
            Ok((IfToken::ETag(ETag::from_str(s)?), rest))
        },
        _ => {
            let (tok, rest) = scan_word(buf)?;
            if tok == b"Not" {
                Ok((IfToken::Not, rest))
            } else {
                let s = String::from_utf8(tok.to_vec()).map_err(map_invalid)?;
                Ok((IfToken::Word(s), rest))
            }
        },
    }
}

fn one<'i, I>(values: &mut I) -> Result<&'i HeaderValue, headers::Error>
where
    I: Iterator<Item = &'i HeaderValue>,
{
    let v = values.next().ok_or_else(invalid)?;
    if values.next().is_some() { Err(invalid()) } else { Ok(v) }
}

impl Header for If {
    fn name() -> &'static HeaderName {
        static NAME: std::sync::LazyLock<HeaderName> = std::sync::LazyLock::new(|| HeaderName::from_static("if"));
        &NAME
    }

    fn decode<'i, I>(values: &mut I) -> Result<Self, headers::Error>
    where
        I: Iterator<Item = &'i HeaderValue>,
    {
        let mut if_lists = If(Vec::new());
        let mut cur_list = IfList::new();

        let mut state = IfState::Start;
        let mut input = one(values)?.as_bytes();

        loop {
            let (tok, rest) = get_token(input)?;
            input = rest;
            state = match state {
                IfState::Start => match tok {
                    IfToken::ListOpen => IfState::List,
                    IfToken::Pointy(url) => {
                        let u = url::Url::parse(&url).map_err(map_invalid)?;
                        cur_list.resource_tag = Some(u);
                        IfState::RTag
                    },
                    IfToken::End => {
                        if !if_lists.0.is_empty() {
                            break;
                        }
                        IfState::Bad
                    },
                    _ => IfState::Bad,
                },
                IfState::RTag => match tok {
                    IfToken::ListOpen => IfState::List,
                    _ => IfState::Bad,
                },
                IfState::List | IfState::Not => {
                    let not = state == IfState::Not;
                    match tok {
                        IfToken::Not => {
                            if not {
                                IfState::Bad
                            } else {
                                IfState::Not
                            }
                        },
                        IfToken::Pointy(stok) | IfToken::Word(stok) => {
                            if !stok.contains(':') {
                                IfState::Bad
                            } else {
                                cur_list.add(not, IfItem::StateToken(stok));
                                IfState::List
                            }
                        },
                        IfToken::ETag(etag) => {
                            cur_list.add(not, IfItem::ETag(etag));
                            IfState::List
                        },
                        IfToken::ListClose => {
                            if cur_list.conditions.is_empty() {
                                IfState::Bad
                            } else {
                                if_lists.0.push(cur_list);
                                cur_list = IfList::new();
                                IfState::Start
                            }
                        },
                        _ => IfState::Bad,
                    }
                },
                IfState::Bad => return Err(invalid()),
            };
        }
        Ok(if_lists)
    }

    fn encode<E>(&self, values: &mut E)
    where
        E: Extend<HeaderValue>,
    {
        values.extend(std::iter::once(HeaderValue::from_static("[If header]")));
    }
}

/// A resolver for the one piece of per-resource state the evaluator
/// needs that it cannot get from the lock manager: the current ETag of
/// whatever URL a condition names (E3). A method processor implements
/// this over its `Service`/`Resource` lookup.
pub trait EntityTagLookup {
    fn etag_of(&self, path: &DavPathRef) -> Option<ETag>;
}

/// Result of evaluating an `If` header against current server state.
#[derive(Debug, Clone, Default)]
pub struct IfOutcome {
    pub satisfied: bool,
    /// Tokens from every list that turned out satisfied (E4) - the set
    /// the precondition engine treats as "submitted" for the lock-token
    /// check (§4.2's "Precondition coupling").
    pub submitted_tokens: Vec<String>,
}

fn covers(root: &DavPathRef, deep: bool, target: &DavPathRef) -> bool {
    if root == target {
        return true;
    }
    if !deep {
        return false;
    }
    let root_bytes = root.as_bytes();
    let target_bytes = target.as_bytes();
    if !target_bytes.starts_with(root_bytes) {
        return false;
    }
    // must land on a segment boundary: root "/a" covers "/a/b" but not "/ab"
    root_bytes.ends_with(b"/") || target_bytes.get(root_bytes.len()) == Some(&b'/')
}

/// Evaluate an `If` header against the lock manager and an entity-tag
/// resolver, per §4.2 (E1-E4). `prefix` is the service's hidden path
/// prefix, needed to turn a tagged absolute URL back into a `DavPath`.
pub async fn evaluate(
    hdr: &If,
    request_path: &DavPath,
    prefix: &str,
    lock_manager: &dyn LockManager,
    tags: &dyn EntityTagLookup,
) -> IfOutcome {
    let mut outcome = IfOutcome::default();

    for list in &hdr.0 {
        let target = match &list.resource_tag {
            Some(url) => match DavPath::from_str_and_prefix(url.path(), prefix) {
                Ok(p) => p,
                Err(_) => continue,
            },
            None => request_path.clone(),
        };

        let mut list_ok = true;
        let mut list_tokens = Vec::new();

        for cond in &list.conditions {
            let raw = match &cond.item {
                IfItem::StateToken(tok) => match lock_manager.lookup_token(tok).await {
                    Some(lock) if !lock.is_expired() => covers(&lock.root, lock.deep, &target),
                    _ => false,
                },
                IfItem::ETag(etag) => match tags.etag_of(&target) {
                    Some(current) => current.strong_eq(etag),
                    None => false,
                },
            };
            let result = if cond.not { !raw } else { raw };
            if !result {
                list_ok = false;
                break;
            }
            if !cond.not {
                if let IfItem::StateToken(tok) = &cond.item {
                    list_tokens.push(tok.clone());
                }
            }
        }

        if list_ok {
            outcome.satisfied = true;
            outcome.submitted_tokens.extend(list_tokens);
        }
    }

    outcome
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_tagged_and_untagged_lists() {
        let val = r#"  <http://x.yz/> ([W/"etag"] Not <DAV:nope> ) (Not<urn:x>[W/"bla"] plain:word:123) "#;
        let hdrval = HeaderValue::from_static(val);
        let mut iter = std::iter::once(&hdrval);
        let hdr = If::decode(&mut iter);
        assert!(hdr.is_ok());
        let hdr = hdr.unwrap();
        assert_eq!(hdr.0.len(), 2);
        assert!(hdr.0[0].resource_tag.is_some());
        assert!(hdr.0[1].resource_tag.is_none());
    }

    #[test]
    fn empty_list_is_bad_request() {
        let val = "()";
        let hdrval = HeaderValue::from_static(val);
        let mut iter = std::iter::once(&hdrval);
        assert!(If::decode(&mut iter).is_err());
    }

    #[test]
    fn covers_respects_segment_boundary() {
        let root = DavPath::new("/a").unwrap();
        let sibling = DavPath::new("/ab").unwrap();
        let child = DavPath::new("/a/b").unwrap();
        assert!(!covers(&root, true, &sibling));
        assert!(covers(&root, true, &child));
        assert!(!covers(&root, false, &child));
    }

    struct NoTags;
    impl EntityTagLookup for NoTags {
        fn etag_of(&self, _path: &DavPathRef) -> Option<ETag> {
            None
        }
    }

    #[tokio::test]
    async fn untagged_token_list_matches_request_path() {
        use crate::lock::{LockScope, MemLockManager};

        let lm = MemLockManager::new();
        let path = DavPath::new("/file").unwrap();
        let lock = lm.acquire(&path, LockScope::Exclusive, false, Some("a"), None, None).await.unwrap();

        let val = format!("(<{}>)", lock.token);
        let hdrval = HeaderValue::from_str(&val).unwrap();
        let mut iter = std::iter::once(&hdrval);
        let hdr = If::decode(&mut iter).unwrap();

        let outcome = evaluate(&hdr, &path, "", &lm, &NoTags).await;
        assert!(outcome.satisfied);
        assert_eq!(outcome.submitted_tokens, vec![lock.token]);
    }
}
