//! C6: the precondition engine. No single function elsewhere implements
//! this in one place - the six checks are inlined across
//! `handle_gethead.rs`/`handle_put.rs`/`fs.rs` call sites - so this module
//! is built directly from the six ordered rules, composing C2 (etag.rs),
//! C4 (lock.rs) and C5 (ifheader.rs) into one verdict the way those call
//! sites do individually.

use std::time::SystemTime;

use crate::error::ConditionCode;
use crate::etag::ETag;
use crate::ifheader::{EntityTagLookup, If};
use crate::lock::{ActiveLock, LockManager};
use crate::path::DavPath;

/// An `If-Match`/`If-None-Match` header value: either a literal `*`
/// (matches any representation that exists) or an explicit tag list.
#[derive(Debug, Clone, PartialEq)]
pub enum MatchList {
    Any,
    Tags(Vec<ETag>),
}

impl MatchList {
    fn matches(&self, current: Option<&ETag>, weak_ok: bool) -> bool {
        match (self, current) {
            (MatchList::Any, Some(_)) => true,
            (MatchList::Any, None) => false,
            (MatchList::Tags(tags), Some(cur)) => tags.iter().any(|t| {
                if weak_ok {
                    t.weak_eq(cur)
                } else {
                    t.strong_eq(cur)
                }
            }),
            (MatchList::Tags(_), None) => false,
        }
    }
}

/// The subset of the request's conditional headers relevant to §4.3 -
/// already decoded by the caller's header parsing (`davheaders.rs`).
#[derive(Debug, Clone, Default)]
pub struct ConditionalHeaders {
    pub if_match: Option<MatchList>,
    pub if_unmodified_since: Option<SystemTime>,
    pub if_none_match: Option<MatchList>,
    pub if_modified_since: Option<SystemTime>,
    pub if_header: Option<If>,
}

/// The entity state the precondition engine checks against - absent
/// fields mean the resource does not currently exist, which makes every
/// `If-Match`/`If-Unmodified-Since` condition fail and every
/// `If-None-Match`/`If-Modified-Since` condition succeed.
#[derive(Debug, Clone, Default)]
pub struct EntityState {
    pub etag: Option<ETag>,
    pub last_modified: Option<SystemTime>,
}

/// One resource a writing method is about to mutate, and whether the
/// mutation is recursive there (used for rule 6's lock-token check).
#[derive(Debug, Clone)]
pub struct AffectedResource {
    pub path: DavPath,
    pub deep: bool,
}

/// Result of running the full precondition engine.
#[derive(Debug)]
pub enum Verdict {
    /// Preconditions pass; continue processing the request. Carries the
    /// lock tokens the `If` header (if any) found satisfied, so rule 6's
    /// lock-token-submission check can treat them as submitted/
    Proceed { submitted_tokens: Vec<String> },
    /// Metadata/`If` conditions failed (rules 1, 2, 3 non-GET/HEAD, or 5).
    PreconditionFailed,
    /// GET/HEAD-only short-circuit (rules 3 GET/HEAD, 4).
    NotModified,
    /// Rule 6: a lock on `lock.root` (or covering it) has no submitted
    /// token. `condition` distinguishes the two bodies RFC 4918 uses here.
    Locked { lock: ActiveLock, condition: ConditionCode },
}

/// Run rules 1-5 (metadata and `If`-header checks). Rule 6 (lock-token
/// submission) is deliberately separate - it needs the caller's list of
/// affected resources, which only a writing method processor knows, and
/// per §4.3 it is evaluated last because "it can reveal resource
/// existence".
pub async fn check_metadata_and_if(
    headers: &ConditionalHeaders,
    state: &EntityState,
    is_get_or_head: bool,
    request_path: &DavPath,
    prefix: &str,
    lock_manager: &dyn LockManager,
    tags: &dyn EntityTagLookup,
) -> Verdict {
    // Rule 1: If-Match.
    if let Some(list) = &headers.if_match {
        if !list.matches(state.etag.as_ref(), false) {
            return Verdict::PreconditionFailed;
        }
    } else if let Some(since) = headers.if_unmodified_since {
        // Rule 2: If-Unmodified-Since, only consulted when If-Match absent.
        match state.last_modified {
            Some(lm) if lm <= since => {},
            _ => return Verdict::PreconditionFailed,
        }
    }

    // Rule 3: If-None-Match.
    if let Some(list) = &headers.if_none_match {
        if list.matches(state.etag.as_ref(), is_get_or_head) {
            return if is_get_or_head { Verdict::NotModified } else { Verdict::PreconditionFailed };
        }
    } else if is_get_or_head {
        // Rule 4: If-Modified-Since, only consulted when If-None-Match
        // absent and only for GET/HEAD.
        if let Some(since) = headers.if_modified_since {
            match state.last_modified {
                Some(lm) if lm <= since => return Verdict::NotModified,
                _ => {},
            }
        }
    }

    // Rule 5: the If header.
    let submitted_tokens = match &headers.if_header {
        Some(hdr) => {
            let outcome = crate::ifheader::evaluate(hdr, request_path, prefix, lock_manager, tags).await;
            if !outcome.satisfied {
                return Verdict::PreconditionFailed;
            }
            outcome.submitted_tokens
        },
        None => Vec::new(),
    };

    Verdict::Proceed { submitted_tokens }
}

/// Rule 6: every lock covering an affected resource must be matched by
/// a submitted token. Returns the first uncovered lock, distinguishing
/// a plain write conflict (`lock-token-submitted`) from a LOCK request
/// against an already-locked resource (`no-conflicting-lock`) via
/// `on_existing_lock_request`.
pub async fn check_lock_tokens(
    lock_manager: &dyn LockManager,
    affected: &[AffectedResource],
    owner_id: Option<&str>,
    submitted_tokens: &[String],
    on_existing_lock_request: bool,
) -> Result<(), (ActiveLock, ConditionCode)> {
    let tokens: Vec<&str> = submitted_tokens.iter().map(|s| s.as_str()).collect();
    let condition = if on_existing_lock_request {
        ConditionCode::NoConflictingLock
    } else {
        ConditionCode::LockTokenSubmitted
    };
    for res in affected {
        if let Err(lock) = lock_manager.check(&res.path, owner_id, res.deep, &tokens).await {
            return Err((lock, condition));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lock::MemLockManager;

    struct NoTags;
    impl EntityTagLookup for NoTags {
        fn etag_of(&self, _path: &crate::path::DavPathRef) -> Option<ETag> {
            None
        }
    }

    fn etag(s: &str) -> ETag {
        ETag::new(false, s).unwrap()
    }

    #[tokio::test]
    async fn if_match_mismatch_fails_precondition() {
        let lm = MemLockManager::new();
        let headers =
            ConditionalHeaders { if_match: Some(MatchList::Tags(vec![etag("x")])), ..Default::default() };
        let state = EntityState { etag: Some(etag("y")), last_modified: None };
        let path = DavPath::new("/f").unwrap();
        let v = check_metadata_and_if(&headers, &state, false, &path, "", &lm, &NoTags).await;
        assert!(matches!(v, Verdict::PreconditionFailed));
    }

    #[tokio::test]
    async fn if_none_match_star_on_get_is_not_modified() {
        let lm = MemLockManager::new();
        let headers = ConditionalHeaders { if_none_match: Some(MatchList::Any), ..Default::default() };
        let state = EntityState { etag: Some(etag("y")), last_modified: None };
        let path = DavPath::new("/f").unwrap();
        let v = check_metadata_and_if(&headers, &state, true, &path, "", &lm, &NoTags).await;
        assert!(matches!(v, Verdict::NotModified));
    }

    #[tokio::test]
    async fn missing_resource_fails_if_match() {
        let lm = MemLockManager::new();
        let headers = ConditionalHeaders { if_match: Some(MatchList::Any), ..Default::default() };
        let state = EntityState::default();
        let path = DavPath::new("/f").unwrap();
        let v = check_metadata_and_if(&headers, &state, false, &path, "", &lm, &NoTags).await;
        assert!(matches!(v, Verdict::PreconditionFailed));
    }

    #[tokio::test]
    async fn lock_without_token_blocks_write() {
        use crate::lock::LockScope;
        let lm = MemLockManager::new();
        let path = DavPath::new("/f").unwrap();
        lm.acquire(&path, LockScope::Exclusive, false, Some("a"), None, None).await.unwrap();
        let affected = vec![AffectedResource { path: path.clone(), deep: false }];
        let err = check_lock_tokens(&lm, &affected, Some("b"), &[], false).await;
        assert!(matches!(err, Err((_, ConditionCode::LockTokenSubmitted))));
    }

    #[tokio::test]
    async fn submitted_token_passes_lock_check() {
        use crate::lock::LockScope;
        let lm = MemLockManager::new();
        let path = DavPath::new("/f").unwrap();
        let lock = lm.acquire(&path, LockScope::Exclusive, false, Some("a"), None, None).await.unwrap();
        let affected = vec![AffectedResource { path: path.clone(), deep: false }];
        let tokens = vec![lock.token.clone()];
        let ok = check_lock_tokens(&lm, &affected, Some("a"), &tokens, false).await;
        assert!(ok.is_ok());
    }
}
