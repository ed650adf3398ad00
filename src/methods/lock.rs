//! LOCK and UNLOCK (RFC 4918 §9.10/§9.11): the method-processor half of
//! the lock subsystem (C4). Grounded on `handle_lock.rs`
//! (`handle_lock`/`handle_unlock`/`get_timeout`), generalized from
//! `DavLockSystem::{lock,refresh,unlock}` onto the `LockManager` trait
//! and `lockxml.rs`'s shared element builders. Two corrections from a
//! more permissive prior behavior: a `Depth: 1` LOCK is rejected
//! outright (rather than silently treating anything but `Depth: 0` as
//! deep), and a conflict nested under a nonzero-depth lock request is
//! reported as a real `207 Multi-Status` rather than a single `423`.

use std::time::Duration;

use http::{HeaderValue, Request, Response, StatusCode};
use xmltree::{Element, XMLNode};

use crate::body::Body;
use crate::davheaders::{Depth, LockToken, Timeout};
use crate::error::{ConditionCode, DavError, DavResult, fserror_to_status};
use crate::handler::Context;
use crate::ifheader::If;
use crate::lock::{ActiveLock, AcquireError, LockScope};
use crate::multistatus::MultiStatus;
use crate::path::DavPath;
use crate::resource::AccessKind;
use crate::traversal::walk;
use crate::xmlvalue::parse_xml;

use super::href;

/// `If` state-tokens named by the header, ignoring `Not` conditions and
/// etag items - a refresh only cares about which lock tokens the client
/// claims to hold.
fn submitted_tokens(hdr: Option<&If>) -> Vec<String> {
    let mut out = Vec::new();
    if let Some(hdr) = hdr {
        for list in &hdr.0 {
            for cond in &list.conditions {
                if !cond.not {
                    if let crate::ifheader::IfItem::StateToken(t) = &cond.item {
                        if !out.contains(t) {
                            out.push(t.clone());
                        }
                    }
                }
            }
        }
    }
    out
}

/// Whether `candidate` falls within `root`'s protection scope: the same
/// path, or (when `deep`) a descendant of it.
fn covers(root: &DavPath, deep: bool, candidate: &DavPath) -> bool {
    if root == candidate {
        return true;
    }
    if !deep {
        return false;
    }
    let root_segs: Vec<&[u8]> = root.as_bytes().split(|&c| c == b'/').filter(|s| !s.is_empty()).collect();
    let cand_segs: Vec<&[u8]> = candidate.as_bytes().split(|&c| c == b'/').filter(|s| !s.is_empty()).collect();
    cand_segs.len() > root_segs.len() && cand_segs[..root_segs.len()] == root_segs[..]
}

/// `Timeout:` clamping, per `get_timeout`: shared locks get
/// a generous ceiling (a day), exclusive ones a conservative one (ten
/// minutes), since an exclusive lock blocks everyone else. An explicit
/// `Infinite` request is granted outright on refresh (no expiry at all)
/// but capped at the ceiling on creation, so a new exclusive lock can
/// never outlive its ten-minute budget just by asking for forever.
fn compute_timeout(hdr: Option<&Timeout>, scope: LockScope, refresh: bool) -> Option<Duration> {
    let max = if scope == LockScope::Shared { 86_400 } else { 600 };
    let pref = hdr.and_then(|t| t.0.first().copied()).unwrap_or(crate::davheaders::DavTimeout::Infinite);
    match pref {
        crate::davheaders::DavTimeout::Infinite => {
            if refresh {
                None
            } else {
                Some(Duration::from_secs(max))
            }
        },
        crate::davheaders::DavTimeout::Seconds(n) => Some(Duration::from_secs((n as u64).min(max))),
    }
}

struct LockInfo {
    scope: LockScope,
    owner: Option<Element>,
}

fn parse_lockinfo(body: &[u8]) -> DavResult<LockInfo> {
    let root = parse_xml(body)?;
    if root.name != "lockinfo" {
        return Err(DavError::XmlParseError);
    }
    let mut scope = None;
    let mut is_write = false;
    let mut owner = None;
    for child in &root.children {
        let e = match child {
            XMLNode::Element(e) => e,
            _ => continue,
        };
        match e.name.as_str() {
            "lockscope" => {
                scope = e.children.iter().find_map(|n| match n {
                    XMLNode::Element(e) if e.name == "exclusive" => Some(LockScope::Exclusive),
                    XMLNode::Element(e) if e.name == "shared" => Some(LockScope::Shared),
                    _ => None,
                });
            },
            "locktype" => {
                is_write = e.children.iter().any(|n| matches!(n, XMLNode::Element(e) if e.name == "write"));
            },
            "owner" => owner = Some(e.clone()),
            _ => {},
        }
    }
    if !is_write {
        return Err(DavError::Status(StatusCode::BAD_REQUEST));
    }
    let scope = scope.ok_or(DavError::Status(StatusCode::BAD_REQUEST))?;
    Ok(LockInfo { scope, owner })
}

async fn handle_refresh(ctx: &Context<'_>, req: &Request<()>, path: &DavPath) -> DavResult<Response<Body>> {
    let if_header = headers::HeaderMapExt::typed_get::<If>(req.headers());
    let tokens = submitted_tokens(if_header.as_ref());
    if tokens.len() != 1 {
        return Err(DavError::Status(StatusCode::BAD_REQUEST));
    }

    let existing = ctx
        .service
        .lock_manager()
        .lookup_token(&tokens[0])
        .await
        .filter(|l| covers(&l.root, l.deep, path))
        .ok_or(DavError::Status(StatusCode::PRECONDITION_FAILED))?;

    let timeout_hdr = headers::HeaderMapExt::typed_get::<Timeout>(req.headers());
    let timeout = compute_timeout(timeout_hdr.as_ref(), existing.scope, true);

    let refreshed = ctx
        .service
        .lock_manager()
        .refresh(&tokens[0], timeout)
        .await
        .ok_or(DavError::Status(StatusCode::PRECONDITION_FAILED))?;

    respond_with_lock(&refreshed, StatusCode::OK)
}

async fn handle_create(ctx: &Context<'_>, req: &Request<()>, path: &DavPath, body: bytes::Bytes) -> DavResult<Response<Body>> {
    let deep = match headers::HeaderMapExt::typed_get::<Depth>(req.headers()) {
        Some(Depth::Zero) => false,
        Some(Depth::Infinity) | None => true,
        Some(Depth::One) => return Err(DavError::Status(StatusCode::BAD_REQUEST)),
    };

    if let Some(status) = ctx.check_access(path, AccessKind::Write, None).await {
        return Err(DavError::Status(status));
    }

    let info = parse_lockinfo(&body)?;
    let timeout_hdr = headers::HeaderMapExt::typed_get::<Timeout>(req.headers());
    let timeout = compute_timeout(timeout_hdr.as_ref(), info.scope, false);

    let existed = ctx.service.resolve(path).await.is_some();

    let lock = match ctx
        .service
        .lock_manager()
        .acquire(path, info.scope, deep, ctx.principal, info.owner, timeout)
        .await
    {
        Ok(lock) => lock,
        Err(AcquireError::Conflict(conflicts)) => return conflict_response(ctx, path, deep, conflicts).await,
        Err(AcquireError::PerUrlLimitExceeded) | Err(AcquireError::GlobalLimitExceeded) => {
            return Err(DavError::Status(StatusCode::INSUFFICIENT_STORAGE));
        },
    };

    if !existed {
        if let Err(e) = ctx.service.create_empty(path).await {
            ctx.service.lock_manager().release(&lock.token).await.ok();
            return Err(DavError::Status(fserror_to_status(e)));
        }
    }

    let status = if existed { StatusCode::OK } else { StatusCode::CREATED };
    let mut resp = respond_with_lock(&lock, status)?;
    resp.headers_mut().insert(
        crate::davheaders::LOCK_TOKEN.clone(),
        HeaderValue::from_str(&format!("<{}>", lock.token)).map_err(|_| DavError::Status(StatusCode::INTERNAL_SERVER_ERROR))?,
    );
    Ok(resp)
}

/// When a deep lock conflicts with one or more locks already held on
/// nested resources, render the full per-resource breakdown (§4.4's LOCK
/// rule (b)); when the conflict is just the target itself, return a
/// plain condition error instead of a one-entry multistatus.
async fn conflict_response(ctx: &Context<'_>, path: &DavPath, deep: bool, conflicts: Vec<ActiveLock>) -> DavResult<Response<Body>> {
    let depth = if deep { Depth::Infinity } else { Depth::Zero };
    let visited = walk(ctx.service, path, depth).await.unwrap_or_default();
    if visited.len() <= 1 {
        return Err(DavError::Condition(StatusCode::LOCKED, ConditionCode::NoConflictingLock));
    }

    let conflict_hrefs: Vec<String> = conflicts.iter().map(|l| href(&l.root)).collect();
    let mut multi = MultiStatus::new(href(path));
    for v in &visited {
        let h = href(&v.path);
        if conflict_hrefs.contains(&h) {
            multi.add_status_with_error(h, StatusCode::LOCKED, ConditionCode::NoConflictingLock);
        } else {
            multi.add_status(h, StatusCode::FAILED_DEPENDENCY);
        }
    }
    let (status, body) = multi.into_response()?;
    Response::builder().status(status).body(body).map_err(|_| DavError::Status(StatusCode::INTERNAL_SERVER_ERROR))
}

fn respond_with_lock(lock: &ActiveLock, status: StatusCode) -> DavResult<Response<Body>> {
    Response::builder()
        .status(status)
        .header(http::header::CONTENT_TYPE, "application/xml; charset=utf-8")
        .body(super::lockxml::render_lock_response(lock))
        .map_err(|_| DavError::Status(StatusCode::INTERNAL_SERVER_ERROR))
}

pub(crate) async fn handle_lock(ctx: &Context<'_>, req: &Request<()>, path: &DavPath, body: bytes::Bytes) -> DavResult<Response<Body>> {
    if body.is_empty() {
        handle_refresh(ctx, req, path).await
    } else {
        handle_create(ctx, req, path, body).await
    }
}

pub(crate) async fn handle_unlock(ctx: &Context<'_>, req: &Request<()>, path: &DavPath) -> DavResult<Response<Body>> {
    let token = headers::HeaderMapExt::typed_get::<LockToken>(req.headers())
        .ok_or(DavError::Status(StatusCode::BAD_REQUEST))?
        .0;
    let token = token.trim_start_matches('<').trim_end_matches('>').to_string();

    if let Some(status) = ctx.check_access(path, AccessKind::Write, None).await {
        return Err(DavError::Status(status));
    }

    let lock = match ctx.service.lock_manager().lookup_token(&token).await {
        Some(l) => l,
        // A dangling lock token (its resource already gone) is not an
        // error to unlock - RFC 4918 §9.11 wants this tolerated.
        None => return Response::builder().status(StatusCode::NO_CONTENT).body(Body::empty()).map_err(|_| DavError::Status(StatusCode::INTERNAL_SERVER_ERROR)),
    };

    if !covers(&lock.root, lock.deep, path) {
        return Err(DavError::Condition(StatusCode::CONFLICT, ConditionCode::LockTokenMatchesRequestUri));
    }

    ctx.service.lock_manager().release(&token).await.ok();
    Response::builder().status(StatusCode::NO_CONTENT).body(Body::empty()).map_err(|_| DavError::Status(StatusCode::INTERNAL_SERVER_ERROR))
}
