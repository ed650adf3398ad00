//! COPY (RFC 4918 §9.8) and MOVE (§9.9), which share almost everything:
//! destination-header parsing, overwrite semantics, and a pre-order
//! walk of the source that recreates each visited collection/resource
//! under the destination. MOVE is COPY plus a post-order delete of the
//! source once the copy succeeds. Grounded on
//! `handle_copymove.rs` (`do_copy`/`do_move`), generalized from
//! `DavFileSystem::copy`/`rename` onto `Service::copy_one` plus an
//! explicit walk, since this engine's `Service` has no native rename.

use http::{Request, Response, StatusCode};

use crate::body::Body;
use crate::davheaders::{Depth, Destination, Overwrite};
use crate::error::{DavError, DavResult, fserror_to_status};
use crate::handler::{Context, TagCache};
use crate::multistatus::MultiStatus;
use crate::path::DavPath;
use crate::precondition::AffectedResource;
use crate::resource::{AccessKind, FsError};
use crate::traversal::walk;

use super::delete::delete_tree;
use super::{check_lock_tokens, check_preconditions, entity_state, href};

fn path_segments(p: &DavPath) -> Vec<&[u8]> {
    p.as_bytes().split(|&c| c == b'/').filter(|s| !s.is_empty()).collect()
}

/// Rebuild `visited` (somewhere under `source_root`) as the
/// corresponding path under `dest_root`.
fn relocate(source_root: &DavPath, dest_root: &DavPath, visited: &DavPath) -> DavPath {
    let root_segs = path_segments(source_root);
    let full_segs = path_segments(visited);
    let mut out = dest_root.clone();
    for seg in &full_segs[root_segs.len()..] {
        out.push_segment(seg);
    }
    out.add_slash_if(visited.is_collection());
    out
}

pub(crate) async fn handle(ctx: &Context<'_>, req: &Request<()>, path: &DavPath, mv: bool) -> DavResult<Response<Body>> {
    let overwrite = headers::HeaderMapExt::typed_get::<Overwrite>(req.headers()).map(|o| o.0).unwrap_or(true);
    let depth = match headers::HeaderMapExt::typed_get::<Depth>(req.headers()) {
        Some(Depth::Infinity) | None => Depth::Infinity,
        Some(Depth::Zero) if !mv => Depth::Zero,
        _ => return Err(DavError::Status(StatusCode::BAD_REQUEST)),
    };

    let dest_hdr = headers::HeaderMapExt::typed_get::<Destination>(req.headers()).ok_or(DavError::Status(StatusCode::BAD_REQUEST))?;
    let dest = DavPath::from_str_and_prefix(&dest_hdr.0, ctx.prefix)?;

    // A collection may not be copied/moved into its own subtree, nor onto
    // one of its own ancestors, regardless of Overwrite (§4.4).
    if path.is_strict_prefix_of(&dest) || dest.is_strict_prefix_of(path) {
        return Err(DavError::Status(StatusCode::FORBIDDEN));
    }

    let parent = dest.parent();
    if ctx.service.resolve(&parent).await.is_none() && parent.as_bytes() != &b"/"[..] {
        return Err(DavError::Status(StatusCode::CONFLICT));
    }

    if let Some(status) = ctx.check_access(path, AccessKind::Read, None).await {
        return Err(DavError::Status(status));
    }
    if let Some(status) = ctx.check_access(&dest, AccessKind::Write, None).await {
        return Err(DavError::Status(status));
    }

    let resource = ctx.service.resolve(path).await.ok_or(DavError::Status(StatusCode::NOT_FOUND))?;
    let meta = resource.metadata(true).await.map_err(|e| DavError::Status(fserror_to_status(e)))?;

    let dest_existing = ctx.service.resolve(&dest).await;
    let dest_exists = dest_existing.is_some();
    if !overwrite && dest_exists {
        return Err(DavError::Status(StatusCode::PRECONDITION_FAILED));
    }

    // Same canonical path: a no-op when overwriting is allowed (the F case
    // was already rejected above as a 412, since the destination exists).
    if *path == dest {
        return Response::builder()
            .status(StatusCode::NO_CONTENT)
            .body(Body::empty())
            .map_err(|_| DavError::Status(StatusCode::INTERNAL_SERVER_ERROR));
    }

    let if_header = headers::HeaderMapExt::typed_get::<crate::ifheader::If>(req.headers());
    let tags = TagCache::build(ctx.service, ctx.prefix, path, if_header.as_ref()).await;
    let submitted_tokens = check_preconditions(ctx, req, &entity_state(Some(&meta)), false, path, &tags).await?;

    let mut affected = vec![AffectedResource { path: dest.clone(), deep: true }];
    if mv {
        affected.push(AffectedResource { path: path.clone(), deep: true });
    }
    check_lock_tokens(ctx, &affected, &submitted_tokens, false).await?;

    if overwrite && dest_exists && depth != Depth::Zero {
        delete_tree(ctx, &dest).await?;
    }

    let visited = walk(ctx.service, path, depth).await?;

    let mut multi = MultiStatus::new(href(path));
    let mut failed = false;
    for v in &visited {
        let target = relocate(path, &dest, &v.path);
        let result = if v.resource.metadata(false).await.map(|m| m.is_collection).unwrap_or(false) {
            ctx.service.make_collection(&target).await.or_else(|e| if e == FsError::Exists && depth == Depth::Zero { Ok(()) } else { Err(e) })
        } else {
            ctx.service.copy_one(v.resource.as_ref(), &target).await
        };
        match result {
            Ok(()) => {
                ctx.service.property_store().copy_all(&v.path, &target).await.ok();
            },
            Err(e) => {
                failed = true;
                multi.add_status(href(&target), fserror_to_status(e));
            },
        }
    }

    if failed {
        let (status, body) = multi.into_response()?;
        return Response::builder().status(status).body(body).map_err(|_| DavError::Status(StatusCode::INTERNAL_SERVER_ERROR));
    }

    if mv {
        delete_tree(ctx, path).await?;
        ctx.service.lock_manager().remove_recursive(path).await;
    }

    let status = if dest_exists { StatusCode::NO_CONTENT } else { StatusCode::CREATED };
    Response::builder().status(status).body(Body::empty()).map_err(|_| DavError::Status(StatusCode::INTERNAL_SERVER_ERROR))
}
