//! DELETE (RFC 4918 §9.6), recursive over a collection per §9.6.1. A
//! single conflicting lock anywhere under the target cancels the whole
//! operation (a bare `423`, no multi-status); partial filesystem
//! failures during the walk itself get folded into a `207` the way
//! `multierror.rs` did. Grounded on `handle_delete.rs`.

use http::{Request, Response, StatusCode};

use crate::body::Body;
use crate::davheaders::Depth;
use crate::error::{DavError, DavResult, fserror_to_status};
use crate::handler::Context;
use crate::multistatus::MultiStatus;
use crate::path::DavPath;
use crate::precondition::AffectedResource;
use crate::resource::{AccessKind, FsError};
use crate::traversal::walk_post_order;

use super::{check_lock_tokens, check_preconditions, entity_state, href};

pub(crate) async fn handle(ctx: &Context<'_>, req: &Request<()>, path: &DavPath) -> DavResult<Response<Body>> {
    if let Some(status) = ctx.check_access(path, AccessKind::Delete, None).await {
        return Err(DavError::Status(status));
    }

    let resource = ctx.service.resolve(path).await.ok_or(DavError::Status(StatusCode::NOT_FOUND))?;
    let meta = resource.metadata(true).await.map_err(|e| DavError::Status(fserror_to_status(e)))?;

    let if_header = headers::HeaderMapExt::typed_get::<crate::ifheader::If>(req.headers());
    let tags = crate::handler::TagCache::build(ctx.service, ctx.prefix, path, if_header.as_ref()).await;
    let submitted_tokens = check_preconditions(ctx, req, &entity_state(Some(&meta)), false, path, &tags).await?;

    // RFC 4918 §9.6.1 only allows `Depth: infinity` on a collection; a
    // conforming client never sends `Depth: 0` here, but `handle_delete.rs`
    // tolerated it too, so this does as well.
    if let Some(d) = headers::HeaderMapExt::typed_get::<Depth>(req.headers()) {
        if d == Depth::One {
            return Err(DavError::Status(StatusCode::BAD_REQUEST));
        }
    }

    // One lock check for the whole subtree: any conflicting lock
    // cancels the entire delete rather than partially succeeding.
    check_lock_tokens(ctx, &[AffectedResource { path: path.clone(), deep: true }], &submitted_tokens, false).await?;

    let outcomes = delete_tree(ctx, path).await?;

    if outcomes.iter().all(|(_, status)| status.is_success()) {
        return Response::builder()
            .status(StatusCode::NO_CONTENT)
            .body(Body::empty())
            .map_err(|_| DavError::Status(StatusCode::INTERNAL_SERVER_ERROR));
    }

    let mut multi = MultiStatus::new(href(path));
    for (p, status) in outcomes {
        multi.add_status(href(&p), status);
    }
    let (status, body) = multi.into_response()?;
    Response::builder().status(status).body(body).map_err(|_| DavError::Status(StatusCode::INTERNAL_SERVER_ERROR))
}

/// Delete `path` and, if it is a collection, everything under it, in
/// post order so a collection is only removed once empty. Shared with
/// MOVE's source-side cleanup. Returns the outcome of every visited
/// sub-resource, success (`204`) and failure alike, in walk order -
/// callers that only care whether anything failed can check
/// `status.is_success()`.
pub(crate) async fn delete_tree(ctx: &Context<'_>, path: &DavPath) -> DavResult<Vec<(DavPath, StatusCode)>> {
    let visited = walk_post_order(ctx.service, path, Depth::Infinity).await?;

    let mut failed: Vec<DavPath> = Vec::new();
    let mut outcomes = Vec::with_capacity(visited.len());
    for v in &visited {
        let has_failed_descendant = failed.iter().any(|p| v.path.is_strict_prefix_of(p));
        let status = match delete_one(ctx, &v.path, has_failed_descendant).await {
            Ok(()) => StatusCode::NO_CONTENT,
            Err(status) => {
                failed.push(v.path.clone());
                status
            },
        };
        outcomes.push((v.path.clone(), status));
    }
    Ok(outcomes)
}

/// `blocked_by_failed_descendant` distinguishes a collection that
/// failed to empty because one of its own children failed earlier in
/// this walk (`424 Failed Dependency`) from any other `FsError::Exists`
/// (`409 Conflict`, e.g. something outside this walk still occupying
/// the name).
async fn delete_one(ctx: &Context<'_>, path: &DavPath, blocked_by_failed_descendant: bool) -> Result<(), StatusCode> {
    match ctx.service.delete(path).await {
        Ok(()) => {
            ctx.service.lock_manager().remove_nonrecursive(path).await;
            ctx.service.property_store().remove_all(path).await;
            Ok(())
        },
        Err(FsError::Exists) if blocked_by_failed_descendant => Err(StatusCode::FAILED_DEPENDENCY),
        Err(FsError::Exists) => Err(StatusCode::CONFLICT),
        Err(e) => Err(fserror_to_status(e)),
    }
}
