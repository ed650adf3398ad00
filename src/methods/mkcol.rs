//! MKCOL (RFC 4918 §9.3). Grounded on `handle_mkcol.rs`:
//! a body-less request creating one new collection directly under an
//! existing one, with the `NotFound`/`Exists` status-code remap §9.3.1
//! calls for (`409` for a missing parent, not the generic `404`).

use bytes::Bytes;
use http::{Request, Response, StatusCode};

use headers::HeaderMapExt;

use crate::body::Body;
use crate::error::{DavError, DavResult};
use crate::handler::{Context, TagCache};
use crate::path::DavPath;
use crate::precondition::AffectedResource;
use crate::resource::FsError;

use super::{check_lock_tokens, check_preconditions, entity_state, href};

pub(crate) async fn handle(ctx: &Context<'_>, req: &Request<()>, path: &DavPath, body: Bytes) -> DavResult<Response<Body>> {
    if !body.is_empty() {
        return Err(DavError::Status(StatusCode::UNSUPPORTED_MEDIA_TYPE));
    }

    if let Some(status) = ctx.check_access(path, crate::resource::AccessKind::Write, None).await {
        return Err(DavError::Status(status));
    }

    let if_header = req.headers().typed_get::<crate::ifheader::If>();
    let tags = TagCache::build(ctx.service, ctx.prefix, path, if_header.as_ref()).await;
    let submitted_tokens = check_preconditions(ctx, req, &entity_state(None), false, path, &tags).await?;
    check_lock_tokens(ctx, &[AffectedResource { path: path.clone(), deep: false }], &submitted_tokens, false).await?;

    match ctx.service.make_collection(path).await {
        Ok(()) => {
            let mut loc_path = path.clone();
            loc_path.add_slash();
            Response::builder()
                .status(StatusCode::CREATED)
                .header(http::header::CONTENT_LOCATION, href(&loc_path))
                .body(Body::empty())
                .map_err(|_| DavError::Status(StatusCode::INTERNAL_SERVER_ERROR))
        },
        Err(FsError::Exists) => Err(DavError::Status(StatusCode::METHOD_NOT_ALLOWED)),
        Err(FsError::NotFound) => Err(DavError::Status(StatusCode::CONFLICT)),
        Err(e) => Err(DavError::Status(crate::error::fserror_to_status(e))),
    }
}
