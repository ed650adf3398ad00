//! PUT (RFC 4918 §9.7) and this engine's SabreDAV-style partial-`PATCH`
//! extension (§4.5's write side). Grounded on `handle_put.rs`:
//! `Content-Range`/`X-Update-Range` drive the same
//! create-or-splice choice, generalized onto `Service::put`'s
//! `PutRange` rather than an open-file seek.

use bytes::Bytes;
use headers::HeaderMapExt;
use http::{Request, Response, StatusCode};

use crate::body::Body;
use crate::davheaders::{ContentRange, ContentType};
use crate::error::{DavError, DavResult, fserror_to_status};
use crate::handler::{Context, TagCache};
use crate::path::DavPath;
use crate::precondition::AffectedResource;
use crate::range::{PutSplice, resolve_put_range};
use crate::resource::{AccessKind, PutRange};

use super::{check_lock_tokens, check_preconditions, entity_state, href};

const SABRE_PARTIALUPDATE: &str = "application/x-sabredav-partialupdate";

pub(crate) async fn handle(ctx: &Context<'_>, req: &Request<()>, path: &DavPath, body: Bytes) -> DavResult<Response<Body>> {
    if let Some(status) = ctx.check_access(path, AccessKind::Write, None).await {
        return Err(DavError::Status(status));
    }

    let existing = ctx.service.resolve(path).await;
    let existed = existing.is_some();
    let meta = match &existing {
        Some(r) => r.metadata(true).await.ok(),
        None => None,
    };

    if req.method() == http::Method::PATCH {
        let ct = req.headers().typed_get::<ContentType>();
        if ct.map(|c| c.0) != Some(SABRE_PARTIALUPDATE.to_string()) {
            return Err(DavError::Status(StatusCode::UNSUPPORTED_MEDIA_TYPE));
        }
    }

    let if_header = req.headers().typed_get::<crate::ifheader::If>();
    let tags = TagCache::build(ctx.service, ctx.prefix, path, if_header.as_ref()).await;
    let submitted_tokens = check_preconditions(ctx, req, &entity_state(meta.as_ref()), false, path, &tags).await?;
    check_lock_tokens(ctx, &[AffectedResource { path: path.clone(), deep: false }], &submitted_tokens, false).await?;

    let cr_hdr = req.headers().typed_get::<ContentRange>();
    let range: Option<PutSplice> = cr_hdr.as_ref().map(resolve_put_range);
    let range = range
        .zip(cr_hdr.as_ref())
        .map(|(r, cr)| PutRange { start: r.start, end: r.end, total: cr.complete_length });

    let new_meta = ctx
        .service
        .put(path, body, range)
        .await
        .map_err(|e| DavError::Status(fserror_to_status(e)))?;

    let status = if existed { StatusCode::NO_CONTENT } else { StatusCode::CREATED };
    let mut resp = Response::builder().status(status).header(http::header::ACCEPT_RANGES, "bytes");
    if let Some(etag) = &new_meta.etag {
        resp = resp.header(http::header::ETAG, etag.to_string());
    }
    if let Some(lm) = new_meta.last_modified {
        resp = resp.header(http::header::LAST_MODIFIED, crate::etag::systemtime_to_httpdate(lm));
    }
    if !existed {
        resp = resp.header(http::header::CONTENT_LOCATION, href(path));
    }
    resp.body(Body::empty()).map_err(|_| DavError::Status(StatusCode::INTERNAL_SERVER_ERROR))
}
