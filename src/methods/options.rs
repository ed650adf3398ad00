//! OPTIONS (RFC 4918 §18, §10.1's `DAV:` compliance-class header).
//! Grounded on `handle_options.rs`'s `do_options`, which
//! built its `Allow:` set from whether the target existed, was a
//! collection, or was unmapped; generalized here to consult `Service`
//! instead of `DavFileSystem::metadata`.

use http::{Request, Response, StatusCode};

use crate::body::Body;
use crate::error::DavResult;
use crate::handler::Context;
use crate::path::DavPath;
use crate::util::{DavMethod, DavMethodSet};

pub(crate) async fn handle(ctx: &Context<'_>, _req: &Request<()>, path: &DavPath) -> DavResult<Response<Body>> {
    let mut allow = ctx.allow;

    if !ctx.service.is_writable() {
        for m in [DavMethod::Put, DavMethod::Patch, DavMethod::Delete, DavMethod::MkCol, DavMethod::Copy, DavMethod::Move] {
            allow.remove(m);
        }
    }
    if !ctx.service.supports_locking() {
        allow.remove(DavMethod::Lock);
        allow.remove(DavMethod::Unlock);
    }

    if path.is_star() {
        return Response::builder()
            .status(StatusCode::OK)
            .header(http::header::ALLOW, allow.as_allow_header())
            .header("DAV", "1, 2")
            .body(Body::empty())
            .map_err(|_| crate::error::DavError::Status(StatusCode::INTERNAL_SERVER_ERROR));
    }

    match ctx.service.resolve(path).await {
        Some(resource) => {
            let meta = resource.metadata(false).await;
            if let Ok(m) = meta {
                if !m.is_collection {
                    allow.remove(DavMethod::MkCol);
                }
            }
        },
        None => {
            // Unmapped URL: only the methods that can create a resource
            // there make sense (§6's "Allow on an unmapped URL").
            let mut creating = DavMethodSet::none();
            if allow.contains(DavMethod::Put) {
                creating.add(DavMethod::Put);
            }
            if allow.contains(DavMethod::MkCol) {
                creating.add(DavMethod::MkCol);
            }
            if allow.contains(DavMethod::Lock) {
                creating.add(DavMethod::Lock);
            }
            creating.add(DavMethod::Options);
            allow = creating;
        },
    }

    Response::builder()
        .status(StatusCode::OK)
        .header(http::header::ALLOW, allow.as_allow_header())
        .header("DAV", "1, 2")
        .header(http::header::CONTENT_LENGTH, "0")
        .body(Body::empty())
        .map_err(|_| crate::error::DavError::Status(StatusCode::INTERNAL_SERVER_ERROR))
}
