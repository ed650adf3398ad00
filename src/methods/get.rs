//! GET/HEAD: the baseline HTTP semantics RFC 4918 carries over unchanged
//! (§9.4), plus RFC 7233 partial content (§4.5) and this engine's
//! generated directory listing for a mapped collection with no native
//! index (a supplemented feature, off unless the host turns on
//! `autoindex`). Grounded on `handle_gethead.rs`.

use http::{Request, Response, StatusCode};

use crate::body::Body;
use crate::davheaders::{IfRange, Range};
use crate::error::{DavError, DavResult, fserror_to_status};
use crate::etag::systemtime_to_httpdate;
use crate::handler::{Context, TagCache};
use crate::path::DavPath;
use crate::range::{self, RangePart, RangeRendering};
use crate::resource::{AccessKind, EntityMetadata, Resource};

use super::{check_preconditions, entity_state, href};

pub(crate) async fn handle(ctx: &Context<'_>, req: &Request<()>, path: &DavPath, head: bool) -> DavResult<Response<Body>> {
    let resource = ctx.service.resolve(path).await.ok_or(DavError::Status(StatusCode::NOT_FOUND))?;

    if let Some(status) = ctx.check_access(path, AccessKind::Read, Some(resource.as_ref())).await {
        return Err(DavError::Status(status));
    }

    let meta = resource.metadata(true).await.map_err(|e| DavError::Status(fserror_to_status(e)))?;

    if meta.is_collection {
        if ctx.autoindex {
            return render_dirlist(path, resource.as_ref(), head).await;
        }
        return Err(DavError::Status(StatusCode::METHOD_NOT_ALLOWED));
    }

    let headers = req.headers();
    let if_header = headers::HeaderMapExt::typed_get::<crate::ifheader::If>(headers);
    let tags = TagCache::build(ctx.service, ctx.prefix, path, if_header.as_ref()).await;
    check_preconditions(ctx, req, &entity_state(Some(&meta)), true, path, &tags).await?;

    let range_hdr = headers::HeaderMapExt::typed_get::<Range>(headers);
    let if_range = headers::HeaderMapExt::typed_get::<IfRange>(headers);
    // A weak ETag can never establish the byte-for-byte identity If-Range
    // needs (RFC 7233 §3.2), so a weak comparator here is a client error.
    if let Some(IfRange::ETag(t)) = &if_range {
        if t.is_weak() {
            return Err(DavError::Status(StatusCode::BAD_REQUEST));
        }
    }
    let media_type = meta.media_type.clone().unwrap_or_else(|| "application/octet-stream".to_string());

    if head {
        let mut resp = Response::builder().status(StatusCode::OK).header(http::header::ACCEPT_RANGES, "bytes");
        if let Some(lm) = meta.last_modified {
            resp = resp.header(http::header::LAST_MODIFIED, systemtime_to_httpdate(lm));
        }
        if let Some(etag) = &meta.etag {
            resp = resp.header(http::header::ETAG, etag.to_string());
        }
        resp = resp.header(http::header::CONTENT_TYPE, media_type);
        resp = resp.header(http::header::CONTENT_LENGTH, meta.len.to_string());
        return resp.body(Body::empty()).map_err(|_| DavError::Status(StatusCode::INTERNAL_SERVER_ERROR));
    }

    if let Some(Range(specs)) = range_hdr.filter(|_| range_applies(if_range.as_ref(), &meta)) {
        return match range::resolve(&specs, meta.len) {
            None => Response::builder()
                .status(StatusCode::RANGE_NOT_SATISFIABLE)
                .header(http::header::CONTENT_RANGE, format!("bytes */{}", meta.len))
                .body(Body::empty())
                .map_err(|_| DavError::Status(StatusCode::INTERNAL_SERVER_ERROR)),
            Some(resolved) => {
                let mut parts = Vec::with_capacity(resolved.len());
                for r in &resolved {
                    let data = resource.read_range(r.start, r.len()).await.map_err(|e| DavError::Status(fserror_to_status(e)))?;
                    parts.push(RangePart { range: *r, data });
                }
                render_range(parts, meta.len, media_type)
            },
        };
    }

    let mut resp = Response::builder().status(StatusCode::OK).header(http::header::ACCEPT_RANGES, "bytes");
    if let Some(lm) = meta.last_modified {
        resp = resp.header(http::header::LAST_MODIFIED, systemtime_to_httpdate(lm));
    }
    if let Some(etag) = &meta.etag {
        resp = resp.header(http::header::ETAG, etag.to_string());
    }
    resp = resp.header(http::header::CONTENT_TYPE, media_type);
    resp = resp.header(http::header::CONTENT_LENGTH, meta.len.to_string());
    let data = resource.read_range(0, meta.len).await.map_err(|e| DavError::Status(fserror_to_status(e)))?;
    resp.body(Body::from(data)).map_err(|_| DavError::Status(StatusCode::INTERNAL_SERVER_ERROR))
}

fn range_applies(if_range: Option<&IfRange>, meta: &EntityMetadata) -> bool {
    match if_range {
        None => true,
        Some(IfRange::ETag(t)) => meta.etag.as_ref().map(|e| e.strong_eq(t)).unwrap_or(false),
        Some(IfRange::Date(d)) => {
            let date_time: std::time::SystemTime = (*d).into();
            meta.last_modified.map(|lm| lm <= date_time).unwrap_or(false)
        },
    }
}

fn render_range(parts: Vec<RangePart>, total_len: u64, media_type: String) -> DavResult<Response<Body>> {
    match range::render(parts, Some(media_type.clone()), "DAVBOUNDARY") {
        RangeRendering::Single(part) => {
            let cr = format!("bytes {}-{}/{}", part.range.start, part.range.end, total_len);
            Response::builder()
                .status(StatusCode::PARTIAL_CONTENT)
                .header(http::header::CONTENT_RANGE, cr)
                .header(http::header::CONTENT_LENGTH, part.data.len().to_string())
                .header(http::header::CONTENT_TYPE, media_type)
                .body(Body::from(part.data))
                .map_err(|_| DavError::Status(StatusCode::INTERNAL_SERVER_ERROR))
        },
        RangeRendering::Multipart { boundary, media_type, parts } => {
            let body = range::write_multipart(&boundary, media_type.as_deref(), total_len, &parts);
            Response::builder()
                .status(StatusCode::PARTIAL_CONTENT)
                .header(http::header::CONTENT_TYPE, format!("multipart/byteranges; boundary={}", boundary))
                .header(http::header::CONTENT_LENGTH, body.len().to_string())
                .body(Body::from(body))
                .map_err(|_| DavError::Status(StatusCode::INTERNAL_SERVER_ERROR))
        },
    }
}

async fn render_dirlist(path: &DavPath, resource: &dyn Resource, head: bool) -> DavResult<Response<Body>> {
    let mut entries = resource.read_dir().await.map_err(|e| DavError::Status(fserror_to_status(e)))?;
    entries.sort_by(|a, b| a.name.cmp(&b.name));

    let title = htmlescape::encode_minimal(&href(path));
    let mut html = format!("<!DOCTYPE html>\n<html><head><title>{title}</title></head><body>\n<h1>{title}</h1>\n<ul>\n");
    if path.as_bytes() != &b"/"[..] {
        html.push_str("<li><a href=\"../\">..</a></li>\n");
    }
    for entry in &entries {
        let name = String::from_utf8_lossy(&entry.name);
        let escaped = htmlescape::encode_minimal(&name);
        let suffix = if entry.metadata.is_collection { "/" } else { "" };
        html.push_str(&format!("<li><a href=\"{escaped}{suffix}\">{escaped}{suffix}</a></li>\n"));
    }
    html.push_str("</ul>\n</body></html>\n");

    let resp = Response::builder().status(StatusCode::OK).header(http::header::CONTENT_TYPE, "text/html; charset=utf-8");
    if head {
        return resp.header(http::header::CONTENT_LENGTH, html.len().to_string()).body(Body::empty()).map_err(|_| DavError::Status(StatusCode::INTERNAL_SERVER_ERROR));
    }
    resp.body(Body::from(html)).map_err(|_| DavError::Status(StatusCode::INTERNAL_SERVER_ERROR))
}
