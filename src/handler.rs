//! C9 (dispatcher half): the request entry point (RFC 4918 §6's method
//! table), generalizing `davhandler.rs`'s `DavHandler`/`DavConfig` pair
//! onto the `Service`/`LockManager`/`PropertyStore`/`AuthorizationFilter`
//! trait surface. Kept: the generic-body `handle`/`handle2` split, the
//! eager body-drain-except-PUT/PATCH policy, and the `== START REQUEST`/
//! `== END REQUEST` debug-logging convention. Replaced: `Box<dyn
//! DavFileSystem>` becomes `Arc<dyn Service>`, and the single ambient
//! lock system becomes whatever `Service::lock_manager()` returns.

use std::sync::Arc;

use bytes::{Buf, Bytes};
use headers::HeaderMapExt;
use http::{Request, Response, StatusCode};
use http_body_util::BodyExt;

use crate::body::Body;
use crate::error::{DavError, DavResult};
use crate::ifheader::EntityTagLookup;
use crate::methods;
use crate::path::{DavPath, DavPathRef};
use crate::resource::{AccessKind, AuthorizationFilter, Service};
use crate::util::{DavMethod, DavMethodSet, dav_method, dav_xml_error};

const MAX_REQUEST_BODY: usize = 65536;
/// `PUT`/`PATCH` bodies are actual file content rather than XML, so they
/// get a much larger cap than every other method's request body.
const MAX_UPLOAD_BODY: usize = 256 * 1024 * 1024;

/// Builder for a [`DavHandler`].
pub struct DavConfig {
    pub(crate) prefix: String,
    pub(crate) service: Option<Arc<dyn Service>>,
    pub(crate) allow: DavMethodSet,
    pub(crate) principal: Option<String>,
    pub(crate) filters: Vec<Arc<dyn AuthorizationFilter>>,
    /// Whether GET on a collection with no `index.html`-like resource
    /// renders a generated directory listing, rather than `404`/`501`.
    /// Off by default.
    pub(crate) autoindex: bool,
    /// When set, a `PROPFIND` with no `Depth` header or `Depth: infinity`
    /// is rejected with `403` + `DAV:propfind-finite-depth` instead of
    /// running unbounded (§4.4's "configurable maximum"). Off by default,
    /// for maximum client compatibility.
    pub(crate) reject_infinite_propfind: bool,
}

impl Default for DavConfig {
    fn default() -> DavConfig {
        DavConfig {
            prefix: String::new(),
            service: None,
            allow: DavMethodSet::all(),
            principal: None,
            filters: Vec::new(),
            autoindex: false,
            reject_infinite_propfind: false,
        }
    }
}

impl DavConfig {
    pub fn new() -> DavConfig {
        DavConfig::default()
    }

    pub fn strip_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = prefix.into();
        self
    }

    pub fn service(mut self, service: Arc<dyn Service>) -> Self {
        self.service = Some(service);
        self
    }

    pub fn allow_methods(mut self, allow: DavMethodSet) -> Self {
        self.allow = allow;
        self
    }

    pub fn principal(mut self, principal: impl Into<String>) -> Self {
        self.principal = Some(principal.into());
        self
    }

    pub fn filter(mut self, filter: Arc<dyn AuthorizationFilter>) -> Self {
        self.filters.push(filter);
        self
    }

    pub fn autoindex(mut self, on: bool) -> Self {
        self.autoindex = on;
        self
    }

    pub fn finite_propfind_only(mut self, on: bool) -> Self {
        self.reject_infinite_propfind = on;
        self
    }

    pub fn build_handler(self) -> DavHandler {
        DavHandler { config: Arc::new(self) }
    }
}

/// A ready-to-use WebDAV request processor. Cheap to `Clone` (an `Arc`
/// around its configuration); a host wires one of these into whatever
/// HTTP server it runs.
#[derive(Clone)]
pub struct DavHandler {
    config: Arc<DavConfig>,
}

impl DavHandler {
    pub fn builder() -> DavConfig {
        DavConfig::new()
    }

    /// Handle one request with this handler's configuration.
    pub async fn handle<ReqBody, ReqData, ReqError>(&self, req: Request<ReqBody>) -> Response<Body>
    where
        ReqData: Buf + Send,
        ReqError: std::error::Error + Send + Sync + 'static,
        ReqBody: http_body::Body<Data = ReqData, Error = ReqError> + Send,
    {
        dispatch(self.config.clone(), req).await
    }
}

async fn dispatch<ReqBody, ReqData, ReqError>(config: Arc<DavConfig>, req: Request<ReqBody>) -> Response<Body>
where
    ReqData: Buf + Send,
    ReqError: std::error::Error + Send + Sync + 'static,
    ReqBody: http_body::Body<Data = ReqData, Error = ReqError> + Send,
{
    let (parts, body) = req.into_parts();
    let head_req = Request::from_parts(parts, ());

    let method = match dav_method(head_req.method()) {
        Ok(m) => m,
        Err(e) => return error_response(e),
    };

    if !config.allow.contains(method) {
        return error_response(DavError::StatusClose(StatusCode::METHOD_NOT_ALLOWED));
    }

    let max_size = match method {
        DavMethod::Put | DavMethod::Patch => MAX_UPLOAD_BODY,
        _ => MAX_REQUEST_BODY,
    };
    let body_bytes = match read_request(body, max_size).await {
        Ok(b) => b,
        Err(e) => return error_response(e),
    };

    log::debug!("== START REQUEST {:?} {}", method, head_req.uri());
    let result = handle2(&config, method, head_req, body_bytes).await;
    log::debug!("== END REQUEST {:?}", result.as_ref().map(|r| r.status()));

    match result {
        Ok(resp) => resp,
        Err(e) => error_response(e),
    }
}

async fn read_request<ReqBody, ReqData, ReqError>(body: ReqBody, max_size: usize) -> DavResult<Bytes>
where
    ReqData: Buf + Send,
    ReqError: std::error::Error + Send + Sync + 'static,
    ReqBody: http_body::Body<Data = ReqData, Error = ReqError> + Send,
{
    let collected = BodyExt::collect(body)
        .await
        .map_err(|_| DavError::StatusClose(StatusCode::BAD_REQUEST))?;
    let bytes = collected.to_bytes();
    if bytes.len() > max_size {
        return Err(DavError::StatusClose(StatusCode::PAYLOAD_TOO_LARGE));
    }
    Ok(bytes)
}

fn error_response(e: DavError) -> Response<Body> {
    let status = e.statuscode();
    let mut builder = Response::builder().status(status);
    let body = match e.condition_code() {
        Some(code) => dav_xml_error(&format!("<D:{}/>", code.element_name())),
        None => Body::empty(),
    };
    if e.must_close() {
        builder = builder.header(http::header::CONNECTION, "close");
    }
    builder.body(body).unwrap_or_else(|_| {
        Response::builder().status(StatusCode::INTERNAL_SERVER_ERROR).body(Body::empty()).unwrap()
    })
}

/// Everything a method processor needs, bundled so `methods/*.rs`
/// doesn't have to thread five separate arguments through every call.
pub(crate) struct Context<'a> {
    pub(crate) service: &'a dyn Service,
    pub(crate) prefix: &'a str,
    pub(crate) principal: Option<&'a str>,
    pub(crate) filters: &'a [Arc<dyn AuthorizationFilter>],
    pub(crate) autoindex: bool,
    pub(crate) allow: DavMethodSet,
    pub(crate) reject_infinite_propfind: bool,
}

impl<'a> Context<'a> {
    /// Run the authorization filter chain, then the resolved resource's
    /// own `should_deny_access` hook (§6's "Authorization filter chain").
    pub(crate) async fn check_access(
        &self,
        path: &DavPathRef,
        kind: AccessKind,
        resource: Option<&dyn crate::resource::Resource>,
    ) -> Option<StatusCode> {
        for filter in self.filters {
            if let Some(status) = filter.check(self.principal, path, kind).await {
                return Some(status);
            }
        }
        if let Some(r) = resource {
            return r.should_deny_access(kind).await;
        }
        None
    }
}

async fn handle2(config: &Arc<DavConfig>, method: DavMethod, req: Request<()>, body: Bytes) -> DavResult<Response<Body>> {
    let service = config.service.as_ref().ok_or(DavError::Status(StatusCode::INTERNAL_SERVER_ERROR))?.as_ref();
    let path = DavPath::from_uri(req.uri(), &config.prefix)?;

    let ctx = Context {
        service,
        prefix: &config.prefix,
        principal: config.principal.as_deref(),
        filters: &config.filters,
        autoindex: config.autoindex,
        allow: config.allow,
        reject_infinite_propfind: config.reject_infinite_propfind,
    };

    match method {
        DavMethod::Options => methods::options::handle(&ctx, &req, &path).await,
        DavMethod::Head => methods::get::handle(&ctx, &req, &path, true).await,
        DavMethod::Get => methods::get::handle(&ctx, &req, &path, false).await,
        DavMethod::Put | DavMethod::Patch => methods::put::handle(&ctx, &req, &path, body).await,
        DavMethod::Delete => methods::delete::handle(&ctx, &req, &path).await,
        DavMethod::MkCol => methods::mkcol::handle(&ctx, &req, &path).await,
        DavMethod::Copy => methods::copymove::handle(&ctx, &req, &path, false).await,
        DavMethod::Move => methods::copymove::handle(&ctx, &req, &path, true).await,
        DavMethod::Lock => methods::lock::handle_lock(&ctx, &req, &path, body).await,
        DavMethod::Unlock => methods::lock::handle_unlock(&ctx, &req, &path).await,
        DavMethod::PropFind => methods::propfind::handle(&ctx, &req, &path, body).await,
        DavMethod::PropPatch => methods::proppatch::handle(&ctx, &req, &path, body).await,
    }
}

/// Pre-resolved ETags for every path an `If` header might reference,
/// bridging `ifheader::EntityTagLookup` (synchronous, since the `If`
/// evaluator is plain byte-slice logic with no I/O of its own) with the
/// async `Service::resolve`/`Resource::metadata` this engine's resources
/// actually need to compute one. Built once per request, before calling
/// `ifheader::evaluate`/`precondition::check_metadata_and_if`.
pub(crate) struct TagCache {
    tags: std::collections::HashMap<Vec<u8>, Option<crate::etag::ETag>>,
}

fn tag_key(path: &DavPathRef) -> Vec<u8> {
    let mut b = path.as_bytes().to_vec();
    if b.len() > 1 && b.last() == Some(&b'/') {
        b.pop();
    }
    b
}

impl TagCache {
    /// Resolve `request_path` plus every tagged list's resource in `hdr`,
    /// via `service`, and cache their current ETags (`None` if the
    /// resource doesn't exist or reports none).
    pub(crate) async fn build(
        service: &dyn Service,
        prefix: &str,
        request_path: &DavPath,
        hdr: Option<&crate::ifheader::If>,
    ) -> TagCache {
        let mut paths: Vec<DavPath> = vec![request_path.clone()];
        if let Some(hdr) = hdr {
            for list in &hdr.0 {
                if let Some(url) = &list.resource_tag {
                    if let Ok(p) = DavPath::from_str_and_prefix(url.path(), prefix) {
                        paths.push(p);
                    }
                }
            }
        }

        let mut tags = std::collections::HashMap::new();
        for p in paths {
            let key = tag_key(&p);
            if tags.contains_key(&key) {
                continue;
            }
            let etag = match service.resolve(&p).await {
                Some(r) => r.metadata(true).await.ok().and_then(|m| m.etag),
                None => None,
            };
            tags.insert(key, etag);
        }
        TagCache { tags }
    }
}

impl EntityTagLookup for TagCache {
    fn etag_of(&self, path: &DavPathRef) -> Option<crate::etag::ETag> {
        self.tags.get(&tag_key(path)).cloned().flatten()
    }
}
