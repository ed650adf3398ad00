//! C9 (method-processor half): one file per HTTP/WebDAV verb. Each
//! keeps the per-verb split (`handle_gethead.rs`,
//! `handle_put.rs`, `handle_delete.rs`, `handle_mkcol.rs`,
//! `handle_copymove.rs`, `handle_lock.rs`, `handle_props.rs`,
//! `handle_options.rs`) but is rebuilt against the `Service`/`Resource`
//! trait surface and the standalone `precondition.rs`/`multistatus.rs`
//! modules, instead of reaching into `DavFileSystem` and `DavInner`
//! directly. This file holds what every processor needs in common:
//! conditional-header extraction, the precondition-verdict-to-`DavError`
//! translation, and generic live-property synthesis.

pub mod copymove;
pub mod delete;
pub mod get;
pub mod lock;
pub mod lockxml;
pub mod mkcol;
pub mod options;
pub mod propfind;
pub mod proppatch;
pub mod put;

use std::time::SystemTime;

use headers::HeaderMapExt;
use http::{Request, StatusCode};

use crate::davheaders::{IfMatch, IfNoneMatch};
use crate::error::DavError;
use crate::handler::Context;
use crate::ifheader::If;
use crate::path::DavPath;
use crate::precondition::{AffectedResource, ConditionalHeaders, EntityState, Verdict};
use crate::resource::EntityMetadata;
use crate::xmlvalue::{PropertyValue, QName};

/// This resource's href, as it should appear in a response body -
/// URL-encoded, with the service prefix restored.
pub(crate) fn href(path: &DavPath) -> String {
    path.as_url_string_with_prefix()
}

fn date_header(req: &Request<()>, name: &http::HeaderName) -> Option<SystemTime> {
    req.headers().get(name)?.to_str().ok().and_then(crate::etag::httpdate_to_systemtime)
}

/// Pull the six conditional headers §4.3 cares about out of a request,
/// using `headers`' `HeaderMapExt` for the typed ones and a plain
/// HTTP-date parse for the two bare date headers (`headers::IfModifiedSince`
/// doesn't expose its inner `SystemTime`, so there is nothing to gain
/// from going through its `Header` impl here).
pub(crate) fn conditional_headers(req: &Request<()>) -> ConditionalHeaders {
    let map = req.headers();
    ConditionalHeaders {
        if_match: map.typed_get::<IfMatch>().map(|v| v.0.into_match_list()),
        if_unmodified_since: date_header(req, &http::header::IF_UNMODIFIED_SINCE),
        if_none_match: map.typed_get::<IfNoneMatch>().map(|v| v.0.into_match_list()),
        if_modified_since: date_header(req, &http::header::IF_MODIFIED_SINCE),
        if_header: map.typed_get::<If>(),
    }
}

pub(crate) fn entity_state(meta: Option<&EntityMetadata>) -> EntityState {
    match meta {
        Some(m) => EntityState { etag: m.etag.clone(), last_modified: m.last_modified },
        None => EntityState::default(),
    }
}

/// Run precondition rules 1-5 and translate the verdict into a
/// `DavError` a method processor can just `?` through. Use this when
/// the caller has no write-affected-resource list of its own (GET/HEAD,
/// PROPFIND, and PROPPATCH's own-resource probe); writing methods that
/// need rule 6 call [`check_lock_tokens`] separately with their own
/// `AffectedResource` list and fold its `Verdict::Locked` in too.
pub(crate) async fn check_preconditions(
    ctx: &Context<'_>,
    req: &Request<()>,
    state: &EntityState,
    is_get_or_head: bool,
    request_path: &DavPath,
    tags: &dyn crate::ifheader::EntityTagLookup,
) -> Result<Vec<String>, DavError> {
    let headers = conditional_headers(req);
    let verdict = crate::precondition::check_metadata_and_if(
        &headers,
        state,
        is_get_or_head,
        request_path,
        ctx.prefix,
        ctx.service.lock_manager(),
        tags,
    )
    .await;
    verdict_result(verdict)
}

pub(crate) fn verdict_result(verdict: Verdict) -> Result<Vec<String>, DavError> {
    match verdict {
        Verdict::Proceed { submitted_tokens } => Ok(submitted_tokens),
        Verdict::PreconditionFailed => Err(DavError::Status(StatusCode::PRECONDITION_FAILED)),
        Verdict::NotModified => Err(DavError::Status(StatusCode::NOT_MODIFIED)),
        Verdict::Locked { condition, .. } => Err(DavError::Condition(StatusCode::LOCKED, condition)),
    }
}

/// Rule 6: every lock covering `affected` must be matched by a
/// submitted token, or the write is rejected `423 Locked`.
pub(crate) async fn check_lock_tokens(
    ctx: &Context<'_>,
    affected: &[AffectedResource],
    submitted_tokens: &[String],
    on_existing_lock_request: bool,
) -> Result<(), DavError> {
    crate::precondition::check_lock_tokens(
        ctx.service.lock_manager(),
        affected,
        ctx.principal,
        submitted_tokens,
        on_existing_lock_request,
    )
    .await
    .map_err(|(_lock, condition)| DavError::Condition(StatusCode::LOCKED, condition))
}

/// The standard live properties every `Resource` gets for free, computed
/// from its metadata rather than from `Resource::live_properties` -
/// §3's "live properties every resource has" list (`resourcetype`,
/// `getcontentlength`, `getlastmodified`, `creationdate`, `getetag`,
/// `getcontenttype`, and `displayname`, which `handle_props.rs` also
/// synthesized generically rather than asking `DavFileSystem` for).
pub(crate) fn standard_live_props(path: &DavPath, meta: &EntityMetadata) -> Vec<(QName, PropertyValue)> {
    let mut out = Vec::new();
    out.push((
        QName::new(QName::DAV, "resourcetype"),
        if meta.is_collection {
            PropertyValue::qname(QName::new(QName::DAV, "collection"))
        } else {
            PropertyValue::empty()
        },
    ));
    if !meta.is_collection {
        out.push((QName::new(QName::DAV, "getcontentlength"), PropertyValue::text(meta.len.to_string())));
        let mt = meta.media_type.clone().unwrap_or_else(|| "application/octet-stream".to_string());
        out.push((QName::new(QName::DAV, "getcontenttype"), PropertyValue::text(mt)));
    }
    if let Some(lm) = meta.last_modified {
        out.push((QName::new(QName::DAV, "getlastmodified"), PropertyValue::http_date(lm)));
    }
    if let Some(created) = meta.created {
        out.push((QName::new(QName::DAV, "creationdate"), PropertyValue::datetime(created)));
    }
    if let Some(etag) = &meta.etag {
        out.push((QName::new(QName::DAV, "getetag"), PropertyValue::text(etag.to_string())));
    }
    if let Some(name) = path.file_name() {
        out.push((QName::new(QName::DAV, "displayname"), PropertyValue::text(name.to_string())));
    }
    out
}

/// Names of the properties [`standard_live_props`] may produce, for
/// PROPFIND's `allprop`/named-property set arithmetic.
pub(crate) const STANDARD_LIVE_PROP_NAMES: &[&str] = &[
    "resourcetype",
    "getcontentlength",
    "getcontenttype",
    "getlastmodified",
    "creationdate",
    "getetag",
    "displayname",
];
