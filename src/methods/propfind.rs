//! PROPFIND (RFC 4918 §9.1): the property-discovery side of C9, built on
//! top of the property engine (propstore.rs, xmlvalue.rs) and the
//! depth-bounded walk in traversal.rs. Grounded on `handle_props.rs`'s
//! `handle_propfind`/`PropWriter`, generalized from its
//! `ALLPROP_STR`/`PROPNAME_STR` fixed string tables onto the live
//! properties a `Resource` actually reports, plus whatever is held in
//! the `PropertyStore`.

use bytes::Bytes;
use http::{Request, Response, StatusCode};
use xmltree::XMLNode;

use crate::body::Body;
use crate::davheaders::Depth;
use crate::error::{ConditionCode, DavError, DavResult};
use crate::handler::Context;
use crate::lock::LockSelection;
use crate::multistatus::{MultiStatus, PropResult};
use crate::path::DavPath;
use crate::resource::{AccessKind, EntityMetadata, Resource};
use crate::traversal::walk;
use crate::xmlvalue::{PropertyValue, QName, parse_xml};

use super::{href, standard_live_props};

enum PropfindBody {
    PropName,
    AllProp(Vec<QName>),
    Prop(Vec<QName>),
}

fn elem_qname(node: &XMLNode) -> Option<QName> {
    match node {
        XMLNode::Element(e) => Some(QName::new(e.namespace.clone().unwrap_or_default(), e.name.clone())),
        _ => None,
    }
}

fn parse_body(body: &Bytes) -> DavResult<PropfindBody> {
    if body.is_empty() {
        return Ok(PropfindBody::AllProp(Vec::new()));
    }
    let root = parse_xml(body)?;
    if root.name != "propfind" {
        return Err(DavError::XmlParseError);
    }

    let include: Vec<QName> = root
        .children
        .iter()
        .find_map(|n| match n {
            XMLNode::Element(e) if e.name == "include" => Some(e.children.iter().filter_map(elem_qname).collect()),
            _ => None,
        })
        .unwrap_or_default();

    for child in &root.children {
        if let XMLNode::Element(e) = child {
            match e.name.as_str() {
                "propname" => return Ok(PropfindBody::PropName),
                "prop" => return Ok(PropfindBody::Prop(e.children.iter().filter_map(elem_qname).collect())),
                "allprop" => return Ok(PropfindBody::AllProp(include)),
                _ => {},
            }
        }
    }
    Err(DavError::XmlParseError)
}

fn upsert(out: &mut Vec<(QName, PropertyValue)>, name: QName, value: PropertyValue) {
    match out.iter_mut().find(|(n, _)| *n == name) {
        Some(slot) => slot.1 = value,
        None => out.push((name, value)),
    }
}

/// Every live property this engine knows about for `path`/`meta`/`resource`
/// (standard metadata-derived properties, `DAV:lockdiscovery`/
/// `supportedlock` if locking is on, and whatever the resource itself
/// reports), plus the dead properties `PropertyStore` holds for it.
async fn collect_live_and_dead(
    ctx: &Context<'_>,
    path: &DavPath,
    meta: &EntityMetadata,
    resource: &dyn Resource,
    include_expensive: bool,
) -> Vec<(QName, PropertyValue)> {
    let mut out = standard_live_props(path, meta);

    if ctx.service.supports_locking() {
        let locks = ctx.service.lock_manager().get_locks(path, LockSelection::SelfAndAncestors).await;
        out.push((QName::new(QName::DAV, "lockdiscovery"), super::lockxml::lockdiscovery_value(&locks)));
        out.push((QName::new(QName::DAV, "supportedlock"), super::lockxml::supportedlock_value()));
    }

    for (name, value) in resource.live_properties(include_expensive).await {
        upsert(&mut out, name, value);
    }

    if let Ok(dead) = ctx.service.property_store().get_props(path).await {
        for rec in dead {
            upsert(&mut out, rec.name, rec.value);
        }
    }

    out
}

pub(crate) async fn handle(ctx: &Context<'_>, req: &Request<()>, path: &DavPath, body: Bytes) -> DavResult<Response<Body>> {
    if let Some(status) = ctx.check_access(path, AccessKind::ReadProps, None).await {
        return Err(DavError::Status(status));
    }

    let depth = match headers::HeaderMapExt::typed_get::<Depth>(req.headers()) {
        Some(Depth::Zero) => Depth::Zero,
        Some(Depth::One) => Depth::One,
        Some(Depth::Infinity) | None => {
            if ctx.reject_infinite_propfind {
                return Err(DavError::Condition(StatusCode::FORBIDDEN, ConditionCode::PropfindFiniteDepth));
            }
            Depth::Infinity
        },
    };

    let parsed = parse_body(&body)?;
    let visited = walk(ctx.service, path, depth).await?;

    let mut multi = MultiStatus::new(href(path));
    for v in &visited {
        let meta = match v.resource.metadata(true).await {
            Ok(m) => m,
            Err(_) => continue,
        };

        match &parsed {
            PropfindBody::PropName => {
                let all = collect_live_and_dead(ctx, &v.path, &meta, v.resource.as_ref(), false).await;
                let results =
                    all.into_iter().map(|(name, _)| PropResult { name, status: StatusCode::OK, value: None }).collect();
                multi.add_propstat(href(&v.path), results);
            },
            PropfindBody::AllProp(include) => {
                let mut all = collect_live_and_dead(ctx, &v.path, &meta, v.resource.as_ref(), false).await;
                if !include.is_empty() {
                    for (name, value) in v.resource.live_properties(true).await {
                        if include.contains(&name) {
                            upsert(&mut all, name, value);
                        }
                    }
                }
                let results =
                    all.into_iter().map(|(name, value)| PropResult { name, status: StatusCode::OK, value: Some(value) }).collect();
                multi.add_propstat(href(&v.path), results);
            },
            PropfindBody::Prop(names) => {
                let all = collect_live_and_dead(ctx, &v.path, &meta, v.resource.as_ref(), true).await;
                let mut results = Vec::with_capacity(names.len());
                for name in names {
                    match all.iter().find(|(n, _)| n == name) {
                        Some((_, value)) => {
                            results.push(PropResult { name: name.clone(), status: StatusCode::OK, value: Some(value.clone()) })
                        },
                        None => results.push(PropResult { name: name.clone(), status: StatusCode::NOT_FOUND, value: None }),
                    }
                }
                multi.add_propstat(href(&v.path), results);
            },
        }
    }

    let (status, resp_body) = multi.into_response()?;
    Response::builder()
        .status(status)
        .header(http::header::CONTENT_TYPE, "application/xml; charset=utf-8")
        .body(resp_body)
        .map_err(|_| DavError::Status(StatusCode::INTERNAL_SERVER_ERROR))
}
