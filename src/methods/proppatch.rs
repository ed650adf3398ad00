//! PROPPATCH (RFC 4918 §9.2): the property-mutation side of C9. Grounded
//! on `handle_props.rs`'s `handle_proppatch` - same split
//! between a protected-property rejection pass and a dead-property patch
//! batch, same "if anything failed, turn every surviving success into
//! `424 Failed Dependency`" transactional fallback - generalized from
//! `DavFileSystem::patch_props`/`liveprop_set`/`liveprop_remove` onto
//! `PropertyStore::patch` and a fixed protected-name table (C1/C3).

use http::{Request, Response, StatusCode};
use xmltree::XMLNode;

use crate::body::Body;
use crate::error::{DavError, DavResult, fserror_to_status};
use crate::handler::{Context, TagCache};
use crate::ifheader::If;
use crate::multistatus::{MultiStatus, PropResult};
use crate::path::DavPath;
use crate::precondition::AffectedResource;
use crate::propstore::{PropertyPatch, PropertyRecord};
use crate::resource::AccessKind;
use crate::xmlvalue::{PropertyValue, QName, parse_xml};

use super::{check_lock_tokens, check_preconditions, entity_state, href};

/// Live properties computed from resource metadata rather than held in a
/// `PropertyStore` - §3 marks these protected, so `PROPPATCH` always
/// rejects a `set`/`remove` naming one. `displayname` is deliberately
/// left out: this engine lets it be overridden as a dead property, the
/// way `liveprop_set` did for plain local filesystems.
const PROTECTED_LIVE_PROPS: &[&str] =
    &["resourcetype", "getcontentlength", "getcontenttype", "getlastmodified", "creationdate", "getetag"];

fn is_protected(name: &QName) -> bool {
    name.namespace == QName::DAV && PROTECTED_LIVE_PROPS.contains(&name.local.as_str())
}

enum Instruction {
    Set(QName, PropertyValue),
    Remove(QName),
}

impl Instruction {
    fn name(&self) -> &QName {
        match self {
            Instruction::Set(n, _) => n,
            Instruction::Remove(n) => n,
        }
    }

    fn into_patch(self) -> PropertyPatch {
        match self {
            Instruction::Set(name, value) => PropertyPatch::Set(PropertyRecord { name, value }),
            Instruction::Remove(name) => PropertyPatch::Remove(name),
        }
    }
}

fn parse_body(body: &[u8]) -> DavResult<Vec<Instruction>> {
    let root = parse_xml(body)?;
    if root.name != "propertyupdate" {
        return Err(DavError::XmlParseError);
    }

    let mut instructions = Vec::new();
    for child in &root.children {
        let update = match child {
            XMLNode::Element(e) => e,
            _ => continue,
        };
        let is_set = match update.name.as_str() {
            "set" => true,
            "remove" => false,
            _ => continue,
        };
        let prop = update.children.iter().find_map(|n| match n {
            XMLNode::Element(e) if e.name == "prop" => Some(e),
            _ => None,
        });
        let Some(prop) = prop else { continue };
        for node in &prop.children {
            let elem = match node {
                XMLNode::Element(e) => e,
                _ => continue,
            };
            let name = QName::new(elem.namespace.clone().unwrap_or_default(), elem.name.clone());
            if is_set {
                instructions.push(Instruction::Set(name, PropertyValue::decode(elem, None)));
            } else {
                instructions.push(Instruction::Remove(name));
            }
        }
    }
    if instructions.is_empty() {
        return Err(DavError::Status(StatusCode::BAD_REQUEST));
    }
    Ok(instructions)
}

pub(crate) async fn handle(ctx: &Context<'_>, req: &Request<()>, path: &DavPath, body: bytes::Bytes) -> DavResult<Response<Body>> {
    if let Some(status) = ctx.check_access(path, AccessKind::WriteProps, None).await {
        return Err(DavError::Status(status));
    }

    let resource = ctx.service.resolve(path).await.ok_or(DavError::Status(StatusCode::NOT_FOUND))?;
    let meta = resource.metadata(true).await.map_err(|e| DavError::Status(fserror_to_status(e)))?;

    let if_header = headers::HeaderMapExt::typed_get::<If>(req.headers());
    let tags = TagCache::build(ctx.service, ctx.prefix, path, if_header.as_ref()).await;
    let submitted_tokens = check_preconditions(ctx, req, &entity_state(Some(&meta)), false, path, &tags).await?;
    check_lock_tokens(ctx, &[AffectedResource { path: path.clone(), deep: false }], &submitted_tokens, false).await?;

    let instructions = parse_body(&body)?;

    // Split into protected-property rejections and everything else,
    // which becomes a dead-property patch batch only if nothing was
    // rejected.
    let mut rejected: Vec<(QName, StatusCode)> = Vec::new();
    let mut patch = Vec::new();
    for instr in instructions {
        if is_protected(instr.name()) {
            rejected.push((instr.name().clone(), StatusCode::FORBIDDEN));
        } else {
            patch.push(instr.into_patch());
        }
    }

    let mut outcomes: Vec<(QName, StatusCode)>;
    if !rejected.is_empty() {
        outcomes = rejected;
        outcomes.extend(patch.into_iter().map(|p| {
            let name = match &p {
                PropertyPatch::Set(rec) => rec.name.clone(),
                PropertyPatch::Remove(name) => name.clone(),
            };
            (name, StatusCode::FAILED_DEPENDENCY)
        }));
    } else {
        outcomes = Vec::new();
        if !patch.is_empty() {
            let patched = ctx.service.property_store().patch(path, patch).await?;
            let any_failed = patched.iter().any(|(s, _)| !s.is_success());
            for (status, name) in patched {
                outcomes.push((name, if any_failed && status.is_success() { StatusCode::FAILED_DEPENDENCY } else { status }));
            }
        }
    }

    let results =
        outcomes.into_iter().map(|(name, status)| PropResult { name, status, value: None }).collect();
    let mut multi = MultiStatus::new(href(path));
    multi.add_propstat(href(path), results);
    let (status, resp_body) = multi.into_response()?;
    Response::builder()
        .status(status)
        .header(http::header::CONTENT_TYPE, "application/xml; charset=utf-8")
        .body(resp_body)
        .map_err(|_| DavError::Status(StatusCode::INTERNAL_SERVER_ERROR))
}
