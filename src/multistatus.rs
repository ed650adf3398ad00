//! C8: the multi-status response writer (RFC 4918 §13).
//!
//! Generalizes `multierror.rs` (a flat href/status list, written with
//! `xml::writer::EventWriter` directly against a `Rc<RefCell<Vec<u8>>>`
//! buffer) into a writer that also supports PROPFIND/PROPPATCH's
//! grouping of properties by status code within a single `D:response`,
//! `DAV:error` condition elements, and extra namespaces beyond `DAV:` -
//! a PROPFIND naming a client-defined property needs its namespace
//! declared and prefixed somehow, which a flat href/status writer never
//! had to handle.
//!
//! Namespace prefixes are assigned in a fixed order: `DAV:` itself gets
//! no prefix (it is the document's default namespace), `xsi`/`xs` are
//! reserved for XML Schema instance/schema if anything needs them, and
//! every other namespace first seen gets the next letter `a`..`z`, then
//! falls back to `ns26`, `ns27`, ... This keeps output prefixes stable
//! and short for the common case (one or two client namespaces).

use xml::common::XmlVersion;
use xml::writer::{EmitterConfig, EventWriter, XmlEvent as XmlWEvent};
use xmltree::XMLNode;

use crate::body::Body;
use crate::error::{ConditionCode, DavResult};
use crate::xmlvalue::{PropertyData, PropertyValue, QName};

const XSI_URI: &str = "http://www.w3.org/2001/XMLSchema-instance";
const XS_URI: &str = "http://www.w3.org/2001/XMLSchema";

struct NamespaceTable {
    order: Vec<String>,
}

impl NamespaceTable {
    fn new() -> NamespaceTable {
        NamespaceTable { order: Vec::new() }
    }

    /// `None` means "no prefix, use the default namespace" (DAV: only).
    fn prefix_for(&mut self, ns: &str) -> Option<String> {
        if ns.is_empty() || ns == QName::DAV {
            return None;
        }
        if ns == XSI_URI {
            return Some("xsi".to_string());
        }
        if ns == XS_URI {
            return Some("xs".to_string());
        }
        let idx = match self.order.iter().position(|n| n == ns) {
            Some(i) => i,
            None => {
                self.order.push(ns.to_string());
                self.order.len() - 1
            },
        };
        Some(Self::prefix_at(idx))
    }

    fn prefix_at(idx: usize) -> String {
        if idx < 26 {
            ((b'a' + idx as u8) as char).to_string()
        } else {
            format!("ns{}", idx)
        }
    }

    /// Every non-DAV namespace registered so far, in assignment order,
    /// as `(uri, prefix)` pairs for declaring on the root element.
    fn declarations(&self) -> Vec<(String, String)> {
        self.order.iter().enumerate().map(|(i, ns)| (ns.clone(), Self::prefix_at(i))).collect()
    }

    fn qualify(&mut self, name: &QName) -> String {
        match self.prefix_for(&name.namespace) {
            None => name.local.clone(),
            Some(p) => format!("{}:{}", p, name.local),
        }
    }
}

/// One property outcome within a `D:response`, grouped into a
/// `D:propstat` by its status code.
pub struct PropResult {
    pub name: QName,
    pub status: http::StatusCode,
    pub value: Option<PropertyValue>,
}

enum ResponseBody {
    /// A plain href/status response, used by PROPPATCH-on-nonexistent,
    /// COPY/MOVE/DELETE sub-resource failures, and the single-resource
    /// collapse case.
    Status { status: http::StatusCode, error: Option<ConditionCode> },
    /// A PROPFIND/PROPPATCH response: properties grouped by outcome.
    PropStat { results: Vec<PropResult> },
}

struct ResponseEntry {
    href: String,
    body: ResponseBody,
    location: Option<String>,
}

/// Accumulates per-resource outcomes and renders them as a single RFC
/// 4918 `D:multistatus` document (or, when there is exactly one plain
/// `Status` entry for the request's own href, collapses to a bare
/// status with no body at all - matching `multierror.rs`'s behavior for
/// the common single-resource case).
pub struct MultiStatus {
    request_href: String,
    responses: Vec<ResponseEntry>,
    lang: Option<String>,
}

impl MultiStatus {
    pub fn new(request_href: impl Into<String>) -> MultiStatus {
        MultiStatus { request_href: request_href.into(), responses: Vec::new(), lang: None }
    }

    /// `xml:lang` to set on the document root, inherited by every
    /// response per ordinary XML scoping rules. Typically copied from
    /// the request's `Content-Language` header or the PROPFIND body's
    /// own `xml:lang` attribute.
    pub fn set_lang(&mut self, lang: impl Into<String>) {
        self.lang = Some(lang.into());
    }

    pub fn add_status(&mut self, href: impl Into<String>, status: http::StatusCode) {
        self.responses.push(ResponseEntry {
            href: href.into(),
            body: ResponseBody::Status { status, error: None },
            location: None,
        });
    }

    pub fn add_status_with_error(
        &mut self,
        href: impl Into<String>,
        status: http::StatusCode,
        error: ConditionCode,
    ) {
        self.responses.push(ResponseEntry {
            href: href.into(),
            body: ResponseBody::Status { status, error: Some(error) },
            location: None,
        });
    }

    pub fn add_redirect(&mut self, href: impl Into<String>, location: impl Into<String>) {
        self.responses.push(ResponseEntry {
            href: href.into(),
            body: ResponseBody::Status { status: http::StatusCode::MOVED_PERMANENTLY, error: None },
            location: Some(location.into()),
        });
    }

    pub fn add_propstat(&mut self, href: impl Into<String>, results: Vec<PropResult>) {
        self.responses.push(ResponseEntry { href: href.into(), body: ResponseBody::PropStat { results }, location: None });
    }

    pub fn is_empty(&self) -> bool {
        self.responses.is_empty()
    }

    /// Render the accumulated responses. Returns the status to use for
    /// the whole HTTP response plus its body: `207 Multi-Status` with an
    /// XML body in the general case, or a bare status with an empty body
    /// when there is exactly one `Status` response and it is for the
    /// request's own href (RFC 4918 §13 permits, and clients expect,
    /// this collapse for e.g. a non-recursive DELETE that just works).
    pub fn into_response(self) -> DavResult<(http::StatusCode, Body)> {
        if self.responses.len() == 1 {
            if let ResponseBody::Status { status, error: None } = &self.responses[0].body {
                if self.responses[0].href == self.request_href && self.responses[0].location.is_none() {
                    return Ok((*status, Body::empty()));
                }
            }
        }
        let mut ns = NamespaceTable::new();
        // First pass: force every namespace used to register, so the
        // root element can declare them all up front.
        for r in &self.responses {
            if let ResponseBody::PropStat { results } = &r.body {
                for pr in results {
                    ns.prefix_for(&pr.name.namespace);
                }
            }
        }

        let mut buf: Vec<u8> = Vec::new();
        {
            let mut xw = EventWriter::new_with_config(
                &mut buf,
                EmitterConfig { perform_indent: true, ..EmitterConfig::default() },
            );
            xw.write(XmlWEvent::StartDocument { version: XmlVersion::Version10, encoding: Some("utf-8"), standalone: None })?;

            let mut root = XmlWEvent::start_element("multistatus").ns("", "DAV:");
            for (uri, prefix) in ns.declarations() {
                root = root.ns(prefix, uri);
            }
            if let Some(lang) = &self.lang {
                root = root.attr("xml:lang", lang);
            }
            xw.write(root)?;

            for r in &self.responses {
                write_response(&mut xw, &mut ns, r)?;
            }

            xw.write(XmlWEvent::end_element())?;
        }
        Ok((http::StatusCode::MULTI_STATUS, Body::from(bytes::Bytes::from(buf))))
    }
}

fn write_elem<W: std::io::Write>(xw: &mut EventWriter<W>, name: &str, text: &str) -> DavResult<()> {
    xw.write(XmlWEvent::start_element(name))?;
    if !text.is_empty() {
        xw.write(XmlWEvent::characters(text))?;
    }
    xw.write(XmlWEvent::end_element())?;
    Ok(())
}

fn write_error<W: std::io::Write>(xw: &mut EventWriter<W>, code: ConditionCode) -> DavResult<()> {
    xw.write(XmlWEvent::start_element("error"))?;
    xw.write(XmlWEvent::start_element(code.element_name()))?;
    xw.write(XmlWEvent::end_element())?;
    xw.write(XmlWEvent::end_element())?;
    Ok(())
}

fn write_response<W: std::io::Write>(
    xw: &mut EventWriter<W>,
    ns: &mut NamespaceTable,
    r: &ResponseEntry,
) -> DavResult<()> {
    xw.write(XmlWEvent::start_element("response"))?;
    write_elem(xw, "href", &r.href)?;

    match &r.body {
        ResponseBody::Status { status, error } => {
            write_elem(xw, "status", &format!("HTTP/1.1 {}", status))?;
            if let Some(loc) = &r.location {
                write_elem(xw, "location", loc)?;
            }
            if let Some(code) = error {
                write_error(xw, *code)?;
            }
        },
        ResponseBody::PropStat { results } => {
            let mut groups: Vec<(http::StatusCode, Vec<&PropResult>)> = Vec::new();
            for pr in results {
                match groups.iter_mut().find(|(s, _)| *s == pr.status) {
                    Some((_, v)) => v.push(pr),
                    None => groups.push((pr.status, vec![pr])),
                }
            }
            for (status, props) in groups {
                xw.write(XmlWEvent::start_element("propstat"))?;
                xw.write(XmlWEvent::start_element("prop"))?;
                for pr in &props {
                    let qname = ns.qualify(&pr.name);
                    let mut start = XmlWEvent::start_element(qname.as_str());
                    if let Some(v) = &pr.value {
                        if let Some(lang) = &v.language {
                            start = start.attr("xml:lang", lang.as_str());
                        }
                        if let Some(t) = &v.xsi_type {
                            start = start.attr("type", t.as_str());
                        }
                        for (k, val) in &v.attributes {
                            start = start.attr(k.as_str(), val.as_str());
                        }
                    }
                    match pr.value.as_ref().map(|v| &v.data) {
                        None | Some(PropertyData::Empty) => {
                            xw.write(start)?;
                            xw.write(XmlWEvent::end_element())?;
                        },
                        Some(PropertyData::QNameValue(q)) => {
                            xw.write(start)?;
                            let inner = ns.qualify(q);
                            xw.write(XmlWEvent::start_element(inner.as_str()))?;
                            xw.write(XmlWEvent::end_element())?;
                            xw.write(XmlWEvent::end_element())?;
                        },
                        Some(PropertyData::Xml(nodes)) => {
                            xw.write(start)?;
                            for node in nodes {
                                write_xmlnode(xw, ns, node)?;
                            }
                            xw.write(XmlWEvent::end_element())?;
                        },
                        Some(other) => {
                            let text = other.wire_text().unwrap_or_default();
                            xw.write(start)?;
                            if !text.is_empty() {
                                xw.write(XmlWEvent::characters(&text))?;
                            }
                            xw.write(XmlWEvent::end_element())?;
                        },
                    }
                }
                xw.write(XmlWEvent::end_element())?; // prop
                write_elem(xw, "status", &format!("HTTP/1.1 {}", status))?;
                xw.write(XmlWEvent::end_element())?; // propstat
            }
        },
    }

    xw.write(XmlWEvent::end_element())?; // response
    Ok(())
}

fn write_xmlnode<W: std::io::Write>(xw: &mut EventWriter<W>, ns: &mut NamespaceTable, node: &XMLNode) -> DavResult<()> {
    match node {
        XMLNode::Element(e) => {
            let qname = ns.qualify(&QName::new(e.namespace.clone().unwrap_or_default(), e.name.clone()));
            let mut start = XmlWEvent::start_element(qname.as_str());
            for (k, v) in &e.attributes {
                start = start.attr(k.as_str(), v.as_str());
            }
            xw.write(start)?;
            for child in &e.children {
                write_xmlnode(xw, ns, child)?;
            }
            xw.write(XmlWEvent::end_element())?;
        },
        XMLNode::Text(t) => {
            xw.write(XmlWEvent::characters(t))?;
        },
        XMLNode::CData(t) => {
            xw.write(XmlWEvent::cdata(t))?;
        },
        XMLNode::Comment(_) | XMLNode::ProcessingInstruction(_, _) => {},
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_status_collapses_to_bare_response() {
        let mut ms = MultiStatus::new("/foo");
        ms.add_status("/foo", http::StatusCode::NO_CONTENT);
        let (status, _body) = ms.into_response().unwrap();
        assert_eq!(status, http::StatusCode::NO_CONTENT);
    }

    #[test]
    fn multiple_statuses_render_multistatus() {
        let mut ms = MultiStatus::new("/dir/");
        ms.add_status("/dir/a", http::StatusCode::NO_CONTENT);
        ms.add_status("/dir/b", http::StatusCode::FORBIDDEN);
        let (status, body) = ms.into_response().unwrap();
        assert_eq!(status, http::StatusCode::MULTI_STATUS);
        let bytes = match body.inner {
            crate::body::BodyType::Bytes(Some(b)) => b,
            _ => panic!("expected buffered body"),
        };
        let s = String::from_utf8(bytes.to_vec()).unwrap();
        assert!(s.contains("multistatus"));
        assert!(s.contains("/dir/a"));
        assert!(s.contains("/dir/b"));
        assert!(s.contains("403"));
    }

    #[test]
    fn propstat_groups_by_status_and_registers_namespace() {
        let mut ms = MultiStatus::new("/r");
        ms.add_propstat(
            "/r",
            vec![
                PropResult {
                    name: QName::new(QName::DAV, "displayname"),
                    status: http::StatusCode::OK,
                    value: Some(PropertyValue::text("hi")),
                },
                PropResult {
                    name: QName::new("urn:custom", "widget"),
                    status: http::StatusCode::NOT_FOUND,
                    value: None,
                },
            ],
        );
        let (status, body) = ms.into_response().unwrap();
        assert_eq!(status, http::StatusCode::MULTI_STATUS);
        let bytes = match body.inner {
            crate::body::BodyType::Bytes(Some(b)) => b,
            _ => panic!("expected buffered body"),
        };
        let s = String::from_utf8(bytes.to_vec()).unwrap();
        assert!(s.contains("displayname"));
        assert!(s.contains("a:widget") || s.contains("xmlns:a"));
        assert!(s.contains("404"));
    }

    #[test]
    fn error_condition_renders_inside_response() {
        let mut ms = MultiStatus::new("/a");
        ms.add_status("/a", http::StatusCode::LOCKED);
        ms.add_status_with_error("/b", http::StatusCode::LOCKED, ConditionCode::NoConflictingLock);
        let (_status, body) = ms.into_response().unwrap();
        let bytes = match body.inner {
            crate::body::BodyType::Bytes(Some(b)) => b,
            _ => panic!("expected buffered body"),
        };
        let s = String::from_utf8(bytes.to_vec()).unwrap();
        assert!(s.contains("no-conflicting-lock"));
    }
}
