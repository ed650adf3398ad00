//! Shared `<D:activelock>`/`<D:lockdiscovery>`/`<D:supportedlock>`
//! element construction, used both by LOCK's response body and by
//! PROPFIND's synthesis of those two live properties. Grounded on
//! `handle_lock.rs` (`build_lock_prop`, `list_lockdiscovery`,
//! `list_supportedlock`).

use xmltree::{Element, XMLNode};

use crate::lock::{ActiveLock, LockScope};
use crate::xmlvalue::{PropertyValue, QName};

fn dav_elem(name: &str) -> Element {
    let mut e = Element::new(name);
    e.namespace = Some(QName::DAV.to_string());
    e
}

fn dav_elem_text(name: &str, text: impl Into<String>) -> Element {
    let mut e = dav_elem(name);
    e.children.push(XMLNode::Text(text.into()));
    e
}

/// `<D:activelock>` for one lock. Mirrors the distinction between a
/// lock's own `lockdiscovery` entry (always full) and a reused helper -
/// kept here for parity even though this engine's two callers both want
/// the full element.
pub(crate) fn activelock_element(lock: &ActiveLock) -> Element {
    let mut actlock = dav_elem("activelock");

    let mut scope = dav_elem("lockscope");
    scope.children.push(XMLNode::Element(dav_elem(match lock.scope {
        LockScope::Exclusive => "exclusive",
        LockScope::Shared => "shared",
    })));
    actlock.children.push(XMLNode::Element(scope));

    let mut locktype = dav_elem("locktype");
    locktype.children.push(XMLNode::Element(dav_elem("write")));
    actlock.children.push(XMLNode::Element(locktype));

    actlock.children.push(XMLNode::Element(dav_elem_text("depth", if lock.deep { "infinity" } else { "0" })));

    let timeout_text = match lock.timeout {
        None => "Infinite".to_string(),
        Some(d) => format!("Second-{}", d.as_secs()),
    };
    actlock.children.push(XMLNode::Element(dav_elem_text("timeout", timeout_text)));

    let mut locktoken = dav_elem("locktoken");
    locktoken.children.push(XMLNode::Element(dav_elem_text("href", lock.token.clone())));
    actlock.children.push(XMLNode::Element(locktoken));

    let mut lockroot = dav_elem("lockroot");
    lockroot.children.push(XMLNode::Element(dav_elem_text("href", lock.root.as_url_string_with_prefix())));
    actlock.children.push(XMLNode::Element(lockroot));

    if let Some(owner) = &lock.owner_xml {
        actlock.children.push(XMLNode::Element(owner.clone()));
    }

    actlock
}

/// `DAV:lockdiscovery` live property value: one `activelock` per lock
/// covering the resource (empty if unlocked).
pub(crate) fn lockdiscovery_value(locks: &[ActiveLock]) -> PropertyValue {
    PropertyValue::xml(locks.iter().map(|l| XMLNode::Element(activelock_element(l))).collect())
}

/// `DAV:supportedlock` live property value: this engine always offers
/// both exclusive and shared write locks (§4.1's L1/L2), so the value
/// is fixed rather than derived from a particular resource.
pub(crate) fn supportedlock_value() -> PropertyValue {
    let entry = |scope_name: &str| {
        let mut entry = dav_elem("lockentry");
        let mut scope = dav_elem("lockscope");
        scope.children.push(XMLNode::Element(dav_elem(scope_name)));
        entry.children.push(XMLNode::Element(scope));
        let mut locktype = dav_elem("locktype");
        locktype.children.push(XMLNode::Element(dav_elem("write")));
        entry.children.push(XMLNode::Element(locktype));
        entry
    };
    PropertyValue::xml(vec![XMLNode::Element(entry("exclusive")), XMLNode::Element(entry("shared"))])
}

/// Render a standalone LOCK response body: `<D:prop><D:lockdiscovery>`
/// wrapping one `activelock`.
pub(crate) fn render_lock_response(lock: &ActiveLock) -> crate::body::Body {
    use xml::common::XmlVersion;
    use xml::writer::{EmitterConfig, EventWriter, XmlEvent};

    let mut buf: Vec<u8> = Vec::new();
    {
        let mut xw = EventWriter::new_with_config(&mut buf, EmitterConfig { perform_indent: true, ..EmitterConfig::default() });
        let _ = xw.write(XmlEvent::StartDocument { version: XmlVersion::Version10, encoding: Some("utf-8"), standalone: None });
        let _ = xw.write(XmlEvent::start_element("prop").ns("D", "DAV:"));
        let _ = xw.write(XmlEvent::start_element("D:lockdiscovery"));
        write_element(&mut xw, &activelock_element(lock));
        let _ = xw.write(XmlEvent::end_element());
        let _ = xw.write(XmlEvent::end_element());
    }
    crate::body::Body::from(bytes::Bytes::from(buf))
}

fn write_element<W: std::io::Write>(xw: &mut xml::writer::EventWriter<W>, elem: &Element) {
    use xml::writer::XmlEvent;
    let name = match &elem.namespace {
        Some(ns) if ns == QName::DAV => format!("D:{}", elem.name),
        _ => elem.name.clone(),
    };
    let _ = xw.write(XmlEvent::start_element(name.as_str()));
    for child in &elem.children {
        match child {
            XMLNode::Element(e) => write_element(xw, e),
            XMLNode::Text(t) => {
                let _ = xw.write(XmlEvent::characters(t));
            },
            _ => {},
        }
    }
    let _ = xw.write(XmlEvent::end_element());
}
