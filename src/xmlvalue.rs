//! C1: the XML value codec.
//!
//! Properties (both live and dead) are carried internally as a small
//! typed enum instead of an opaque `xml: Option<Vec<u8>>` blob, so a
//! `PropertyStore` (propstore.rs) can reason about a property's
//! shape (is it a date? a flag? free-form markup?) without re-parsing XML.
//! Values that don't fit a scalar XSD type fall back to `Xml`, carrying the
//! child nodes verbatim - this is how e.g. `DAV:resourcetype`'s
//! `<D:collection/>` marker, or any client-defined structured property,
//! round-trips without loss.
//!
//! Every decoded value also carries the wire metadata the data model in
//! spec §3 calls for alongside the value itself: `xml:lang`, a preserved
//! `xsi:type` annotation (if the client sent one - this engine never
//! invents one of its own), and any other attribute the element carried.
//! `encode_into`/`multistatus.rs` reapply all three verbatim on output.

use std::io::Cursor;
use std::time::{Duration, SystemTime};

use xmltree::{Element, XMLNode};

use crate::error::{DavError, DavResult};
use crate::etag::{httpdate_to_systemtime, systemtime_to_httpdate, systemtime_to_rfc3339};

/// A namespace-qualified element name, e.g. `{DAV:}displayname`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct QName {
    pub namespace: String,
    pub local: String,
}

impl QName {
    pub fn new(namespace: impl Into<String>, local: impl Into<String>) -> QName {
        QName { namespace: namespace.into(), local: local.into() }
    }

    pub const DAV: &'static str = "DAV:";
}

impl std::fmt::Display for QName {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "{{{}}}{}", self.namespace, self.local)
    }
}

/// How a [`PropertyData::Bytes`] value is rendered on the wire - the two
/// binary lexical forms XSD defines (`xs:base64Binary`/`xs:hexBinary`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BytesEncoding {
    Base64,
    Hex,
}

/// The typed content of a property, independent of its `xml:lang`/
/// `xsi:type`/attribute wrapping (see [`PropertyValue`]).
#[derive(Debug, Clone, PartialEq)]
pub enum PropertyData {
    /// `xsd:string`, and the default for any property with plain text
    /// content and no recognized type.
    Text(String),
    /// `xsd:boolean`. Encoded as `"1"`/`"0"` on the wire, matching the
    /// convention the Apache namespace's `executable` property uses
    /// (`"T"`/`"F"` on input, `"1"`/`"0"` is also accepted).
    Boolean(bool),
    /// `xsd:byte`.
    Int8(i8),
    /// `xsd:short`.
    Int16(i16),
    /// `xsd:int`.
    Int32(i32),
    /// `xsd:long` / `xsd:integer`.
    Int64(i64),
    /// `xsd:unsignedByte`.
    UInt8(u8),
    /// `xsd:unsignedShort`.
    UInt16(u16),
    /// `xsd:unsignedInt`.
    UInt32(u32),
    /// `xsd:unsignedLong`.
    UInt64(u64),
    /// `xsd:decimal`. Kept as its original lexical string rather than a
    /// float, since decimal's whole point is exactness a binary float
    /// can't promise.
    Decimal(String),
    /// `xsd:double`.
    Double(f64),
    /// `xsd:float`.
    Float(f32),
    /// `xsd:dateTime`, RFC 3339 on the wire (`creationdate`).
    DateTime(SystemTime),
    /// RFC 7231 `HTTP-date`, as used by `getlastmodified`. Kept distinct
    /// from `DateTime` because the wire formats differ and a store must
    /// not silently reformat one as the other.
    HttpDate(SystemTime),
    /// `xsd:date` (`YYYY-MM-DD`, no time-of-day). Stored as midnight UTC.
    Date(SystemTime),
    /// `xsd:duration` (`PnYnMnDTnHnMnS`), used by lock timeouts when they
    /// are exposed as a property rather than a header.
    Duration(Duration),
    /// `xsd:anyURI`.
    Uri(String),
    /// `xsd:base64Binary` / `xsd:hexBinary`.
    Bytes(Vec<u8>, BytesEncoding),
    /// A bare element name used as a value, e.g. the members of
    /// `DAV:resourcetype`.
    QNameValue(QName),
    /// No content (a marker property, e.g. an empty `<D:collection/>`).
    Empty,
    /// Arbitrary child markup, preserved byte-for-byte in structure.
    /// Used for anything the codec doesn't have a typed case for.
    Xml(Vec<XMLNode>),
}

impl PropertyData {
    /// This variant's lexical wire text, for the variants that are
    /// rendered as plain character content. `None` for the three
    /// variants ([`PropertyData::Empty`], [`PropertyData::QNameValue`],
    /// [`PropertyData::Xml`]) that aren't - those need their own element
    /// structure, not a text node.
    pub(crate) fn wire_text(&self) -> Option<String> {
        match self {
            PropertyData::Text(s) => Some(s.clone()),
            PropertyData::Boolean(b) => Some(if *b { "1" } else { "0" }.to_string()),
            PropertyData::Int8(i) => Some(i.to_string()),
            PropertyData::Int16(i) => Some(i.to_string()),
            PropertyData::Int32(i) => Some(i.to_string()),
            PropertyData::Int64(i) => Some(i.to_string()),
            PropertyData::UInt8(i) => Some(i.to_string()),
            PropertyData::UInt16(i) => Some(i.to_string()),
            PropertyData::UInt32(i) => Some(i.to_string()),
            PropertyData::UInt64(i) => Some(i.to_string()),
            PropertyData::Decimal(s) => Some(s.clone()),
            PropertyData::Double(d) => Some(d.to_string()),
            PropertyData::Float(f) => Some(f.to_string()),
            PropertyData::DateTime(t) => Some(systemtime_to_rfc3339(*t)),
            PropertyData::HttpDate(t) => Some(systemtime_to_httpdate(*t)),
            PropertyData::Date(t) => Some(encode_date(*t)),
            PropertyData::Duration(d) => Some(encode_duration(*d)),
            PropertyData::Uri(s) => Some(s.clone()),
            PropertyData::Bytes(b, BytesEncoding::Base64) => Some(base64_encode(b)),
            PropertyData::Bytes(b, BytesEncoding::Hex) => Some(hex_encode(b)),
            PropertyData::QNameValue(_) | PropertyData::Empty | PropertyData::Xml(_) => None,
        }
    }
}

/// A property value: its typed content plus the `(type?, language?)` wire
/// metadata spec §3's data model calls for. `attributes` is a catch-all
/// for anything else the source element carried (xmltree's attribute map
/// has no namespace information of its own, so these are kept as the
/// plain local attribute names the parser gave us).
#[derive(Debug, Clone, PartialEq)]
pub struct PropertyValue {
    pub data: PropertyData,
    /// The `xml:lang` in effect for this element, if the source XML set
    /// or inherited one directly on it.
    pub language: Option<String>,
    /// The literal `xsi:type` attribute value (e.g. `"xs:int"`), kept
    /// verbatim rather than re-derived from `data`'s variant - this
    /// engine never invents an `xsi:type` a client didn't send.
    pub xsi_type: Option<String>,
    /// Any other attribute on the source element, `(name, value)`.
    pub attributes: Vec<(String, String)>,
}

impl PropertyValue {
    fn new(data: PropertyData) -> PropertyValue {
        PropertyValue { data, language: None, xsi_type: None, attributes: Vec::new() }
    }

    pub fn text(s: impl Into<String>) -> PropertyValue {
        PropertyValue::new(PropertyData::Text(s.into()))
    }

    pub fn boolean(b: bool) -> PropertyValue {
        PropertyValue::new(PropertyData::Boolean(b))
    }

    pub fn int(i: i64) -> PropertyValue {
        PropertyValue::new(PropertyData::Int64(i))
    }

    pub fn datetime(t: SystemTime) -> PropertyValue {
        PropertyValue::new(PropertyData::DateTime(t))
    }

    pub fn http_date(t: SystemTime) -> PropertyValue {
        PropertyValue::new(PropertyData::HttpDate(t))
    }

    pub fn duration(d: Duration) -> PropertyValue {
        PropertyValue::new(PropertyData::Duration(d))
    }

    pub fn uri(s: impl Into<String>) -> PropertyValue {
        PropertyValue::new(PropertyData::Uri(s.into()))
    }

    pub fn qname(q: QName) -> PropertyValue {
        PropertyValue::new(PropertyData::QNameValue(q))
    }

    pub fn empty() -> PropertyValue {
        PropertyValue::new(PropertyData::Empty)
    }

    pub fn xml(nodes: Vec<XMLNode>) -> PropertyValue {
        PropertyValue::new(PropertyData::Xml(nodes))
    }

    /// Attach an `xml:lang`, builder-style.
    pub fn with_language(mut self, lang: impl Into<String>) -> PropertyValue {
        self.language = Some(lang.into());
        self
    }

    pub fn is_empty(&self) -> bool {
        matches!(self.data, PropertyData::Empty)
    }

    /// Apply this value's `xml:lang`/`xsi:type`/other attributes onto
    /// `elem`, then its content - text for scalar variants, a QName child
    /// for [`PropertyData::QNameValue`], nothing for
    /// [`PropertyData::Empty`], and verbatim children for
    /// [`PropertyData::Xml`].
    pub fn encode_into(&self, elem: &mut Element) {
        if let Some(lang) = &self.language {
            elem.attributes.insert("lang".to_string(), lang.clone());
        }
        if let Some(t) = &self.xsi_type {
            elem.attributes.insert("type".to_string(), t.clone());
        }
        for (k, v) in &self.attributes {
            elem.attributes.insert(k.clone(), v.clone());
        }
        match &self.data {
            PropertyData::QNameValue(q) => {
                let mut child = Element::new(&q.local);
                child.namespace = Some(q.namespace.clone());
                elem.children.push(XMLNode::Element(child));
            },
            PropertyData::Empty => {},
            PropertyData::Xml(nodes) => elem.children.extend(nodes.iter().cloned()),
            other => {
                if let Some(text) = other.wire_text() {
                    elem.children.push(XMLNode::Text(text));
                }
            },
        }
    }

    /// Build a standalone element named `name` with this value's content.
    pub fn to_element(&self, name: &QName) -> Element {
        let mut elem = Element::new(&name.local);
        elem.namespace = Some(name.namespace.clone());
        self.encode_into(&mut elem);
        elem
    }

    /// Recover a typed value (plus its `xml:lang`/`xsi:type`/attributes)
    /// from an element's content, given a hint of the XSD type expected.
    /// `None` first tries the element's own `xsi:type` attribute (a
    /// self-describing property sent by a client), then falls back to
    /// whatever shape the content happens to have: empty, a single
    /// element child, or text.
    pub fn decode(elem: &Element, hint: Option<XsdType>) -> PropertyValue {
        let language = elem.attributes.get("lang").cloned();
        let xsi_type = elem.attributes.get("type").cloned();
        let attributes: Vec<(String, String)> = elem
            .attributes
            .iter()
            .filter(|(k, _)| k.as_str() != "lang" && k.as_str() != "type")
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();

        let effective_hint =
            hint.or_else(|| xsi_type.as_deref().and_then(xsd_type_from_qname_text));
        let data = decode_data(elem, effective_hint);

        PropertyValue { data, language, xsi_type, attributes }
    }
}

/// Map an `xsi:type` attribute's text (e.g. `"xs:int"`, `"xsd:dateTime"`)
/// onto the [`XsdType`] it names, ignoring whatever namespace prefix the
/// client used - this engine doesn't resolve the prefix against the
/// element's in-scope namespaces, just the local name after the last `:`.
fn xsd_type_from_qname_text(text: &str) -> Option<XsdType> {
    let local = text.rsplit(':').next().unwrap_or(text);
    Some(match local {
        "string" => XsdType::String,
        "boolean" => XsdType::Boolean,
        "byte" => XsdType::Int8,
        "short" => XsdType::Int16,
        "int" => XsdType::Int32,
        "long" | "integer" => XsdType::Int64,
        "unsignedByte" => XsdType::UInt8,
        "unsignedShort" => XsdType::UInt16,
        "unsignedInt" => XsdType::UInt32,
        "unsignedLong" => XsdType::UInt64,
        "decimal" => XsdType::Decimal,
        "double" => XsdType::Double,
        "float" => XsdType::Float,
        "dateTime" => XsdType::DateTime,
        "date" => XsdType::Date,
        "duration" => XsdType::Duration,
        "anyURI" => XsdType::Uri,
        "base64Binary" => XsdType::Base64Binary,
        "hexBinary" => XsdType::HexBinary,
        _ => return None,
    })
}

fn parse_num<T: std::str::FromStr>(elem: &Element) -> Option<T> {
    elem.get_text()?.trim().parse::<T>().ok()
}

fn text_fallback(elem: &Element) -> PropertyData {
    PropertyData::Text(elem.get_text().unwrap_or_default().into_owned())
}

fn decode_data(elem: &Element, hint: Option<XsdType>) -> PropertyData {
    match hint {
        Some(XsdType::Boolean) => PropertyData::Boolean(matches!(
            elem.get_text().as_deref().map(str::trim),
            Some("1") | Some("T") | Some("true")
        )),
        Some(XsdType::Int8) => parse_num(elem).map(PropertyData::Int8).unwrap_or_else(|| text_fallback(elem)),
        Some(XsdType::Int16) => parse_num(elem).map(PropertyData::Int16).unwrap_or_else(|| text_fallback(elem)),
        Some(XsdType::Int32) => parse_num(elem).map(PropertyData::Int32).unwrap_or_else(|| text_fallback(elem)),
        Some(XsdType::Int64) => parse_num(elem).map(PropertyData::Int64).unwrap_or_else(|| text_fallback(elem)),
        Some(XsdType::UInt8) => parse_num(elem).map(PropertyData::UInt8).unwrap_or_else(|| text_fallback(elem)),
        Some(XsdType::UInt16) => parse_num(elem).map(PropertyData::UInt16).unwrap_or_else(|| text_fallback(elem)),
        Some(XsdType::UInt32) => parse_num(elem).map(PropertyData::UInt32).unwrap_or_else(|| text_fallback(elem)),
        Some(XsdType::UInt64) => parse_num(elem).map(PropertyData::UInt64).unwrap_or_else(|| text_fallback(elem)),
        Some(XsdType::Decimal) => elem
            .get_text()
            .map(|t| PropertyData::Decimal(t.trim().to_string()))
            .unwrap_or(PropertyData::Empty),
        Some(XsdType::Double) => {
            parse_num(elem).map(PropertyData::Double).unwrap_or_else(|| text_fallback(elem))
        },
        Some(XsdType::Float) => {
            parse_num(elem).map(PropertyData::Float).unwrap_or_else(|| text_fallback(elem))
        },
        Some(XsdType::DateTime) => elem
            .get_text()
            .and_then(|t| chrono::DateTime::parse_from_rfc3339(t.trim()).ok())
            .map(|t| PropertyData::DateTime(t.into()))
            .unwrap_or(PropertyData::Empty),
        Some(XsdType::HttpDate) => elem
            .get_text()
            .and_then(|t| httpdate_to_systemtime(t.trim()))
            .map(PropertyData::HttpDate)
            .unwrap_or(PropertyData::Empty),
        Some(XsdType::Date) => elem
            .get_text()
            .and_then(|t| decode_date(t.trim()))
            .map(PropertyData::Date)
            .unwrap_or(PropertyData::Empty),
        Some(XsdType::Duration) => elem
            .get_text()
            .and_then(|t| decode_duration(t.trim()))
            .map(PropertyData::Duration)
            .unwrap_or(PropertyData::Empty),
        Some(XsdType::Uri) => {
            elem.get_text().map(|t| PropertyData::Uri(t.trim().to_string())).unwrap_or(PropertyData::Empty)
        },
        Some(XsdType::Base64Binary) => elem
            .get_text()
            .and_then(|t| base64_decode(t.trim()))
            .map(|b| PropertyData::Bytes(b, BytesEncoding::Base64))
            .unwrap_or(PropertyData::Empty),
        Some(XsdType::HexBinary) => elem
            .get_text()
            .and_then(|t| hex_decode(t.trim()))
            .map(|b| PropertyData::Bytes(b, BytesEncoding::Hex))
            .unwrap_or(PropertyData::Empty),
        Some(XsdType::String) | None => {
            let child = elem.children.iter().find_map(|n| match n {
                XMLNode::Element(e) => Some(e),
                _ => None,
            });
            match child {
                None if elem.children.is_empty() => PropertyData::Empty,
                Some(child) if elem.get_text().is_none() => PropertyData::QNameValue(QName::new(
                    child.namespace.clone().unwrap_or_default(),
                    child.name.clone(),
                )),
                Some(_) => PropertyData::Xml(elem.children.clone()),
                None => PropertyData::Text(elem.get_text().unwrap_or_default().into_owned()),
            }
        },
    }
}

/// XSD scalar type hints a `PropertyStore` attaches to a known property
/// name (or an `xsi:type` attribute names directly) so the codec picks
/// the right wire representation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum XsdType {
    String,
    Boolean,
    Int8,
    Int16,
    Int32,
    Int64,
    UInt8,
    UInt16,
    UInt32,
    UInt64,
    Decimal,
    Double,
    Float,
    DateTime,
    HttpDate,
    Date,
    Duration,
    Uri,
    Base64Binary,
    HexBinary,
}

/// Encode a `Duration` as an `xsd:duration` lexical form, always in the
/// `PTnHnMnS` shape (no years/months/days - nothing in this engine needs
/// calendar-length durations, only lock timeouts and cache lifetimes).
fn encode_duration(d: Duration) -> String {
    let secs = d.as_secs();
    let (h, rem) = (secs / 3600, secs % 3600);
    let (m, s) = (rem / 60, rem % 60);
    format!("PT{}H{}M{}S", h, m, s)
}

fn decode_duration(s: &str) -> Option<Duration> {
    let s = s.strip_prefix('P')?;
    let (_date_part, time_part) = match s.split_once('T') {
        Some((d, t)) => (d, t),
        None => (s, ""),
    };
    let mut secs: u64 = 0;
    let mut num = String::new();
    for c in time_part.chars() {
        match c {
            '0'..='9' => num.push(c),
            'H' => {
                secs += num.parse::<u64>().ok()? * 3600;
                num.clear();
            },
            'M' => {
                secs += num.parse::<u64>().ok()? * 60;
                num.clear();
            },
            'S' => {
                secs += num.parse::<u64>().ok()?;
                num.clear();
            },
            _ => return None,
        }
    }
    Some(Duration::from_secs(secs))
}

fn decode_date(s: &str) -> Option<SystemTime> {
    let date = chrono::NaiveDate::parse_from_str(s, "%Y-%m-%d").ok()?;
    let naive = date.and_hms_opt(0, 0, 0)?;
    Some(naive.and_utc().into())
}

fn encode_date(t: SystemTime) -> String {
    let dt: chrono::DateTime<chrono::Utc> = t.into();
    dt.format("%Y-%m-%d").to_string()
}

const B64_ALPHABET: &[u8; 64] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789+/";

/// RFC 4648 base64 encode - no external crate depends on one, and
/// `xsd:base64Binary` is the only place this codec needs it.
fn base64_encode(data: &[u8]) -> String {
    let mut out = String::with_capacity((data.len() + 2) / 3 * 4);
    for chunk in data.chunks(3) {
        let b0 = chunk[0];
        let b1 = chunk.get(1).copied();
        let b2 = chunk.get(2).copied();
        out.push(B64_ALPHABET[(b0 >> 2) as usize] as char);
        out.push(B64_ALPHABET[(((b0 & 0x03) << 4) | (b1.unwrap_or(0) >> 4)) as usize] as char);
        out.push(match b1 {
            Some(b1) => B64_ALPHABET[(((b1 & 0x0f) << 2) | (b2.unwrap_or(0) >> 6)) as usize] as char,
            None => '=',
        });
        out.push(match b2 {
            Some(b2) => B64_ALPHABET[(b2 & 0x3f) as usize] as char,
            None => '=',
        });
    }
    out
}

fn base64_val(c: u8) -> Option<u8> {
    match c {
        b'A'..=b'Z' => Some(c - b'A'),
        b'a'..=b'z' => Some(c - b'a' + 26),
        b'0'..=b'9' => Some(c - b'0' + 52),
        b'+' => Some(62),
        b'/' => Some(63),
        _ => None,
    }
}

fn base64_decode(s: &str) -> Option<Vec<u8>> {
    let bytes: Vec<u8> = s.bytes().filter(|b| !b.is_ascii_whitespace()).collect();
    if bytes.is_empty() || bytes.len() % 4 != 0 {
        return None;
    }
    let mut out = Vec::with_capacity(bytes.len() / 4 * 3);
    for chunk in bytes.chunks(4) {
        let mut vals = [0u8; 4];
        let mut pad = 0u8;
        for (i, &b) in chunk.iter().enumerate() {
            if b == b'=' {
                pad += 1;
            } else {
                vals[i] = base64_val(b)?;
            }
        }
        let n = (vals[0] as u32) << 18 | (vals[1] as u32) << 12 | (vals[2] as u32) << 6 | (vals[3] as u32);
        let (b0, b1, b2) = ((n >> 16) as u8, (n >> 8) as u8, n as u8);
        match pad {
            0 => out.extend_from_slice(&[b0, b1, b2]),
            1 => out.extend_from_slice(&[b0, b1]),
            2 => out.extend_from_slice(&[b0]),
            _ => return None,
        }
    }
    Some(out)
}

fn hex_encode(data: &[u8]) -> String {
    data.iter().map(|b| format!("{:02x}", b)).collect()
}

fn hex_decode(s: &str) -> Option<Vec<u8>> {
    if s.len() % 2 != 0 {
        return None;
    }
    (0..s.len())
        .step_by(2)
        .map(|i| u8::from_str_radix(&s[i..i + 2], 16).ok())
        .collect()
}

/// Parse a buffer of request-body bytes as an XML element tree, mapping
/// parse failures onto the engine's error currency.
pub fn parse_xml(data: &[u8]) -> DavResult<Element> {
    Element::parse(Cursor::new(data)).map_err(|e| match e {
        xmltree::ParseError::MalformedXml(_) => DavError::XmlParseError,
        _ => DavError::XmlReadError,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn duration_roundtrip() {
        let d = Duration::from_secs(3725);
        let s = encode_duration(d);
        assert_eq!(s, "PT1H2M5S");
        assert_eq!(decode_duration(&s), Some(d));
    }

    #[test]
    fn qname_display() {
        let q = QName::new("DAV:", "displayname");
        assert_eq!(q.to_string(), "{DAV:}displayname");
    }

    #[test]
    fn decode_int() {
        let mut e = Element::new("quota-used-bytes");
        e.children.push(XMLNode::Text("42".into()));
        assert_eq!(PropertyValue::decode(&e, Some(XsdType::Int64)).data, PropertyData::Int64(42));
    }

    #[test]
    fn decode_resourcetype_collection() {
        let mut e = Element::new("resourcetype");
        let mut coll = Element::new("collection");
        coll.namespace = Some("DAV:".into());
        e.children.push(XMLNode::Element(coll));
        match PropertyValue::decode(&e, None).data {
            PropertyData::QNameValue(q) => assert_eq!(q.local, "collection"),
            other => panic!("expected QNameValue, got {:?}", other),
        }
    }

    #[test]
    fn decode_empty() {
        let e = Element::new("resourcetype");
        assert_eq!(PropertyValue::decode(&e, None).data, PropertyData::Empty);
    }

    #[test]
    fn decode_preserves_lang_and_xsi_type() {
        let mut e = Element::new("comment");
        e.attributes.insert("lang".to_string(), "fr".to_string());
        e.attributes.insert("type".to_string(), "xs:string".to_string());
        e.children.push(XMLNode::Text("bonjour".into()));
        let v = PropertyValue::decode(&e, None);
        assert_eq!(v.language.as_deref(), Some("fr"));
        assert_eq!(v.xsi_type.as_deref(), Some("xs:string"));
        assert_eq!(v.data, PropertyData::Text("bonjour".into()));
    }

    #[test]
    fn xsi_type_attribute_selects_scalar_type() {
        let mut e = Element::new("count");
        e.attributes.insert("type".to_string(), "xs:int".to_string());
        e.children.push(XMLNode::Text("7".into()));
        assert_eq!(PropertyValue::decode(&e, None).data, PropertyData::Int32(7));
    }

    #[test]
    fn lang_and_attrs_round_trip_through_encode() {
        let value = PropertyValue::text("hi").with_language("en");
        let mut elem = Element::new("displayname");
        value.encode_into(&mut elem);
        assert_eq!(elem.attributes.get("lang"), Some(&"en".to_string()));
        assert_eq!(elem.get_text().as_deref(), Some("hi"));
    }

    #[test]
    fn base64_roundtrip() {
        let data = b"hello world!!";
        let s = base64_encode(data);
        assert_eq!(base64_decode(&s).unwrap(), data);
    }

    #[test]
    fn base64_decode_known_vector() {
        assert_eq!(base64_decode("aGVsbG8=").unwrap(), b"hello");
    }

    #[test]
    fn hex_roundtrip() {
        let data = b"\x00\x01\xfe\xff";
        let s = hex_encode(data);
        assert_eq!(s, "0001feff");
        assert_eq!(hex_decode(&s).unwrap(), data);
    }

    #[test]
    fn decode_date_and_decimal() {
        let mut e = Element::new("d");
        e.children.push(XMLNode::Text("2024-03-05".into()));
        let v = decode_data(&e, Some(XsdType::Date));
        assert_eq!(v, PropertyData::Date(decode_date("2024-03-05").unwrap()));

        let mut e2 = Element::new("amount");
        e2.children.push(XMLNode::Text("19.99".into()));
        assert_eq!(decode_data(&e2, Some(XsdType::Decimal)), PropertyData::Decimal("19.99".to_string()));
    }
}
