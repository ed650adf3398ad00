//! Small shared bits that don't belong to any one `C`-numbered module:
//! the `DavMethod`/`DavMethodSet` bitflags `handler.rs` uses to build an
//! allowed-methods policy and the `Allow` header, and an `<D:error>`
//! body wrapper for the small number of error paths that want a fixed
//! string rather than going through `multistatus.rs`. Kept mostly
//! unchanged; the old `time`-crate date helpers are dropped as redundant
//! with `etag.rs`'s `chrono`-based ones, since `time` was never made a
//! direct dependency of this crate.

use http::method::InvalidMethod;

use crate::body::Body;
use crate::error::DavError;
use crate::error::DavResult;

/// HTTP/WebDAV methods this engine knows how to dispatch.
#[derive(Debug, PartialEq, Eq, Hash, Clone, Copy)]
#[repr(u32)]
pub enum DavMethod {
    Head = 0x0001,
    Get = 0x0002,
    Put = 0x0004,
    Patch = 0x0008,
    Options = 0x0010,
    PropFind = 0x0020,
    PropPatch = 0x0040,
    MkCol = 0x0080,
    Copy = 0x0100,
    Move = 0x0200,
    Delete = 0x0400,
    Lock = 0x0800,
    Unlock = 0x1000,
}

pub(crate) fn dav_method(m: &http::Method) -> DavResult<DavMethod> {
    let m = match *m {
        http::Method::HEAD => DavMethod::Head,
        http::Method::GET => DavMethod::Get,
        http::Method::PUT => DavMethod::Put,
        http::Method::PATCH => DavMethod::Patch,
        http::Method::DELETE => DavMethod::Delete,
        http::Method::OPTIONS => DavMethod::Options,
        _ => match m.as_str() {
            "PROPFIND" => DavMethod::PropFind,
            "PROPPATCH" => DavMethod::PropPatch,
            "MKCOL" => DavMethod::MkCol,
            "COPY" => DavMethod::Copy,
            "MOVE" => DavMethod::Move,
            "LOCK" => DavMethod::Lock,
            "UNLOCK" => DavMethod::Unlock,
            _ => return Err(DavError::UnknownDavMethod),
        },
    };
    Ok(m)
}

impl std::convert::TryFrom<&http::Method> for DavMethod {
    type Error = InvalidMethod;

    fn try_from(value: &http::Method) -> Result<Self, Self::Error> {
        dav_method(value).map_err(|_| http::method::Method::from_bytes(b"").unwrap_err())
    }
}

/// A set of allowed [`DavMethod`]s, used both to police incoming
/// requests and to render the `Allow:` header on `OPTIONS`/405.
#[derive(Clone, Copy, Debug)]
pub struct DavMethodSet(u32);

impl DavMethodSet {
    pub const HTTP_RO: DavMethodSet =
        DavMethodSet(DavMethod::Get as u32 | DavMethod::Head as u32 | DavMethod::Options as u32);
    pub const HTTP_RW: DavMethodSet = DavMethodSet(Self::HTTP_RO.0 | DavMethod::Put as u32);
    pub const WEBDAV_RO: DavMethodSet = DavMethodSet(Self::HTTP_RO.0 | DavMethod::PropFind as u32);
    pub const WEBDAV_RW: DavMethodSet = DavMethodSet(0xffff_ffff);

    pub fn all() -> DavMethodSet {
        DavMethodSet(0xffff_ffff)
    }

    pub fn none() -> DavMethodSet {
        DavMethodSet(0)
    }

    pub fn add(&mut self, m: DavMethod) -> &Self {
        self.0 |= m as u32;
        self
    }

    pub fn remove(&mut self, m: DavMethod) -> &Self {
        self.0 &= !(m as u32);
        self
    }

    pub fn contains(&self, m: DavMethod) -> bool {
        self.0 & (m as u32) > 0
    }

    pub fn from_vec(v: Vec<impl AsRef<str>>) -> Result<DavMethodSet, InvalidMethod> {
        let mut m: u32 = 0;
        for w in &v {
            m |= match w.as_ref().to_lowercase().as_str() {
                "head" => DavMethod::Head as u32,
                "get" => DavMethod::Get as u32,
                "put" => DavMethod::Put as u32,
                "patch" => DavMethod::Patch as u32,
                "delete" => DavMethod::Delete as u32,
                "options" => DavMethod::Options as u32,
                "propfind" => DavMethod::PropFind as u32,
                "proppatch" => DavMethod::PropPatch as u32,
                "mkcol" => DavMethod::MkCol as u32,
                "copy" => DavMethod::Copy as u32,
                "move" => DavMethod::Move as u32,
                "lock" => DavMethod::Lock as u32,
                "unlock" => DavMethod::Unlock as u32,
                "http-ro" => Self::HTTP_RO.0,
                "http-rw" => Self::HTTP_RW.0,
                "webdav-ro" => Self::WEBDAV_RO.0,
                "webdav-rw" => Self::WEBDAV_RW.0,
                _ => return Err(http::method::Method::from_bytes(b"").unwrap_err()),
            };
        }
        Ok(DavMethodSet(m))
    }

    /// The `Allow:` header value for this set.
    pub fn as_allow_header(&self) -> String {
        let all = [
            (DavMethod::Options, "OPTIONS"),
            (DavMethod::Get, "GET"),
            (DavMethod::Head, "HEAD"),
            (DavMethod::Put, "PUT"),
            (DavMethod::Patch, "PATCH"),
            (DavMethod::Delete, "DELETE"),
            (DavMethod::PropFind, "PROPFIND"),
            (DavMethod::PropPatch, "PROPPATCH"),
            (DavMethod::MkCol, "MKCOL"),
            (DavMethod::Copy, "COPY"),
            (DavMethod::Move, "MOVE"),
            (DavMethod::Lock, "LOCK"),
            (DavMethod::Unlock, "UNLOCK"),
        ];
        all.iter().filter(|(m, _)| self.contains(*m)).map(|(_, s)| *s).collect::<Vec<_>>().join(", ")
    }
}

/// Wrap `body` (a `<DAV:...-error/>` fragment) in a `<D:error>` document,
/// for the error paths that render a fixed body rather than building one
/// through `multistatus.rs`.
pub(crate) fn dav_xml_error(body: &str) -> Body {
    let xml = format!(
        "{}\n{}\n{}\n{}\n",
        r#"<?xml version="1.0" encoding="utf-8" ?>"#,
        r#"<D:error xmlns:D="DAV:">"#,
        body,
        r#"</D:error>"#
    );
    Body::from(xml)
}
