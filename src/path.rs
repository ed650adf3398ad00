//! Canonical path handling: the slash-delimited, percent-decoded path
//! relative to a service root that every lock and dead-property record
//! is keyed by.

use std::error::Error;
use std::ffi::OsStr;
#[cfg(target_os = "windows")]
use std::ffi::OsString;
#[cfg(target_family = "unix")]
use std::os::unix::ffi::OsStrExt;
use std::path::{Path, PathBuf};

use percent_encoding as pct;

// Encode all non-unreserved characters, except '/'.
// See RFC3986, and https://en.wikipedia.org/wiki/Percent-encoding .
const PATH_ENCODE_SET: &pct::AsciiSet = &pct::NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'~')
    .remove(b'/');

/// A canonical WebDAV path, with an optional hidden service prefix.
///
/// Collections are represented with a trailing slash. Equality ignores
/// a trailing slash, so `/foo == /foo/`.
#[derive(Clone)]
pub struct DavPath {
    fullpath: Vec<u8>,
    pfxlen: Option<usize>,
}

/// A borrowed view of a [`DavPath`] with the prefix stripped off.
pub struct DavPathRef {
    fullpath: [u8],
}

impl std::fmt::Display for DavPath {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "{}", self.as_url_string())
    }
}

impl std::fmt::Debug for DavPath {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "{:?}", self.as_url_string())
    }
}

/// Error returned by the path-parsing methods.
#[derive(Debug)]
pub enum ParseError {
    /// Cannot parse this as a path.
    InvalidPath,
    /// Path is outside of the configured prefix.
    PrefixMismatch,
    /// `..` walked above the service root.
    ForbiddenPath,
}

impl Error for ParseError {}

impl std::fmt::Display for ParseError {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "{:?}", self)
    }
}

// a decoded segment can contain any value except '/' or '\0'
fn valid_segment(src: &[u8]) -> Result<(), ParseError> {
    let mut p = pct::percent_decode(src);
    if p.any(|x| x == 0 || x == b'/') {
        return Err(ParseError::InvalidPath);
    }
    Ok(())
}

fn encode_path(src: &[u8]) -> Vec<u8> {
    pct::percent_encode(src, PATH_ENCODE_SET).to_string().into_bytes()
}

// make path safe:
// - raw path before decoding can contain only printable ascii
// - make sure path is absolute
// - remove query part
// - merge consecutive slashes
// - process . and ..
// - decode percent encoded bytes, fail on invalid encodings
// - do not allow NUL or '/' in decoded segments
fn normalize_path(rp: &[u8]) -> Result<Vec<u8>, ParseError> {
    if rp.iter().any(|&x| x < 32 || x > 126) {
        return Err(ParseError::InvalidPath);
    }

    let mut rawpath = rp;
    if let Some(pos) = rawpath.iter().position(|&x| x == b'?' || x == b'#') {
        if rawpath[pos] == b'#' {
            return Err(ParseError::InvalidPath);
        }
        rawpath = &rawpath[..pos];
    }

    if rawpath.is_empty() || rawpath[0] != b'/' {
        return Err(ParseError::InvalidPath);
    }

    let isdir = matches!(rawpath.last(), Some(b'/'));
    let segments = rawpath.split(|c| *c == b'/');
    let mut v: Vec<&[u8]> = Vec::new();
    for segment in segments {
        match segment {
            b"." | b"" => {},
            b".." => {
                if v.len() < 2 {
                    return Err(ParseError::ForbiddenPath);
                }
                v.pop();
                v.pop();
            },
            s => {
                valid_segment(s)?;
                v.push(b"/");
                v.push(s);
            },
        }
    }
    if isdir || v.is_empty() {
        v.push(b"/");
    }
    Ok(v.iter().flat_map(|s| pct::percent_decode(s)).collect())
}

impl PartialEq for DavPath {
    fn eq(&self, rhs: &DavPath) -> bool {
        let mut a = self.get_path();
        if a.len() > 1 && a.ends_with(b"/") {
            a = &a[..a.len() - 1];
        }
        let mut b = rhs.get_path();
        if b.len() > 1 && b.ends_with(b"/") {
            b = &b[..b.len() - 1];
        }
        a == b
    }
}
impl Eq for DavPath {}

impl std::hash::Hash for DavPath {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        let mut b = self.get_path();
        if b.len() > 1 && b.ends_with(b"/") {
            b = &b[..b.len() - 1];
        }
        b.hash(state);
    }
}

impl DavPath {
    /// Parse a percent-encoded path.
    pub fn new(src: &str) -> Result<DavPath, ParseError> {
        let path = normalize_path(src.as_bytes())?;
        Ok(DavPath { fullpath: path, pfxlen: None })
    }

    /// Strip `prefix` off the front of this path, recording it as the
    /// hidden service prefix.
    pub fn set_prefix(&mut self, prefix: &str) -> Result<(), ParseError> {
        let path = &mut self.fullpath;
        let prefix = prefix.as_bytes();
        if !path.starts_with(prefix) {
            return Err(ParseError::PrefixMismatch);
        }
        let mut pfxlen = prefix.len();
        if prefix.ends_with(b"/") {
            pfxlen -= 1;
            if path[pfxlen] != b'/' {
                return Err(ParseError::PrefixMismatch);
            }
        } else if path.len() == pfxlen {
            path.push(b'/');
        }
        self.pfxlen = Some(pfxlen);
        Ok(())
    }

    /// Parse from a percent-encoded path string and a non-encoded prefix.
    pub fn from_str_and_prefix(src: &str, prefix: &str) -> Result<DavPath, ParseError> {
        let path = normalize_path(src.as_bytes())?;
        let mut davpath = DavPath { fullpath: path, pfxlen: None };
        davpath.set_prefix(prefix)?;
        Ok(davpath)
    }

    /// Parse from a request URI and a non-encoded prefix.
    pub fn from_uri(uri: &http::uri::Uri, prefix: &str) -> Result<Self, ParseError> {
        match uri.path() {
            "*" => Ok(DavPath { fullpath: b"*".to_vec(), pfxlen: None }),
            path if path.starts_with('/') => DavPath::from_str_and_prefix(path, prefix),
            _ => Err(ParseError::InvalidPath),
        }
    }

    /// Add a slash to the end of the path (marking it a collection), if not
    /// already present.
    pub fn add_slash(&mut self) {
        if !self.is_collection() {
            self.fullpath.push(b'/');
        }
    }

    pub fn add_slash_if(&mut self, b: bool) {
        if b {
            self.add_slash();
        }
    }

    /// Append a raw (non-encoded) segment to the end of the path.
    pub fn push_segment(&mut self, b: &[u8]) {
        if !self.is_collection() {
            self.fullpath.push(b'/');
        }
        self.fullpath.extend_from_slice(b);
    }

    fn get_prefix(&self) -> &[u8] {
        &self.fullpath[..self.pfxlen.unwrap_or(0)]
    }

    /// The service prefix this path was parsed with.
    pub fn prefix(&self) -> &str {
        std::str::from_utf8(self.get_prefix()).unwrap_or("")
    }

    /// The parent collection of this path.
    pub fn parent(&self) -> DavPath {
        let mut segs = self
            .fullpath
            .split(|&c| c == b'/')
            .filter(|e| !e.is_empty())
            .collect::<Vec<&[u8]>>();
        segs.pop();
        if !segs.is_empty() {
            segs.push(b"");
        }
        segs.insert(0, b"");
        DavPath {
            pfxlen: self.pfxlen,
            fullpath: segs.join(&b'/').to_vec(),
        }
    }

    /// As a URL-encoded string, including the service prefix.
    pub fn as_url_string_with_prefix(&self) -> String {
        String::from_utf8(encode_path(&self.fullpath)).unwrap()
    }
}

impl std::ops::Deref for DavPath {
    type Target = DavPathRef;

    fn deref(&self) -> &DavPathRef {
        let pfxlen = self.pfxlen.unwrap_or(0);
        DavPathRef::new(&self.fullpath[pfxlen..])
    }
}

impl DavPathRef {
    fn new(path: &[u8]) -> &DavPathRef {
        unsafe { &*(path as *const [u8] as *const DavPathRef) }
    }

    /// The raw, decoded path bytes (no prefix).
    pub fn as_bytes(&self) -> &[u8] {
        self.get_path()
    }

    /// As an OS path. Never ends in a slash.
    pub fn as_pathbuf(&self) -> PathBuf {
        let mut b = self.get_path();
        if b.len() > 1 && b.ends_with(b"/") {
            b = &b[..b.len() - 1];
        }
        #[cfg(not(target_os = "windows"))]
        let os_string = OsStr::from_bytes(b).to_owned();
        #[cfg(target_os = "windows")]
        let os_string = OsString::from(String::from_utf8(b.to_vec()).unwrap());
        PathBuf::from(os_string)
    }

    /// As a URL-encoded string, without the service prefix.
    pub fn as_url_string(&self) -> String {
        String::from_utf8(encode_path(self.get_path())).unwrap()
    }

    /// Is this a collection, i.e. does it end in `/`.
    pub fn is_collection(&self) -> bool {
        self.get_path().ends_with(b"/")
    }

    fn get_path(&self) -> &[u8] {
        &self.fullpath
    }

    pub(crate) fn is_star(&self) -> bool {
        self.get_path() == b"*"
    }

    /// As a relative OS path (leading slash stripped), for `push()`ing onto
    /// a `PathBuf`.
    pub fn as_rel_ospath(&self) -> &Path {
        let spath = self.get_path();
        let mut path = if !spath.is_empty() { &spath[1..] } else { spath };
        if path.ends_with(b"/") {
            path = &path[..path.len() - 1];
        }
        #[cfg(not(target_os = "windows"))]
        let os_string = OsStr::from_bytes(path);
        #[cfg(target_os = "windows")]
        let os_string: &OsStr = std::str::from_utf8(path).unwrap().as_ref();
        Path::new(os_string)
    }

    /// The last segment of the path. Empty for the root.
    pub fn file_name_bytes(&self) -> &[u8] {
        let segs = self
            .get_path()
            .split(|&c| c == b'/')
            .filter(|e| !e.is_empty())
            .collect::<Vec<&[u8]>>();
        segs.last().copied().unwrap_or(b"")
    }

    pub fn file_name(&self) -> Option<&str> {
        let name = self.file_name_bytes();
        if name.is_empty() {
            None
        } else {
            std::str::from_utf8(name).ok()
        }
    }

    /// Whether `other` is a strict descendant of this collection (used to
    /// reject a COPY/MOVE that would nest the destination inside the
    /// source, or vice versa).
    pub fn is_strict_prefix_of(&self, other: &DavPathRef) -> bool {
        let mut p = self.get_path();
        if !p.ends_with(b"/") {
            return false;
        }
        if p == b"/" {
            p = b"";
        }
        let o = other.get_path();
        o.len() > p.len() && o.starts_with(p)
    }

    pub(crate) fn get_mime_type_str(&self) -> &'static str {
        let name = self.file_name_bytes();
        let d = name.rsplitn(2, |&c| c == b'.').collect::<Vec<&[u8]>>();
        if d.len() > 1 {
            if let Ok(ext) = std::str::from_utf8(d[0]) {
                if let Some(t) = mime_guess::from_ext(ext).first_raw() {
                    return t;
                }
            }
        }
        "application/octet-stream"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalizes_dotdot() {
        let p = DavPath::new("/a/b/../c").unwrap();
        assert_eq!(p.as_url_string_with_prefix(), "/a/c");
    }

    #[test]
    fn rejects_dotdot_above_root() {
        assert!(DavPath::new("/a/../../b").is_err());
    }

    #[test]
    fn trailing_slash_means_collection() {
        let p = DavPath::new("/a/b/").unwrap();
        assert!(p.is_collection());
    }

    #[test]
    fn equality_ignores_trailing_slash() {
        assert_eq!(DavPath::new("/a/b").unwrap(), DavPath::new("/a/b/").unwrap());
    }

    #[test]
    fn prefix_is_stripped() {
        let p = DavPath::from_str_and_prefix("/dav/a/b", "/dav").unwrap();
        assert_eq!(p.as_bytes(), b"/a/b");
        assert_eq!(p.prefix(), "/dav");
    }
}
