//! The error currency of the engine: every fallible internal operation
//! returns a `DavError`, which knows how to turn itself into an HTTP
//! status code and, where applicable, a WebDAV `ConditionCode`.

use http::StatusCode;

/// A WebDAV condition-code element, carried as the child of `<D:error>`
/// in an error response body (RFC 4918 §16).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConditionCode {
    LockTokenSubmitted,
    LockTokenMatchesRequestUri,
    NoConflictingLock,
    CannotModifyProtectedProperty,
    PropfindFiniteDepth,
    NoExternalEntities,
    PreservedLiveProperties,
}

impl ConditionCode {
    /// The `DAV:` element name this code is rendered as.
    pub fn element_name(&self) -> &'static str {
        match self {
            ConditionCode::LockTokenSubmitted => "lock-token-submitted",
            ConditionCode::LockTokenMatchesRequestUri => "lock-token-matches-request-uri",
            ConditionCode::NoConflictingLock => "no-conflicting-lock",
            ConditionCode::CannotModifyProtectedProperty => "cannot-modify-protected-property",
            ConditionCode::PropfindFiniteDepth => "propfind-finite-depth",
            ConditionCode::NoExternalEntities => "no-external-entities",
            ConditionCode::PreservedLiveProperties => "preserved-live-properties",
        }
    }
}

/// Error type for every fallible operation in the engine.
#[derive(Debug)]
pub enum DavError {
    XmlReadError,
    XmlParseError,
    InvalidPath,
    IllegalPath,
    ForbiddenPath,
    UnknownDavMethod,
    IoError(std::io::Error),
    XmlReaderError(xml::reader::Error),
    XmlWriterError(xml::writer::Error),
    /// A plain HTTP status with no further WebDAV semantics.
    Status(StatusCode),
    /// An HTTP status carrying a `DAV:error` condition-code element, and
    /// optionally the href the condition applies to (used to fill in
    /// `lock-token-submitted`/`no-conflicting-lock` bodies).
    Condition(StatusCode, ConditionCode),
    /// Same as `Status`, but the connection must be closed afterwards
    /// (used for cases where we can no longer trust the position in the
    /// request stream, e.g. a body that was only partially read).
    StatusClose(StatusCode),
}

impl std::error::Error for DavError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            DavError::IoError(e) => Some(e),
            DavError::XmlReaderError(e) => Some(e),
            DavError::XmlWriterError(e) => Some(e),
            _ => None,
        }
    }
}

impl std::fmt::Display for DavError {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            DavError::XmlReaderError(_) => write!(f, "XML parse error"),
            DavError::XmlWriterError(_) => write!(f, "XML generate error"),
            DavError::IoError(_) => write!(f, "I/O error"),
            DavError::Condition(status, code) => write!(f, "{} ({})", status, code.element_name()),
            _ => write!(f, "{:?}", self),
        }
    }
}

impl From<std::io::Error> for DavError {
    fn from(e: std::io::Error) -> Self {
        DavError::IoError(e)
    }
}

impl From<xml::reader::Error> for DavError {
    fn from(e: xml::reader::Error) -> Self {
        DavError::XmlReaderError(e)
    }
}

impl From<xml::writer::Error> for DavError {
    fn from(e: xml::writer::Error) -> Self {
        DavError::XmlWriterError(e)
    }
}

impl From<StatusCode> for DavError {
    fn from(s: StatusCode) -> Self {
        DavError::Status(s)
    }
}

impl From<crate::path::ParseError> for DavError {
    fn from(e: crate::path::ParseError) -> Self {
        match e {
            crate::path::ParseError::InvalidPath => DavError::InvalidPath,
            crate::path::ParseError::PrefixMismatch => DavError::IllegalPath,
            crate::path::ParseError::ForbiddenPath => DavError::ForbiddenPath,
        }
    }
}

/// Translate a backing-store error into an HTTP status, matching the
/// taxonomy of RFC 4918-observed failure modes.
pub fn fserror_to_status(e: crate::resource::FsError) -> StatusCode {
    use crate::resource::FsError::*;
    match e {
        NotImplemented => StatusCode::NOT_IMPLEMENTED,
        GeneralFailure => StatusCode::INTERNAL_SERVER_ERROR,
        Exists => StatusCode::METHOD_NOT_ALLOWED,
        NotFound => StatusCode::NOT_FOUND,
        Forbidden => StatusCode::FORBIDDEN,
        InsufficientStorage => StatusCode::INSUFFICIENT_STORAGE,
        LoopDetected => StatusCode::LOOP_DETECTED,
        PathTooLong => StatusCode::URI_TOO_LONG,
        TooLarge => StatusCode::PAYLOAD_TOO_LARGE,
        IsRemote => StatusCode::BAD_GATEWAY,
        RangeNotSatisfiable => StatusCode::RANGE_NOT_SATISFIABLE,
    }
}

fn ioerror_to_status(e: &std::io::Error) -> StatusCode {
    match e.kind() {
        std::io::ErrorKind::NotFound => StatusCode::NOT_FOUND,
        std::io::ErrorKind::PermissionDenied => StatusCode::FORBIDDEN,
        std::io::ErrorKind::AlreadyExists => StatusCode::CONFLICT,
        std::io::ErrorKind::TimedOut => StatusCode::GATEWAY_TIMEOUT,
        _ => StatusCode::BAD_GATEWAY,
    }
}

impl DavError {
    /// The HTTP status this error maps onto.
    pub fn statuscode(&self) -> StatusCode {
        match self {
            DavError::XmlReadError => StatusCode::BAD_REQUEST,
            DavError::XmlParseError => StatusCode::BAD_REQUEST,
            DavError::InvalidPath => StatusCode::BAD_REQUEST,
            DavError::IllegalPath => StatusCode::BAD_GATEWAY,
            DavError::ForbiddenPath => StatusCode::FORBIDDEN,
            DavError::UnknownDavMethod => StatusCode::NOT_IMPLEMENTED,
            DavError::IoError(e) => ioerror_to_status(e),
            DavError::Status(s) => *s,
            DavError::Condition(s, _) => *s,
            DavError::StatusClose(s) => *s,
            DavError::XmlReaderError(_) => StatusCode::BAD_REQUEST,
            DavError::XmlWriterError(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// The condition-code element to embed in the `<D:error>` body, if any.
    pub fn condition_code(&self) -> Option<ConditionCode> {
        match self {
            DavError::Condition(_, c) => Some(*c),
            _ => None,
        }
    }

    pub fn must_close(&self) -> bool {
        matches!(self, DavError::StatusClose(_))
    }
}

pub type DavResult<T> = Result<T, DavError>;
