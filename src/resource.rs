//! The capability surface external collaborators implement: `Resource`
//! and `Service` (§6), generalizing the `DavFileSystem`/
//! `DavFile`/`DavMetaData`/`DavDirEntry` quartet (`fs.rs`) into async
//! traits. The backing filesystem/zip/database behind a `Service` is
//! explicitly out of scope for this engine - only the seam is defined
//! here. `MemFs` (`memfs.rs`) is the in-memory reference implementation
//! used by the engine's own test suite.

use std::fmt::Debug;
use std::time::SystemTime;

use async_trait::async_trait;
use bytes::Bytes;
use http::StatusCode;

use crate::etag::ETag;
use crate::lock::LockManager;
use crate::path::{DavPath, DavPathRef};
use crate::propstore::PropertyStore;
use crate::xmlvalue::{PropertyValue, QName};

/// Failure modes a backing store can report, translated to an HTTP
/// status by [`crate::error::fserror_to_status`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FsError {
    NotImplemented,
    GeneralFailure,
    Exists,
    NotFound,
    Forbidden,
    InsufficientStorage,
    LoopDetected,
    PathTooLong,
    TooLarge,
    IsRemote,
    RangeNotSatisfiable,
}

pub type FsResult<T> = Result<T, FsError>;

/// The entity metadata a `Resource` reports for GET/HEAD and conditional
/// checks (§3's "Entity metadata").
#[derive(Debug, Clone, Default)]
pub struct EntityMetadata {
    pub len: u64,
    pub media_type: Option<String>,
    pub last_modified: Option<SystemTime>,
    pub created: Option<SystemTime>,
    /// Only computed when the caller asks for it (`include_etag`) -
    /// some backing stores (a remote object store, say) might have to
    /// do extra work to produce a strong tag.
    pub etag: Option<ETag>,
    pub is_collection: bool,
}

impl EntityMetadata {
    pub fn collection() -> EntityMetadata {
        EntityMetadata { is_collection: true, ..Default::default() }
    }
}

/// What kind of access is being attempted, for an
/// [`AuthorizationFilter`]/[`Resource::should_deny_access`] check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessKind {
    Read,
    Write,
    ReadProps,
    WriteProps,
    Delete,
}

/// One entry returned by [`Resource::read_dir`].
#[derive(Debug, Clone)]
pub struct DirEntry {
    pub name: Vec<u8>,
    pub metadata: EntityMetadata,
}

/// A single addressable resource: a file or a collection. The `Service`
/// hands these out from `resolve`; the method processors (`methods/*`)
/// never touch the backing store directly.
#[async_trait]
pub trait Resource: Send + Sync {
    fn canonical_path(&self) -> DavPath;

    async fn metadata(&self, include_etag: bool) -> FsResult<EntityMetadata>;

    /// Read `len` bytes starting at `start`. Used for both whole-body
    /// GET (`start=0, len=metadata.len`) and partial GET (§4.5).
    async fn read_range(&self, start: u64, len: u64) -> FsResult<Bytes>;

    /// List immediate children. Only called on collections.
    async fn read_dir(&self) -> FsResult<Vec<DirEntry>>;

    /// The live properties this resource computes from its own state
    /// (as opposed to the dead properties a `PropertyStore` holds).
    /// "Cheap" properties are always returned; "expensive" ones
    /// (e.g. quota) are behind a flag so `allprop` can skip them per
    /// §4.4's PROPFIND rule.
    async fn live_properties(&self, include_expensive: bool) -> Vec<(QName, PropertyValue)>;

    /// Per-resource access policy hook (§6's `should_deny_access`);
    /// consulted by the precondition engine after the service-level
    /// `AuthorizationFilter` chain. Default: never deny.
    async fn should_deny_access(&self, _kind: AccessKind) -> Option<StatusCode> {
        None
    }
}

/// An ordered chain of access filters a host installs; each may deny a
/// request outright (§6's "Authorization filter chain").
#[async_trait]
pub trait AuthorizationFilter: Send + Sync + Debug {
    async fn check(&self, user: Option<&str>, path: &DavPathRef, kind: AccessKind) -> Option<StatusCode>;
}

/// Byte range targeted by a partial PUT (`Content-Range: bytes A-B/T`,
/// §4.5). `total` is `None` when the client sent `*`.
#[derive(Debug, Clone, Copy)]
pub struct PutRange {
    pub start: u64,
    pub end: u64,
    pub total: Option<u64>,
}

/// The service backing a URL hierarchy: resolves paths to `Resource`s
/// and performs the mutations that do not belong on a single resource
/// (creating one, deleting one, copying content between two). This is
/// the generalization of `DavFileSystem`'s write-side methods
/// (`create_dir`/`remove_file`/`remove_dir`/`rename`/`copy`) plus the
/// unmapped-URL hooks `davhandler.rs` calls out to.
#[async_trait]
pub trait Service: Send + Sync {
    async fn resolve(&self, path: &DavPath) -> Option<Box<dyn Resource>>;

    fn lock_manager(&self) -> &dyn LockManager;
    fn property_store(&self) -> &dyn PropertyStore;

    /// Verbs this service permits beyond the baseline every `Service`
    /// supports (`OPTIONS`, `PROPFIND` when mapped). Used to build
    /// `Allow` on an unmapped URL (§6).
    fn supports_locking(&self) -> bool {
        true
    }

    fn is_writable(&self) -> bool {
        true
    }

    async fn make_collection(&self, path: &DavPath) -> FsResult<()>;

    /// Create an empty zero-byte resource (used by LOCK on an unmapped
    /// URL, §4.4's "Create" flow).
    async fn create_empty(&self, path: &DavPath) -> FsResult<()>;

    /// Write `content` to `path`, creating it if necessary. `range`
    /// splices instead of replacing (partial PUT, §4.5).
    async fn put(&self, path: &DavPath, content: Bytes, range: Option<PutRange>) -> FsResult<EntityMetadata>;

    /// Delete exactly this path (not recursive - callers needing
    /// recursion use `traversal.rs` to walk first).
    async fn delete(&self, path: &DavPath) -> FsResult<()>;

    /// Copy a single resource's content (and, for a collection, create
    /// the empty destination collection) from `source` to `dest`.
    /// Dead properties are copied by the caller via `PropertyStore`.
    async fn copy_one(&self, source: &dyn Resource, dest: &DavPath) -> FsResult<()>;

    /// Quota, if this service tracks it (RFC 4331, an optional live
    /// property).
    async fn quota(&self, _path: &DavPath) -> Option<(u64, Option<u64>)> {
        None
    }
}
