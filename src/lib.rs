//! A pluggable WebDAV (RFC 4918) request-processing engine.
//!
//! This crate implements the protocol machinery of WebDAV - the lock
//! subsystem, conditional-request evaluation, multi-status rendering,
//! the property engine, partial-content handling, and the per-method
//! request processors - without committing to any particular HTTP
//! server, authentication scheme, or backing store. A host wires up a
//! [`Service`] (typically backed by a real filesystem, a database, or
//! an in-memory tree) and gets a [`DavHandler`] that turns HTTP
//! requests into WebDAV responses.
//!
//! Explicitly out of scope: the HTTP server/router a host runs this
//! behind, authentication, and any concrete filesystem/zip/database
//! backing service beyond the [`memfs::MemFs`] reference
//! implementation used by this crate's own tests.
//!
//! ```no_run
//! use std::sync::Arc;
//! use dav_engine::{DavHandler, memfs::MemFs};
//!
//! let handler = DavHandler::builder()
//!     .service(Arc::new(MemFs::new()))
//!     .build_handler();
//! ```

mod async_stream;
mod body;
mod davheaders;
mod error;
mod etag;
mod handler;
mod ifheader;
mod lock;
mod methods;
mod multistatus;
mod path;
mod precondition;
mod propstore;
mod range;
mod resource;
mod traversal;
mod tree;
mod util;
mod xmlvalue;

pub mod memfs;

pub use body::Body;
pub use error::{ConditionCode, DavError, DavResult};
pub use etag::ETag;
pub use handler::{DavConfig, DavHandler};
pub use lock::{ActiveLock, AcquireError, LockManager, LockScope, LockSelection, MemLockManager};
pub use path::{DavPath, DavPathRef};
pub use propstore::{MemPropStore, PropertyPatch, PropertyRecord, PropertyStore};
pub use resource::{
    AccessKind, AuthorizationFilter, DirEntry, EntityMetadata, FsError, FsResult, PutRange, Resource, Service,
};
pub use util::{DavMethod, DavMethodSet};
pub use xmlvalue::{BytesEncoding, PropertyData, PropertyValue, QName, XsdType};
