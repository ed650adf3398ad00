//! A reference in-memory `Service`, used by the engine's own test suite
//! and as a starting point for a host that has no real filesystem to
//! back a collection with. Generalizes a prior `memfs.rs` (which stored
//! nodes directly in an `Arc<Mutex<HashMap<...>>>` keyed by the full
//! `WebPath`) onto the shared [`crate::tree::Tree`] that the lock
//! manager already uses, so a directory rename is a single `move_node`
//! instead of a scan over every stored key with that prefix.

use std::sync::Mutex;
use std::time::SystemTime;

use async_trait::async_trait;
use bytes::Bytes;

use crate::lock::{LockManager, MemLockManager};
use crate::path::DavPath;
use crate::propstore::{MemPropStore, PropertyStore};
use crate::resource::{AccessKind, DirEntry, EntityMetadata, FsError, FsResult, PutRange, Resource, Service};
use crate::tree::{Tree, TreeError, ROOT_ID};
use crate::xmlvalue::{PropertyValue, QName};

struct MemNode {
    is_collection: bool,
    content: Bytes,
    media_type: Option<String>,
    created: SystemTime,
    last_modified: SystemTime,
}

impl MemNode {
    fn new_collection() -> MemNode {
        let now = SystemTime::now();
        MemNode { is_collection: true, content: Bytes::new(), media_type: None, created: now, last_modified: now }
    }

    fn new_file(content: Bytes, media_type: Option<String>) -> MemNode {
        let now = SystemTime::now();
        MemNode { is_collection: false, content, media_type, created: now, last_modified: now }
    }

    fn metadata(&self) -> EntityMetadata {
        EntityMetadata {
            len: self.content.len() as u64,
            media_type: self.media_type.clone(),
            last_modified: Some(self.last_modified),
            created: Some(self.created),
            etag: Some(crate::etag::ETag::from_parts(self.content.len() as u64, Some(self.last_modified))),
            is_collection: self.is_collection,
        }
    }
}

fn path_segs(path: &DavPath) -> Vec<&[u8]> {
    path.as_bytes().split(|&c| c == b'/').filter(|s| !s.is_empty()).collect()
}

/// A full in-memory `Service`: content, collections, locks and dead
/// properties are all held in memory and lost on restart.
pub struct MemFs {
    tree: Mutex<Tree<Vec<u8>, MemNode>>,
    locks: MemLockManager,
    props: MemPropStore,
}

impl MemFs {
    pub fn new() -> MemFs {
        MemFs { tree: Mutex::new(Tree::new(MemNode::new_collection())), locks: MemLockManager::new(), props: MemPropStore::new() }
    }

    fn lookup(&self, path: &DavPath) -> Option<u64> {
        let tree = self.tree.lock().unwrap();
        let mut id = ROOT_ID;
        for seg in path_segs(path) {
            id = tree.get_child(id, seg).ok()?;
        }
        Some(id)
    }
}

impl Default for MemFs {
    fn default() -> MemFs {
        MemFs::new()
    }
}

struct MemResource {
    path: DavPath,
    meta: EntityMetadata,
    content: Bytes,
    children: Vec<DirEntry>,
}

#[async_trait]
impl Resource for MemResource {
    fn canonical_path(&self) -> DavPath {
        self.path.clone()
    }

    async fn metadata(&self, _include_etag: bool) -> FsResult<EntityMetadata> {
        Ok(self.meta.clone())
    }

    async fn read_range(&self, start: u64, len: u64) -> FsResult<Bytes> {
        let start = start as usize;
        let end = (start + len as usize).min(self.content.len());
        if start > self.content.len() {
            return Err(FsError::GeneralFailure);
        }
        Ok(self.content.slice(start..end))
    }

    async fn read_dir(&self) -> FsResult<Vec<DirEntry>> {
        if !self.meta.is_collection {
            return Err(FsError::GeneralFailure);
        }
        Ok(self.children.clone())
    }

    async fn live_properties(&self, _include_expensive: bool) -> Vec<(QName, PropertyValue)> {
        Vec::new()
    }

    async fn should_deny_access(&self, _kind: AccessKind) -> Option<http::StatusCode> {
        None
    }
}

#[async_trait]
impl Service for MemFs {
    async fn resolve(&self, path: &DavPath) -> Option<Box<dyn Resource>> {
        let id = self.lookup(path)?;
        let (meta, content, children) = {
            let tree = self.tree.lock().unwrap();
            let node = tree.get_node(id).ok()?;
            let meta = node.metadata();
            let content = node.content.clone();
            let children = if meta.is_collection {
                tree.get_children(id)
                    .ok()?
                    .filter_map(|(name, child_id)| tree.get_node(child_id).ok().map(|n| DirEntry { name, metadata: n.metadata() }))
                    .collect()
            } else {
                Vec::new()
            };
            (meta, content, children)
        };
        Some(Box::new(MemResource { path: path.clone(), meta, content, children }))
    }

    fn lock_manager(&self) -> &dyn LockManager {
        &self.locks
    }

    fn property_store(&self) -> &dyn PropertyStore {
        &self.props
    }

    async fn make_collection(&self, path: &DavPath) -> FsResult<()> {
        let segs = path_segs(path);
        if segs.is_empty() {
            return Err(FsError::Exists);
        }
        let mut tree = self.tree.lock().unwrap();
        let mut id = ROOT_ID;
        for seg in &segs[..segs.len() - 1] {
            id = tree.get_child(id, *seg).map_err(|_| FsError::Forbidden)?;
        }
        let parent = tree.get_node(id).map_err(|_| FsError::NotFound)?;
        if !parent.is_collection {
            return Err(FsError::Forbidden);
        }
        tree.add_child(id, segs[segs.len() - 1].to_vec(), MemNode::new_collection(), false).map_err(|e| match e {
            TreeError::Exists => FsError::Exists,
            _ => FsError::Forbidden,
        })?;
        Ok(())
    }

    async fn create_empty(&self, path: &DavPath) -> FsResult<()> {
        self.put(path, Bytes::new(), None).await.map(|_| ())
    }

    async fn put(&self, path: &DavPath, content: Bytes, range: Option<PutRange>) -> FsResult<EntityMetadata> {
        let segs = path_segs(path);
        if segs.is_empty() {
            return Err(FsError::Forbidden);
        }
        let mut tree = self.tree.lock().unwrap();
        let mut id = ROOT_ID;
        for seg in &segs[..segs.len() - 1] {
            id = tree.get_child(id, *seg).map_err(|_| FsError::NotFound)?;
        }
        let last = segs[segs.len() - 1].to_vec();
        let existing = tree.get_child(id, last.as_slice()).ok();

        let new_content = match (existing, range) {
            (Some(node_id), Some(r)) => {
                let node = tree.get_node(node_id).map_err(|_| FsError::NotFound)?;
                if node.is_collection {
                    return Err(FsError::Forbidden);
                }
                let mut buf = node.content.to_vec();
                let end = r.end as usize + 1;
                if buf.len() < end {
                    buf.resize(end, 0);
                }
                buf[r.start as usize..end].copy_from_slice(&content);
                // A declared total (the `T` in `bytes A-B/T`) that differs
                // from the natural splice length grows or shrinks the
                // resource to match it (§4.5).
                if let Some(total) = r.total {
                    buf.resize(total as usize, 0);
                }
                Bytes::from(buf)
            },
            (None, Some(r)) => {
                // A write starting past the (empty) beginning of a
                // resource that doesn't exist yet has nothing to splice
                // into.
                if r.start > 0 {
                    return Err(FsError::RangeNotSatisfiable);
                }
                let end = r.end as usize + 1;
                let mut buf = vec![0u8; end];
                buf[r.start as usize..end].copy_from_slice(&content);
                if let Some(total) = r.total {
                    buf.resize(total as usize, 0);
                }
                Bytes::from(buf)
            },
            (_, None) => content,
        };

        let media_type = Some(path.get_mime_type_str().to_string());
        match existing {
            Some(node_id) => {
                let node = tree.get_node_mut(node_id).map_err(|_| FsError::NotFound)?;
                if node.is_collection {
                    return Err(FsError::Forbidden);
                }
                node.content = new_content;
                node.last_modified = SystemTime::now();
                Ok(node.metadata())
            },
            None => {
                let node = MemNode::new_file(new_content, media_type);
                let meta = node.metadata();
                tree.add_child(id, last, node, false).map_err(|_| FsError::Forbidden)?;
                Ok(meta)
            },
        }
    }

    async fn delete(&self, path: &DavPath) -> FsResult<()> {
        let segs = path_segs(path);
        if segs.is_empty() {
            return Err(FsError::Forbidden);
        }
        let mut tree = self.tree.lock().unwrap();
        let mut id = ROOT_ID;
        for seg in &segs[..segs.len() - 1] {
            id = tree.get_child(id, *seg).map_err(|_| FsError::NotFound)?;
        }
        let target = tree.get_child(id, segs[segs.len() - 1]).map_err(|_| FsError::NotFound)?;
        tree.delete_node(target).map_err(|e| match e {
            TreeError::NotEmpty => FsError::GeneralFailure,
            _ => FsError::NotFound,
        })
    }

    async fn copy_one(&self, source: &dyn Resource, dest: &DavPath) -> FsResult<()> {
        let meta = source.metadata(false).await?;
        if meta.is_collection {
            return self.make_collection(dest).await.or(Ok(()));
        }
        let content = source.read_range(0, meta.len).await?;
        self.put(dest, content, None).await.map(|_| ())
    }

    async fn quota(&self, _path: &DavPath) -> Option<(u64, Option<u64>)> {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn put_then_get_roundtrips() {
        let fs = MemFs::new();
        let p = DavPath::new("/a.txt").unwrap();
        fs.put(&p, Bytes::from_static(b"hello"), None).await.unwrap();
        let r = fs.resolve(&p).await.unwrap();
        let meta = r.metadata(false).await.unwrap();
        assert_eq!(meta.len, 5);
        let data = r.read_range(0, 5).await.unwrap();
        assert_eq!(data, Bytes::from_static(b"hello"));
    }

    #[tokio::test]
    async fn make_collection_then_child_put() {
        let fs = MemFs::new();
        let dir = DavPath::new("/dir/").unwrap();
        fs.make_collection(&dir).await.unwrap();
        let f = DavPath::new("/dir/a.txt").unwrap();
        fs.put(&f, Bytes::from_static(b"x"), None).await.unwrap();
        assert!(fs.resolve(&f).await.is_some());
    }

    #[tokio::test]
    async fn delete_nonempty_collection_fails() {
        let fs = MemFs::new();
        let dir = DavPath::new("/dir/").unwrap();
        fs.make_collection(&dir).await.unwrap();
        let f = DavPath::new("/dir/a.txt").unwrap();
        fs.put(&f, Bytes::from_static(b"x"), None).await.unwrap();
        assert!(fs.delete(&dir).await.is_err());
    }

    #[tokio::test]
    async fn partial_put_splices_into_existing_content() {
        let fs = MemFs::new();
        let p = DavPath::new("/a.txt").unwrap();
        fs.put(&p, Bytes::from_static(b"0123456789"), None).await.unwrap();
        fs.put(&p, Bytes::from_static(b"XX"), Some(PutRange { start: 2, end: 3, total: Some(10) })).await.unwrap();
        let r = fs.resolve(&p).await.unwrap();
        let data = r.read_range(0, 10).await.unwrap();
        assert_eq!(data, Bytes::from_static(b"01XX456789"));
    }

    #[tokio::test]
    async fn partial_put_total_shrinks_resource() {
        let fs = MemFs::new();
        let p = DavPath::new("/a.txt").unwrap();
        fs.put(&p, Bytes::from_static(b"0123456789"), None).await.unwrap();
        fs.put(&p, Bytes::from_static(b"XX"), Some(PutRange { start: 2, end: 3, total: Some(4) })).await.unwrap();
        let r = fs.resolve(&p).await.unwrap();
        let meta = r.metadata(false).await.unwrap();
        assert_eq!(meta.len, 4);
        let data = r.read_range(0, 4).await.unwrap();
        assert_eq!(data, Bytes::from_static(b"01XX"));
    }

    #[tokio::test]
    async fn partial_put_out_of_range_start_on_missing_resource_fails() {
        let fs = MemFs::new();
        let p = DavPath::new("/new.txt").unwrap();
        let err = fs.put(&p, Bytes::from_static(b"XX"), Some(PutRange { start: 5, end: 6, total: Some(7) })).await.unwrap_err();
        assert_eq!(err, FsError::RangeNotSatisfiable);
    }
}
