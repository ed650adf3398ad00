//! C11: depth-bounded resource traversal for PROPFIND, and the
//! recursive walks DELETE/COPY/MOVE need over a collection (RFC 4918
//! §9.6.1/§9.8.3 "act as if a `Depth: infinity` PROPFIND had been
//! submitted").
//!
//! Walks with an explicit work queue rather than recursive calls -
//! `handle_props.rs`'s PROPFIND loop recursed directly on
//! `DavFileSystem::read_dir`, which is fine for a bounded stack but
//! does not bound memory for a pathological collection depth. At each
//! level, children are enqueued in lexicographic order by name: nothing
//! here takes a lock itself, but a caller (DELETE/MOVE) that needs to
//! lock each visited path as it goes relies on that fixed order to
//! avoid two concurrent recursive operations deadlocking by acquiring
//! the same two child locks in opposite order (§5's concurrency model).

use std::collections::VecDeque;

use crate::davheaders::Depth;
use crate::error::DavResult;
use crate::path::DavPath;
use crate::resource::{FsError, Resource, Service};

/// One resource visited by a walk, paired with its path.
pub struct Visited {
    pub path: DavPath,
    pub resource: Box<dyn Resource>,
}

/// Walk `root` according to `depth`, in pre-order (a collection always
/// appears before its children). PROPFIND and COPY use this order
/// directly - COPY needs the destination collection created before its
/// children are copied into it.
pub async fn walk(service: &dyn Service, root: &DavPath, depth: Depth) -> DavResult<Vec<Visited>> {
    let mut out = Vec::new();
    let root_resource = match service.resolve(root).await {
        Some(r) => r,
        None => return Err(crate::error::DavError::Status(http::StatusCode::NOT_FOUND)),
    };
    let root_meta = root_resource.metadata(false).await.map_err(|e| crate::error::DavError::Status(crate::error::fserror_to_status(e)))?;
    let is_collection = root_meta.is_collection;
    out.push(Visited { path: root.clone(), resource: root_resource });

    if depth == Depth::Zero || !is_collection {
        return Ok(out);
    }

    let mut queue: VecDeque<(DavPath, u32)> = VecDeque::new();
    queue.push_back((root.clone(), 0));

    while let Some((path, level)) = queue.pop_front() {
        let resource = match service.resolve(&path).await {
            Some(r) => r,
            None => continue,
        };
        let meta = match resource.metadata(false).await {
            Ok(m) => m,
            Err(_) => continue,
        };
        if !meta.is_collection {
            continue;
        }
        let mut entries = match resource.read_dir().await {
            Ok(e) => e,
            Err(FsError::NotImplemented) | Err(FsError::Forbidden) => continue,
            Err(e) => return Err(crate::error::DavError::Status(crate::error::fserror_to_status(e))),
        };
        entries.sort_by(|a, b| a.name.cmp(&b.name));

        for entry in entries {
            let mut child_path = path.clone();
            child_path.push_segment(&entry.name);
            if entry.metadata.is_collection {
                child_path.add_slash();
            }
            let child_resource = match service.resolve(&child_path).await {
                Some(r) => r,
                None => continue,
            };
            out.push(Visited { path: child_path.clone(), resource: child_resource });
            if depth == Depth::Infinity && entry.metadata.is_collection {
                queue.push_back((child_path, level + 1));
            }
        }
    }

    Ok(out)
}

/// The reverse of [`walk`]'s pre-order: every descendant before its
/// ancestor. DELETE (and MOVE's source-side cleanup) uses this so a
/// collection is only removed once it is already empty.
pub async fn walk_post_order(service: &dyn Service, root: &DavPath, depth: Depth) -> DavResult<Vec<Visited>> {
    let mut v = walk(service, root, depth).await?;
    v.reverse();
    Ok(v)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memfs::MemFs;

    #[tokio::test]
    async fn walk_depth_zero_returns_only_root() {
        let fs = MemFs::new();
        let dir = DavPath::new("/dir/").unwrap();
        fs.make_collection(&dir).await.unwrap();
        let visited = walk(&fs, &dir, Depth::Zero).await.unwrap();
        assert_eq!(visited.len(), 1);
        assert_eq!(visited[0].path, dir);
    }

    #[tokio::test]
    async fn walk_infinity_visits_nested_children_in_order() {
        let fs = MemFs::new();
        let dir = DavPath::new("/dir/").unwrap();
        fs.make_collection(&dir).await.unwrap();
        let sub = DavPath::new("/dir/sub/").unwrap();
        fs.make_collection(&sub).await.unwrap();
        let leaf = DavPath::new("/dir/sub/leaf.txt").unwrap();
        fs.put(&leaf, bytes::Bytes::from_static(b"hi"), None).await.unwrap();
        let a_file = DavPath::new("/dir/a.txt").unwrap();
        fs.put(&a_file, bytes::Bytes::from_static(b"hi"), None).await.unwrap();

        let visited = walk(&fs, &dir, Depth::Infinity).await.unwrap();
        let paths: Vec<String> = visited.iter().map(|v| v.path.as_url_string()).collect();
        assert_eq!(paths[0], dir.as_url_string());
        // lexicographic: a.txt before sub/
        assert!(paths.iter().position(|p| p.ends_with("a.txt")) < paths.iter().position(|p| p.ends_with("sub/")));
        assert!(paths.iter().any(|p| p.ends_with("leaf.txt")));
    }

    #[tokio::test]
    async fn post_order_visits_children_before_parent() {
        let fs = MemFs::new();
        let dir = DavPath::new("/dir/").unwrap();
        fs.make_collection(&dir).await.unwrap();
        let leaf = DavPath::new("/dir/leaf.txt").unwrap();
        fs.put(&leaf, bytes::Bytes::from_static(b"hi"), None).await.unwrap();

        let visited = walk_post_order(&fs, &dir, Depth::Infinity).await.unwrap();
        let leaf_idx = visited.iter().position(|v| v.path.as_url_string().ends_with("leaf.txt")).unwrap();
        let dir_idx = visited.iter().position(|v| v.path == dir).unwrap();
        assert!(leaf_idx < dir_idx);
    }
}
