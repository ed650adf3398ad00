//! C4: the lock manager. A hierarchical, shared/exclusive, timeout-bound
//! lock table with token discipline, generalizing the `DavLockSystem`/
//! `MemLs` pattern (ls.rs, memls.rs) onto the `Tree` in tree.rs and an
//! explicit async trait so a non-in-memory implementation (e.g. a lock
//! table backed by a shared database) is a first-class citizen, not an
//! afterthought bolted onto a `Box<dyn ... + Clone>`.

use std::sync::Mutex;
use std::time::{Duration, SystemTime};

use async_trait::async_trait;
use uuid::Uuid;
use xmltree::Element;

use crate::path::DavPath;
use crate::tree::{Tree, ROOT_ID};

/// Shared locks permit any number of holders on the same protection set;
/// exclusive locks permit exactly one, with no other lock whatsoever
/// (L1 in the data model).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockScope {
    Shared,
    Exclusive,
}

/// What to gather relative to a path when listing locks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockSelection {
    /// Just the exact path.
    SelfOnly,
    /// The path and every ancestor collection (for `lockdiscovery` on a
    /// single resource - a lock on an ancestor still covers it).
    SelfAndAncestors,
    /// The path and every descendant (for recursive write checks).
    SelfAndDescendants,
    /// Ancestors and descendants both (for `DELETE`/`MOVE` of a subtree).
    SelfAncestorsDescendants,
}

/// A lock currently held on some resource (`ActiveLock` in the data
/// model). `deep` replaces the spec's `depth ∈ {0, ∞}` with a bool, since
/// those are the only two legal lock depths.
#[derive(Debug, Clone)]
pub struct ActiveLock {
    pub token: String,
    pub root: DavPath,
    pub scope: LockScope,
    pub deep: bool,
    pub owner_id: Option<String>,
    pub owner_xml: Option<Element>,
    pub timeout: Option<Duration>,
    pub timeout_at: Option<SystemTime>,
    pub created_at: SystemTime,
}

impl ActiveLock {
    /// Whether this lock has passed its `timeout_at`, and should now be
    /// treated as absent (expiry is checked lazily on access, per §4.1).
    pub fn is_expired(&self) -> bool {
        matches!(self.timeout_at, Some(t) if SystemTime::now() > t)
    }
}

/// Why an `acquire` failed to find a free spot.
#[derive(Debug)]
pub enum AcquireError {
    /// One or more existing locks conflict; these are returned so the
    /// caller can build the `DAV:no-conflicting-lock` body.
    Conflict(Vec<ActiveLock>),
    /// `max_locks_per_url` was exceeded for the requested root.
    PerUrlLimitExceeded,
    /// The service-wide `max_locks` was exceeded.
    GlobalLimitExceeded,
}

/// The lock manager capability surface (§4.1, §6).
#[async_trait]
pub trait LockManager: Send + Sync {
    /// Create a new lock, honoring L1-L3. `owner_id` is the opaque
    /// current-user id (or `None` for anonymous); `owner_xml` is the
    /// client-supplied `DAV:owner` element, preserved verbatim.
    async fn acquire(
        &self,
        root: &DavPath,
        scope: LockScope,
        deep: bool,
        owner_id: Option<&str>,
        owner_xml: Option<Element>,
        timeout: Option<Duration>,
    ) -> Result<ActiveLock, AcquireError>;

    /// Extend a lock's expiry. Does not change scope/depth/root. Token
    /// possession (checked by the caller via the `If` header) is the
    /// only ownership proof this layer requires.
    async fn refresh(&self, token: &str, timeout: Option<Duration>) -> Option<ActiveLock>;

    /// Remove a lock by token.
    async fn release(&self, token: &str) -> Result<(), ()>;

    /// List locks relevant to `path` under the given selection.
    async fn get_locks(&self, path: &DavPath, selection: LockSelection) -> Vec<ActiveLock>;

    /// Remove every lock rooted at or below `path` (DELETE, MOVE source,
    /// destination overwrite of a collection).
    async fn remove_recursive(&self, path: &DavPath);

    /// Remove only a lock rooted exactly at `path`, if not deep (used
    /// when a single resource, not a collection, is replaced).
    async fn remove_nonrecursive(&self, path: &DavPath);

    /// Check whether a write to `path` (optionally recursive, for
    /// depth-infinity operations) is blocked by any lock not covered by
    /// `submitted_tokens`. Returns the first conflicting lock.
    async fn check(
        &self,
        path: &DavPath,
        owner_id: Option<&str>,
        deep: bool,
        submitted_tokens: &[&str],
    ) -> Result<(), ActiveLock>;

    /// Locks that would conflict with a hypothetical `acquire`, without
    /// creating one - used to build `DAV:no-conflicting-lock` bodies
    /// ahead of a refused LOCK.
    async fn find_conflicts(
        &self,
        root: &DavPath,
        scope: LockScope,
        deep: bool,
        owner_id: Option<&str>,
    ) -> Vec<ActiveLock>;

    /// Resolve a `Lock-Token` header value to the lock it names, if any
    /// (regardless of path - tokens are unique service-wide).
    async fn lookup_token(&self, token: &str) -> Option<ActiveLock>;
}

type LockTree = Tree<Vec<u8>, Vec<ActiveLock>>;

struct Limits {
    max_locks: usize,
    max_locks_per_url: usize,
}

impl Default for Limits {
    fn default() -> Self {
        Limits { max_locks: 10_000, max_locks_per_url: 100 }
    }
}

/// In-memory `LockManager`, the engine's reference implementation and the
/// backing for its own test suite - a direct generalization of the
/// `MemLs` pattern.
pub struct MemLockManager {
    inner: Mutex<Inner>,
    limits: Limits,
}

struct Inner {
    tree: LockTree,
    total_locks: usize,
}

impl MemLockManager {
    pub fn new() -> MemLockManager {
        MemLockManager {
            inner: Mutex::new(Inner { tree: Tree::new(Vec::new()), total_locks: 0 }),
            limits: Limits::default(),
        }
    }

    pub fn with_limits(max_locks: usize, max_locks_per_url: usize) -> MemLockManager {
        MemLockManager {
            inner: Mutex::new(Inner { tree: Tree::new(Vec::new()), total_locks: 0 }),
            limits: Limits { max_locks, max_locks_per_url },
        }
    }
}

impl Default for MemLockManager {
    fn default() -> Self {
        MemLockManager::new()
    }
}

fn path_segs(path: &DavPath, include_root: bool) -> Vec<&[u8]> {
    let mut segs: Vec<&[u8]> =
        path.as_bytes().split(|&c| c == b'/').filter(|s| !s.is_empty()).collect();
    if include_root {
        segs.insert(0, b"");
    }
    segs
}

fn get_child(tree: &LockTree, node_id: u64, seg: &[u8]) -> Option<u64> {
    if seg.is_empty() {
        return Some(node_id);
    }
    tree.get_child(node_id, seg).ok()
}

fn lookup_node(tree: &LockTree, path: &DavPath) -> Option<u64> {
    let mut node_id = ROOT_ID;
    for seg in path_segs(path, false) {
        node_id = get_child(tree, node_id, seg)?;
    }
    Some(node_id)
}

fn get_or_create_node<'a>(tree: &'a mut LockTree, path: &DavPath) -> &'a mut Vec<ActiveLock> {
    let mut node_id = ROOT_ID;
    for seg in path_segs(path, false) {
        node_id = match tree.get_child(node_id, seg) {
            Ok(n) => n,
            Err(_) => tree.add_child(node_id, seg.to_vec(), Vec::new(), false).unwrap(),
        };
    }
    tree.get_node_mut(node_id).unwrap()
}

/// Purge expired locks from a node in place, returning the surviving count.
fn reap(locks: &mut Vec<ActiveLock>) {
    locks.retain(|l| !l.is_expired());
}

/// Walk from the root down to `path`, checking each node's locks against
/// a requested operation. A lock only matters at an ancestor if it is
/// `deep`; at the target path itself, any lock matters.
fn check_to_path(
    tree: &mut LockTree,
    path: &DavPath,
    owner_id: Option<&str>,
    submitted_tokens: &[&str],
    shared_ok: bool,
) -> Result<(), ActiveLock> {
    let segs = path_segs(path, true);
    let last = segs.len() - 1;
    let mut holds_lock = false;
    let mut first_shared: Option<ActiveLock> = None;

    let mut node_id = ROOT_ID;
    for (i, seg) in segs.into_iter().enumerate() {
        node_id = match get_child(tree, node_id, seg) {
            Some(n) => n,
            None => break,
        };
        let node = tree.get_node_mut(node_id).unwrap();
        reap(node);
        for lk in node.iter() {
            if i < last && !lk.deep {
                continue;
            }
            if submitted_tokens.contains(&lk.token.as_str())
                && owner_id == lk.owner_id.as_deref()
            {
                holds_lock = true;
                continue;
            }
            if lk.scope == LockScope::Exclusive {
                return Err(lk.clone());
            }
            if shared_ok {
                // L3: a shared lock may coexist with other shared locks on
                // the same protection set, but only one per principal per
                // resource - a second shared-lock request from the same
                // owner on the same root is a conflict, not an implicit
                // refresh.
                if lk.root == *path && lk.owner_id.as_deref() == owner_id {
                    return Err(lk.clone());
                }
                continue;
            }
            first_shared.get_or_insert_with(|| lk.clone());
        }
    }
    if !holds_lock {
        if let Some(lk) = first_shared {
            return Err(lk);
        }
    }
    Ok(())
}

fn check_from_node(
    tree: &mut LockTree,
    node_id: u64,
    owner_id: Option<&str>,
    submitted_tokens: &[&str],
    shared_ok: bool,
) -> Result<(), ActiveLock> {
    {
        let node = tree.get_node_mut(node_id).unwrap();
        reap(node);
        for lk in node.iter() {
            let held = submitted_tokens.contains(&lk.token.as_str()) && owner_id == lk.owner_id.as_deref();
            if !held && (lk.scope == LockScope::Exclusive || !shared_ok) {
                return Err(lk.clone());
            }
        }
    }
    let children = tree.get_children(node_id).map(|c| c.collect::<Vec<_>>()).unwrap_or_default();
    for (_, child_id) in children {
        check_from_node(tree, child_id, owner_id, submitted_tokens, shared_ok)?;
    }
    Ok(())
}

#[async_trait]
impl LockManager for MemLockManager {
    async fn acquire(
        &self,
        root: &DavPath,
        scope: LockScope,
        deep: bool,
        owner_id: Option<&str>,
        owner_xml: Option<Element>,
        timeout: Option<Duration>,
    ) -> Result<ActiveLock, AcquireError> {
        let mut inner = self.inner.lock().unwrap();

        if inner.total_locks >= self.limits.max_locks {
            return Err(AcquireError::GlobalLimitExceeded);
        }
        if let Some(node_id) = lookup_node(&inner.tree, root) {
            let n = inner.tree.get_node(node_id).unwrap();
            if n.len() >= self.limits.max_locks_per_url {
                return Err(AcquireError::PerUrlLimitExceeded);
            }
        }

        if let Err(lk) = check_to_path(&mut inner.tree, root, owner_id, &[], scope == LockScope::Shared) {
            return Err(AcquireError::Conflict(vec![lk]));
        }
        if deep {
            if let Some(node_id) = lookup_node(&inner.tree, root) {
                if let Err(lk) = check_from_node(&mut inner.tree, node_id, owner_id, &[], false) {
                    return Err(AcquireError::Conflict(vec![lk]));
                }
            }
        }

        let lock = ActiveLock {
            token: format!("urn:uuid:{}", Uuid::new_v4()),
            root: root.clone(),
            scope,
            deep,
            owner_id: owner_id.map(|s| s.to_string()),
            owner_xml,
            timeout,
            timeout_at: timeout.map(|d| SystemTime::now() + d),
            created_at: SystemTime::now(),
        };
        get_or_create_node(&mut inner.tree, root).push(lock.clone());
        inner.total_locks += 1;
        Ok(lock)
    }

    async fn refresh(&self, token: &str, timeout: Option<Duration>) -> Option<ActiveLock> {
        let mut inner = self.inner.lock().unwrap();
        let node_id = find_token_node(&inner.tree, token)?;
        let node = inner.tree.get_node_mut(node_id).unwrap();
        let lk = node.iter_mut().find(|l| l.token == token)?;
        lk.timeout = timeout;
        lk.timeout_at = timeout.map(|d| SystemTime::now() + d);
        Some(lk.clone())
    }

    async fn release(&self, token: &str) -> Result<(), ()> {
        let mut inner = self.inner.lock().unwrap();
        let node_id = find_token_node(&inner.tree, token).ok_or(())?;
        let node = inner.tree.get_node_mut(node_id).unwrap();
        let idx = node.iter().position(|l| l.token == token).ok_or(())?;
        node.remove(idx);
        inner.total_locks = inner.total_locks.saturating_sub(1);
        if node.is_empty() {
            let _ = inner.tree.delete_node(node_id);
        }
        Ok(())
    }

    async fn get_locks(&self, path: &DavPath, selection: LockSelection) -> Vec<ActiveLock> {
        let mut inner = self.inner.lock().unwrap();
        let mut out = Vec::new();

        let want_ancestors =
            matches!(selection, LockSelection::SelfAndAncestors | LockSelection::SelfAncestorsDescendants);
        let want_descendants =
            matches!(selection, LockSelection::SelfAndDescendants | LockSelection::SelfAncestorsDescendants);

        if want_ancestors {
            let mut node_id = ROOT_ID;
            if let Ok(n) = inner.tree.get_node_mut(node_id) {
                reap(n);
                out.extend(n.iter().cloned());
            }
            for seg in path_segs(path, false) {
                node_id = match get_child(&inner.tree, node_id, seg) {
                    Some(n) => n,
                    None => break,
                };
                if let Ok(n) = inner.tree.get_node_mut(node_id) {
                    reap(n);
                    out.extend(n.iter().cloned());
                }
            }
        } else if let Some(node_id) = lookup_node(&inner.tree, path) {
            if let Ok(n) = inner.tree.get_node_mut(node_id) {
                reap(n);
                out.extend(n.iter().cloned());
            }
        }

        if want_descendants {
            if let Some(node_id) = lookup_node(&inner.tree, path) {
                let children = inner.tree.get_children(node_id).map(|c| c.collect::<Vec<_>>()).unwrap_or_default();
                for (_, child_id) in children {
                    collect_descendants(&mut inner.tree, child_id, &mut out);
                }
            }
        }

        out
    }

    async fn remove_recursive(&self, path: &DavPath) {
        let mut inner = self.inner.lock().unwrap();
        if let Some(node_id) = lookup_node(&inner.tree, path) {
            let _ = inner.tree.delete_subtree(node_id);
        }
    }

    async fn remove_nonrecursive(&self, path: &DavPath) {
        let mut inner = self.inner.lock().unwrap();
        if let Some(node_id) = lookup_node(&inner.tree, path) {
            if let Ok(n) = inner.tree.get_node_mut(node_id) {
                n.retain(|l| l.deep);
            }
        }
    }

    async fn check(
        &self,
        path: &DavPath,
        owner_id: Option<&str>,
        deep: bool,
        submitted_tokens: &[&str],
    ) -> Result<(), ActiveLock> {
        let mut inner = self.inner.lock().unwrap();
        check_to_path(&mut inner.tree, path, owner_id, submitted_tokens, false)?;
        if deep {
            if let Some(node_id) = lookup_node(&inner.tree, path) {
                check_from_node(&mut inner.tree, node_id, owner_id, submitted_tokens, false)?;
            }
        }
        Ok(())
    }

    async fn find_conflicts(
        &self,
        root: &DavPath,
        scope: LockScope,
        deep: bool,
        owner_id: Option<&str>,
    ) -> Vec<ActiveLock> {
        let mut inner = self.inner.lock().unwrap();
        let mut out = Vec::new();
        if let Err(lk) = check_to_path(&mut inner.tree, root, owner_id, &[], scope == LockScope::Shared) {
            out.push(lk);
        }
        if deep {
            if let Some(node_id) = lookup_node(&inner.tree, root) {
                if let Err(lk) = check_from_node(&mut inner.tree, node_id, owner_id, &[], false) {
                    out.push(lk);
                }
            }
        }
        out
    }

    async fn lookup_token(&self, token: &str) -> Option<ActiveLock> {
        let mut inner = self.inner.lock().unwrap();
        let node_id = find_token_node(&inner.tree, token)?;
        let node = inner.tree.get_node_mut(node_id).unwrap();
        node.iter().find(|l| l.token == token).cloned()
    }
}

fn find_token_node(tree: &LockTree, token: &str) -> Option<u64> {
    fn walk(tree: &LockTree, node_id: u64, token: &str) -> Option<u64> {
        if let Ok(n) = tree.get_node(node_id) {
            if n.iter().any(|l| l.token == token) {
                return Some(node_id);
            }
        }
        if let Ok(children) = tree.get_children(node_id) {
            for (_, child_id) in children {
                if let Some(found) = walk(tree, child_id, token) {
                    return Some(found);
                }
            }
        }
        None
    }
    walk(tree, ROOT_ID, token)
}

fn collect_descendants(tree: &mut LockTree, node_id: u64, out: &mut Vec<ActiveLock>) {
    if let Ok(n) = tree.get_node_mut(node_id) {
        reap(n);
        out.extend(n.iter().cloned());
    }
    let children = tree.get_children(node_id).map(|c| c.collect::<Vec<_>>()).unwrap_or_default();
    for (_, child_id) in children {
        collect_descendants(tree, child_id, out);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn p(s: &str) -> DavPath {
        DavPath::new(s).unwrap()
    }

    #[tokio::test]
    async fn exclusive_then_exclusive_conflicts() {
        let lm = MemLockManager::new();
        lm.acquire(&p("/a"), LockScope::Exclusive, false, Some("alice"), None, None).await.unwrap();
        let err = lm.acquire(&p("/a"), LockScope::Exclusive, false, Some("bob"), None, None).await;
        assert!(matches!(err, Err(AcquireError::Conflict(_))));
    }

    #[tokio::test]
    async fn shared_locks_from_different_principals_coexist() {
        let lm = MemLockManager::new();
        lm.acquire(&p("/f"), LockScope::Shared, false, Some("a"), None, None).await.unwrap();
        lm.acquire(&p("/f"), LockScope::Shared, false, Some("b"), None, None).await.unwrap();
        let same = lm.acquire(&p("/f"), LockScope::Shared, false, Some("a"), None, None).await;
        assert!(matches!(same, Err(AcquireError::Conflict(_))));
        let excl = lm.acquire(&p("/f"), LockScope::Exclusive, false, Some("c"), None, None).await;
        assert!(matches!(excl, Err(AcquireError::Conflict(_))));
    }

    #[tokio::test]
    async fn deep_lock_blocks_descendant_write() {
        let lm = MemLockManager::new();
        lm.acquire(&p("/d"), LockScope::Exclusive, true, Some("a"), None, None).await.unwrap();
        let err = lm.check(&p("/d/new"), Some("b"), false, &[]).await;
        assert!(err.is_err());
    }

    #[tokio::test]
    async fn unlock_removes_lock() {
        let lm = MemLockManager::new();
        let lock = lm.acquire(&p("/f"), LockScope::Exclusive, false, Some("a"), None, None).await.unwrap();
        lm.release(&lock.token).await.unwrap();
        assert!(lm.lookup_token(&lock.token).await.is_none());
        assert!(lm.check(&p("/f"), Some("b"), false, &[]).await.is_ok());
    }

    #[tokio::test]
    async fn submitted_token_grants_access() {
        let lm = MemLockManager::new();
        let lock = lm.acquire(&p("/file"), LockScope::Exclusive, false, Some("a"), None, None).await.unwrap();
        assert!(lm.check(&p("/file"), Some("a"), false, &[]).await.is_err());
        assert!(lm.check(&p("/file"), Some("a"), false, &[lock.token.as_str()]).await.is_ok());
    }
}
