//! A small generic path-indexed tree, shared by the lock manager
//! (`lock.rs`) and the in-memory reference `Service` (`fs/memfs.rs`) as
//! their backing storage. Each node is addressed by a path segment key
//! relative to its parent; nodes carry arbitrary per-node data `D`.

use std::borrow::Borrow;
use std::collections::HashMap;
use std::fmt::Debug;
use std::hash::Hash;

/// Failure modes for tree operations. Deliberately small and distinct
/// from the crate's richer `DavError`/`FsError` currencies - this module
/// has no notion of HTTP status codes, only tree shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TreeError {
    NotFound,
    Exists,
    NotEmpty,
}

pub type TreeResult<T> = Result<T, TreeError>;

/// id of the root node of the tree.
pub const ROOT_ID: u64 = 1;

#[derive(Debug)]
struct Node<K: Eq + Hash, D> {
    data: D,
    parent_id: u64,
    children: HashMap<K, u64>,
}

/// A tree of nodes, each holding a `D` and addressed from its parent by a
/// `K`-typed key (typically a path segment).
#[derive(Debug)]
pub struct Tree<K: Eq + Hash, D> {
    nodes: HashMap<u64, Node<K, D>>,
    next_id: u64,
}

/// Iterator over the `(key, node id)` pairs of a node's children.
#[derive(Debug)]
pub struct Children<K>(std::vec::IntoIter<(K, u64)>);

impl<K> Iterator for Children<K> {
    type Item = (K, u64);
    fn next(&mut self) -> Option<Self::Item> {
        self.0.next()
    }
}

impl<K: Eq + Hash + Debug + Clone, D: Debug> Tree<K, D> {
    /// Create a new tree, with the root node initialized to `data`.
    pub fn new(data: D) -> Tree<K, D> {
        let mut t = Tree { nodes: HashMap::new(), next_id: ROOT_ID };
        t.new_node(0, data);
        t
    }

    fn new_node(&mut self, parent_id: u64, data: D) -> u64 {
        let id = self.next_id;
        self.next_id += 1;
        self.nodes.insert(id, Node { parent_id, data, children: HashMap::new() });
        id
    }

    /// Add a child node under `parent`. Fails with `Exists` if `key` is
    /// already taken and `overwrite` is false.
    pub fn add_child(&mut self, parent: u64, key: K, data: D, overwrite: bool) -> TreeResult<u64> {
        {
            let pnode = self.nodes.get(&parent).ok_or(TreeError::NotFound)?;
            if !overwrite && pnode.children.contains_key(&key) {
                return Err(TreeError::Exists);
            }
        }
        let id = self.new_node(parent, data);
        self.nodes.get_mut(&parent).unwrap().children.insert(key, id);
        Ok(id)
    }

    /// Get a child node's id by key.
    pub fn get_child<Q: ?Sized>(&self, parent: u64, key: &Q) -> TreeResult<u64>
    where
        K: Borrow<Q>,
        Q: Hash + Eq,
    {
        let pnode = self.nodes.get(&parent).ok_or(TreeError::NotFound)?;
        pnode.children.get(key).copied().ok_or(TreeError::NotFound)
    }

    /// Iterate over a node's `(key, child id)` pairs.
    pub fn get_children(&self, parent: u64) -> TreeResult<Children<K>> {
        let pnode = self.nodes.get(&parent).ok_or(TreeError::NotFound)?;
        let v = pnode.children.iter().map(|(k, i)| (k.clone(), *i)).collect::<Vec<_>>();
        Ok(Children(v.into_iter()))
    }

    pub fn get_node(&self, id: u64) -> TreeResult<&D> {
        self.nodes.get(&id).map(|n| &n.data).ok_or(TreeError::NotFound)
    }

    pub fn get_node_mut(&mut self, id: u64) -> TreeResult<&mut D> {
        self.nodes.get_mut(&id).map(|n| &mut n.data).ok_or(TreeError::NotFound)
    }

    fn unlink_from_parent(&mut self, id: u64) -> TreeResult<()> {
        let parent_id = self.nodes.get(&id).ok_or(TreeError::NotFound)?.parent_id;
        let key = {
            let pnode = self.nodes.get(&parent_id).unwrap();
            pnode.children.iter().find(|&(_, &v)| v == id).map(|(k, _)| k.clone())
        };
        if let Some(key) = key {
            self.nodes.get_mut(&parent_id).unwrap().children.remove(&key);
        }
        Ok(())
    }

    /// Delete a leaf node. Fails with `NotEmpty` if it has children.
    pub fn delete_node(&mut self, id: u64) -> TreeResult<()> {
        if !self.nodes.get(&id).ok_or(TreeError::NotFound)?.children.is_empty() {
            return Err(TreeError::NotEmpty);
        }
        self.unlink_from_parent(id)?;
        self.nodes.remove(&id);
        Ok(())
    }

    /// Delete a node and everything below it.
    pub fn delete_subtree(&mut self, id: u64) -> TreeResult<()> {
        let children = self
            .nodes
            .get(&id)
            .ok_or(TreeError::NotFound)?
            .children
            .values()
            .copied()
            .collect::<Vec<_>>();
        for c in children {
            self.delete_subtree(c)?;
        }
        self.unlink_from_parent(id)?;
        self.nodes.remove(&id);
        Ok(())
    }

    /// Move a node to a new parent/key. If `overwrite`, replaces an
    /// existing childless node at the destination.
    pub fn move_node(&mut self, id: u64, new_parent: u64, new_key: K, overwrite: bool) -> TreeResult<()> {
        let dest = {
            let pnode = self.nodes.get(&new_parent).ok_or(TreeError::NotFound)?;
            match pnode.children.get(&new_key) {
                Some(&cid) => {
                    if !overwrite || !self.nodes.get(&cid).unwrap().children.is_empty() {
                        return Err(TreeError::Exists);
                    }
                    Some(cid)
                },
                None => None,
            }
        };
        self.unlink_from_parent(id)?;
        self.nodes.get_mut(&id).unwrap().parent_id = new_parent;
        if let Some(dest) = dest {
            self.nodes.remove(&dest);
        }
        self.nodes.get_mut(&new_parent).unwrap().children.insert(new_key, id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn add_and_find_child() {
        let mut t: Tree<Vec<u8>, &str> = Tree::new("root");
        let id = t.add_child(ROOT_ID, b"a".to_vec(), "a", false).unwrap();
        assert_eq!(t.get_child(ROOT_ID, b"a".as_slice()).unwrap(), id);
        assert_eq!(*t.get_node(id).unwrap(), "a");
    }

    #[test]
    fn delete_node_rejects_nonempty() {
        let mut t: Tree<Vec<u8>, &str> = Tree::new("root");
        let id = t.add_child(ROOT_ID, b"a".to_vec(), "a", false).unwrap();
        t.add_child(id, b"b".to_vec(), "b", false).unwrap();
        assert_eq!(t.delete_node(id), Err(TreeError::NotEmpty));
    }

    #[test]
    fn delete_subtree_removes_all() {
        let mut t: Tree<Vec<u8>, &str> = Tree::new("root");
        let id = t.add_child(ROOT_ID, b"a".to_vec(), "a", false).unwrap();
        t.add_child(id, b"b".to_vec(), "b", false).unwrap();
        t.delete_subtree(id).unwrap();
        assert_eq!(t.get_child(ROOT_ID, b"a".as_slice()), Err(TreeError::NotFound));
    }

    #[test]
    fn move_node_relocates() {
        let mut t: Tree<Vec<u8>, &str> = Tree::new("root");
        let a = t.add_child(ROOT_ID, b"a".to_vec(), "a", false).unwrap();
        t.move_node(a, ROOT_ID, b"b".to_vec(), false).unwrap();
        assert_eq!(t.get_child(ROOT_ID, b"b".as_slice()).unwrap(), a);
        assert_eq!(t.get_child(ROOT_ID, b"a".as_slice()), Err(TreeError::NotFound));
    }
}
