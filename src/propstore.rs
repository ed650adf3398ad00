//! C3: the property store.
//!
//! Dead properties - anything a client sets via `PROPPATCH` that isn't one
//! of the live properties computed from resource metadata - are held here,
//! keyed by path and qualified name. This generalizes the
//! `DavFileSystem::{have_props,get_props,get_prop,patch_props}` quartet
//! (fs.rs) into a standalone trait so a `Service` can delegate property
//! storage to something other than its own backing store (a database, for
//! instance) without the trait being tangled up with file I/O.

use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;
use http::StatusCode;

use crate::error::DavResult;
use crate::path::DavPath;
use crate::xmlvalue::{PropertyValue, QName};

/// One dead-property record: a qualified name and its current value.
#[derive(Debug, Clone, PartialEq)]
pub struct PropertyRecord {
    pub name: QName,
    pub value: PropertyValue,
}

/// A single `PROPPATCH` instruction, already separated from the live
/// properties a `Service`'s method processor intercepted.
#[derive(Debug, Clone)]
pub enum PropertyPatch {
    Set(PropertyRecord),
    Remove(QName),
}

/// Per-path dead-property storage, addressed independently of file
/// content so a `Service` backed by something that has no native property
/// support (a plain local filesystem, say) can still satisfy PROPPATCH.
///
/// All methods are async to allow a database-backed implementation;
/// the bundled in-memory implementation never actually awaits.
#[async_trait]
pub trait PropertyStore: Send + Sync {
    /// Whether this store holds (or is willing to hold) properties for
    /// `path` at all. A `Service` consults this before routing a PROPPATCH
    /// `set`/`remove` to dead-property handling versus rejecting it.
    async fn have_props(&self, path: &DavPath) -> bool;

    /// Apply a batch of patches atomically from the caller's point of
    /// view: every patch in the batch either all succeed, or the ones
    /// that failed are reported with their status and the rest are left
    /// unapplied (RFC 4918 §9.2's "all-or-nothing among the properties
    /// it names" semantics - the precondition engine has already decided
    /// whether live-property conflicts abort the whole PROPPATCH before
    /// this is called).
    async fn patch(
        &self,
        path: &DavPath,
        patches: Vec<PropertyPatch>,
    ) -> DavResult<Vec<(StatusCode, QName)>>;

    /// List every dead property stored for `path`.
    async fn get_props(&self, path: &DavPath) -> DavResult<Vec<PropertyRecord>>;

    /// Fetch a single named property, if stored.
    async fn get_prop(&self, path: &DavPath, name: &QName) -> DavResult<Option<PropertyValue>>;

    /// Drop every property stored for `path` (called when the resource
    /// itself is deleted).
    async fn remove_all(&self, path: &DavPath);

    /// Copy every property from `from` to `to` (used by COPY, which per
    /// RFC 4918 §9.8.3 duplicates dead properties along with content).
    async fn copy_all(&self, from: &DavPath, to: &DavPath) -> DavResult<()>;
}

/// A `PropertyStore` backed by an in-process `HashMap`, suitable for the
/// bundled `MemFs`/`LocalFs` reference services and for tests.
#[derive(Debug, Default)]
pub struct MemPropStore {
    // DavPath's Hash/Eq ignore a trailing slash, matching how every other
    // path-keyed map in this crate treats collections.
    props: RwLock<HashMap<DavPath, HashMap<QName, PropertyValue>>>,
}

impl MemPropStore {
    pub fn new() -> MemPropStore {
        MemPropStore::default()
    }
}

#[async_trait]
impl PropertyStore for MemPropStore {
    async fn have_props(&self, _path: &DavPath) -> bool {
        true
    }

    async fn patch(
        &self,
        path: &DavPath,
        patches: Vec<PropertyPatch>,
    ) -> DavResult<Vec<(StatusCode, QName)>> {
        let mut map = self.props.write().unwrap();
        let entry = map.entry(path.clone()).or_default();
        let mut results = Vec::with_capacity(patches.len());
        for patch in patches {
            match patch {
                PropertyPatch::Set(rec) => {
                    let name = rec.name.clone();
                    entry.insert(rec.name, rec.value);
                    results.push((StatusCode::OK, name));
                },
                PropertyPatch::Remove(name) => {
                    entry.remove(&name);
                    results.push((StatusCode::OK, name));
                },
            }
        }
        Ok(results)
    }

    async fn get_props(&self, path: &DavPath) -> DavResult<Vec<PropertyRecord>> {
        let map = self.props.read().unwrap();
        Ok(map
            .get(path)
            .map(|m| {
                m.iter()
                    .map(|(name, value)| PropertyRecord { name: name.clone(), value: value.clone() })
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn get_prop(&self, path: &DavPath, name: &QName) -> DavResult<Option<PropertyValue>> {
        let map = self.props.read().unwrap();
        Ok(map.get(path).and_then(|m| m.get(name).cloned()))
    }

    async fn remove_all(&self, path: &DavPath) {
        self.props.write().unwrap().remove(path);
    }

    async fn copy_all(&self, from: &DavPath, to: &DavPath) -> DavResult<()> {
        let mut map = self.props.write().unwrap();
        if let Some(props) = map.get(from).cloned() {
            map.insert(to.clone(), props);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn set_then_get() {
        let store = MemPropStore::new();
        let path = DavPath::new("/a").unwrap();
        let name = QName::new("http://example.com/", "color");
        store
            .patch(
                &path,
                vec![PropertyPatch::Set(PropertyRecord {
                    name: name.clone(),
                    value: PropertyValue::text("blue"),
                })],
            )
            .await
            .unwrap();
        assert_eq!(
            store.get_prop(&path, &name).await.unwrap(),
            Some(PropertyValue::text("blue"))
        );
    }

    #[tokio::test]
    async fn remove_drops_property() {
        let store = MemPropStore::new();
        let path = DavPath::new("/a").unwrap();
        let name = QName::new("http://example.com/", "color");
        store
            .patch(
                &path,
                vec![PropertyPatch::Set(PropertyRecord {
                    name: name.clone(),
                    value: PropertyValue::text("blue"),
                })],
            )
            .await
            .unwrap();
        store.patch(&path, vec![PropertyPatch::Remove(name.clone())]).await.unwrap();
        assert_eq!(store.get_prop(&path, &name).await.unwrap(), None);
    }

    #[tokio::test]
    async fn copy_all_duplicates() {
        let store = MemPropStore::new();
        let from = DavPath::new("/a").unwrap();
        let to = DavPath::new("/b").unwrap();
        let name = QName::new("DAV:", "displayname");
        store
            .patch(
                &from,
                vec![PropertyPatch::Set(PropertyRecord { name: name.clone(), value: PropertyValue::text("A") })],
            )
            .await
            .unwrap();
        store.copy_all(&from, &to).await.unwrap();
        assert_eq!(store.get_prop(&to, &name).await.unwrap(), Some(PropertyValue::text("A")));
    }
}
