//! Dependency tracking for rendered pages.
//!
//! Every page, namespace listing, tag lookup and metadata read consulted
//! while expanding includes is recorded in a [`CacheDependencySet`]. The host
//! stores the set next to its cached render and asks [`CacheDependencySet::stale_reason`]
//! before serving it again.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::application::repos::{PageStore, TagIndex};
use crate::domain::page_id::PageId;

/// One input a cached render depends on.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum DependencyKey {
    /// A page read (or probed) during the render, with its existence at the time.
    Page { id: PageId, existed: bool },
    /// A namespace listing used by a `namespace` directive.
    Namespace { namespace: String, depth: usize },
    /// A tag index lookup used by a `tagtopic` directive.
    TagIndex(String),
    /// Metadata of a page read for sorting or footers.
    Metadata(PageId),
}

/// Everything one render of `consumer` read. Recording is idempotent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheDependencySet {
    consumer: PageId,
    pages: BTreeMap<PageId, bool>,
    namespaces: BTreeMap<(String, usize), BTreeSet<PageId>>,
    tags: BTreeMap<String, BTreeSet<PageId>>,
    metadata: BTreeSet<PageId>,
}

impl CacheDependencySet {
    pub fn new(consumer: PageId) -> Self {
        Self {
            consumer,
            pages: BTreeMap::new(),
            namespaces: BTreeMap::new(),
            tags: BTreeMap::new(),
            metadata: BTreeSet::new(),
        }
    }

    pub fn consumer(&self) -> &PageId {
        &self.consumer
    }

    pub fn record_page(&mut self, page: &PageId, existed: bool) {
        self.pages.insert(page.clone(), existed);
    }

    /// Record a namespace listing together with the pages it returned.
    pub fn record_namespace<'a>(
        &mut self,
        namespace: &str,
        depth: usize,
        members: impl IntoIterator<Item = &'a PageId>,
    ) {
        self.namespaces
            .entry((namespace.to_string(), depth))
            .or_default()
            .extend(members.into_iter().cloned());
    }

    pub fn record_tag<'a>(&mut self, tag: &str, members: impl IntoIterator<Item = &'a PageId>) {
        self.tags
            .entry(tag.to_string())
            .or_default()
            .extend(members.into_iter().cloned());
    }

    pub fn record_metadata(&mut self, page: &PageId) {
        self.metadata.insert(page.clone());
    }

    pub fn contains_page(&self, page: &PageId) -> bool {
        self.pages.contains_key(page)
    }

    pub fn pages(&self) -> impl Iterator<Item = (&PageId, bool)> {
        self.pages.iter().map(|(page, existed)| (page, *existed))
    }

    /// Flat, ordered view of every recorded dependency.
    pub fn keys(&self) -> Vec<DependencyKey> {
        let pages = self.pages.iter().map(|(id, existed)| DependencyKey::Page {
            id: id.clone(),
            existed: *existed,
        });
        let namespaces = self
            .namespaces
            .keys()
            .map(|(namespace, depth)| DependencyKey::Namespace {
                namespace: namespace.clone(),
                depth: *depth,
            });
        let tags = self.tags.keys().cloned().map(DependencyKey::TagIndex);
        let metadata = self.metadata.iter().cloned().map(DependencyKey::Metadata);

        pages.chain(namespaces).chain(tags).chain(metadata).collect()
    }

    pub fn len(&self) -> usize {
        self.pages.len() + self.namespaces.len() + self.tags.len() + self.metadata.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// First dependency that changed since `cached_at`, if any.
    ///
    /// A page is stale when it appeared, disappeared or was modified after the
    /// render. Listings are stale when their membership changed. Lookups that
    /// fail count as stale.
    pub fn stale_reason(
        &self,
        cached_at: OffsetDateTime,
        pages: &dyn PageStore,
        tags: Option<&dyn TagIndex>,
    ) -> Option<DependencyKey> {
        let modified_since = |page: &PageId| {
            pages
                .modified(page)
                .is_some_and(|modified| modified > cached_at)
        };

        for (id, existed) in &self.pages {
            let exists = pages.exists(id);
            if exists != *existed || (exists && modified_since(id)) {
                return Some(DependencyKey::Page {
                    id: id.clone(),
                    existed: *existed,
                });
            }
        }

        for ((namespace, depth), members) in &self.namespaces {
            let unchanged = pages
                .list_pages(namespace, *depth)
                .map(|current| current.into_iter().collect::<BTreeSet<_>>() == *members)
                .unwrap_or(false);
            if !unchanged {
                return Some(DependencyKey::Namespace {
                    namespace: namespace.clone(),
                    depth: *depth,
                });
            }
        }

        for (tag, members) in &self.tags {
            let unchanged = tags
                .and_then(|index| index.pages_by_tag(tag).ok())
                .map(|current| current.into_iter().collect::<BTreeSet<_>>() == *members)
                .unwrap_or(false);
            if !unchanged {
                return Some(DependencyKey::TagIndex(tag.clone()));
            }
        }

        self.metadata
            .iter()
            .find(|page| modified_since(page))
            .map(|page| DependencyKey::Metadata(page.clone()))
    }

    pub fn is_stale(
        &self,
        cached_at: OffsetDateTime,
        pages: &dyn PageStore,
        tags: Option<&dyn TagIndex>,
    ) -> bool {
        self.stale_reason(cached_at, pages, tags).is_some()
    }
}
