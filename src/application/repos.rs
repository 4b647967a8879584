//! Collaborator traits describing the host wiki.
//!
//! The include machinery never touches storage directly; the host engine
//! supplies implementations of these traits (see `infra::memory` for an
//! in-memory adapter).

use std::sync::Arc;

use serde_json::Value;
use thiserror::Error;
use time::OffsetDateTime;

use crate::domain::instructions::Instruction;
use crate::domain::page_id::PageId;
use crate::domain::types::{MetadataMode, Permission, Viewer};

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StoreError {
    #[error("storage error: {0}")]
    Storage(String),
    #[error("page `{0}` not found")]
    NotFound(PageId),
    #[error("collaborator unavailable: {0}")]
    Unavailable(String),
}

impl StoreError {
    pub fn from_storage(err: impl std::fmt::Display) -> Self {
        Self::Storage(err.to_string())
    }
}

/// Page existence, compiled instructions and listings.
pub trait PageStore: Send + Sync {
    fn exists(&self, page: &PageId) -> bool;

    /// Compiled instruction stream of `page`. Implementations may cache.
    fn instructions(&self, page: &PageId) -> Result<Vec<Instruction>, StoreError>;

    fn modified(&self, page: &PageId) -> Option<OffsetDateTime>;

    /// Pages below `namespace`, down to `depth` levels (0 = unlimited).
    fn list_pages(&self, namespace: &str, depth: usize) -> Result<Vec<PageId>, StoreError>;

    fn is_hidden(&self, page: &PageId) -> bool;
}

pub trait AccessControl: Send + Sync {
    fn check(&self, page: &PageId, viewer: &Viewer) -> Permission;
}

pub trait MetadataStore: Send + Sync {
    fn get(
        &self,
        page: &PageId,
        key: &str,
        mode: MetadataMode,
    ) -> Result<Option<Value>, StoreError>;

    fn set(&self, page: &PageId, key: &str, value: Value) -> Result<(), StoreError>;
}

/// Optional tag index used by `tagtopic` directives.
pub trait TagIndex: Send + Sync {
    fn pages_by_tag(&self, tag: &str) -> Result<Vec<PageId>, StoreError>;
}

/// Collaborators injected into the include engine, built once per engine.
#[derive(Clone)]
pub struct Collaborators {
    pub pages: Arc<dyn PageStore>,
    pub access: Arc<dyn AccessControl>,
    pub metadata: Arc<dyn MetadataStore>,
    pub tags: Option<Arc<dyn TagIndex>>,
}

impl Collaborators {
    pub fn new(
        pages: Arc<dyn PageStore>,
        access: Arc<dyn AccessControl>,
        metadata: Arc<dyn MetadataStore>,
    ) -> Self {
        Self {
            pages,
            access,
            metadata,
            tags: None,
        }
    }

    pub fn with_tags(mut self, tags: Arc<dyn TagIndex>) -> Self {
        self.tags = Some(tags);
        self
    }

    /// Use one adapter for every collaborator role.
    pub fn from_shared<T>(adapter: Arc<T>) -> Self
    where
        T: PageStore + AccessControl + MetadataStore + TagIndex + 'static,
    {
        Self {
            pages: adapter.clone(),
            access: adapter.clone(),
            metadata: adapter.clone(),
            tags: Some(adapter),
        }
    }
}
