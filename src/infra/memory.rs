//! In-memory wiki implementing every collaborator trait.
//!
//! Used by tests and by hosts that compile pages ahead of time. Access rules
//! match exact page ids or whole namespaces (`docs:*`); a user-specific rule
//! beats a rule for everyone, and the most specific pattern wins.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::RwLock;

use serde_json::Value;
use time::OffsetDateTime;

use crate::application::repos::{AccessControl, MetadataStore, PageStore, StoreError, TagIndex};
use crate::cache::{rw_read, rw_write};
use crate::domain::instructions::Instruction;
use crate::domain::page_id::PageId;
use crate::domain::types::{MetadataMode, Permission, Viewer, meta_keys, value_as_tags};

const SOURCE: &str = "infra::memory";

#[derive(Debug, Clone)]
struct StoredPage {
    instructions: Vec<Instruction>,
    modified: Option<OffsetDateTime>,
}

#[derive(Debug, Clone)]
struct AccessRule {
    pattern: String,
    user: Option<String>,
    permission: Permission,
}

impl AccessRule {
    /// Specificity of the match, or `None` when the rule does not apply.
    fn matches(&self, page: &PageId, viewer: &Viewer) -> Option<(bool, usize)> {
        if self
            .user
            .as_deref()
            .is_some_and(|user| viewer.user.as_deref() != Some(user))
        {
            return None;
        }

        let specificity = match self.pattern.strip_suffix('*') {
            Some(namespace) => {
                let namespace = namespace.trim_end_matches(':');
                page.is_in_namespace(namespace).then_some(namespace.len())?
            }
            None => (page.as_str() == self.pattern).then_some(usize::MAX)?,
        };
        Some((self.user.is_some(), specificity))
    }
}

#[derive(Debug)]
struct WikiState {
    pages: BTreeMap<PageId, StoredPage>,
    hidden: BTreeSet<PageId>,
    metadata: BTreeMap<PageId, BTreeMap<String, Value>>,
    rules: Vec<AccessRule>,
    default_permission: Permission,
}

/// Thread-safe in-memory page store, access control, metadata store and tag index.
#[derive(Debug)]
pub struct MemoryWiki {
    state: RwLock<WikiState>,
}

impl Default for MemoryWiki {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryWiki {
    /// Empty wiki where everyone may edit every page.
    pub fn new() -> Self {
        Self {
            state: RwLock::new(WikiState {
                pages: BTreeMap::new(),
                hidden: BTreeSet::new(),
                metadata: BTreeMap::new(),
                rules: Vec::new(),
                default_permission: Permission::Edit,
            }),
        }
    }

    pub fn with_page(self, id: &str, instructions: Vec<Instruction>) -> Self {
        self.insert_page(id, instructions, None);
        self
    }

    pub fn with_page_at(
        self,
        id: &str,
        instructions: Vec<Instruction>,
        modified: OffsetDateTime,
    ) -> Self {
        self.insert_page(id, instructions, Some(modified));
        self
    }

    pub fn with_meta(self, id: &str, key: &str, value: Value) -> Self {
        self.put_meta(&PageId::new(id), key, value);
        self
    }

    pub fn with_hidden(self, id: &str) -> Self {
        rw_write(&self.state, SOURCE, "with_hidden")
            .hidden
            .insert(PageId::new(id));
        self
    }

    /// Grant `permission` on `pattern` (a page id or `ns:*`), optionally for one user only.
    pub fn with_rule(self, pattern: &str, user: Option<&str>, permission: Permission) -> Self {
        rw_write(&self.state, SOURCE, "with_rule")
            .rules
            .push(AccessRule {
                pattern: pattern.trim().to_ascii_lowercase(),
                user: user.map(str::to_string),
                permission,
            });
        self
    }

    pub fn with_default_permission(self, permission: Permission) -> Self {
        rw_write(&self.state, SOURCE, "with_default_permission").default_permission = permission;
        self
    }

    pub fn insert_page(
        &self,
        id: &str,
        instructions: Vec<Instruction>,
        modified: Option<OffsetDateTime>,
    ) {
        rw_write(&self.state, SOURCE, "insert_page").pages.insert(
            PageId::new(id),
            StoredPage {
                instructions,
                modified,
            },
        );
    }

    pub fn remove_page(&self, id: &PageId) -> bool {
        rw_write(&self.state, SOURCE, "remove_page")
            .pages
            .remove(id)
            .is_some()
    }

    fn put_meta(&self, page: &PageId, key: &str, value: Value) {
        rw_write(&self.state, SOURCE, "put_meta")
            .metadata
            .entry(page.clone())
            .or_default()
            .insert(key.to_string(), value);
    }
}

impl PageStore for MemoryWiki {
    fn exists(&self, page: &PageId) -> bool {
        rw_read(&self.state, SOURCE, "exists")
            .pages
            .contains_key(page)
    }

    fn instructions(&self, page: &PageId) -> Result<Vec<Instruction>, StoreError> {
        rw_read(&self.state, SOURCE, "instructions")
            .pages
            .get(page)
            .map(|stored| stored.instructions.clone())
            .ok_or_else(|| StoreError::NotFound(page.clone()))
    }

    fn modified(&self, page: &PageId) -> Option<OffsetDateTime> {
        rw_read(&self.state, SOURCE, "modified")
            .pages
            .get(page)
            .and_then(|stored| stored.modified)
    }

    fn list_pages(&self, namespace: &str, depth: usize) -> Result<Vec<PageId>, StoreError> {
        let state = rw_read(&self.state, SOURCE, "list_pages");
        Ok(state
            .pages
            .keys()
            .filter(|page| page.is_in_namespace(namespace))
            .filter(|page| depth == 0 || page.depth_below(namespace) <= depth)
            .cloned()
            .collect())
    }

    fn is_hidden(&self, page: &PageId) -> bool {
        rw_read(&self.state, SOURCE, "is_hidden")
            .hidden
            .contains(page)
    }
}

impl AccessControl for MemoryWiki {
    fn check(&self, page: &PageId, viewer: &Viewer) -> Permission {
        let state = rw_read(&self.state, SOURCE, "check");
        state
            .rules
            .iter()
            .filter_map(|rule| rule.matches(page, viewer).map(|rank| (rank, rule.permission)))
            .max_by_key(|(rank, _)| *rank)
            .map(|(_, permission)| permission)
            .unwrap_or(state.default_permission)
    }
}

impl MetadataStore for MemoryWiki {
    fn get(
        &self,
        page: &PageId,
        key: &str,
        _mode: MetadataMode,
    ) -> Result<Option<Value>, StoreError> {
        Ok(rw_read(&self.state, SOURCE, "get_meta")
            .metadata
            .get(page)
            .and_then(|values| values.get(key))
            .cloned())
    }

    fn set(&self, page: &PageId, key: &str, value: Value) -> Result<(), StoreError> {
        self.put_meta(page, key, value);
        Ok(())
    }
}

impl TagIndex for MemoryWiki {
    fn pages_by_tag(&self, tag: &str) -> Result<Vec<PageId>, StoreError> {
        let tag = tag.trim().to_lowercase();
        let state = rw_read(&self.state, SOURCE, "pages_by_tag");
        Ok(state
            .metadata
            .iter()
            .filter(|(page, _)| state.pages.contains_key(*page))
            .filter(|(_, values)| {
                values
                    .get(meta_keys::TAGS)
                    .map(value_as_tags)
                    .unwrap_or_default()
                    .iter()
                    .any(|candidate| candidate.to_lowercase() == tag)
            })
            .map(|(page, _)| page.clone())
            .collect())
    }
}
