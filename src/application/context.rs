//! Request-scoped render state.
//!
//! Everything that used to be ambient while expanding includes (the
//! identifier registry, numbering counters, the chain of pages being
//! expanded, recorded dependencies and diagnostics) lives in one
//! [`RenderContext`] that is created per render and threaded through
//! explicitly.

use std::collections::{BTreeSet, HashMap};

use time::OffsetDateTime;
use uuid::Uuid;

use crate::application::include::numbering::HeadingNormalizer;
use crate::application::include::pages::{PageSet, PageSetKey};
use crate::cache::CacheDependencySet;
use crate::domain::error::{Diagnostic, DiagnosticKind};
use crate::domain::page_id::PageId;
use crate::domain::pages::AncestorStack;
use crate::domain::slug::AllocationRegistry;
use crate::domain::types::Viewer;

/// What to render and for whom.
#[derive(Debug, Clone)]
pub struct RenderRequest {
    pub page: PageId,
    pub viewer: Viewer,
    /// Preview renders surface more notices and never write metadata.
    pub preview: bool,
    /// Clock used for date macros; defaults to the current time.
    pub now: Option<OffsetDateTime>,
}

impl RenderRequest {
    pub fn new(page: PageId) -> Self {
        Self {
            page,
            viewer: Viewer::anonymous(),
            preview: false,
            now: None,
        }
    }

    pub fn with_viewer(mut self, viewer: Viewer) -> Self {
        self.viewer = viewer;
        self
    }

    pub fn with_preview(mut self, preview: bool) -> Self {
        self.preview = preview;
        self
    }

    pub fn at(mut self, now: OffsetDateTime) -> Self {
        self.now = Some(now);
        self
    }
}

pub struct RenderContext {
    pub(crate) pass_id: Uuid,
    pub(crate) root: PageId,
    pub(crate) viewer: Viewer,
    pub(crate) preview: bool,
    pub(crate) now: OffsetDateTime,
    pub(crate) ancestors: AncestorStack,
    pub(crate) registry: AllocationRegistry,
    pub(crate) normalizer: HeadingNormalizer,
    pub(crate) dependencies: CacheDependencySet,
    pub(crate) diagnostics: Vec<Diagnostic>,
    /// Pages transitively included by the root; links to them stay local.
    pub(crate) included: BTreeSet<PageId>,
    pub(crate) page_sets: HashMap<PageSetKey, PageSet>,
}

impl RenderContext {
    pub fn new(request: &RenderRequest, max_depth: usize, normalizer: HeadingNormalizer) -> Self {
        Self {
            pass_id: Uuid::new_v4(),
            root: request.page.clone(),
            viewer: request.viewer.clone(),
            preview: request.preview,
            now: request.now.unwrap_or_else(OffsetDateTime::now_utc),
            ancestors: AncestorStack::new(request.page.clone(), max_depth),
            registry: AllocationRegistry::new(),
            normalizer,
            dependencies: CacheDependencySet::new(request.page.clone()),
            diagnostics: Vec::new(),
            included: BTreeSet::new(),
            page_sets: HashMap::new(),
        }
    }

    pub fn pass_id(&self) -> Uuid {
        self.pass_id
    }

    pub fn root(&self) -> &PageId {
        &self.root
    }

    pub fn viewer(&self) -> &Viewer {
        &self.viewer
    }

    pub fn is_preview(&self) -> bool {
        self.preview
    }

    pub fn now(&self) -> OffsetDateTime {
        self.now
    }

    /// Page whose content is currently being expanded.
    pub fn current_page(&self) -> &PageId {
        self.ancestors
            .current()
            .map_or(&self.root, |frame| &frame.id)
    }

    pub fn diagnostics(&self) -> &[Diagnostic] {
        &self.diagnostics
    }

    pub(crate) fn report(
        &mut self,
        kind: DiagnosticKind,
        page: Option<&PageId>,
        message: impl Into<String>,
    ) {
        self.diagnostics
            .push(Diagnostic::new(kind, page.cloned(), message));
    }
}
