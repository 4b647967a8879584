use serde::Serialize;

use super::error::DomainError;
use super::page_id::PageId;

/// A page taking part in an inclusion chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PageRef {
    pub id: PageId,
    pub exists: bool,
    pub parent: Option<PageId>,
}

/// Pages currently being expanded, outermost first.
///
/// A page already on the stack is never pushed again, which is what stops
/// inclusion cycles. The explicit depth limit additionally bounds long but
/// acyclic chains.
#[derive(Debug, Clone)]
pub struct AncestorStack {
    frames: Vec<PageRef>,
    max_depth: usize,
}

impl AncestorStack {
    pub fn new(root: PageId, max_depth: usize) -> Self {
        Self {
            frames: vec![PageRef {
                id: root,
                exists: true,
                parent: None,
            }],
            max_depth,
        }
    }

    pub fn contains(&self, page: &PageId) -> bool {
        self.frames.iter().any(|frame| &frame.id == page)
    }

    /// Number of nested inclusions below the root page.
    pub fn depth(&self) -> usize {
        self.frames.len().saturating_sub(1)
    }

    pub fn current(&self) -> Option<&PageRef> {
        self.frames.last()
    }

    pub fn root(&self) -> Option<&PageRef> {
        self.frames.first()
    }

    pub fn push(&mut self, page: PageId, exists: bool) -> Result<(), DomainError> {
        if self.contains(&page) {
            return Err(DomainError::Cycle { page });
        }
        if self.depth() >= self.max_depth {
            return Err(DomainError::DepthExceeded {
                page,
                limit: self.max_depth,
            });
        }

        let parent = self.current().map(|frame| frame.id.clone());
        self.frames.push(PageRef {
            id: page,
            exists,
            parent,
        });
        Ok(())
    }

    /// Pop the innermost page. The root frame is never removed.
    pub fn pop(&mut self) -> Option<PageRef> {
        if self.frames.len() > 1 {
            self.frames.pop()
        } else {
            None
        }
    }

    pub fn ids(&self) -> impl Iterator<Item = &PageId> {
        self.frames.iter().map(|frame| &frame.id)
    }
}
