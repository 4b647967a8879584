use serde::Serialize;
use thiserror::Error;

use super::page_id::PageId;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum DomainError {
    #[error("page `{page}` is already part of the inclusion chain")]
    Cycle { page: PageId },
    #[error("inclusion depth limit of {limit} reached at `{page}`")]
    DepthExceeded { page: PageId, limit: usize },
    #[error("domain validation failed: {message}")]
    Validation { message: String },
}

impl DomainError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }
}

/// Anomalies recovered during a render. None of them aborts the render.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DiagnosticKind {
    PageNotFound,
    SectionNotFound,
    CycleDetected,
    DepthExceeded,
    AccessDenied,
    MalformedDirective,
    InconsistentToc,
    TagIndexUnavailable,
    StoreFailure,
}

impl DiagnosticKind {
    pub fn as_str(self) -> &'static str {
        match self {
            DiagnosticKind::PageNotFound => "page_not_found",
            DiagnosticKind::SectionNotFound => "section_not_found",
            DiagnosticKind::CycleDetected => "cycle_detected",
            DiagnosticKind::DepthExceeded => "depth_exceeded",
            DiagnosticKind::AccessDenied => "access_denied",
            DiagnosticKind::MalformedDirective => "malformed_directive",
            DiagnosticKind::InconsistentToc => "inconsistent_toc",
            DiagnosticKind::TagIndexUnavailable => "tag_index_unavailable",
            DiagnosticKind::StoreFailure => "store_failure",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Diagnostic {
    pub kind: DiagnosticKind,
    pub page: Option<PageId>,
    pub message: String,
}

impl Diagnostic {
    pub fn new(kind: DiagnosticKind, page: Option<PageId>, message: impl Into<String>) -> Self {
        Self {
            kind,
            page,
            message: message.into(),
        }
    }
}

impl From<&DomainError> for Diagnostic {
    fn from(error: &DomainError) -> Self {
        match error {
            DomainError::Cycle { page } => Diagnostic::new(
                DiagnosticKind::CycleDetected,
                Some(page.clone()),
                error.to_string(),
            ),
            DomainError::DepthExceeded { page, .. } => Diagnostic::new(
                DiagnosticKind::DepthExceeded,
                Some(page.clone()),
                error.to_string(),
            ),
            DomainError::Validation { .. } => {
                Diagnostic::new(DiagnosticKind::MalformedDirective, None, error.to_string())
            }
        }
    }
}
