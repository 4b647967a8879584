//! Compiled page instructions.
//!
//! A page is compiled by the host into a flat sequence of instructions. Nesting
//! is implicit: sections are delimited by heading levels and paired
//! open/close instructions, never by an explicit tree.

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use super::directive::IncludeDirective;
use super::page_id::PageId;

/// Deepest heading level the renderer understands.
pub const MAX_HEADING_LEVEL: u8 = 5;

/// One operation in a compiled page.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Instruction {
    pub kind: InstructionKind,
    /// Byte offset in the page source, when known.
    pub position: Option<usize>,
}

impl Instruction {
    pub fn new(kind: InstructionKind) -> Self {
        Self {
            kind,
            position: None,
        }
    }

    pub fn at(kind: InstructionKind, position: usize) -> Self {
        Self {
            kind,
            position: Some(position),
        }
    }

    pub fn header(title: impl Into<String>, level: u8) -> Self {
        Self::new(InstructionKind::Header {
            title: title.into(),
            level,
            source: None,
        })
    }

    pub fn text(text: impl Into<String>) -> Self {
        Self::new(InstructionKind::Cdata { text: text.into() })
    }

    pub fn plugin(call: PluginCall) -> Self {
        Self::new(InstructionKind::Plugin(call))
    }

    /// Heading level when this is a header instruction.
    pub fn heading_level(&self) -> Option<u8> {
        match &self.kind {
            InstructionKind::Header { level, .. } => Some(*level),
            _ => None,
        }
    }

    pub fn is_header(&self) -> bool {
        matches!(self.kind, InstructionKind::Header { .. })
    }

    pub fn include_directive(&self) -> Option<&IncludeDirective> {
        match &self.kind {
            InstructionKind::Plugin(PluginCall::Include(directive)) => Some(directive),
            _ => None,
        }
    }
}

/// Identity of a heading that was relocated from another page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HeadingSource {
    pub page: PageId,
    /// Identifier of the heading within its own page.
    pub identifier: String,
}

/// Closed set of instruction opcodes with their argument shapes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum InstructionKind {
    DocumentStart,
    DocumentEnd,
    Header {
        title: String,
        level: u8,
        source: Option<HeadingSource>,
    },
    SectionOpen {
        level: u8,
    },
    SectionClose,
    ParagraphOpen,
    ParagraphClose,
    Cdata {
        text: String,
    },
    Eol,
    Linebreak,
    Hr,
    InternalLink {
        target: String,
        title: Option<String>,
    },
    /// Same-document link. `scope` names the page whose identifier space
    /// `hash` belongs to until identifiers are finalized.
    LocalLink {
        hash: String,
        title: Option<String>,
        scope: Option<PageId>,
    },
    ExternalLink {
        url: String,
        title: Option<String>,
    },
    InternalMedia {
        src: String,
        title: Option<String>,
        align: Option<String>,
        width: Option<u32>,
        height: Option<u32>,
    },
    ExternalMedia {
        src: String,
        title: Option<String>,
    },
    Plugin(PluginCall),
}

/// Plugin instructions emitted or consumed by the include machinery.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum PluginCall {
    /// Unresolved inclusion directive.
    Include(IncludeDirective),
    /// Boundary marker around included content. Inert for document structure.
    Wrap(WrapMarker),
    Readmore {
        page: PageId,
    },
    EditButton {
        page: PageId,
        title: String,
    },
    Footer(Box<FooterInfo>),
    /// Ends the last open section-edit region at `end_position`.
    CloseLastSectionEdit {
        end_position: Option<usize>,
    },
    Notice(Notice),
    /// Call owned by another plugin, passed through untouched.
    Other {
        name: String,
        data: Vec<String>,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum WrapMarker {
    Open {
        page: PageId,
        anchor: String,
        redirect: bool,
        section: Option<String>,
    },
    Close {
        page: PageId,
    },
}

/// Data the renderer needs to build the footer below an included page.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FooterInfo {
    pub page: PageId,
    pub section_title: Option<String>,
    pub level: u8,
    pub permalink: bool,
    #[serde(with = "time::serde::rfc3339::option")]
    pub created: Option<OffsetDateTime>,
    #[serde(with = "time::serde::rfc3339::option")]
    pub modified: Option<OffsetDateTime>,
    pub author: Option<String>,
    pub comments: Option<u32>,
    pub linkbacks: Option<u32>,
    pub tags: Vec<String>,
}

/// Visible placeholder for a recovered anomaly.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notice {
    pub kind: NoticeKind,
    pub message: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NoticeKind {
    PageNotFound,
    SectionNotFound,
    MalformedDirective,
    TagIndexUnavailable,
}

impl Notice {
    pub fn new(kind: NoticeKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn into_instruction(self) -> Instruction {
        Instruction::plugin(PluginCall::Notice(self))
    }
}

/// Clamp a computed heading level into the renderable range.
pub fn clamp_level(level: i32) -> u8 {
    level.clamp(1, i32::from(MAX_HEADING_LEVEL)) as u8
}
