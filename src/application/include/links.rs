//! Link rewriting for transcluded content.
//!
//! Included instructions were compiled relative to their own page, so
//! relative links and media must be resolved against that page's namespace
//! before they land in another document. Links to pages that end up inside
//! the same document are turned into same-document links, scoped to the page
//! whose identifier space they address; [`relocate_links`] later maps them to
//! the identifiers allocated for the final document.

use std::collections::{BTreeSet, HashMap};

use tracing::debug;
use url::Url;

use crate::domain::instructions::{Instruction, InstructionKind};
use crate::domain::page_id::PageId;
use crate::domain::slug::derive_identifier;

/// Where the instructions being rewritten come from.
#[derive(Debug, Clone, Copy)]
pub struct LinkContext<'a> {
    pub source: &'a PageId,
    /// Pages spliced into the document being rendered.
    pub included: &'a BTreeSet<PageId>,
}

/// Rewrite the links of instructions that originate from `context.source`.
pub fn rewrite(instructions: Vec<Instruction>, context: &LinkContext<'_>) -> Vec<Instruction> {
    instructions
        .into_iter()
        .map(|instruction| Instruction {
            kind: rewrite_kind(instruction.kind, context),
            position: instruction.position,
        })
        .collect()
}

fn rewrite_kind(kind: InstructionKind, context: &LinkContext<'_>) -> InstructionKind {
    match kind {
        InstructionKind::InternalLink { target, title } => {
            rewrite_internal_link(target, title, context)
        }
        InstructionKind::LocalLink {
            hash,
            title,
            scope: None,
        } => InstructionKind::LocalLink {
            hash: derive_identifier(&hash),
            title,
            scope: Some(context.source.clone()),
        },
        InstructionKind::InternalMedia {
            src,
            title,
            align,
            width,
            height,
        } => InstructionKind::InternalMedia {
            src: resolve_media(&src, context.source),
            title,
            align,
            width,
            height,
        },
        other => other,
    }
}

fn rewrite_internal_link(
    target: String,
    title: Option<String>,
    context: &LinkContext<'_>,
) -> InstructionKind {
    if is_external(&target) || target.contains('>') {
        return InstructionKind::InternalLink { target, title };
    }

    let (rest, hash) = match target.split_once('#') {
        Some((rest, hash)) => (rest, Some(hash.trim())),
        None => (target.as_str(), None),
    };
    let (page_part, query) = match rest.split_once('?') {
        Some((page, query)) => (page.trim(), Some(query)),
        None => (rest.trim(), None),
    };

    if page_part.is_empty() {
        return match (hash, query) {
            (Some(hash), None) => InstructionKind::LocalLink {
                hash: derive_identifier(hash),
                title,
                scope: Some(context.source.clone()),
            },
            _ => InstructionKind::InternalLink {
                target: join_target(context.source, query, hash),
                title,
            },
        };
    }

    let resolved = PageId::resolve(page_part, context.source.namespace());

    if query.is_none() && context.included.contains(&resolved) {
        let hash = match hash.filter(|hash| !hash.is_empty()) {
            Some(hash) => derive_identifier(hash),
            None => resolved.wrapper_anchor(),
        };
        debug!(
            target = "application::include::links",
            source = %context.source,
            page = %resolved,
            hash = %hash,
            "Link to included page kept in document"
        );
        return InstructionKind::LocalLink {
            hash,
            title,
            scope: Some(resolved),
        };
    }

    InstructionKind::InternalLink {
        target: join_target(&resolved, query, hash),
        title,
    }
}

fn resolve_media(src: &str, source: &PageId) -> String {
    if is_external(src) {
        return src.to_string();
    }
    match src.split_once('?') {
        Some((path, query)) => format!(
            "{}?{query}",
            PageId::resolve(path, source.namespace())
        ),
        None => PageId::resolve(src, source.namespace()).to_string(),
    }
}

fn join_target(page: &PageId, query: Option<&str>, hash: Option<&str>) -> String {
    let mut target = page.to_string();
    if let Some(query) = query {
        target.push('?');
        target.push_str(query);
    }
    if let Some(hash) = hash.filter(|hash| !hash.is_empty()) {
        target.push('#');
        target.push_str(hash);
    }
    target
}

/// URLs with a host (`https://…`, `ftp://…`) never address wiki pages. Page
/// ids such as `wiki:page` parse as URLs too, but without a host.
fn is_external(target: &str) -> bool {
    Url::parse(target).is_ok_and(|url| url.has_host())
}

/// Page-local identifiers mapped to identifiers of the final document.
#[derive(Debug, Clone, Default)]
pub struct RelocationMap {
    identifiers: HashMap<PageId, HashMap<String, String>>,
}

impl RelocationMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a mapping. When a page is included twice the first copy wins.
    pub fn insert(&mut self, page: &PageId, local: &str, relocated: &str) {
        self.identifiers
            .entry(page.clone())
            .or_default()
            .entry(local.to_string())
            .or_insert_with(|| relocated.to_string());
    }

    pub fn get(&self, page: &PageId, local: &str) -> Option<&str> {
        self.identifiers
            .get(page)
            .and_then(|identifiers| identifiers.get(local))
            .map(String::as_str)
    }
}

/// Resolve scoped same-document links against the final identifiers. Links
/// whose target did not make it into the document point at the page again.
pub fn relocate_links(instructions: Vec<Instruction>, map: &RelocationMap) -> Vec<Instruction> {
    instructions
        .into_iter()
        .map(|instruction| {
            let kind = match instruction.kind {
                InstructionKind::LocalLink {
                    hash,
                    title,
                    scope: Some(page),
                } => match map.get(&page, &hash) {
                    Some(relocated) => InstructionKind::LocalLink {
                        hash: relocated.to_string(),
                        title,
                        scope: None,
                    },
                    None if hash == page.wrapper_anchor() => InstructionKind::InternalLink {
                        target: page.to_string(),
                        title,
                    },
                    None => InstructionKind::InternalLink {
                        target: format!("{page}#{hash}"),
                        title,
                    },
                },
                other => other,
            };
            Instruction {
                kind,
                position: instruction.position,
            }
        })
        .collect()
}
