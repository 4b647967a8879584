//! Section inclusion engine.
//!
//! [`IncludeEngine::render`] runs one render pass for a page:
//!
//! 1. prescan: find every page the render will splice in, so links to them
//!    can stay inside the document,
//! 2. expand: resolve include directives recursively ([`resolver`]),
//! 3. finalize: allocate final heading identifiers over the whole stream,
//!    relocate same-document links and aggregate the TOC ([`toc`]),
//! 4. persist: store the unfiltered TOC and the included pages as metadata
//!    of the rendered page (skipped for previews). In safe-index mode pages
//!    anonymous viewers cannot read are left out.

use std::collections::{BTreeSet, HashMap, HashSet, VecDeque};
use std::sync::Arc;

use serde::Serialize;
use serde_json::{Map, Value};
use tracing::{debug, instrument, warn};
use uuid::Uuid;

use crate::application::context::{RenderContext, RenderRequest};
use crate::application::repos::{Collaborators, StoreError};
use crate::cache::{CacheConfig, CacheDependencySet, InstructionCache};
use crate::config::{IncludeSettings, Settings, TocSettings};
use crate::domain::directive::IncludeDirective;
use crate::domain::error::{Diagnostic, DiagnosticKind};
use crate::domain::headings::Toc;
use crate::domain::instructions::{Instruction, InstructionKind, PluginCall, WrapMarker};
use crate::domain::page_id::PageId;
use crate::domain::types::{Viewer, meta_keys};

pub mod links;
pub mod numbering;
pub mod pages;
pub mod resolver;
pub mod sections;
pub mod toc;

use links::RelocationMap;
use numbering::HeadingNormalizer;
use pages::PageSetResolver;
use resolver::IncludeResolver;
use sections::{ExtractOptions, annotate_sources, extract};
use toc::{IncludedHeadings, TocPolicy};

const TARGET: &str = "application::include";

/// Output of one render pass.
#[derive(Debug, Clone, Serialize)]
pub struct RenderedPage {
    pub page: PageId,
    pub pass_id: Uuid,
    pub instructions: Vec<Instruction>,
    /// Every heading of the expanded page, unfiltered.
    pub toc: Toc,
    /// The TOC as configured for display.
    pub display_toc: Toc,
    pub dependencies: CacheDependencySet,
    pub diagnostics: Vec<Diagnostic>,
}

pub struct IncludeEngine {
    collaborators: Collaborators,
    include: IncludeSettings,
    toc: TocSettings,
    cache: Option<Arc<InstructionCache>>,
}

impl IncludeEngine {
    pub fn new(collaborators: Collaborators, settings: &Settings) -> Self {
        let cache_config = CacheConfig::from(&settings.cache);
        let cache = cache_config
            .is_enabled()
            .then(|| Arc::new(InstructionCache::new(&cache_config)));

        Self {
            collaborators,
            include: settings.include.clone(),
            toc: settings.toc.clone(),
            cache,
        }
    }

    /// Share an instruction cache between engines.
    pub fn with_cache(mut self, cache: Arc<InstructionCache>) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn without_cache(mut self) -> Self {
        self.cache = None;
        self
    }

    pub fn cache(&self) -> Option<&Arc<InstructionCache>> {
        self.cache.as_ref()
    }

    pub fn toc_policy(&self) -> TocPolicy {
        TocPolicy::from(&self.toc)
    }

    /// Sidebar view of `toc`, optionally limited to the subtree at `start`.
    pub fn display_toc(&self, toc: &Toc, start: Option<&str>, depth_limit: Option<u8>) -> Toc {
        toc::filter(toc, &self.toc_policy(), start, depth_limit)
    }

    /// Render `request.page` from the page store.
    #[instrument(skip_all, fields(page = %request.page))]
    pub fn render(&self, request: &RenderRequest) -> RenderedPage {
        let mut ctx = self.context(request);
        let exists = self.collaborators.pages.exists(&request.page);
        ctx.dependencies.record_page(&request.page, exists);

        let source = match self.resolver().load(&request.page) {
            Ok(instructions) => Vec::clone(&instructions),
            Err(StoreError::NotFound(page)) => {
                ctx.report(
                    DiagnosticKind::PageNotFound,
                    Some(&page),
                    format!("page `{page}` does not exist"),
                );
                Vec::new()
            }
            Err(err) => {
                warn!(
                    target = TARGET,
                    page = %request.page,
                    error = %err,
                    "Failed to load page"
                );
                ctx.report(DiagnosticKind::StoreFailure, Some(&request.page), err.to_string());
                Vec::new()
            }
        };

        self.run(source, ctx)
    }

    /// Render an instruction stream the host compiled for `request.page`.
    #[instrument(skip_all, fields(page = %request.page))]
    pub fn render_instructions(
        &self,
        request: &RenderRequest,
        instructions: Vec<Instruction>,
    ) -> RenderedPage {
        let ctx = self.context(request);
        self.run(instructions, ctx)
    }

    fn context(&self, request: &RenderRequest) -> RenderContext {
        RenderContext::new(
            request,
            self.include.max_depth,
            HeadingNormalizer::new(self.toc.numbering, self.toc.first_tier),
        )
    }

    fn resolver(&self) -> IncludeResolver<'_> {
        IncludeResolver::new(&self.collaborators, &self.include, self.cache.as_deref())
    }

    fn run(&self, mut source: Vec<Instruction>, mut ctx: RenderContext) -> RenderedPage {
        let root = ctx.root.clone();
        let resolver = self.resolver();

        annotate_sources(&mut source, &root, &ctx.normalizer);
        self.prescan(&source, &resolver, &mut ctx);

        let source = links::rewrite(
            source,
            &links::LinkContext {
                source: &root,
                included: &ctx.included,
            },
        );
        let expanded = resolver.expand(source, 0, &mut ctx);
        let Finalized {
            instructions,
            toc,
            origins,
        } = finalize(expanded, &mut ctx);

        if !ctx.preview {
            self.persist(&root, &toc, &origins, &mut ctx);
        }

        let display_toc = self.display_toc(&toc, None, None);
        debug!(
            target = TARGET,
            page = %root,
            pass_id = %ctx.pass_id,
            instructions = instructions.len(),
            headings = toc.len(),
            included = ctx.included.len(),
            diagnostics = ctx.diagnostics.len(),
            "Rendered page"
        );

        RenderedPage {
            page: root,
            pass_id: ctx.pass_id,
            instructions,
            toc,
            display_toc,
            dependencies: ctx.dependencies,
            diagnostics: ctx.diagnostics,
        }
    }

    /// Collect the pages this render is going to splice in. Only directives
    /// inside the extracted part of a page are followed. Cycles and missing
    /// sections are not considered, so the set may be larger than what ends
    /// up in the document; links into pages that never got wrapped are
    /// reverted when identifiers are finalized.
    fn prescan(&self, source: &[Instruction], resolver: &IncludeResolver<'_>, ctx: &mut RenderContext) {
        let pages = PageSetResolver::new(&self.collaborators, &self.include);
        let mut queue = VecDeque::from([(ctx.root.clone(), directives(source), 0usize)]);
        let mut scanned = HashSet::new();

        while let Some((parent, found, depth)) = queue.pop_front() {
            if depth >= self.include.max_depth {
                continue;
            }
            for directive in found {
                let Ok((flags, _)) = self.include.default_flags.clone().apply(&directive.flags)
                else {
                    continue;
                };
                if flags.link_only {
                    continue;
                }

                let set = pages.resolve(&directive, &flags, &parent, ctx);
                for page in set.pages.into_iter().filter(|page| page.exists) {
                    if page.id == ctx.root {
                        continue;
                    }
                    ctx.included.insert(page.id.clone());
                    let scan = (
                        page.id.clone(),
                        directive.section.clone(),
                        flags.first_section_only,
                    );
                    if !scanned.insert(scan) {
                        continue;
                    }
                    match resolver.load(&page.id) {
                        Ok(instructions) => {
                            let options = ExtractOptions {
                                first_section_only: flags.first_section_only,
                                inline: flags.inline,
                                stripped_plugins: &self.include.stripped_plugins,
                            };
                            let extraction = extract(
                                &instructions,
                                directive.section.as_deref(),
                                &options,
                                &ctx.normalizer,
                            );
                            let found = directives(&extraction.instructions);
                            queue.push_back((page.id, found, depth + 1));
                        }
                        Err(err) => debug!(
                            target = TARGET,
                            page = %page.id,
                            error = %err,
                            "Prescan could not load page"
                        ),
                    }
                }
            }
        }
    }

    fn persist(
        &self,
        root: &PageId,
        toc: &Toc,
        origins: &HashMap<String, PageId>,
        ctx: &mut RenderContext,
    ) {
        let redacted: BTreeSet<PageId> = if self.include.safe_index {
            let anonymous = Viewer::anonymous();
            ctx.dependencies
                .pages()
                .map(|(page, _)| page)
                .chain(origins.values())
                .filter(|page| {
                    *page != root
                        && !self
                            .collaborators
                            .access
                            .check(page, &anonymous)
                            .can_read()
                })
                .cloned()
                .collect()
        } else {
            BTreeSet::new()
        };
        if !redacted.is_empty() {
            debug!(
                target = TARGET,
                page = %root,
                redacted = ?redacted,
                "Leaving restricted pages out of render metadata"
            );
        }

        let parts: Map<String, Value> = ctx
            .dependencies
            .pages()
            .filter(|(page, existed)| *existed && *page != root && !redacted.contains(*page))
            .map(|(page, _)| (page.to_string(), Value::Bool(true)))
            .collect();

        let indexed = Toc::new(
            toc.iter()
                .filter(|entry| {
                    origins
                        .get(&entry.identifier)
                        .is_none_or(|page| !redacted.contains(page))
                })
                .cloned()
                .collect(),
        );

        let toc_value = match serde_json::to_value(&indexed) {
            Ok(value) => value,
            Err(err) => {
                ctx.report(DiagnosticKind::StoreFailure, Some(root), err.to_string());
                return;
            }
        };

        for (key, value) in [
            (meta_keys::TABLE_OF_CONTENTS, toc_value),
            (meta_keys::HAS_PART, Value::Object(parts)),
        ] {
            if let Err(err) = self.collaborators.metadata.set(root, key, value) {
                warn!(
                    target = TARGET,
                    page = %root,
                    key,
                    error = %err,
                    "Failed to persist render metadata"
                );
                ctx.report(DiagnosticKind::StoreFailure, Some(root), err.to_string());
            }
        }
    }
}

fn directives(instructions: &[Instruction]) -> Vec<IncludeDirective> {
    instructions
        .iter()
        .filter_map(Instruction::include_directive)
        .cloned()
        .collect()
}

struct Finalized {
    instructions: Vec<Instruction>,
    toc: Toc,
    /// Page each TOC entry comes from, by final identifier.
    origins: HashMap<String, PageId>,
}

/// Allocate final identifiers for every heading and wrapper of the expanded
/// stream, point same-document links at them and build the TOC.
fn finalize(instructions: Vec<Instruction>, ctx: &mut RenderContext) -> Finalized {
    let mut relocation = RelocationMap::new();
    let mut own = Vec::new();
    let mut included: Vec<IncludedHeadings> = Vec::new();
    let mut wrapped: Vec<PageId> = Vec::new();
    let mut origins = HashMap::new();
    let mut headers = 0usize;
    let mut finalized = Vec::with_capacity(instructions.len());

    for (index, mut instruction) in instructions.into_iter().enumerate() {
        match &mut instruction.kind {
            InstructionKind::Plugin(PluginCall::Wrap(WrapMarker::Open { page, anchor, .. })) => {
                let reserved = ctx.registry.reserve(anchor.clone());
                relocation.insert(page, anchor.as_str(), &reserved);
                *anchor = reserved;
                if wrapped.is_empty() {
                    included.push(IncludedHeadings {
                        insert_at: index,
                        entries: Vec::new(),
                    });
                }
                wrapped.push(page.clone());
            }
            InstructionKind::Plugin(PluginCall::Wrap(WrapMarker::Close { .. })) => {
                wrapped.pop();
            }
            InstructionKind::Header {
                title,
                level,
                source,
            } => {
                headers += 1;
                let entry =
                    ctx.normalizer
                        .entry(title, *level, instruction.position, &mut ctx.registry);
                let source = source.as_ref();
                if let Some(source) = source {
                    relocation.insert(&source.page, &source.identifier, &entry.identifier);
                }
                let origin = source
                    .map(|source| &source.page)
                    .or(wrapped.last())
                    .unwrap_or(&ctx.root);
                origins.insert(entry.identifier.clone(), origin.clone());
                match included.last_mut() {
                    Some(group) if !wrapped.is_empty() => group.entries.push(entry),
                    _ => own.push((index, entry)),
                }
            }
            _ => {}
        }
        finalized.push(instruction);
    }

    let finalized = links::relocate_links(finalized, &relocation);
    let toc = toc::aggregate(own, included);

    if toc.len() != headers {
        warn!(
            target = TARGET,
            page = %ctx.root,
            entries = toc.len(),
            headers,
            "TOC does not match the headings of the stream"
        );
        let root = ctx.root.clone();
        ctx.report(
            DiagnosticKind::InconsistentToc,
            Some(&root),
            format!("{} TOC entries for {headers} headings", toc.len()),
        );
    }

    Finalized {
        instructions: finalized,
        toc,
        origins,
    }
}
