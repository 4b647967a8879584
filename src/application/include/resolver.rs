//! Recursive inclusion resolver.
//!
//! [`IncludeResolver::expand`] walks an instruction stream and replaces every
//! include directive with the content it selects. Each included page goes
//! through the same steps: guard against cycles and excessive depth, fetch,
//! extract, re-level, rewrite links, recurse, wrap.

use std::sync::Arc;

use metrics::counter;
use tracing::{debug, warn};

use crate::application::context::RenderContext;
use crate::application::repos::{Collaborators, StoreError};
use crate::cache::InstructionCache;
use crate::config::IncludeSettings;
use crate::domain::directive::{FlagSet, IncludeDirective};
use crate::domain::error::{DiagnosticKind, DomainError};
use crate::domain::instructions::{
    FooterInfo, Instruction, InstructionKind, MAX_HEADING_LEVEL, Notice, NoticeKind, PluginCall,
    WrapMarker, clamp_level,
};
use crate::domain::page_id::PageId;
use crate::domain::types::{
    MetadataMode, meta_keys, value_as_f64, value_as_string, value_as_tags, value_as_timestamp,
};

use super::links::{self, LinkContext};
use super::pages::{PageSetResolver, ResolvedPage};
use super::sections::{ExtractOptions, annotate_sources, extract};

const TARGET: &str = "application::include::resolver";

pub(crate) const METRIC_RESOLVED: &str = "wikiweave_include_resolved_total";
pub(crate) const METRIC_CYCLE: &str = "wikiweave_include_cycle_total";
pub(crate) const METRIC_DEPTH: &str = "wikiweave_include_depth_exceeded_total";
pub(crate) const METRIC_MISSING: &str = "wikiweave_include_page_missing_total";

pub struct IncludeResolver<'a> {
    collaborators: &'a Collaborators,
    settings: &'a IncludeSettings,
    cache: Option<&'a InstructionCache>,
}

impl<'a> IncludeResolver<'a> {
    pub fn new(
        collaborators: &'a Collaborators,
        settings: &'a IncludeSettings,
        cache: Option<&'a InstructionCache>,
    ) -> Self {
        Self {
            collaborators,
            settings,
            cache,
        }
    }

    /// Replace every include directive in `instructions` with its content.
    /// `base_level` is the heading level in effect before the first header.
    pub fn expand(
        &self,
        instructions: Vec<Instruction>,
        base_level: u8,
        ctx: &mut RenderContext,
    ) -> Vec<Instruction> {
        let mut expanded = Vec::with_capacity(instructions.len());
        let mut level = base_level;

        for instruction in instructions {
            match instruction.kind {
                InstructionKind::Plugin(PluginCall::Include(directive)) => {
                    let at = directive.level.unwrap_or(level);
                    expanded.extend(self.resolve(&directive, at, instruction.position, ctx));
                }
                kind => {
                    if let InstructionKind::Header { level: header, .. } = &kind {
                        level = *header;
                    }
                    expanded.push(Instruction {
                        kind,
                        position: instruction.position,
                    });
                }
            }
        }
        expanded
    }

    /// Content of one directive found at heading level `level`.
    pub fn resolve(
        &self,
        directive: &IncludeDirective,
        level: u8,
        position: Option<usize>,
        ctx: &mut RenderContext,
    ) -> Vec<Instruction> {
        let parent = ctx.current_page().clone();

        let flags = match self.settings.default_flags.clone().apply(&directive.flags) {
            Ok((flags, unknown)) => {
                if !unknown.is_empty() {
                    debug!(
                        target = TARGET,
                        page = %parent,
                        flags = ?unknown,
                        "Ignoring unknown include flags"
                    );
                }
                flags
            }
            Err(err) => {
                ctx.report(DiagnosticKind::MalformedDirective, Some(&parent), err.to_string());
                return if ctx.preview {
                    vec![at_position(
                        Notice::new(NoticeKind::MalformedDirective, err.to_string())
                            .into_instruction(),
                        position,
                    )]
                } else {
                    Vec::new()
                };
            }
        };

        let set = PageSetResolver::new(self.collaborators, self.settings)
            .resolve(directive, &flags, &parent, ctx);

        let mut output = Vec::new();
        if let Some(notice) = set.notice {
            output.push(at_position(notice.into_instruction(), position));
        }
        for page in &set.pages {
            output.extend(self.include_page(directive, &flags, page, level, position, ctx));
        }
        output
    }

    fn include_page(
        &self,
        directive: &IncludeDirective,
        flags: &FlagSet,
        page: &ResolvedPage,
        level: u8,
        position: Option<usize>,
        ctx: &mut RenderContext,
    ) -> Vec<Instruction> {
        ctx.dependencies.record_page(&page.id, page.exists);

        if flags.link_only {
            return self.page_link(&page.id, flags, ctx);
        }

        if ctx.ancestors.contains(&page.id) {
            counter!(METRIC_CYCLE).increment(1);
            debug!(
                target = TARGET,
                page = %page.id,
                chain = ?ctx.ancestors.ids().collect::<Vec<_>>(),
                "Skipping recursive inclusion"
            );
            ctx.report(
                DiagnosticKind::CycleDetected,
                Some(&page.id),
                format!("`{}` is already being included", page.id),
            );
            return Vec::new();
        }

        if !page.exists {
            counter!(METRIC_MISSING).increment(1);
            ctx.report(
                DiagnosticKind::PageNotFound,
                Some(&page.id),
                format!("page `{}` does not exist", page.id),
            );
            if flags.page_exists {
                return Vec::new();
            }
            return vec![at_position(
                Notice::new(
                    NoticeKind::PageNotFound,
                    format!("page `{}` not found", page.id),
                )
                .into_instruction(),
                position,
            )];
        }

        if let Err(err) = ctx.ancestors.push(page.id.clone(), true) {
            if let DomainError::DepthExceeded { limit, .. } = &err {
                counter!(METRIC_DEPTH).increment(1);
                warn!(
                    target = TARGET,
                    page = %page.id,
                    limit,
                    "Include depth limit reached"
                );
            }
            let kind = match &err {
                DomainError::Cycle { .. } => DiagnosticKind::CycleDetected,
                _ => DiagnosticKind::DepthExceeded,
            };
            ctx.report(kind, Some(&page.id), err.to_string());
            return Vec::new();
        }

        let output = self.splice(directive, flags, &page.id, level, position, ctx);
        ctx.ancestors.pop();
        output
    }

    /// Steps that run while `page` is on the ancestor stack.
    fn splice(
        &self,
        directive: &IncludeDirective,
        flags: &FlagSet,
        page: &PageId,
        level: u8,
        position: Option<usize>,
        ctx: &mut RenderContext,
    ) -> Vec<Instruction> {
        let mut source = match self.load(page) {
            Ok(instructions) => Vec::clone(&instructions),
            Err(err) => {
                warn!(target = TARGET, page = %page, error = %err, "Failed to load included page");
                ctx.report(DiagnosticKind::StoreFailure, Some(page), err.to_string());
                return Vec::new();
            }
        };
        annotate_sources(&mut source, page, &ctx.normalizer);

        let options = ExtractOptions {
            first_section_only: flags.first_section_only,
            inline: flags.inline,
            stripped_plugins: &self.settings.stripped_plugins,
        };
        let section = directive.section.as_deref();
        let extraction = extract(&source, section, &options, &ctx.normalizer);

        if !extraction.found {
            ctx.report(
                DiagnosticKind::SectionNotFound,
                Some(page),
                format!("section `{}` not found", section.unwrap_or_default()),
            );
            return if ctx.preview {
                extraction.instructions
            } else {
                Vec::new()
            };
        }

        let delta = i32::from(level) - i32::from(extraction.section_level)
            + i32::from(flags.indent);
        let mut content = shift_levels(extraction.instructions, delta);

        // the root heading stays as an anchor target
        match content.first_mut().map(|first| &mut first.kind) {
            Some(InstructionKind::Header { title, .. }) if !flags.header => title.clear(),
            _ => {}
        }

        let content = links::rewrite(
            content,
            &LinkContext {
                source: page,
                included: &ctx.included,
            },
        );

        let root_level = clamp_level(i32::from(extraction.section_level) + delta);
        let content = self.expand(content, level.max(root_level), ctx);

        let mut output = Vec::with_capacity(content.len() + 6);
        output.push(at_position(
            Instruction::plugin(PluginCall::Wrap(WrapMarker::Open {
                page: page.clone(),
                anchor: page.wrapper_anchor(),
                redirect: flags.redirect,
                section: directive.section.clone(),
            })),
            position,
        ));
        output.extend(content);

        if flags.first_section_only && flags.readmore && extraction.truncated {
            output.push(Instruction::plugin(PluginCall::Readmore { page: page.clone() }));
        }
        if flags.edit_button
            && self
                .collaborators
                .access
                .check(page, &ctx.viewer)
                .can_edit()
        {
            output.push(Instruction::plugin(PluginCall::EditButton {
                page: page.clone(),
                title: directive
                    .section
                    .clone()
                    .unwrap_or_else(|| page.to_string()),
            }));
        }
        if flags.footer {
            let footer = self.footer(directive, flags, page, root_level, ctx);
            output.push(Instruction::plugin(PluginCall::Footer(Box::new(footer))));
        }

        output.push(Instruction::plugin(PluginCall::CloseLastSectionEdit {
            end_position: position,
        }));
        output.push(Instruction::plugin(PluginCall::Wrap(WrapMarker::Close {
            page: page.clone(),
        })));

        counter!(METRIC_RESOLVED).increment(1);
        debug!(
            target = TARGET,
            page = %page,
            level,
            delta,
            instructions = output.len(),
            "Included page"
        );
        output
    }

    /// Compiled instructions of `page`, through the instruction cache when
    /// one is configured.
    pub(crate) fn load(&self, page: &PageId) -> Result<Arc<Vec<Instruction>>, StoreError> {
        let Some(cache) = self.cache else {
            return self.collaborators.pages.instructions(page).map(Arc::new);
        };

        let modified = self.collaborators.pages.modified(page);
        if let Some(hit) = cache.get(page, modified) {
            return Ok(hit);
        }
        let instructions = self.collaborators.pages.instructions(page)?;
        Ok(cache.put(page.clone(), modified, instructions))
    }

    fn page_link(&self, page: &PageId, flags: &FlagSet, ctx: &mut RenderContext) -> Vec<Instruction> {
        let title = if flags.title {
            ctx.dependencies.record_metadata(page);
            self.meta(page, meta_keys::TITLE)
                .as_ref()
                .and_then(value_as_string)
        } else {
            None
        };

        let link = Instruction::new(InstructionKind::InternalLink {
            target: page.to_string(),
            title,
        });
        if flags.paragraph_links {
            vec![
                Instruction::new(InstructionKind::ParagraphOpen),
                link,
                Instruction::new(InstructionKind::ParagraphClose),
            ]
        } else {
            vec![link, Instruction::new(InstructionKind::Linebreak)]
        }
    }

    fn footer(
        &self,
        directive: &IncludeDirective,
        flags: &FlagSet,
        page: &PageId,
        level: u8,
        ctx: &mut RenderContext,
    ) -> FooterInfo {
        ctx.dependencies.record_metadata(page);

        let created = flags
            .date
            .then(|| self.meta(page, meta_keys::CREATED))
            .flatten()
            .as_ref()
            .and_then(value_as_timestamp);
        let modified = flags
            .modified_date
            .then(|| {
                self.meta(page, meta_keys::MODIFIED)
                    .as_ref()
                    .and_then(value_as_timestamp)
                    .or_else(|| self.collaborators.pages.modified(page))
            })
            .flatten();
        let author = flags
            .user
            .then(|| self.meta(page, meta_keys::CREATOR))
            .flatten()
            .as_ref()
            .and_then(value_as_string);
        let comments = flags
            .comments
            .then(|| self.count(page, meta_keys::COMMENTS))
            .flatten();
        let linkbacks = flags
            .linkbacks
            .then(|| self.count(page, meta_keys::LINKBACKS))
            .flatten();
        let tags = if flags.tags {
            self.meta(page, meta_keys::TAGS)
                .as_ref()
                .map(value_as_tags)
                .unwrap_or_default()
        } else {
            Vec::new()
        };

        FooterInfo {
            page: page.clone(),
            section_title: directive.section.clone(),
            level,
            permalink: flags.permalink,
            created,
            modified,
            author,
            comments,
            linkbacks,
            tags,
        }
    }

    fn count(&self, page: &PageId, key: &str) -> Option<u32> {
        self.meta(page, key)
            .as_ref()
            .and_then(value_as_f64)
            .filter(|count| *count >= 0.0)
            .map(|count| count as u32)
    }

    fn meta(&self, page: &PageId, key: &str) -> Option<serde_json::Value> {
        self.collaborators
            .metadata
            .get(page, key, MetadataMode::Simple)
            .unwrap_or_else(|err| {
                warn!(target = TARGET, page = %page, key, error = %err, "Metadata lookup failed");
                None
            })
    }
}

/// Move headings, section markers and nested directives by `delta` levels.
fn shift_levels(instructions: Vec<Instruction>, delta: i32) -> Vec<Instruction> {
    if delta == 0 {
        return instructions;
    }

    instructions
        .into_iter()
        .map(|mut instruction| {
            match &mut instruction.kind {
                InstructionKind::Header { level, .. } | InstructionKind::SectionOpen { level } => {
                    *level = clamp_level(i32::from(*level) + delta);
                }
                InstructionKind::Plugin(PluginCall::Include(directive)) => {
                    directive.level = directive.level.map(|level| {
                        (i32::from(level) + delta).clamp(0, i32::from(MAX_HEADING_LEVEL)) as u8
                    });
                }
                _ => {}
            }
            instruction
        })
        .collect()
}

fn at_position(mut instruction: Instruction, position: Option<usize>) -> Instruction {
    instruction.position = position;
    instruction
}
