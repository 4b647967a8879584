//! Section location and extraction.
//!
//! A section is not stored anywhere: it starts at a header instruction and
//! ends right before the next header at the same or a shallower level (or at
//! the end of the stream). Extraction runs as a fixed pipeline over a page's
//! instructions: locate the range, strip noise, cut to the first section
//! when asked, then make sure the result starts with a heading.

use crate::domain::instructions::{
    HeadingSource, Instruction, InstructionKind, Notice, NoticeKind, PluginCall,
};
use crate::domain::page_id::PageId;
use crate::domain::slug::{AllocationRegistry, derive_identifier};

use super::numbering::HeadingNormalizer;

#[derive(Debug, Clone, Copy, Default)]
pub struct ExtractOptions<'a> {
    pub first_section_only: bool,
    pub inline: bool,
    /// Foreign plugin calls dropped from the extracted content.
    pub stripped_plugins: &'a [String],
}

#[derive(Debug, Clone, PartialEq)]
pub struct Extraction {
    pub instructions: Vec<Instruction>,
    /// Level of the extracted root heading.
    pub section_level: u8,
    pub found: bool,
    /// Content was cut off by first-section-only extraction.
    pub truncated: bool,
}

impl Extraction {
    fn not_found(target: &str) -> Self {
        Self {
            instructions: vec![
                Notice::new(
                    NoticeKind::SectionNotFound,
                    format!("section `{target}` not found"),
                )
                .into_instruction(),
            ],
            section_level: 1,
            found: false,
            truncated: false,
        }
    }
}

/// Record on every header which page it comes from and the identifier it has
/// within that page.
pub fn annotate_sources(
    instructions: &mut [Instruction],
    page: &PageId,
    normalizer: &HeadingNormalizer,
) {
    let mut registry = AllocationRegistry::new();
    for instruction in instructions {
        if let InstructionKind::Header { title, source, .. } = &mut instruction.kind {
            let identifier = registry.allocate(normalizer.identifier_text(title));
            *source = Some(HeadingSource {
                page: page.clone(),
                identifier,
            });
        }
    }
}

/// Index of the header whose page-local identifier matches `target`.
pub fn locate(
    instructions: &[Instruction],
    target: &str,
    normalizer: &HeadingNormalizer,
) -> Option<usize> {
    let wanted = derive_identifier(normalizer.identifier_text(target));
    let mut registry = AllocationRegistry::new();

    instructions
        .iter()
        .enumerate()
        .filter_map(|(idx, instruction)| match &instruction.kind {
            InstructionKind::Header { title, .. } => Some((idx, title)),
            _ => None,
        })
        .find(|(_, title)| registry.allocate(normalizer.identifier_text(title)) == wanted)
        .map(|(idx, _)| idx)
}

/// End (exclusive) of the section whose header is at `start`.
pub fn section_boundary(instructions: &[Instruction], start: usize) -> usize {
    let Some(level) = instructions.get(start).and_then(Instruction::heading_level) else {
        return instructions.len();
    };

    instructions[start + 1..]
        .iter()
        .position(|instruction| {
            instruction
                .heading_level()
                .is_some_and(|other| other <= level)
        })
        .map_or(instructions.len(), |offset| start + 1 + offset)
}

/// Extract the whole page (`target == None`) or one section of it.
pub fn extract(
    instructions: &[Instruction],
    target: Option<&str>,
    options: &ExtractOptions<'_>,
    normalizer: &HeadingNormalizer,
) -> Extraction {
    let range = match target {
        Some(target) => match locate(instructions, target, normalizer) {
            Some(start) => &instructions[start..section_boundary(instructions, start)],
            None => return Extraction::not_found(target),
        },
        None => instructions,
    };

    let mut extracted = strip_noise(range, options);
    // a section is rooted at its own header; a whole page at its shallowest one
    let section_level = match target {
        Some(_) => extracted.iter().find_map(Instruction::heading_level),
        None => extracted.iter().filter_map(Instruction::heading_level).min(),
    }
    .unwrap_or(1);

    let truncated = options.first_section_only && cut_first_section(&mut extracted);

    if !options.inline && !extracted.is_empty() && !extracted[0].is_header() {
        extracted.insert(
            0,
            Instruction::new(InstructionKind::Header {
                title: String::new(),
                level: section_level,
                source: None,
            }),
        );
    }

    Extraction {
        instructions: extracted,
        section_level,
        found: true,
        truncated,
    }
}

fn strip_noise(range: &[Instruction], options: &ExtractOptions<'_>) -> Vec<Instruction> {
    let mut kept: Vec<Instruction> = range
        .iter()
        .filter(|instruction| match &instruction.kind {
            InstructionKind::DocumentStart | InstructionKind::DocumentEnd => false,
            InstructionKind::SectionOpen { .. } | InstructionKind::SectionClose => !options.inline,
            InstructionKind::Plugin(PluginCall::Other { name, .. }) => !options
                .stripped_plugins
                .iter()
                .any(|stripped| stripped.eq_ignore_ascii_case(name)),
            _ => true,
        })
        .cloned()
        .collect();

    if options.inline {
        if kept
            .first()
            .is_some_and(|first| first.kind == InstructionKind::ParagraphOpen)
        {
            kept.remove(0);
        }
        if kept
            .last()
            .is_some_and(|last| last.kind == InstructionKind::ParagraphClose)
        {
            kept.pop();
        }
    }
    kept
}

/// Keep only the content up to the second heading. Returns whether anything
/// besides section boundaries was cut.
fn cut_first_section(instructions: &mut Vec<Instruction>) -> bool {
    let Some(first) = instructions.iter().position(Instruction::is_header) else {
        return false;
    };
    let Some(offset) = instructions[first + 1..]
        .iter()
        .position(Instruction::is_header)
    else {
        return false;
    };

    let removed = instructions.split_off(first + 1 + offset);
    removed
        .iter()
        .any(|instruction| instruction.kind != InstructionKind::SectionClose)
}
