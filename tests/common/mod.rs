#![allow(dead_code)]

use std::sync::Arc;

use wikiweave::application::include::IncludeEngine;
use wikiweave::application::repos::Collaborators;
use wikiweave::config::Settings;
use wikiweave::domain::directive::IncludeDirective;
use wikiweave::domain::instructions::{Instruction, InstructionKind, PluginCall, WrapMarker};
use wikiweave::domain::page_id::PageId;
use wikiweave::infra::memory::MemoryWiki;

/// Header, section open, one paragraph, section close.
pub fn section(title: &str, level: u8, body: &str) -> Vec<Instruction> {
    vec![
        Instruction::header(title, level),
        Instruction::new(InstructionKind::SectionOpen { level }),
        Instruction::new(InstructionKind::ParagraphOpen),
        Instruction::text(body),
        Instruction::new(InstructionKind::ParagraphClose),
        Instruction::new(InstructionKind::SectionClose),
    ]
}

/// A compiled page made of `(title, level)` sections.
pub fn page(sections: &[(&str, u8)]) -> Vec<Instruction> {
    let mut stream = vec![Instruction::new(InstructionKind::DocumentStart)];
    for (title, level) in sections {
        stream.extend(section(title, *level, &format!("{title} body")));
    }
    stream.push(Instruction::new(InstructionKind::DocumentEnd));
    stream
}

/// Page with one heading followed by include directives at level 1.
pub fn including(title: &str, markups: &[&str]) -> Vec<Instruction> {
    let mut stream = vec![Instruction::new(InstructionKind::DocumentStart)];
    stream.extend(section(title, 1, "lead"));
    stream.extend(markups.iter().map(|markup| include(markup, 1)));
    stream.push(Instruction::new(InstructionKind::DocumentEnd));
    stream
}

pub fn include(markup: &str, level: u8) -> Instruction {
    let directive = IncludeDirective::parse(markup).expect("valid include markup");
    Instruction::plugin(PluginCall::Include(directive.with_level(level)))
}

pub fn link(target: &str) -> Instruction {
    Instruction::new(InstructionKind::InternalLink {
        target: target.to_string(),
        title: None,
    })
}

pub fn engine(wiki: &Arc<MemoryWiki>) -> IncludeEngine {
    engine_with(wiki, Settings::default())
}

pub fn engine_with(wiki: &Arc<MemoryWiki>, settings: Settings) -> IncludeEngine {
    IncludeEngine::new(Collaborators::from_shared(Arc::clone(wiki)), &settings)
}

pub fn headers(instructions: &[Instruction]) -> Vec<(String, u8)> {
    instructions
        .iter()
        .filter_map(|instruction| match &instruction.kind {
            InstructionKind::Header { title, level, .. } => Some((title.clone(), *level)),
            _ => None,
        })
        .collect()
}

pub fn wrapped_pages(instructions: &[Instruction]) -> Vec<String> {
    instructions
        .iter()
        .filter_map(|instruction| match &instruction.kind {
            InstructionKind::Plugin(PluginCall::Wrap(WrapMarker::Open { page, .. })) => {
                Some(page.to_string())
            }
            _ => None,
        })
        .collect()
}

pub fn id(raw: &str) -> PageId {
    PageId::new(raw)
}

pub fn titled(pairs: &[(&str, u8)]) -> Vec<(String, u8)> {
    pairs
        .iter()
        .map(|(title, level)| (title.to_string(), *level))
        .collect()
}
