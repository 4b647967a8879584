mod common;

use std::sync::Arc;

use serde_json::json;
use wikiweave::application::context::RenderRequest;
use wikiweave::application::repos::{Collaborators, MetadataStore};
use wikiweave::application::include::IncludeEngine;
use wikiweave::config::Settings;
use wikiweave::cache::DependencyKey;
use wikiweave::domain::error::{Diagnostic, DiagnosticKind};
use wikiweave::domain::instructions::{
    Instruction, InstructionKind, Notice, NoticeKind, PluginCall,
};
use wikiweave::domain::types::{MetadataMode, Permission, Viewer, meta_keys};
use wikiweave::infra::memory::MemoryWiki;

use common::{
    engine, engine_with, headers, id, include, including, page, section, titled, wrapped_pages,
};

fn guide_wiki(markup: &str) -> Arc<MemoryWiki> {
    let mut root = vec![Instruction::new(InstructionKind::DocumentStart)];
    root.extend(section("Intro", 1, "hello"));
    root.push(include(markup, 1));
    root.extend(section("Outro", 1, "bye"));
    root.push(Instruction::new(InstructionKind::DocumentEnd));

    Arc::new(
        MemoryWiki::new()
            .with_page("start", root)
            .with_page("docs:guide", page(&[("Guide", 1), ("Setup", 2)])),
    )
}

fn kinds<'a>(rendered: &'a [Instruction]) -> impl Iterator<Item = &'a InstructionKind> {
    rendered.iter().map(|instruction| &instruction.kind)
}

fn has_notice(rendered: &[Instruction], kind: NoticeKind) -> bool {
    kinds(rendered).any(|candidate| {
        matches!(
            candidate,
            InstructionKind::Plugin(PluginCall::Notice(Notice { kind: found, .. })) if *found == kind
        )
    })
}

fn has_diagnostic(diagnostics: &[Diagnostic], kind: DiagnosticKind) -> bool {
    diagnostics.iter().any(|diagnostic| diagnostic.kind == kind)
}

#[test]
fn whole_page_is_spliced_below_the_inclusion_point() {
    let wiki = guide_wiki("{{page>docs:guide}}");
    let rendered = engine(&wiki).render(&RenderRequest::new(id("start")));

    assert_eq!(
        headers(&rendered.instructions),
        titled(&[("Intro", 1), ("Guide", 2), ("Setup", 3), ("Outro", 1)])
    );
    assert_eq!(wrapped_pages(&rendered.instructions), vec!["docs:guide"]);
    assert!(rendered.diagnostics.is_empty(), "{:?}", rendered.diagnostics);

    let identifiers: Vec<_> = rendered
        .toc
        .iter()
        .map(|entry| entry.identifier.as_str())
        .collect();
    assert_eq!(identifiers, vec!["intro", "guide", "setup", "outro"]);

    assert!(kinds(&rendered.instructions).any(|kind| matches!(
        kind,
        InstructionKind::Plugin(PluginCall::EditButton { .. })
    )));
    assert!(kinds(&rendered.instructions).any(|kind| matches!(
        kind,
        InstructionKind::Plugin(PluginCall::CloseLastSectionEdit { .. })
    )));
    // document bounds of the included page are stripped
    assert_eq!(
        kinds(&rendered.instructions)
            .filter(|kind| matches!(kind, InstructionKind::DocumentStart))
            .count(),
        1
    );
    assert!(rendered.dependencies.contains_page(&id("docs:guide")));
}

#[test]
fn page_starting_deep_keeps_every_heading_below_the_inclusion_point() {
    let root = vec![
        Instruction::header("Root", 2),
        include("{{page>child}}", 2),
    ];
    let child = vec![
        Instruction::header("Deep", 3),
        Instruction::text("first"),
        Instruction::header("Top", 1),
        Instruction::text("second"),
    ];
    let wiki = Arc::new(
        MemoryWiki::new()
            .with_page("start", root)
            .with_page("child", child),
    );

    let rendered = engine(&wiki).render(&RenderRequest::new(id("start")));
    assert_eq!(
        headers(&rendered.instructions),
        titled(&[("Root", 2), ("Deep", 5), ("Top", 3)])
    );
}

#[test]
fn render_metadata_is_persisted_outside_preview() {
    let wiki = guide_wiki("{{page>docs:guide}}");
    engine(&wiki).render(&RenderRequest::new(id("start")));

    let toc = wiki
        .get(&id("start"), meta_keys::TABLE_OF_CONTENTS, MetadataMode::Simple)
        .expect("metadata read")
        .expect("toc stored");
    assert_eq!(toc.as_array().map(Vec::len), Some(4));

    let parts = wiki
        .get(&id("start"), meta_keys::HAS_PART, MetadataMode::Simple)
        .expect("metadata read");
    assert_eq!(parts, Some(json!({ "docs:guide": true })));
}

fn restricted_wiki() -> Arc<MemoryWiki> {
    Arc::new(
        MemoryWiki::new()
            .with_page(
                "start",
                including("Start", &["{{page>docs:guide}}", "{{page>secret}}"]),
            )
            .with_page("docs:guide", page(&[("Guide", 1)]))
            .with_page("secret", page(&[("Launch Codes", 1)]))
            .with_rule("secret", None, Permission::None)
            .with_rule("secret", Some("alice"), Permission::Read),
    )
}

fn persisted_toc_identifiers(wiki: &MemoryWiki) -> Vec<String> {
    wiki.get(&id("start"), meta_keys::TABLE_OF_CONTENTS, MetadataMode::Simple)
        .expect("metadata read")
        .and_then(|toc| toc.as_array().cloned())
        .unwrap_or_default()
        .iter()
        .filter_map(|entry| entry["identifier"].as_str().map(str::to_string))
        .collect()
}

#[test]
fn restricted_pages_stay_out_of_persisted_metadata() {
    let wiki = restricted_wiki();
    let rendered = engine(&wiki)
        .render(&RenderRequest::new(id("start")).with_viewer(Viewer::user("alice")));

    // the privileged viewer still sees the content
    assert_eq!(wrapped_pages(&rendered.instructions), vec!["docs:guide", "secret"]);
    assert!(rendered.toc.find("launch_codes").is_some());

    assert_eq!(persisted_toc_identifiers(&wiki), vec!["start", "guide"]);
    let parts = wiki
        .get(&id("start"), meta_keys::HAS_PART, MetadataMode::Simple)
        .expect("metadata read");
    assert_eq!(parts, Some(json!({ "docs:guide": true })));
}

#[test]
fn safe_index_can_be_disabled() {
    let wiki = restricted_wiki();
    let mut settings = Settings::default();
    settings.include.safe_index = false;
    engine_with(&wiki, settings)
        .render(&RenderRequest::new(id("start")).with_viewer(Viewer::user("alice")));

    assert_eq!(
        persisted_toc_identifiers(&wiki),
        vec!["start", "guide", "launch_codes"]
    );
    let parts = wiki
        .get(&id("start"), meta_keys::HAS_PART, MetadataMode::Simple)
        .expect("metadata read");
    assert_eq!(parts, Some(json!({ "docs:guide": true, "secret": true })));
}

#[test]
fn directives_outside_the_extracted_section_are_not_resolved() {
    let mut child = section("Intro", 1, "hello");
    child.push(Instruction::header("Other", 1));
    child.push(include("{{page>secret}}", 1));

    let wiki = Arc::new(
        MemoryWiki::new()
            .with_page("start", including("Start", &["{{page>child#Intro}}"]))
            .with_page("whole", including("Whole", &["{{page>child}}"]))
            .with_page("child", child)
            .with_page("secret", page(&[("Secret", 1)]))
            .with_rule("secret", None, Permission::None),
    );
    let engine = engine(&wiki);

    let section_only = engine.render(&RenderRequest::new(id("start")));
    assert_eq!(wrapped_pages(&section_only.instructions), vec!["child"]);
    assert!(
        !has_diagnostic(&section_only.diagnostics, DiagnosticKind::AccessDenied),
        "{:?}",
        section_only.diagnostics
    );

    let whole = engine.render(&RenderRequest::new(id("whole")));
    let denied = whole
        .diagnostics
        .iter()
        .filter(|diagnostic| diagnostic.kind == DiagnosticKind::AccessDenied)
        .count();
    assert_eq!(denied, 1);
}

#[test]
fn preview_renders_leave_metadata_untouched() {
    let wiki = guide_wiki("{{page>docs:guide}}");
    engine(&wiki).render(&RenderRequest::new(id("start")).with_preview(true));

    let toc = wiki
        .get(&id("start"), meta_keys::TABLE_OF_CONTENTS, MetadataMode::Simple)
        .expect("metadata read");
    assert!(toc.is_none());
}

#[test]
fn noheader_blanks_root_heading_and_noindent_keeps_levels() {
    let wiki = guide_wiki("{{page>docs:guide&noheader&noindent}}");
    let engine = engine(&wiki);
    let rendered = engine.render(&RenderRequest::new(id("start")));

    assert_eq!(
        headers(&rendered.instructions),
        titled(&[("Intro", 1), ("", 1), ("Setup", 2), ("Outro", 1)])
    );
    // the blanked heading keeps an identifier but is not displayed
    assert_eq!(rendered.toc.len(), 4);
    let displayed: Vec<_> = rendered
        .display_toc
        .iter()
        .map(|entry| entry.title.as_str())
        .collect();
    assert_eq!(displayed, vec!["Intro", "Setup", "Outro"]);
}

#[test]
fn first_section_only_appends_readmore() {
    let wiki = guide_wiki("{{page>docs:guide&firstseconly}}");
    let rendered = engine(&wiki).render(&RenderRequest::new(id("start")));

    assert_eq!(
        headers(&rendered.instructions),
        titled(&[("Intro", 1), ("Guide", 2), ("Outro", 1)])
    );
    assert!(kinds(&rendered.instructions).any(|kind| matches!(
        kind,
        InstructionKind::Plugin(PluginCall::Readmore { page }) if *page == id("docs:guide")
    )));
}

#[test]
fn edit_button_requires_edit_permission() {
    let wiki = Arc::new(
        MemoryWiki::new()
            .with_page("start", including("Start", &["{{page>docs:guide}}"]))
            .with_page("docs:guide", page(&[("Guide", 1)]))
            .with_rule("docs:*", None, Permission::Read),
    );
    let rendered = engine(&wiki).render(&RenderRequest::new(id("start")));

    assert_eq!(wrapped_pages(&rendered.instructions), vec!["docs:guide"]);
    assert!(!kinds(&rendered.instructions).any(|kind| matches!(
        kind,
        InstructionKind::Plugin(PluginCall::EditButton { .. })
    )));
}

#[test]
fn footer_collects_page_metadata() {
    let wiki = Arc::new(
        MemoryWiki::new()
            .with_page("start", including("Start", &["{{page>docs:guide&footer&linkbacks}}"]))
            .with_page("docs:guide", page(&[("Guide", 1)]))
            .with_meta("docs:guide", meta_keys::CREATOR, json!("alice"))
            .with_meta("docs:guide", meta_keys::CREATED, json!(1_700_000_000))
            .with_meta("docs:guide", meta_keys::COMMENTS, json!(3))
            .with_meta("docs:guide", meta_keys::LINKBACKS, json!("2"))
            .with_meta("docs:guide", meta_keys::TAGS, json!(["rust", "wiki"])),
    );
    let rendered = engine(&wiki).render(&RenderRequest::new(id("start")));

    let footer = kinds(&rendered.instructions)
        .find_map(|kind| match kind {
            InstructionKind::Plugin(PluginCall::Footer(footer)) => Some(footer),
            _ => None,
        })
        .expect("footer");
    assert_eq!(footer.page, id("docs:guide"));
    assert_eq!(footer.author.as_deref(), Some("alice"));
    assert_eq!(
        footer.created.map(|created| created.unix_timestamp()),
        Some(1_700_000_000)
    );
    assert_eq!(footer.comments, Some(3));
    assert_eq!(footer.linkbacks, Some(2));
    assert_eq!(footer.tags, vec!["rust", "wiki"]);
    assert_eq!(footer.level, 2);
    assert!(rendered.dependencies.keys().iter().any(|key| matches!(
        key,
        DependencyKey::Metadata(page) if *page == id("docs:guide")
    )));
}

#[test]
fn missing_page_degrades_to_notice() {
    let wiki = Arc::new(
        MemoryWiki::new().with_page("start", including("Start", &["{{page>nowhere}}"])),
    );
    let rendered = engine(&wiki).render(&RenderRequest::new(id("start")));

    assert!(has_notice(&rendered.instructions, NoticeKind::PageNotFound));
    assert!(has_diagnostic(&rendered.diagnostics, DiagnosticKind::PageNotFound));
    assert!(
        rendered
            .dependencies
            .pages()
            .any(|(page, existed)| *page == id("nowhere") && !existed)
    );
}

#[test]
fn pageexists_hides_missing_page_notice() {
    let wiki = Arc::new(
        MemoryWiki::new().with_page("start", including("Start", &["{{page>nowhere&pageexists}}"])),
    );
    let rendered = engine(&wiki).render(&RenderRequest::new(id("start")));

    assert!(!has_notice(&rendered.instructions, NoticeKind::PageNotFound));
    assert!(has_diagnostic(&rendered.diagnostics, DiagnosticKind::PageNotFound));
}

#[test]
fn missing_section_is_only_visible_in_preview() {
    let wiki = guide_wiki("{{section>docs:guide#Nowhere}}");
    let engine = engine(&wiki);

    let view = engine.render(&RenderRequest::new(id("start")));
    assert!(!has_notice(&view.instructions, NoticeKind::SectionNotFound));
    assert!(has_diagnostic(&view.diagnostics, DiagnosticKind::SectionNotFound));
    assert!(wrapped_pages(&view.instructions).is_empty());

    let preview = engine.render(&RenderRequest::new(id("start")).with_preview(true));
    assert!(has_notice(&preview.instructions, NoticeKind::SectionNotFound));
}

#[test]
fn malformed_flags_are_reported() {
    let wiki = guide_wiki("{{page>docs:guide&depth=deep}}");
    let engine = engine(&wiki);

    let view = engine.render(&RenderRequest::new(id("start")));
    assert!(has_diagnostic(&view.diagnostics, DiagnosticKind::MalformedDirective));
    assert!(wrapped_pages(&view.instructions).is_empty());

    let preview = engine.render(&RenderRequest::new(id("start")).with_preview(true));
    assert!(has_notice(&preview.instructions, NoticeKind::MalformedDirective));
}

#[test]
fn linkonly_lists_links_instead_of_content() {
    let wiki = Arc::new(
        MemoryWiki::new()
            .with_page("start", including("Start", &["{{page>docs:guide&linkonly&title}}"]))
            .with_page("docs:guide", page(&[("Guide", 1)]))
            .with_meta("docs:guide", meta_keys::TITLE, json!("The Guide")),
    );
    let rendered = engine(&wiki).render(&RenderRequest::new(id("start")));

    assert!(wrapped_pages(&rendered.instructions).is_empty());
    let link = kinds(&rendered.instructions)
        .find(|kind| matches!(kind, InstructionKind::InternalLink { .. }))
        .expect("link");
    assert_eq!(
        link,
        &InstructionKind::InternalLink {
            target: "docs:guide".to_string(),
            title: Some("The Guide".to_string()),
        }
    );
}

#[test]
fn tag_topic_degrades_without_index() {
    let wiki = Arc::new(
        MemoryWiki::new()
            .with_page("start", including("Start", &["{{tagtopic>rust}}"]))
            .with_page("b", page(&[("B", 1)]))
            .with_page("a", page(&[("A", 1)]))
            .with_page("c", page(&[("C", 1)]))
            .with_meta("a", meta_keys::TAGS, json!(["rust"]))
            .with_meta("b", meta_keys::TAGS, json!("rust wiki")),
    );

    let indexed = engine(&wiki).render(&RenderRequest::new(id("start")));
    assert_eq!(wrapped_pages(&indexed.instructions), vec!["a", "b"]);

    let shared = Arc::clone(&wiki);
    let without_index = IncludeEngine::new(
        Collaborators::new(shared.clone(), shared.clone(), shared),
        &Settings::default(),
    );
    let degraded = without_index.render(&RenderRequest::new(id("start")));
    assert!(wrapped_pages(&degraded.instructions).is_empty());
    assert!(has_notice(&degraded.instructions, NoticeKind::TagIndexUnavailable));
    assert!(has_diagnostic(&degraded.diagnostics, DiagnosticKind::TagIndexUnavailable));
}

#[test]
fn host_compiled_streams_render_without_the_store() {
    let wiki = Arc::new(MemoryWiki::new().with_page("docs:guide", page(&[("Guide", 1)])));
    let engine = engine_with(&wiki, Settings::default());

    let rendered = engine.render_instructions(
        &RenderRequest::new(id("draft")).with_preview(true),
        including("Draft", &["{{page>docs:guide}}"]),
    );
    assert_eq!(
        headers(&rendered.instructions),
        titled(&[("Draft", 1), ("Guide", 2)])
    );
}
