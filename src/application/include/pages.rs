//! Page set resolution: from a directive's specifier to the ordered list of
//! pages it includes.

use std::cmp::Ordering;

use serde_json::Value;
use time::OffsetDateTime;
use tracing::{debug, warn};

use crate::application::context::RenderContext;
use crate::application::repos::Collaborators;
use crate::config::IncludeSettings;
use crate::domain::directive::{FlagSet, IncludeDirective, IncludeMode, SortOrder};
use crate::domain::error::DiagnosticKind;
use crate::domain::instructions::{Notice, NoticeKind};
use crate::domain::page_id::{PageId, natural_cmp};
use crate::domain::types::{
    MetadataMode, Viewer, meta_keys, value_as_f64, value_as_string, value_as_timestamp,
};

const TARGET: &str = "application::include::pages";

/// A page selected by a directive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedPage {
    pub id: PageId,
    pub exists: bool,
}

/// Result of resolving one directive.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PageSet {
    pub pages: Vec<ResolvedPage>,
    /// Shown in place of the pages when the lookup itself was impossible.
    pub notice: Option<Notice>,
}

/// Resolutions are memoized per render under this key.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PageSetKey {
    parent: PageId,
    mode: IncludeMode,
    specifier: String,
    order: SortOrder,
    reverse: bool,
    depth: usize,
}

pub struct PageSetResolver<'a> {
    collaborators: &'a Collaborators,
    settings: &'a IncludeSettings,
}

impl<'a> PageSetResolver<'a> {
    pub fn new(collaborators: &'a Collaborators, settings: &'a IncludeSettings) -> Self {
        Self {
            collaborators,
            settings,
        }
    }

    /// Pages selected by `directive` when it appears on `parent`.
    pub fn resolve(
        &self,
        directive: &IncludeDirective,
        flags: &FlagSet,
        parent: &PageId,
        ctx: &mut RenderContext,
    ) -> PageSet {
        let key = PageSetKey {
            parent: parent.clone(),
            mode: directive.mode,
            specifier: directive.specifier.clone(),
            order: flags.order,
            reverse: flags.reverse,
            depth: flags.depth,
        };
        if let Some(cached) = ctx.page_sets.get(&key) {
            return cached.clone();
        }

        let specifier = substitute_macros(
            &directive.specifier,
            &ctx.viewer,
            ctx.now,
            &self.settings.default_lang,
        );

        let mut set = match directive.mode {
            IncludeMode::Page | IncludeMode::Section => self.single(&specifier, parent, ctx),
            IncludeMode::Namespace => self.namespace(&specifier, parent, flags.depth, ctx),
            IncludeMode::TagTopic => self.tagged(&specifier, ctx),
        };

        if matches!(directive.mode, IncludeMode::Namespace | IncludeMode::TagTopic) {
            self.sort(&mut set.pages, flags, ctx);
        }

        debug!(
            target = TARGET,
            parent = %parent,
            specifier = %specifier,
            pages = set.pages.len(),
            "Resolved page set"
        );
        ctx.page_sets.insert(key, set.clone());
        set
    }

    fn single(&self, specifier: &str, parent: &PageId, ctx: &mut RenderContext) -> PageSet {
        let id = PageId::resolve(specifier, parent.namespace());
        if !self.readable(&id, ctx) {
            return PageSet::default();
        }
        let exists = self.collaborators.pages.exists(&id);
        PageSet {
            pages: vec![ResolvedPage { id, exists }],
            notice: None,
        }
    }

    fn namespace(
        &self,
        specifier: &str,
        parent: &PageId,
        depth: usize,
        ctx: &mut RenderContext,
    ) -> PageSet {
        let namespace = resolve_namespace(specifier, parent);
        let listed = match self.collaborators.pages.list_pages(&namespace, depth) {
            Ok(listed) => listed,
            Err(err) => {
                warn!(
                    target = TARGET,
                    namespace = %namespace,
                    error = %err,
                    "Namespace listing failed"
                );
                ctx.report(DiagnosticKind::StoreFailure, Some(parent), err.to_string());
                return PageSet::default();
            }
        };
        ctx.dependencies
            .record_namespace(&namespace, depth, listed.iter());

        let pages = listed
            .into_iter()
            .filter(|id| id != parent)
            .filter(|id| !self.collaborators.pages.is_hidden(id))
            .filter(|id| self.readable(id, ctx))
            .map(|id| ResolvedPage { id, exists: true })
            .collect();

        PageSet {
            pages,
            notice: None,
        }
    }

    fn tagged(&self, tag: &str, ctx: &mut RenderContext) -> PageSet {
        let Some(index) = self.collaborators.tags.as_ref() else {
            let message = format!("tag index unavailable, cannot list pages tagged `{tag}`");
            warn!(target = TARGET, tag, "Tag index unavailable");
            ctx.report(DiagnosticKind::TagIndexUnavailable, None, message.clone());
            return PageSet {
                pages: Vec::new(),
                notice: Some(Notice::new(NoticeKind::TagIndexUnavailable, message)),
            };
        };

        let tagged = match index.pages_by_tag(tag) {
            Ok(tagged) => tagged,
            Err(err) => {
                warn!(target = TARGET, tag, error = %err, "Tag lookup failed");
                ctx.report(DiagnosticKind::StoreFailure, None, err.to_string());
                return PageSet::default();
            }
        };
        ctx.dependencies.record_tag(tag, tagged.iter());

        let pages = tagged
            .into_iter()
            .filter(|id| self.readable(id, ctx))
            .map(|id| {
                let exists = self.collaborators.pages.exists(&id);
                ResolvedPage { id, exists }
            })
            .collect();

        PageSet {
            pages,
            notice: None,
        }
    }

    fn readable(&self, id: &PageId, ctx: &mut RenderContext) -> bool {
        let permission = self.collaborators.access.check(id, &ctx.viewer);
        if !permission.can_read() {
            debug!(target = TARGET, page = %id, "Include target not readable");
            ctx.report(
                DiagnosticKind::AccessDenied,
                Some(id),
                format!("no read access to `{id}`"),
            );
            return false;
        }
        true
    }

    fn sort(&self, pages: &mut Vec<ResolvedPage>, flags: &FlagSet, ctx: &mut RenderContext) {
        if flags.order == SortOrder::Id {
            pages.sort_by(|a, b| natural_cmp(a.id.as_str(), b.id.as_str()));
            if flags.reverse {
                pages.reverse();
            }
            return;
        }

        let mut keyed: Vec<(Option<SortKey>, ResolvedPage)> = pages
            .drain(..)
            .map(|page| (self.sort_key(&page.id, flags.order, ctx), page))
            .collect();

        keyed.sort_by(|(left_key, left), (right_key, right)| {
            let primary = match (left_key, right_key) {
                (Some(a), Some(b)) if flags.reverse => b.compare(a),
                (Some(a), Some(b)) => a.compare(b),
                // pages without a value go last in either direction
                (Some(_), None) => Ordering::Less,
                (None, Some(_)) => Ordering::Greater,
                (None, None) => Ordering::Equal,
            };
            primary.then_with(|| natural_cmp(left.id.as_str(), right.id.as_str()))
        });

        pages.extend(keyed.into_iter().map(|(_, page)| page));
    }

    fn sort_key(&self, page: &PageId, order: SortOrder, ctx: &mut RenderContext) -> Option<SortKey> {
        match order {
            SortOrder::Id => Some(SortKey::Text(page.to_string())),
            SortOrder::Title => self
                .metadata(page, meta_keys::TITLE, ctx)
                .as_ref()
                .and_then(value_as_string)
                .or_else(|| Some(page.to_string()))
                .map(SortKey::Text),
            SortOrder::Created => self
                .metadata(page, meta_keys::CREATED, ctx)
                .as_ref()
                .and_then(value_as_timestamp)
                .map(SortKey::Time),
            SortOrder::Modified => self
                .metadata(page, meta_keys::MODIFIED, ctx)
                .as_ref()
                .and_then(value_as_timestamp)
                .or_else(|| self.collaborators.pages.modified(page))
                .map(SortKey::Time),
            SortOrder::IndexMenu => self
                .metadata(page, meta_keys::INDEXMENU, ctx)
                .as_ref()
                .and_then(value_as_f64)
                .map(SortKey::Number),
            SortOrder::Custom => self
                .metadata(page, &self.settings.custom_sort_key, ctx)
                .as_ref()
                .and_then(value_as_f64)
                .map(SortKey::Number),
        }
    }

    fn metadata(&self, page: &PageId, key: &str, ctx: &mut RenderContext) -> Option<Value> {
        ctx.dependencies.record_metadata(page);
        match self
            .collaborators
            .metadata
            .get(page, key, MetadataMode::Simple)
        {
            Ok(value) => value,
            Err(err) => {
                warn!(
                    target = TARGET,
                    page = %page,
                    key,
                    error = %err,
                    "Metadata lookup failed"
                );
                None
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
enum SortKey {
    Text(String),
    Time(OffsetDateTime),
    Number(f64),
}

impl SortKey {
    fn compare(&self, other: &Self) -> Ordering {
        match (self, other) {
            (Self::Text(a), Self::Text(b)) => natural_cmp(a, b),
            (Self::Time(a), Self::Time(b)) => a.cmp(b),
            (Self::Number(a), Self::Number(b)) => a.total_cmp(b),
            _ => Ordering::Equal,
        }
    }
}

/// Namespace addressed by a `namespace` directive on `parent`.
pub fn resolve_namespace(specifier: &str, parent: &PageId) -> String {
    let specifier = specifier.trim();
    if specifier.is_empty() || specifier == "." {
        return parent.namespace().to_string();
    }

    let trimmed = specifier.trim_end_matches(':');
    if trimmed.is_empty() {
        return String::new();
    }
    if trimmed.starts_with('.') {
        // resolve a placeholder page so `..` style prefixes are applied
        return PageId::resolve(&format!("{trimmed}:x"), parent.namespace())
            .namespace()
            .to_string();
    }
    PageId::resolve(trimmed, parent.namespace()).to_string()
}

/// Replace the viewer and date placeholders of a directive specifier.
pub fn substitute_macros(
    raw: &str,
    viewer: &Viewer,
    now: OffsetDateTime,
    default_lang: &str,
) -> String {
    if !raw.contains('@') {
        return raw.to_string();
    }

    let replacements = [
        ("@USER@", viewer.user.clone().unwrap_or_default()),
        ("@NAME@", viewer.name.clone().unwrap_or_default()),
        ("@GROUP@", viewer.groups.first().cloned().unwrap_or_default()),
        (
            "@BROWSER_LANG@",
            viewer
                .browser_lang
                .clone()
                .unwrap_or_else(|| default_lang.to_string()),
        ),
        ("@YEAR@", format!("{:04}", now.year())),
        ("@MONTH@", format!("{:02}", u8::from(now.month()))),
        ("@WEEK@", format!("{:02}", now.iso_week())),
        ("@DAY@", format!("{:02}", now.day())),
        ("@DAYOFYEAR@", format!("{:03}", now.ordinal())),
    ];

    replacements
        .iter()
        .fold(raw.to_string(), |acc, (token, value)| acc.replace(token, value))
}

#[cfg(test)]
mod tests {
    use time::macros::datetime;

    use super::*;

    #[test]
    fn macros_expand_viewer_and_date() {
        let viewer = Viewer {
            user: Some("alice".to_string()),
            name: Some("Alice".to_string()),
            groups: vec!["staff".to_string()],
            browser_lang: None,
        };
        let now = datetime!(2024-03-05 12:00 UTC);

        assert_eq!(
            substitute_macros("user:@USER@:@YEAR@-@MONTH@-@DAY@", &viewer, now, "en"),
            "user:alice:2024-03-05"
        );
        assert_eq!(
            substitute_macros("@GROUP@:@BROWSER_LANG@:w@WEEK@:d@DAYOFYEAR@", &viewer, now, "en"),
            "staff:en:w10:d065"
        );
        assert_eq!(
            substitute_macros("plain", &Viewer::anonymous(), now, "en"),
            "plain"
        );
    }

    #[test]
    fn namespace_specifiers_resolve_relative_to_parent() {
        let parent = PageId::new("a:b:page");
        assert_eq!(resolve_namespace(".", &parent), "a:b");
        assert_eq!(resolve_namespace("", &parent), "a:b");
        assert_eq!(resolve_namespace("sub", &parent), "a:b:sub");
        assert_eq!(resolve_namespace("..", &parent), "a");
        assert_eq!(resolve_namespace(".:sub:", &parent), "a:b:sub");
        assert_eq!(resolve_namespace(":other", &parent), "other");
        assert_eq!(resolve_namespace(":", &parent), "");
    }

    #[test]
    fn sort_keys_compare_within_kind() {
        assert_eq!(
            SortKey::Text("page2".into()).compare(&SortKey::Text("page10".into())),
            Ordering::Less
        );
        assert_eq!(
            SortKey::Number(2.0).compare(&SortKey::Number(1.5)),
            Ordering::Greater
        );
    }
}
