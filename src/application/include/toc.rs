//! Table-of-contents aggregation and display filtering.
//!
//! Collecting and displaying are separate steps: [`aggregate`] builds the
//! complete, unfiltered TOC of a render (stored as page metadata), and
//! [`filter`] derives what a TOC sidebar shows from it.

use std::collections::BTreeMap;

use crate::config::TocSettings;
use crate::domain::headings::{HeadingEntry, Toc};

/// Display bounds for a TOC.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TocPolicy {
    pub top_level: u8,
    pub max_level: u8,
    pub min_headings: usize,
}

impl Default for TocPolicy {
    fn default() -> Self {
        Self::from(&TocSettings::default())
    }
}

impl From<&TocSettings> for TocPolicy {
    fn from(settings: &TocSettings) -> Self {
        Self {
            top_level: settings.top_level,
            max_level: settings.max_level,
            min_headings: settings.min_headings,
        }
    }
}

/// Headings contributed by one inclusion, to be inserted before the own
/// heading that follows `insert_at` in the final stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IncludedHeadings {
    pub insert_at: usize,
    pub entries: Vec<HeadingEntry>,
}

/// Merge the page's own entries (keyed by stream index) with the entries of
/// included pages. Insertion order is stable: an included group lands after
/// every own entry with a smaller index, and groups sharing an insertion
/// point keep their relative order.
pub fn aggregate(own: Vec<(usize, HeadingEntry)>, included: Vec<IncludedHeadings>) -> Toc {
    let mut groups: BTreeMap<usize, Vec<HeadingEntry>> = BTreeMap::new();
    for group in included {
        groups
            .entry(group.insert_at)
            .or_default()
            .extend(group.entries);
    }

    let mut entries = Vec::with_capacity(own.len() + groups.values().map(Vec::len).sum::<usize>());
    let mut pending = groups.into_iter().peekable();

    for (index, entry) in own {
        while let Some((_, group)) = pending.next_if(|(insert_at, _)| *insert_at < index) {
            entries.extend(group);
        }
        entries.push(entry);
    }
    for (_, group) in pending {
        entries.extend(group);
    }

    Toc::new(entries)
}

/// Derive the displayed TOC.
///
/// With `start`, only the subtree rooted at that identifier is kept: the
/// start entry and the deeper entries that follow it, up to `depth_limit`
/// levels below it. Entries with empty titles or outside
/// `top_level..=max_level` are dropped and levels are re-based so
/// `top_level` becomes 1. Fewer than `min_headings` survivors yield an empty
/// TOC.
pub fn filter(
    toc: &Toc,
    policy: &TocPolicy,
    start: Option<&str>,
    depth_limit: Option<u8>,
) -> Toc {
    let candidates: &[HeadingEntry] = match start {
        Some(start) => subtree(&toc.entries, start),
        None => &toc.entries,
    };
    let deepest = match (start, depth_limit, candidates.first()) {
        (Some(_), Some(limit), Some(root)) => root.level.saturating_add(limit),
        _ => u8::MAX,
    };

    let kept: Vec<HeadingEntry> = candidates
        .iter()
        .filter(|entry| !entry.title.trim().is_empty())
        .filter(|entry| (policy.top_level..=policy.max_level).contains(&entry.level))
        .filter(|entry| entry.level <= deepest)
        .map(|entry| HeadingEntry {
            level: entry.level - policy.top_level + 1,
            ..entry.clone()
        })
        .collect();

    if kept.len() < policy.min_headings {
        return Toc::default();
    }
    Toc::new(kept)
}

fn subtree<'a>(entries: &'a [HeadingEntry], start: &str) -> &'a [HeadingEntry] {
    let Some(begin) = entries.iter().position(|entry| entry.identifier == start) else {
        return &[];
    };
    let root_level = entries[begin].level;
    let end = entries[begin + 1..]
        .iter()
        .position(|entry| entry.level <= root_level)
        .map_or(entries.len(), |offset| begin + 1 + offset);
    &entries[begin..end]
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(identifier: &str, level: u8) -> HeadingEntry {
        HeadingEntry {
            identifier: identifier.to_string(),
            level,
            title: identifier.to_uppercase(),
            rendered_markup: None,
            number: None,
            position: None,
        }
    }

    fn ids(toc: &Toc) -> Vec<(&str, u8)> {
        toc.iter()
            .map(|entry| (entry.identifier.as_str(), entry.level))
            .collect()
    }

    fn open_policy() -> TocPolicy {
        TocPolicy {
            top_level: 1,
            max_level: 5,
            min_headings: 0,
        }
    }

    #[test]
    fn aggregate_inserts_groups_at_stream_positions() {
        let toc = aggregate(
            vec![(0, entry("intro", 1)), (10, entry("outro", 1))],
            vec![
                IncludedHeadings {
                    insert_at: 4,
                    entries: vec![entry("a", 2), entry("b", 3)],
                },
                IncludedHeadings {
                    insert_at: 12,
                    entries: vec![entry("tail", 2)],
                },
            ],
        );

        assert_eq!(
            ids(&toc),
            vec![("intro", 1), ("a", 2), ("b", 3), ("outro", 1), ("tail", 2)]
        );
    }

    #[test]
    fn aggregate_without_own_entries_keeps_group_order() {
        let toc = aggregate(
            Vec::new(),
            vec![
                IncludedHeadings {
                    insert_at: 7,
                    entries: vec![entry("second", 1)],
                },
                IncludedHeadings {
                    insert_at: 2,
                    entries: vec![entry("first", 1)],
                },
            ],
        );
        assert_eq!(ids(&toc), vec![("first", 1), ("second", 1)]);
    }

    #[test]
    fn filter_drops_empty_titles_and_rebases_levels() {
        let mut hidden = entry("hidden", 2);
        hidden.title.clear();
        let toc = Toc::new(vec![entry("a", 1), hidden, entry("b", 2), entry("c", 4)]);

        let policy = TocPolicy {
            top_level: 2,
            max_level: 3,
            min_headings: 0,
        };
        assert_eq!(ids(&filter(&toc, &policy, None, None)), vec![("b", 1)]);
    }

    #[test]
    fn filter_enforces_minimum_count() {
        let toc = Toc::new(vec![entry("a", 1), entry("b", 2)]);
        let policy = TocPolicy {
            min_headings: 3,
            ..open_policy()
        };
        assert!(filter(&toc, &policy, None, None).is_empty());
    }

    #[test]
    fn filter_restricts_to_subtree() {
        let toc = Toc::new(vec![
            entry("a", 1),
            entry("b", 2),
            entry("b1", 3),
            entry("b2", 4),
            entry("c", 2),
            entry("d", 1),
        ]);

        assert_eq!(
            ids(&filter(&toc, &open_policy(), Some("b"), None)),
            vec![("b", 2), ("b1", 3), ("b2", 4)]
        );
        assert_eq!(
            ids(&filter(&toc, &open_policy(), Some("b"), Some(1))),
            vec![("b", 2), ("b1", 3)]
        );
        assert!(filter(&toc, &open_policy(), Some("missing"), None).is_empty());
    }

    #[test]
    fn filter_is_idempotent_from_level_one() {
        let toc = Toc::new(vec![entry("a", 1), entry("b", 2), entry("c", 5), entry("d", 3)]);
        let policy = TocPolicy {
            top_level: 1,
            max_level: 3,
            min_headings: 2,
        };

        let once = filter(&toc, &policy, None, None);
        let twice = filter(&once, &policy, None, None);
        assert_eq!(once, twice);
    }
}
