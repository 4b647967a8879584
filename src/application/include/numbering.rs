//! Heading normalization: identifiers, optional tiered numbering and
//! rendered title markup for every header instruction of a page.

use crate::domain::headings::HeadingEntry;
use crate::domain::instructions::{Instruction, InstructionKind, MAX_HEADING_LEVEL, clamp_level};
use crate::domain::slug::AllocationRegistry;

const LEVELS: usize = MAX_HEADING_LEVEL as usize;

/// Numbering marker written at the start of a heading title: `#`, an
/// optional `!` and optional digits, followed by whitespace.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct NumberMarker {
    /// Explicit counter value for this heading.
    pub explicit: Option<u32>,
    /// Make this heading's level the first numbering tier from here on.
    pub redefine_tier: bool,
}

/// Split a leading number marker off `title`.
pub fn split_number_marker(title: &str) -> (Option<NumberMarker>, &str) {
    let trimmed = title.trim_start();
    let Some(rest) = trimmed.strip_prefix('#') else {
        return (None, title);
    };

    let (redefine_tier, rest) = match rest.strip_prefix('!') {
        Some(rest) => (true, rest),
        None => (false, rest),
    };

    let digits_len = rest
        .find(|ch: char| !ch.is_ascii_digit())
        .unwrap_or(rest.len());
    let (digits, after) = rest.split_at(digits_len);

    if !after.is_empty() && !after.starts_with(char::is_whitespace) {
        return (None, title);
    }

    let marker = NumberMarker {
        explicit: digits.parse().ok(),
        redefine_tier,
    };
    (Some(marker), after.trim_start())
}

/// Per-page heading counters.
#[derive(Debug, Clone)]
pub struct NumberingState {
    counters: [u32; LEVELS],
    first_tier: u8,
}

impl NumberingState {
    pub fn new(first_tier: u8) -> Self {
        Self {
            counters: [0; LEVELS],
            first_tier: clamp_level(i32::from(first_tier)),
        }
    }

    /// Advance the counters for a heading at `level` and return its tiered
    /// number, e.g. `2.1.`. Levels above the first tier are not numbered.
    pub fn next(&mut self, level: u8, marker: Option<&NumberMarker>) -> Option<String> {
        let level = clamp_level(i32::from(level));
        let idx = usize::from(level - 1);

        if marker.is_some_and(|marker| marker.redefine_tier) {
            self.first_tier = level;
        }

        match marker.and_then(|marker| marker.explicit) {
            Some(value) => self.counters[idx] = value,
            None => self.counters[idx] = self.counters[idx].saturating_add(1),
        }
        self.counters[idx + 1..].fill(0);

        if level < self.first_tier {
            return None;
        }

        let start = usize::from(self.first_tier - 1);
        let number: String = self.counters[start..=idx]
            .iter()
            .filter(|counter| **counter != 0)
            .map(|counter| format!("{counter}."))
            .collect();

        (!number.is_empty()).then_some(number)
    }
}

/// Turns header instructions into [`HeadingEntry`] values.
#[derive(Debug, Clone, Default)]
pub struct HeadingNormalizer {
    numbering: Option<NumberingState>,
}

impl HeadingNormalizer {
    pub fn new(numbering: bool, first_tier: u8) -> Self {
        Self {
            numbering: numbering.then(|| NumberingState::new(first_tier)),
        }
    }

    pub fn numbering_enabled(&self) -> bool {
        self.numbering.is_some()
    }

    /// Title text identifiers are derived from. Number markers only count as
    /// markup when numbering is enabled.
    pub fn identifier_text<'t>(&self, title: &'t str) -> &'t str {
        if self.numbering_enabled() {
            split_number_marker(title).1.trim()
        } else {
            title.trim()
        }
    }

    pub fn entry(
        &mut self,
        title: &str,
        level: u8,
        position: Option<usize>,
        registry: &mut AllocationRegistry,
    ) -> HeadingEntry {
        let level = clamp_level(i32::from(level));
        let (marker, text) = match self.numbering {
            Some(_) => split_number_marker(title),
            None => (None, title),
        };
        let text = text.trim();

        let identifier = registry.allocate(text);
        let number = self
            .numbering
            .as_mut()
            .and_then(|state| state.next(level, marker.as_ref()));

        let rendered_markup = (!text.is_empty()).then(|| {
            let escaped = ammonia::clean_text(text);
            match &number {
                Some(number) => format!("<span class=\"heading-number\">{number}</span> {escaped}"),
                None => escaped,
            }
        });

        HeadingEntry {
            identifier,
            level,
            title: text.to_string(),
            rendered_markup,
            number,
            position,
        }
    }

    /// One entry per header instruction, in stream order.
    pub fn normalize(
        &mut self,
        instructions: &[Instruction],
        registry: &mut AllocationRegistry,
    ) -> Vec<HeadingEntry> {
        instructions
            .iter()
            .filter_map(|instruction| match &instruction.kind {
                InstructionKind::Header { title, level, .. } => {
                    Some(self.entry(title, *level, instruction.position, registry))
                }
                _ => None,
            })
            .collect()
    }
}
