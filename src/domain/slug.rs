//! Heading identifiers.
//!
//! Identifiers are derived from free-text heading titles: CJK characters are
//! transliterated (`pinyin` crate), the result is slugified (`slug` crate) and
//! joined with underscores, and leading digits are moved behind a `section`
//! marker so every identifier is a valid URL fragment that starts with a
//! letter. [`AllocationRegistry`] then disambiguates identifiers within one
//! page render.

use std::collections::{HashMap, HashSet};

use pinyin::{Pinyin, ToPinyin};
use slug::slugify;

const FALLBACK_IDENTIFIER: &str = "section";

/// Derive the base identifier for a heading title. Never empty.
pub fn derive_identifier(title: &str) -> String {
    let transliterated = transliterate_to_ascii(title);
    let slugged = slugify(&transliterated).replace('-', "_");

    let stripped = slugged.trim_start_matches(|ch: char| ch.is_ascii_digit() || ch == '_');
    if !stripped.is_empty() {
        return stripped.to_string();
    }

    let digits: String = slugged.chars().filter(char::is_ascii_digit).collect();
    format!("{FALLBACK_IDENTIFIER}{digits}")
}

/// Identifiers already handed out during one page render.
///
/// Titles processed in order receive `_N` suffixes for the Nth collision
/// (`intro`, `intro_1`, `intro_2`). A candidate that is itself already taken,
/// e.g. because a heading is literally titled `intro_1`, is skipped.
#[derive(Default, Debug, Clone)]
pub struct AllocationRegistry {
    collisions: HashMap<String, usize>,
    used: HashSet<String>,
}

impl AllocationRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate a unique identifier for `title` and record it.
    pub fn allocate(&mut self, title: &str) -> String {
        let base = derive_identifier(title);
        self.reserve(base)
    }

    /// Record an already-derived identifier, disambiguating it when taken.
    pub fn reserve(&mut self, base: String) -> String {
        if self.used.insert(base.clone()) {
            self.collisions.entry(base.clone()).or_insert(0);
            return base;
        }

        let count = self.collisions.entry(base.clone()).or_insert(0);
        loop {
            *count += 1;
            let candidate = format!("{base}_{count}");
            if self.used.insert(candidate.clone()) {
                return candidate;
            }
        }
    }

    pub fn contains(&self, identifier: &str) -> bool {
        self.used.contains(identifier)
    }

    pub fn len(&self) -> usize {
        self.used.len()
    }

    pub fn is_empty(&self) -> bool {
        self.used.is_empty()
    }
}

fn transliterate_to_ascii(input: &str) -> String {
    let mut output = String::with_capacity(input.len());

    for ch in input.chars() {
        if ch.is_ascii() {
            output.push(ch);
            continue;
        }

        match ch.to_pinyin() {
            Some(py) => append_pinyin(&mut output, py),
            None if ch.is_whitespace() => output.push(' '),
            None => output.push(ch),
        }
    }

    output
}

fn append_pinyin(buffer: &mut String, pinyin: Pinyin) {
    if !buffer.is_empty() && !buffer.ends_with(' ') {
        buffer.push(' ');
    }
    buffer.push_str(pinyin.plain());
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn derive_identifier_lowercases_and_joins() {
        assert_eq!(derive_identifier("Getting Started"), "getting_started");
        assert_eq!(derive_identifier("Rust 基础"), "rust_ji_chu");
    }

    #[test]
    fn leading_digits_are_stripped() {
        assert_eq!(derive_identifier("2. Setup"), "setup");
        assert_eq!(derive_identifier("1999"), "section1999");
    }

    #[test]
    fn punctuation_only_titles_still_yield_identifier() {
        assert_eq!(derive_identifier("?!"), "section");
        assert_eq!(derive_identifier(""), "section");
    }

    #[test]
    fn registry_disambiguates_collisions() {
        let mut registry = AllocationRegistry::new();
        assert_eq!(registry.allocate("Intro"), "intro");
        assert_eq!(registry.allocate("Intro"), "intro_1");
        assert_eq!(registry.allocate("intro"), "intro_2");
        assert_eq!(registry.len(), 3);
    }

    #[test]
    fn registry_skips_literal_suffixed_titles() {
        let mut registry = AllocationRegistry::new();
        assert_eq!(registry.allocate("Intro 1"), "intro_1");
        assert_eq!(registry.allocate("Intro"), "intro");
        assert_eq!(registry.allocate("Intro"), "intro_2");
    }

    #[test]
    fn allocation_is_deterministic_per_registry() {
        let titles = ["A", "B", "A", "?", "?", "A"];
        let run = |titles: &[&str]| {
            let mut registry = AllocationRegistry::new();
            titles
                .iter()
                .map(|title| registry.allocate(title))
                .collect::<Vec<_>>()
        };

        let first = run(&titles);
        let second = run(&titles);
        assert_eq!(first, second);

        let unique: HashSet<_> = first.iter().collect();
        assert_eq!(unique.len(), first.len());
    }
}
