//! Wiki page identifiers.
//!
//! Page ids are colon-separated paths (`wiki:syntax:tables`). Links and
//! include directives may address pages relative to the namespace of the page
//! they appear on, so the helpers here resolve every accepted relative form
//! into an absolute, cleaned id.

use std::cmp::Ordering;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Name of the page addressed by a bare namespace reference (`ns:`).
pub const START_PAGE: &str = "start";

const WRAPPER_ANCHOR_PREFIX: &str = "plugin_include__";

/// Absolute, cleaned identifier of a wiki page.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PageId(String);

impl PageId {
    /// Clean `raw` into an absolute id. Leading colons are dropped, so `:a:b`
    /// and `a:b` are the same page.
    pub fn new(raw: &str) -> Self {
        Self(clean_id(raw))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Namespace part of the id (`""` for root pages).
    pub fn namespace(&self) -> &str {
        match self.0.rfind(':') {
            Some(idx) => &self.0[..idx],
            None => "",
        }
    }

    /// Last path segment.
    pub fn name(&self) -> &str {
        match self.0.rfind(':') {
            Some(idx) => &self.0[idx + 1..],
            None => &self.0,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Whether the page lives below `namespace` (at any depth).
    pub fn is_in_namespace(&self, namespace: &str) -> bool {
        let namespace = namespace.trim_matches(':');
        namespace.is_empty()
            || self
                .0
                .strip_prefix(namespace)
                .is_some_and(|rest| rest.starts_with(':'))
    }

    /// Number of namespace levels between `namespace` and this page. A page
    /// directly inside the namespace has depth 1.
    pub fn depth_below(&self, namespace: &str) -> usize {
        let namespace = namespace.trim_matches(':');
        let own = self.0.split(':').count();
        let base = if namespace.is_empty() {
            0
        } else {
            namespace.split(':').count()
        };
        own.saturating_sub(base)
    }

    /// Anchor of the wrapper that surrounds this page when it is included.
    pub fn wrapper_anchor(&self) -> String {
        format!("{WRAPPER_ANCHOR_PREFIX}{}", self.0.replace(':', "__"))
    }

    /// Resolve a possibly relative reference against `base_namespace`.
    ///
    /// Accepted forms: `:abs:id`, `.:sibling`, `..:cousin`, `ns:abs`
    /// (absolute when it contains a colon) and `bare` (relative to the base
    /// namespace). A trailing colon addresses the namespace start page.
    pub fn resolve(raw: &str, base_namespace: &str) -> Self {
        let raw = raw.trim();
        let base = base_namespace.trim_matches(':');

        let mut resolved = if let Some(absolute) = raw.strip_prefix(':') {
            absolute.to_string()
        } else if raw.starts_with('.') {
            resolve_dotted(raw, base)
        } else if raw.contains(':') || base.is_empty() {
            raw.to_string()
        } else {
            format!("{base}:{raw}")
        };

        if resolved.ends_with(':') || resolved.is_empty() {
            resolved.push_str(START_PAGE);
        }

        Self::new(&resolved)
    }
}

impl fmt::Display for PageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for PageId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl AsRef<str> for PageId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Lowercase, trim and normalise separators the way the wiki stores ids.
pub fn clean_id(raw: &str) -> String {
    let mut cleaned = String::with_capacity(raw.len());
    let mut last_was_separator = true;

    for ch in raw.trim().chars() {
        let ch = match ch {
            '/' | ';' => ':',
            c if c.is_whitespace() => '_',
            c => c,
        };
        if ch == ':' {
            if !last_was_separator {
                cleaned.push(':');
            }
            last_was_separator = true;
            continue;
        }
        last_was_separator = false;
        cleaned.extend(ch.to_lowercase());
    }

    while cleaned.ends_with(':') {
        cleaned.pop();
    }
    cleaned
}

fn resolve_dotted(raw: &str, base: &str) -> String {
    let mut segments: Vec<&str> = if base.is_empty() {
        Vec::new()
    } else {
        base.split(':').collect()
    };

    let mut rest = raw;
    loop {
        if let Some(tail) = rest.strip_prefix("..:").or_else(|| (rest == "..").then_some("")) {
            segments.pop();
            rest = tail;
        } else if let Some(tail) = rest.strip_prefix(".:").or_else(|| (rest == ".").then_some("")) {
            rest = tail;
        } else if let Some(tail) = rest.strip_prefix('.') {
            // `.page` is shorthand for `.:page`
            rest = tail;
        } else {
            break;
        }
    }

    let mut resolved = segments.join(":");
    if !resolved.is_empty() {
        resolved.push(':');
    }
    resolved.push_str(rest);
    resolved
}

/// Case-insensitive natural ordering: digit runs compare by numeric value, so
/// `page2` sorts before `page10`.
pub fn natural_cmp(left: &str, right: &str) -> Ordering {
    let mut a = left.chars().flat_map(char::to_lowercase).peekable();
    let mut b = right.chars().flat_map(char::to_lowercase).peekable();

    loop {
        match (a.peek().copied(), b.peek().copied()) {
            (None, None) => return left.cmp(right),
            (None, Some(_)) => return Ordering::Less,
            (Some(_), None) => return Ordering::Greater,
            (Some(x), Some(y)) if x.is_ascii_digit() && y.is_ascii_digit() => {
                let lhs = take_digits(&mut a);
                let rhs = take_digits(&mut b);
                let ordering = compare_digit_runs(&lhs, &rhs);
                if ordering != Ordering::Equal {
                    return ordering;
                }
            }
            (Some(x), Some(y)) => {
                if x != y {
                    return x.cmp(&y);
                }
                a.next();
                b.next();
            }
        }
    }
}

fn take_digits(iter: &mut std::iter::Peekable<impl Iterator<Item = char>>) -> String {
    let mut digits = String::new();
    while let Some(ch) = iter.peek().copied() {
        if !ch.is_ascii_digit() {
            break;
        }
        digits.push(ch);
        iter.next();
    }
    digits
}

fn compare_digit_runs(left: &str, right: &str) -> Ordering {
    let left_trimmed = left.trim_start_matches('0');
    let right_trimmed = right.trim_start_matches('0');
    left_trimmed
        .len()
        .cmp(&right_trimmed.len())
        .then_with(|| left_trimmed.cmp(right_trimmed))
        .then_with(|| left.len().cmp(&right.len()))
}
