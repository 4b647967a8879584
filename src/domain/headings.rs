use serde::{Deserialize, Serialize};

/// Heading metadata derived from a header instruction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HeadingEntry {
    pub identifier: String,
    /// Nesting depth, 1 to 5.
    pub level: u8,
    /// Display text; empty for hidden headings.
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rendered_markup: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub number: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub position: Option<usize>,
}

/// Ordered table of contents for one page.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Toc {
    pub entries: Vec<HeadingEntry>,
}

impl Toc {
    pub fn new(entries: Vec<HeadingEntry>) -> Self {
        Self { entries }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &HeadingEntry> {
        self.entries.iter()
    }

    pub fn find(&self, identifier: &str) -> Option<&HeadingEntry> {
        self.entries
            .iter()
            .find(|entry| entry.identifier == identifier)
    }

    /// JSON payload for a TOC sidebar.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}
