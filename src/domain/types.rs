//! Shared domain enumerations and request-scoped identities.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use time::OffsetDateTime;

/// Access level granted on a page. Ordered so `>=` comparisons work.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Permission {
    None,
    Read,
    Edit,
    Create,
    Upload,
    Delete,
    Admin,
}

impl Permission {
    pub fn can_read(self) -> bool {
        self >= Permission::Read
    }

    pub fn can_edit(self) -> bool {
        self >= Permission::Edit
    }
}

/// Which metadata view a read should use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MetadataMode {
    /// Whatever is cached, without triggering a metadata render.
    Simple,
    /// Fully rendered metadata.
    Full,
}

/// The user a page is rendered for. Feeds access checks and directive macros.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Viewer {
    pub user: Option<String>,
    pub name: Option<String>,
    pub groups: Vec<String>,
    pub browser_lang: Option<String>,
}

impl Viewer {
    pub fn anonymous() -> Self {
        Self::default()
    }

    pub fn user(login: impl Into<String>) -> Self {
        Self {
            user: Some(login.into()),
            ..Self::default()
        }
    }
}

/// Metadata keys read and written by the include machinery.
pub mod meta_keys {
    pub const TITLE: &str = "title";
    pub const CREATED: &str = "date.created";
    pub const MODIFIED: &str = "date.modified";
    pub const CREATOR: &str = "creator";
    pub const TAGS: &str = "subject";
    pub const COMMENTS: &str = "comments.number";
    pub const LINKBACKS: &str = "linkback.number";
    pub const INDEXMENU: &str = "indexmenu_n";
    pub const TABLE_OF_CONTENTS: &str = "description.tableofcontents";
    pub const HAS_PART: &str = "relation.haspart";
}

/// Interpret a metadata value as a unix timestamp.
pub fn value_as_timestamp(value: &Value) -> Option<OffsetDateTime> {
    let seconds = match value {
        Value::Number(number) => number.as_i64()?,
        Value::String(text) => text.trim().parse().ok()?,
        _ => return None,
    };
    OffsetDateTime::from_unix_timestamp(seconds).ok()
}

/// Interpret a metadata value as a number, accepting numeric strings.
pub fn value_as_f64(value: &Value) -> Option<f64> {
    match value {
        Value::Number(number) => number.as_f64(),
        Value::String(text) => text.trim().parse().ok(),
        _ => None,
    }
}

pub fn value_as_string(value: &Value) -> Option<String> {
    match value {
        Value::String(text) => Some(text.clone()),
        Value::Number(number) => Some(number.to_string()),
        _ => None,
    }
}

/// Tags are stored either as an array or as a space separated string.
pub fn value_as_tags(value: &Value) -> Vec<String> {
    match value {
        Value::Array(items) => items.iter().filter_map(value_as_string).collect(),
        Value::String(text) => text.split_whitespace().map(str::to_string).collect(),
        _ => Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn permissions_are_ordered() {
        assert!(Permission::Edit.can_read());
        assert!(!Permission::Read.can_edit());
        assert!(!Permission::None.can_read());
    }

    #[test]
    fn metadata_value_helpers() {
        assert_eq!(
            value_as_timestamp(&json!(86_400)).map(|ts| ts.unix_timestamp()),
            Some(86_400)
        );
        assert_eq!(value_as_f64(&json!("2.5")), Some(2.5));
        assert_eq!(value_as_tags(&json!("a b")), vec!["a", "b"]);
        assert_eq!(value_as_tags(&json!(["x"])), vec!["x"]);
    }
}
