//! Domain layer types and invariants.

pub mod directive;
pub mod error;
pub mod headings;
pub mod instructions;
pub mod page_id;
pub mod pages;
pub mod slug;
pub mod types;
