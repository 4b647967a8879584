//! Heading identifiers, table-of-contents aggregation and section
//! transclusion for compiled wiki instruction streams.
//!
//! The host wiki engine supplies its collaborators through the traits in
//! [`application::repos`] and renders pages with
//! [`application::include::IncludeEngine`].

pub mod application;
pub mod cache;
pub mod config;
pub mod domain;
pub mod infra;
