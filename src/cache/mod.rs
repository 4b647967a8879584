//! Render caching support.
//!
//! - **Dependency sets**: everything a render read, with the staleness policy
//!   the host applies before reusing a cached render.
//! - **Instruction cache**: compiled streams of included pages, shared by all
//!   renders of one engine.
//!
//! ## Configuration
//!
//! ```toml
//! [cache]
//! enable_instruction_cache = true
//! instruction_cache_limit = 256
//! ```

mod config;
pub mod deps;
mod lock;
mod store;

pub use config::CacheConfig;
pub use deps::{CacheDependencySet, DependencyKey};
pub use store::InstructionCache;

pub(crate) use lock::{rw_read, rw_write};
