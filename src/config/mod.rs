//! Configuration layer: typed settings with layered precedence (file → env).

use std::{path::Path, str::FromStr};

use config::{Config, Environment, File};
use serde::Deserialize;
use thiserror::Error;
use tracing::level_filters::LevelFilter;

use crate::domain::directive::FlagSet;
use crate::domain::instructions::MAX_HEADING_LEVEL;

const DEFAULT_CONFIG_BASENAME: &str = "config/default";
const LOCAL_CONFIG_BASENAME: &str = "wikiweave";
const ENV_PREFIX: &str = "WIKIWEAVE";
const DEFAULT_TOC_TOP_LEVEL: u8 = 1;
const DEFAULT_TOC_MAX_LEVEL: u8 = 3;
const DEFAULT_TOC_MIN_HEADINGS: usize = 3;
const DEFAULT_MAX_INCLUDE_DEPTH: usize = 16;
const DEFAULT_STRIPPED_PLUGINS: &[&str] = &["tag", "discussion_comments", "linkback"];
const DEFAULT_CUSTOM_SORT_KEY: &str = "include_n";
const DEFAULT_LANG: &str = "en";
const DEFAULT_INSTRUCTION_CACHE_LIMIT: usize = 256;

/// Fully-resolved settings after precedence resolution and validation.
#[derive(Debug, Clone)]
pub struct Settings {
    pub logging: LoggingSettings,
    pub toc: TocSettings,
    pub include: IncludeSettings,
    pub cache: CacheSettings,
}

#[derive(Debug, Clone)]
pub struct LoggingSettings {
    pub level: LevelFilter,
    pub format: LogFormat,
}

#[derive(Debug, Clone, Copy)]
pub enum LogFormat {
    Json,
    Compact,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TocSettings {
    /// Shallowest heading level shown in the TOC.
    pub top_level: u8,
    /// Deepest heading level shown in the TOC.
    pub max_level: u8,
    /// Below this many entries no TOC is displayed.
    pub min_headings: usize,
    pub numbering: bool,
    /// Heading level that starts tier-one numbering.
    pub first_tier: u8,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IncludeSettings {
    /// Flags applied before the ones written in a directive.
    pub default_flags: FlagSet,
    pub max_depth: usize,
    /// Plugin calls removed from included content.
    pub stripped_plugins: Vec<String>,
    /// Metadata key used by `order=custom`.
    pub custom_sort_key: String,
    /// Substituted for `@BROWSER_LANG@` when the viewer sent none.
    pub default_lang: String,
    /// Keep pages anonymous viewers cannot read out of persisted metadata.
    pub safe_index: bool,
}

#[derive(Debug, Clone)]
pub struct CacheSettings {
    pub enable_instruction_cache: bool,
    pub instruction_cache_limit: usize,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            logging: LoggingSettings {
                level: LevelFilter::INFO,
                format: LogFormat::Compact,
            },
            toc: TocSettings::default(),
            include: IncludeSettings::default(),
            cache: CacheSettings {
                enable_instruction_cache: true,
                instruction_cache_limit: DEFAULT_INSTRUCTION_CACHE_LIMIT,
            },
        }
    }
}

impl Default for TocSettings {
    fn default() -> Self {
        Self {
            top_level: DEFAULT_TOC_TOP_LEVEL,
            max_level: DEFAULT_TOC_MAX_LEVEL,
            min_headings: DEFAULT_TOC_MIN_HEADINGS,
            numbering: false,
            first_tier: 1,
        }
    }
}

impl Default for IncludeSettings {
    fn default() -> Self {
        Self {
            default_flags: FlagSet::default(),
            max_depth: DEFAULT_MAX_INCLUDE_DEPTH,
            stripped_plugins: DEFAULT_STRIPPED_PLUGINS
                .iter()
                .map(|name| name.to_string())
                .collect(),
            custom_sort_key: DEFAULT_CUSTOM_SORT_KEY.to_string(),
            default_lang: DEFAULT_LANG.to_string(),
            safe_index: true,
        }
    }
}

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("failed to build configuration: {0}")]
    Build(#[from] config::ConfigError),
    #[error("invalid configuration for `{key}`: {reason}")]
    Invalid { key: &'static str, reason: String },
}

impl LoadError {
    fn invalid(key: &'static str, reason: impl Into<String>) -> Self {
        Self::Invalid {
            key,
            reason: reason.into(),
        }
    }
}

/// Load settings using the configured precedence (files → environment).
pub fn load(config_file: Option<&Path>) -> Result<Settings, LoadError> {
    let mut builder = Config::builder()
        .add_source(File::with_name(DEFAULT_CONFIG_BASENAME).required(false))
        .add_source(File::with_name(LOCAL_CONFIG_BASENAME).required(false));

    if let Some(path) = config_file {
        builder = builder.add_source(File::from(path).required(true));
    }

    builder = builder.add_source(Environment::with_prefix(ENV_PREFIX).separator("__"));

    let raw: RawSettings = builder.build()?.try_deserialize()?;
    Settings::from_raw(raw)
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawSettings {
    logging: RawLoggingSettings,
    toc: RawTocSettings,
    include: RawIncludeSettings,
    cache: RawCacheSettings,
}

impl Settings {
    fn from_raw(raw: RawSettings) -> Result<Self, LoadError> {
        let RawSettings {
            logging,
            toc,
            include,
            cache,
        } = raw;

        let logging = build_logging_settings(logging)?;
        let toc = build_toc_settings(toc)?;
        let include = build_include_settings(include)?;
        let cache = build_cache_settings(cache);

        Ok(Self {
            logging,
            toc,
            include,
            cache,
        })
    }
}

fn build_logging_settings(logging: RawLoggingSettings) -> Result<LoggingSettings, LoadError> {
    let level = match logging.level {
        Some(level) => LevelFilter::from_str(level.as_str()).map_err(|err| {
            LoadError::invalid("logging.level", format!("failed to parse: {err}"))
        })?,
        None => LevelFilter::INFO,
    };

    let format = if logging.json.unwrap_or(false) {
        LogFormat::Json
    } else {
        LogFormat::Compact
    };

    Ok(LoggingSettings { level, format })
}

fn build_toc_settings(toc: RawTocSettings) -> Result<TocSettings, LoadError> {
    let top_level = heading_level(toc.top_level, DEFAULT_TOC_TOP_LEVEL, "toc.top_level")?;
    let max_level = heading_level(toc.max_level, DEFAULT_TOC_MAX_LEVEL, "toc.max_level")?;
    if max_level < top_level {
        return Err(LoadError::invalid(
            "toc.max_level",
            format!("must not be shallower than toc.top_level ({top_level})"),
        ));
    }
    let first_tier = heading_level(toc.first_tier, 1, "toc.first_tier")?;

    Ok(TocSettings {
        top_level,
        max_level,
        min_headings: toc.min_headings.unwrap_or(DEFAULT_TOC_MIN_HEADINGS),
        numbering: toc.numbering.unwrap_or(false),
        first_tier,
    })
}

fn build_include_settings(include: RawIncludeSettings) -> Result<IncludeSettings, LoadError> {
    let flags = include.flags.unwrap_or_default();
    let (default_flags, unknown) = FlagSet::default()
        .apply(&flags)
        .map_err(|err| LoadError::invalid("include.flags", err.to_string()))?;
    if !unknown.is_empty() {
        return Err(LoadError::invalid(
            "include.flags",
            format!("unknown flags: {}", unknown.join(", ")),
        ));
    }

    let max_depth = include.max_depth.unwrap_or(DEFAULT_MAX_INCLUDE_DEPTH);
    if max_depth == 0 {
        return Err(LoadError::invalid(
            "include.max_depth",
            "must be greater than zero",
        ));
    }

    let stripped_plugins = include.stripped_plugins.unwrap_or_else(|| {
        DEFAULT_STRIPPED_PLUGINS
            .iter()
            .map(|name| name.to_string())
            .collect()
    });

    let custom_sort_key = non_blank(include.custom_sort_key)
        .unwrap_or_else(|| DEFAULT_CUSTOM_SORT_KEY.to_string());
    let default_lang =
        non_blank(include.default_lang).unwrap_or_else(|| DEFAULT_LANG.to_string());

    Ok(IncludeSettings {
        default_flags,
        max_depth,
        stripped_plugins,
        custom_sort_key,
        default_lang,
        safe_index: include.safe_index.unwrap_or(true),
    })
}

fn build_cache_settings(cache: RawCacheSettings) -> CacheSettings {
    CacheSettings {
        enable_instruction_cache: cache.enable_instruction_cache.unwrap_or(true),
        instruction_cache_limit: cache
            .instruction_cache_limit
            .unwrap_or(DEFAULT_INSTRUCTION_CACHE_LIMIT),
    }
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawLoggingSettings {
    level: Option<String>,
    json: Option<bool>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawTocSettings {
    top_level: Option<u8>,
    max_level: Option<u8>,
    min_headings: Option<usize>,
    numbering: Option<bool>,
    first_tier: Option<u8>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawIncludeSettings {
    flags: Option<Vec<String>>,
    max_depth: Option<usize>,
    stripped_plugins: Option<Vec<String>>,
    custom_sort_key: Option<String>,
    default_lang: Option<String>,
    safe_index: Option<bool>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawCacheSettings {
    enable_instruction_cache: Option<bool>,
    instruction_cache_limit: Option<usize>,
}

fn heading_level(value: Option<u8>, default: u8, key: &'static str) -> Result<u8, LoadError> {
    let level = value.unwrap_or(default);
    if !(1..=MAX_HEADING_LEVEL).contains(&level) {
        return Err(LoadError::invalid(
            key,
            format!("must be between 1 and {MAX_HEADING_LEVEL}"),
        ));
    }
    Ok(level)
}

fn non_blank(value: Option<String>) -> Option<String> {
    value.and_then(|value| {
        let trimmed = value.trim();
        (!trimmed.is_empty()).then(|| trimmed.to_string())
    })
}

#[cfg(test)]
mod tests;
