//! Inclusion directives and their flags.
//!
//! Directives arrive from the host parser as markup such as
//! `{{page>wiki:syntax#tables&noheader&footer}}`. Parsing yields an
//! [`IncludeDirective`]; flags stay raw until resolution so configured
//! defaults can be applied first.

use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::instructions::{Instruction, InstructionKind, Notice, NoticeKind, PluginCall};

/// Errors raised while parsing include markup or its flags.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum DirectiveError {
    #[error("include markup `{markup}` has no `>` separating mode and target")]
    MissingSeparator { markup: String },
    #[error("unknown include mode `{mode}`")]
    UnknownMode { mode: String },
    #[error("include target is empty")]
    EmptyTarget,
    #[error("section mode requires a `#section` target")]
    MissingSection,
    #[error("invalid value `{value}` for flag `{flag}`")]
    InvalidFlagValue { flag: String, value: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum IncludeMode {
    Page,
    Section,
    Namespace,
    TagTopic,
}

impl FromStr for IncludeMode {
    type Err = DirectiveError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "page" => Ok(Self::Page),
            "section" => Ok(Self::Section),
            "namespace" => Ok(Self::Namespace),
            "tagtopic" => Ok(Self::TagTopic),
            other => Err(DirectiveError::UnknownMode {
                mode: other.to_string(),
            }),
        }
    }
}

/// A request to splice another page (or part of it) into the current one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IncludeDirective {
    pub mode: IncludeMode,
    /// Page id, namespace or tag, possibly relative and containing macros.
    pub specifier: String,
    pub section: Option<String>,
    pub flags: Vec<String>,
    /// Heading level at the inclusion point; derived from the stream when absent.
    pub level: Option<u8>,
}

impl IncludeDirective {
    pub fn new(mode: IncludeMode, specifier: impl Into<String>) -> Self {
        Self {
            mode,
            specifier: specifier.into(),
            section: None,
            flags: Vec::new(),
            level: None,
        }
    }

    pub fn with_section(mut self, section: impl Into<String>) -> Self {
        self.section = Some(section.into());
        self
    }

    pub fn with_flags<I, S>(mut self, flags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.flags.extend(flags.into_iter().map(Into::into));
        self
    }

    pub fn with_level(mut self, level: u8) -> Self {
        self.level = Some(level);
        self
    }

    /// Parse include markup, with or without the surrounding braces.
    pub fn parse(markup: &str) -> Result<Self, DirectiveError> {
        let trimmed = markup.trim();
        let inner = trimmed
            .strip_prefix("{{")
            .and_then(|rest| rest.strip_suffix("}}"))
            .unwrap_or(trimmed);

        let (mode, rest) =
            inner
                .split_once('>')
                .ok_or_else(|| DirectiveError::MissingSeparator {
                    markup: markup.to_string(),
                })?;
        let mode = IncludeMode::from_str(mode)?;

        let mut parts = rest.split('&');
        let target = parts.next().unwrap_or_default().trim();
        let flags = parts
            .map(str::trim)
            .filter(|flag| !flag.is_empty())
            .map(str::to_string)
            .collect();

        let (specifier, section) = match target.split_once('#') {
            Some((page, section)) => {
                let section = section.trim();
                (
                    page.trim(),
                    (!section.is_empty()).then(|| section.to_string()),
                )
            }
            None => (target, None),
        };

        let specifier = match (mode, specifier.is_empty()) {
            (IncludeMode::Namespace, true) => ".".to_string(),
            (_, true) => return Err(DirectiveError::EmptyTarget),
            (_, false) => specifier.to_string(),
        };

        if mode == IncludeMode::Section && section.is_none() {
            return Err(DirectiveError::MissingSection);
        }

        Ok(Self {
            mode,
            specifier,
            section,
            flags,
            level: None,
        })
    }
}

/// Turn raw include markup into an instruction. Malformed markup degrades to
/// a diagnostic notice in preview and to nothing otherwise.
pub fn handle_markup(
    markup: &str,
    level: u8,
    position: Option<usize>,
    preview: bool,
) -> Option<Instruction> {
    match IncludeDirective::parse(markup) {
        Ok(directive) => Some(Instruction {
            kind: InstructionKind::Plugin(PluginCall::Include(directive.with_level(level))),
            position,
        }),
        Err(err) if preview => {
            let mut instruction =
                Notice::new(NoticeKind::MalformedDirective, err.to_string()).into_instruction();
            instruction.position = position;
            Some(instruction)
        }
        Err(_) => None,
    }
}

/// Ordering applied to pages resolved from one directive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SortOrder {
    Id,
    Title,
    Created,
    Modified,
    /// Numeric `indexmenu_n` metadata.
    IndexMenu,
    /// Numeric metadata under the configured custom key.
    Custom,
}

impl FromStr for SortOrder {
    type Err = DirectiveError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "id" | "page" => Ok(Self::Id),
            "title" => Ok(Self::Title),
            "created" => Ok(Self::Created),
            "modified" => Ok(Self::Modified),
            "indexmenu" => Ok(Self::IndexMenu),
            "custom" => Ok(Self::Custom),
            other => Err(DirectiveError::InvalidFlagValue {
                flag: "order".to_string(),
                value: other.to_string(),
            }),
        }
    }
}

/// Resolved directive options.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlagSet {
    pub header: bool,
    pub first_section_only: bool,
    pub readmore: bool,
    pub footer: bool,
    pub permalink: bool,
    pub date: bool,
    pub modified_date: bool,
    pub user: bool,
    pub comments: bool,
    pub linkbacks: bool,
    pub tags: bool,
    pub edit_button: bool,
    pub redirect: bool,
    pub indent: bool,
    pub link_only: bool,
    pub title: bool,
    pub page_exists: bool,
    pub paragraph_links: bool,
    pub inline: bool,
    pub order: SortOrder,
    pub reverse: bool,
    /// Namespace listing depth; 0 means unlimited.
    pub depth: usize,
}

impl Default for FlagSet {
    fn default() -> Self {
        Self {
            header: true,
            first_section_only: false,
            readmore: true,
            footer: false,
            permalink: true,
            date: true,
            modified_date: false,
            user: true,
            comments: true,
            linkbacks: false,
            tags: true,
            edit_button: true,
            redirect: true,
            indent: true,
            link_only: false,
            title: false,
            page_exists: false,
            paragraph_links: true,
            inline: false,
            order: SortOrder::Id,
            reverse: false,
            depth: 1,
        }
    }
}

impl FlagSet {
    /// Apply `flags` on top of `self`. Unknown flags are returned so callers
    /// can report them; they never fail the directive.
    pub fn apply<S: AsRef<str>>(
        mut self,
        flags: &[S],
    ) -> Result<(Self, Vec<String>), DirectiveError> {
        let mut unknown = Vec::new();

        for raw in flags {
            let raw = raw.as_ref().trim();
            if let Some((name, value)) = raw.split_once('=') {
                self.apply_valued(name.trim(), value.trim())?;
                continue;
            }

            let name = raw.to_ascii_lowercase();
            if !self.apply_toggle(&name) {
                unknown.push(name);
            }
        }

        Ok((self, unknown))
    }

    fn apply_valued(&mut self, name: &str, value: &str) -> Result<(), DirectiveError> {
        match name.to_ascii_lowercase().as_str() {
            "order" => self.order = SortOrder::from_str(value)?,
            "depth" => {
                self.depth = value
                    .parse()
                    .map_err(|_| DirectiveError::InvalidFlagValue {
                        flag: "depth".to_string(),
                        value: value.to_string(),
                    })?
            }
            other => {
                return Err(DirectiveError::InvalidFlagValue {
                    flag: other.to_string(),
                    value: value.to_string(),
                });
            }
        }
        Ok(())
    }

    fn apply_toggle(&mut self, name: &str) -> bool {
        let (enabled, base) = match name {
            "fullpage" => (false, "firstseconly"),
            "sort" => (false, "rsort"),
            "showfooter" => (true, "footer"),
            "hidefooter" => (false, "footer"),
            other => match other.strip_prefix("no") {
                Some(rest) if Self::toggle(self, rest).is_some() => (false, rest),
                _ => (true, other),
            },
        };

        match Self::toggle(self, base) {
            Some(slot) => {
                *slot = enabled;
                true
            }
            None => false,
        }
    }

    fn toggle<'a>(&'a mut self, name: &str) -> Option<&'a mut bool> {
        let slot = match name {
            "header" => &mut self.header,
            "firstseconly" | "firstsec" => &mut self.first_section_only,
            "readmore" => &mut self.readmore,
            "footer" => &mut self.footer,
            "permalink" => &mut self.permalink,
            "date" => &mut self.date,
            "mdate" => &mut self.modified_date,
            "user" => &mut self.user,
            "comments" => &mut self.comments,
            "linkbacks" => &mut self.linkbacks,
            "tags" => &mut self.tags,
            "editbtn" | "editbutton" => &mut self.edit_button,
            "redirect" => &mut self.redirect,
            "indent" => &mut self.indent,
            "linkonly" => &mut self.link_only,
            "title" => &mut self.title,
            "pageexists" => &mut self.page_exists,
            "parlink" => &mut self.paragraph_links,
            "inline" => &mut self.inline,
            "rsort" => &mut self.reverse,
            _ => return None,
        };
        Some(slot)
    }
}
