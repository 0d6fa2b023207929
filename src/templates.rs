//! Moderator-authored message templates
//!
//! Templates use `$name` or `${name}` placeholders and `$$` for a literal
//! dollar sign. They are parsed when loaded, so rendering cannot fail.

use crate::config::TemplatePaths;
use std::path::Path;
use thiserror::Error;

/// Placeholder names a template may use
const KNOWN_PLACEHOLDERS: [&str; 2] = ["author", "minutes"];

#[derive(Debug, Error)]
pub enum TemplateError {
    #[error("Failed to read template {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Unknown placeholder: ${0}")]
    UnknownPlaceholder(String),

    #[error("Malformed placeholder at byte {position}")]
    Malformed { position: usize },
}

/// Values substituted into a template
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TemplateVars {
    pub author: String,
    pub minutes: u32,
}

impl TemplateVars {
    pub fn new(author: impl Into<String>, minutes: u32) -> Self {
        Self {
            author: author.into(),
            minutes,
        }
    }

    fn get(&self, name: &str) -> String {
        match name {
            "author" => self.author.clone(),
            "minutes" => self.minutes.to_string(),
            _ => String::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Text(String),
    Placeholder(String),
}

/// A parsed message template
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageTemplate {
    segments: Vec<Segment>,
}

fn is_identifier_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_'
}

impl MessageTemplate {
    /// Parse template text
    ///
    /// # Errors
    /// Returns an error for unknown placeholder names and for a `$` that does
    /// not start a placeholder or an escape
    pub fn parse(text: &str) -> Result<Self, TemplateError> {
        let mut segments = Vec::new();
        let mut literal = String::new();
        let mut chars = text.char_indices().peekable();

        while let Some((position, c)) = chars.next() {
            if c != '$' {
                literal.push(c);
                continue;
            }

            let name = match chars.peek().copied() {
                Some((_, '$')) => {
                    chars.next();
                    literal.push('$');
                    continue;
                }
                Some((_, '{')) => {
                    chars.next();
                    let mut name = String::new();
                    loop {
                        match chars.next() {
                            Some((_, '}')) => break,
                            Some((_, c)) if is_identifier_char(c) => name.push(c),
                            _ => return Err(TemplateError::Malformed { position }),
                        }
                    }
                    name
                }
                Some((_, c)) if c.is_ascii_alphabetic() || c == '_' => {
                    let mut name = String::new();
                    while let Some(&(_, c)) = chars.peek() {
                        if !is_identifier_char(c) {
                            break;
                        }
                        name.push(c);
                        chars.next();
                    }
                    name
                }
                _ => return Err(TemplateError::Malformed { position }),
            };

            if name.is_empty() {
                return Err(TemplateError::Malformed { position });
            }
            if !KNOWN_PLACEHOLDERS.contains(&name.as_str()) {
                return Err(TemplateError::UnknownPlaceholder(name));
            }
            if !literal.is_empty() {
                segments.push(Segment::Text(std::mem::take(&mut literal)));
            }
            segments.push(Segment::Placeholder(name));
        }

        if !literal.is_empty() {
            segments.push(Segment::Text(literal));
        }
        Ok(Self { segments })
    }

    /// Substitute `vars` into the template
    #[must_use]
    pub fn render(&self, vars: &TemplateVars) -> String {
        self.segments
            .iter()
            .map(|segment| match segment {
                Segment::Text(text) => text.clone(),
                Segment::Placeholder(name) => vars.get(name),
            })
            .collect()
    }

    async fn load(path: &Path) -> Result<Self, TemplateError> {
        let text = tokio::fs::read_to_string(path)
            .await
            .map_err(|source| TemplateError::Io {
                path: path.display().to_string(),
                source,
            })?;
        Self::parse(&text)
    }
}

/// The warning and removal messages
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageTemplates {
    pub warning: MessageTemplate,
    pub removal: MessageTemplate,
}

impl MessageTemplates {
    /// Read and parse both template files
    ///
    /// # Errors
    /// Returns an error if either file cannot be read or parsed
    pub async fn load(paths: &TemplatePaths) -> Result<Self, TemplateError> {
        Ok(Self {
            warning: MessageTemplate::load(&paths.warning).await?,
            removal: MessageTemplate::load(&paths.removal).await?,
        })
    }

    /// Build from template text already in memory
    ///
    /// # Errors
    /// Returns an error if either text is not a valid template
    pub fn from_text(warning: &str, removal: &str) -> Result<Self, TemplateError> {
        Ok(Self {
            warning: MessageTemplate::parse(warning)?,
            removal: MessageTemplate::parse(removal)?,
        })
    }

    #[must_use]
    pub fn warning(&self, vars: &TemplateVars) -> String {
        self.warning.render(vars)
    }

    #[must_use]
    pub fn removal(&self, vars: &TemplateVars) -> String {
        self.removal.render(vars)
    }
}
