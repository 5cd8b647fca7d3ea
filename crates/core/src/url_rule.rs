//! URL rules for matching request paths to endpoints.
//!
//! A rule is a path template with typed parameters:
//!
//! ```text
//! /users/<int:id>
//! /files/<path:rest>
//! /price/<float:amount>/<string:currency>
//! ```
//!
//! Rules are compiled once, at route registration, into an anchored regex.
//!
//! ## Examples
//!
//! ```
//! use laconic_core::UrlRule;
//!
//! let rule = UrlRule::parse("/users/<int:id>").unwrap();
//! assert!(rule.matches("/users/42"));
//! assert!(!rule.matches("/users/bob"));
//!
//! let params = rule.extract_params("/users/-7").unwrap();
//! assert_eq!(params, vec![("id".to_string(), "-7".to_string())]);
//! ```

use core::fmt;
use std::str::FromStr;

use regex::Regex;
use thiserror::Error;

/// Errors that can occur when parsing a [`UrlRule`].
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum UrlRuleError {
    /// A `<` was not followed by a complete `type:name>` definition.
    #[error("Malformed URL rule `{0}`, missing a part of param definition")]
    Incomplete(String),

    /// A `>` or `:` appeared outside of a parameter definition.
    #[error("Unexpected character `{ch}` in the URL rule `{rule}`")]
    UnexpectedChar {
        /// The offending character.
        ch: char,
        /// The full rule.
        rule: String,
    },

    /// The parameter type is not one of `int`, `string`, `float`, `path`.
    #[error("Unknown URL parameter type `{ty}` in the URL rule `{rule}`")]
    UnknownType {
        /// The unknown type name.
        ty: String,
        /// The full rule.
        rule: String,
    },

    /// The parameter name is not a valid identifier.
    #[error("Invalid URL parameter name `{name}` in the URL rule `{rule}`")]
    InvalidName {
        /// The rejected name.
        name: String,
        /// The full rule.
        rule: String,
    },

    /// The same parameter name is used twice.
    #[error("Duplicate URL parameter `{name}` in the URL rule `{rule}`")]
    DuplicateParam {
        /// The repeated name.
        name: String,
        /// The full rule.
        rule: String,
    },

    /// The generated pattern failed to compile.
    #[error("URL rule `{rule}` could not be compiled: {reason}")]
    Regex {
        /// The full rule.
        rule: String,
        /// Compiler message.
        reason: String,
    },
}

/// Type of a URL parameter, deciding which path segments it matches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UrlParamType {
    /// Signed integer: `-?\d+`
    Int,
    /// Single path segment: `[^/]+`
    Str,
    /// Signed decimal: `-?\d+(\.\d*)?`
    Float,
    /// Remainder of the path, slashes included.
    Path,
}

impl UrlParamType {
    /// The regex fragment matched by this type.
    #[must_use]
    pub const fn pattern(self) -> &'static str {
        match self {
            Self::Int => r"-?\d+",
            Self::Str => r"[^/]+",
            Self::Float => r"-?\d+(?:\.\d*)?",
            Self::Path => r"[^/].*",
        }
    }

    /// Name used in rule templates.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Int => "int",
            Self::Str => "string",
            Self::Float => "float",
            Self::Path => "path",
        }
    }
}

impl fmt::Display for UrlParamType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for UrlParamType {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "int" => Ok(Self::Int),
            "string" => Ok(Self::Str),
            "float" => Ok(Self::Float),
            "path" => Ok(Self::Path),
            _ => Err(()),
        }
    }
}

#[derive(Debug, PartialEq, Eq)]
enum Token<'a> {
    Open,
    Close,
    Colon,
    Text(&'a str),
}

fn tokenize(rule: &str) -> Vec<Token<'_>> {
    let mut tokens = Vec::new();
    let mut start = 0;
    for (i, ch) in rule.char_indices() {
        let delim = match ch {
            '<' => Token::Open,
            '>' => Token::Close,
            ':' => Token::Colon,
            _ => continue,
        };
        if start < i {
            tokens.push(Token::Text(&rule[start..i]));
        }
        tokens.push(delim);
        start = i + ch.len_utf8();
    }
    if start < rule.len() {
        tokens.push(Token::Text(&rule[start..]));
    }
    tokens
}

fn is_valid_name(name: &str) -> bool {
    let mut chars = name.chars();
    chars
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// A compiled URL rule.
#[derive(Debug, Clone)]
pub struct UrlRule {
    rule: String,
    regex: Regex,
    params: Vec<(String, UrlParamType)>,
}

impl UrlRule {
    /// Parse and compile a URL rule template.
    ///
    /// # Errors
    ///
    /// Returns an error if the template is malformed, uses an unknown
    /// parameter type, or repeats a parameter name.
    pub fn parse(rule: &str) -> Result<Self, UrlRuleError> {
        let tokens = tokenize(rule);
        let mut pattern = String::from("^");
        let mut params: Vec<(String, UrlParamType)> = Vec::new();
        let mut rest = tokens.as_slice();

        loop {
            match rest {
                [] => break,
                [
                    Token::Open,
                    Token::Text(ty),
                    Token::Colon,
                    Token::Text(name),
                    Token::Close,
                    tail @ ..,
                ] => {
                    let ty = ty.parse::<UrlParamType>().map_err(|()| UrlRuleError::UnknownType {
                        ty: (*ty).to_string(),
                        rule: rule.to_string(),
                    })?;
                    if !is_valid_name(name) {
                        return Err(UrlRuleError::InvalidName {
                            name: (*name).to_string(),
                            rule: rule.to_string(),
                        });
                    }
                    if params.iter().any(|(existing, _)| existing == name) {
                        return Err(UrlRuleError::DuplicateParam {
                            name: (*name).to_string(),
                            rule: rule.to_string(),
                        });
                    }
                    pattern.push_str(&format!("(?P<{name}>{})", ty.pattern()));
                    params.push(((*name).to_string(), ty));
                    rest = tail;
                }
                [Token::Open, ..] => return Err(UrlRuleError::Incomplete(rule.to_string())),
                [Token::Close, ..] => {
                    return Err(UrlRuleError::UnexpectedChar {
                        ch: '>',
                        rule: rule.to_string(),
                    });
                }
                [Token::Colon, ..] => {
                    return Err(UrlRuleError::UnexpectedChar {
                        ch: ':',
                        rule: rule.to_string(),
                    });
                }
                [Token::Text(text), tail @ ..] => {
                    pattern.push_str(&regex::escape(text));
                    rest = tail;
                }
            }
        }
        pattern.push('$');

        let regex = Regex::new(&pattern).map_err(|e| UrlRuleError::Regex {
            rule: rule.to_string(),
            reason: e.to_string(),
        })?;

        Ok(Self {
            rule: rule.to_string(),
            regex,
            params,
        })
    }

    /// The original template text.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.rule
    }

    /// Parameters declared in the rule, in template order.
    #[must_use]
    pub fn params(&self) -> &[(String, UrlParamType)] {
        &self.params
    }

    /// Test whether `path` fully matches this rule.
    #[must_use]
    pub fn matches(&self, path: &str) -> bool {
        self.regex.is_match(path)
    }

    /// Extract raw parameter values from a matching `path`.
    ///
    /// Returns `None` if the path does not match.
    #[must_use]
    pub fn extract_params(&self, path: &str) -> Option<Vec<(String, String)>> {
        let captures = self.regex.captures(path)?;
        Some(
            self.params
                .iter()
                .filter_map(|(name, _)| {
                    captures
                        .name(name)
                        .map(|m| (name.clone(), m.as_str().to_string()))
                })
                .collect(),
        )
    }
}

impl fmt::Display for UrlRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.rule)
    }
}

impl FromStr for UrlRule {
    type Err = UrlRuleError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}
