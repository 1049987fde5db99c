//! Delimiter configuration for the tag grammar
//!
//! Every delimiter is a single character, and the lexer and parser must be
//! driven by the same config or the committed tokens become ungrammatical.

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug, PartialEq)]
pub enum ConfigError {
    #[error("Last stopper must be one of / ? ! #, got {0:?}")]
    InvalidStopper(char),
    #[error("Delimiter characters must be distinct: {0:?} is used twice")]
    DuplicateDelimiter(char),
}

/// Tag grammar delimiters.
///
/// With the defaults, a single tag is `<randomInt min=1 max=10 />`, a double
/// tag is `<upper>text</upper>`, and `{expr}` wraps an interpolatable
/// parameter value. Changing `open_tag`/`close_tag` to `{`/`}` makes the
/// single tag `{randomInt /}` -- it is a good idea to keep them paired.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Opens every tag
    pub open_tag: char,
    /// Closes every tag
    pub close_tag: char,
    /// Marks a single tag's self-closure, and the start of a double tag's
    /// closing half: `<stuff />` and `</stuff>` with the default `/`
    pub last_stopper: char,
    /// Opens an expression parameter value
    pub open_expr: char,
    /// Closes an expression parameter value
    pub close_expr: char,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            open_tag: '<',
            close_tag: '>',
            last_stopper: '/',
            open_expr: '{',
            close_expr: '}',
        }
    }
}

const ALLOWED_STOPPERS: [char; 4] = ['/', '?', '!', '#'];

impl Config {
    /// Check that the stopper is allowed and all five delimiters are
    /// pairwise distinct. Call this once at startup, before lexing.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !ALLOWED_STOPPERS.contains(&self.last_stopper) {
            return Err(ConfigError::InvalidStopper(self.last_stopper));
        }
        let chars = [
            self.open_tag,
            self.close_tag,
            self.last_stopper,
            self.open_expr,
            self.close_expr,
        ];
        for (i, c) in chars.iter().enumerate() {
            if chars[i + 1..].contains(c) {
                return Err(ConfigError::DuplicateDelimiter(*c));
            }
        }
        Ok(())
    }
}
