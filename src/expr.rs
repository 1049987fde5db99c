//! Host expression boundary
//!
//! The engine does not evaluate expressions itself: parameter values wrapped
//! in the expression delimiters are handed to an [`ExprHost`]. The lexer uses
//! the host's parse probe to decide where an expression value ends (so the
//! delimiter characters may appear inside it), and the evaluator uses the
//! host to interpolate parameter values against the local context.
//!
//! [`SimpleExpr`] is the in-tree default host with a deliberately small
//! grammar: JSON literals, dotted context paths (`user.name`), spread of a
//! context object (`...props`), and backtick templates with `${expr}` holes.

use serde_json::Value as JsonValue;
use thiserror::Error;

use crate::ast::Params;
use crate::config::Config;

#[derive(Error, Debug)]
pub enum ExprError {
    #[error("Cannot parse expression: {0}")]
    Parse(String),
    #[error("Unknown variable: {0}")]
    UnknownVariable(String),
    #[error("Unterminated template hole in: {0}")]
    UnterminatedHole(String),
}

/// An external expression evaluator.
pub trait ExprHost {
    /// Would `src` parse as a standalone expression?
    /// Never evaluates, never fails; used by the lexer to find the end of an
    /// expression parameter value.
    fn probe(&self, src: &str) -> bool;

    /// Evaluate `src` against a context map.
    fn eval(&self, src: &str, ctx: &Params) -> Result<JsonValue, ExprError>;
}

/// Is this raw parameter value an interpolation candidate?
/// Either wrapped in the expression delimiters, or a backtick string
/// containing at least one `${...}` hole.
pub fn should_interpolate(raw: &str, cfg: &Config) -> bool {
    if raw.len() > 4
        && raw.starts_with('`')
        && raw.ends_with('`')
        && raw.contains("${")
        && raw.contains('}')
    {
        return true;
    }
    raw.chars().count() > 2 && raw.starts_with(cfg.open_expr) && raw.ends_with(cfg.close_expr)
}

/// Resolve a raw interpolation candidate to a value.
/// Expression delimiters and backticks are stripped here; the body goes to
/// the host.
pub fn interpolate(
    raw: &str,
    ctx: &Params,
    cfg: &Config,
    host: &dyn ExprHost,
) -> Result<JsonValue, ExprError> {
    let body = if raw.starts_with(cfg.open_expr) && raw.ends_with(cfg.close_expr) {
        let mut chars = raw.chars();
        chars.next();
        chars.next_back();
        chars.as_str()
    } else {
        raw
    };
    host.eval(body, ctx)
}

/// Render a JSON value as plain text, the way tag output is written back
/// into the document: strings verbatim, everything else in JSON syntax.
pub(crate) fn value_to_text(value: &JsonValue) -> String {
    match value {
        JsonValue::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// The default expression host.
#[derive(Debug, Clone, Copy, Default)]
pub struct SimpleExpr;

impl SimpleExpr {
    fn is_path(src: &str) -> bool {
        !src.is_empty()
            && src.split('.').all(|part| {
                let mut chars = part.chars();
                match chars.next() {
                    Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
                    _ => return false,
                }
                chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
            })
    }

    fn lookup(src: &str, ctx: &Params) -> Result<JsonValue, ExprError> {
        let mut parts = src.split('.');
        let first = parts.next().unwrap_or_default();
        let mut value = ctx
            .get(first)
            .ok_or_else(|| ExprError::UnknownVariable(first.to_string()))?;
        for part in parts {
            value = value
                .get(part)
                .ok_or_else(|| ExprError::UnknownVariable(src.to_string()))?;
        }
        Ok(value.clone())
    }

    /// Fill the `${...}` holes of a backtick template body.
    fn eval_template(&self, body: &str, ctx: &Params) -> Result<JsonValue, ExprError> {
        let mut out = String::with_capacity(body.len());
        let mut rest = body;
        while let Some(start) = rest.find("${") {
            out.push_str(&rest[..start]);
            let inner = &rest[start + 2..];
            // Holes may nest braces, e.g. ${ {"a":1} }
            let mut depth = 1usize;
            let mut end = None;
            for (i, c) in inner.char_indices() {
                match c {
                    '{' => depth += 1,
                    '}' => {
                        depth -= 1;
                        if depth == 0 {
                            end = Some(i);
                            break;
                        }
                    }
                    _ => {}
                }
            }
            let end = end.ok_or_else(|| ExprError::UnterminatedHole(body.to_string()))?;
            let value = self.eval(&inner[..end], ctx)?;
            out.push_str(&value_to_text(&value));
            rest = &inner[end + 1..];
        }
        out.push_str(rest);
        Ok(JsonValue::String(out))
    }
}

impl ExprHost for SimpleExpr {
    fn probe(&self, src: &str) -> bool {
        let src = src.trim();
        if src.is_empty() {
            return false;
        }
        if let Some(rest) = src.strip_prefix("...") {
            return Self::is_path(rest.trim());
        }
        if serde_json::from_str::<JsonValue>(src).is_ok() {
            return true;
        }
        Self::is_path(src)
    }

    fn eval(&self, src: &str, ctx: &Params) -> Result<JsonValue, ExprError> {
        let trimmed = src.trim();
        if trimmed.is_empty() {
            return Err(ExprError::Parse(src.to_string()));
        }
        if trimmed.len() > 1 && trimmed.starts_with('`') && trimmed.ends_with('`') {
            return self.eval_template(&trimmed[1..trimmed.len() - 1], ctx);
        }
        if let Some(rest) = trimmed.strip_prefix("...") {
            // Spread: resolves to the named context object itself
            return Self::lookup(rest.trim(), ctx);
        }
        if let Ok(value) = serde_json::from_str::<JsonValue>(trimmed) {
            return Ok(value);
        }
        if Self::is_path(trimmed) {
            return Self::lookup(trimmed, ctx);
        }
        Err(ExprError::Parse(src.to_string()))
    }
}
