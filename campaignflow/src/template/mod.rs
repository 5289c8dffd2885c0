//! Prompt template rendering.
//!
//! Templates use `{name}` placeholders. `{{` and `}}` produce literal braces,
//! which lets prompts embed JSON examples. A placeholder may be a dotted path
//! (`{strategy.channels}`) that indexes into a structured stage output.
//!
//! Anything else in braces that is not a valid placeholder name (for example
//! `{ "status": "pass" }`) is left untouched.

use crate::context::PipelineContext;
use crate::errors::MissingVariableError;
use regex::{Captures, Regex};
use std::sync::OnceLock;

const PLACEHOLDER_PATTERN: &str = r"\{\{|\}\}|\{([A-Za-z_][A-Za-z0-9_]*(?:\.[A-Za-z0-9_]+)*)\}";

// The pattern is a constant covered by `test_placeholder_pattern_compiles`.
#[allow(clippy::expect_used)]
fn placeholder_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(PLACEHOLDER_PATTERN).expect("placeholder pattern is valid"))
}

/// Renders a template against a context.
///
/// # Errors
///
/// Returns `MissingVariableError` for the first placeholder with no value.
/// No partially rendered text is ever returned.
pub fn render(template: &str, context: &PipelineContext) -> Result<String, MissingVariableError> {
    let mut out = String::with_capacity(template.len());
    let mut last = 0;

    for caps in placeholder_regex().captures_iter(template) {
        let whole = caps.get(0).map_or(0..0, |m| m.range());
        out.push_str(&template[last..whole.start]);
        last = whole.end;

        match token(&caps) {
            Token::OpenBrace => out.push('{'),
            Token::CloseBrace => out.push('}'),
            Token::Variable(path) => {
                let value = context
                    .lookup(path)
                    .ok_or_else(|| MissingVariableError::new(path))?;
                out.push_str(&stringify(value));
            }
        }
    }

    out.push_str(&template[last..]);
    Ok(out)
}

/// Returns every placeholder path in the template, in first-seen order.
#[must_use]
pub fn placeholders(template: &str) -> Vec<String> {
    let mut seen = Vec::new();
    for caps in placeholder_regex().captures_iter(template) {
        if let Token::Variable(path) = token(&caps) {
            if !seen.iter().any(|p: &String| p == path) {
                seen.push(path.to_string());
            }
        }
    }
    seen
}

/// Returns the context keys a template needs (the first segment of each path).
#[must_use]
pub fn root_variables(template: &str) -> Vec<String> {
    let mut roots: Vec<String> = Vec::new();
    for path in placeholders(template) {
        let root = path.split('.').next().unwrap_or(&path).to_string();
        if !roots.contains(&root) {
            roots.push(root);
        }
    }
    roots
}

/// Converts a context value to prompt text.
///
/// Strings are inserted verbatim; everything else is compact JSON.
#[must_use]
pub fn stringify(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

enum Token<'a> {
    OpenBrace,
    CloseBrace,
    Variable(&'a str),
}

fn token<'a>(caps: &Captures<'a>) -> Token<'a> {
    match caps.get(1) {
        Some(name) => Token::Variable(name.as_str()),
        None if caps.get(0).is_some_and(|m| m.as_str() == "{{") => Token::OpenBrace,
        None => Token::CloseBrace,
    }
}
