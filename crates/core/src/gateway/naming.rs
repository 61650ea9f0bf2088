//! Repository name sanitizing.

use crate::errors::GatewayError;

fn is_separator(c: char) -> bool {
    matches!(c, '.' | '_' | '-')
}

/// Map `name` onto the host's allowed charset.
///
/// Alphanumerics, `.`, `_` and `-` survive; anything else becomes `-`. A run
/// of separators collapses to its first character, and separators are
/// stripped from both ends.
pub fn sanitize_repo_name(name: &str) -> Result<String, GatewayError> {
    let mut out = String::with_capacity(name.len());
    for c in name.trim().chars() {
        let c = if c.is_ascii_alphanumeric() || is_separator(c) {
            c
        } else {
            '-'
        };
        if is_separator(c) && out.chars().last().is_some_and(is_separator) {
            continue;
        }
        out.push(c);
    }

    let trimmed = out.trim_matches(is_separator);
    if trimmed.is_empty() {
        return Err(GatewayError::InvalidName(name.to_string()));
    }
    Ok(trimmed.to_string())
}
