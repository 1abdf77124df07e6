//! Package identifier helpers
//!
//! Module node values are a legacy comma-joined list of identifiers. These
//! helpers are the only place that format is read or written; everything above
//! them works on ordered sets.

use std::collections::BTreeSet;

use crate::constants::PACKAGE_SEPARATOR;
use crate::constants::PLATFORM_SEPARATOR;
use crate::MirrorError;
use crate::Result;

/// Strips the version (and platform qualifier) from `name@version[+platform]`.
///
/// A leading `@` belongs to a scoped name, so `@scope/pkg@1.0.0` yields `@scope/pkg`.
/// The separator is rejected anywhere in the identifier; it would split into
/// several tokens once written to the module node.
pub fn split_module_name(identifier: &str) -> Result<&str> {
    if identifier.contains(PACKAGE_SEPARATOR) {
        return Err(MirrorError::MalformedIdentifier(identifier.to_string()).into());
    }
    let name = match identifier.rfind('@') {
        Some(idx) if idx > 0 => &identifier[..idx],
        _ => identifier,
    };
    if name.is_empty() {
        return Err(MirrorError::MalformedIdentifier(identifier.to_string()).into());
    }
    Ok(name)
}

/// Splits a module node value into its non-empty tokens.
pub fn parse_tokens(value: &str) -> BTreeSet<String> {
    value
        .split(PACKAGE_SEPARATOR)
        .filter(|t| !t.is_empty())
        .map(str::to_string)
        .collect()
}

/// Whole-token membership test against a comma-joined value.
pub fn contains_token(
    value: &str,
    identifier: &str,
) -> bool {
    value.split(PACKAGE_SEPARATOR).any(|t| t == identifier)
}

/// Appends `identifier` unless already present as a whole token.
///
/// Returns `None` when the value already holds it.
pub fn append_token(
    value: &str,
    identifier: &str,
) -> Option<String> {
    if contains_token(value, identifier) {
        return None;
    }
    if value.is_empty() {
        return Some(identifier.to_string());
    }
    Some(format!("{value}{PACKAGE_SEPARATOR}{identifier}"))
}

/// Removes every token equal to `identifier`, keeping the order of the others.
///
/// Empty tokens are dropped along the way so no dangling separator survives.
pub fn remove_token(
    value: &str,
    identifier: &str,
) -> String {
    value
        .split(PACKAGE_SEPARATOR)
        .filter(|t| !t.is_empty() && *t != identifier)
        .collect::<Vec<_>>()
        .join(&PACKAGE_SEPARATOR.to_string())
}

/// `name@version` qualified with a platform: `name@version+platform`.
pub fn with_platform(
    identifier: &str,
    platform: &str,
) -> String {
    format!("{identifier}{PLATFORM_SEPARATOR}{platform}")
}
