//! Identifier parsing.
//!
//! Parses identifiers like:
//! - `chalk`
//! - `chalk@^5`
//! - `npm:@scope/pkg@^1.2.3`
//! - `gh:user/repo@v1.2.3`
//! - `py:requests`
//! - `sys:curl`

use super::error::PkgError;
use std::fmt;

/// A parsed identifier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identifier {
    /// Source prefix, lower-cased (e.g. `npm`, `py`, `gh`).
    pub prefix: Option<String>,
    /// Package name, trimmed. Scoped names keep their leading `@`.
    pub name: String,
    /// Version range or tag (`None` means latest).
    pub range: Option<String>,
}

impl Identifier {
    /// Parse a raw identifier.
    ///
    /// # Errors
    /// Returns `PKG_INVALID_IDENTIFIER` if the name is empty after trimming.
    pub fn parse(raw: &str) -> Result<Self, PkgError> {
        let (prefix, rest) = split_prefix(raw.trim());
        let (name, range) = split_range(rest);

        let name = name.trim();
        if name.is_empty() {
            return Err(PkgError::invalid_identifier(format!(
                "Invalid identifier '{raw}': empty package name"
            )));
        }

        Ok(Self {
            prefix: prefix.map(str::to_ascii_lowercase),
            name: name.to_string(),
            range: range
                .map(str::trim)
                .filter(|r| !r.is_empty())
                .map(String::from),
        })
    }

    /// Scope without the `@`, if the name is scoped (`@scope/name`).
    #[must_use]
    pub fn scope(&self) -> Option<&str> {
        scope_of(&self.name)
    }
}

impl fmt::Display for Identifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(prefix) = &self.prefix {
            write!(f, "{prefix}:")?;
        }
        f.write_str(&self.name)?;
        if let Some(range) = &self.range {
            write!(f, "@{range}")?;
        }
        Ok(())
    }
}

/// Split a leading `^[A-Za-z]+:` prefix off `input`.
///
/// Returns the prefix as written (callers lower-case it) and the remainder.
#[must_use]
pub fn split_prefix(input: &str) -> (Option<&str>, &str) {
    if let Some(colon) = input.find(':') {
        let head = &input[..colon];
        if !head.is_empty() && head.bytes().all(|b| b.is_ascii_alphabetic()) {
            return (Some(head), &input[colon + 1..]);
        }
    }
    (None, input)
}

/// Split `name@range` at the last `@`, which only counts when it is not at index 0.
#[must_use]
pub fn split_range(input: &str) -> (&str, Option<&str>) {
    match input.rfind('@') {
        Some(at) if at > 0 => (&input[..at], Some(&input[at + 1..])),
        _ => (input, None),
    }
}

/// Scope of a name like `@scope/pkg`, without the `@`.
#[must_use]
pub fn scope_of(name: &str) -> Option<&str> {
    let rest = name.strip_prefix('@')?;
    let (scope, _) = rest.split_once('/')?;
    (!scope.is_empty()).then_some(scope)
}
