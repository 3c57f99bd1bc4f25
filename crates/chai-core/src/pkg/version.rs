//! Version selection using semver.

use super::error::PkgError;
use semver::{Version, VersionReq};
use std::collections::HashMap;

/// Pick exactly one version from `available`.
///
/// # Rules
/// - Empty `available` yields `None`
/// - No range: `tags.latest` if it is available, otherwise the highest version
/// - A range naming a tag resolves to that tag if its version is available
/// - A range equal to an available version string resolves to it exactly;
///   a bare `X.Y.Z` range never matches anything else
/// - Otherwise the highest version satisfying the range; unparseable versions
///   are never candidates
/// - Supports OR ranges like `^1.0.0 || ^2.0.0`
pub fn pick_version<S: AsRef<str>>(
    available: &[S],
    range: Option<&str>,
    tags: &HashMap<String, String>,
) -> Option<String> {
    if available.is_empty() {
        return None;
    }

    let contains = |v: &str| available.iter().any(|a| a.as_ref() == v);
    let range = range.map(str::trim).filter(|r| !r.is_empty());

    if let Some(tagged) = tags.get(range.unwrap_or("latest")) {
        if contains(tagged) {
            return Some(tagged.clone());
        }
    }

    let range = match range {
        None | Some("latest") => return highest(available, |_| true),
        Some(range) => range,
    };

    if contains(range) {
        return Some(range.to_string());
    }

    match parse_range_set(range) {
        Ok(reqs) => highest(available, |v| reqs.iter().any(|req| req.matches(v))),
        Err(e) => {
            tracing::debug!(range, error = %e, "unusable version range");
            None
        }
    }
}

/// [`pick_version`], failing with `PKG_NO_VERSION_SATISFIES_RANGE` when nothing matches.
///
/// # Errors
/// Returns an error if no version satisfies the range.
pub fn require_version<S: AsRef<str>>(
    name: &str,
    available: &[S],
    range: Option<&str>,
    tags: &HashMap<String, String>,
) -> Result<String, PkgError> {
    pick_version(available, range, tags).ok_or_else(|| PkgError::no_version(name, range))
}

/// Check whether `version` satisfies `range`.
#[must_use]
pub fn version_satisfies(version: &str, range: &str) -> bool {
    let Some(version) = parse_lenient(version) else {
        return false;
    };
    parse_range_set(range).is_ok_and(|reqs| reqs.iter().any(|req| req.matches(&version)))
}

/// Parse a version leniently: a leading `v` or `=` is ignored and missing
/// minor/patch components are filled with zero (`1.2` -> `1.2.0`).
#[must_use]
pub fn parse_lenient(raw: &str) -> Option<Version> {
    let v = raw.trim();
    let v = v.strip_prefix(['v', 'V']).unwrap_or(v);
    let v = v.strip_prefix('=').unwrap_or(v);

    if let Ok(parsed) = Version::parse(v) {
        return Some(parsed);
    }

    let split = v.find(['-', '+']).unwrap_or(v.len());
    let (core, suffix) = v.split_at(split);
    let parts = core.split('.').count();
    if core.is_empty() || parts >= 3 {
        return None;
    }
    let padded = format!("{core}{}{suffix}", ".0".repeat(3 - parts));
    Version::parse(&padded).ok()
}

/// Highest parseable version of `available` accepted by `filter`, as originally spelled.
fn highest<S: AsRef<str>>(available: &[S], filter: impl Fn(&Version) -> bool) -> Option<String> {
    available
        .iter()
        .filter_map(|raw| parse_lenient(raw.as_ref()).map(|v| (v, raw.as_ref())))
        .filter(|(v, _)| filter(v))
        .max_by(|(a, _), (b, _)| a.cmp(b))
        .map(|(_, raw)| raw.to_string())
}

/// Parse a range that may contain `||` alternatives.
///
/// Invalid alternatives are skipped as long as one is valid.
fn parse_range_set(range: &str) -> Result<Vec<VersionReq>, PkgError> {
    if !range.contains("||") {
        return parse_range(range).map(|req| vec![req]);
    }

    let reqs: Vec<VersionReq> = range
        .split("||")
        .map(str::trim)
        .filter(|alt| !alt.is_empty())
        .filter_map(|alt| parse_range(alt).ok())
        .collect();

    if reqs.is_empty() {
        return Err(PkgError::invalid_identifier(format!(
            "Invalid version range '{range}': no valid alternatives"
        )));
    }
    Ok(reqs)
}

/// Parse a single version range, handling npm-specific syntax.
///
/// Handles:
/// - Standard semver ranges: ^1.0.0, ~1.0.0, >=1.0.0, etc.
/// - Hyphen ranges: 1.0.0 - 2.0.0
/// - X-ranges: 1.x, 1.0.x, *
/// - Space-separated comparators: >= 2.1.2 < 3.0.0
fn parse_range(range: &str) -> Result<VersionReq, PkgError> {
    let range = range.trim();

    let converted = if let Some((start, end)) = parse_hyphen_range(range) {
        format!(">={start}, <={end}")
    } else if is_x_range(range) {
        convert_x_range(range)
    } else {
        convert_space_separated_comparators(range)
    };

    VersionReq::parse(&converted).map_err(|e| {
        PkgError::invalid_identifier(format!("Invalid version range '{range}': {e}"))
    })
}

/// Parse a hyphen range like "1.0.0 - 2.0.0".
fn parse_hyphen_range(range: &str) -> Option<(&str, &str)> {
    let (start, end) = range.split_once(" - ")?;
    let (start, end) = (start.trim(), end.trim());
    (!start.is_empty() && !end.is_empty()).then_some((start, end))
}

fn is_x_range(range: &str) -> bool {
    range
        .split('.')
        .any(|part| matches!(part, "x" | "X" | "*"))
}

/// Convert space-separated comparators to comma-separated.
///
/// npm allows ">= 2.1.2 < 3.0.0" meaning ">=2.1.2 AND <3.0.0";
/// the semver crate requires ">=2.1.2, <3.0.0". Versions without an operator
/// are pinned the npm way (see [`pin_bare_version`]).
fn convert_space_separated_comparators(range: &str) -> String {
    let mut result = String::new();
    let mut need_comma = false;
    let mut after_operator = false;

    for token in range.split_whitespace() {
        if need_comma {
            result.push_str(", ");
        }
        if after_operator {
            result.push_str(token);
        } else {
            result.push_str(&pin_bare_version(token));
        }
        // An operator on its own (">=") binds to the following version.
        let has_version = token_has_version(token);
        need_comma = has_version && !token.ends_with(',');
        after_operator = !has_version;
    }

    if result.is_empty() {
        return range.to_string();
    }
    result
}

/// Rewrite a comparator that has no operator.
///
/// npm reads `1.2.3` as exactly that version and `1.2` as `1.2.x`, where the
/// semver crate would read both as caret ranges. A major on its own means the
/// same in both. A leading `v` is dropped.
fn pin_bare_version(token: &str) -> String {
    let (body, comma) = match token.strip_suffix(',') {
        Some(body) => (body, ","),
        None => (token, ""),
    };
    let bare = body.strip_prefix(['v', 'V']).unwrap_or(body);
    if !bare.starts_with(|c: char| c.is_ascii_digit()) {
        return token.to_string();
    }

    let core_len = bare.find(['-', '+']).unwrap_or(bare.len());
    match bare[..core_len].split('.').count() {
        3 => format!("={bare}{comma}"),
        2 if core_len == bare.len() => format!("~{bare}{comma}"),
        _ => format!("{bare}{comma}"),
    }
}

/// Check if a token contains a version number (has digits).
fn token_has_version(token: &str) -> bool {
    token.chars().any(|c| c.is_ascii_digit())
}

/// Convert x-range to semver range.
fn convert_x_range(range: &str) -> String {
    if matches!(range, "*" | "x" | "X") {
        return ">=0.0.0".to_string();
    }

    let parts: Vec<&str> = range.split('.').collect();

    match parts.as_slice() {
        [major, "x" | "X" | "*"] | [major, "x" | "X" | "*", "x" | "X" | "*"] => {
            if let Ok(m) = major.parse::<u64>() {
                return format!(">={m}.0.0, <{}.0.0", m + 1);
            }
        }
        [major, minor, "x" | "X" | "*"] => {
            if let (Ok(m), Ok(n)) = (major.parse::<u64>(), minor.parse::<u64>()) {
                return format!(">={m}.{n}.0, <{m}.{}.0", n + 1);
            }
        }
        _ => {}
    }

    range.replace(['x', 'X', '*'], "0")
}
