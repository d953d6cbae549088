//! Ref name validation following `git check-ref-format`.
//!
//! A valid ref name is either `HEAD` or a full name under `refs/` such that:
//! - No component is empty (no `//`, no leading or trailing `/`)
//! - No component starts with `.` or ends with `.lock`
//! - The name contains no `..`, no `@{`, and does not end with `.`
//! - The name contains no ASCII control characters and none of
//!   space, `~`, `^`, `:`, `?`, `*`, `[`, `\`

use crate::error::{RefError, Result};

/// Name of the repository's symbolic `HEAD` ref.
pub const HEAD: &str = "HEAD";

/// Prefix every non-`HEAD` ref must carry.
pub const REFS_PREFIX: &str = "refs/";

const FORBIDDEN_CHARS: &[char] = &[' ', '~', '^', ':', '?', '*', '[', '\\'];

fn invalid(name: &str, reason: impl Into<String>) -> RefError {
    RefError::InvalidRefName {
        name: name.to_string(),
        reason: reason.into(),
    }
}

/// Validate a full ref name, returning `Ok(())` if valid.
///
/// # Examples
///
/// ```
/// use refdb_refs::names::validate_ref_name;
///
/// assert!(validate_ref_name("refs/heads/master").is_ok());
/// assert!(validate_ref_name("refs/changes/45/12345/1").is_ok());
/// assert!(validate_ref_name("HEAD").is_ok());
/// assert!(validate_ref_name("master").is_err());
/// assert!(validate_ref_name("refs/heads/bad..name").is_err());
/// ```
pub fn validate_ref_name(name: &str) -> Result<()> {
    if name == HEAD {
        return Ok(());
    }
    if name.is_empty() {
        return Err(invalid(name, "ref name must not be empty"));
    }
    if !name.starts_with(REFS_PREFIX) {
        return Err(invalid(name, format!("must be HEAD or start with {REFS_PREFIX:?}")));
    }

    if let Some(ch) = name.chars().find(|c| c.is_ascii_control()) {
        return Err(invalid(name, format!("contains control character: {ch:?}")));
    }
    for ch in FORBIDDEN_CHARS {
        if name.contains(*ch) {
            return Err(invalid(name, format!("contains forbidden character: {ch:?}")));
        }
    }

    if name.contains("..") {
        return Err(invalid(name, "must not contain '..'"));
    }
    if name.contains("@{") {
        return Err(invalid(name, "must not contain '@{'"));
    }
    if name.ends_with('.') {
        return Err(invalid(name, "must not end with '.'"));
    }
    if name.ends_with('/') {
        return Err(invalid(name, "must not end with '/'"));
    }

    for component in name.split('/') {
        if component.is_empty() {
            return Err(invalid(name, "path components must not be empty"));
        }
        if component.starts_with('.') {
            return Err(invalid(
                name,
                format!("component must not start with '.': {component:?}"),
            ));
        }
        if component.ends_with(".lock") {
            return Err(invalid(
                name,
                format!("component must not end with '.lock': {component:?}"),
            ));
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn valid_names() {
        assert!(validate_ref_name("refs/heads/master").is_ok());
        assert!(validate_ref_name("refs/heads/feature/auth").is_ok());
        assert!(validate_ref_name("refs/tags/v3.0.1").is_ok());
        assert!(validate_ref_name("refs/meta/config").is_ok());
        assert!(validate_ref_name("refs/changes/01/1/meta").is_ok());
        assert!(validate_ref_name("refs/sequences/changes").is_ok());
        assert!(validate_ref_name(HEAD).is_ok());
    }

    #[test]
    fn reject_short_names() {
        assert!(validate_ref_name("").is_err());
        assert!(validate_ref_name("master").is_err());
        assert!(validate_ref_name("heads/master").is_err());
    }

    #[test]
    fn reject_double_dot() {
        assert!(validate_ref_name("refs/heads/a..b").is_err());
    }

    #[test]
    fn reject_forbidden_chars() {
        for bad in ["a b", "a~b", "a^b", "a:b", "a?b", "a*b", "a[b", "a\\b", "a\tb", "a\u{7f}b"] {
            let name = format!("refs/heads/{bad}");
            assert!(validate_ref_name(&name).is_err(), "accepted {name:?}");
        }
    }

    #[test]
    fn reject_slash_problems() {
        assert!(validate_ref_name("refs/heads/").is_err());
        assert!(validate_ref_name("refs//heads/x").is_err());
    }

    #[test]
    fn reject_lock_components() {
        assert!(validate_ref_name("refs/heads/master.lock").is_err());
        assert!(validate_ref_name("refs/heads/x.lock/y").is_err());
    }

    #[test]
    fn reject_dot_rules() {
        assert!(validate_ref_name("refs/heads/.hidden").is_err());
        assert!(validate_ref_name("refs/heads/trailing.").is_err());
    }

    #[test]
    fn reject_at_brace() {
        assert!(validate_ref_name("refs/heads/x@{1}").is_err());
    }

    #[test]
    fn error_names_offender() {
        let err = validate_ref_name("refs/heads/a..b").unwrap_err();
        assert!(err.to_string().contains("refs/heads/a..b"));
    }
}
