//! Alias rules.
//!
//! An alias is the canonical path key a handler is registered under:
//! - non-empty and starts with `/`
//! - `/` itself, or does not end with `/`
//! - never ends with `*` (no pattern aliases)

use crate::error::RegistrationError;

/// Check the syntactic alias rules. Uniqueness is checked by the table.
pub fn validate_alias(alias: &str) -> Result<(), RegistrationError> {
    if !alias.starts_with('/') {
        return Err(RegistrationError::conflict(alias, "alias must start with `/`"));
    }
    if alias.len() > 1 && alias.ends_with('/') {
        return Err(RegistrationError::conflict(alias, "alias must not end with `/`"));
    }
    if alias.ends_with('*') {
        return Err(RegistrationError::conflict(alias, "alias must not end with `*`"));
    }
    Ok(())
}

/// Next shorter alias in the fallback walk.
///
/// Cuts at the last `/`; a cut at position 0 yields the root alias.
/// Returns `None` for the root itself and for paths without any `/`.
pub fn parent_alias(alias: &str) -> Option<String> {
    if alias == "/" {
        return None;
    }
    match alias.rfind('/') {
        None => None,
        Some(0) => Some("/".to_string()),
        Some(i) => Some(alias[..i].to_string()),
    }
}

/// Path info for `original` dispatched to `alias`.
///
/// The remainder after the alias, normalized to start with `/`; `None` when
/// nothing remains.
pub fn path_info(original: &str, alias: &str) -> Option<String> {
    let rest = original.get(alias.len()..).unwrap_or("");
    if rest.is_empty() {
        None
    } else if rest.starts_with('/') {
        Some(rest.to_string())
    } else {
        Some(format!("/{}", rest))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validation() {
        assert!(validate_alias("/").is_ok());
        assert!(validate_alias("/files").is_ok());
        assert!(validate_alias("/a/b.c").is_ok());

        assert!(validate_alias("").is_err());
        assert!(validate_alias("files").is_err());
        assert!(validate_alias("/files/").is_err());
        assert!(validate_alias("/files/*").is_err());
        assert!(validate_alias("/*").is_err());
    }

    #[test]
    fn test_parent_walk() {
        assert_eq!(parent_alias("/files/42/name").as_deref(), Some("/files/42"));
        assert_eq!(parent_alias("/files").as_deref(), Some("/"));
        assert_eq!(parent_alias("/"), None);
        assert_eq!(parent_alias("relative"), None);
        // Trailing slash request paths shed the empty segment first
        assert_eq!(parent_alias("/a/").as_deref(), Some("/a"));
    }

    #[test]
    fn test_path_info() {
        assert_eq!(path_info("/files/42/name", "/files").as_deref(), Some("/42/name"));
        assert_eq!(path_info("/files", "/files"), None);
        assert_eq!(path_info("/x/y", "/").as_deref(), Some("/x/y"));
        assert_eq!(path_info("/", "/"), None);
    }
}
