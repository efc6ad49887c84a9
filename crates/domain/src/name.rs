//! Name grammars for URL path segments and domains.
//!
//! Every website, environment, and resource name that arrives in a URL path
//! is validated here before it touches the catalog or the filesystem.

use crate::error::{Error, Result};

/// Maximum accepted length for a resource name.
pub const MAX_NAME_LEN: usize = 128;

/// Validate a website / environment / resource name.
///
/// Accepted grammar: letters, digits, underscore, hyphen; 1..=128 chars;
/// no leading hyphen; no `..` anywhere (belt-and-braces against traversal,
/// even though `.` is already outside the grammar).
pub fn validate_resource_name(name: &str) -> Result<()> {
    if name.is_empty() || name.len() > MAX_NAME_LEN {
        return Err(Error::InvalidName(format!(
            "name must be 1..{MAX_NAME_LEN} characters"
        )));
    }
    if name.starts_with('-') {
        return Err(Error::InvalidName("name must not start with a hyphen".into()));
    }
    if name.contains("..") {
        return Err(Error::InvalidName("name must not contain '..'".into()));
    }
    if !name
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
    {
        return Err(Error::InvalidName(format!(
            "name contains characters outside [A-Za-z0-9_-]: {name:?}"
        )));
    }
    Ok(())
}

/// Validate a page route: `/`-rooted, each segment within the resource-name
/// grammar. Routes become release output paths, so the same traversal rules
/// apply.
pub fn validate_route(route: &str) -> Result<()> {
    if !route.starts_with('/') {
        return Err(Error::InvalidName(format!(
            "route must start with '/': {route:?}"
        )));
    }
    for segment in route.split('/').filter(|s| !s.is_empty()) {
        validate_resource_name(segment)?;
    }
    Ok(())
}

/// Validate a relative file path (asset filenames, style-bundle files):
/// `/`-separated segments of `[A-Za-z0-9._-]`, no empty segment, no leading
/// dot, no `..`, 1..=512 chars total.
pub fn validate_relative_path(path: &str) -> Result<()> {
    if path.is_empty() || path.len() > 512 {
        return Err(Error::InvalidName(format!(
            "path must be 1..512 characters: {path:?}"
        )));
    }
    if path.starts_with('/') {
        return Err(Error::InvalidName(format!("path must be relative: {path:?}")));
    }
    for segment in path.split('/') {
        if segment.is_empty() {
            return Err(Error::InvalidName(format!(
                "path has an empty segment: {path:?}"
            )));
        }
        if segment.starts_with('.') {
            return Err(Error::InvalidName(format!(
                "path segment must not start with a dot: {path:?}"
            )));
        }
        if !segment
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '.' || c == '_' || c == '-')
        {
            return Err(Error::InvalidName(format!(
                "path segment contains characters outside [A-Za-z0-9._-]: {path:?}"
            )));
        }
    }
    Ok(())
}

/// Validate and normalize a DNS domain: lowercase, trailing dot trimmed,
/// each label 1..=63 chars of `[a-z0-9-]` with no leading/trailing hyphen.
pub fn normalize_domain(input: &str) -> Result<String> {
    let domain = input.trim().trim_end_matches('.').to_ascii_lowercase();
    if domain.is_empty() || domain.len() > 253 {
        return Err(Error::InvalidDomain("domain must be 1..253 characters".into()));
    }

    for label in domain.split('.') {
        if label.is_empty() || label.len() > 63 {
            return Err(Error::InvalidDomain(format!(
                "label must be 1..63 characters: {domain:?}"
            )));
        }
        if label.starts_with('-') || label.ends_with('-') {
            return Err(Error::InvalidDomain(format!(
                "label must not start or end with a hyphen: {domain:?}"
            )));
        }
        if !label
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')
        {
            return Err(Error::InvalidDomain(format!(
                "label contains invalid characters: {domain:?}"
            )));
        }
    }

    Ok(domain)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_typical_names() {
        for name in ["index", "my-site", "env_1", "A", "header"] {
            assert!(validate_resource_name(name).is_ok(), "{name}");
        }
    }

    #[test]
    fn rejects_traversal_and_bad_chars() {
        for name in ["", "-lead", "a/b", "a.b", "..", "a..b", "name!", "café"] {
            assert!(validate_resource_name(name).is_err(), "{name}");
        }
    }

    #[test]
    fn rejects_overlong_name() {
        let long = "a".repeat(MAX_NAME_LEN + 1);
        assert!(validate_resource_name(&long).is_err());
    }

    #[test]
    fn relative_paths_allow_dots_but_not_traversal() {
        assert!(validate_relative_path("assets/logo.svg").is_ok());
        assert!(validate_relative_path("styles/tokens.css").is_ok());
        assert!(validate_relative_path("logo.svg").is_ok());
        assert!(validate_relative_path("/abs.css").is_err());
        assert!(validate_relative_path("a//b.css").is_err());
        assert!(validate_relative_path("../escape.css").is_err());
        assert!(validate_relative_path(".hidden").is_err());
        assert!(validate_relative_path("a b.css").is_err());
    }

    #[test]
    fn routes_must_be_rooted_and_clean() {
        assert!(validate_route("/").is_ok());
        assert!(validate_route("/docs/install").is_ok());
        assert!(validate_route("docs").is_err());
        assert!(validate_route("/../etc").is_err());
        assert!(validate_route("/a b").is_err());
    }

    #[test]
    fn normalizes_domain_case_and_trailing_dot() {
        assert_eq!(normalize_domain("Example.COM.").unwrap(), "example.com");
    }

    #[test]
    fn rejects_bad_domains() {
        for d in ["", "-x.com", "x-.com", "ex ample.com", "a..b.com"] {
            assert!(normalize_domain(d).is_err(), "{d}");
        }
    }
}
