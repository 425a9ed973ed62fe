//! Dotted path and member-reference grammar.
//!
//! A node path is a dot-separated list of segments, each matching
//! `[A-Za-z0-9_]+` once surrounding whitespace is trimmed. The empty path
//! names the root. A member reference is `node-path:member-name` with exactly
//! one colon.

use crate::error::{Error, Result};

/// Returns `true` if `segment` matches `[A-Za-z0-9_]+`.
#[inline]
pub fn is_valid_segment(segment: &str) -> bool {
    !segment.is_empty()
        && segment
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'_')
}

/// Splits a node path into validated segments.
///
/// The empty (or all-whitespace) path yields no segments: the root.
///
/// # Examples
///
/// ```rust
/// use accumulatori::registry::path::parse_path;
///
/// assert_eq!(parse_path("http.server").unwrap(), vec!["http", "server"]);
/// assert_eq!(parse_path(" http . server ").unwrap(), vec!["http", "server"]);
/// assert!(parse_path("").unwrap().is_empty());
/// assert!(parse_path("http..server").is_err());
/// assert!(parse_path("http.ser-ver").is_err());
/// ```
pub fn parse_path(path: &str) -> Result<Vec<&str>> {
    let trimmed = path.trim();
    if trimmed.is_empty() {
        return Ok(Vec::new());
    }

    trimmed
        .split('.')
        .map(|segment| {
            let segment = segment.trim();
            if segment.is_empty() {
                Err(Error::InvalidPath {
                    path: path.to_string(),
                    reason: "empty segment",
                })
            } else if !is_valid_segment(segment) {
                Err(Error::InvalidPath {
                    path: path.to_string(),
                    reason: "segments must match [A-Za-z0-9_]+",
                })
            } else {
                Ok(segment)
            }
        })
        .collect()
}

/// Validates an accumulator or calculator name, returning it trimmed.
pub fn validate_name(name: &str) -> Result<&str> {
    let trimmed = name.trim();
    if is_valid_segment(trimmed) {
        Ok(trimmed)
    } else {
        Err(Error::InvalidName {
            name: name.to_string(),
        })
    }
}

/// Splits `node-path:member-name` at its only colon.
///
/// # Examples
///
/// ```rust
/// use accumulatori::registry::path::split_member_path;
///
/// assert_eq!(split_member_path("http.server:requests").unwrap(), ("http.server", "requests"));
/// assert!(split_member_path("http.server").is_err());
/// assert!(split_member_path("a:b:c").is_err());
/// ```
pub fn split_member_path(path: &str) -> Result<(&str, &str)> {
    let mut parts = path.split(':');
    match (parts.next(), parts.next(), parts.next()) {
        (Some(node), Some(member), None) => Ok((node, member)),
        _ => Err(Error::InvalidMemberPath {
            path: path.to_string(),
        }),
    }
}

/// Full name of a child of `parent`.
pub(crate) fn join(parent: &str, name: &str) -> String {
    if parent.is_empty() {
        name.to_string()
    } else {
        format!("{parent}.{name}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_segments() {
        for segment in ["a", "A1", "snake_case", "_", "0"] {
            assert!(is_valid_segment(segment), "{segment}");
        }
        for segment in ["", " ", "a-b", "a.b", "a b", "é"] {
            assert!(!is_valid_segment(segment), "{segment}");
        }
    }

    #[test]
    fn test_parse_path_rejects_bad_segments() {
        for path in ["a..b", ".a", "a.", "a. .b", "a.b c", "a.b-c", "a:b"] {
            assert!(
                matches!(parse_path(path), Err(Error::InvalidPath { .. })),
                "{path}"
            );
        }
    }

    #[test]
    fn test_parse_path_root() {
        assert!(parse_path("").unwrap().is_empty());
        assert!(parse_path("   ").unwrap().is_empty());
    }

    #[test]
    fn test_validate_name() {
        assert_eq!(validate_name(" hits ").unwrap(), "hits");
        assert!(validate_name("").is_err());
        assert!(validate_name("a.b").is_err());
    }

    #[test]
    fn test_split_member_path() {
        assert_eq!(split_member_path(":root_member").unwrap(), ("", "root_member"));
        assert!(split_member_path("a").is_err());
        assert!(split_member_path("a:b:c").is_err());
    }

    #[test]
    fn test_join() {
        assert_eq!(join("", "a"), "a");
        assert_eq!(join("a.b", "c"), "a.b.c");
    }
}
