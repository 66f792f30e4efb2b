//! Version parsing and compatibility checks for the plugin host.
//!
//! Plugins declare a minimum host version and minimum versions for their
//! dependencies as `MAJOR.MINOR.PATCH` strings. Version strings originate
//! from manifests and dynamic modules, so parsing is lenient: a malformed
//! string degrades to `0.0.0` and never fails a load on its own.

use semver::Version;

/// Parse a version string, degrading to `0.0.0` on any parse failure.
pub fn parse_version(s: &str) -> Version {
    Version::parse(s.trim()).unwrap_or_else(|_| Version::new(0, 0, 0))
}

/// Check whether `actual` satisfies the minimum `required` version.
///
/// Comparison is the standard lexicographic triple order: major first,
/// then minor, then patch. Malformed strings on either side compare as
/// `0.0.0`.
pub fn is_version_compatible(required: &str, actual: &str) -> bool {
    parse_version(actual) >= parse_version(required)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exact_match_is_compatible() {
        assert!(is_version_compatible("1.2.0", "1.2.0"));
    }

    #[test]
    fn test_older_actual_is_incompatible() {
        assert!(!is_version_compatible("1.3.0", "1.2.9"));
        assert!(!is_version_compatible("2.0.0", "1.9.9"));
    }

    #[test]
    fn test_newer_actual_is_compatible() {
        assert!(is_version_compatible("1.2.0", "2.0.0"));
        assert!(is_version_compatible("1.2.0", "1.2.1"));
        assert!(is_version_compatible("1.2.0", "1.3.0"));
    }

    #[test]
    fn test_malformed_degrades_to_zero() {
        assert_eq!(parse_version("not-a-version"), Version::new(0, 0, 0));
        assert_eq!(parse_version("1.2"), Version::new(0, 0, 0));

        // A malformed requirement is satisfied by anything.
        assert!(is_version_compatible("garbage", "0.0.1"));
        // A malformed actual only satisfies a zero requirement.
        assert!(!is_version_compatible("1.0.0", "garbage"));
        assert!(is_version_compatible("garbage", "garbage"));
    }
}
