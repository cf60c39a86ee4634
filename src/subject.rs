//! Subject derivation from schema references
//!
//! A schema reference is a URL naming a schema and version, e.g.
//! `https://eddn.edcd.io/schemas/journal/1`. The outbound bus subject drops
//! the scheme/host/`schemas` prefix and rejoins the remaining path segments
//! with dots under a fixed namespace: `eddn.journal.1`.

/// Fixed namespace prefix for all outbound subjects
pub const SUBJECT_PREFIX: &str = "eddn.";

/// Leading URL segments dropped before joining: scheme marker, the empty
/// segment after `//`, the host, and the literal `schemas` segment.
const LEADING_SEGMENTS: usize = 4;

/// Derive the dot-delimited bus subject from a schema reference URL.
///
/// Total over arbitrary input: references without the expected four leading
/// segments degrade to a sanitized form of the whole reference instead of
/// panicking.
pub fn subject_of(schema_ref: &str) -> String {
    let parts: Vec<&str> = schema_ref.split('/').collect();
    if parts.len() > LEADING_SEGMENTS {
        format!("{}{}", SUBJECT_PREFIX, parts[LEADING_SEGMENTS..].join("."))
    } else {
        // Short reference, keep it routable rather than panic
        let sanitized: Vec<&str> = parts.into_iter().filter(|p| !p.is_empty()).collect();
        format!("{}{}", SUBJECT_PREFIX, sanitized.join("."))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_subject_of() {
        let cases = [
            ("https://eddn.edcd.io/schemas/journal/1", "eddn.journal.1"),
            (
                "https://eddn.edcd.io/schemas/fssdiscoveryscan/1",
                "eddn.fssdiscoveryscan.1",
            ),
            (
                "https://eddn.edcd.io/schemas/fsssignaldiscovered/1",
                "eddn.fsssignaldiscovered.1",
            ),
            ("https://eddn.edcd.io/schemas/codexentry/1", "eddn.codexentry.1"),
            ("https://eddn.edcd.io/schemas/navroute/1", "eddn.navroute.1"),
            ("https://eddn.edcd.io/schemas/commodity/3", "eddn.commodity.3"),
            ("https://eddn.edcd.io/schemas/outfitting/2", "eddn.outfitting.2"),
            ("https://eddn.edcd.io/schemas/shipyard/2", "eddn.shipyard.2"),
            (
                "https://eddn.edcd.io/schemas/scanbarycentre/1",
                "eddn.scanbarycentre.1",
            ),
            (
                "https://eddn.edcd.io/schemas/approachsettlement/1",
                "eddn.approachsettlement.1",
            ),
        ];
        for (schema_ref, want) in cases {
            assert_eq!(subject_of(schema_ref), want);
        }
    }

    #[test]
    fn test_subject_of_test_schema() {
        // Versioned test schemas carry an extra trailing segment
        assert_eq!(
            subject_of("https://eddn.edcd.io/schemas/navbeaconscan/2/test"),
            "eddn.navbeaconscan.2.test"
        );
    }

    #[test]
    fn test_subject_of_short_reference_does_not_panic() {
        assert_eq!(subject_of("journal/1"), "eddn.journal.1");
        assert_eq!(subject_of("journal"), "eddn.journal");
        assert_eq!(subject_of(""), "eddn.");
    }

    #[test]
    fn test_subject_of_unusual_depth() {
        // A host path deeper than expected still yields a deterministic subject
        assert_eq!(
            subject_of("https://host/extra/schemas/journal/1"),
            "eddn.schemas.journal.1"
        );
    }
}
