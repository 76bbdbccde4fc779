//! Add-on version handling.
//!
//! Kodi add-on versions are dotted numeric strings ("2.3.1", sometimes
//! with a "+matrix.1" style suffix). Comparing them as plain strings is
//! wrong ("1.10.0" < "1.9.0" lexically), so versions are parsed into
//! numeric fields and compared field-wise.

use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::Error;

/// A parsed add-on version.
///
/// Ordering is field-wise numeric and therefore transitive, which the
/// newest-wins resolution policy depends on. The original string is kept
/// for display and for building package filenames.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Version {
    raw: String,
    fields: Vec<u64>,
}

impl Version {
    /// Parses a version string into numeric fields.
    ///
    /// Splits on `.`, `+` and `-`; each segment contributes its leading
    /// numeric run. A segment with no digits at all ends the numeric
    /// prefix (suffixes such as "beta" do not take part in ordering).
    pub fn parse(raw: &str) -> Result<Self, Error> {
        let mut fields = Vec::new();
        for segment in raw.split(['.', '+', '-']) {
            let digits: String = segment.chars().take_while(char::is_ascii_digit).collect();
            if digits.is_empty() {
                break;
            }
            let value = digits
                .parse::<u64>()
                .map_err(|_| Error::InvalidVersion(raw.to_string()))?;
            fields.push(value);
        }

        if fields.is_empty() {
            return Err(Error::InvalidVersion(raw.to_string()));
        }

        Ok(Self {
            raw: raw.to_string(),
            fields,
        })
    }

    /// Returns the original version string.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.raw
    }
}

impl FromStr for Version {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.raw)
    }
}

impl PartialEq for Version {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Version {}

impl PartialOrd for Version {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Version {
    fn cmp(&self, other: &Self) -> Ordering {
        // Compare field-wise, treating missing trailing fields as zero
        // so "1.2" == "1.2.0".
        let len = self.fields.len().max(other.fields.len());
        for i in 0..len {
            let a = self.fields.get(i).copied().unwrap_or(0);
            let b = other.fields.get(i).copied().unwrap_or(0);
            match a.cmp(&b) {
                Ordering::Equal => {}
                unequal => return unequal,
            }
        }
        Ordering::Equal
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn v(s: &str) -> Version {
        Version::parse(s).unwrap()
    }

    #[test]
    fn test_parse_simple() {
        let version = v("2.3.1");
        assert_eq!(version.as_str(), "2.3.1");
        assert_eq!(version.to_string(), "2.3.1");
    }

    #[test]
    fn test_numeric_not_lexical() {
        assert!(v("1.10.0") > v("1.9.0"));
        assert!(v("0.9.12") < v("0.10.0"));
    }

    #[test]
    fn test_missing_fields_are_zero() {
        assert_eq!(v("1.2"), v("1.2.0"));
        assert!(v("1.2.1") > v("1.2"));
    }

    #[test]
    fn test_suffix_ignored_for_ordering() {
        assert_eq!(v("1.0.0+matrix.1").fields, vec![1, 0, 0]);
        assert!(v("2.0.0+matrix.1") > v("1.9.9"));
    }

    #[test]
    fn test_invalid_version() {
        assert!(Version::parse("").is_err());
        assert!(Version::parse("beta").is_err());
    }

    #[test]
    fn test_equality_matches_ordering() {
        assert_eq!(v("1.0"), v("1.0.0"));
        assert_ne!(v("1.0.1"), v("1.0.0"));
    }

    proptest! {
        #[test]
        fn prop_ordering_is_transitive(
            a in proptest::collection::vec(0u64..50, 1..4),
            b in proptest::collection::vec(0u64..50, 1..4),
            c in proptest::collection::vec(0u64..50, 1..4),
        ) {
            let dotted = |f: &[u64]| {
                f.iter().map(u64::to_string).collect::<Vec<_>>().join(".")
            };
            let (va, vb, vc) = (v(&dotted(&a)), v(&dotted(&b)), v(&dotted(&c)));
            if va <= vb && vb <= vc {
                prop_assert!(va <= vc);
            }
        }

        #[test]
        fn prop_comparison_is_antisymmetric(
            a in proptest::collection::vec(0u64..50, 1..4),
            b in proptest::collection::vec(0u64..50, 1..4),
        ) {
            let dotted = |f: &[u64]| {
                f.iter().map(u64::to_string).collect::<Vec<_>>().join(".")
            };
            let (va, vb) = (v(&dotted(&a)), v(&dotted(&b)));
            if va < vb {
                prop_assert!(vb > va);
            }
        }
    }
}
