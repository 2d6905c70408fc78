use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

/// Build flavor of a PHP release. Two variants of the same numeric version
/// are independent installations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Variant {
    ThreadSafe,
    NonThreadSafe,
    Unspecified,
}

impl Variant {
    /// Canonical suffix, `None` for [`Variant::Unspecified`].
    pub fn suffix(&self) -> Option<&'static str> {
        match self {
            Variant::ThreadSafe => Some("ts"),
            Variant::NonThreadSafe => Some("nts"),
            Variant::Unspecified => None,
        }
    }

    fn from_token(token: &str) -> Option<Variant> {
        match token {
            "ts" => Some(Variant::ThreadSafe),
            "nts" => Some(Variant::NonThreadSafe),
            _ => None,
        }
    }
}

/// Normalized (major, minor, patch, variant) identity of one installable
/// PHP build. The full tuple is the unique key for an installation.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct PhpVersion {
    pub major: u8,
    pub minor: u8,
    pub patch: u8,
    pub variant: Variant,
}

impl PhpVersion {
    pub fn new(major: u8, minor: u8, patch: u8, variant: Variant) -> Self {
        PhpVersion {
            major,
            minor,
            patch,
            variant,
        }
    }

    /// Parses a version string. Both suffix encodings seen in the wild
    /// (`8.3.29-ts` and `8.3.29.ts`) normalize to the same identity, and a
    /// bare string parses with [`Variant::Unspecified`]. Fewer than three
    /// numeric components are zero-padded.
    pub fn parse(text: &str) -> Result<Self> {
        let err = |reason: &str| Error::Parse {
            text: text.to_string(),
            reason: reason.to_string(),
        };

        let trimmed = text.trim();
        if trimmed.is_empty() {
            return Err(err("empty string"));
        }

        let (numeric, variant) = match trimmed.rsplit_once(['-', '.']) {
            Some((head, tail)) if Variant::from_token(tail).is_some() => {
                (head, Variant::from_token(tail).unwrap())
            }
            _ => (trimmed, Variant::Unspecified),
        };
        if numeric.is_empty() {
            return Err(err("missing version number"));
        }

        let parts: Vec<&str> = numeric.split('.').collect();
        if parts.len() > 3 {
            return Err(err("too many version components"));
        }
        let mut numbers = [0u8; 3];
        for (i, part) in parts.iter().enumerate() {
            numbers[i] = part
                .parse()
                .map_err(|_| err("version components must be numeric"))?;
        }

        Ok(PhpVersion {
            major: numbers[0],
            minor: numbers[1],
            patch: numbers[2],
            variant,
        })
    }

    /// `major.minor.patch` without the variant suffix.
    pub fn base_version(&self) -> String {
        format!("{}.{}.{}", self.major, self.minor, self.patch)
    }

    pub fn same_base(&self, other: &PhpVersion) -> bool {
        self.base_tuple() == other.base_tuple()
    }

    fn base_tuple(&self) -> (u8, u8, u8) {
        (self.major, self.minor, self.patch)
    }

    /// Numeric ordering, newest first. The variant is ignored for ordering.
    pub fn newest_first(a: &PhpVersion, b: &PhpVersion) -> Ordering {
        b.base_tuple().cmp(&a.base_tuple())
    }

    /// Resolves [`Variant::Unspecified`] to the given default.
    pub fn with_default_variant(&self, default: Variant) -> PhpVersion {
        let mut resolved = self.clone();
        if resolved.variant == Variant::Unspecified {
            resolved.variant = default;
        }
        resolved
    }

    /// Install directory name, e.g. `php-8.3.29-ts`.
    pub fn directory_name(&self) -> String {
        format!("php-{}", self)
    }
}

/// Groups identities by their base `major.minor.patch` version. Group order
/// and the order of variants within a group follow input order.
pub fn group_by_base(versions: &[PhpVersion]) -> Vec<(String, Vec<PhpVersion>)> {
    let mut groups: Vec<(String, Vec<PhpVersion>)> = Vec::new();
    for version in versions {
        let base = version.base_version();
        match groups.iter_mut().find(|(key, _)| *key == base) {
            Some((_, members)) => members.push(version.clone()),
            None => groups.push((base, vec![version.clone()])),
        }
    }
    groups
}

impl fmt::Display for PhpVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.variant.suffix() {
            Some(suffix) => write!(f, "{}-{}", self.base_version(), suffix),
            None => write!(f, "{}", self.base_version()),
        }
    }
}

impl FromStr for PhpVersion {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        PhpVersion::parse(s)
    }
}

impl TryFrom<String> for PhpVersion {
    type Error = Error;

    fn try_from(value: String) -> Result<Self> {
        PhpVersion::parse(&value)
    }
}

impl From<PhpVersion> for String {
    fn from(version: PhpVersion) -> String {
        version.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_bare_version() {
        let v = PhpVersion::parse("8.2.0").unwrap();
        assert_eq!(v, PhpVersion::new(8, 2, 0, Variant::Unspecified));
    }

    #[test]
    fn test_parse_hyphen_and_dot_suffix_agree() {
        let hyphen = PhpVersion::parse("8.3.29-ts").unwrap();
        let dotted = PhpVersion::parse("8.3.29.ts").unwrap();
        assert_eq!(hyphen, dotted);
        assert_eq!(hyphen.variant, Variant::ThreadSafe);

        let nts = PhpVersion::parse("8.3.29.nts").unwrap();
        assert_eq!(nts, PhpVersion::parse("8.3.29-nts").unwrap());
        assert_eq!(nts.variant, Variant::NonThreadSafe);
    }

    #[test]
    fn test_parse_zero_pads_short_versions() {
        assert_eq!(
            PhpVersion::parse("8.3").unwrap(),
            PhpVersion::new(8, 3, 0, Variant::Unspecified)
        );
        assert_eq!(
            PhpVersion::parse("8").unwrap(),
            PhpVersion::new(8, 0, 0, Variant::Unspecified)
        );
        assert_eq!(
            PhpVersion::parse("8.3-ts").unwrap(),
            PhpVersion::new(8, 3, 0, Variant::ThreadSafe)
        );
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!(PhpVersion::parse("").is_err());
        assert!(PhpVersion::parse("a.b.c").is_err());
        assert!(PhpVersion::parse("8.2.0-rc1").is_err());
        assert!(PhpVersion::parse("1.2.3.4").is_err());
        assert!(PhpVersion::parse("-ts").is_err());
    }

    #[test]
    fn test_format_parse_round_trip() {
        for text in ["8.2.0", "8.3.29-ts", "7.4.33-nts"] {
            let v = PhpVersion::parse(text).unwrap();
            assert_eq!(PhpVersion::parse(&v.to_string()).unwrap(), v);
            assert_eq!(v.to_string(), text);
        }
    }

    #[test]
    fn test_newest_first_ignores_variant() {
        let mut versions = vec![
            PhpVersion::parse("8.1.0-nts").unwrap(),
            PhpVersion::parse("8.3.2").unwrap(),
            PhpVersion::parse("8.2.14-ts").unwrap(),
        ];
        versions.sort_by(PhpVersion::newest_first);
        let rendered: Vec<String> = versions.iter().map(|v| v.base_version()).collect();
        assert_eq!(rendered, vec!["8.3.2", "8.2.14", "8.1.0"]);
    }

    #[test]
    fn test_group_by_base_preserves_input_order() {
        let versions = vec![
            PhpVersion::parse("8.2.0-ts").unwrap(),
            PhpVersion::parse("8.1.5").unwrap(),
            PhpVersion::parse("8.2.0-nts").unwrap(),
        ];
        let groups = group_by_base(&versions);
        assert_eq!(groups.len(), 2);
        assert_eq!(groups[0].0, "8.2.0");
        assert_eq!(groups[0].1.len(), 2);
        assert_eq!(groups[0].1[0].variant, Variant::ThreadSafe);
        assert_eq!(groups[0].1[1].variant, Variant::NonThreadSafe);
        assert_eq!(groups[1].0, "8.1.5");
    }

    #[test]
    fn test_directory_name() {
        let v = PhpVersion::parse("8.2.0-ts").unwrap();
        assert_eq!(v.directory_name(), "php-8.2.0-ts");
        let bare = PhpVersion::parse("8.2.0").unwrap();
        assert_eq!(bare.directory_name(), "php-8.2.0");
    }

    #[test]
    fn test_with_default_variant() {
        let bare = PhpVersion::parse("8.2.0").unwrap();
        let resolved = bare.with_default_variant(Variant::ThreadSafe);
        assert_eq!(resolved.variant, Variant::ThreadSafe);

        let nts = PhpVersion::parse("8.2.0-nts").unwrap();
        assert_eq!(
            nts.with_default_variant(Variant::ThreadSafe).variant,
            Variant::NonThreadSafe
        );
    }
}
