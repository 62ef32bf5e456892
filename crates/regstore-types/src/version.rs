use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::TypeError;

/// Opaque version token identifying a revision of the store.
///
/// Tokens are issued by the store's global logical clock at commit time, so
/// a token unambiguously identifies "everything committed up to here"
/// regardless of which key produced it. The unset token (rendered as the
/// empty string) means "no version" and is what callers send on create.
///
/// Callers should treat tokens as opaque strings; ordering is only exposed
/// for the store and its watch machinery.
#[derive(Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ResourceVersion(u64);

impl ResourceVersion {
    /// The unset token.
    pub const fn unset() -> Self {
        Self(0)
    }

    /// Build a token from a raw clock value.
    pub const fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    /// The raw clock value.
    pub const fn as_raw(&self) -> u64 {
        self.0
    }

    /// Returns `true` if this is the unset token.
    pub const fn is_unset(&self) -> bool {
        self.0 == 0
    }

    /// The token that follows this one on the clock.
    pub const fn next(&self) -> Self {
        Self(self.0 + 1)
    }

    /// Parse a token from its wire form.
    ///
    /// The empty string and `"0"` both parse to the unset token.
    pub fn parse(s: &str) -> Result<Self, TypeError> {
        if s.is_empty() {
            return Ok(Self::unset());
        }
        if !s.bytes().all(|b| b.is_ascii_digit()) {
            return Err(TypeError::InvalidResourceVersion(s.to_string()));
        }
        s.parse::<u64>()
            .map(Self)
            .map_err(|_| TypeError::InvalidResourceVersion(s.to_string()))
    }
}

impl fmt::Debug for ResourceVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ResourceVersion({self})")
    }
}

impl fmt::Display for ResourceVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_unset() {
            Ok(())
        } else {
            write!(f, "{}", self.0)
        }
    }
}

impl FromStr for ResourceVersion {
    type Err = TypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl Serialize for ResourceVersion {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for ResourceVersion {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Self::parse(&s).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn unset_renders_empty() {
        assert_eq!(ResourceVersion::unset().to_string(), "");
        assert!(ResourceVersion::default().is_unset());
    }

    #[test]
    fn parse_accepts_empty_and_zero_as_unset() {
        assert!(ResourceVersion::parse("").unwrap().is_unset());
        assert!(ResourceVersion::parse("0").unwrap().is_unset());
    }

    #[test]
    fn parse_rejects_garbage() {
        for bad in ["abc", "-1", "+2", "1.5", " 3", "99999999999999999999999"] {
            assert!(
                matches!(
                    ResourceVersion::parse(bad),
                    Err(TypeError::InvalidResourceVersion(_))
                ),
                "{bad:?} should be rejected"
            );
        }
    }

    #[test]
    fn next_advances_clock() {
        let v = ResourceVersion::unset().next();
        assert_eq!(v.to_string(), "1");
        assert!(v.next() > v);
    }

    #[test]
    fn serializes_as_string() {
        let json = serde_json::to_string(&ResourceVersion::from_raw(42)).unwrap();
        assert_eq!(json, "\"42\"");
        let back: ResourceVersion = serde_json::from_str("\"\"").unwrap();
        assert!(back.is_unset());
        assert!(serde_json::from_str::<ResourceVersion>("\"x\"").is_err());
    }

    proptest! {
        #[test]
        fn ordering_follows_clock(a in 1u64..u64::MAX / 2, b in 1u64..u64::MAX / 2) {
            let va = ResourceVersion::from_raw(a);
            let vb = ResourceVersion::from_raw(b);
            prop_assert_eq!(va < vb, a < b);
            prop_assert_eq!(ResourceVersion::parse(&va.to_string()).unwrap(), va);
        }
    }
}
