use std::cmp::Ordering;
use std::fmt::{Display, Formatter};
use std::str::FromStr;

use anyhow::{bail, Context, Error};
use serde::{Deserialize, Serialize};

/// Version of an extension, like `2.1` or `1.0.0`. Missing components are zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Version {
    pub major: u32,
    pub minor: u32,
    pub patch: u32,
}

impl Version {
    pub fn new(major: u32, minor: u32, patch: u32) -> Self {
        Self {
            major,
            minor,
            patch,
        }
    }
}

impl PartialOrd for Version {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Version {
    fn cmp(&self, other: &Self) -> Ordering {
        (self.major, self.minor, self.patch).cmp(&(other.major, other.minor, other.patch))
    }
}

impl FromStr for Version {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let mut parts = [0u32; 3];
        let mut count = 0;
        for (index, part) in s.split('.').enumerate() {
            if index >= 3 {
                bail!("Version '{}' has too many components", s);
            }
            parts[index] = part
                .parse()
                .with_context(|| format!("Invalid version component '{}' in '{}'", part, s))?;
            count += 1;
        }
        if count == 0 {
            bail!("Empty version");
        }
        Ok(Version::new(parts[0], parts[1], parts[2]))
    }
}

impl TryFrom<String> for Version {
    type Error = Error;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Version> for String {
    fn from(value: Version) -> Self {
        value.to_string()
    }
}

impl Display for Version {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VersionOp {
    Equal,
    Greater,
    GreaterEqual,
    Less,
    LessEqual,
    /// `~>`: same major version, and at least the given one.
    Compatible,
}

impl VersionOp {
    fn as_str(&self) -> &'static str {
        match self {
            VersionOp::Equal => "=",
            VersionOp::Greater => ">",
            VersionOp::GreaterEqual => ">=",
            VersionOp::Less => "<",
            VersionOp::LessEqual => "<=",
            VersionOp::Compatible => "~>",
        }
    }
}

/// A requirement on an extension version, like `>= 2.0`. A bare version means `=`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct VersionRequirement {
    pub op: VersionOp,
    pub version: Version,
}

impl VersionRequirement {
    pub fn satisfied_by(&self, version: &Version) -> bool {
        match self.op {
            VersionOp::Equal => version == &self.version,
            VersionOp::Greater => version > &self.version,
            VersionOp::GreaterEqual => version >= &self.version,
            VersionOp::Less => version < &self.version,
            VersionOp::LessEqual => version <= &self.version,
            VersionOp::Compatible => {
                version.major == self.version.major && version >= &self.version
            }
        }
    }
}

impl FromStr for VersionRequirement {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        // longer operators first, `>=` must not be read as `>`
        let ops = [
            ("~>", VersionOp::Compatible),
            (">=", VersionOp::GreaterEqual),
            ("<=", VersionOp::LessEqual),
            (">", VersionOp::Greater),
            ("<", VersionOp::Less),
            ("=", VersionOp::Equal),
        ];
        for (text, op) in ops {
            if let Some(rest) = s.strip_prefix(text) {
                return Ok(VersionRequirement {
                    op,
                    version: rest.parse().with_context(|| {
                        format!("Invalid version requirement '{}'", s)
                    })?,
                });
            }
        }
        Ok(VersionRequirement {
            op: VersionOp::Equal,
            version: s
                .parse()
                .with_context(|| format!("Invalid version requirement '{}'", s))?,
        })
    }
}

impl Display for VersionRequirement {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {}", self.op.as_str(), self.version)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_version() {
        assert_eq!("2.1".parse::<Version>().unwrap(), Version::new(2, 1, 0));
        assert_eq!("1.12.3".parse::<Version>().unwrap(), Version::new(1, 12, 3));
        assert!("1.2.3.4".parse::<Version>().is_err());
        assert!("x".parse::<Version>().is_err());
    }

    #[test]
    fn test_requirements() {
        let v = Version::new(2, 1, 0);
        let req = |s: &str| s.parse::<VersionRequirement>().unwrap();
        assert!(req(">= 2.0").satisfied_by(&v));
        assert!(req("2.1").satisfied_by(&v));
        assert!(!req("> 2.1").satisfied_by(&v));
        assert!(req("<3").satisfied_by(&v));
        assert!(req("~> 2.0").satisfied_by(&v));
        assert!(!req("~> 1.0").satisfied_by(&v));
        assert!(!req("= 2.0").satisfied_by(&v));
    }
}
