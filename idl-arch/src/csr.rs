use std::fmt::{Display, Formatter};
use std::str::FromStr;

use anyhow::{bail, Context, Error};
use serde::{Deserialize, Serialize};

/// Access type of a CSR field.
///
/// The textual codes are the ones used by the architecture database; they are validated when the
/// configuration is loaded, an unknown code is a load error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CsrFieldType {
    /// Read-only constant.
    #[serde(rename = "RO")]
    ReadOnly,
    /// Read-only, updated by hardware.
    #[serde(rename = "RO-H")]
    ReadOnlyHardware,
    /// Read-write.
    #[serde(rename = "RW")]
    ReadWrite,
    /// Read-write, with a restricted set of legal values.
    #[serde(rename = "RW-R")]
    ReadWriteRestricted,
    /// Read-write, updated by hardware.
    #[serde(rename = "RW-H")]
    ReadWriteHardware,
    /// Read-write, restricted and updated by hardware.
    #[serde(rename = "RW-RH")]
    ReadWriteRestrictedHardware,
}

impl CsrFieldType {
    pub fn as_str(&self) -> &'static str {
        match self {
            CsrFieldType::ReadOnly => "RO",
            CsrFieldType::ReadOnlyHardware => "RO-H",
            CsrFieldType::ReadWrite => "RW",
            CsrFieldType::ReadWriteRestricted => "RW-R",
            CsrFieldType::ReadWriteHardware => "RW-H",
            CsrFieldType::ReadWriteRestrictedHardware => "RW-RH",
        }
    }

    /// Software can't write fields of this type.
    pub fn is_read_only(&self) -> bool {
        matches!(
            self,
            CsrFieldType::ReadOnly | CsrFieldType::ReadOnlyHardware
        )
    }
}

impl Display for CsrFieldType {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Inclusive bit range `msb..=lsb` of a field inside its CSR.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FieldLocation {
    pub msb: u32,
    pub lsb: u32,
}

impl FieldLocation {
    pub fn width(&self) -> u32 {
        self.msb - self.lsb + 1
    }
}

impl FromStr for FieldLocation {
    type Err = Error;

    /// Parse either `hi-lo` or a single bit index.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parse = |part: &str| {
            part.trim()
                .parse::<u32>()
                .with_context(|| format!("Invalid field location '{}'", s))
        };
        let (msb, lsb) = match s.split_once('-') {
            Some((msb, lsb)) => (parse(msb)?, parse(lsb)?),
            None => {
                let bit = parse(s)?;
                (bit, bit)
            }
        };
        if msb < lsb {
            bail!("Invalid field location '{}': msb is smaller than lsb", s);
        }
        Ok(FieldLocation { msb, lsb })
    }
}

/// Reset value of a field: either a known integer or a value chosen by the implementation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ResetValue {
    Known(u64),
    /// `UNDEFINED_LEGAL` and friends.
    Undefined(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CsrFieldDef {
    pub name: String,
    /// Location valid for every XLEN.
    #[serde(default)]
    pub location: Option<String>,
    /// Location when the CSR is accessed with XLEN=32.
    #[serde(default)]
    pub location_rv32: Option<String>,
    /// Location when the CSR is accessed with XLEN=64.
    #[serde(default)]
    pub location_rv64: Option<String>,
    #[serde(rename = "type")]
    pub ty: CsrFieldType,
    #[serde(default)]
    pub reset_value: Option<ResetValue>,
    #[serde(default)]
    pub description: Option<String>,
}

impl CsrFieldDef {
    /// Location of the field for the given effective XLEN. `None` if the location depends on an
    /// XLEN which is not known.
    pub fn location(&self, xlen: Option<u32>) -> Result<Option<FieldLocation>, Error> {
        if let Some(location) = &self.location {
            return location.parse().map(Some);
        }
        let location = match xlen {
            Some(32) => self.location_rv32.as_ref(),
            Some(64) => self.location_rv64.as_ref(),
            Some(other) => bail!("Unsupported XLEN {}", other),
            None => return Ok(None),
        };
        match location {
            Some(location) => location.parse().map(Some),
            None => bail!(
                "Field '{}' does not exist when XLEN={}",
                self.name,
                xlen.unwrap_or_default()
            ),
        }
    }

    /// Check that at least one location is present and all of them parse.
    pub fn validate(&self) -> Result<(), Error> {
        let locations = [&self.location, &self.location_rv32, &self.location_rv64];
        if locations.iter().all(|l| l.is_none()) {
            bail!("Field '{}' has no location", self.name);
        }
        if self.location.is_some() && (self.location_rv32.is_some() || self.location_rv64.is_some())
        {
            bail!(
                "Field '{}' has both a fixed and an XLEN-dependent location",
                self.name
            );
        }
        for location in locations.into_iter().flatten() {
            location
                .parse::<FieldLocation>()
                .with_context(|| format!("In field '{}'", self.name))?;
        }
        Ok(())
    }

    /// The reset value, if it is a known integer.
    pub fn known_reset_value(&self) -> Option<u64> {
        match &self.reset_value {
            Some(ResetValue::Known(value)) => Some(*value),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CsrDef {
    pub name: String,
    #[serde(default)]
    pub address: Option<u32>,
    /// When set, the CSR only exists with this XLEN.
    #[serde(default)]
    pub base: Option<u32>,
    #[serde(default)]
    pub fields: Vec<CsrFieldDef>,
    #[serde(default)]
    pub description: Option<String>,
}

impl CsrDef {
    pub fn field(&self, name: &str) -> Option<&CsrFieldDef> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// Width of the whole CSR, `None` when it follows an unknown XLEN.
    pub fn length(&self, xlen: Option<u32>) -> Option<u32> {
        self.base.or(xlen)
    }

    pub fn validate(&self) -> Result<(), Error> {
        if let Some(base) = self.base {
            if base != 32 && base != 64 {
                bail!("CSR '{}' has an invalid base {}", self.name, base);
            }
        }
        for field in &self.fields {
            field
                .validate()
                .with_context(|| format!("In CSR '{}'", self.name))?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn field(yaml: &str) -> CsrFieldDef {
        serde_yaml::from_str(yaml).unwrap()
    }

    #[test]
    fn test_field_types() {
        let f = field("{ name: SXL, location_rv64: '35-34', type: RO-H }");
        assert_eq!(f.ty, CsrFieldType::ReadOnlyHardware);
        assert!(f.ty.is_read_only());
        assert!(serde_yaml::from_str::<CsrFieldDef>("{ name: X, location: 1, type: WO }").is_err());
    }

    #[test]
    fn test_xlen_dependent_location() {
        let f = field("{ name: SXL, location_rv64: '35-34', type: RO-H }");
        assert_eq!(f.location(None).unwrap(), None);
        assert_eq!(
            f.location(Some(64)).unwrap(),
            Some(FieldLocation { msb: 35, lsb: 34 })
        );
        assert!(f.location(Some(32)).is_err());
    }

    #[test]
    fn test_single_bit_location() {
        let f = field("{ name: MIE, location: '3', type: RW, reset_value: 0 }");
        let loc = f.location(Some(32)).unwrap().unwrap();
        assert_eq!(loc.width(), 1);
        assert_eq!(f.known_reset_value(), Some(0));
    }

    #[test]
    fn test_undefined_reset_value() {
        let f = field("{ name: MPP, location: '12-11', type: RW-R, reset_value: UNDEFINED_LEGAL }");
        assert_eq!(f.known_reset_value(), None);
        assert!(f.validate().is_ok());
    }
}
