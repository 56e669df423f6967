use anyhow::{bail, Context, Error};
use serde::{Deserialize, Serialize};

/// A contiguous range of bits of an instruction encoding, `msb..=lsb`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EncodingField {
    pub msb: u32,
    pub lsb: u32,
}

impl EncodingField {
    pub fn width(&self) -> u32 {
        self.msb - self.lsb + 1
    }
}

/// A variable decoded from the instruction encoding, e.g. `rs1` or `imm`.
///
/// The location lists the encoding slices from the most significant one, separated by `|`, like
/// `31|7|30-25|11-8` for the B-type immediate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DecodeVariable {
    pub name: String,
    pub location: String,
    /// Number of implicit zero bits appended to the decoded value.
    #[serde(default)]
    pub left_shift: u32,
    #[serde(default)]
    pub sign_extend: bool,
}

impl DecodeVariable {
    pub fn fields(&self) -> Result<Vec<EncodingField>, Error> {
        self.location
            .split('|')
            .map(|part| {
                let parse = |s: &str| {
                    s.trim().parse::<u32>().with_context(|| {
                        format!("Invalid location '{}' of '{}'", self.location, self.name)
                    })
                };
                let field = match part.split_once('-') {
                    Some((msb, lsb)) => EncodingField {
                        msb: parse(msb)?,
                        lsb: parse(lsb)?,
                    },
                    None => {
                        let bit = parse(part)?;
                        EncodingField { msb: bit, lsb: bit }
                    }
                };
                if field.msb < field.lsb || field.msb > 31 {
                    bail!("Invalid location '{}' of '{}'", self.location, self.name);
                }
                Ok(field)
            })
            .collect()
    }

    /// Total width of the decoded value, including the left shift.
    pub fn width(&self) -> Result<u32, Error> {
        Ok(self.fields()?.iter().map(|f| f.width()).sum::<u32>() + self.left_shift)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Encoding {
    /// The fixed bits of the encoding, from bit 31 to bit 0, with `-` for variable bits.
    #[serde(rename = "match")]
    pub match_: String,
    #[serde(default)]
    pub variables: Vec<DecodeVariable>,
}

impl Encoding {
    pub fn validate(&self) -> Result<(), Error> {
        if self.match_.len() != 32 && self.match_.len() != 16 {
            bail!(
                "Encoding match '{}' must be 16 or 32 characters long",
                self.match_
            );
        }
        if let Some(c) = self.match_.chars().find(|c| !matches!(c, '0' | '1' | '-')) {
            bail!("Invalid character '{}' in encoding match", c);
        }
        for variable in &self.variables {
            variable.fields()?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstructionDef {
    pub name: String,
    #[serde(default)]
    pub encoding: Option<Encoding>,
    /// IDL source of the instruction semantics.
    #[serde(default, rename = "operation")]
    pub operation: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
}

impl InstructionDef {
    pub fn decode_variables(&self) -> &[DecodeVariable] {
        self.encoding
            .as_ref()
            .map(|e| e.variables.as_slice())
            .unwrap_or(&[])
    }

    pub fn validate(&self) -> Result<(), Error> {
        if let Some(encoding) = &self.encoding {
            encoding
                .validate()
                .with_context(|| format!("In instruction '{}'", self.name))?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn var(location: &str, left_shift: u32) -> DecodeVariable {
        DecodeVariable {
            name: "imm".into(),
            location: location.into(),
            left_shift,
            sign_extend: true,
        }
    }

    #[test]
    fn test_simple_field() {
        let rs1 = var("19-15", 0);
        assert_eq!(rs1.width().unwrap(), 5);
        assert_eq!(rs1.fields().unwrap(), vec![EncodingField { msb: 19, lsb: 15 }]);
    }

    #[test]
    fn test_split_immediate() {
        let imm = var("31|7|30-25|11-8", 1);
        assert_eq!(imm.width().unwrap(), 13);
        assert_eq!(imm.fields().unwrap().len(), 4);
    }

    #[test]
    fn test_invalid_location() {
        assert!(var("15-19", 0).fields().is_err());
        assert!(var("40", 0).fields().is_err());
        assert!(var("a-b", 0).fields().is_err());
    }

    #[test]
    fn test_encoding_validation() {
        let mut encoding = Encoding {
            match_: "-----------------000-----0010011".into(),
            variables: vec![var("31-20", 0)],
        };
        assert!(encoding.validate().is_ok());
        encoding.match_ = "-----------------000-----001001x".into();
        assert!(encoding.validate().is_err());
        encoding.match_ = "000".into();
        assert!(encoding.validate().is_err());
    }
}
