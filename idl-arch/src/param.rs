use anyhow::{bail, Error};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParamKind {
    Bits,
    Boolean,
    String,
    Array,
}

/// Value of a configuration parameter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParamValue {
    Boolean(bool),
    Integer(u64),
    String(String),
    Array(Vec<ParamValue>),
}

/// Declaration of a parameter, as written in the configuration file.
///
/// `width` is the bit width of `bits` parameters and of the elements of `bits` arrays; `element`
/// and `length` only apply to arrays.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParamDef {
    #[serde(skip)]
    pub name: String,
    #[serde(rename = "type")]
    pub kind: ParamKind,
    #[serde(default)]
    pub width: Option<u32>,
    #[serde(default)]
    pub element: Option<ParamKind>,
    #[serde(default)]
    pub length: Option<u32>,
    /// `None` when the configuration leaves the parameter open.
    #[serde(default)]
    pub value: Option<ParamValue>,
}

impl ParamDef {
    pub fn validate(&self) -> Result<(), Error> {
        match self.kind {
            ParamKind::Bits => match self.width {
                Some(0) | None => bail!("Parameter '{}' needs a positive width", self.name),
                Some(_) => {}
            },
            ParamKind::Array => {
                match self.element {
                    Some(ParamKind::Bits) if self.width.unwrap_or(0) == 0 => {
                        bail!("Array parameter '{}' needs an element width", self.name)
                    }
                    Some(ParamKind::Bits) | Some(ParamKind::Boolean) => {}
                    _ => bail!(
                        "Array parameter '{}' must have bits or boolean elements",
                        self.name
                    ),
                }
                if self.length.is_none() {
                    bail!("Array parameter '{}' needs a length", self.name);
                }
            }
            ParamKind::Boolean | ParamKind::String => {}
        }
        if let Some(value) = &self.value {
            self.check_value(self.kind, value)?;
        }
        Ok(())
    }

    fn check_value(&self, kind: ParamKind, value: &ParamValue) -> Result<(), Error> {
        match (kind, value) {
            (ParamKind::Bits, ParamValue::Integer(v)) => {
                let width = self.width.unwrap_or(64);
                if width < 64 && *v >> width != 0 {
                    bail!(
                        "Value {} of parameter '{}' does not fit in {} bits",
                        v,
                        self.name,
                        width
                    );
                }
            }
            (ParamKind::Boolean, ParamValue::Boolean(_)) => {}
            (ParamKind::String, ParamValue::String(_)) => {}
            (ParamKind::Array, ParamValue::Array(items)) => {
                if Some(items.len() as u32) != self.length {
                    bail!(
                        "Parameter '{}' has {} elements, expected {:?}",
                        self.name,
                        items.len(),
                        self.length
                    );
                }
                let element = self.element.unwrap_or(ParamKind::Bits);
                for item in items {
                    self.check_value(element, item)?;
                }
            }
            _ => bail!(
                "Value {:?} does not match the type of parameter '{}'",
                value,
                self.name
            ),
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn param(yaml: &str) -> ParamDef {
        let mut p: ParamDef = serde_yaml::from_str(yaml).unwrap();
        p.name = "P".into();
        p
    }

    #[test]
    fn test_bits_param() {
        assert!(param("{ type: bits, width: 7, value: 64 }").validate().is_ok());
        assert!(param("{ type: bits, width: 7, value: 200 }").validate().is_err());
        assert!(param("{ type: bits, value: 1 }").validate().is_err());
        assert!(param("{ type: bits, width: 12 }").validate().is_ok());
    }

    #[test]
    fn test_array_param() {
        let p = param("{ type: array, element: boolean, length: 2, value: [true, false] }");
        assert!(p.validate().is_ok());
        let p = param("{ type: array, element: boolean, length: 3, value: [true, false] }");
        assert!(p.validate().is_err());
    }

    #[test]
    fn test_mismatched_value() {
        assert!(param("{ type: boolean, value: 3 }").validate().is_err());
    }
}
