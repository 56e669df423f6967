use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use std::sync::Arc;

use anyhow::{bail, Context, Error};
use itertools::Itertools;
use serde::{Deserialize, Serialize};

use crate::{
    Architecture, CsrDef, InstructionDef, ParamDef, Version, VersionRequirement,
};

/// How much of the architecture the configuration pins down.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ConfigKind {
    /// Every extension not listed is not implemented.
    #[default]
    Full,
    /// Extensions not listed (and not prohibited) may or may not be implemented.
    Partial,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtensionVersion {
    pub name: String,
    pub version: Version,
}

/// On-disk representation of a configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
struct ArchConfig {
    name: String,
    #[serde(default)]
    kind: ConfigKind,
    xlens: Vec<u32>,
    #[serde(default)]
    params: BTreeMap<String, ParamDef>,
    #[serde(default)]
    extensions: Vec<ExtensionVersion>,
    #[serde(default)]
    prohibited_extensions: Vec<String>,
    #[serde(default)]
    csrs: Vec<CsrDef>,
    #[serde(default)]
    instructions: Vec<InstructionDef>,
}

/// An [`Architecture`] backed by a configuration file.
#[derive(Debug, Clone)]
pub struct ConfiguredArchitecture {
    name: String,
    kind: ConfigKind,
    xlens: Vec<u32>,
    params: BTreeMap<String, ParamDef>,
    extensions: HashMap<String, Version>,
    prohibited_extensions: Vec<String>,
    csrs: Vec<Arc<CsrDef>>,
    csrs_by_name: HashMap<String, Arc<CsrDef>>,
    instructions: Vec<Arc<InstructionDef>>,
    instructions_by_name: HashMap<String, Arc<InstructionDef>>,
}

impl ConfiguredArchitecture {
    /// Parse and validate a configuration from its YAML text.
    pub fn from_yaml_str(content: &str) -> Result<Self, Error> {
        let config: ArchConfig =
            serde_yaml::from_str(content).context("Cannot parse the architecture configuration")?;
        Self::from_config(config)
    }

    /// Load a configuration from a YAML file.
    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self, Error> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Cannot read configuration from {}", path.display()))?;
        Self::from_yaml_str(&content)
            .with_context(|| format!("Invalid configuration {}", path.display()))
    }

    fn from_config(config: ArchConfig) -> Result<Self, Error> {
        if config.xlens.is_empty() {
            bail!("Configuration '{}' lists no XLEN", config.name);
        }
        if let Some(xlen) = config.xlens.iter().find(|x| **x != 32 && **x != 64) {
            bail!("Unsupported XLEN {} in '{}'", xlen, config.name);
        }
        if config.kind == ConfigKind::Full && !config.prohibited_extensions.is_empty() {
            bail!("A full configuration cannot prohibit extensions, they are implicit");
        }
        let mut params = BTreeMap::new();
        for (name, mut param) in config.params {
            param.name = name.clone();
            param.validate()?;
            params.insert(name, param);
        }
        let mut extensions = HashMap::new();
        for ext in config.extensions {
            if extensions.insert(ext.name.clone(), ext.version).is_some() {
                bail!("Extension '{}' listed more than once", ext.name);
            }
        }
        for csr in &config.csrs {
            csr.validate()?;
        }
        let csrs: Vec<_> = config.csrs.into_iter().map(Arc::new).collect();
        let mut csrs_by_name = HashMap::new();
        for csr in &csrs {
            if csrs_by_name.insert(csr.name.clone(), csr.clone()).is_some() {
                bail!("CSR '{}' defined more than once", csr.name);
            }
        }
        for inst in &config.instructions {
            inst.validate()?;
        }
        let instructions: Vec<_> = config.instructions.into_iter().map(Arc::new).collect();
        let mut instructions_by_name = HashMap::new();
        for inst in &instructions {
            if instructions_by_name
                .insert(inst.name.clone(), inst.clone())
                .is_some()
            {
                bail!("Instruction '{}' defined more than once", inst.name);
            }
        }
        debug!(
            "Loaded configuration '{}': xlens {:?}, extensions [{}], {} CSRs, {} instructions",
            config.name,
            config.xlens,
            extensions.keys().sorted().join(", "),
            csrs.len(),
            instructions.len()
        );
        Ok(ConfiguredArchitecture {
            name: config.name,
            kind: config.kind,
            xlens: config.xlens.into_iter().sorted().dedup().collect(),
            params,
            extensions,
            prohibited_extensions: config.prohibited_extensions,
            csrs,
            csrs_by_name,
            instructions,
            instructions_by_name,
        })
    }

    pub fn kind(&self) -> ConfigKind {
        self.kind
    }

    pub fn csrs(&self) -> &[Arc<CsrDef>] {
        &self.csrs
    }

    pub fn instructions(&self) -> &[Arc<InstructionDef>] {
        &self.instructions
    }
}

impl Architecture for ConfiguredArchitecture {
    fn name(&self) -> &str {
        &self.name
    }

    fn possible_xlens(&self) -> Vec<u32> {
        self.xlens.clone()
    }

    fn param(&self, name: &str) -> Option<&ParamDef> {
        self.params.get(name)
    }

    fn params(&self) -> Vec<&ParamDef> {
        self.params.values().collect()
    }

    fn ext(&self, name: &str, requirement: Option<&VersionRequirement>) -> Option<bool> {
        match self.extensions.get(name) {
            Some(version) => Some(requirement.map_or(true, |req| req.satisfied_by(version))),
            None => match self.kind {
                ConfigKind::Full => Some(false),
                ConfigKind::Partial if self.prohibited_extensions.iter().any(|e| e == name) => {
                    Some(false)
                }
                ConfigKind::Partial => None,
            },
        }
    }

    fn csr(&self, name: &str) -> Option<Arc<CsrDef>> {
        self.csrs_by_name.get(name).cloned()
    }

    fn csr_by_address(&self, address: u32) -> Option<Arc<CsrDef>> {
        self.csrs
            .iter()
            .find(|csr| csr.address == Some(address))
            .cloned()
    }

    fn instruction(&self, name: &str) -> Option<Arc<InstructionDef>> {
        self.instructions_by_name.get(name).cloned()
    }
}

#[cfg(test)]
mod tests {
    use speculoos::prelude::*;

    use super::*;

    const CONFIG: &str = r#"
name: rv64-test
xlens: [64]
params:
  MXLEN: { type: bits, width: 7, value: 64 }
  PHYS_ADDR_WIDTH: { type: bits, width: 7 }
extensions:
  - { name: I, version: "2.1" }
  - { name: C, version: "2.0" }
csrs:
  - name: mstatus
    address: 0x300
    fields:
      - { name: SXL, location_rv64: "35-34", type: RO-H, reset_value: 2 }
      - { name: MIE, location: "3", type: RW, reset_value: 0 }
instructions:
  - name: addi
    encoding:
      match: "-----------------000-----0010011"
      variables:
        - { name: imm, location: "31-20", sign_extend: true }
        - { name: rs1, location: "19-15" }
        - { name: rd, location: "11-7" }
    operation: "X[rd] = X[rs1] + $signed(imm);"
"#;

    #[test]
    fn test_load() {
        let arch = ConfiguredArchitecture::from_yaml_str(CONFIG).unwrap();
        assert_eq!(arch.name(), "rv64-test");
        assert_eq!(arch.possible_xlens(), vec![64]);
        assert_that(&arch.param("MXLEN")).is_some();
        assert_that(&arch.param("PHYS_ADDR_WIDTH").and_then(|p| p.value.as_ref())).is_none();
        assert_eq!(arch.csr("mstatus").unwrap().fields.len(), 2);
        assert_eq!(arch.csr_by_address(0x300).unwrap().name, "mstatus");
        assert_eq!(arch.instruction("addi").unwrap().decode_variables().len(), 3);
    }

    #[test]
    fn test_full_config_extensions() {
        let arch = ConfiguredArchitecture::from_yaml_str(CONFIG).unwrap();
        let req: VersionRequirement = ">= 2.0".parse().unwrap();
        assert_eq!(arch.ext("C", Some(&req)), Some(true));
        let req: VersionRequirement = ">= 3.0".parse().unwrap();
        assert_eq!(arch.ext("C", Some(&req)), Some(false));
        assert_eq!(arch.ext("F", None), Some(false));
    }

    #[test]
    fn test_partial_config_extensions() {
        let arch = ConfiguredArchitecture::from_yaml_str(
            "name: p\nkind: partial\nxlens: [32, 64]\nextensions: [{ name: I, version: '2.1' }]\nprohibited_extensions: [D]\n",
        )
        .unwrap();
        assert_eq!(arch.possible_xlens(), vec![32, 64]);
        assert_eq!(arch.ext("I", None), Some(true));
        assert_eq!(arch.ext("D", None), Some(false));
        assert_eq!(arch.ext("F", None), None);
    }

    #[test]
    fn test_invalid_configs() {
        assert!(ConfiguredArchitecture::from_yaml_str("name: x\nxlens: []\n").is_err());
        assert!(ConfiguredArchitecture::from_yaml_str("name: x\nxlens: [128]\n").is_err());
        assert!(ConfiguredArchitecture::from_yaml_str(
            "name: x\nxlens: [32]\nprohibited_extensions: [D]\n"
        )
        .is_err());
        assert!(ConfiguredArchitecture::from_yaml_str("name: x\nxlens: [32]\nfoo: 1\n").is_err());
    }

    #[test]
    fn test_from_path() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("cfg.yaml");
        std::fs::write(&path, CONFIG).unwrap();
        let arch = ConfiguredArchitecture::from_path(&path).unwrap();
        assert_eq!(arch.csrs().len(), 1);
        assert!(ConfiguredArchitecture::from_path(dir.path().join("missing.yaml")).is_err());
    }
}
