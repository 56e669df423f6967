#![allow(dead_code)]

pub use test_interface::*;

mod test_interface;

use std::path::PathBuf;
use std::sync::Arc;

use riscv_idl::arch::ConfiguredArchitecture;

pub fn setup() {
    let _ = env_logger::Builder::from_default_env()
        .format_timestamp_nanos()
        .is_test(true)
        .try_init();
}

/// Path of a file in the `tests/` directory.
pub fn test_file(path: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("tests")
        .join(path)
}

/// Load one of the configurations in `tests/config`.
pub fn arch(name: &str) -> Arc<ConfiguredArchitecture> {
    let path = test_file("config").join(format!("{}.yaml", name));
    Arc::new(ConfiguredArchitecture::from_path(&path).expect("Invalid test configuration"))
}
