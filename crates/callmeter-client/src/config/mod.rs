//! Instrumentation config loader (strict parsing).

pub mod schema;

use std::fs;

use callmeter_core::error::{CallmeterError, Result};

pub use schema::{ClientSection, InstrumentationConfig, MetricsSection, ObserversSection};

pub fn load_from_file(path: &str) -> Result<InstrumentationConfig> {
    let s = fs::read_to_string(path)
        .map_err(|e| CallmeterError::InvalidConfig(format!("read config failed ({path}): {e}")))?;
    load_from_str(&s)
}

pub fn load_from_str(s: &str) -> Result<InstrumentationConfig> {
    let cfg: InstrumentationConfig = serde_yaml::from_str(s)
        .map_err(|e| CallmeterError::InvalidConfig(format!("invalid yaml: {e}")))?;
    cfg.validate()?;
    Ok(cfg)
}
