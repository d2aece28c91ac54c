use serde::Deserialize;

use callmeter_core::error::{CallmeterError, Result};
use callmeter_core::metrics::DEFAULT_SIGNIFICANT_FIGURES;
use callmeter_core::MetricRegistry;

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct InstrumentationConfig {
    pub version: u32,

    #[serde(default)]
    pub client: ClientSection,

    #[serde(default)]
    pub observers: ObserversSection,

    #[serde(default)]
    pub metrics: MetricsSection,
}

impl Default for InstrumentationConfig {
    fn default() -> Self {
        Self {
            version: 1,
            client: ClientSection::default(),
            observers: ObserversSection::default(),
            metrics: MetricsSection::default(),
        }
    }
}

impl InstrumentationConfig {
    pub fn validate(&self) -> Result<()> {
        if self.version != 1 {
            return Err(CallmeterError::InvalidConfig(format!(
                "unsupported config version {}",
                self.version
            )));
        }
        self.client.validate()?;
        self.metrics.validate()?;
        Ok(())
    }

    /// Registry whose histograms use the configured precision.
    pub fn registry(&self) -> Result<MetricRegistry> {
        MetricRegistry::with_significant_figures(self.metrics.significant_figures)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ClientSection {
    #[serde(default = "default_prefix")]
    pub prefix: String,

    #[serde(default)]
    pub name: Option<String>,
}

impl Default for ClientSection {
    fn default() -> Self {
        Self {
            prefix: default_prefix(),
            name: None,
        }
    }
}

impl ClientSection {
    pub fn validate(&self) -> Result<()> {
        if self.prefix.trim().is_empty() {
            return Err(CallmeterError::InvalidConfig(
                "client.prefix must not be empty".into(),
            ));
        }
        Ok(())
    }

    /// Instance name, with an empty string treated as absent.
    pub fn instance_name(&self) -> Option<&str> {
        self.name.as_deref().filter(|n| !n.is_empty())
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ObserversSection {
    #[serde(default = "default_true")]
    pub connections: bool,

    #[serde(default = "default_true")]
    pub calls: bool,
}

impl Default for ObserversSection {
    fn default() -> Self {
        Self {
            connections: true,
            calls: true,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MetricsSection {
    #[serde(default = "default_significant_figures")]
    pub significant_figures: u8,
}

impl Default for MetricsSection {
    fn default() -> Self {
        Self {
            significant_figures: default_significant_figures(),
        }
    }
}

impl MetricsSection {
    pub fn validate(&self) -> Result<()> {
        if !(1..=5).contains(&self.significant_figures) {
            return Err(CallmeterError::InvalidConfig(
                "metrics.significant_figures must be between 1 and 5".into(),
            ));
        }
        Ok(())
    }
}

pub const DEFAULT_PREFIX: &str = "http-client";

fn default_prefix() -> String {
    DEFAULT_PREFIX.into()
}
fn default_true() -> bool {
    true
}
fn default_significant_figures() -> u8 {
    DEFAULT_SIGNIFICANT_FIGURES
}
