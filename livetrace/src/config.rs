use anyhow::{Context, Result};
use std::{fs::File, io::Read};

use serde::Deserialize;

#[derive(Deserialize, Debug, Clone, Default)]
#[serde(default)]
pub struct LivetraceConfig {
    pub agent: AgentSection,
    pub control: ControlSection,
    pub sink: SinkSection,
}

#[derive(Deserialize, Debug, Clone)]
#[serde(default)]
pub struct AgentSection {
    pub app_name: String,
    /// When set, condition evaluation failures are reported to the sink
    /// as condition-error events instead of being silently skipped.
    pub report_errors: bool,
}

impl Default for AgentSection {
    fn default() -> Self {
        Self {
            app_name: "unknown".to_owned(),
            report_errors: false,
        }
    }
}

#[derive(Deserialize, Debug, Clone)]
#[serde(default)]
pub struct ControlSection {
    pub host: String,
    pub port: u16,
}

impl Default for ControlSection {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_owned(),
            port: 5001,
        }
    }
}

#[derive(Deserialize, Debug, Clone)]
#[serde(default)]
pub struct SinkSection {
    pub url: String,
    pub connect_timeout_ms: u64,
    pub read_timeout_ms: u64,
    pub max_retries: u32,
    pub base_delay_ms: u64,
}

impl Default for SinkSection {
    fn default() -> Self {
        Self {
            url: "http://127.0.0.1:4317".to_owned(),
            connect_timeout_ms: 5000,
            read_timeout_ms: 5000,
            max_retries: 3,
            base_delay_ms: 100,
        }
    }
}

impl LivetraceConfig {
    pub fn new() -> Result<Self> {
        Self::from_path("Livetrace.toml")
    }

    pub fn from_path(path: &str) -> Result<Self> {
        let current_dir = std::env::current_dir().context("unable to get current dir")?;
        let mut config_file = File::open(path)
            .with_context(move || format!("{path} not found in {current_dir:?}"))?;
        let mut contents = String::new();
        config_file
            .read_to_string(&mut contents)
            .with_context(|| format!("something went wrong reading {path}"))?;
        let config: LivetraceConfig = toml::from_str(&contents)?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = LivetraceConfig::default();
        assert_eq!(config.control.port, 5001);
        assert_eq!(config.sink.url, "http://127.0.0.1:4317");
        assert_eq!(config.sink.max_retries, 3);
        assert!(!config.agent.report_errors);
    }

    #[test]
    fn test_partial_toml_overlays_defaults() {
        let config: LivetraceConfig = toml::from_str(
            r#"
            [agent]
            app_name = "orders"

            [sink]
            url = "http://10.0.0.5:4317/"
            max_retries = 1
            "#,
        )
        .unwrap();
        assert_eq!(config.agent.app_name, "orders");
        assert_eq!(config.sink.max_retries, 1);
        assert_eq!(config.sink.connect_timeout_ms, 5000);
        assert_eq!(config.control.host, "127.0.0.1");
    }
}
