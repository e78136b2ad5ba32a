use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use tracing::debug;
use validator::Validate;

use super::report_config_entity::ReportConfigEntity;

/// FS adapter for the YAML run configuration.
pub struct ReportConfigFsAdapter;

impl ReportConfigFsAdapter {
    pub fn read(path: &Path) -> Result<ReportConfigEntity> {
        let text = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;

        let config = Self::parse(&text)
            .with_context(|| format!("Invalid config file {}", path.display()))?;

        debug!(
            path = %path.display(),
            providers = config.providers.len(),
            template = %config.template,
            "Config loaded"
        );
        Ok(config)
    }

    pub fn parse(text: &str) -> Result<ReportConfigEntity> {
        let config: ReportConfigEntity =
            serde_yaml::from_str(text).context("Failed to parse config YAML")?;
        config.validate().context("Config validation failed")?;
        Ok(config)
    }
}
