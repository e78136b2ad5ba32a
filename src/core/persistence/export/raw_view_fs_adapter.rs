use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tracing::info;

use crate::domain::report::dto::RawViewExport;

/// FS adapter for the JSON export of an aggregated view.
///
/// Writes go to a temp file that is renamed into place.
pub struct RawViewFsAdapter;

impl RawViewFsAdapter {
    /// `<output>.raw.json` next to a report file.
    pub fn default_path(output: &Path) -> PathBuf {
        let mut name = output.as_os_str().to_owned();
        name.push(".raw.json");
        PathBuf::from(name)
    }

    pub fn write(path: &Path, export: &RawViewExport) -> Result<()> {
        if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
            fs::create_dir_all(dir).context("Failed to create export directory")?;
        }

        let json = serde_json::to_vec_pretty(export).context("Failed to serialize view export")?;

        let tmp_path = path.with_extension("json.tmp");
        let mut f = File::create(&tmp_path).context("Failed to create temp export file")?;
        f.write_all(&json)?;
        f.flush()?;
        f.sync_all().context("Failed to sync temp export file")?;
        fs::rename(&tmp_path, path).context("Failed to finalize export file")?;

        info!(path = %path.display(), rows = export.rows.len(), "Aggregated view exported");
        Ok(())
    }

    pub fn read(path: &Path) -> Result<RawViewExport> {
        let text = fs::read_to_string(path)
            .with_context(|| format!("Failed to read export {}", path.display()))?;
        serde_json::from_str(&text).context("Failed to parse view export")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::common::model::Provider;
    use crate::domain::report::dto::{CompletenessStatus, ProviderStatusDto, ViewRow};
    use rust_decimal_macros::dec;

    #[test]
    fn export_survives_a_trip_through_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("view.json");

        let export = RawViewExport {
            group_by: vec!["provider".into()],
            rows: vec![ViewRow {
                label: "AWS/USD".into(),
                values: vec!["AWS".into()],
                currency: "USD".into(),
                amount: dec!(15.000001),
                amount_display: "15.00".into(),
                record_count: 2,
                share: dec!(100.0),
            }],
            providers: vec![ProviderStatusDto {
                provider: Provider::Aws.as_code().into(),
                status: CompletenessStatus::Complete,
                records: 2,
                skipped: 0,
                reason: None,
            }],
        };

        RawViewFsAdapter::write(&path, &export).unwrap();
        assert!(!path.with_extension("json.tmp").exists());

        let back = RawViewFsAdapter::read(&path).unwrap();
        assert_eq!(back, export);
        assert_eq!(back.rows[0].amount.to_string(), "15.000001");
    }

    #[test]
    fn default_path_appends_suffix() {
        assert_eq!(
            RawViewFsAdapter::default_path(Path::new("out/report.md")),
            PathBuf::from("out/report.md.raw.json")
        );
    }
}
