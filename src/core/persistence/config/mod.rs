pub mod report_config_entity;
pub mod report_config_fs_adapter;

pub use report_config_entity::{ProviderConfig, ReportConfigEntity, RetryConfig};
pub use report_config_fs_adapter::ReportConfigFsAdapter;
