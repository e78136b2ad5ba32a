pub mod render_service;
pub mod templates;

pub use render_service::ReportRenderer;
