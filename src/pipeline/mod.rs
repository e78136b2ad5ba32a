//! Collect → normalize → aggregate → render, for one run.

pub mod collect_task;
pub mod report_task;

pub use report_task::{run, run_with_adapters, RunOutcome};
