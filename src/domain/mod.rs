pub mod aggregate;
pub mod common;
pub mod normalize;
pub mod report;
