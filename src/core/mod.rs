pub mod client;
pub mod logging;
pub mod persistence;
pub mod util;
