pub mod hostname;
pub mod logging;
pub mod poll_interval;
