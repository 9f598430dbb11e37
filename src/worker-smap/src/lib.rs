pub mod errors;
pub mod work;

pub use errors::Error;

pub use work::{generate, poll_loop, rebuild_queue, seed_settings};
