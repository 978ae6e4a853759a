pub mod utils;
pub use rasterbq::{Error, Result};

pub mod bigquery;
pub mod upload;

pub mod cli;
pub use cli::progress::Tracker;
