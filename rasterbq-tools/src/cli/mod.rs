pub mod args;
pub mod progress;
pub use progress::{Counter, DetailCounter, Progress};

use std::fmt::Display;
#[inline]
pub fn unwrap_or_exit<T, E: Display>(res: Result<T, E>) -> T {
    match res {
        Err(e) => {
            eprintln!("Error: {:#}", e);
            std::process::exit(1)
        }
        Ok(t) => t,
    }
}

#[macro_export]
macro_rules! async_main {
    ($name:expr) => {
        #[tokio::main]
        async fn main() {
            $crate::cli::unwrap_or_exit({ $name }.await);
        }
    };
}
