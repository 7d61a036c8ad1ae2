pub mod catalog;
pub mod cli;
pub mod error;
pub mod models;
pub mod normalize;
pub mod pipeline;
pub mod runtime;
pub mod storage;
pub mod tracker;
pub mod util;

pub use cli::run_cli;
pub use error::{Error, Result, StorageError};
