pub mod catalog;
pub mod cli;
pub mod config;
pub mod db;
pub mod embedding;
pub mod error;
pub mod framedb;
pub mod histogram;
mod metrics;
pub mod model;
pub mod retrieval;
pub mod server;
pub mod store;
pub mod tokens;
pub mod utils;

pub use config::Opts;
pub use error::{Error, Result};
pub use framedb::{FrameDB, FrameDBBuilder};
