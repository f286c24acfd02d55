mod add;
mod export;
mod info;
mod search;
pub mod server;

pub use add::*;
pub use export::*;
pub use info::*;
pub use search::*;
pub use server::*;

use crate::config::Opts;

pub trait SubCommandExtend {
    fn run(&self, opts: &Opts) -> impl std::future::Future<Output = anyhow::Result<()>> + Send;
}
