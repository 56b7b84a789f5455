//! Aquastat worker
//!
//! Consumes tracking events as newline-delimited JSON on stdin, e.g.
//!
//! ```text
//! {"path":"/farms/3","code":200,"method":"GET","ua":"curl/8.0"}
//! ```
//!
//! and keeps the counters backed up until stdin closes or Ctrl-C arrives.

mod backends;
mod cli;
mod commands;

use clap::Parser;
use cli::Cli;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    cli.execute().await
}
