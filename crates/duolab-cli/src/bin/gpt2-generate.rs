use anyhow::Result;
use clap::Parser;

use duolab_cli::{GenerateArgs, commands, init_logging};

#[tokio::main]
async fn main() -> Result<()> {
    let args = GenerateArgs::parse();
    init_logging(args.verbose);
    commands::generate::run(&args).await
}
