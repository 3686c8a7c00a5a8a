use anyhow::Result;
use clap::Parser;

use duolab_cli::{CompareArgs, commands, init_logging};

fn main() -> Result<()> {
    let args = CompareArgs::parse();
    init_logging(args.verbose);
    commands::compare::run(&args)?;
    Ok(())
}
