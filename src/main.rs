//! Provides the main entry point to the program.
use anyhow::Result;

fn main() -> Result<()> {
    human_panic::setup_panic!();

    wattcity::cli::run_cli()
}
