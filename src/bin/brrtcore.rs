use brrtcore::cli::{run_cli, Cli};
use clap::Parser;

fn main() -> anyhow::Result<()> {
    let _guard = brrtcore::logging::init_logging()?;
    run_cli(Cli::parse())
}
