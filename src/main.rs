use anyhow::Result;
use clap::Parser as _;
use mapirouter::{
    cli::{self, Args},
    config::Config,
    logging,
};

fn main() -> Result<()> {
    let args = Args::parse();
    logging::init(args.command.owner());
    let config = Config::load_from_file(args.config.clone())?;
    cli::run(&args, &config)
}
