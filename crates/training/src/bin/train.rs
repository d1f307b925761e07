use clap::Parser;
use log::LevelFilter;
use training::logging::init_logging;
use training::util::{run_train, TrainArgs};

fn main() -> anyhow::Result<()> {
    init_logging(LevelFilter::Info);
    let args = TrainArgs::parse();
    run_train(args)
}
