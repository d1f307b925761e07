use clap::Parser;
use log::LevelFilter;
use training::logging::init_logging;
use training::util::{run_predict, PredictArgs};

fn main() -> anyhow::Result<()> {
    init_logging(LevelFilter::Info);
    let args = PredictArgs::parse();
    run_predict(args)
}
