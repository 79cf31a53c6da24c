mod args;
mod service;

use clap::Parser;
use log::debug;

fn main() {
    let args = args::Args::parse();
    let mut builder = env_logger::Builder::from_default_env();
    if args.verbose {
        builder.filter_level(log::LevelFilter::Debug);
    }
    builder.init();
    debug!("args: {:?}", args);

    if let Err(error) = service::run(&args) {
        eprintln!("pollrank: {}", error);
        std::process::exit(1);
    }
}
