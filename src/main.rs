mod args;
mod rec;

use clap::Parser;
use log::debug;
use snafu::ErrorCompat;

use crate::args::Args;

fn main() {
    let args = Args::parse();

    let mut builder = env_logger::Builder::from_default_env();
    if args.verbose {
        builder.filter_level(log::LevelFilter::Debug);
    }
    builder.init();
    debug!("args: {:?}", args);

    if let Err(e) = rec::run(&args) {
        eprintln!("An error occured: {}", e);
        let mut source = std::error::Error::source(e.as_ref());
        while let Some(s) = source {
            eprintln!("  caused by: {}", s);
            source = s.source();
        }
        if let Some(backtrace) = ErrorCompat::backtrace(e.as_ref()) {
            eprintln!("{}", backtrace);
        }
        std::process::exit(1);
    }
}
