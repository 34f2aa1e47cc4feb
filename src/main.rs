use std::process;

use turnip::{logger, Config, Shell};

fn main() {
    let config = Config::from_env();
    logger::init(&config.log_filter);
    let mut shell = Shell::new(config);
    process::exit(shell.run());
}
