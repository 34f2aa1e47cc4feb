use tracing_subscriber::filter::{EnvFilter, ParseError};

/// Filter used when `TURNIP_LOG` is unset or cannot be parsed.
pub const DEFAULT_FILTER: &str = "warn";

/// Parses `directives` (`EnvFilter` syntax, e.g. `debug` or `turnip::shell=trace`).
/// Falls back to [`DEFAULT_FILTER`] and hands back the parse error if they are invalid.
pub fn filter(directives: &str) -> (EnvFilter, Option<ParseError>) {
    match EnvFilter::try_new(directives) {
        Ok(filter) => (filter, None),
        Err(e) => (EnvFilter::new(DEFAULT_FILTER), Some(e)),
    }
}

/// Installs a compact `tracing-subscriber` formatter on stderr. Records from the `log`
/// macros used throughout the crate are bridged into it.
pub fn init(directives: &str) {
    let (filter, rejected) = filter(directives);
    let installed = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .without_time()
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .compact()
        .try_init();
    if let Err(e) = installed {
        eprintln!("turnip: cannot install logger: {}", e);
    }
    if let Some(e) = rejected {
        warn!("ignoring invalid TURNIP_LOG `{}`: {}", directives, e);
    }
}
