use tracing_subscriber::EnvFilter;

/// Crates whose chatter is only useful when debugging them.
const QUIET: &[&str] = &["igd_next=warn"];

/// Filter directive for a `-v` count.
fn level_for(verbosity: u8) -> &'static str {
    match verbosity {
        0 => "info",
        1 => "debug",
        _ => "trace",
    }
}

/// Build the log filter. `RUST_LOG` wins over `-v` when set.
pub fn filter(verbosity: u8) -> EnvFilter {
    if let Ok(filter) = EnvFilter::try_from_default_env() {
        return filter;
    }

    let mut filter = EnvFilter::new(level_for(verbosity));
    for directive in QUIET {
        if let Ok(directive) = directive.parse() {
            filter = filter.add_directive(directive);
        }
    }
    filter
}

/// Install the global subscriber, writing to stderr.
///
/// Once daemonized, stderr is the log file. Calling this twice is harmless.
pub fn init(verbosity: u8) {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter(verbosity))
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init();
}
