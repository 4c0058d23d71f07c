#![forbid(unsafe_code)]

use anyhow::{Result, anyhow};
use tracing_subscriber::EnvFilter;

/// Default filter for `-v` repetitions: 0 warn, 1 info, 2 debug, 3+ trace.
pub fn default_directive(verbosity: u8) -> &'static str {
    match verbosity {
        0 => "dynamo_tools=warn,dynamo=warn",
        1 => "dynamo_tools=info,dynamo=info",
        2 => "dynamo_tools=debug,dynamo=debug",
        _ => "trace",
    }
}

/// Installs the global stderr subscriber. `RUST_LOG`, when set, wins over the
/// verbosity flag.
pub fn init(verbosity: u8) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(default_directive(verbosity)))
        .map_err(|err| anyhow!("invalid log filter: {err}"))?;

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init()
        .map_err(|err| anyhow!("installing log subscriber: {err}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verbosity_directives_parse() {
        for level in 0..=4 {
            assert!(EnvFilter::try_new(default_directive(level)).is_ok());
        }
        assert_eq!(default_directive(1), "dynamo_tools=info,dynamo=info");
    }
}
