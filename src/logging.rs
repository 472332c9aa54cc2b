//! Tracing subscriber setup for the binary
//!
//! Logs go to stderr so `--json` output on stdout stays machine-readable.

use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer, Registry};

/// Filter when `RUST_LOG` is unset
pub fn default_filter(verbose: bool) -> String {
    if verbose {
        "brick_hospital=debug,info".to_string()
    } else {
        "brick_hospital=info,warn".to_string()
    }
}

/// Install the global subscriber; `RUST_LOG` wins over `verbose`
///
/// Calling twice is harmless (the second install is ignored).
pub fn init(verbose: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter(verbose)));

    let console_layer = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(verbose)
        .with_file(false)
        .with_line_number(false)
        .with_filter(filter);

    let _ = Registry::default().with(console_layer).try_init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_filter_parses() {
        for verbose in [false, true] {
            assert!(EnvFilter::try_new(default_filter(verbose)).is_ok());
        }
    }

    #[test]
    fn test_init_twice() {
        init(false);
        init(true);
    }
}
