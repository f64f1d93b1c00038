//! Tracing setup shared by the bridges and the CLI

use tracing_subscriber::EnvFilter;

/// Default filter when neither `RUST_LOG` nor an explicit directive is given
pub const DEFAULT_FILTER: &str = "onepace_core=info";

/// Install the global fmt subscriber
///
/// `directive` overrides `RUST_LOG`. Calling this more than once is harmless:
/// the first subscriber wins and later calls return `false`.
pub fn init_logging(directive: Option<&str>) -> bool {
    let filter = match directive {
        Some(directive) => EnvFilter::new(directive),
        None => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER)),
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .try_init()
        .is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_second_init_is_noop() {
        init_logging(Some("onepace_core=debug"));
        assert!(!init_logging(None));
    }
}
