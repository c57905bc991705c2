//! Tracing subscriber setup for the `linkdeck` binary
//!
//! Filter priority, highest first:
//!
//! 1. `LINKDECK_LOG` (per-target directives, e.g. `linkdeck_sync=debug,warn`)
//! 2. `RUST_LOG`
//! 3. `-v` (debug) / `-q` (error)
//! 4. `warn`
//!
//! Logs go to stderr so command output on stdout stays machine-readable.

use tracing::Level;
use tracing_subscriber::fmt;
use tracing_subscriber::prelude::*;
use tracing_subscriber::EnvFilter;

/// Project-specific filter variable
pub(crate) const LOG_ENV: &str = "LINKDECK_LOG";

/// Verbosity chosen on the command line
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Verbosity {
    Quiet,
    Normal,
    Verbose,
}

impl Verbosity {
    /// `-v` wins over `-q`
    pub(crate) const fn from_flags(verbose: bool, quiet: bool) -> Self {
        if verbose {
            Self::Verbose
        } else if quiet {
            Self::Quiet
        } else {
            Self::Normal
        }
    }

    pub(crate) const fn default_level(self) -> Level {
        match self {
            Self::Quiet => Level::ERROR,
            Self::Normal => Level::WARN,
            Self::Verbose => Level::DEBUG,
        }
    }
}

/// Install the global subscriber; call once, first thing in `main`
pub(crate) fn init_subscriber(verbosity: Verbosity, no_color: bool) {
    let stderr_is_tty = std::io::IsTerminal::is_terminal(&std::io::stderr());
    let fmt_layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_ansi(!no_color && stderr_is_tty)
        .with_target(true);

    let registry = tracing_subscriber::registry().with(build_env_filter(
        verbosity,
        std::env::var(LOG_ENV).ok(),
        std::env::var(EnvFilter::DEFAULT_ENV).ok(),
    ));
    if verbosity == Verbosity::Verbose {
        registry.with(fmt_layer.with_timer(fmt::time::uptime())).init();
    } else {
        registry.with(fmt_layer.without_time().compact()).init();
    }
}

/// Unparseable directives fall through to the next source
fn build_env_filter(
    verbosity: Verbosity,
    project: Option<String>,
    standard: Option<String>,
) -> EnvFilter {
    for directives in [project, standard].into_iter().flatten() {
        if let Ok(filter) = EnvFilter::try_new(&directives) {
            return filter;
        }
    }

    let level = verbosity.default_level().to_string().to_ascii_lowercase();
    if verbosity == Verbosity::Verbose {
        let directives: Vec<String> = ["linkdeck", "linkdeck_core", "linkdeck_sync", "linkdeck_cache"]
            .iter()
            .map(|target| format!("{target}={level}"))
            .chain(std::iter::once("warn".to_string()))
            .collect();
        EnvFilter::new(directives.join(","))
    } else {
        EnvFilter::new(level)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verbose_wins_over_quiet() {
        assert_eq!(Verbosity::from_flags(true, true), Verbosity::Verbose);
        assert_eq!(Verbosity::from_flags(false, true), Verbosity::Quiet);
        assert_eq!(Verbosity::from_flags(false, false).default_level(), Level::WARN);
    }

    #[test]
    fn project_variable_takes_priority() {
        let filter = build_env_filter(
            Verbosity::Quiet,
            Some("linkdeck_sync=trace".to_string()),
            Some("info".to_string()),
        );
        assert_eq!(filter.to_string(), "linkdeck_sync=trace");
    }

    #[test]
    fn bad_directives_fall_back_to_flags() {
        let filter = build_env_filter(Verbosity::Quiet, Some("linkdeck=loud".to_string()), None);
        assert_eq!(filter.to_string(), "error");
    }
}
