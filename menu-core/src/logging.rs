//! Process logger as an explicit handle.
//!
//! Nothing is installed globally: `main` scopes the handle over the run and
//! the worker pool installs a clone on each of its threads.

use tracing::Dispatch;
use tracing_subscriber::EnvFilter;

const DEFAULT_FILTER: &str = "info";

#[derive(Clone)]
pub struct Logging {
    dispatch: Dispatch,
}

impl Logging {
    /// Timestamped text output on stdout, INFO unless `RUST_LOG` says otherwise.
    pub fn init() -> Self {
        let subscriber = tracing_subscriber::fmt()
            .with_env_filter(
                EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER)),
            )
            .with_target(false)
            .with_writer(std::io::stdout)
            .finish();

        Logging {
            dispatch: Dispatch::new(subscriber),
        }
    }

    /// Discards everything.
    #[cfg(test)]
    pub fn none() -> Self {
        Logging {
            dispatch: Dispatch::none(),
        }
    }

    /// Runs `f` with this logger as the current thread's default.
    pub fn scope<T>(&self, f: impl FnOnce() -> T) -> T {
        tracing::dispatcher::with_default(&self.dispatch, f)
    }
}
