use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use crate::error::{AgentError, Result};

/// Installs the global subscriber. `RUST_LOG` wins over the `verbose` default.
pub fn init_tracing(verbose: bool, json: bool) -> Result<()> {
    let default_level = if verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    let registry = tracing_subscriber::registry().with(filter);

    let installed = if json {
        registry.with(fmt::layer().json().with_target(true)).try_init()
    } else {
        registry.with(fmt::layer().with_target(false)).try_init()
    };
    installed.map_err(|err| AgentError::Config(format!("tracing already initialised: {err}")))
}
