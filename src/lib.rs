pub mod announcement;
pub mod clock;
pub mod config;
pub mod db;
pub mod lifecycle; // appointment state machine + guest quotas
pub mod models;
pub mod notify;
pub mod profile; // patient profiles + record trail
pub mod queue; // priority round-robin processing queue
pub mod worklist; // doctor dashboard + guest overview

use tracing_subscriber::EnvFilter;

/// Install the global `tracing` subscriber.
///
/// `RUST_LOG` wins over `config::default_log_filter()`. A second call is a
/// no-op, so tests and the binary can both call it.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(config::default_log_filter())),
        )
        .try_init();
}
