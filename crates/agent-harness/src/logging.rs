//! Process-wide tracing setup (spec §9).
//!
//! One `tracing-subscriber` initialisation, called once from `main`.
//! `RUST_LOG` overrides the default `info` filter.

pub fn init() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .try_init()
        .ok();
}
