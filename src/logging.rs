//! Tracing setup.
//!
//! Grounded on `logger/setup.go` in the original (console writer, `NoColor`
//! toggle, level-driven filter), reimplemented with the teacher's own
//! `tracing`/`tracing-subscriber` stack.

use crate::config::Config;

pub fn init(cfg: &Config) {
    let filter = tracing_subscriber::EnvFilter::try_new(&cfg.log_level)
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_ansi(!cfg.log_nocolor)
        .with_target(false)
        .init();
}
