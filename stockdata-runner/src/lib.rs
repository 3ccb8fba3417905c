//! StockData Runner: configuration, bounded fetch pool, pipeline profiles.
//!
//! This crate builds on `stockdata-core` to provide:
//! - TOML configuration with built-in `intraday` and `stream` profiles
//! - The fetch coordinator (private rayon pool, one call per symbol)
//! - The pipeline: resolve -> fetch -> normalize -> store, with a run summary
//! - Sequential security-details enrichment

pub mod config;
pub mod fetch;
pub mod pipeline;

pub use config::{
    builtin_profiles, Backend, Config, ConfigError, DateScope, DetailsConfig, PoolConfig, Profile,
    StorageConfig, TableConfig, DEFAULT_PROFILE,
};
pub use fetch::{fetch_all, worker_count, FetchBatch};
pub use pipeline::{
    build_registry, build_sink, run_details, run_pipeline, DetailsSummary, RunError, RunOutcome,
    RunRequest, RunSummary,
};

#[cfg(test)]
mod send_sync_checks {
    use super::*;

    fn assert_send<T: Send>() {}
    fn assert_sync<T: Sync>() {}

    #[test]
    fn config_types_are_send_sync() {
        assert_send::<Config>();
        assert_sync::<Config>();
        assert_send::<Profile>();
        assert_sync::<Profile>();
    }

    #[test]
    fn batch_and_summary_are_send_sync() {
        assert_send::<FetchBatch>();
        assert_sync::<FetchBatch>();
        assert_send::<RunSummary>();
        assert_sync::<RunSummary>();
        assert_send::<RunOutcome>();
        assert_sync::<RunOutcome>();
    }

    #[test]
    fn run_error_is_send_sync() {
        assert_send::<RunError>();
        assert_sync::<RunError>();
    }
}
