// Infrastructure layer - External dependencies and adapters
pub mod channel_source;
pub mod config;
pub mod influx_usage_ledger;
pub mod memory;
pub mod ndjson_stream;
pub mod simulated_source;
