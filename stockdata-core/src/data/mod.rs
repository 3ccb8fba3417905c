//! Data layer: quote providers, symbol registry, normalization and storage.

pub mod details;
pub mod normalize;
pub mod provider;
pub mod registry;
pub mod schema;
pub mod sink;
pub mod sql;
pub mod yahoo;

pub use details::{
    details_frame, DetailField, DetailFields, DetailsError, DetailsProvider,
    SecurityDetailsClient,
};
pub use normalize::{bare_ticker, NormalizeError, Normalizer, PostProcess, QuoteTable};
pub use provider::{QuoteError, QuoteProvider};
pub use registry::{RegistryError, Selection, SqliteRegistry, StaticSymbols, SymbolSource};
pub use schema::{validate_intraday, SchemaError, INTRADAY_SCHEMA};
pub use sink::{ParquetSink, SqliteSink, StoreError, TableSink};
pub use sql::{validate_identifier, InvalidIdentifier};
pub use yahoo::{ProviderSettings, YahooChartClient};
