//! Domain types: exchanges, quote records, request windows.

pub mod exchange;
pub mod quote;

pub use exchange::{Exchange, UnknownExchange};
pub use quote::{Observation, QuoteRecord, RequestWindow};
