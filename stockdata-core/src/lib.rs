//! StockData Core: exchange quotes fetched, normalized and stored.
//!
//! This crate holds everything below the pipeline:
//! - Domain types (exchanges, quote records, request windows)
//! - Quote providers (trait + Yahoo Finance chart client)
//! - Symbol sources (SQLite registry + static list)
//! - The record normalizer producing the intraday column contract
//! - Table sinks (SQLite, Parquet)
//! - Security-details enrichment

pub mod data;
pub mod domain;
