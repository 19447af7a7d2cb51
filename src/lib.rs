//! Lead map library
//!
//! Turns the sales-lead spreadsheet into a geocoded store and serves it to
//! the map front end.
//!
//! # Modules
//!
//! - `api`: HTTP-facing components.
//! - `core`: Normalization, priority resolution and the import pipeline.
//! - `data`: Database, lead storage, geocode cache and spreadsheet ingest.
//! - `integrations`: Remote geocoding provider.
//! - `config`: Configuration management.
//! - `errors`: Error handling types.
//! - `handlers`: HTTP request handlers.
//! - `models`: Lead, row and filter models.

pub mod api;
pub mod core;
pub mod data;
pub mod integrations;

// Re-export primary modules for shared use in tests and binaries
pub mod config;
pub mod db;
pub mod db_storage;
pub mod errors;
pub mod geocache;
pub mod geocoder;
pub mod handlers;
pub mod models;
pub mod normalize;
pub mod pipeline;
pub mod resolution;
pub mod spreadsheet;
