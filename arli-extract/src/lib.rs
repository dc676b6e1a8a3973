//! Extraction of a routable road network from OpenStreetMap data.
//!
//! [`extract`] reads an OSM file, classifies its elements with a profile on
//! a pool of worker threads and writes edge, restriction, name and node
//! tables for the prepare step.

pub mod callbacks;
pub mod config;
pub mod containers;
pub mod driver;
pub mod error;
pub mod extraction;
pub mod extractor;
pub mod osm;
pub mod output;
pub mod profile;

pub use config::ExtractorConfig;
pub use error::{ExtractError, Result};
pub use extractor::{extract, ExtractionSummary};
