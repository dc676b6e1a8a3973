//! Profiles classify OSM elements into routing attributes.
//!
//! The extractor talks to a profile only through [`ProfileEvaluator`]. An
//! evaluator is used from a single worker thread at a time, so the driver
//! builds one instance per worker up front. The built-in implementation is
//! [`ScriptedProfile`], a rule set loaded from a JSON profile document.

mod restriction;
mod script;

pub use restriction::parse_restriction;
pub use script::{ProfileScript, ScriptedProfile};

use crate::extraction::{ExtractionNode, ExtractionWay, InputRestriction};
use crate::osm::{OsmNode, OsmRelation, OsmWay};
use arli_raster::{FixedCoordinate, RasterError};
use std::io;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ProfileError {
  #[error("cannot read profile {}: {source}", .path.display())]
  Read {
    path: PathBuf,
    #[source]
    source: io::Error,
  },

  #[error("{0}")]
  Script(String),

  #[error(transparent)]
  Raster(#[from] RasterError),
}

/// One edge as seen by the segment rule. Weights are deciseconds, zero
/// marks a closed direction.
#[derive(Clone, Debug, PartialEq)]
pub struct Segment {
  pub source: FixedCoordinate,
  pub target: FixedCoordinate,
  /// Great circle length in meters
  pub distance: f64,
  pub forward_weight: f64,
  pub backward_weight: f64,
}

pub trait ProfileEvaluator: Send {
  fn evaluate_node(&mut self, node: &OsmNode, result: &mut ExtractionNode) -> Result<(), ProfileError>;

  fn evaluate_way(&mut self, way: &OsmWay, result: &mut ExtractionWay) -> Result<(), ProfileError>;

  fn evaluate_turn(&mut self, relation: &OsmRelation) -> Result<Option<InputRestriction>, ProfileError>;

  fn evaluate_segment(&mut self, _segment: &mut Segment) -> Result<(), ProfileError> {
    Ok(())
  }
}
