//! Catalog of loaded raster sources.
//!
//! Sources are addressed by a dense integer id, the position in the order they were loaded.
//! Loading is done once while profiles are set up; afterwards the registry is only read and
//! can be shared between threads.

use crate::coordinate::to_degrees;
use crate::error::{RasterError, Result};
use crate::source::RasterSource;
use log::{debug, info};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Instant;

pub type SourceId = usize;

#[derive(Default)]
pub struct RasterRegistry {
  sources: Vec<RasterSource>,
  paths: HashMap<PathBuf, SourceId>,
}

impl RasterRegistry {
  pub fn new() -> Self {
    Self::default()
  }

  /// Loads the grid at `path` unless it was loaded before, in which case the existing id is
  /// returned and the file is not read again.
  pub fn load<P: AsRef<Path>>(&mut self, path: P, xmin: f64, xmax: f64, ymin: f64, ymax: f64) -> Result<SourceId> {
    let path = path.as_ref();
    if let Some(&source_id) = self.paths.get(path) {
      debug!("Raster source {} already loaded at source_id {}", path.display(), source_id);
      return Ok(source_id);
    }

    let timer = Instant::now();
    let source = RasterSource::from_file(path, xmin, xmax, ymin, ymax)?;
    let source_id = self.sources.len();
    info!(
      "Loaded raster source {} ({}x{}) as source_id {} in {:.2}s",
      path.display(),
      source.cols(),
      source.rows(),
      source_id,
      timer.elapsed().as_secs_f32()
    );

    self.sources.push(source);
    self.paths.insert(path.to_path_buf(), source_id);
    Ok(source_id)
  }

  pub fn len(&self) -> usize {
    self.sources.len()
  }

  pub fn is_empty(&self) -> bool {
    self.sources.is_empty()
  }

  pub fn get(&self, source_id: SourceId) -> Result<&RasterSource> {
    self.sources.get(source_id).ok_or(RasterError::BadId(source_id))
  }

  /// Nearest sample at a position given in micro-degrees.
  pub fn sample_nearest(&self, source_id: SourceId, lon: i32, lat: i32) -> Result<Option<i16>> {
    Ok(self.get(source_id)?.nearest(to_degrees(lon), to_degrees(lat)))
  }

  /// Interpolated sample at a position given in micro-degrees.
  pub fn sample_bilinear(&self, source_id: SourceId, lon: i32, lat: i32) -> Result<Option<i16>> {
    Ok(self.get(source_id)?.interpolate(to_degrees(lon), to_degrees(lat)))
  }
}
