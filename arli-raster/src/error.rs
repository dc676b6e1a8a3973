use std::io;
use std::path::PathBuf;
use thiserror::Error;

use crate::registry::SourceId;

#[derive(Error, Debug)]
pub enum RasterError {
  #[error("error reading raster source {}: {source}", .path.display())]
  Io {
    path: PathBuf,
    #[source]
    source: io::Error,
  },

  #[error("malformed raster source: {0}")]
  Format(String),

  #[error("no such loaded raster source: {0}")]
  BadId(SourceId),
}

pub type Result<T> = std::result::Result<T, RasterError>;
