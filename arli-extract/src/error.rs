use crate::profile::ProfileError;
use arli_raster::RasterError;
use std::io;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ExtractError {
  #[error("{0}")]
  Config(String),

  #[error("I/O error: {0}")]
  Io(#[from] io::Error),

  #[error("malformed input: {0}")]
  Format(String),

  #[error("error in profile script:\n{0}")]
  Profile(ProfileError),

  #[error("the input data is empty, no usable edges were extracted")]
  Empty,

  #[error(transparent)]
  Raster(#[from] RasterError),
}

impl From<ProfileError> for ExtractError {
  fn from(error: ProfileError) -> Self {
    match error {
      ProfileError::Raster(raster) => ExtractError::Raster(raster),
      other => ExtractError::Profile(other),
    }
  }
}

impl From<bincode::Error> for ExtractError {
  fn from(error: bincode::Error) -> Self {
    match *error {
      bincode::ErrorKind::Io(io) => ExtractError::Io(io),
      other => ExtractError::Format(other.to_string()),
    }
  }
}

pub type Result<T> = std::result::Result<T, ExtractError>;
