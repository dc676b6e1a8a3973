//! Georeferenced raster grids (typically elevation) that routing profiles query per coordinate.

pub mod coordinate;
pub mod error;
pub mod registry;
pub mod source;

pub use coordinate::{FixedCoordinate, COORDINATE_PRECISION};
pub use error::RasterError;
pub use registry::{RasterRegistry, SourceId};
pub use source::RasterSource;
