//! Fixed-point geographic coordinates.

/// Number of fixed-point units in one degree.
pub const COORDINATE_PRECISION: f64 = 1e6;

/// A WGS84 position stored as integer micro-degrees.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct FixedCoordinate {
  pub lon: i32,
  pub lat: i32,
}

impl FixedCoordinate {
  pub fn new(lon: i32, lat: i32) -> Self {
    FixedCoordinate { lon, lat }
  }

  pub fn from_degrees(lon: f64, lat: f64) -> Self {
    FixedCoordinate {
      lon: to_fixed(lon),
      lat: to_fixed(lat),
    }
  }

  pub fn lon_degrees(&self) -> f64 {
    to_degrees(self.lon)
  }

  pub fn lat_degrees(&self) -> f64 {
    to_degrees(self.lat)
  }
}

pub fn to_fixed(degrees: f64) -> i32 {
  (degrees * COORDINATE_PRECISION).round() as i32
}

pub fn to_degrees(fixed: i32) -> f64 {
  fixed as f64 / COORDINATE_PRECISION
}
