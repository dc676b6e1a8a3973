//! A georeferenced grid of 16-bit samples.

use crate::error::{RasterError, Result};
use std::fs;
use std::path::Path;

/// Immutable row-major grid covering `[xmin, xmax] x [ymin, ymax]`.
/// Rows run north to south, columns west to east.
#[derive(Clone, Debug)]
pub struct RasterSource {
  data: Vec<i16>,
  cols: usize,
  rows: usize,
  xmin: f64,
  xmax: f64,
  ymin: f64,
  ymax: f64,
  xstep: f64,
  ystep: f64,
}

impl RasterSource {
  pub fn new(grid: Vec<Vec<i16>>, xmin: f64, xmax: f64, ymin: f64, ymax: f64) -> Result<Self> {
    let bounds = [xmin, xmax, ymin, ymax];
    if bounds.iter().any(|b| !b.is_finite()) || xmax <= xmin || ymax <= ymin {
      return Err(RasterError::Format(format!(
        "invalid bounds ({}, {}, {}, {})",
        xmin, xmax, ymin, ymax
      )));
    }

    let rows = grid.len();
    let cols = grid.first().map_or(0, |row| row.len());
    if rows == 0 || cols == 0 {
      return Err(RasterError::Format("empty grid".to_string()));
    }
    if let Some(line) = grid.iter().position(|row| row.len() != cols) {
      return Err(RasterError::Format(format!(
        "row {} has {} columns, expected {}",
        line,
        grid[line].len(),
        cols
      )));
    }

    Ok(RasterSource {
      data: grid.into_iter().flatten().collect(),
      cols,
      rows,
      xmin,
      xmax,
      ymin,
      ymax,
      xstep: (xmax - xmin) / cols as f64,
      ystep: (ymax - ymin) / rows as f64,
    })
  }

  pub fn from_file<P: AsRef<Path>>(path: P, xmin: f64, xmax: f64, ymin: f64, ymax: f64) -> Result<Self> {
    let text = fs::read_to_string(path.as_ref()).map_err(|source| RasterError::Io {
      path: path.as_ref().to_path_buf(),
      source,
    })?;
    RasterSource::new(parse_grid(&text)?, xmin, xmax, ymin, ymax)
  }

  pub fn cols(&self) -> usize {
    self.cols
  }

  pub fn rows(&self) -> usize {
    self.rows
  }

  pub fn xstep(&self) -> f64 {
    self.xstep
  }

  pub fn ystep(&self) -> f64 {
    self.ystep
  }

  pub fn contains(&self, lon: f64, lat: f64) -> bool {
    lon >= self.xmin && lon <= self.xmax && lat >= self.ymin && lat <= self.ymax
  }

  /// Sample closest to the position, `None` outside the bounds.
  pub fn nearest(&self, lon: f64, lat: f64) -> Option<i16> {
    if !self.contains(lon, lat) {
      return None;
    }
    let (fx, fy) = self.fractional_index(lon, lat);
    let col = nearest_index(fx, self.xstep);
    let row = nearest_index(fy, self.ystep);
    Some(self.at(row, col))
  }

  /// Bilinear interpolation between the four surrounding samples, truncated to `i16`.
  pub fn interpolate(&self, lon: f64, lat: f64) -> Option<i16> {
    if !self.contains(lon, lat) {
      return None;
    }
    let (fx, fy) = self.fractional_index(lon, lat);
    let (top, bottom) = (fy.floor(), fy.ceil());
    let (left, right) = (fx.floor(), fx.ceil());

    let x = fx - left;
    let y = fy - top;
    let (x1, y1) = (1.0 - x, 1.0 - y);

    let (top, bottom, left, right) = (top as i64, bottom as i64, left as i64, right as i64);
    let value = self.at(top, left) as f64 * (x1 * y1)
      + self.at(top, right) as f64 * (x * y1)
      + self.at(bottom, left) as f64 * (x1 * y)
      + self.at(bottom, right) as f64 * (x * y);
    Some(value as i16)
  }

  fn fractional_index(&self, lon: f64, lat: f64) -> (f64, f64) {
    ((lon - self.xmin) / self.xstep, (self.ymax - lat) / self.ystep)
  }

  // Indices on the closing bound land one past the grid and are clamped back.
  fn at(&self, row: i64, col: i64) -> i16 {
    let row = row.max(0).min(self.rows as i64 - 1) as usize;
    let col = col.max(0).min(self.cols as i64 - 1) as usize;
    self.data[row * self.cols + col]
  }
}

/// Rounds down once the fractional part exceeds half a step and up otherwise.
/// Note this is the inverse of ordinary rounding; keep it that way, lookups depend on it.
fn nearest_index(fractional: f64, step: f64) -> i64 {
  let floor = fractional.floor();
  if fractional - floor > step / 2.0 {
    floor as i64
  } else {
    fractional.ceil() as i64
  }
}

/// Parses whitespace separated integers, one grid row per non-blank line.
pub fn parse_grid(text: &str) -> Result<Vec<Vec<i16>>> {
  let mut grid = Vec::new();
  for (number, line) in text.lines().enumerate() {
    if line.trim().is_empty() {
      continue;
    }
    let row = line
      .split_whitespace()
      .map(|token| {
        token.parse::<i16>().map_err(|_| {
          RasterError::Format(format!("invalid datum `{}` on line {}", token, number + 1))
        })
      })
      .collect::<Result<Vec<i16>>>()?;
    grid.push(row);
  }
  Ok(grid)
}
