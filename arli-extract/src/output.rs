//! Binary artifacts handed to the prepare step.
//!
//! All tables are flat sequences of fixed-width little-endian records
//! written with `bincode`, so a reader can load them without any header.
//! Files are first written next to their destination with a `.tmp` suffix
//! and renamed once complete.

use crate::error::{ExtractError, Result};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::ffi::OsString;
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

pub const EDGE_FORWARD: u8 = 1;
pub const EDGE_BACKWARD: u8 = 2;

pub const EDGE_ROUNDABOUT: u8 = 1;
pub const EDGE_ACCESS_RESTRICTED: u8 = 1 << 1;

pub const NODE_BARRIER: u8 = 1;
pub const NODE_TRAFFIC_SIGNAL: u8 = 1 << 1;
pub const NODE_ACCESS_TAGGED: u8 = 1 << 2;

#[derive(Serialize, Deserialize, Copy, Clone, Debug, PartialEq, Eq)]
pub struct EdgeRecord {
  pub source: u64,
  pub target: u64,
  pub name_id: u32,
  /// Deciseconds, zero when the direction is closed
  pub forward_weight: u32,
  pub backward_weight: u32,
  pub direction: u8,
  pub flags: u8,
}

#[derive(Serialize, Deserialize, Copy, Clone, Debug, PartialEq, Eq)]
pub struct RestrictionRecord {
  pub from_way: u64,
  pub via_node: u64,
  pub to_way: u64,
  /// 0 forbids the turn, 1 makes it the only allowed one
  pub kind: u8,
}

#[derive(Serialize, Deserialize, Copy, Clone, Debug, PartialEq, Eq)]
pub struct NodeRecord {
  pub id: u64,
  pub lon: i32,
  pub lat: i32,
  pub flags: u8,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OutputPaths {
  pub edges: PathBuf,
  pub restrictions: PathBuf,
  pub timestamp: PathBuf,
  pub names: PathBuf,
  pub nodes: PathBuf,
}

impl OutputPaths {
  /// Output names for an input whose OSM extension was already stripped.
  pub fn from_base(base: &Path) -> Self {
    let with_suffix = |suffix: &str| {
      let mut name = OsString::from(base.as_os_str());
      name.push(suffix);
      PathBuf::from(name)
    };
    OutputPaths {
      edges: with_suffix(".arli"),
      restrictions: with_suffix(".arli.restrictions"),
      timestamp: with_suffix(".arli.timestamp"),
      names: with_suffix(".arli.names"),
      nodes: with_suffix(".arli.nodes"),
    }
  }
}

fn tmp_path(path: &Path) -> PathBuf {
  let mut name = OsString::from(path.as_os_str());
  name.push(".tmp");
  PathBuf::from(name)
}

fn write_atomic<F>(path: &Path, write: F) -> Result<()>
where
  F: FnOnce(&mut BufWriter<File>) -> Result<()>,
{
  let tmp = tmp_path(path);
  let result = File::create(&tmp).map_err(ExtractError::from).and_then(|file| {
    let mut writer = BufWriter::new(file);
    write(&mut writer)?;
    writer.flush()?;
    Ok(())
  });
  if let Err(error) = result {
    let _ = fs::remove_file(&tmp);
    return Err(error);
  }
  fs::rename(&tmp, path)?;
  Ok(())
}

pub fn write_records<T: Serialize>(path: &Path, records: &[T]) -> Result<()> {
  write_atomic(path, |writer| {
    for record in records {
      bincode::serialize_into(&mut *writer, record)?;
    }
    Ok(())
  })
}

pub fn write_names(path: &Path, names: &[String]) -> Result<()> {
  write_atomic(path, |writer| Ok(bincode::serialize_into(writer, names)?))
}

pub fn write_timestamp(path: &Path, timestamp: &str) -> Result<()> {
  write_atomic(path, |writer| Ok(writer.write_all(timestamp.as_bytes())?))
}

fn read_records<T: DeserializeOwned>(path: &Path) -> Result<Vec<T>> {
  let data = fs::read(path)?;
  let mut input = data.as_slice();
  let mut records = Vec::new();
  while !input.is_empty() {
    records.push(bincode::deserialize_from(&mut input)?);
  }
  Ok(records)
}

pub fn read_edges(path: &Path) -> Result<Vec<EdgeRecord>> {
  read_records(path)
}

pub fn read_restrictions(path: &Path) -> Result<Vec<RestrictionRecord>> {
  read_records(path)
}

pub fn read_nodes(path: &Path) -> Result<Vec<NodeRecord>> {
  read_records(path)
}

pub fn read_names(path: &Path) -> Result<Vec<String>> {
  let data = fs::read(path)?;
  Ok(bincode::deserialize(&data)?)
}
