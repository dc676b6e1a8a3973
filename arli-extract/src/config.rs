use crate::error::{ExtractError, Result};
use crate::osm::xml::DEFAULT_BUFFER_SIZE;
use crate::osm::InputFormat;
use crate::output::OutputPaths;
use std::path::{Path, PathBuf};

const INPUT_EXTENSIONS: [&str; 5] = [".osm.pbf", ".osm.xml", ".osm", ".pbf", ".xml"];

#[derive(Clone, Debug)]
pub struct ExtractorConfig {
  pub input_path: PathBuf,
  pub profile_path: PathBuf,
  pub requested_threads: usize,
  /// Entities per buffer for readers that choose their own buffer size
  pub buffer_size: usize,
}

impl ExtractorConfig {
  pub fn new<I: Into<PathBuf>, P: Into<PathBuf>>(input_path: I, profile_path: P) -> Self {
    ExtractorConfig {
      input_path: input_path.into(),
      profile_path: profile_path.into(),
      requested_threads: num_cpus::get(),
      buffer_size: DEFAULT_BUFFER_SIZE,
    }
  }

  pub fn with_threads(mut self, threads: usize) -> Self {
    self.requested_threads = threads;
    self
  }

  pub fn validate(&self) -> Result<()> {
    if self.requested_threads < 1 {
      return Err(ExtractError::Config("number of threads must be 1 or larger".to_string()));
    }
    if self.buffer_size < 1 {
      return Err(ExtractError::Config("buffer size must be 1 or larger".to_string()));
    }
    if !self.input_path.is_file() {
      return Err(ExtractError::Config(format!(
        "input file {} not found",
        self.input_path.display()
      )));
    }
    if !self.profile_path.is_file() {
      return Err(ExtractError::Config(format!(
        "profile {} not found",
        self.profile_path.display()
      )));
    }
    if InputFormat::from_path(&self.input_path).is_none() {
      return Err(ExtractError::Config(format!(
        "unsupported input format: {}",
        self.input_path.display()
      )));
    }
    Ok(())
  }

  /// Worker count, at most the number of logical cores.
  pub fn effective_threads(&self) -> usize {
    self.requested_threads.max(1).min(num_cpus::get())
  }

  pub fn output_paths(&self) -> OutputPaths {
    OutputPaths::from_base(&strip_input_extension(&self.input_path))
  }
}

fn strip_input_extension(path: &Path) -> PathBuf {
  let name = path.to_string_lossy();
  let lower = name.to_ascii_lowercase();
  for extension in INPUT_EXTENSIONS.iter() {
    if lower.ends_with(extension) {
      return PathBuf::from(&name[..name.len() - extension.len()]);
    }
  }
  path.to_path_buf()
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::fs;
  use tempfile::tempdir;

  #[test]
  fn test_output_paths() {
    let paths = ExtractorConfig::new("/data/berlin.osm.pbf", "car.json").output_paths();
    assert_eq!(paths.edges, PathBuf::from("/data/berlin.arli"));
    assert_eq!(paths.timestamp, PathBuf::from("/data/berlin.arli.timestamp"));

    let paths = ExtractorConfig::new("monaco.OSM", "car.json").output_paths();
    assert_eq!(paths.edges, PathBuf::from("monaco.arli"));

    let paths = ExtractorConfig::new("map.xml", "car.json").output_paths();
    assert_eq!(paths.restrictions, PathBuf::from("map.arli.restrictions"));
  }

  #[test]
  fn test_effective_threads() {
    let config = ExtractorConfig::new("a.osm", "p.json");
    assert_eq!(config.clone().with_threads(1).effective_threads(), 1);
    assert_eq!(config.clone().with_threads(0).effective_threads(), 1);
    assert_eq!(config.with_threads(100_000).effective_threads(), num_cpus::get());
  }

  #[test]
  fn test_validate() {
    let dir = tempdir().unwrap();
    let input = dir.path().join("map.osm");
    let profile = dir.path().join("profile.json");
    fs::write(&input, "<osm/>").unwrap();
    fs::write(&profile, "{}").unwrap();

    assert!(ExtractorConfig::new(&input, &profile).validate().is_ok());

    let invalid = |config: ExtractorConfig| matches!(config.validate(), Err(ExtractError::Config(_)));
    assert!(invalid(ExtractorConfig::new(&input, &profile).with_threads(0)));
    assert!(invalid(ExtractorConfig::new(dir.path().join("missing.osm"), &profile)));
    assert!(invalid(ExtractorConfig::new(&input, dir.path().join("missing.json"))));

    let o5m = dir.path().join("map.o5m");
    fs::write(&o5m, "").unwrap();
    assert!(invalid(ExtractorConfig::new(&o5m, &profile)));
  }
}
