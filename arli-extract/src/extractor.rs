use crate::callbacks::ContainerCallbacks;
use crate::config::ExtractorConfig;
use crate::containers::{ExtractionContainers, PreparedCounts};
use crate::driver::{ElementCounts, ParserDriver};
use crate::error::{ExtractError, Result};
use crate::osm::{open_source, OsmHeader};
use crate::output::{write_timestamp, OutputPaths};
use crate::profile::{ProfileScript, ScriptedProfile};
use arli_raster::RasterRegistry;
use log::{info, warn};
use std::sync::Arc;
use std::time::Instant;

#[derive(Clone, Debug)]
pub struct ExtractionSummary {
  pub threads: usize,
  pub elements: ElementCounts,
  pub written: PreparedCounts,
  pub outputs: OutputPaths,
}

/// Loads the profile once and builds one evaluator per worker thread.
fn load_profiles(config: &ExtractorConfig, threads: usize) -> Result<Vec<ScriptedProfile>> {
  let script = ProfileScript::from_path(&config.profile_path)?;
  let mut registry = RasterRegistry::new();
  let sources = script.load_sources(&mut registry)?;
  let registry = Arc::new(registry);
  (0..threads)
    .map(|_| script.instantiate(registry.clone(), &sources).map_err(ExtractError::from))
    .collect()
}

/// Runs the whole extraction for `config`.
pub fn extract(config: &ExtractorConfig) -> Result<ExtractionSummary> {
  let timer = Instant::now();
  config.validate()?;

  let threads = config.effective_threads();
  info!("Using {} threads", threads);
  let profiles = load_profiles(config, threads)?;

  info!("Input file: {}", config.input_path.display());
  let mut source = open_source(&config.input_path, config.buffer_size)?;
  let header = source.header();
  info!(
    "Generator: {}",
    header.get(OsmHeader::GENERATOR).unwrap_or("unknown")
  );

  let outputs = config.output_paths();
  let timestamp = header.get(OsmHeader::REPLICATION_TIMESTAMP).unwrap_or("n/a");
  info!("Timestamp: {}", timestamp);
  write_timestamp(&outputs.timestamp, timestamp)?;

  let driver = ParserDriver::new(profiles)?;
  let mut containers = ExtractionContainers::new();
  let elements = driver.run(&mut source, &mut ContainerCallbacks::new(&mut containers))?;

  if containers.is_empty() {
    warn!("The input data is empty, exiting.");
    return Err(ExtractError::Empty);
  }

  let mut profiles = driver.into_evaluators();
  let profile = profiles
    .first_mut()
    .ok_or_else(|| ExtractError::Config("no profile evaluator left".to_string()))?;
  let written = containers.prepare_data(profile, &outputs)?;

  info!(
    "Extraction finished after {:.2} seconds",
    timer.elapsed().as_secs_f32()
  );
  info!("Edge table ready for the prepare step: {}", outputs.edges.display());

  Ok(ExtractionSummary {
    threads,
    elements,
    written,
    outputs,
  })
}
