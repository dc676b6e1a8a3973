use arli_extract::output::*;
use arli_extract::{extract, ExtractError, ExtractorConfig};
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::{tempdir, TempDir};

const CAR_PROFILE: &str = concat!(env!("CARGO_MANIFEST_DIR"), "/profiles/car.json");

fn fixture(name: &str) -> PathBuf {
  Path::new(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures").join(name)
}

/// Copies a fixture into a fresh directory, outputs land next to the input.
fn stage(name: &str) -> (TempDir, PathBuf) {
  let dir = tempdir().unwrap();
  let input = dir.path().join(name);
  fs::copy(fixture(name), &input).unwrap();
  (dir, input)
}

fn config(input: &Path, threads: usize) -> ExtractorConfig {
  let mut config = ExtractorConfig::new(input, CAR_PROFILE).with_threads(threads);
  config.buffer_size = 3;
  config
}

#[test]
fn test_extract_network() {
  let (_dir, input) = stage("network.osm");
  let summary = extract(&config(&input, 2)).unwrap();

  assert_eq!(summary.elements.nodes, 9);
  assert_eq!(summary.elements.ways, 4);
  assert_eq!(summary.elements.relations, 2);
  assert_eq!(summary.written.edges, 4);
  assert_eq!(summary.written.restrictions, 1);

  let paths = &summary.outputs;
  assert_eq!(paths.edges, input.with_file_name("network.arli"));

  let edges = read_edges(&paths.edges).unwrap();
  let pairs: Vec<_> = edges.iter().map(|e| (e.source, e.target)).collect();
  assert_eq!(pairs, vec![(1, 2), (2, 3), (3, 4), (4, 5)]);

  let names = read_names(&paths.names).unwrap();
  assert_eq!(names, vec!["", "Unter den Linden", "Glinkastrasse"]);
  for edge in &edges {
    assert!((edge.name_id as usize) < names.len());
  }
  assert_eq!(edges[0].direction, EDGE_FORWARD | EDGE_BACKWARD);
  assert_eq!(edges[0].forward_weight, edges[0].backward_weight);
  assert_eq!(edges[2].direction, EDGE_FORWARD);
  assert_eq!(edges[2].backward_weight, 0);
  assert_eq!(names[edges[2].name_id as usize], "Glinkastrasse");

  let nodes = read_nodes(&paths.nodes).unwrap();
  let ids: Vec<u64> = nodes.iter().map(|n| n.id).collect();
  assert_eq!(ids, vec![1, 2, 3, 4, 5]);
  for edge in &edges {
    assert!(ids.binary_search(&edge.source).is_ok());
    assert!(ids.binary_search(&edge.target).is_ok());
  }
  assert_eq!(nodes[1].flags, NODE_TRAFFIC_SIGNAL);
  assert_eq!(nodes[3].flags, NODE_BARRIER);
  assert_eq!((nodes[0].lon, nodes[0].lat), (13_380_000, 52_515_000));

  let restrictions = read_restrictions(&paths.restrictions).unwrap();
  assert_eq!(
    restrictions,
    vec![RestrictionRecord {
      from_way: 10,
      via_node: 3,
      to_way: 11,
      kind: 0,
    }]
  );
  assert!(ids.binary_search(&restrictions[0].via_node).is_ok());
}

#[test]
fn test_output_independent_of_threads() {
  let (_single_dir, single_input) = stage("network.osm");
  let (_parallel_dir, parallel_input) = stage("network.osm");
  let single = extract(&config(&single_input, 1)).unwrap().outputs;
  let parallel = extract(&config(&parallel_input, 8)).unwrap().outputs;

  for (a, b) in vec![
    (&single.edges, &parallel.edges),
    (&single.restrictions, &parallel.restrictions),
    (&single.names, &parallel.names),
    (&single.nodes, &parallel.nodes),
    (&single.timestamp, &parallel.timestamp),
  ] {
    assert_eq!(fs::read(a).unwrap(), fs::read(b).unwrap(), "{} differs", a.display());
  }
}

#[test]
fn test_timestamp_passthrough() {
  let (_dir, input) = stage("network.osm");
  let summary = extract(&config(&input, 1)).unwrap();
  assert_eq!(fs::read_to_string(&summary.outputs.timestamp).unwrap(), "2024-01-01T00:00:00Z");

  let (_dir, input) = stage("no_timestamp.osm");
  let summary = extract(&config(&input, 1)).unwrap();
  assert_eq!(fs::read_to_string(&summary.outputs.timestamp).unwrap(), "n/a");
}

#[test]
fn test_empty_input() {
  let (_dir, input) = stage("buildings.osm");
  let config = config(&input, 2);
  assert!(matches!(extract(&config), Err(ExtractError::Empty)));

  let paths = config.output_paths();
  assert!(!paths.edges.exists());
  assert!(!paths.restrictions.exists());
  assert_eq!(fs::read_to_string(&paths.timestamp).unwrap(), "2024-01-01T00:00:00Z");
}

#[test]
fn test_profile_errors() {
  let (dir, input) = stage("network.osm");
  let profile = dir.path().join("broken.json");
  fs::write(&profile, r#"{ "way": { "speeds": "fast" } }"#).unwrap();
  let config = ExtractorConfig::new(&input, &profile);
  assert!(matches!(extract(&config), Err(ExtractError::Profile(_))));

  let config = ExtractorConfig::new(&input, dir.path().join("missing.json"));
  assert!(matches!(extract(&config), Err(ExtractError::Config(_))));

  let raster_profile = dir.path().join("raster.json");
  fs::write(
    &raster_profile,
    r#"{ "sources": [ { "name": "dem", "path": "dem.asc", "bounds": [0, 1, 0, 1] } ] }"#,
  )
  .unwrap();
  let config = ExtractorConfig::new(&input, &raster_profile);
  assert!(matches!(extract(&config), Err(ExtractError::Raster(_))));
}
