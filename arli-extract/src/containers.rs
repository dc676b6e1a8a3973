//! Accumulates evaluated elements and turns them into the output tables.

use crate::error::{ExtractError, Result};
use crate::extraction::{AccessClass, ExtractionNode, ExtractionWay, InputRestriction, RestrictionKind};
use crate::osm::{OsmNode, OsmWay};
use crate::output::*;
use crate::profile::{ProfileEvaluator, Segment};
use arli_raster::FixedCoordinate;
use geo::algorithm::haversine_distance::HaversineDistance;
use geo::Point;
use log::{info, warn};
use std::collections::HashMap;
use std::time::Instant;

/// Maps names to dense ids, the empty name is always id 0.
#[derive(Debug)]
pub struct StringTable {
  ids: HashMap<String, u32>,
  names: Vec<String>,
}

impl Default for StringTable {
  fn default() -> Self {
    let mut table = StringTable {
      ids: HashMap::new(),
      names: Vec::new(),
    };
    table.intern("");
    table
  }
}

impl StringTable {
  pub fn new() -> Self {
    StringTable::default()
  }

  pub fn intern(&mut self, name: &str) -> u32 {
    if let Some(&id) = self.ids.get(name) {
      return id;
    }
    let id = self.names.len() as u32;
    self.names.push(name.to_string());
    self.ids.insert(name.to_string(), id);
    id
  }

  pub fn len(&self) -> usize {
    self.names.len()
  }

  pub fn is_empty(&self) -> bool {
    self.names.is_empty()
  }

  pub fn names(&self) -> &[String] {
    &self.names
  }
}

#[derive(Clone, Debug)]
struct NodeEntry {
  id: i64,
  coord: FixedCoordinate,
  flags: u8,
}

#[derive(Clone, Debug)]
struct WayEdge {
  source: i64,
  target: i64,
  name_id: u32,
  forward_speed: f64,
  backward_speed: f64,
  flags: u8,
}

/// Numbers of records written by `prepare_data`.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct PreparedCounts {
  pub edges: usize,
  pub restrictions: usize,
  pub nodes: usize,
  pub names: usize,
}

#[derive(Default)]
pub struct ExtractionContainers {
  nodes: Vec<NodeEntry>,
  edges: Vec<WayEdge>,
  restrictions: Vec<InputRestriction>,
  // node lists of routable ways, for restriction checks
  way_nodes: HashMap<i64, Vec<i64>>,
  names: StringTable,
}

/// Travel time in deciseconds, zero when `speed` closes the direction.
fn travel_time(distance: f64, speed: f64) -> f64 {
  if speed > 0.0 {
    (distance * 36.0 / speed).round().max(1.0)
  } else {
    0.0
  }
}

fn to_weight(weight: f64) -> u32 {
  if weight.is_finite() && weight > 0.0 {
    weight.round().max(1.0).min(f64::from(u32::MAX)) as u32
  } else {
    0
  }
}

fn distance(a: FixedCoordinate, b: FixedCoordinate) -> f64 {
  let a = Point::new(a.lon_degrees(), a.lat_degrees());
  let b = Point::new(b.lon_degrees(), b.lat_degrees());
  a.haversine_distance(&b)
}

impl ExtractionContainers {
  pub fn new() -> Self {
    ExtractionContainers::default()
  }

  pub fn add_node(&mut self, node: &OsmNode, extraction: &ExtractionNode) {
    let mut flags = 0;
    if extraction.barrier {
      flags |= NODE_BARRIER;
    }
    if extraction.traffic_signal {
      flags |= NODE_TRAFFIC_SIGNAL;
    }
    if extraction.access.is_some() {
      flags |= NODE_ACCESS_TAGGED;
    }
    self.nodes.push(NodeEntry {
      id: node.id,
      coord: node.coord,
      flags,
    });
  }

  pub fn add_way(&mut self, way: &OsmWay, extraction: &ExtractionWay) {
    if way.nodes.len() < 2 || !extraction.is_passable() {
      return;
    }

    let name_id = self.names.intern(&extraction.name);
    let mut flags = 0;
    if extraction.roundabout {
      flags |= EDGE_ROUNDABOUT;
    }
    if extraction.access == AccessClass::Restricted {
      flags |= EDGE_ACCESS_RESTRICTED;
    }
    let forward_speed = extraction.effective_forward_speed();
    let backward_speed = extraction.effective_backward_speed();

    for pair in way.nodes.windows(2) {
      if pair[0] == pair[1] {
        continue;
      }
      self.edges.push(WayEdge {
        source: pair[0],
        target: pair[1],
        name_id,
        forward_speed,
        backward_speed,
        flags,
      });
    }
    self.way_nodes.insert(way.id, way.nodes.clone());
  }

  pub fn add_restriction(&mut self, restriction: Option<InputRestriction>) {
    if let Some(restriction) = restriction {
      self.restrictions.push(restriction);
    }
  }

  pub fn is_empty(&self) -> bool {
    self.edges.is_empty()
  }

  pub fn number_of_nodes(&self) -> usize {
    self.nodes.len()
  }

  pub fn number_of_edges(&self) -> usize {
    self.edges.len()
  }

  pub fn number_of_restrictions(&self) -> usize {
    self.restrictions.len()
  }

  pub fn names(&self) -> &StringTable {
    &self.names
  }

  fn find_node(&self, id: i64) -> Option<&NodeEntry> {
    self
      .nodes
      .binary_search_by_key(&id, |n| n.id)
      .ok()
      .map(|index| &self.nodes[index])
  }

  fn resolve_edges(&self, profile: &mut dyn ProfileEvaluator) -> Result<Vec<EdgeRecord>> {
    let mut records = Vec::with_capacity(self.edges.len());
    let mut missing = 0usize;
    let mut closed = 0usize;
    for edge in &self.edges {
      let (source, target) = match (self.find_node(edge.source), self.find_node(edge.target)) {
        (Some(source), Some(target)) => (source, target),
        _ => {
          missing += 1;
          continue;
        }
      };

      let length = distance(source.coord, target.coord);
      let mut segment = Segment {
        source: source.coord,
        target: target.coord,
        distance: length,
        forward_weight: travel_time(length, edge.forward_speed),
        backward_weight: travel_time(length, edge.backward_speed),
      };
      profile.evaluate_segment(&mut segment).map_err(ExtractError::from)?;

      let forward_weight = to_weight(segment.forward_weight);
      let backward_weight = to_weight(segment.backward_weight);
      let mut direction = 0;
      if forward_weight > 0 {
        direction |= EDGE_FORWARD;
      }
      if backward_weight > 0 {
        direction |= EDGE_BACKWARD;
      }
      if direction == 0 {
        closed += 1;
        continue;
      }

      records.push(EdgeRecord {
        source: edge.source as u64,
        target: edge.target as u64,
        name_id: edge.name_id,
        forward_weight,
        backward_weight,
        direction,
        flags: edge.flags,
      });
    }

    if missing > 0 {
      warn!("Dropped {} edges referencing unknown nodes", missing);
    }
    if closed > 0 {
      warn!("Dropped {} edges closed by the segment rule", closed);
    }
    records.sort_by_key(|e| (e.source, e.target));
    Ok(records)
  }

  fn resolve_restrictions(&self) -> Vec<RestrictionRecord> {
    let on_way = |way: i64, node: i64| {
      self
        .way_nodes
        .get(&way)
        .map_or(false, |nodes| nodes.contains(&node))
    };

    let records: Vec<RestrictionRecord> = self
      .restrictions
      .iter()
      .filter(|r| {
        r.from_way != r.to_way
          && self.find_node(r.via_node).is_some()
          && on_way(r.from_way, r.via_node)
          && on_way(r.to_way, r.via_node)
      })
      .map(|r| RestrictionRecord {
        from_way: r.from_way as u64,
        via_node: r.via_node as u64,
        to_way: r.to_way as u64,
        kind: match r.kind {
          RestrictionKind::No => 0,
          RestrictionKind::Only => 1,
        },
      })
      .collect();

    if records.len() < self.restrictions.len() {
      warn!(
        "Dropped {} restrictions that do not connect routable ways",
        self.restrictions.len() - records.len()
      );
    }
    records
  }

  fn used_nodes(&self, edges: &[EdgeRecord]) -> Vec<NodeRecord> {
    let mut ids: Vec<u64> = edges.iter().flat_map(|e| vec![e.source, e.target]).collect();
    ids.sort_unstable();
    ids.dedup();
    ids
      .into_iter()
      .filter_map(|id| self.find_node(id as i64))
      .map(|node| NodeRecord {
        id: node.id as u64,
        lon: node.coord.lon,
        lat: node.coord.lat,
        flags: node.flags,
      })
      .collect()
  }

  /// Resolves all intermediates and writes the output tables.
  ///
  /// Nothing is written when no edge survives resolution.
  pub fn prepare_data(&mut self, profile: &mut dyn ProfileEvaluator, paths: &OutputPaths) -> Result<PreparedCounts> {
    let timer = Instant::now();

    // sort_by_key is stable, so the first occurrence of a node wins
    self.nodes.sort_by_key(|n| n.id);
    self.nodes.dedup_by_key(|n| n.id);

    let edges = self.resolve_edges(profile)?;
    if edges.is_empty() {
      warn!("No edge survived resolution");
      return Err(ExtractError::Empty);
    }
    let restrictions = self.resolve_restrictions();
    let nodes = self.used_nodes(&edges);

    write_records(&paths.edges, &edges)?;
    write_records(&paths.restrictions, &restrictions)?;
    write_names(&paths.names, self.names.names())?;
    write_records(&paths.nodes, &nodes)?;

    let counts = PreparedCounts {
      edges: edges.len(),
      restrictions: restrictions.len(),
      nodes: nodes.len(),
      names: self.names.len(),
    };
    info!(
      "Wrote {} edges, {} restrictions, {} nodes and {} names in {:.2} seconds",
      counts.edges,
      counts.restrictions,
      counts.nodes,
      counts.names,
      timer.elapsed().as_secs_f32()
    );
    Ok(counts)
  }
}
