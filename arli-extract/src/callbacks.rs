use crate::containers::ExtractionContainers;
use crate::extraction::{ExtractionNode, ExtractionWay, InputRestriction};
use crate::osm::{OsmNode, OsmWay};

/// Receives evaluated elements from the driver, in input order.
pub trait ExtractorCallbacks {
  fn process_node(&mut self, node: &OsmNode, extraction: &ExtractionNode);

  fn process_way(&mut self, way: &OsmWay, extraction: &ExtractionWay);

  fn process_restriction(&mut self, restriction: Option<InputRestriction>);
}

pub struct ContainerCallbacks<'a> {
  containers: &'a mut ExtractionContainers,
}

impl<'a> ContainerCallbacks<'a> {
  pub fn new(containers: &'a mut ExtractionContainers) -> Self {
    ContainerCallbacks { containers }
  }
}

impl<'a> ExtractorCallbacks for ContainerCallbacks<'a> {
  fn process_node(&mut self, node: &OsmNode, extraction: &ExtractionNode) {
    self.containers.add_node(node, extraction);
  }

  fn process_way(&mut self, way: &OsmWay, extraction: &ExtractionWay) {
    self.containers.add_way(way, extraction);
  }

  fn process_restriction(&mut self, restriction: Option<InputRestriction>) {
    self.containers.add_restriction(restriction);
  }
}
