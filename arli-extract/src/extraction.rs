//! Per-element results produced by a profile.

/// Routing attributes of a node.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ExtractionNode {
  pub barrier: bool,
  pub traffic_signal: bool,
  pub access: Option<String>,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum TravelDirection {
  Forward = 1,
  Backward = 2,
  Bidirectional = 3,
}

impl Default for TravelDirection {
  fn default() -> Self {
    TravelDirection::Bidirectional
  }
}

impl TravelDirection {
  pub fn forward(self) -> bool {
    self != TravelDirection::Backward
  }

  pub fn backward(self) -> bool {
    self != TravelDirection::Forward
  }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum AccessClass {
  Public,
  Restricted,
}

impl Default for AccessClass {
  fn default() -> Self {
    AccessClass::Public
  }
}

/// Routing attributes of a way. Speeds are km/h, zero means impassable.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ExtractionWay {
  pub forward_speed: f64,
  pub backward_speed: f64,
  pub name: String,
  pub direction: TravelDirection,
  pub roundabout: bool,
  pub access: AccessClass,
}

impl ExtractionWay {
  /// Speed usable in forward direction, zero if closed.
  pub fn effective_forward_speed(&self) -> f64 {
    if self.direction.forward() && self.forward_speed > 0.0 {
      self.forward_speed
    } else {
      0.0
    }
  }

  pub fn effective_backward_speed(&self) -> f64 {
    if self.direction.backward() && self.backward_speed > 0.0 {
      self.backward_speed
    } else {
      0.0
    }
  }

  pub fn is_passable(&self) -> bool {
    self.effective_forward_speed() > 0.0 || self.effective_backward_speed() > 0.0
  }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum RestrictionKind {
  No = 0,
  Only = 1,
}

/// A turn restriction in terms of OSM ids.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct InputRestriction {
  pub from_way: i64,
  pub via_node: i64,
  pub to_way: i64,
  pub kind: RestrictionKind,
}
