use arli_raster::FixedCoordinate;
use std::collections::BTreeMap;

pub type Tags = BTreeMap<String, String>;

/// OpenStreetMap node
#[derive(Clone, Debug, Default, PartialEq)]
pub struct OsmNode {
  pub id: i64,
  pub coord: FixedCoordinate,
  pub tags: Tags,
}

/// OpenStreetMap way, an ordered list of node references
#[derive(Clone, Debug, Default, PartialEq)]
pub struct OsmWay {
  pub id: i64,
  pub nodes: Vec<i64>,
  pub tags: Tags,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum MemberType {
  Node,
  Way,
  Relation,
}

#[derive(Clone, Debug, PartialEq)]
pub struct RelationMember {
  pub member_type: MemberType,
  pub id: i64,
  pub role: String,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct OsmRelation {
  pub id: i64,
  pub members: Vec<RelationMember>,
  pub tags: Tags,
}

#[derive(Clone, Debug, PartialEq)]
pub enum OsmEntity {
  Node(OsmNode),
  Way(OsmWay),
  Relation(OsmRelation),
  // Any other item (changesets, unknown elements), identified by its element name
  Other(String),
}

/// One unit of decoder output; entities keep their input order.
pub type OsmBuffer = Vec<OsmEntity>;

/// Key/value pairs from the input file header.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct OsmHeader {
  values: BTreeMap<String, String>,
}

impl OsmHeader {
  pub const GENERATOR: &'static str = "generator";
  pub const REPLICATION_TIMESTAMP: &'static str = "osmosis_replication_timestamp";

  pub fn get(&self, key: &str) -> Option<&str> {
    self.values.get(key).map(String::as_str).filter(|v| !v.is_empty())
  }

  pub fn set<K: Into<String>, V: Into<String>>(&mut self, key: K, value: V) {
    self.values.insert(key.into(), value.into());
  }
}

pub fn tag<'a>(tags: &'a Tags, key: &str) -> Option<&'a str> {
  tags.get(key).map(String::as_str)
}
