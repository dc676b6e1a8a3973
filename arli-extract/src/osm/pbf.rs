//! Reader for OSM PBF files, one buffer per data blob.

use super::models::*;
use super::OsmSource;
use crate::error::{ExtractError, Result};
use arli_raster::FixedCoordinate;
use chrono::{TimeZone, Utc};
use flate2::read::ZlibDecoder;
use osmpbfreader::fileformat::{Blob, BlobHeader};
use osmpbfreader::osmformat::HeaderBlock;
use osmpbfreader::{OsmId, OsmObj, OsmPbfReader};
use protobuf::Message;
use std::fs::File;
use std::io::{self, Read, Seek, SeekFrom};
use std::path::Path;

const MAX_BLOB_HEADER_SIZE: usize = 64 * 1024;
const MAX_BLOB_SIZE: usize = 32 * 1024 * 1024;

pub struct PbfSource {
  pbf: OsmPbfReader<File>,
  header: OsmHeader,
}

impl PbfSource {
  pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
    let mut file = File::open(path)?;
    let header = read_header(&mut file)?;
    // the reader skips OSMHeader blobs on its own
    file.seek(SeekFrom::Start(0))?;
    Ok(PbfSource {
      pbf: OsmPbfReader::new(file),
      header,
    })
  }
}

fn format_error<E: std::fmt::Display>(e: E) -> ExtractError {
  ExtractError::Format(format!("PBF decoding failed: {}", e))
}

/// Reads the leading `OSMHeader` blob. Files without one get an empty header.
fn read_header<R: Read>(reader: &mut R) -> Result<OsmHeader> {
  let mut header = OsmHeader::default();

  let mut size = [0u8; 4];
  match reader.read_exact(&mut size) {
    Ok(()) => {}
    Err(ref e) if e.kind() == io::ErrorKind::UnexpectedEof => return Ok(header),
    Err(e) => return Err(e.into()),
  }
  let size = u32::from_be_bytes(size) as usize;
  if size > MAX_BLOB_HEADER_SIZE {
    return Err(format_error(format!("blob header of {} bytes", size)));
  }
  let blob_header = BlobHeader::parse_from_bytes(&read_bytes(reader, size)?).map_err(format_error)?;
  if blob_header.get_field_type() != "OSMHeader" {
    return Ok(header);
  }

  let size = blob_header.get_datasize();
  if size < 0 || size as usize > MAX_BLOB_SIZE {
    return Err(format_error(format!("header blob of {} bytes", size)));
  }
  let blob = Blob::parse_from_bytes(&read_bytes(reader, size as usize)?).map_err(format_error)?;
  let block = HeaderBlock::parse_from_bytes(&blob_payload(&blob)?).map_err(format_error)?;

  if !block.get_writingprogram().is_empty() {
    header.set(OsmHeader::GENERATOR, block.get_writingprogram());
  }
  if block.has_osmosis_replication_timestamp() {
    if let Some(timestamp) = iso_timestamp(block.get_osmosis_replication_timestamp()) {
      header.set(OsmHeader::REPLICATION_TIMESTAMP, timestamp);
    }
  }
  Ok(header)
}

fn read_bytes<R: Read>(reader: &mut R, size: usize) -> Result<Vec<u8>> {
  let mut bytes = vec![0u8; size];
  reader.read_exact(&mut bytes)?;
  Ok(bytes)
}

fn blob_payload(blob: &Blob) -> Result<Vec<u8>> {
  if blob.has_raw() {
    Ok(blob.get_raw().to_vec())
  } else if blob.has_zlib_data() {
    let mut payload = Vec::new();
    ZlibDecoder::new(blob.get_zlib_data())
      .read_to_end(&mut payload)
      .map_err(format_error)?;
    Ok(payload)
  } else {
    Err(format_error("unsupported blob compression"))
  }
}

/// Seconds since the epoch as `YYYY-MM-DDTHH:MM:SSZ`.
fn iso_timestamp(seconds: i64) -> Option<String> {
  Utc
    .timestamp_opt(seconds, 0)
    .single()
    .map(|time| time.format("%Y-%m-%dT%H:%M:%SZ").to_string())
}

impl OsmSource for PbfSource {
  fn header(&self) -> &OsmHeader {
    &self.header
  }

  fn read(&mut self) -> Result<Option<OsmBuffer>> {
    let blob = match self.pbf.blobs().next() {
      Some(blob) => blob,
      None => return Ok(None),
    };
    osmpbfreader::blobs::result_blob_into_iter(blob)
      .map(|obj| obj.map(OsmEntity::from).map_err(format_error))
      .collect::<Result<OsmBuffer>>()
      .map(Some)
  }
}

fn convert_tags(tags: &osmpbfreader::Tags) -> Tags {
  tags
    .iter()
    .map(|(key, val)| (key.to_string(), val.to_string()))
    .collect()
}

impl From<OsmObj> for OsmEntity {
  fn from(obj: OsmObj) -> Self {
    match obj {
      OsmObj::Node(node) => OsmEntity::Node(OsmNode {
        id: node.id.0,
        coord: FixedCoordinate::from_degrees(node.lon(), node.lat()),
        tags: convert_tags(&node.tags),
      }),
      OsmObj::Way(way) => OsmEntity::Way(OsmWay {
        id: way.id.0,
        nodes: way.nodes.iter().map(|node| node.0).collect(),
        tags: convert_tags(&way.tags),
      }),
      OsmObj::Relation(relation) => OsmEntity::Relation(OsmRelation {
        id: relation.id.0,
        members: relation
          .refs
          .iter()
          .map(|r| RelationMember {
            member_type: match r.member {
              OsmId::Node(_) => MemberType::Node,
              OsmId::Way(_) => MemberType::Way,
              OsmId::Relation(_) => MemberType::Relation,
            },
            id: r.member.inner_id(),
            role: r.role.to_string(),
          })
          .collect(),
        tags: convert_tags(&relation.tags),
      }),
    }
  }
}

/// Writes small PBF files for tests.
#[cfg(test)]
pub(crate) mod fixture {
  use flate2::write::ZlibEncoder;
  use flate2::Compression;
  use osmpbfreader::fileformat::{Blob, BlobHeader};
  use osmpbfreader::osmformat::{HeaderBlock, Node, PrimitiveBlock, PrimitiveGroup, Relation, Relation_MemberType, Way};
  use protobuf::Message;
  use std::io::Write;
  use std::path::Path;

  pub type Tag<'a> = (&'a str, &'a str);

  pub struct BlockBuilder {
    strings: Vec<String>,
    group: PrimitiveGroup,
  }

  impl BlockBuilder {
    pub fn new() -> Self {
      BlockBuilder {
        strings: vec![String::new()],
        group: PrimitiveGroup::new(),
      }
    }

    fn string(&mut self, value: &str) -> u32 {
      match self.strings.iter().position(|s| s == value) {
        Some(index) => index as u32,
        None => {
          self.strings.push(value.to_string());
          (self.strings.len() - 1) as u32
        }
      }
    }

    fn tags(&mut self, tags: &[Tag]) -> (Vec<u32>, Vec<u32>) {
      tags.iter().map(|(k, v)| (self.string(k), self.string(v))).unzip()
    }

    pub fn node(mut self, id: i64, lon: f64, lat: f64, tags: &[Tag]) -> Self {
      let (keys, vals) = self.tags(tags);
      let mut node = Node::new();
      node.set_id(id);
      // default granularity is 100 nanodegrees
      node.set_lon((lon * 1e7).round() as i64);
      node.set_lat((lat * 1e7).round() as i64);
      node.mut_keys().extend(keys);
      node.mut_vals().extend(vals);
      self.group.mut_nodes().push(node);
      self
    }

    pub fn way(mut self, id: i64, refs: &[i64], tags: &[Tag]) -> Self {
      let (keys, vals) = self.tags(tags);
      let mut way = Way::new();
      way.set_id(id);
      way.mut_refs().extend(delta(refs));
      way.mut_keys().extend(keys);
      way.mut_vals().extend(vals);
      self.group.mut_ways().push(way);
      self
    }

    /// Members are `(type, id, role)` with type one of `node`, `way`, `relation`.
    pub fn relation(mut self, id: i64, members: &[(&str, i64, &str)], tags: &[Tag]) -> Self {
      let (keys, vals) = self.tags(tags);
      let mut relation = Relation::new();
      relation.set_id(id);
      for (kind, _, role) in members {
        let role = self.string(role) as i32;
        relation.mut_roles_sid().push(role);
        relation.mut_types().push(match *kind {
          "node" => Relation_MemberType::NODE,
          "way" => Relation_MemberType::WAY,
          _ => Relation_MemberType::RELATION,
        });
      }
      let ids: Vec<i64> = members.iter().map(|(_, id, _)| *id).collect();
      relation.mut_memids().extend(delta(&ids));
      relation.mut_keys().extend(keys);
      relation.mut_vals().extend(vals);
      self.group.mut_relations().push(relation);
      self
    }

    pub fn build(self) -> Vec<u8> {
      let mut block = PrimitiveBlock::new();
      for s in self.strings {
        block.mut_stringtable().mut_s().push(s.into_bytes());
      }
      block.mut_primitivegroup().push(self.group);
      block.write_to_bytes().unwrap()
    }
  }

  fn delta(values: &[i64]) -> Vec<i64> {
    let mut last = 0;
    values
      .iter()
      .map(|value| {
        let d = value - last;
        last = *value;
        d
      })
      .collect()
  }

  pub fn header_block(program: &str, timestamp: Option<i64>) -> Vec<u8> {
    let mut block = HeaderBlock::new();
    block.mut_required_features().push("OsmSchema-V0.6".to_string());
    block.set_writingprogram(program.to_string());
    if let Some(timestamp) = timestamp {
      block.set_osmosis_replication_timestamp(timestamp);
    }
    block.write_to_bytes().unwrap()
  }

  /// Frames `payload` as one file block, zlib compressed when asked.
  pub fn blob(kind: &str, payload: Vec<u8>, compress: bool) -> Vec<u8> {
    let mut blob = Blob::new();
    blob.set_raw_size(payload.len() as i32);
    if compress {
      let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
      encoder.write_all(&payload).unwrap();
      blob.set_zlib_data(encoder.finish().unwrap());
    } else {
      blob.set_raw(payload);
    }
    let blob = blob.write_to_bytes().unwrap();

    let mut header = BlobHeader::new();
    header.set_field_type(kind.to_string());
    header.set_datasize(blob.len() as i32);
    let header = header.write_to_bytes().unwrap();

    let mut framed = (header.len() as u32).to_be_bytes().to_vec();
    framed.extend(header);
    framed.extend(blob);
    framed
  }

  pub fn write(path: &Path, blobs: &[Vec<u8>]) {
    std::fs::write(path, blobs.concat()).unwrap();
  }

  /// The Berlin sample network used across the extraction tests.
  pub fn network(path: &Path, timestamp: Option<i64>) {
    let nodes = BlockBuilder::new()
      .node(1, 13.38, 52.515, &[])
      .node(2, 13.385, 52.515, &[("highway", "traffic_signals")])
      .node(3, 13.39, 52.515, &[])
      .node(4, 13.39, 52.518, &[("barrier", "gate")])
      .node(5, 13.395, 52.519, &[])
      .node(6, 13.39, 52.512, &[])
      .build();
    let ways = BlockBuilder::new()
      .way(
        10,
        &[1, 2, 3],
        &[("highway", "primary"), ("name", "Unter den Linden"), ("maxspeed", "50")],
      )
      .way(
        11,
        &[3, 4, 5],
        &[("highway", "residential"), ("name", "Glinkastrasse"), ("oneway", "yes")],
      )
      .way(12, &[3, 6], &[("highway", "service"), ("access", "private")])
      .relation(
        100,
        &[("way", 10, "from"), ("node", 3, "via"), ("way", 11, "to")],
        &[("type", "restriction"), ("restriction", "no_left_turn")],
      )
      .build();
    write(
      path,
      &[
        blob("OSMHeader", header_block("osmium/1.16.0", timestamp), false),
        blob("OSMData", nodes, true),
        blob("OSMData", ways, false),
      ],
    );
  }
}
